//! dvbrec library - DVB tuning, TS demultiplexing and recording sinks
//!
//! This library tunes a Linux DVB adapter (satellite, cable or terrestrial)
//! to a bouquet, demultiplexes the transport stream by PID and routes the
//! selected PIDs through chains of output plugins. Several recordings can
//! share one adapter.

pub mod channels;
pub mod device;
pub mod error;
pub mod notify;
pub mod plugin;
pub mod ring_buffer;
pub mod ts;
pub mod tuner;

// Re-export commonly used types
pub use channels::{Bouquet, Catalog, Channel, FrontendType, TuningParams};
pub use device::{ChannelPids, Device, DeviceConfig, Recording, RecordingId};
pub use error::{ConfigError, DeviceError, PluginError, RecordError, TuneError};
pub use notify::ReadinessNotifier;
pub use plugin::{FileWriter, OutputPlugin, PluginChain, Remux, UdpSend};
pub use tuner::{Tuner, TunerConfig, NO_PID};
