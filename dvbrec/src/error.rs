//! Error types shared by the tuner, the channel catalog and the recording sinks.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Problems with the adapter path or the channel list.
///
/// These are logged by the device and never stop it from starting; the
/// catalog is simply left empty (or partial).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Channel list {path:?} could not be read: {source}")]
    ChannelFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Adapter path is empty")]
    MissingAdapter,

    #[error("Unsupported frontend type: {0}")]
    UnsupportedFrontend(u32),
}

/// An `open()` or `ioctl()` on one of the adapter's device nodes failed.
#[derive(Error, Debug)]
#[error("{op} failed on {path:?}: {source}")]
pub struct DeviceError {
    /// Name of the failed operation (`open`, `FE_SET_FRONTEND`, ...).
    pub op: &'static str,
    /// Device node the operation was issued on.
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl DeviceError {
    pub fn new(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }

    /// The raw OS error number, if there is one.
    pub fn errno(&self) -> Option<i32> {
        self.source.raw_os_error()
    }
}

/// Tuning a bouquet failed. The tuner is left untuned.
#[derive(Error, Debug)]
pub enum TuneError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The frontend reported `FE_TIMEDOUT` or never locked before the deadline.
    #[error("Frontend did not lock (status 0x{status:02x})")]
    Timeout { status: u32 },

    #[error("Bouquet is for a {wanted:?} frontend but the adapter has a {actual:?} frontend")]
    FrontendMismatch {
        wanted: crate::channels::FrontendType,
        actual: crate::channels::FrontendType,
    },
}

/// Errors raised by an output plugin while processing buffered data.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("I/O error in {plugin}: {source}")]
    Io {
        plugin: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot resolve address {0:?}")]
    Resolve(String),

    #[error("Invalid address {0:?}, expected host:port or host/port")]
    InvalidAddress(String),

    #[error("Plugin chain has no stages")]
    EmptyChain,
}

impl PluginError {
    pub fn io(plugin: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            plugin: plugin.into(),
            source,
        }
    }
}

/// Why `start_recording` refused a request.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error(transparent)]
    Tune(#[from] TuneError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}
