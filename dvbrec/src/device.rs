//! One DVB adapter shared by any number of recordings.
//!
//! The device owns the channel catalog, the (lazily opened) tuner, the ring
//! buffer behind the DVR and the demux. Recordings subscribe PIDs and
//! register their plugin chain with the demux; the host drives the data
//! path by calling [`Device::read_fd_data`] whenever the DVR is readable.

use std::collections::BTreeMap;
use std::fmt;
use std::os::fd::RawFd;
use std::path::Path;

use log::{debug, error, info, warn};

use crate::channels::{Catalog, FrontendType};
use crate::error::{DeviceError, RecordError};
use crate::notify::ReadinessNotifier;
use crate::plugin::OutputPlugin;
use crate::ring_buffer::RingBuffer;
use crate::ts::{Demux, DemuxStats, FilterId, TS_PACKET_SIZE};
use crate::tuner::{Adapter, Frontend, Tuner, TunerConfig, NO_PID};

#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    /// Capacity of the ring buffer between the DVR and the demux.
    pub ring_buffer_size: usize,
    /// Minimum run the ring buffer hands to the demux.
    pub ring_buffer_margin: usize,
    /// Bytes requested from the DVR per readiness event.
    pub read_size: usize,
    pub tuner: TunerConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ring_buffer_size: TS_PACKET_SIZE * 10_000,
            ring_buffer_margin: TS_PACKET_SIZE,
            read_size: TS_PACKET_SIZE * 348,
            tuner: TunerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordingId(u64);

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Video and audio PID of a channel. `NO_PID` where the channel has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPids {
    pub video: u16,
    pub audio: u16,
}

#[derive(Debug, Clone)]
pub struct Recording {
    pub id: RecordingId,
    pub channel: String,
    /// Subscribed PIDs, without `NO_PID`.
    pub pids: Vec<u16>,
    filter: FilterId,
}

pub struct Device<A: Adapter, N: ReadinessNotifier> {
    adapter: A,
    frontend_type: FrontendType,
    catalog: Catalog,
    notifier: N,
    config: DeviceConfig,
    tuner: Option<Tuner<A>>,
    registered_fd: Option<RawFd>,
    ring: RingBuffer,
    demux: Demux,
    read_buf: Vec<u8>,
    recordings: BTreeMap<RecordingId, Recording>,
    next_id: u64,
}

#[cfg(target_os = "linux")]
impl<N: ReadinessNotifier> Device<crate::tuner::LinuxAdapter, N> {
    /// Open the adapter at `adapter_path` (e.g. `/dev/dvb/adapter0`).
    pub fn open(
        adapter_path: impl AsRef<Path>,
        channels_path: impl AsRef<Path>,
        notifier: N,
        config: DeviceConfig,
    ) -> Result<Self, DeviceError> {
        let adapter = crate::tuner::LinuxAdapter::new(adapter_path.as_ref());
        Self::new(adapter, channels_path, notifier, config)
    }
}

impl<A: Adapter, N: ReadinessNotifier> Device<A, N> {
    /// Query the frontend type and load the channel list for it.
    ///
    /// An unreadable channel list is logged and leaves the catalog empty.
    pub fn new(
        adapter: A,
        channels_path: impl AsRef<Path>,
        notifier: N,
        config: DeviceConfig,
    ) -> Result<Self, DeviceError> {
        let frontend_type = {
            let mut frontend = adapter.open_frontend()?;
            frontend.frontend_type()?
        };

        let catalog = match Catalog::load(channels_path.as_ref(), frontend_type) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("[Device] {}", e);
                Catalog::default()
            }
        };
        info!(
            "[Device] {:?}: {:?} frontend, {} channels in {} bouquets",
            adapter.path(),
            frontend_type,
            catalog.len(),
            catalog.bouquets().len()
        );

        Ok(Self {
            adapter,
            frontend_type,
            catalog,
            notifier,
            ring: RingBuffer::new(config.ring_buffer_size, config.ring_buffer_margin),
            demux: Demux::new(),
            read_buf: vec![0u8; config.read_size.max(TS_PACKET_SIZE)],
            config,
            tuner: None,
            registered_fd: None,
            recordings: BTreeMap::new(),
            next_id: 1,
        })
    }

    pub fn frontend_type(&self) -> FrontendType {
        self.frontend_type
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Channel names grouped by bouquet.
    pub fn bouquet_list(&self) -> Vec<Vec<String>> {
        self.catalog.bouquet_list()
    }

    pub fn pids(&self, channel: &str) -> Option<ChannelPids> {
        self.catalog.find(channel).map(|(_, ch)| ChannelPids {
            video: ch.video_pid,
            audio: ch.audio_pid,
        })
    }

    pub fn is_tuned(&self) -> bool {
        self.tuner.as_ref().map_or(false, |t| t.is_tuned())
    }

    pub fn recordings(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.values()
    }

    pub fn demux_stats(&self) -> DemuxStats {
        self.demux.stats()
    }

    /// Start routing `channel` into `chain`.
    ///
    /// Opens the tuner on first use and tunes to the channel's bouquet. If
    /// other recordings run on a different bouquet they lose their stream.
    /// On failure everything acquired for this request is released again.
    pub fn start_recording(
        &mut self,
        channel: &str,
        chain: Box<dyn OutputPlugin>,
    ) -> Result<RecordingId, RecordError> {
        let Some((bouquet, ch)) = self.catalog.find(channel) else {
            warn!("[Device] Unknown channel {:?}", channel);
            return Err(RecordError::UnknownChannel(channel.to_string()));
        };
        let params = bouquet.params;
        let mut pids: Vec<u16> = [ch.video_pid, ch.audio_pid]
            .into_iter()
            .filter(|&pid| pid != NO_PID)
            .collect();
        pids.dedup();

        let mut tuner = match self.tuner.take() {
            Some(tuner) => tuner,
            None => Tuner::open(self.adapter.clone(), self.config.tuner).map_err(|e| {
                error!("[Device] {}", e);
                e
            })?,
        };

        if !self.recordings.is_empty()
            && !tuner
                .current()
                .map_or(false, |current| current.same_transponder(&params))
        {
            warn!(
                "[Device] Retuning for {:?} displaces {} running recording(s)",
                channel,
                self.recordings.len()
            );
        }

        let acquired = Self::acquire(&mut tuner, &params, &pids);
        let fd = tuner.dvr_fd();
        if self.recordings.is_empty() && acquired.is_err() {
            // Nobody else uses the tuner; dropping it closes everything.
            drop(tuner);
        } else {
            self.tuner = Some(tuner);
        }
        acquired?;

        if self.registered_fd.is_none() {
            self.notifier.register(fd);
            self.registered_fd = Some(fd);
        }

        let id = RecordingId(self.next_id);
        self.next_id += 1;
        let filter = self.demux.add_filter(&pids, chain);
        info!(
            "[Device] Recording {} started: {:?} PIDs {:?}",
            id, channel, pids
        );
        self.recordings.insert(
            id,
            Recording {
                id,
                channel: channel.to_string(),
                pids,
                filter,
            },
        );
        Ok(id)
    }

    fn acquire(
        tuner: &mut Tuner<A>,
        params: &crate::channels::TuningParams,
        pids: &[u16],
    ) -> Result<(), RecordError> {
        if let Err(e) = tuner.set_bouquet(params) {
            error!("[Device] {}", e);
            return Err(e.into());
        }
        for (i, &pid) in pids.iter().enumerate() {
            if let Err(e) = tuner.add_pid(pid) {
                for &added in &pids[..i] {
                    tuner.remove_pid(added);
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Stop a recording and flush its chain. `false` for unknown ids.
    ///
    /// The last recording closes the tuner.
    pub fn stop_recording(&mut self, id: RecordingId) -> bool {
        let Some(recording) = self.recordings.remove(&id) else {
            warn!("[Device] stop_recording({}): no such recording", id);
            return false;
        };

        if let Some(mut chain) = self.demux.remove_filter(recording.filter) {
            if let Err(e) = chain.flush() {
                warn!("[Device] Recording {}: {}", id, e);
            }
        }
        if let Some(tuner) = self.tuner.as_mut() {
            for &pid in &recording.pids {
                tuner.remove_pid(pid);
            }
        }
        info!("[Device] Recording {} stopped", id);

        if self.recordings.is_empty() {
            if let Some(fd) = self.registered_fd.take() {
                self.notifier.unregister(fd);
            }
            self.tuner = None;
            self.ring.clear();
            self.demux.clear();
            debug!("[Device] Last recording stopped, tuner released");
        }
        true
    }

    /// Handle one readiness event on the DVR: read once, then run one demux pass.
    ///
    /// Returns the number of bytes read.
    pub fn read_fd_data(&mut self) -> usize {
        let Some(tuner) = self.tuner.as_mut() else {
            return 0;
        };
        let n = match tuner.read(&mut self.read_buf) {
            Ok(n) => n,
            Err(e) => {
                error!("[Device] {}", e);
                return 0;
            }
        };
        if n > 0 {
            let stored = self.ring.put(&self.read_buf[..n]);
            if stored < n {
                debug!("[Device] Ring buffer full, {} bytes lost", n - stored);
            }
        }

        while let Some(chunk) = self.ring.get() {
            let len = chunk.len();
            self.demux.add_data(chunk);
            self.ring.del(len);
        }
        self.demux.process_data();
        n
    }
}

impl<A: Adapter, N: ReadinessNotifier> Drop for Device<A, N> {
    fn drop(&mut self) {
        let ids: Vec<RecordingId> = self.recordings.keys().copied().collect();
        for id in ids {
            self.stop_recording(id);
        }
    }
}
