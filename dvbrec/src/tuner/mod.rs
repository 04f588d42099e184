//! Tuner state machine: frontend tuning, DiSEqC switching and PID filters.
//!
//! The hardware is reached through the [`Adapter`] trait so the state machine
//! can be driven without a DVB card. [`LinuxAdapter`] talks to the kernel's
//! DVB v3 API.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::os::fd::RawFd;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::channels::{Burst, FrontendType, SatelliteParams, Tone, TuningParams, Voltage};
use crate::error::{DeviceError, TuneError};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(test)]
pub(crate) mod mock;

#[cfg(target_os = "linux")]
pub use self::linux::LinuxAdapter;

/// PID value meaning "no stream". Filtering it is a stop request.
pub const NO_PID: u16 = 0;

/// `fe_status_t` bits reported by `FE_READ_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrontendStatus(pub u32);

impl FrontendStatus {
    pub const HAS_SIGNAL: u32 = 0x01;
    pub const HAS_CARRIER: u32 = 0x02;
    pub const HAS_VITERBI: u32 = 0x04;
    pub const HAS_SYNC: u32 = 0x08;
    pub const HAS_LOCK: u32 = 0x10;
    pub const TIMEDOUT: u32 = 0x20;
    pub const REINIT: u32 = 0x40;

    pub fn has_lock(self) -> bool {
        self.0 & Self::HAS_LOCK != 0
    }

    pub fn timed_out(self) -> bool {
        self.0 & Self::TIMEDOUT != 0
    }
}

/// A DiSEqC master command (`struct dvb_diseqc_master_cmd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiseqcCommand {
    pub msg: [u8; 6],
    pub len: u8,
}

impl DiseqcCommand {
    /// Committed switch command selecting satellite position, band and
    /// polarization: `E0 10 38 Fx`.
    pub fn switch(sat_no: u32, tone: Tone, voltage: Voltage) -> Self {
        let mut data = ((sat_no * 4) & 0x0F) as u8;
        if tone == Tone::On {
            data |= 1;
        }
        if voltage == Voltage::V18 {
            data |= 2;
        }
        Self {
            msg: [0xE0, 0x10, 0x38, 0xF0 | data, 0x00, 0x00],
            len: 4,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.msg[..self.len as usize]
    }
}

/// The frontend device node.
pub trait Frontend {
    /// `FE_GET_INFO`
    fn frontend_type(&mut self) -> Result<FrontendType, DeviceError>;
    /// `FE_SET_TONE`
    fn set_tone(&mut self, tone: Tone) -> Result<(), DeviceError>;
    /// `FE_SET_VOLTAGE`
    fn set_voltage(&mut self, voltage: Voltage) -> Result<(), DeviceError>;
    /// `FE_DISEQC_SEND_MASTER_CMD`
    fn send_diseqc(&mut self, cmd: &DiseqcCommand) -> Result<(), DeviceError>;
    /// `FE_DISEQC_SEND_BURST`
    fn send_burst(&mut self, burst: Burst) -> Result<(), DeviceError>;
    /// `FE_SET_FRONTEND`
    fn set_frontend(&mut self, params: &TuningParams) -> Result<(), DeviceError>;
    /// `FE_READ_STATUS`
    fn read_status(&mut self) -> Result<FrontendStatus, DeviceError>;
}

/// One open descriptor of the demux device. Dropping it closes the descriptor.
pub trait DemuxFilter {
    /// `DMX_SET_PES_FILTER` routing `pid` to the DVR. Never called with [`NO_PID`].
    fn set_pes_filter(&mut self, pid: u16) -> Result<(), DeviceError>;
    /// `DMX_STOP`
    fn stop(&mut self) -> Result<(), DeviceError>;
}

/// The DVR node delivering the filtered transport stream.
pub trait DvrSource: Read {
    fn raw_fd(&self) -> RawFd;
}

/// Opens the device nodes of one DVB adapter.
pub trait Adapter: Clone {
    type Frontend: Frontend;
    type Demux: DemuxFilter;
    type Dvr: DvrSource;

    /// Adapter directory, used in log and error messages.
    fn path(&self) -> &Path;
    fn open_frontend(&self) -> Result<Self::Frontend, DeviceError>;
    fn open_demux(&self) -> Result<Self::Demux, DeviceError>;
    fn open_dvr(&self) -> Result<Self::Dvr, DeviceError>;
}

/// Timing of the tuning sequence.
#[derive(Debug, Clone, Copy)]
pub struct TunerConfig {
    /// Pause between the steps of the DiSEqC sequence.
    pub settle_delay: Duration,
    /// Interval between `FE_READ_STATUS` polls while waiting for lock.
    pub status_poll_interval: Duration,
    /// Give up waiting for lock after this long, even without `FE_TIMEDOUT`.
    pub lock_timeout: Duration,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(15),
            status_poll_interval: Duration::from_millis(50),
            lock_timeout: Duration::from_secs(10),
        }
    }
}

struct PidRegistration<D> {
    filter: D,
    refcount: u32,
}

/// An opened adapter: frontend, DVR and the demux filters of subscribed PIDs.
pub struct Tuner<A: Adapter> {
    adapter: A,
    frontend: A::Frontend,
    frontend_type: FrontendType,
    dvr: A::Dvr,
    current: Option<TuningParams>,
    filters: BTreeMap<u16, PidRegistration<A::Demux>>,
    config: TunerConfig,
}

impl<A: Adapter> Tuner<A> {
    /// Open the frontend and the DVR of `adapter`.
    ///
    /// Nothing stays open if either step fails.
    pub fn open(adapter: A, config: TunerConfig) -> Result<Self, DeviceError> {
        let mut frontend = adapter.open_frontend()?;
        let frontend_type = frontend.frontend_type()?;
        let dvr = adapter.open_dvr()?;
        info!(
            "[Tuner] Opened {:?} ({:?} frontend)",
            adapter.path(),
            frontend_type
        );
        Ok(Self {
            adapter,
            frontend,
            frontend_type,
            dvr,
            current: None,
            filters: BTreeMap::new(),
            config,
        })
    }

    pub fn frontend_type(&self) -> FrontendType {
        self.frontend_type
    }

    /// Parameters of the transponder the frontend is locked to, if any.
    pub fn current(&self) -> Option<&TuningParams> {
        self.current.as_ref()
    }

    pub fn is_tuned(&self) -> bool {
        self.current.is_some()
    }

    pub fn dvr_fd(&self) -> RawFd {
        self.dvr.raw_fd()
    }

    /// Tune to the transponder described by `params`.
    ///
    /// Returns immediately when already locked to the same transponder. On
    /// any failure the tuner is left untuned.
    pub fn set_bouquet(&mut self, params: &TuningParams) -> Result<(), TuneError> {
        if let Some(current) = &self.current {
            if current.same_transponder(params) {
                debug!("[Tuner] Already tuned to {} kHz", params.frequency());
                return Ok(());
            }
        }

        if params.frontend_type() != self.frontend_type {
            return Err(TuneError::FrontendMismatch {
                wanted: params.frontend_type(),
                actual: self.frontend_type,
            });
        }

        self.current = None;

        if let TuningParams::Satellite(sat) = params {
            self.switch_lnb(sat).map_err(|e| {
                error!("[Tuner] DiSEqC sequence failed: {}", e);
                e
            })?;
        }

        if let Err(e) = self.frontend.set_frontend(params) {
            error!("[Tuner] {}", e);
            return Err(e.into());
        }

        let status = self.wait_for_lock()?;
        info!(
            "[Tuner] Locked to {} kHz (status 0x{:02x})",
            params.frequency(),
            status.0
        );
        self.current = Some(*params);
        Ok(())
    }

    /// Tone off, voltage, DiSEqC switch command, tone burst, tone.
    fn switch_lnb(&mut self, sat: &SatelliteParams) -> Result<(), DeviceError> {
        let voltage = sat.polarization.voltage();
        let burst = if (sat.sat_no / 4) % 2 == 1 {
            Burst::B
        } else {
            Burst::A
        };
        let cmd = DiseqcCommand::switch(sat.sat_no, sat.tone, voltage);
        debug!(
            "[Tuner] DiSEqC sat {} {:?} {:?}: {:02x?}",
            sat.sat_no,
            voltage,
            sat.tone,
            cmd.bytes()
        );

        self.frontend.set_tone(Tone::Off)?;
        thread::sleep(self.config.settle_delay);
        self.frontend.set_voltage(voltage)?;
        thread::sleep(self.config.settle_delay);
        self.frontend.send_diseqc(&cmd)?;
        thread::sleep(self.config.settle_delay);
        self.frontend.send_burst(burst)?;
        thread::sleep(self.config.settle_delay);
        self.frontend.set_tone(sat.tone)
    }

    fn wait_for_lock(&mut self) -> Result<FrontendStatus, TuneError> {
        let deadline = Instant::now() + self.config.lock_timeout;
        loop {
            let status = self.frontend.read_status().map_err(|e| {
                error!("[Tuner] {}", e);
                e
            })?;
            if status.has_lock() {
                return Ok(status);
            }
            if status.timed_out() || Instant::now() >= deadline {
                warn!("[Tuner] No lock (status 0x{:02x})", status.0);
                return Err(TuneError::Timeout { status: status.0 });
            }
            thread::sleep(self.config.status_poll_interval);
        }
    }

    /// Subscribe `pid`. The first subscription opens a demux filter routing the
    /// PID to the DVR; later ones only count.
    pub fn add_pid(&mut self, pid: u16) -> Result<(), DeviceError> {
        if pid == NO_PID {
            debug!("[Tuner] add_pid(NO_PID) ignored");
            return Ok(());
        }

        match self.filters.entry(pid) {
            Entry::Occupied(mut e) => {
                e.get_mut().refcount += 1;
                debug!("[Tuner] PID {} refcount {}", pid, e.get().refcount);
            }
            Entry::Vacant(e) => {
                let mut filter = self.adapter.open_demux().map_err(|err| {
                    error!("[Tuner] {}", err);
                    err
                })?;
                if let Err(err) = filter.set_pes_filter(pid) {
                    error!("[Tuner] PID {}: {}", pid, err);
                    return Err(err);
                }
                debug!("[Tuner] PID {} filter started", pid);
                e.insert(PidRegistration {
                    filter,
                    refcount: 1,
                });
            }
        }
        Ok(())
    }

    /// Drop one subscription of `pid`; the last one stops and closes its filter.
    pub fn remove_pid(&mut self, pid: u16) {
        if pid == NO_PID {
            return;
        }

        match self.filters.entry(pid) {
            Entry::Vacant(_) => warn!("[Tuner] remove_pid({}) without filter", pid),
            Entry::Occupied(mut e) => {
                e.get_mut().refcount -= 1;
                if e.get().refcount == 0 {
                    let mut reg = e.remove();
                    if let Err(err) = reg.filter.stop() {
                        error!("[Tuner] PID {}: {}", pid, err);
                    }
                    debug!("[Tuner] PID {} filter closed", pid);
                }
            }
        }
    }

    /// Number of subscriptions of `pid`.
    pub fn pid_refcount(&self, pid: u16) -> u32 {
        self.filters.get(&pid).map_or(0, |r| r.refcount)
    }

    /// PIDs with an open filter.
    pub fn active_pids(&self) -> Vec<u16> {
        self.filters.keys().copied().collect()
    }

    /// One read from the DVR. A descriptor with nothing to deliver yields 0.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        match self.dvr.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) if e.raw_os_error() == Some(nix::libc::EOVERFLOW) => {
                warn!("[Tuner] DVR buffer overflow, data lost");
                Ok(0)
            }
            Err(e) => Err(DeviceError::new("read dvr", self.adapter.path(), e)),
        }
    }
}

impl<A: Adapter> Drop for Tuner<A> {
    fn drop(&mut self) {
        for (pid, mut reg) in std::mem::take(&mut self.filters) {
            if let Err(e) = reg.filter.stop() {
                warn!("[Tuner] PID {}: {}", pid, e);
            }
        }
        info!("[Tuner] Closed {:?}", self.adapter.path());
    }
}
