//! Linux DVB v3 API: `frontend0`, `demux0` and `dvr0` of one adapter.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use log::debug;
use nix::fcntl::OFlag;

use super::{Adapter, DemuxFilter, DiseqcCommand, DvrSource, Frontend, FrontendStatus};
use crate::channels::{Burst, FrontendType, Tone, TuningParams, Voltage};
use crate::error::DeviceError;

/// `struct dvb_frontend_info`
#[repr(C)]
#[allow(dead_code)]
struct DvbFrontendInfo {
    name: [u8; 128],
    fe_type: u32,
    frequency_min: u32,
    frequency_max: u32,
    frequency_stepsize: u32,
    frequency_tolerance: u32,
    symbol_rate_min: u32,
    symbol_rate_max: u32,
    symbol_rate_tolerance: u32,
    notifier_delay: u32,
    caps: u32,
}

/// `struct dvb_diseqc_master_cmd`
#[repr(C)]
#[allow(dead_code)]
struct DvbDiseqcMasterCmd {
    msg: [u8; 6],
    msg_len: u8,
}

/// `struct dvb_frontend_parameters`. The kernel's union is laid out as seven
/// words; each delivery system fills a prefix of it.
#[repr(C)]
#[allow(dead_code)]
#[derive(Debug, Default, PartialEq, Eq)]
struct DvbFrontendParameters {
    frequency: u32,
    inversion: u32,
    u: [u32; 7],
}

impl From<&TuningParams> for DvbFrontendParameters {
    fn from(params: &TuningParams) -> Self {
        let mut raw = DvbFrontendParameters {
            frequency: params.frequency(),
            inversion: params.inversion(),
            u: [0; 7],
        };
        match params {
            TuningParams::Satellite(p) => {
                raw.u[0] = p.symbol_rate;
                raw.u[1] = p.fec;
            }
            TuningParams::Cable(p) => {
                raw.u[0] = p.symbol_rate;
                raw.u[1] = p.fec;
                raw.u[2] = p.modulation;
            }
            TuningParams::Terrestrial(p) => {
                raw.u = [
                    p.bandwidth,
                    p.code_rate_hp,
                    p.code_rate_lp,
                    p.constellation,
                    p.transmission_mode,
                    p.guard_interval,
                    p.hierarchy,
                ];
            }
        }
        raw
    }
}

/// `struct dmx_pes_filter_params`
#[repr(C)]
#[allow(dead_code)]
struct DmxPesFilterParams {
    pid: u16,
    input: u32,
    output: u32,
    pes_type: u32,
    flags: u32,
}

const DMX_IN_FRONTEND: u32 = 0;
const DMX_OUT_TS_TAP: u32 = 2;
const DMX_PES_OTHER: u32 = 20;
const DMX_IMMEDIATE_START: u32 = 4;

nix::ioctl_read!(fe_get_info, b'o', 61, DvbFrontendInfo);
nix::ioctl_write_ptr!(fe_diseqc_send_master_cmd, b'o', 63, DvbDiseqcMasterCmd);
nix::ioctl_write_int_bad!(fe_diseqc_send_burst, nix::request_code_none!(b'o', 65));
nix::ioctl_write_int_bad!(fe_set_tone, nix::request_code_none!(b'o', 66));
nix::ioctl_write_int_bad!(fe_set_voltage, nix::request_code_none!(b'o', 67));
nix::ioctl_read!(fe_read_status, b'o', 69, u32);
nix::ioctl_write_ptr!(fe_set_frontend, b'o', 76, DvbFrontendParameters);
nix::ioctl_none!(dmx_stop, b'o', 42);
nix::ioctl_write_ptr!(dmx_set_pes_filter, b'o', 44, DmxPesFilterParams);

/// Adapter directory such as `/dev/dvb/adapter0`.
#[derive(Debug, Clone)]
pub struct LinuxAdapter {
    path: PathBuf,
}

impl LinuxAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open_node(&self, node: &str, nonblocking: bool) -> Result<(File, PathBuf), DeviceError> {
        let path = self.path.join(node);
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if nonblocking {
            options.custom_flags(OFlag::O_NONBLOCK.bits());
        }
        let file = options
            .open(&path)
            .map_err(|e| DeviceError::new("open", &path, e))?;
        debug!("[Tuner] Opened {:?}", path);
        Ok((file, path))
    }
}

impl Adapter for LinuxAdapter {
    type Frontend = LinuxFrontend;
    type Demux = LinuxDemux;
    type Dvr = LinuxDvr;

    fn path(&self) -> &Path {
        &self.path
    }

    fn open_frontend(&self) -> Result<LinuxFrontend, DeviceError> {
        let (file, path) = self.open_node("frontend0", true)?;
        Ok(LinuxFrontend { file, path })
    }

    fn open_demux(&self) -> Result<LinuxDemux, DeviceError> {
        let (file, path) = self.open_node("demux0", false)?;
        Ok(LinuxDemux { file, path })
    }

    fn open_dvr(&self) -> Result<LinuxDvr, DeviceError> {
        let (file, _) = self.open_node("dvr0", true)?;
        Ok(LinuxDvr { file })
    }
}

pub struct LinuxFrontend {
    file: File,
    path: PathBuf,
}

impl LinuxFrontend {
    fn check(&self, op: &'static str, res: nix::Result<i32>) -> Result<(), DeviceError> {
        res.map(|_| ())
            .map_err(|errno| DeviceError::new(op, &self.path, io::Error::from(errno)))
    }
}

impl Frontend for LinuxFrontend {
    fn frontend_type(&mut self) -> Result<FrontendType, DeviceError> {
        let mut info = DvbFrontendInfo {
            name: [0; 128],
            fe_type: 0,
            frequency_min: 0,
            frequency_max: 0,
            frequency_stepsize: 0,
            frequency_tolerance: 0,
            symbol_rate_min: 0,
            symbol_rate_max: 0,
            symbol_rate_tolerance: 0,
            notifier_delay: 0,
            caps: 0,
        };
        let res = unsafe { fe_get_info(self.file.as_raw_fd(), &mut info) };
        self.check("FE_GET_INFO", res)?;

        let name_len = info.name.iter().position(|&b| b == 0).unwrap_or(info.name.len());
        debug!(
            "[Tuner] Frontend {:?}: type {}, {}..{} kHz",
            String::from_utf8_lossy(&info.name[..name_len]),
            info.fe_type,
            info.frequency_min,
            info.frequency_max
        );
        FrontendType::from_raw(info.fe_type).map_err(|e| {
            DeviceError::new(
                "FE_GET_INFO",
                &self.path,
                io::Error::new(io::ErrorKind::Unsupported, e.to_string()),
            )
        })
    }

    fn set_tone(&mut self, tone: Tone) -> Result<(), DeviceError> {
        let res = unsafe { fe_set_tone(self.file.as_raw_fd(), tone.as_raw()) };
        self.check("FE_SET_TONE", res)
    }

    fn set_voltage(&mut self, voltage: Voltage) -> Result<(), DeviceError> {
        let res = unsafe { fe_set_voltage(self.file.as_raw_fd(), voltage.as_raw()) };
        self.check("FE_SET_VOLTAGE", res)
    }

    fn send_diseqc(&mut self, cmd: &DiseqcCommand) -> Result<(), DeviceError> {
        let raw = DvbDiseqcMasterCmd {
            msg: cmd.msg,
            msg_len: cmd.len,
        };
        let res = unsafe { fe_diseqc_send_master_cmd(self.file.as_raw_fd(), &raw) };
        self.check("FE_DISEQC_SEND_MASTER_CMD", res)
    }

    fn send_burst(&mut self, burst: Burst) -> Result<(), DeviceError> {
        let res = unsafe { fe_diseqc_send_burst(self.file.as_raw_fd(), burst.as_raw()) };
        self.check("FE_DISEQC_SEND_BURST", res)
    }

    fn set_frontend(&mut self, params: &TuningParams) -> Result<(), DeviceError> {
        let raw = DvbFrontendParameters::from(params);
        let res = unsafe { fe_set_frontend(self.file.as_raw_fd(), &raw) };
        self.check("FE_SET_FRONTEND", res)
    }

    fn read_status(&mut self) -> Result<FrontendStatus, DeviceError> {
        let mut status = 0u32;
        let res = unsafe { fe_read_status(self.file.as_raw_fd(), &mut status) };
        self.check("FE_READ_STATUS", res)?;
        Ok(FrontendStatus(status))
    }
}

pub struct LinuxDemux {
    file: File,
    path: PathBuf,
}

impl DemuxFilter for LinuxDemux {
    fn set_pes_filter(&mut self, pid: u16) -> Result<(), DeviceError> {
        let params = DmxPesFilterParams {
            pid,
            input: DMX_IN_FRONTEND,
            output: DMX_OUT_TS_TAP,
            pes_type: DMX_PES_OTHER,
            flags: DMX_IMMEDIATE_START,
        };
        unsafe { dmx_set_pes_filter(self.file.as_raw_fd(), &params) }
            .map(|_| ())
            .map_err(|errno| DeviceError::new("DMX_SET_PES_FILTER", &self.path, errno.into()))
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        unsafe { dmx_stop(self.file.as_raw_fd()) }
            .map(|_| ())
            .map_err(|errno| DeviceError::new("DMX_STOP", &self.path, errno.into()))
    }
}

pub struct LinuxDvr {
    file: File,
}

impl Read for LinuxDvr {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl DvrSource for LinuxDvr {
    fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{CableParams, Polarization, SatelliteParams, TerrestrialParams};

    #[test]
    fn test_struct_sizes_match_kernel_abi() {
        assert_eq!(std::mem::size_of::<DvbFrontendInfo>(), 168);
        assert_eq!(std::mem::size_of::<DvbDiseqcMasterCmd>(), 7);
        assert_eq!(std::mem::size_of::<DvbFrontendParameters>(), 36);
        assert_eq!(std::mem::size_of::<DmxPesFilterParams>(), 20);
    }

    #[test]
    fn test_frontend_parameters_layout() {
        let sat = TuningParams::Satellite(SatelliteParams {
            frequency: 1_497_000,
            inversion: 2,
            symbol_rate: 27_500_000,
            fec: 9,
            sat_no: 0,
            tone: Tone::Off,
            polarization: Polarization::Horizontal,
        });
        let raw = DvbFrontendParameters::from(&sat);
        assert_eq!(raw.frequency, 1_497_000);
        assert_eq!(raw.u[..2], [27_500_000, 9]);
        assert_eq!(raw.u[2..], [0; 5]);

        let cable = TuningParams::Cable(CableParams {
            frequency: 410_000_000,
            inversion: 0,
            symbol_rate: 6_900_000,
            fec: 0,
            modulation: 3,
        });
        assert_eq!(DvbFrontendParameters::from(&cable).u[..3], [6_900_000, 0, 3]);

        let terrestrial = TuningParams::Terrestrial(TerrestrialParams {
            frequency: 505_833_330,
            inversion: 2,
            bandwidth: 0,
            code_rate_hp: 3,
            code_rate_lp: 3,
            constellation: 1,
            transmission_mode: 0,
            guard_interval: 0,
            hierarchy: 0,
        });
        assert_eq!(
            DvbFrontendParameters::from(&terrestrial).u,
            [0, 3, 3, 1, 0, 0, 0]
        );
    }

    #[test]
    fn test_open_missing_adapter() {
        let adapter = LinuxAdapter::new("/nonexistent/adapter9");
        let err = adapter.open_frontend().err().unwrap();
        assert_eq!(err.op, "open");
        assert!(err.path.ends_with("frontend0"));
    }
}
