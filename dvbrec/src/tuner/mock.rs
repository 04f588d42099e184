//! In-memory adapter recording every device call, for tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{Adapter, DemuxFilter, DiseqcCommand, DvrSource, Frontend, FrontendStatus};
use crate::channels::{Burst, FrontendType, Tone, TuningParams, Voltage};
use crate::error::DeviceError;

pub const MOCK_DVR_FD: RawFd = 42;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenFrontend,
    CloseFrontend,
    SetTone(Tone),
    SetVoltage(Voltage),
    Diseqc(Vec<u8>),
    Burst(Burst),
    SetFrontend(u32),
    ReadStatus,
    OpenDemux,
    SetPesFilter(u16),
    Stop(u16),
    CloseDemux(u16),
    OpenDvr,
    CloseDvr,
}

struct MockState {
    frontend_type: FrontendType,
    calls: Vec<Call>,
    statuses: VecDeque<FrontendStatus>,
    default_status: FrontendStatus,
    dvr_data: VecDeque<Vec<u8>>,
    fail_set_frontend: bool,
    fail_pes_filter: bool,
    fail_open_dvr: bool,
}

#[derive(Clone)]
pub struct MockAdapter {
    path: PathBuf,
    state: Rc<RefCell<MockState>>,
}

impl MockAdapter {
    pub fn new(frontend_type: FrontendType) -> Self {
        Self {
            path: PathBuf::from("/dev/dvb/mock0"),
            state: Rc::new(RefCell::new(MockState {
                frontend_type,
                calls: Vec::new(),
                statuses: VecDeque::new(),
                default_status: FrontendStatus(
                    FrontendStatus::HAS_SIGNAL | FrontendStatus::HAS_LOCK,
                ),
                dvr_data: VecDeque::new(),
                fail_set_frontend: false,
                fail_pes_filter: false,
                fail_open_dvr: false,
            })),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn push_status(&self, status: FrontendStatus) {
        self.state.borrow_mut().statuses.push_back(status);
    }

    pub fn set_default_status(&self, status: FrontendStatus) {
        self.state.borrow_mut().default_status = status;
    }

    pub fn push_dvr_data(&self, data: Vec<u8>) {
        self.state.borrow_mut().dvr_data.push_back(data);
    }

    pub fn fail_set_frontend(&self, fail: bool) {
        self.state.borrow_mut().fail_set_frontend = fail;
    }

    pub fn fail_pes_filter(&self, fail: bool) {
        self.state.borrow_mut().fail_pes_filter = fail;
    }

    pub fn fail_open_dvr(&self, fail: bool) {
        self.state.borrow_mut().fail_open_dvr = fail;
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn error(&self, op: &'static str) -> DeviceError {
        DeviceError::new(op, &self.path, io::Error::from_raw_os_error(nix::libc::EIO))
    }
}

pub struct MockFrontend(MockAdapter);

impl Frontend for MockFrontend {
    fn frontend_type(&mut self) -> Result<FrontendType, DeviceError> {
        Ok(self.0.state.borrow().frontend_type)
    }

    fn set_tone(&mut self, tone: Tone) -> Result<(), DeviceError> {
        self.0.record(Call::SetTone(tone));
        Ok(())
    }

    fn set_voltage(&mut self, voltage: Voltage) -> Result<(), DeviceError> {
        self.0.record(Call::SetVoltage(voltage));
        Ok(())
    }

    fn send_diseqc(&mut self, cmd: &DiseqcCommand) -> Result<(), DeviceError> {
        self.0.record(Call::Diseqc(cmd.bytes().to_vec()));
        Ok(())
    }

    fn send_burst(&mut self, burst: Burst) -> Result<(), DeviceError> {
        self.0.record(Call::Burst(burst));
        Ok(())
    }

    fn set_frontend(&mut self, params: &TuningParams) -> Result<(), DeviceError> {
        self.0.record(Call::SetFrontend(params.frequency()));
        if self.0.state.borrow().fail_set_frontend {
            return Err(self.0.error("FE_SET_FRONTEND"));
        }
        Ok(())
    }

    fn read_status(&mut self) -> Result<FrontendStatus, DeviceError> {
        self.0.record(Call::ReadStatus);
        let mut state = self.0.state.borrow_mut();
        let default = state.default_status;
        Ok(state.statuses.pop_front().unwrap_or(default))
    }
}

impl Drop for MockFrontend {
    fn drop(&mut self) {
        self.0.record(Call::CloseFrontend);
    }
}

pub struct MockDemux {
    adapter: MockAdapter,
    pid: u16,
}

impl DemuxFilter for MockDemux {
    fn set_pes_filter(&mut self, pid: u16) -> Result<(), DeviceError> {
        self.pid = pid;
        self.adapter.record(Call::SetPesFilter(pid));
        if self.adapter.state.borrow().fail_pes_filter {
            return Err(self.adapter.error("DMX_SET_PES_FILTER"));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.adapter.record(Call::Stop(self.pid));
        Ok(())
    }
}

impl Drop for MockDemux {
    fn drop(&mut self) {
        self.adapter.record(Call::CloseDemux(self.pid));
    }
}

pub struct MockDvr(MockAdapter);

impl Read for MockDvr {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.state.borrow_mut();
        let Some(mut chunk) = state.dvr_data.pop_front() else {
            return Err(io::ErrorKind::WouldBlock.into());
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            state.dvr_data.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl DvrSource for MockDvr {
    fn raw_fd(&self) -> RawFd {
        MOCK_DVR_FD
    }
}

impl Drop for MockDvr {
    fn drop(&mut self) {
        self.0.record(Call::CloseDvr);
    }
}

impl Adapter for MockAdapter {
    type Frontend = MockFrontend;
    type Demux = MockDemux;
    type Dvr = MockDvr;

    fn path(&self) -> &Path {
        &self.path
    }

    fn open_frontend(&self) -> Result<MockFrontend, DeviceError> {
        self.record(Call::OpenFrontend);
        Ok(MockFrontend(self.clone()))
    }

    fn open_demux(&self) -> Result<MockDemux, DeviceError> {
        self.record(Call::OpenDemux);
        Ok(MockDemux {
            adapter: self.clone(),
            pid: 0,
        })
    }

    fn open_dvr(&self) -> Result<MockDvr, DeviceError> {
        if self.state.borrow().fail_open_dvr {
            return Err(self.error("open"));
        }
        self.record(Call::OpenDvr);
        Ok(MockDvr(self.clone()))
    }
}
