//! Host integration: who watches the DVR descriptor.

use std::os::fd::RawFd;

/// Implemented by the host's event loop.
///
/// The device registers the DVR descriptor while at least one recording is
/// running. Whenever it is readable the host calls
/// [`Device::read_fd_data`](crate::device::Device::read_fd_data) once.
pub trait ReadinessNotifier {
    fn register(&mut self, fd: RawFd);
    fn unregister(&mut self, fd: RawFd);
}

/// Records registrations, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    pub events: Vec<(bool, RawFd)>,
}

#[cfg(test)]
impl RecordingNotifier {
    /// Descriptors currently registered.
    pub fn registered(&self) -> Vec<RawFd> {
        let mut fds = Vec::new();
        for &(register, fd) in &self.events {
            if register {
                fds.push(fd);
            } else {
                fds.retain(|&other| other != fd);
            }
        }
        fds
    }
}

#[cfg(test)]
impl ReadinessNotifier for RecordingNotifier {
    fn register(&mut self, fd: RawFd) {
        self.events.push((true, fd));
    }

    fn unregister(&mut self, fd: RawFd) {
        self.events.push((false, fd));
    }
}
