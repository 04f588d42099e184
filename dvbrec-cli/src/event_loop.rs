//! Single-threaded poll loop driving the device's data path.

use std::os::fd::{BorrowedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dvbrec::tuner::Adapter;
use dvbrec::{Device, ReadinessNotifier};
use log::{debug, trace};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

/// Longest time the loop sleeps before checking the stop flag again.
const TICK: Duration = Duration::from_millis(250);

/// Keeps the descriptors the device asked to be watched.
#[derive(Debug, Default)]
pub(crate) struct PollNotifier {
    fds: Vec<RawFd>,
}

impl PollNotifier {
    pub fn fds(&self) -> &[RawFd] {
        &self.fds
    }
}

impl ReadinessNotifier for PollNotifier {
    fn register(&mut self, fd: RawFd) {
        if !self.fds.contains(&fd) {
            debug!("[EventLoop] Watching fd {}", fd);
            self.fds.push(fd);
        }
    }

    fn unregister(&mut self, fd: RawFd) {
        debug!("[EventLoop] No longer watching fd {}", fd);
        self.fds.retain(|&other| other != fd);
    }
}

/// Wait up to `timeout` for any of `fds` to become readable.
///
/// Returns the readable descriptors; empty on timeout or interruption.
pub(crate) fn wait_readable(fds: &[RawFd], timeout: Duration) -> nix::Result<Vec<RawFd>> {
    if fds.is_empty() {
        std::thread::sleep(timeout);
        return Ok(Vec::new());
    }
    let mut poll_fds: Vec<PollFd> = fds
        .iter()
        // SAFETY: the descriptors stay open while they are registered, and
        // the registration cannot change while this function runs.
        .map(|&fd| PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN))
        .collect();
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);

    match poll(&mut poll_fds, PollTimeout::from(millis)) {
        Ok(0) => Ok(Vec::new()),
        Ok(_) => Ok(fds
            .iter()
            .zip(&poll_fds)
            .filter(|(_, pfd)| {
                pfd.revents()
                    .map_or(false, |r| r.intersects(PollFlags::POLLIN | PollFlags::POLLERR))
            })
            .map(|(&fd, _)| fd)
            .collect()),
        Err(Errno::EINTR) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Drive `device` until `stop` is set or `until` has passed.
///
/// Each readable event results in exactly one `read_fd_data` call.
pub(crate) fn run<A: Adapter>(
    device: &mut Device<A, PollNotifier>,
    stop: &AtomicBool,
    until: Option<Instant>,
) -> nix::Result<()> {
    let mut events: u64 = 0;
    let mut bytes: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        let timeout = match until {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    debug!("[EventLoop] Duration elapsed");
                    break;
                }
                (deadline - now).min(TICK)
            }
            None => TICK,
        };

        let fds = device.notifier().fds().to_vec();
        for _ in wait_readable(&fds, timeout)? {
            let n = device.read_fd_data();
            trace!("[EventLoop] read {} bytes", n);
            events += 1;
            bytes += n as u64;
        }
    }
    debug!("[EventLoop] Stopped after {} events, {} bytes", events, bytes);
    Ok(())
}
