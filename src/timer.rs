//! One-shot timer on the monotonic clock, backed by a timerfd.

use std::os::unix::io::{AsFd, BorrowedFd, OwnedFd};
use std::time::Duration;

use rustix::io::Errno;
use rustix::time::{
    timerfd_create, timerfd_settime, Itimerspec, TimerfdClockId, TimerfdFlags, TimerfdTimerFlags,
    Timespec,
};

/// A one-shot CLOCK_MONOTONIC timer.
///
/// The fd is registered with the host event loop next to the owning device's
/// event fd; expiry is observed as readability.
#[derive(Debug)]
pub(crate) struct Timer {
    fd: OwnedFd,
}

impl Timer {
    pub(crate) fn new() -> Result<Timer, Errno> {
        let fd = timerfd_create(
            TimerfdClockId::Monotonic,
            TimerfdFlags::CLOEXEC | TimerfdFlags::NONBLOCK,
        )?;
        Ok(Timer { fd })
    }

    /// Arms the timer to fire once after `timeout`.
    ///
    /// A zero timeout disarms a previously armed timer.
    pub(crate) fn set(&self, timeout: Duration) -> Result<(), Errno> {
        let spec = Itimerspec {
            it_interval: Timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
            it_value: Timespec {
                tv_sec: timeout.as_secs() as _,
                tv_nsec: timeout.subsec_nanos() as _,
            },
        };
        timerfd_settime(&self.fd, TimerfdTimerFlags::empty(), &spec)?;
        Ok(())
    }

    /// Consumes the expiration count after a readability wakeup.
    ///
    /// Returns zero when nothing had actually expired. A short read can only
    /// happen with fd misuse; it is logged and treated as no expiry.
    pub(crate) fn acknowledge(&self) -> Result<u64, Errno> {
        let mut buf = [0u8; 8];
        match rustix::io::read(&self.fd, &mut buf) {
            Ok(8) => Ok(u64::from_ne_bytes(buf)),
            Ok(n) => {
                tracing::error!(len = n, "short read from timer fd");
                Ok(0)
            }
            Err(Errno::AGAIN) => Ok(0),
            Err(err) => Err(err),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        let spec = rustix::time::timerfd_gettime(&self.fd).expect("timerfd_gettime");
        spec.it_value.tv_sec != 0 || spec.it_value.tv_nsec != 0
    }
}

impl AsFd for Timer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
