use super::platform::{is_retryable, sys_close, sys_read, sys_write};

use std::io;
use std::os::fd::RawFd;

/// A descriptor other threads can write to in order to interrupt a blocking
/// poll.
///
/// On Linux this is an `eventfd`; elsewhere it is a self-pipe. The poller
/// watches [`fd`](Self::fd) for readability; [`wake`](Self::wake) makes it
/// readable and [`drain`](Self::drain) resets it.
pub(crate) struct Waker {
    read: RawFd,
    write: RawFd,
}

// The descriptors are plain integers owned by this value; the kernel objects
// behind them are safe to use from any thread.
unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}

impl Waker {
    #[cfg(target_os = "linux")]
    pub(crate) fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { read: fd, write: fd })
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn new() -> io::Result<Self> {
        let (read, write) = super::platform::sys_pipe()?;

        Ok(Self { read, write })
    }

    /// The descriptor to watch for readability.
    pub(crate) fn fd(&self) -> RawFd {
        self.read
    }

    /// Makes [`fd`](Self::fd) readable.
    ///
    /// A full pipe or a saturated eventfd counter already means "readable",
    /// so `EAGAIN` is ignored.
    pub(crate) fn wake(&self) {
        let buf = 1u64.to_ne_bytes();
        if let Err(err) = sys_write(self.write, &buf) {
            if !is_retryable(&err) {
                tracing::warn!(%err, fd = self.write, "failed to signal wakeup descriptor");
            }
        }
    }

    /// Consumes every pending wakeup.
    pub(crate) fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            match sys_read(self.read, &mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        sys_close(self.read);
        if self.write != self.read {
            sys_close(self.write);
        }
    }
}

