//! Readiness poller.
//!
//! This module wraps `poll(2)`, the OS primitive that answers "which of
//! these descriptors are ready?". Both the task scheduler and the handler
//! event loop call into it, and it is the only place in the crate where the
//! thread is allowed to block.
//!
//! The poller is stateless between calls: every call receives the complete
//! set of descriptors currently interesting for reading and for writing and
//! returns the ready subsets.

pub(crate) mod unix;
pub(crate) mod waker;

pub(crate) use unix as platform;
pub(crate) use waker::Waker;

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, pollfd};
use std::io;
use std::os::fd::RawFd;

/// Direction of interest for a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Readable: data, a pending connection, or end-of-stream is available.
    Read,
    /// Writable: the send buffer has room.
    Write,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// The outcome of one call to [`Poller::poll`].
///
/// Descriptors appear in the order `poll(2)` reported them, which is the
/// order they were passed in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Descriptors ready for reading (including hang-up and error states,
    /// which a read will surface).
    pub readable: Vec<RawFd>,

    /// Descriptors ready for writing (including error states).
    pub writable: Vec<RawFd>,

    /// Descriptors the kernel reported as not open (`POLLNVAL`).
    pub invalid: Vec<RawFd>,
}

impl Readiness {
    /// Returns `true` if no descriptor was reported.
    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty() && self.invalid.is_empty()
    }
}

/// A reusable `poll(2)` wrapper.
///
/// The poller keeps its `pollfd` buffer between calls to avoid reallocating
/// on every tick.
pub struct Poller {
    fds: Vec<pollfd>,
}

impl Poller {
    /// Creates a poller with room for `capacity` descriptors before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fds: Vec::with_capacity(capacity),
        }
    }

    /// Creates a poller with a default capacity.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Blocks until at least one descriptor is ready.
    ///
    /// `read` and `write` are the descriptors interesting in each direction;
    /// a descriptor may appear in both. There is no timeout: callers only
    /// poll when they have nothing else to do.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when both sets are empty, since such a call
    /// could never return. Any other OS error is propagated unchanged. An
    /// interrupted call (`EINTR`) is not an error: it yields an empty
    /// [`Readiness`].
    pub fn poll<R, W>(&mut self, read: R, write: W) -> io::Result<Readiness>
    where
        R: IntoIterator<Item = RawFd>,
        W: IntoIterator<Item = RawFd>,
    {
        self.fds.clear();

        for fd in read {
            self.interest(fd, POLLIN);
        }
        for fd in write {
            self.interest(fd, POLLOUT);
        }

        if self.fds.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "poll called with no descriptors",
            ));
        }

        match platform::sys_poll(&mut self.fds) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                return Ok(Readiness::default());
            }
            Err(err) => return Err(err),
        }

        let mut readiness = Readiness::default();

        for entry in &self.fds {
            let revents = entry.revents;

            if revents == 0 {
                continue;
            }

            if revents & POLLNVAL != 0 {
                readiness.invalid.push(entry.fd);
                continue;
            }

            if entry.events & POLLIN != 0 && revents & (POLLIN | POLLHUP | POLLERR) != 0 {
                readiness.readable.push(entry.fd);
            }
        }

        for entry in &self.fds {
            let revents = entry.revents;

            if revents & POLLNVAL != 0 {
                continue;
            }

            if entry.events & POLLOUT != 0 && revents & (POLLOUT | POLLHUP | POLLERR) != 0 {
                readiness.writable.push(entry.fd);
            }
        }

        Ok(readiness)
    }

    fn interest(&mut self, fd: RawFd, events: libc::c_short) {
        if let Some(entry) = self.fds.iter_mut().find(|e| e.fd == fd) {
            entry.events |= events;
        } else {
            self.fds.push(pollfd {
                fd,
                events,
                revents: 0,
            });
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::platform::{sys_close, sys_ctime, sys_socketpair, sys_write};

    #[test]
    fn test_poll_rejects_empty_sets() {
        let mut poller = Poller::new();
        let err = poller
            .poll(std::iter::empty(), std::iter::empty())
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_poll_reports_writable_socket() {
        let (a, b) = sys_socketpair().unwrap();
        let mut poller = Poller::new();

        let ready = poller.poll(std::iter::empty(), [a]).unwrap();
        assert_eq!(ready.writable, vec![a]);
        assert!(ready.readable.is_empty());

        sys_close(a);
        sys_close(b);
    }

    #[test]
    fn test_poll_reports_readable_after_write() {
        let (a, b) = sys_socketpair().unwrap();
        let mut poller = Poller::new();

        sys_write(b, b"x").unwrap();

        let ready = poller.poll([a], std::iter::empty()).unwrap();
        assert_eq!(ready.readable, vec![a]);

        sys_close(a);
        sys_close(b);
    }

    #[test]
    fn test_poll_merges_both_directions() {
        let (a, b) = sys_socketpair().unwrap();
        let mut poller = Poller::new();

        sys_write(b, b"x").unwrap();

        let ready = poller.poll([a], [a]).unwrap();
        assert_eq!(ready.readable, vec![a]);
        assert_eq!(ready.writable, vec![a]);

        sys_close(a);
        sys_close(b);
    }

    #[test]
    fn test_poll_reports_hangup_as_readable() {
        let (a, b) = sys_socketpair().unwrap();
        let mut poller = Poller::new();

        sys_close(b);

        let ready = poller.poll([a], std::iter::empty()).unwrap();
        assert_eq!(ready.readable, vec![a]);

        sys_close(a);
    }

    #[test]
    fn test_poll_reports_closed_descriptor_as_invalid() {
        // Far above any descriptor a test process opens.
        let fd = RawFd::MAX - 1;
        let mut poller = Poller::new();

        let ready = poller.poll([fd], std::iter::empty()).unwrap();
        assert_eq!(ready.invalid, vec![fd]);
        assert!(ready.readable.is_empty());
    }

    #[test]
    fn test_ctime_layout() {
        let now = sys_ctime().unwrap();
        let fields: Vec<&str> = now.split_whitespace().collect();

        assert_eq!(now.len(), 24, "{now:?}");
        assert_eq!(fields.len(), 5, "{now:?}");
        assert_eq!(fields[3].len(), 8);
        assert!(fields[4].parse::<u32>().unwrap() >= 2024);
    }
}
