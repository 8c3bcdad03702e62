//! Suspension reasons and the values that answer them.
//!
//! An [`Intent`] is what a task hands to the scheduler when it cannot make
//! progress: "read up to `max` bytes from `fd`", "write `data` to `fd`",
//! "accept a connection on `fd`". The scheduler parks it in the waiting
//! registry, and once the poller reports the descriptor ready it calls
//! [`Intent::resolve`] to perform the now non-blocking call. The outcome is
//! a [`Resume`], fed back to the task.

use crate::error::Result;
use crate::net::Socket;
use crate::reactor::poller::Direction;
use crate::reactor::poller::platform::{is_retryable, sys_accept, sys_read, sys_write};
use crate::runtime::registry::WaitingRegistry;
use crate::runtime::task::TaskRef;

use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;

/// A pending I/O operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Receive up to `max` bytes.
    Read { fd: RawFd, max: usize },
    /// Send as much of `data` as the descriptor accepts.
    Write { fd: RawFd, data: Vec<u8> },
    /// Accept one connection on a listening socket.
    Accept { fd: RawFd },
}

/// The value a task is resumed with.
#[derive(Debug)]
pub enum Resume {
    /// Nothing: first resumption, or after [`Step::Yield`](crate::task::Step::Yield).
    Unit,
    /// Bytes received. An empty vector means the peer closed its end.
    Read(io::Result<Vec<u8>>),
    /// Number of bytes sent, possibly fewer than requested.
    Wrote(io::Result<usize>),
    /// A freshly accepted connection and its peer address.
    Accepted(io::Result<(Socket, SocketAddr)>),
    /// A message from the task's mailbox, after [`Step::Receive`](crate::task::Step::Receive).
    Message(Box<dyn Any>),
}

impl Resume {
    /// Unwraps a [`Resume::Read`].
    ///
    /// Any other variant becomes an `InvalidData` error; tasks use this when
    /// they know what they asked for.
    pub fn into_read(self) -> io::Result<Vec<u8>> {
        match self {
            Resume::Read(result) => result,
            other => Err(mismatch("read", &other)),
        }
    }

    /// Unwraps a [`Resume::Wrote`].
    pub fn into_wrote(self) -> io::Result<usize> {
        match self {
            Resume::Wrote(result) => result,
            other => Err(mismatch("write", &other)),
        }
    }

    /// Unwraps a [`Resume::Accepted`].
    pub fn into_accepted(self) -> io::Result<(Socket, SocketAddr)> {
        match self {
            Resume::Accepted(result) => result,
            other => Err(mismatch("accept", &other)),
        }
    }

    /// Unwraps a [`Resume::Message`] holding a `T`.
    pub fn into_message<T: Any>(self) -> Option<T> {
        match self {
            Resume::Message(message) => message.downcast::<T>().ok().map(|message| *message),
            _ => None,
        }
    }
}

fn mismatch(expected: &str, got: &Resume) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("expected a {expected} result, resumed with {got:?}"),
    )
}

impl Intent {
    /// The descriptor this intent waits on.
    pub fn fd(&self) -> RawFd {
        match self {
            Intent::Read { fd, .. } | Intent::Write { fd, .. } | Intent::Accept { fd } => *fd,
        }
    }

    /// The readiness direction this intent waits for.
    pub fn direction(&self) -> Direction {
        match self {
            Intent::Read { .. } | Intent::Accept { .. } => Direction::Read,
            Intent::Write { .. } => Direction::Write,
        }
    }

    /// Parks this intent in `registry` on behalf of `task`.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRegistered`](crate::Error::AlreadyRegistered) if the
    /// descriptor already has a waiter in this direction.
    pub(crate) fn register(self, registry: &mut WaitingRegistry, task: TaskRef) -> Result<()> {
        registry.register(self, task)
    }

    /// Performs the operation, assuming the descriptor was reported ready.
    ///
    /// Returns `None` if the readiness turned out to be spurious
    /// (`EAGAIN`/`EINTR`); the caller should park the intent again. Any other
    /// failure is returned inside the [`Resume`] for the task to handle.
    pub fn resolve(&self) -> Option<Resume> {
        match self {
            Intent::Read { fd, max } => {
                let mut buf = vec![0u8; *max];
                match sys_read(*fd, &mut buf) {
                    Ok(n) => {
                        buf.truncate(n);
                        Some(Resume::Read(Ok(buf)))
                    }
                    Err(err) if is_retryable(&err) => None,
                    Err(err) => Some(Resume::Read(Err(err))),
                }
            }

            Intent::Write { fd, data } => match sys_write(*fd, data) {
                Ok(n) => Some(Resume::Wrote(Ok(n))),
                Err(err) if is_retryable(&err) => None,
                Err(err) => Some(Resume::Wrote(Err(err))),
            },

            Intent::Accept { fd } => match sys_accept(*fd) {
                Ok((client, addr)) => Some(Resume::Accepted(Ok((Socket::from_raw(client), addr)))),
                Err(err) if is_retryable(&err) => None,
                Err(err) => Some(Resume::Accepted(Err(err))),
            },
        }
    }

    /// The result to deliver instead of resolving, when the operation cannot
    /// be attempted at all (e.g. the descriptor was closed).
    pub fn fail(&self, err: io::Error) -> Resume {
        match self {
            Intent::Read { .. } => Resume::Read(Err(err)),
            Intent::Write { .. } => Resume::Wrote(Err(err)),
            Intent::Accept { .. } => Resume::Accepted(Err(err)),
        }
    }
}
