use crate::reactor::poller::Direction;
use crate::runtime::task::TaskId;

use std::io;
use std::os::fd::RawFd;

/// Errors that abort [`Scheduler::run`](crate::Scheduler::run) or
/// [`EventLoop::turn`](crate::reactor::EventLoop::turn).
///
/// Errors local to one task's I/O never show up here; they are delivered to
/// the task inside its [`Resume`](crate::Resume) value.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The readiness query itself failed.
    #[error("readiness poll failed: {0}")]
    Poll(#[source] io::Error),

    /// A task suspended without telling the scheduler what it waits for.
    #[error("task {task} suspended without yielding an intent")]
    UnrecognizedYield { task: TaskId },

    /// Two intents were registered for the same descriptor and direction.
    #[error("descriptor {fd} is already registered for {direction}")]
    AlreadyRegistered { fd: RawFd, direction: Direction },

    /// Tasks are alive but none is runnable and none is waiting on I/O.
    #[error("{live} live task(s) but nothing runnable and nothing to poll")]
    Deadlock { live: usize },

    /// The task driving `block_on` was cancelled before producing a value.
    #[error("task was cancelled before completing")]
    Cancelled,
}

impl Error {
    /// Returns `true` for errors caused by a task breaking the
    /// suspension contract rather than by the OS.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::UnrecognizedYield { .. } | Error::AlreadyRegistered { .. }
        )
    }
}

/// A specialized `Result` for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
