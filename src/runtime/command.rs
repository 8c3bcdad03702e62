use crate::runtime::task::{Recipient, Task, TaskId};

use std::any::Any;
use std::fmt;
use std::os::fd::RawFd;

/// Requests queued through a [`Handle`](crate::Handle) while a task runs.
///
/// The scheduler cannot be borrowed mutably while it is resuming a task, so
/// tasks leave these in the handle's inbox and the scheduler applies them as
/// soon as the task hands control back.
pub(crate) enum Command {
    Spawn { id: TaskId, task: Box<dyn Task> },
    Cancel { fd: RawFd },
    Abort { id: TaskId },
    Send { to: Recipient, message: Box<dyn Any> },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Spawn { id, .. } => f.debug_struct("Spawn").field("id", id).finish(),
            Command::Cancel { fd } => f.debug_struct("Cancel").field("fd", fd).finish(),
            Command::Abort { id } => f.debug_struct("Abort").field("id", id).finish(),
            Command::Send { to, .. } => f.debug_struct("Send").field("to", to).finish(),
        }
    }
}
