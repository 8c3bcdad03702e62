//! Cooperative task primitives.
//!
//! A task is a resumable computation. Every time the scheduler resumes it,
//! it runs until it either names the I/O it is waiting for
//! ([`Step::Wait`]), asks to be requeued ([`Step::Yield`]), or finishes
//! ([`Step::Done`]).
//!
//! Tasks come in two flavours:
//! - hand-written state machines implementing [`Task`] (or built with
//!   [`from_fn`]),
//! - `async` blocks, adapted by [`FutureTask`] and driven through the
//!   free functions of this module ([`spawn`], [`yield_now`], ...).

mod future;

pub use future::{FutureTask, abort, cancel, id, receive, send, spawn};
pub(crate) use future::{Suspend, wait};

pub use crate::runtime::yield_now::yield_now;

use crate::runtime::intent::{Intent, Resume};
use crate::runtime::scheduler::Handle;

use std::any::Any;
use std::fmt;
use std::num::NonZeroU64;
use std::os::fd::RawFd;

/// Unique identifier of a task within one scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(NonZeroU64);

impl TaskId {
    pub(crate) fn from_u64(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    /// Returns the raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a task asks of the scheduler when it hands control back.
#[derive(Debug)]
pub enum Step {
    /// Suspend until the intent's descriptor is ready, then resume with the
    /// intent's result.
    Wait(Intent),

    /// Requeue at the back of the ready queue and resume with
    /// [`Resume::Unit`].
    Yield,

    /// Suspend until a message is in the task's mailbox, then resume with
    /// [`Resume::Message`].
    Receive,

    /// The task has finished and can be dropped.
    Done,

    /// The task suspended without naming a reason. The scheduler treats this
    /// as a broken task and aborts the run.
    Stalled,
}

impl Step {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Step::Wait(_) => "wait",
            Step::Yield => "yield",
            Step::Receive => "receive",
            Step::Done => "done",
            Step::Stalled => "stalled",
        }
    }
}

/// Addressee of a message: a task id, or a name given at submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    Id(TaskId),
    Name(String),
}

impl From<TaskId> for Recipient {
    fn from(id: TaskId) -> Self {
        Recipient::Id(id)
    }
}

impl From<&str> for Recipient {
    fn from(name: &str) -> Self {
        Recipient::Name(name.to_owned())
    }
}

impl From<String> for Recipient {
    fn from(name: String) -> Self {
        Recipient::Name(name)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Id(id) => write!(f, "{id}"),
            Recipient::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// A unit of cooperative work.
///
/// `resume` is called with [`Resume::Unit`] the first time, and afterwards
/// with the result of whatever the previous [`Step`] asked for.
pub trait Task {
    fn resume(&mut self, cx: &mut Context<'_>, value: Resume) -> Step;
}

impl<T: Task + ?Sized> Task for Box<T> {
    fn resume(&mut self, cx: &mut Context<'_>, value: Resume) -> Step {
        (**self).resume(cx, value)
    }
}

/// Scheduler access available to a task while it runs.
pub struct Context<'a> {
    id: TaskId,
    handle: &'a Handle,
}

impl<'a> Context<'a> {
    pub(crate) fn new(id: TaskId, handle: &'a Handle) -> Self {
        Self { id, handle }
    }

    /// Identifier of the running task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Handle to the scheduler running this task.
    pub fn handle(&self) -> &'a Handle {
        self.handle
    }

    /// Spawns a new task. It becomes runnable once the current task hands
    /// control back.
    pub fn spawn<T: Task + 'static>(&self, task: T) -> TaskId {
        self.handle.spawn(task)
    }

    /// Cancels every task waiting on `fd`.
    pub fn cancel(&self, fd: RawFd) {
        self.handle.cancel(fd);
    }

    /// Drops the task `id` wherever it currently is.
    pub fn abort(&self, id: TaskId) {
        self.handle.abort(id);
    }

    /// Puts `message` in the mailbox of `to`.
    pub fn send<M: Any>(&self, to: impl Into<Recipient>, message: M) {
        self.handle.send(to, message);
    }
}

/// A task backed by a closure.
///
/// Created by [`from_fn`].
pub struct FromFn<F>(F);

/// Builds a [`Task`] from a closure called on every resumption.
///
/// ```rust,ignore
/// let mut n = 3;
/// scheduler.submit(task::from_fn(move |_, _| {
///     if n == 0 {
///         return Step::Done;
///     }
///     n -= 1;
///     Step::Yield
/// }));
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut(&mut Context<'_>, Resume) -> Step,
{
    FromFn(f)
}

impl<F> Task for FromFn<F>
where
    F: FnMut(&mut Context<'_>, Resume) -> Step,
{
    fn resume(&mut self, cx: &mut Context<'_>, value: Resume) -> Step {
        (self.0)(cx, value)
    }
}

/// Where a live task is stored, plus the id that must still match for the
/// reference to be valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TaskRef {
    pub(crate) key: usize,
    pub(crate) id: TaskId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_display() {
        let id = TaskId::from_u64(7).unwrap();
        assert_eq!(id.to_string(), "#7");
        assert_eq!(id.as_u64(), 7);
        assert!(TaskId::from_u64(0).is_none());
    }

    #[test]
    fn test_recipient_from_name_or_id() {
        let id = TaskId::from_u64(3).unwrap();

        assert_eq!(Recipient::from(id), Recipient::Id(id));
        assert_eq!(Recipient::from("printer"), Recipient::Name("printer".into()));
        assert_eq!(Recipient::from(id).to_string(), "#3");
        assert_eq!(Recipient::from("printer").to_string(), "\"printer\"");
    }

    #[test]
    fn test_from_fn_counts_down() {
        let handle = Handle::new();
        let id = TaskId::from_u64(1).unwrap();
        let mut cx = Context::new(id, &handle);

        let mut n = 2;
        let mut task = from_fn(move |_, _| {
            if n == 0 {
                return Step::Done;
            }
            n -= 1;
            Step::Yield
        });

        assert!(matches!(task.resume(&mut cx, Resume::Unit), Step::Yield));
        assert!(matches!(task.resume(&mut cx, Resume::Unit), Step::Yield));
        assert!(matches!(task.resume(&mut cx, Resume::Unit), Step::Done));
    }
}
