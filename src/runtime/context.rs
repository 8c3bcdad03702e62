use crate::runtime::intent::{Intent, Resume};
use crate::runtime::scheduler::Handle;
use crate::runtime::task::TaskId;

use std::cell::RefCell;
use std::mem;
use std::os::fd::RawFd;

/// What an `async` task asked for during one poll.
pub(crate) enum Request {
    Wait(Intent),
    Yield,
    Receive,
}

/// Per-resumption state shared between a [`FutureTask`] and the leaf futures
/// it polls.
///
/// [`FutureTask`]: crate::task::FutureTask
pub(crate) struct Frame {
    pub(crate) id: TaskId,
    pub(crate) handle: Handle,
    /// Value the task was resumed with, taken by the leaf that waited for it.
    pub(crate) resume: Option<Resume>,
    /// Suspension reason submitted by a leaf future.
    pub(crate) request: Option<Request>,
    /// Set when more than one leaf tried to suspend in the same poll.
    pub(crate) conflict: bool,
}

impl Frame {
    pub(crate) fn new(id: TaskId, handle: Handle, resume: Resume) -> Self {
        Self {
            id,
            handle,
            resume: Some(resume),
            request: None,
            conflict: false,
        }
    }
}

thread_local! {
    /// Frame of the task currently being polled on this thread.
    ///
    /// Installed for the duration of a single `FutureTask::resume` so that
    /// leaf futures (socket operations, `yield_now`, `spawn`) can reach the
    /// scheduler without explicit parameter passing.
    static CURRENT_FRAME: RefCell<Option<Frame>> = const { RefCell::new(None) };

    /// Descriptors closed on this thread while a scheduler runs.
    static CLOSED: RefCell<Option<Vec<RawFd>>> = const { RefCell::new(None) };
}

/// Installs `frame` for the duration of `f` and hands it back afterwards.
///
/// The previous frame, if any, is restored.
pub(crate) fn enter<R>(frame: Frame, f: impl FnOnce() -> R) -> (R, Frame) {
    let prev = CURRENT_FRAME.with(|current| current.replace(Some(frame)));

    let out = f();

    let frame = CURRENT_FRAME.with(|current| current.replace(prev));

    match frame {
        Some(frame) => (out, frame),
        None => unreachable!("task frame removed while the task was running"),
    }
}

/// Runs `f` against the current frame, if a task is running.
pub(crate) fn with_frame<R>(f: impl FnOnce(&mut Frame) -> R) -> Option<R> {
    CURRENT_FRAME.with(|current| current.borrow_mut().as_mut().map(f))
}

/// Like [`with_frame`], for operations that only make sense inside a task.
///
/// # Panics
///
/// Panics when called outside of a spindle task.
pub(crate) fn expect_frame<R>(what: &str, f: impl FnOnce(&mut Frame) -> R) -> R {
    match with_frame(f) {
        Some(out) => out,
        None => panic!("{what} must be called from within a spindle task"),
    }
}

/// Records descriptor closes for as long as it is alive.
///
/// A scheduler installs one for the duration of `run`, so a descriptor
/// number that a task closes and the kernel hands out again is never
/// mistaken for the descriptor other tasks were waiting on. Nested guards
/// keep their own log.
pub(crate) struct CloseLog {
    prev: Option<Vec<RawFd>>,
}

impl CloseLog {
    pub(crate) fn install() -> Self {
        let prev = CLOSED.with(|closed| closed.replace(Some(Vec::new())));
        Self { prev }
    }
}

impl Drop for CloseLog {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CLOSED.with(|closed| closed.replace(prev));
    }
}

/// Takes the descriptors closed since the last call.
pub(crate) fn take_closed() -> Vec<RawFd> {
    CLOSED.with(|closed| match closed.try_borrow_mut() {
        Ok(mut closed) => closed.as_mut().map(mem::take).unwrap_or_default(),
        Err(_) => Vec::new(),
    })
}

/// Notes that `fd` is being closed, if a scheduler is running.
pub(crate) fn record_close(fd: RawFd) {
    // Sockets may be dropped during thread teardown.
    let _ = CLOSED.try_with(|closed| {
        if let Ok(mut closed) = closed.try_borrow_mut() {
            if let Some(log) = closed.as_mut() {
                log.push(fd);
            }
        }
    });
}
