use super::{Context, Recipient, Step, Task, TaskId};
use crate::runtime::context::{self, Frame, Request};
use crate::runtime::intent::{Intent, Resume};

use std::any::Any;
use std::future::Future;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::task::{self as std_task, Poll, Waker};

/// Adapts a future into a [`Task`].
///
/// `async` blocks compile to state machines, which is exactly what a task
/// is. Each resumption polls the future once with the resume value
/// installed in the task frame; the leaf futures of this crate (socket
/// operations, [`yield_now`](crate::task::yield_now)) read that value and
/// leave their own suspension reason in the frame.
///
/// A future that returns `Pending` without going through one of those
/// leaves (for instance a future from another runtime) yields
/// [`Step::Stalled`].
pub struct FutureTask<F> {
    future: Pin<Box<F>>,
}

impl<F> FutureTask<F>
where
    F: Future<Output = ()>,
{
    pub fn new(future: F) -> Self {
        Self {
            future: Box::pin(future),
        }
    }
}

impl<F> Task for FutureTask<F>
where
    F: Future<Output = ()>,
{
    fn resume(&mut self, cx: &mut Context<'_>, value: Resume) -> Step {
        let frame = Frame::new(cx.id(), cx.handle().clone(), value);
        let mut poll_cx = std_task::Context::from_waker(Waker::noop());

        let (poll, frame) = context::enter(frame, || self.future.as_mut().poll(&mut poll_cx));

        match poll {
            Poll::Ready(()) => Step::Done,
            Poll::Pending if frame.conflict => Step::Stalled,
            Poll::Pending => match frame.request {
                Some(Request::Wait(intent)) => Step::Wait(intent),
                Some(Request::Yield) => Step::Yield,
                Some(Request::Receive) => Step::Receive,
                None => Step::Stalled,
            },
        }
    }
}

/// Leaf future: suspends the task once with `request`, then completes with
/// the value the task is resumed with.
pub(crate) struct Suspend {
    request: Option<Request>,
}

impl Suspend {
    pub(crate) fn new(request: Request) -> Self {
        Self {
            request: Some(request),
        }
    }
}

impl Future for Suspend {
    type Output = Resume;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut std_task::Context<'_>) -> Poll<Resume> {
        let request = self.request.take();

        context::expect_frame("awaiting a spindle operation", |frame| match request {
            Some(request) => {
                if frame.request.is_some() {
                    frame.conflict = true;
                }
                frame.request = Some(request);
                Poll::Pending
            }
            None => match frame.resume.take() {
                Some(value) => Poll::Ready(value),
                None => Poll::Pending,
            },
        })
    }
}

/// Suspends the current task until `intent` resolves.
pub(crate) async fn wait(intent: Intent) -> Resume {
    Suspend::new(Request::Wait(intent)).await
}

/// Spawns a future as a new task on the current scheduler.
///
/// The task starts once the calling task hands control back.
///
/// # Panics
///
/// Panics when called outside of a spindle task.
pub fn spawn<F>(future: F) -> TaskId
where
    F: Future<Output = ()> + 'static,
{
    let handle = context::expect_frame("spawn", |frame| frame.handle.clone());
    handle.spawn(FutureTask::new(future))
}

/// Identifier of the task currently running.
///
/// # Panics
///
/// Panics when called outside of a spindle task.
pub fn id() -> TaskId {
    context::expect_frame("task::id", |frame| frame.id)
}

/// Cancels every task waiting on `fd`, dropping them and the sockets they
/// own.
///
/// # Panics
///
/// Panics when called outside of a spindle task.
pub fn cancel(fd: RawFd) {
    context::expect_frame("cancel", |frame| frame.handle.cancel(fd));
}

/// Drops the task `id`, wherever it currently is.
///
/// # Panics
///
/// Panics when called outside of a spindle task.
pub fn abort(id: TaskId) {
    context::expect_frame("abort", |frame| frame.handle.abort(id));
}

/// Puts `message` in the mailbox of `to`.
///
/// Delivery happens once the calling task hands control back. Messages for
/// a task or name that is not live are dropped.
///
/// # Panics
///
/// Panics when called outside of a spindle task.
pub fn send<M: Any>(to: impl Into<Recipient>, message: M) {
    let to = to.into();
    context::expect_frame("send", |frame| frame.handle.send(to, message));
}

/// Waits for the next message in the current task's mailbox.
///
/// Returns `None` if the message is not a `T`; it is consumed either way.
///
/// # Panics
///
/// Panics when called outside of a spindle task.
pub async fn receive<T: Any>() -> Option<T> {
    Suspend::new(Request::Receive).await.into_message()
}
