use crate::reactor::poller::Waker;
use crate::runtime::task::{FutureTask, Task};

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

/// Tasks handed over from other threads, plus the descriptor used to wake
/// the scheduler out of its poll.
pub(crate) struct Shared {
    queue: Mutex<VecDeque<Box<dyn Task + Send>>>,
    pub(crate) waker: Waker,
}

impl Shared {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            queue: Mutex::new(VecDeque::new()),
            waker: Waker::new()?,
        })
    }

    pub(crate) fn take(&self) -> VecDeque<Box<dyn Task + Send>> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *queue)
    }
}

/// A thread-safe handle for submitting tasks to a [`Scheduler`].
///
/// Obtained from [`Scheduler::remote`]. Submitted tasks are queued behind a
/// mutex and the scheduler is woken through a descriptor its poller always
/// watches; the scheduler moves them into its ready queue on its own thread.
///
/// Injected tasks only run while the scheduler is inside
/// [`run`](crate::Scheduler::run), and `run` returns as soon as no task is
/// live, so a scheduler expecting remote work should keep a task waiting.
///
/// [`Scheduler`]: crate::Scheduler
/// [`Scheduler::remote`]: crate::Scheduler::remote
#[derive(Clone)]
pub struct Remote {
    shared: Arc<Shared>,
}

impl Remote {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Queues `task` and wakes the scheduler.
    pub fn spawn<T>(&self, task: T)
    where
        T: Task + Send + 'static,
    {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Box::new(task));

        self.shared.waker.wake();
    }

    /// Queues a future as a task and wakes the scheduler.
    pub fn spawn_future<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(FutureTask::new(future));
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("wake_fd", &self.shared.waker.fd())
            .finish()
    }
}
