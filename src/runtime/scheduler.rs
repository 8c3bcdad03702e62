//! The scheduler loop.
//!
//! The [`Scheduler`] owns every live task together with the ready queue and
//! the waiting registry. [`Scheduler::run`] alternates between two things:
//! resuming the task at the front of the ready queue, and, when the queue
//! is empty, blocking in the poller until some parked intent can make
//! progress. Blocking in the poller is the only point where the thread
//! ever sleeps.
//!
//! Besides descriptors, a task can wait on its mailbox. Messages are
//! addressed by [`TaskId`] or by the name a task was submitted under.

use crate::error::{Error, Result};
use crate::reactor::poller::{Direction, Poller};
use crate::runtime::command::Command;
use crate::runtime::context::{self, CloseLog};
use crate::runtime::intent::Resume;
use crate::runtime::queue::ReadyQueue;
use crate::runtime::registry::WaitingRegistry;
use crate::runtime::remote::{Remote, Shared};
use crate::runtime::task::{Context, FutureTask, Recipient, Step, Task, TaskId, TaskRef};
use crate::utils::Slab;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace, warn};

/// Counters collected over one call to [`Scheduler::run`].
///
/// Every resumption ends in a yield, a completion, or a fatal error, so
/// after a successful run `resumed == yielded + completed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Stats {
    /// Number of times a task was resumed.
    pub resumed: usize,

    /// Number of resumptions that ended in [`Step::Wait`], [`Step::Yield`]
    /// or [`Step::Receive`].
    pub yielded: usize,

    /// Number of tasks that returned [`Step::Done`].
    pub completed: usize,

    /// Number of calls into the poller.
    pub polls: usize,

    /// Number of tasks spawned by other tasks or injected through a
    /// [`Remote`] during the run.
    pub spawned: usize,

    /// Number of tasks dropped by [`Handle::cancel`] or [`Handle::abort`].
    pub cancelled: usize,

    /// Number of queued resumptions discarded because their task was gone.
    pub stale: usize,

    /// Number of messages delivered to a live task's mailbox.
    pub messages: usize,
}

struct Inbox {
    next_id: Cell<u64>,
    commands: RefCell<Vec<Command>>,
}

/// A cloneable handle to a [`Scheduler`], usable while it runs.
///
/// Tasks reach their scheduler through a handle, from
/// [`Context::handle`](crate::task::Context::handle). Requests made through
/// it are applied as soon as the running task hands control back.
///
/// A `Handle` is tied to the scheduler's thread; use a [`Remote`] to submit
/// work from other threads.
#[derive(Clone)]
pub struct Handle {
    inner: Rc<Inbox>,
}

impl Handle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(Inbox {
                next_id: Cell::new(1),
                commands: RefCell::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn next_id(&self) -> TaskId {
        let n = self.inner.next_id.get();
        self.inner.next_id.set(n + 1);

        match TaskId::from_u64(n) {
            Some(id) => id,
            None => unreachable!("task ids start at 1"),
        }
    }

    fn push(&self, command: Command) {
        self.inner.commands.borrow_mut().push(command);
    }

    pub(crate) fn take_commands(&self) -> Vec<Command> {
        mem::take(&mut *self.inner.commands.borrow_mut())
    }

    /// Queues a new task. It becomes runnable with [`Resume::Unit`].
    pub fn spawn<T: Task + 'static>(&self, task: T) -> TaskId {
        let id = self.next_id();
        self.push(Command::Spawn {
            id,
            task: Box::new(task),
        });
        id
    }

    /// Spawns a future as a task.
    pub fn spawn_future<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        self.spawn(FutureTask::new(future))
    }

    /// Cancels every task waiting on `fd`. See [`Scheduler::cancel`].
    pub fn cancel(&self, fd: RawFd) {
        self.push(Command::Cancel { fd });
    }

    /// Drops task `id`. See [`Scheduler::abort`].
    pub fn abort(&self, id: TaskId) {
        self.push(Command::Abort { id });
    }

    /// Sends `message` to a task. See [`Scheduler::send`].
    pub fn send<M: Any>(&self, to: impl Into<Recipient>, message: M) {
        self.push(Command::Send {
            to: to.into(),
            message: Box::new(message),
        });
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("next_id", &self.inner.next_id.get())
            .field("pending", &self.inner.commands.borrow().len())
            .finish()
    }
}

struct Slot {
    id: TaskId,
    task: Box<dyn Task>,
    name: Option<String>,
    mailbox: VecDeque<Box<dyn Any>>,
    /// Parked in [`Step::Receive`] with an empty mailbox.
    receiving: bool,
}

/// A single-threaded cooperative task scheduler.
///
/// # Examples
///
/// ```rust,ignore
/// let mut scheduler = Builder::new().build();
///
/// scheduler.spawn(async {
///     let (mut a, mut b) = Stream::pair().unwrap();
///     a.write_all(b"hi").await.unwrap();
///     assert_eq!(b.read(2).await.unwrap(), b"hi");
/// });
///
/// let stats = scheduler.run()?;
/// assert_eq!(stats.completed, 1);
/// ```
pub struct Scheduler {
    tasks: Slab<Slot>,
    ready: ReadyQueue,
    waiting: WaitingRegistry,
    poller: Poller,
    handle: Handle,
    remote: Option<Arc<Shared>>,
    names: BTreeMap<String, TaskRef>,
    live: usize,
    receiving: usize,
    stats: Stats,
}

impl Scheduler {
    pub(crate) fn with_capacity(tasks: usize, queue: usize, poll: usize) -> Self {
        Self {
            tasks: Slab::new(tasks),
            ready: ReadyQueue::with_capacity(queue),
            waiting: WaitingRegistry::new(),
            poller: Poller::with_capacity(poll),
            handle: Handle::new(),
            remote: None,
            names: BTreeMap::new(),
            live: 0,
            receiving: 0,
            stats: Stats::default(),
        }
    }

    /// Creates a scheduler with default capacities.
    pub fn new() -> Self {
        crate::Builder::new().build()
    }

    /// Registers a task and marks it runnable with [`Resume::Unit`].
    pub fn submit<T: Task + 'static>(&mut self, task: T) -> TaskId {
        let id = self.handle.next_id();
        self.insert(id, Box::new(task), None);
        id
    }

    /// Submits a task reachable by `name` through [`send`](Self::send).
    ///
    /// A name already in use moves to the new task.
    pub fn submit_named<T>(&mut self, name: impl Into<String>, task: T) -> TaskId
    where
        T: Task + 'static,
    {
        let id = self.handle.next_id();
        self.insert(id, Box::new(task), Some(name.into()));
        id
    }

    /// Submits a future as a task.
    pub fn spawn<F>(&mut self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        self.submit(FutureTask::new(future))
    }

    /// Submits a future under `name`. See [`submit_named`](Self::submit_named).
    pub fn spawn_named<F>(&mut self, name: impl Into<String>, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        self.submit_named(name, FutureTask::new(future))
    }

    fn insert(&mut self, id: TaskId, task: Box<dyn Task>, name: Option<String>) {
        let key = self.tasks.insert(Slot {
            id,
            task,
            name: name.clone(),
            mailbox: VecDeque::new(),
            receiving: false,
        });
        let task = TaskRef { key, id };

        if let Some(name) = name {
            self.names.insert(name, task);
        }

        self.ready.push(task, Resume::Unit);
        self.live += 1;
    }

    fn remove(&mut self, task: TaskRef) {
        let Some(slot) = self.tasks.remove(task.key) else {
            return;
        };

        if let Some(name) = slot.name {
            if self.names.get(&name) == Some(&task) {
                self.names.remove(&name);
            }
        }
        if slot.receiving {
            self.receiving -= 1;
        }
        self.live -= 1;
    }

    /// A handle for spawning and cancelling from inside tasks.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// A thread-safe handle for injecting tasks from other threads.
    ///
    /// The first call creates a wakeup descriptor that every subsequent poll
    /// watches, so the scheduler notices injected tasks while it is blocked.
    pub fn remote(&mut self) -> io::Result<Remote> {
        let shared = match &self.remote {
            Some(shared) => shared.clone(),
            None => {
                let shared = Arc::new(Shared::new()?);
                self.remote = Some(shared.clone());
                shared
            }
        };

        Ok(Remote::new(shared))
    }

    /// Number of live tasks.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Number of queued resumptions, including stale ones.
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Returns `true` if some task waits on `fd` in `direction`.
    pub fn is_waiting(&self, fd: RawFd, direction: Direction) -> bool {
        self.waiting.contains(fd, direction)
    }

    /// Runs until every task has finished, or only tasks parked in
    /// [`Step::Receive`] remain.
    ///
    /// Tasks waiting for a message stay in the scheduler: a later
    /// [`send`](Self::send) and `run` picks them up again.
    ///
    /// # Errors
    ///
    /// Fails on a broken task contract ([`Error::UnrecognizedYield`],
    /// [`Error::AlreadyRegistered`]), when the poller fails
    /// ([`Error::Poll`]), or when tasks remain but none can ever run again
    /// ([`Error::Deadlock`]). Tasks still alive after an error stay in the
    /// scheduler.
    pub fn run(&mut self) -> Result<Stats> {
        let span = tracing::debug_span!("run");
        let _enter = span.enter();

        let _closes = CloseLog::install();

        self.stats = Stats::default();
        self.apply_commands();
        self.drain_remote();

        while self.live > self.receiving {
            match self.ready.pop() {
                Some((task, value)) => self.resume(task, value)?,
                None => self.poll()?,
            }
        }

        let stats = self.stats;
        debug!(
            resumed = stats.resumed,
            yielded = stats.yielded,
            completed = stats.completed,
            polls = stats.polls,
            spawned = stats.spawned,
            cancelled = stats.cancelled,
            stale = stats.stale,
            messages = stats.messages,
            "run complete"
        );

        Ok(stats)
    }

    /// Runs `future` as a task, together with everything already submitted,
    /// and returns its output once all tasks have finished.
    ///
    /// # Errors
    ///
    /// Any error from [`run`](Self::run), or [`Error::Cancelled`] if the task
    /// was cancelled before completing.
    pub fn block_on<F>(&mut self, future: F) -> Result<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let out = slot.clone();

        self.spawn(async move {
            let value = future.await;
            *out.borrow_mut() = Some(value);
        });

        self.run()?;

        let value = slot.borrow_mut().take();
        value.ok_or(Error::Cancelled)
    }

    /// Cancels every task waiting on `fd`.
    ///
    /// The registry entries are removed first, so the descriptor can never
    /// be resolved afterwards; the owning tasks are then dropped, closing
    /// the sockets they own. Cancelling an unknown or already resolved
    /// descriptor does nothing. Returns the number of tasks dropped.
    pub fn cancel(&mut self, fd: RawFd) -> usize {
        let dropped = self
            .waiting
            .remove_fd(fd)
            .into_iter()
            .filter(|waiter| self.drop_task(waiter.task))
            .count();

        if dropped > 0 {
            debug!(fd, dropped, "cancelled waiters");
        }

        dropped
    }

    /// Drops task `id`, wherever it is.
    ///
    /// A queued resumption of the task stays in the ready queue as a
    /// tombstone and is skipped. Returns `false` if the task was not live.
    pub fn abort(&mut self, id: TaskId) -> bool {
        let aborted = self
            .lookup(&Recipient::Id(id))
            .is_some_and(|task| self.drop_task(task));
        if aborted {
            debug!(task.id = %id, "aborted task");
        }

        aborted
    }

    /// Puts `message` in the mailbox of `to`.
    ///
    /// A task parked in [`Step::Receive`] becomes runnable with the message;
    /// otherwise it gets it the next time it asks. Returns `false`, dropping
    /// the message, when `to` names no live task.
    pub fn send<M: Any>(&mut self, to: impl Into<Recipient>, message: M) -> bool {
        self.deliver(to.into(), Box::new(message))
    }

    fn deliver(&mut self, to: Recipient, message: Box<dyn Any>) -> bool {
        let Some(task) = self.lookup(&to) else {
            trace!(%to, "no such task, message dropped");
            return false;
        };
        let Some(slot) = self.tasks.get_mut(task.key) else {
            return false;
        };

        self.stats.messages += 1;

        if slot.receiving {
            slot.receiving = false;
            self.receiving -= 1;
            self.ready.push(task, Resume::Message(message));
        } else {
            slot.mailbox.push_back(message);
        }

        true
    }

    fn lookup(&self, to: &Recipient) -> Option<TaskRef> {
        let task = match to {
            Recipient::Id(id) => self
                .tasks
                .iter()
                .find(|(_, slot)| slot.id == *id)
                .map(|(key, slot)| TaskRef { key, id: slot.id }),
            Recipient::Name(name) => self.names.get(name).copied(),
        };

        task.filter(|&task| self.is_live(task))
    }

    fn is_live(&self, task: TaskRef) -> bool {
        self.tasks.get(task.key).is_some_and(|slot| slot.id == task.id)
    }

    fn drop_task(&mut self, task: TaskRef) -> bool {
        if !self.is_live(task) {
            return false;
        }

        self.waiting.remove_task(task.id);
        self.remove(task);
        self.stats.cancelled += 1;

        true
    }

    fn resume(&mut self, task: TaskRef, value: Resume) -> Result<()> {
        let slot = match self.tasks.get_mut(task.key) {
            Some(slot) if slot.id == task.id => slot,
            _ => {
                trace!(task.id = %task.id, "skipping stale resumption");
                self.stats.stale += 1;
                return Ok(());
            }
        };

        self.stats.resumed += 1;

        let mut cx = Context::new(task.id, &self.handle);
        let step = slot.task.resume(&mut cx, value);

        trace!(task.id = %task.id, step = step.kind(), "resumed");

        // Before the step registers anything: its intent may name a
        // descriptor number the task just closed and reopened.
        self.close_descriptors();

        match step {
            Step::Wait(intent) => {
                self.stats.yielded += 1;
                intent.register(&mut self.waiting, task)?;
            }
            Step::Yield => {
                self.stats.yielded += 1;
                self.ready.push(task, Resume::Unit);
            }
            Step::Receive => {
                self.stats.yielded += 1;
                self.receive(task);
            }
            Step::Done => {
                self.stats.completed += 1;
                self.remove(task);
            }
            Step::Stalled => return Err(Error::UnrecognizedYield { task: task.id }),
        }

        self.apply_commands();
        Ok(())
    }

    fn receive(&mut self, task: TaskRef) {
        let Some(slot) = self.tasks.get_mut(task.key) else {
            return;
        };

        match slot.mailbox.pop_front() {
            Some(message) => self.ready.push(task, Resume::Message(message)),
            None => {
                slot.receiving = true;
                self.receiving += 1;
            }
        }
    }

    /// Fails every waiter on a descriptor closed since the last call.
    ///
    /// Its number may already belong to a new descriptor, so the waiters are
    /// resumed with `EBADF` instead of being left for the poller.
    fn close_descriptors(&mut self) {
        for fd in context::take_closed() {
            for waiter in self.waiting.remove_fd(fd) {
                warn!(fd, task.id = %waiter.task.id, "descriptor closed while waited on");
                let value = waiter
                    .intent
                    .fail(io::Error::from_raw_os_error(libc::EBADF));
                self.ready.push(waiter.task, value);
            }
        }
    }

    fn apply_commands(&mut self) {
        loop {
            // Finished and dropped tasks close the sockets they own.
            self.close_descriptors();

            let commands = self.handle.take_commands();
            if commands.is_empty() {
                return;
            }

            for command in commands {
                match command {
                    Command::Spawn { id, task } => {
                        self.stats.spawned += 1;
                        self.insert(id, task, None);
                    }
                    Command::Cancel { fd } => {
                        self.cancel(fd);
                    }
                    Command::Abort { id } => {
                        self.abort(id);
                    }
                    Command::Send { to, message } => {
                        self.deliver(to, message);
                    }
                }
            }
        }
    }

    fn drain_remote(&mut self) {
        let Some(shared) = self.remote.clone() else {
            return;
        };

        shared.waker.drain();

        for task in shared.take() {
            let id = self.handle.next_id();
            self.stats.spawned += 1;
            self.insert(id, task, None);
        }
    }

    fn poll(&mut self) -> Result<()> {
        debug_assert!(self.ready.is_empty());

        let wake_fd = self.remote.as_ref().map(|shared| shared.waker.fd());

        if self.waiting.is_empty() && wake_fd.is_none() {
            return Err(Error::Deadlock { live: self.live });
        }

        let readiness = self
            .poller
            .poll(
                self.waiting.read_fds().chain(wake_fd),
                self.waiting.write_fds(),
            )
            .map_err(Error::Poll)?;

        self.stats.polls += 1;
        debug!(
            ready = readiness.readable.len() + readiness.writable.len(),
            invalid = readiness.invalid.len(),
            waiting.read = self.waiting.read_fds().count(),
            waiting.write = self.waiting.write_fds().count(),
            "polled"
        );

        for fd in readiness.invalid {
            if Some(fd) == wake_fd {
                return Err(Error::Poll(io::Error::from_raw_os_error(libc::EBADF)));
            }

            for waiter in self.waiting.remove_fd(fd) {
                warn!(fd, task.id = %waiter.task.id, "descriptor closed while waited on");
                let value = waiter
                    .intent
                    .fail(io::Error::from_raw_os_error(libc::EBADF));
                self.ready.push(waiter.task, value);
            }
        }

        for fd in readiness.readable {
            if Some(fd) == wake_fd {
                self.drain_remote();
            } else {
                self.fire(fd, Direction::Read)?;
            }
        }

        for fd in readiness.writable {
            self.fire(fd, Direction::Write)?;
        }

        Ok(())
    }

    fn fire(&mut self, fd: RawFd, direction: Direction) -> Result<()> {
        let Some(waiter) = self.waiting.take(fd, direction) else {
            return Ok(());
        };

        match waiter.intent.resolve() {
            Some(value) => self.ready.push(waiter.task, value),
            None => {
                trace!(fd, %direction, "spurious readiness");
                waiter.intent.register(&mut self.waiting, waiter.task)?;
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("live", &self.live)
            .field("receiving", &self.receiving)
            .field("tasks", &self.tasks.len())
            .field("ready", &self.ready.len())
            .field("waiting", &self.waiting.len())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
