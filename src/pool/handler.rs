use super::WorkerPool;
use crate::net::Socket;
use crate::reactor::poller::platform::is_retryable;
use crate::reactor::{Changes, Handler};

use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

type Callback = Box<dyn FnOnce(&mut Changes) + Send + 'static>;

/// State reachable from worker threads. Must not own the pool: dropping the
/// pool joins the workers.
struct Shared {
    pending: Mutex<Vec<Callback>>,
    notify: Socket,
    outstanding: AtomicUsize,
}

/// Event-loop participant that runs worker-pool callbacks on the loop
/// thread.
///
/// Jobs go to the pool through a [`PoolSubmitter`]. When a job finishes, the
/// worker queues its callback and writes one byte to a socket pair; the loop
/// sees the other end become readable and this handler runs every queued
/// callback.
///
/// The handler only asks for readiness while jobs are outstanding, so an
/// idle pool does not keep [`EventLoop::run`](crate::reactor::EventLoop::run)
/// alive.
pub struct PoolHandler {
    signal: Socket,
    shared: Arc<Shared>,
    _pool: Arc<WorkerPool>,
}

/// Submits jobs to a [`PoolHandler`]'s pool. Cheap to clone, usable from any
/// thread.
#[derive(Clone)]
pub struct PoolSubmitter {
    pool: Arc<WorkerPool>,
    shared: Arc<Shared>,
}

impl PoolHandler {
    /// Wraps `pool`, returning the loop participant and a submitter.
    pub fn new(pool: WorkerPool) -> io::Result<(PoolHandler, PoolSubmitter)> {
        let (signal, notify) = Socket::pair()?;

        let pool = Arc::new(pool);
        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            notify,
            outstanding: AtomicUsize::new(0),
        });

        let handler = PoolHandler {
            signal,
            shared: shared.clone(),
            _pool: pool.clone(),
        };

        Ok((handler, PoolSubmitter { pool, shared }))
    }

    /// Number of submitted jobs whose callback has not run yet.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }
}

impl PoolSubmitter {
    /// Runs `job` on the pool, then `callback` with its result on the loop
    /// thread.
    pub fn run<F, T, C>(&self, job: F, callback: C)
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        C: FnOnce(thread::Result<T>, &mut Changes) + Send + 'static,
    {
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);

        let shared = self.shared.clone();
        self.pool.execute(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job));

            shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Box::new(move |changes| callback(result, changes)));

            let _ = shared.notify.try_write(b"x");
        });
    }
}

impl Handler for PoolHandler {
    fn fd(&self) -> RawFd {
        self.signal.fd()
    }

    fn wants_to_receive(&self) -> bool {
        self.outstanding() > 0
    }

    fn handle_receive(&mut self, changes: &mut Changes) -> io::Result<()> {
        let mut buf = [0u8; 64];
        loop {
            match self.signal.try_read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(err) if is_retryable(&err) => break,
                Err(err) => return Err(err),
            }
        }

        let callbacks = mem::take(
            &mut *self
                .shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let done = callbacks.len();
        for callback in callbacks {
            callback(changes);
        }

        self.shared.outstanding.fetch_sub(done, Ordering::AcqRel);
        Ok(())
    }
}
