//! Worker threads whose completions are observed through a descriptor.
//!
//! The scheduler and the event loop are single-threaded: anything that
//! would block (a DNS lookup, a CPU-heavy computation, a blocking library
//! call) must run elsewhere. A [`WorkerPool`] runs such jobs on OS threads
//! and signals completion by writing a byte to a descriptor, which the
//! single poll step observes like any other readiness:
//! - [`Completion`] exposes it to tasks as a `Read` intent,
//! - [`PoolHandler`] exposes it to the reactor event loop.

mod completion;
mod handler;

pub use completion::Completion;
pub use handler::{PoolHandler, PoolSubmitter};

use crate::net::Socket;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of worker threads fed from one queue.
///
/// Dropping the pool lets queued jobs finish, then joins every worker.
pub struct WorkerPool {
    /// Job queue shared by all workers; `None` once shutdown has begun.
    sender: Option<Sender<Job>>,

    /// Join handles for worker threads.
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `workers` threads.
    ///
    /// # Panics
    ///
    /// Panics if `workers == 0`.
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "workers must be > 0");

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers)
            .map(|id| {
                let receiver = receiver.clone();
                thread::spawn(move || work(id, receiver))
            })
            .collect();

        Self {
            sender: Some(sender),
            handles,
        }
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Runs `job` on a worker thread.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            // Workers only exit once the sender is gone.
            let _ = sender.send(Box::new(job));
        }
    }

    /// Runs `job` on a worker thread and returns a handle whose descriptor
    /// becomes readable once the result is available.
    pub fn spawn<F, T>(&self, job: F) -> io::Result<Completion<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (signal, notify) = Socket::pipe()?;
        let completion = Completion::new(signal);
        let slot = completion.slot();

        self.execute(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job));
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);

            let _ = notify.try_write(&[1]);
        });

        Ok(completion)
    }
}

fn work(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();

        match job {
            Ok(job) => {
                trace!(worker = id, "running job");
                job();
            }
            Err(_) => break,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.handles.len())
            .finish()
    }
}
