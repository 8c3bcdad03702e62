use crate::net::Socket;
use crate::runtime::intent::Intent;
use crate::runtime::task::wait;

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

type Slot<T> = Arc<Mutex<Option<thread::Result<T>>>>;

/// The pending result of a [`WorkerPool::spawn`](super::WorkerPool::spawn)
/// job.
///
/// The worker stores the result, then writes one byte to a pipe. The read
/// end is owned here, so a task can suspend on it like on any socket:
/// either `await` [`join`](Self::join), or yield [`wait`](Self::wait) from a
/// hand-written task and call [`take`](Self::take) once resumed.
pub struct Completion<T> {
    signal: Socket,
    slot: Slot<T>,
}

impl<T> Completion<T> {
    pub(crate) fn new(signal: Socket) -> Self {
        Self {
            signal,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn slot(&self) -> Slot<T> {
        self.slot.clone()
    }

    /// The intent that resolves once the job has finished (or was dropped
    /// without running, in which case the read returns end-of-stream).
    pub fn wait(&self) -> Intent {
        self.signal.recv(1)
    }

    /// Takes the result if the job has finished. `Err` carries the panic
    /// payload of a job that panicked.
    pub fn take(&self) -> Option<thread::Result<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_done(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Suspends the calling task until the job has finished.
    ///
    /// # Errors
    ///
    /// Fails if the job panicked, or if the pool was dropped before running
    /// it.
    pub async fn join(self) -> io::Result<T> {
        loop {
            if let Some(result) = self.take() {
                return result.map_err(|_| io::Error::other("worker job panicked"));
            }

            let signal = wait(self.wait()).await.into_read()?;
            if signal.is_empty() && !self.is_done() {
                return Err(io::Error::other("worker pool dropped the job"));
            }
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("fd", &self.signal.fd())
            .field("done", &self.is_done())
            .finish()
    }
}
