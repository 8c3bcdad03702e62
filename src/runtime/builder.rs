use super::scheduler::Scheduler;

/// Builder for configuring and creating a scheduler.
///
/// `Builder` lets callers size the scheduler's internal storage up front.
/// Every capacity is only a starting point; storage grows on demand.
///
/// # Examples
///
/// ```rust,ignore
/// let scheduler = Builder::new()
///     .task_capacity(1024)
///     .poll_capacity(256)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct Builder {
    /// Initial room for live tasks.
    task_capacity: usize,
    /// Initial room in the ready queue.
    queue_capacity: usize,
    /// Initial room for descriptors handed to the poller.
    poll_capacity: usize,
}

impl Builder {
    /// Creates a new `Builder` with default configuration.
    pub fn new() -> Self {
        Self {
            task_capacity: 64,
            queue_capacity: 64,
            poll_capacity: 64,
        }
    }

    /// Sets how many tasks fit before task storage reallocates.
    pub fn task_capacity(mut self, n: usize) -> Self {
        self.task_capacity = n;
        self
    }

    /// Sets how many resumptions fit before the ready queue reallocates.
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    /// Sets how many descriptors fit before the poll set reallocates.
    pub fn poll_capacity(mut self, n: usize) -> Self {
        self.poll_capacity = n;
        self
    }

    /// Builds the scheduler with the configured options.
    pub fn build(self) -> Scheduler {
        Scheduler::with_capacity(self.task_capacity, self.queue_capacity, self.poll_capacity)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
