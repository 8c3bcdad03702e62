use crate::runtime::intent::Resume;
use crate::runtime::task::TaskRef;

use std::collections::VecDeque;

/// Tasks that can run right now, each with the value to resume it with.
///
/// Strict FIFO: insertion order is scheduling order.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    entries: VecDeque<(TaskRef, Resume)>,
}

impl ReadyQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, task: TaskRef, value: Resume) {
        self.entries.push_back((task, value));
    }

    pub(crate) fn pop(&mut self) -> Option<(TaskRef, Resume)> {
        self.entries.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
