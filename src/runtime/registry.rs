use crate::error::{Error, Result};
use crate::reactor::poller::Direction;
use crate::runtime::intent::Intent;
use crate::runtime::task::{TaskId, TaskRef};

use std::collections::BTreeMap;
use std::os::fd::RawFd;

/// A parked intent and the task to resume once it resolves.
#[derive(Debug)]
pub(crate) struct Waiter {
    pub(crate) intent: Intent,
    pub(crate) task: TaskRef,
}

/// Which task waits on which descriptor, per direction.
///
/// Each direction is a single-entry map: a descriptor has at most one
/// waiter for reading and at most one for writing. Entries leave the
/// registry exactly once, through [`take`](Self::take) when readiness
/// fires or through one of the removal methods on cancellation.
#[derive(Debug, Default)]
pub(crate) struct WaitingRegistry {
    read: BTreeMap<RawFd, Waiter>,
    write: BTreeMap<RawFd, Waiter>,
}

impl WaitingRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn map(&self, direction: Direction) -> &BTreeMap<RawFd, Waiter> {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }

    fn map_mut(&mut self, direction: Direction) -> &mut BTreeMap<RawFd, Waiter> {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }

    /// Parks `intent` for `task` under its descriptor and direction.
    pub(crate) fn register(&mut self, intent: Intent, task: TaskRef) -> Result<()> {
        let fd = intent.fd();
        let direction = intent.direction();
        let map = self.map_mut(direction);

        if map.contains_key(&fd) {
            return Err(Error::AlreadyRegistered { fd, direction });
        }

        map.insert(fd, Waiter { intent, task });
        Ok(())
    }

    /// Removes and returns the waiter on `fd` for `direction`.
    pub(crate) fn take(&mut self, fd: RawFd, direction: Direction) -> Option<Waiter> {
        self.map_mut(direction).remove(&fd)
    }

    /// Removes the waiters on `fd` in both directions.
    pub(crate) fn remove_fd(&mut self, fd: RawFd) -> Vec<Waiter> {
        [Direction::Read, Direction::Write]
            .into_iter()
            .filter_map(|direction| self.take(fd, direction))
            .collect()
    }

    /// Removes every waiter belonging to task `id`.
    pub(crate) fn remove_task(&mut self, id: TaskId) -> usize {
        let before = self.len();

        self.read.retain(|_, waiter| waiter.task.id != id);
        self.write.retain(|_, waiter| waiter.task.id != id);

        before - self.len()
    }

    pub(crate) fn contains(&self, fd: RawFd, direction: Direction) -> bool {
        self.map(direction).contains_key(&fd)
    }

    pub(crate) fn read_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.read.keys().copied()
    }

    pub(crate) fn write_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.write.keys().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.read.len() + self.write.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(n: u64) -> TaskRef {
        TaskRef {
            key: n as usize,
            id: TaskId::from_u64(n).unwrap(),
        }
    }

    #[test]
    fn test_register_and_take() {
        let mut registry = WaitingRegistry::new();
        registry
            .register(Intent::Read { fd: 5, max: 1 }, task(1))
            .unwrap();

        assert!(registry.contains(5, Direction::Read));
        assert!(!registry.contains(5, Direction::Write));

        let waiter = registry.take(5, Direction::Read).unwrap();
        assert_eq!(waiter.task, task(1));
        assert!(registry.take(5, Direction::Read).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = WaitingRegistry::new();
        registry
            .register(Intent::Read { fd: 5, max: 1 }, task(1))
            .unwrap();

        let err = registry
            .register(Intent::Accept { fd: 5 }, task(2))
            .unwrap_err();

        assert!(matches!(
            err,
            Error::AlreadyRegistered {
                fd: 5,
                direction: Direction::Read
            }
        ));
        assert_eq!(registry.take(5, Direction::Read).unwrap().task, task(1));
    }

    #[test]
    fn test_same_fd_both_directions() {
        let mut registry = WaitingRegistry::new();
        registry
            .register(Intent::Read { fd: 7, max: 1 }, task(1))
            .unwrap();
        registry
            .register(Intent::Write { fd: 7, data: vec![0] }, task(2))
            .unwrap();

        assert_eq!(registry.read_fds().collect::<Vec<_>>(), vec![7]);
        assert_eq!(registry.write_fds().collect::<Vec<_>>(), vec![7]);

        let removed = registry.remove_fd(7);
        assert_eq!(removed.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_task() {
        let mut registry = WaitingRegistry::new();
        registry
            .register(Intent::Read { fd: 3, max: 1 }, task(1))
            .unwrap();
        registry
            .register(Intent::Write { fd: 4, data: vec![0] }, task(1))
            .unwrap();
        registry
            .register(Intent::Read { fd: 5, max: 1 }, task(2))
            .unwrap();

        assert_eq!(registry.remove_task(task(1).id), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(5, Direction::Read));
    }
}
