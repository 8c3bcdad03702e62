use super::poller::{Direction, Poller};
use crate::error::{Error, Result};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::mem;
use std::os::fd::RawFd;

use tracing::{debug, trace, warn};

/// Identifier of a participant in an [`EventLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// A callback-style participant of an [`EventLoop`].
///
/// Before every tick the loop asks each handler which readiness it wants,
/// polls only those descriptors, and calls the matching `handle_*` method
/// for every descriptor reported ready.
///
/// Returning `Err` from a callback removes the handler from the loop.
pub trait Handler {
    /// The descriptor to poll.
    fn fd(&self) -> RawFd;

    fn wants_to_receive(&self) -> bool {
        false
    }

    fn wants_to_send(&self) -> bool {
        false
    }

    fn handle_receive(&mut self, changes: &mut Changes) -> io::Result<()> {
        let _ = changes;
        Ok(())
    }

    fn handle_send(&mut self, changes: &mut Changes) -> io::Result<()> {
        let _ = changes;
        Ok(())
    }
}

/// Joins and leaves requested during a tick.
///
/// The participant set is never mutated while a tick is dispatching;
/// requests collect here and are folded in once every ready handler has
/// run. Joins are applied before leaves, so a handler added and removed in
/// the same tick never runs.
#[derive(Default)]
pub struct Changes {
    next_id: u64,
    current: Option<HandlerId>,
    joins: Vec<(HandlerId, Box<dyn Handler>)>,
    leaves: BTreeSet<HandlerId>,
}

impl Changes {
    fn allocate(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }

    /// The handler whose callback is running, if any.
    pub fn current(&self) -> Option<HandlerId> {
        self.current
    }

    /// Adds a participant at the end of the tick.
    pub fn join<H: Handler + 'static>(&mut self, handler: H) -> HandlerId {
        let id = self.allocate();
        self.joins.push((id, Box::new(handler)));
        id
    }

    /// Removes participant `id` at the end of the tick. It receives no
    /// further callbacks, even in the current tick.
    pub fn leave(&mut self, id: HandlerId) {
        self.leaves.insert(id);
    }

    /// Removes the handler whose callback is running.
    pub fn leave_current(&mut self) {
        if let Some(id) = self.current {
            self.leave(id);
        }
    }

    fn has_left(&self, id: HandlerId) -> bool {
        self.leaves.contains(&id)
    }

    fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.leaves.is_empty()
    }
}

impl fmt::Debug for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Changes")
            .field("current", &self.current)
            .field("joins", &self.joins.iter().map(|(id, _)| id).collect::<Vec<_>>())
            .field("leaves", &self.leaves)
            .finish()
    }
}

/// Counters for one [`EventLoop::turn`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Tick {
    /// Callbacks invoked.
    pub dispatched: usize,
    /// Ready handlers skipped because they left earlier in the tick.
    pub skipped: usize,
    /// Participants added at the end of the tick.
    pub joined: usize,
    /// Participants removed at the end of the tick.
    pub left: usize,
}

/// A handler-based readiness loop.
///
/// This is the callback counterpart of the [`Scheduler`](crate::Scheduler):
/// each participant owns one static interest per direction instead of
/// yielding intents.
///
/// # Examples
///
/// ```rust,ignore
/// let mut event_loop = EventLoop::new();
/// event_loop.add(TcpServer::bind("127.0.0.1:16000", TcpEchoClient::new)?);
/// event_loop.add(UdpEchoServer::bind("127.0.0.1:15000")?);
/// event_loop.run()?;
/// ```
#[derive(Default)]
pub struct EventLoop {
    handlers: BTreeMap<HandlerId, Box<dyn Handler>>,
    changes: Changes,
    poller: Poller,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant immediately.
    pub fn add<H: Handler + 'static>(&mut self, handler: H) -> HandlerId {
        let id = self.changes.allocate();
        self.handlers.insert(id, Box::new(handler));
        id
    }

    /// Removes a participant immediately, returning it.
    pub fn remove(&mut self, id: HandlerId) -> Option<Box<dyn Handler>> {
        self.handlers.remove(&id)
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs one tick: poll every wanted descriptor, dispatch the ready
    /// handlers, then apply joins and leaves.
    ///
    /// Returns `Ok(None)` without blocking when no participant wants
    /// anything, since such a poll could never return.
    ///
    /// # Errors
    ///
    /// [`Error::Poll`] if the poller fails.
    pub fn turn(&mut self) -> Result<Option<Tick>> {
        let mut read = Vec::new();
        let mut write = Vec::new();

        for (&id, handler) in &self.handlers {
            if handler.wants_to_receive() {
                read.push((handler.fd(), id));
            }
            if handler.wants_to_send() {
                write.push((handler.fd(), id));
            }
        }

        if read.is_empty() && write.is_empty() {
            return Ok(None);
        }

        let readiness = self
            .poller
            .poll(
                read.iter().map(|&(fd, _)| fd),
                write.iter().map(|&(fd, _)| fd),
            )
            .map_err(Error::Poll)?;

        trace!(
            readable = readiness.readable.len(),
            writable = readiness.writable.len(),
            "event loop polled"
        );

        let mut tick = Tick::default();

        for fd in readiness.invalid {
            for &(_, id) in read.iter().chain(&write).filter(|(f, _)| *f == fd) {
                warn!(handler = %id, fd, "dropping handler with closed descriptor");
                self.changes.leave(id);
            }
        }

        for fd in readiness.readable {
            for id in interested(&read, fd) {
                self.dispatch(id, Direction::Read, &mut tick);
            }
        }

        for fd in readiness.writable {
            for id in interested(&write, fd) {
                self.dispatch(id, Direction::Write, &mut tick);
            }
        }

        self.apply_changes(&mut tick);

        Ok(Some(tick))
    }

    /// Turns until no participant wants any readiness.
    pub fn run(&mut self) -> Result<()> {
        let span = tracing::debug_span!("event_loop");
        let _enter = span.enter();

        while self.turn()?.is_some() {}

        debug!(handlers = self.handlers.len(), "event loop idle");
        Ok(())
    }

    fn dispatch(&mut self, id: HandlerId, direction: Direction, tick: &mut Tick) {
        if self.changes.has_left(id) {
            tick.skipped += 1;
            return;
        }

        let Some(handler) = self.handlers.get_mut(&id) else {
            return;
        };

        self.changes.current = Some(id);
        let result = match direction {
            Direction::Read => handler.handle_receive(&mut self.changes),
            Direction::Write => handler.handle_send(&mut self.changes),
        };
        self.changes.current = None;

        tick.dispatched += 1;

        if let Err(err) = result {
            warn!(handler = %id, %direction, %err, "handler failed, removing it");
            self.changes.leave(id);
        }
    }

    fn apply_changes(&mut self, tick: &mut Tick) {
        if self.changes.is_empty() {
            return;
        }

        for (id, handler) in mem::take(&mut self.changes.joins) {
            self.handlers.insert(id, handler);
            tick.joined += 1;
        }

        for id in mem::take(&mut self.changes.leaves) {
            if self.handlers.remove(&id).is_some() {
                tick.left += 1;
            }
        }

        debug!(
            joined = tick.joined,
            left = tick.left,
            handlers = self.handlers.len(),
            "participants changed"
        );
    }
}

fn interested(set: &[(RawFd, HandlerId)], fd: RawFd) -> Vec<HandlerId> {
    set.iter()
        .filter(|&&(f, _)| f == fd)
        .map(|&(_, id)| id)
        .collect()
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("changes", &self.changes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Socket;

    use std::cell::RefCell;
    use std::rc::Rc;

    struct Reader {
        socket: Socket,
        log: Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
    }

    impl Handler for Reader {
        fn fd(&self) -> RawFd {
            self.socket.fd()
        }

        fn wants_to_receive(&self) -> bool {
            true
        }

        fn handle_receive(&mut self, changes: &mut Changes) -> io::Result<()> {
            let mut buf = [0u8; 16];
            let n = self.socket.try_read(&mut buf)?;
            self.log.borrow_mut().push(self.name);
            if n == 0 {
                changes.leave_current();
            }
            Ok(())
        }
    }

    #[test]
    fn test_idle_loop_does_not_block() {
        let mut event_loop = EventLoop::new();
        assert!(event_loop.turn().unwrap().is_none());
        event_loop.run().unwrap();
    }

    #[test]
    fn test_handler_leaves_on_close() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = Socket::pair().unwrap();

        let mut event_loop = EventLoop::new();
        let id = event_loop.add(Reader {
            socket: a,
            log: log.clone(),
            name: "a",
        });

        b.try_write(b"x").unwrap();
        let tick = event_loop.turn().unwrap().unwrap();
        assert_eq!(tick.dispatched, 1);
        assert!(event_loop.contains(id));

        drop(b);
        let tick = event_loop.turn().unwrap().unwrap();
        assert_eq!(tick.left, 1);
        assert!(!event_loop.contains(id));
        assert!(event_loop.turn().unwrap().is_none());

        assert_eq!(*log.borrow(), vec!["a", "a"]);
    }

    #[test]
    fn test_leave_skips_remaining_callbacks_in_tick() {
        struct Evictor {
            socket: Socket,
            victim: HandlerId,
        }

        impl Handler for Evictor {
            fn fd(&self) -> RawFd {
                self.socket.fd()
            }

            fn wants_to_receive(&self) -> bool {
                true
            }

            fn handle_receive(&mut self, changes: &mut Changes) -> io::Result<()> {
                let mut buf = [0u8; 16];
                self.socket.try_read(&mut buf)?;
                changes.leave(self.victim);
                changes.leave(self.victim);
                Ok(())
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, a_peer) = Socket::pair().unwrap();
        let (b, b_peer) = Socket::pair().unwrap();

        let mut event_loop = EventLoop::new();
        // Participants dispatch in poll order, which follows id order.
        let _ = event_loop.add(Evictor {
            socket: a,
            victim: HandlerId(2),
        });
        let victim = event_loop.add(Reader {
            socket: b,
            log: log.clone(),
            name: "victim",
        });
        assert_eq!(victim, HandlerId(2));

        a_peer.try_write(b"x").unwrap();
        b_peer.try_write(b"y").unwrap();

        let tick = event_loop.turn().unwrap().unwrap();
        assert_eq!(tick.dispatched, 1);
        assert_eq!(tick.skipped, 1);
        assert_eq!(tick.left, 1);
        assert!(log.borrow().is_empty());
        assert_eq!(event_loop.len(), 1);
    }

    #[test]
    fn test_failing_handler_is_removed() {
        struct Failing(Socket);

        impl Handler for Failing {
            fn fd(&self) -> RawFd {
                self.0.fd()
            }

            fn wants_to_send(&self) -> bool {
                true
            }

            fn handle_send(&mut self, _: &mut Changes) -> io::Result<()> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
        }

        let (a, _b) = Socket::pair().unwrap();
        let mut event_loop = EventLoop::new();
        event_loop.add(Failing(a));

        let tick = event_loop.turn().unwrap().unwrap();
        assert_eq!(tick.left, 1);
        assert!(event_loop.is_empty());
    }
}
