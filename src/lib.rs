//! # Spindle
//!
//! **Spindle** is a single-threaded cooperative task runtime: a miniature
//! "operating system" that multiplexes socket I/O across many logically
//! concurrent tasks on one thread of control.
//!
//! Its core is small and explicit:
//!
//! - a **readiness poller** wrapping `poll(2)`, the only place the thread
//!   ever blocks,
//! - a **waiting registry** recording which task waits on which descriptor,
//!   per direction,
//! - a FIFO **ready queue** of tasks that can run right now, each paired
//!   with the value it will be resumed with,
//! - a **scheduler** loop tying them together.
//!
//! A task runs until it yields an [`Intent`] (read, write or accept on a
//! descriptor) or finishes. The scheduler parks the intent, polls once
//! nothing else is runnable, performs the now non-blocking call, and
//! resumes the task with the result as a [`Resume`] value.
//!
//! Tasks are either hand-written state machines implementing
//! [`task::Task`], or plain `async` blocks whose awaits on the
//! [`net`] facade turn into intents under the hood. Tasks can also be
//! named and exchange messages through per-task mailboxes
//! ([`Scheduler::send`], [`task::receive`]).
//!
//! A callback-style alternative, the [`reactor::EventLoop`], drives
//! [`reactor::Handler`]s that state which readiness they want each tick.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spindle::net::Listener;
//! use spindle::task;
//!
//! #[spindle::main]
//! async fn main() {
//!     let listener = Listener::bind("127.0.0.1:25000").unwrap();
//!
//!     loop {
//!         let (client, _) = listener.accept().await.unwrap();
//!
//!         task::spawn(async move {
//!             loop {
//!                 let line = client.read_line().await.unwrap();
//!                 if line.is_empty() {
//!                     break;
//!                 }
//!                 client.write_all(&line).await.unwrap();
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`task`]: the task protocol, `async` adapter and in-task helpers
//! - [`net`]: sockets exposed as intents and `async` methods
//! - [`reactor`]: the poller and the handler-based event loop
//! - [`pool`]: worker threads signalling completion through a descriptor

mod error;
mod runtime;
mod utils;

pub mod net;
pub mod pool;
pub mod reactor;

pub use error::{Error, Result};
pub use reactor::Direction;
pub use runtime::builder::Builder;
pub use runtime::intent::{Intent, Resume};
pub use runtime::task;
pub use runtime::{Handle, Remote, Scheduler, Stats};

pub use spindle_macros::{main, test};
