//! Readiness polling and the handler-based event loop.
//!
//! This module contains the two pieces of the crate that talk to the OS
//! readiness facility:
//! - [`poller`], the thin `poll(2)` wrapper shared with the scheduler,
//! - [`EventLoop`], a callback-style loop where each [`Handler`] states
//!   which readiness it wants and gets called back when it arrives.
//!
//! The [`handlers`] module provides ready-made TCP and UDP participants.

mod event_loop;

pub mod handlers;
pub mod poller;

pub use event_loop::{Changes, EventLoop, Handler, HandlerId, Tick};
pub use poller::{Direction, Poller, Readiness};
