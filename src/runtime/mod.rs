//! Core runtime components.
//!
//! This module contains the task side of the crate:
//! - tasks and the protocol used to suspend and resume them,
//! - intents, the values tasks suspend on,
//! - the waiting registry and the ready queue,
//! - the scheduler loop tying them to the poller.
//!
//! Most users will interact with [`Scheduler`] and the [`task`] module
//! rather than with the bookkeeping types directly.

mod command;
mod queue;
mod registry;
mod remote;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod intent;
pub(crate) mod scheduler;
pub(crate) mod yield_now;

pub mod task;

pub use remote::Remote;
pub use scheduler::{Handle, Scheduler, Stats};
