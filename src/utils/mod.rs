//! Small internal data structures.
//!
//! This module provides low-level utilities used internally by the runtime.
//! In particular, it exposes a [`Slab`] used to store live tasks under
//! small reusable indices.

mod slab;

pub(crate) use slab::Slab;
