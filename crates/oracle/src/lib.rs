//! Decision oracle wrappers for uiscout.
//!
//! Concrete oracle clients are supplied by the embedding application; this
//! crate adds the behavior every client needs on top of the raw trait.

pub mod retry;

pub use retry::{RetryPolicy, RetryingOracle};
