//! Cooperative cancellation of the active run.
//!
//! The flag is set from the bus listener and read by the orchestrator once
//! per frame; nothing is preempted.

mod token;

pub use token::CancellationToken;
