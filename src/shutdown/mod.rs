//! Graceful-then-forced shutdown.
//!
//! The first interrupt asks every background task to cancel and waits for
//! them; a second interrupt abandons the wait.

mod controller;
pub mod signals;
mod state;

pub use controller::{InterruptAction, ShutdownController};
pub use state::{ShutdownOutcome, ShutdownState};
