//! Background task supervision.
//!
//! This module provides:
//! - A registry of spawned tasks with bulk cooperative cancellation
//! - Cancellation-completion polling for the shutdown sequence
//! - The built-in heartbeat task
//!
//! # Example
//!
//! ```no_run
//! use session_engine::task::TaskRegistry;
//!
//! # async fn demo() -> session_engine::Result<()> {
//! let registry = TaskRegistry::new();
//! registry.spawn("worker", |token| async move {
//!     token.cancelled().await;
//! })?;
//!
//! registry.cancel_all()?;
//! while !registry.all_cancelled()? {
//!     tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//! }
//! # Ok(())
//! # }
//! ```

mod heartbeat;
mod registry;

pub use heartbeat::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
pub use registry::{TaskHandle, TaskId, TaskRegistry, TaskStatus};
