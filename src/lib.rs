//! # session-engine
//!
//! In-process lifecycle manager for interactive coding sessions.
//!
//! An [`Engine`] hosts independent sessions, routes client messages to
//! them, supervises background tasks, and shuts down in two stages when
//! interrupted: the first SIGINT/SIGTERM drains tasks gracefully, a second
//! one abandons the wait.
//!
//! ## Features
//!
//! - **Session Registry**: UUID-addressed sessions, never overwritten or
//!   created by lookup
//! - **Message Routing**: client messages tagged and forwarded to a
//!   session's conversation
//! - **Task Supervision**: cooperative cancellation with completion polling
//! - **Two-stage Shutdown**: graceful drain, forced exit on a second signal
//!
//! ## Quick Start
//!
//! ```no_run
//! use session_engine::{ClientMessage, Engine, EngineConfig, SessionConfig};
//!
//! fn main() -> session_engine::Result<()> {
//!     session_engine::logging::try_init().ok();
//!
//!     let engine = Engine::new(EngineConfig::default());
//!     let session = engine.create_session(SessionConfig::default().path("src"))?;
//!     println!("session {} indexes {:?}", session, engine.get_session_code_context(&session)?);
//!
//!     // Blocks until Ctrl+C
//!     let outcome = engine.run(true)?;
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod session;
pub mod shutdown;
pub mod task;

// Re-export commonly used types
pub use engine::{Engine, EngineConfig, DEFAULT_POLL_INTERVAL};
pub use error::{EngineError, Result};
pub use session::{
    ClientMessage, CodeContext, Conversation, LocalSession, Message, MessageId, MessageLog,
    MessageSource, Session, SessionConfig, SessionId, SessionRegistry,
};
pub use shutdown::{InterruptAction, ShutdownController, ShutdownOutcome, ShutdownState};
pub use task::{Heartbeat, TaskHandle, TaskId, TaskRegistry, TaskStatus};
