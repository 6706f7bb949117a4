//! Error types for session-engine.

use thiserror::Error;

use crate::shutdown::ShutdownState;

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Session with the given ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session with the given ID already exists.
    #[error("session already exists: {0}")]
    SessionExists(String),

    /// Invalid shutdown state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: ShutdownState,
        to: ShutdownState,
    },

    /// The session's conversation rejected a message.
    #[error("conversation error: {0}")]
    Conversation(String),

    /// The session's conversation no longer accepts messages.
    #[error("conversation closed")]
    ConversationClosed,

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine failed before entering its main loop.
    #[error("engine startup failed: {0}")]
    Startup(String),

    /// The engine failed while running or shutting down.
    #[error("engine runtime failure: {0}")]
    Runtime(String),
}

impl EngineError {
    /// Whether this error ends the engine lifecycle.
    ///
    /// Routed operations (message sends, context queries) never produce a
    /// fatal error; those are reported to the caller and the engine keeps
    /// running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Startup(_) | EngineError::Runtime(_))
    }
}

/// Convenience Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
