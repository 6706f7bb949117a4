//! Session management module.
//!
//! This module provides the session boundary the engine routes to:
//! identifiers, conversations and their messages, code context, and the
//! registry that owns every live session.

mod context;
mod conversation;
mod id;
mod local;
mod message;
mod registry;

pub use context::CodeContext;
pub use conversation::{Conversation, MessageLog, DEFAULT_MESSAGE_BUFFER};
pub use id::SessionId;
pub use local::{LocalSession, SessionConfig};
pub use message::{
    ClientMessage, Message, MessageData, MessageId, MessageSource, CONTENT_KEY, DEFAULT_CHANNEL,
};
pub use registry::{Session, SessionRegistry};
