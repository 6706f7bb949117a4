//! Conversation message types.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Channel used when a client does not name one.
pub const DEFAULT_CHANNEL: &str = "default";

/// Key under which the primary message content is stored.
pub const CONTENT_KEY: &str = "content";

/// Structured payload of a message: `content` plus any extra fields.
pub type MessageData = Map<String, Value>;

/// Identifier assigned to a message by its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Create a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    /// Sent by an external client through the engine.
    Client,
    /// Generated by the session itself (model output, tool results).
    Session,
}

/// A message appended to a session's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Identifier assigned on send.
    pub id: MessageId,
    /// Position within the conversation, starting at 1.
    pub seq: u64,
    /// Producer of the message.
    pub source: MessageSource,
    /// Channel tag.
    pub channel: String,
    /// Payload.
    pub data: MessageData,
    /// Wall-clock time the message was appended.
    pub created_at: SystemTime,
}

impl Message {
    /// The primary content, if present.
    pub fn content(&self) -> Option<&Value> {
        self.data.get(CONTENT_KEY)
    }
}

/// A message as submitted by a client, before the conversation assigns it
/// an identifier.
///
/// # Example
///
/// ```
/// use session_engine::ClientMessage;
///
/// let msg = ClientMessage::new("hello")
///     .channel("chat")
///     .field("cursor", 42);
/// assert_eq!(msg.channel_name(), "chat");
/// ```
#[derive(Debug, Clone)]
pub struct ClientMessage {
    content: Value,
    channel: String,
    extra: MessageData,
}

impl ClientMessage {
    /// Create a message on the default channel.
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            channel: DEFAULT_CHANNEL.to_string(),
            extra: MessageData::new(),
        }
    }

    /// Set the channel tag.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Attach an extra field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Attach several extra fields.
    pub fn fields(mut self, fields: MessageData) -> Self {
        self.extra.extend(fields);
        self
    }

    /// The channel this message will be sent on.
    pub fn channel_name(&self) -> &str {
        &self.channel
    }

    /// Split into the channel tag and the payload.
    ///
    /// The primary content always wins over an extra field named `content`.
    pub fn into_parts(self) -> (String, MessageData) {
        let mut data = self.extra;
        data.insert(CONTENT_KEY.to_string(), self.content);
        (self.channel, data)
    }
}
