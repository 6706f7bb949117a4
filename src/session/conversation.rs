//! Session conversations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use super::message::{Message, MessageData, MessageId, MessageSource};
use crate::error::EngineError;
use crate::Result;

/// Default capacity of the per-conversation broadcast channel.
pub const DEFAULT_MESSAGE_BUFFER: usize = 256;

/// The message-send capability a session exposes to the engine.
#[async_trait]
pub trait Conversation: Send + Sync {
    /// Append a message and return it with its assigned identifier.
    async fn send_message(
        &self,
        source: MessageSource,
        data: MessageData,
        channel: &str,
    ) -> Result<Message>;

    /// Subscribe to messages appended after this call.
    fn subscribe(&self) -> broadcast::Receiver<Message>;
}

/// In-memory, ordered message log.
///
/// Each appended message gets a fresh [`MessageId`] and the next sequence
/// number, and is broadcast to every live subscriber.
pub struct MessageLog {
    messages: RwLock<Vec<Message>>,
    tx: broadcast::Sender<Message>,
    closed: AtomicBool,
}

impl MessageLog {
    /// Create an empty log with the default broadcast capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MESSAGE_BUFFER)
    }

    /// Create an empty log whose subscribers may lag by up to `capacity`
    /// messages before dropping old ones.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            messages: RwLock::new(Vec::new()),
            tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Append a message synchronously.
    pub fn append(
        &self,
        source: MessageSource,
        data: MessageData,
        channel: &str,
    ) -> Result<Message> {
        if self.is_closed() {
            return Err(EngineError::ConversationClosed);
        }

        let mut messages = self
            .messages
            .write()
            .map_err(|_| EngineError::LockPoisoned)?;

        let message = Message {
            id: MessageId::new(),
            seq: messages.len() as u64 + 1,
            source,
            channel: channel.to_string(),
            data,
            created_at: SystemTime::now(),
        };
        messages.push(message.clone());

        // Broadcast under the lock so subscribers see sequence order.
        // No subscribers is fine.
        let _ = self.tx.send(message.clone());
        drop(messages);
        trace!(id = %message.id, seq = message.seq, channel, "message appended");

        Ok(message)
    }

    /// Snapshot of every message in order.
    pub fn messages(&self) -> Result<Vec<Message>> {
        let messages = self
            .messages
            .read()
            .map_err(|_| EngineError::LockPoisoned)?;
        Ok(messages.clone())
    }

    /// Number of messages in the log.
    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the log holds no messages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting messages.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Conversation for MessageLog {
    async fn send_message(
        &self,
        source: MessageSource,
        data: MessageData,
        channel: &str,
    ) -> Result<Message> {
        self.append(source, data, channel)
    }

    fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }
}
