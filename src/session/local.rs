//! Built-in in-memory session.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::{CodeContext, Conversation, MessageLog, Session, DEFAULT_MESSAGE_BUFFER};
use crate::Result;

/// Configuration for creating a [`LocalSession`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Files and directories to index into the code context.
    pub paths: Vec<PathBuf>,
    /// Paths (and everything under them) to leave out.
    pub exclude_paths: Vec<PathBuf>,
    /// Broadcast capacity of the session's conversation.
    pub message_buffer: Option<usize>,
}

impl SessionConfig {
    /// Add a path to index.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Add a path to exclude.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude_paths.push(path.into());
        self
    }
}

/// A session backed by an in-memory [`MessageLog`] and a [`CodeContext`]
/// indexed at construction.
pub struct LocalSession {
    conversation: MessageLog,
    code_context: CodeContext,
    created_at: Instant,
}

impl LocalSession {
    /// Build a session, indexing the configured paths.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let code_context = CodeContext::index(&config.paths, &config.exclude_paths)?;
        let capacity = config.message_buffer.unwrap_or(DEFAULT_MESSAGE_BUFFER);
        Ok(Self {
            conversation: MessageLog::with_capacity(capacity),
            code_context,
            created_at: Instant::now(),
        })
    }

    /// The underlying message log.
    pub fn message_log(&self) -> &MessageLog {
        &self.conversation
    }

    /// The indexed code context.
    pub fn code_context(&self) -> &CodeContext {
        &self.code_context
    }

    /// Mutable access to the code context, before registration.
    pub fn code_context_mut(&mut self) -> &mut CodeContext {
        &mut self.code_context
    }

    /// Time since the session was built.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl Session for LocalSession {
    fn conversation(&self) -> &dyn Conversation {
        &self.conversation
    }

    fn code_context_paths(&self) -> Vec<PathBuf> {
        self.code_context.file_paths()
    }

    fn close(&self) {
        self.conversation.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MessageSource;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_session_is_empty() {
        let session = LocalSession::new(SessionConfig::default()).unwrap();
        assert!(session.code_context_paths().is_empty());
        assert!(session.message_log().is_empty());
    }

    #[test]
    fn test_indexes_configured_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.rs"), "fn keep() {}").unwrap();
        fs::write(dir.path().join("skip.rs"), "fn skip() {}").unwrap();

        let config = SessionConfig::default()
            .path(dir.path())
            .exclude(dir.path().join("skip.rs"));
        let session = LocalSession::new(config).unwrap();

        assert_eq!(session.code_context_paths(), vec![dir.path().join("keep.rs")]);
    }

    #[tokio::test]
    async fn test_close_rejects_further_messages() {
        let session = LocalSession::new(SessionConfig::default()).unwrap();
        session.close();

        let result = session
            .conversation()
            .send_message(MessageSource::Client, Default::default(), "default")
            .await;
        assert!(matches!(result, Err(crate::EngineError::ConversationClosed)));
    }
}
