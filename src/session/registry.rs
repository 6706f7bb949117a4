//! Session registry.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use super::{Conversation, SessionId};
use crate::error::EngineError;
use crate::Result;

/// An addressable unit of conversational work.
///
/// Sessions are built outside the engine and handed to the
/// [`SessionRegistry`], which owns them from then on.
pub trait Session: Send + Sync {
    /// The session's conversation.
    fn conversation(&self) -> &dyn Conversation;

    /// Paths of the files in the session's code context.
    fn code_context_paths(&self) -> Vec<PathBuf>;

    /// Called once when the session is removed from its registry.
    fn close(&self) {}
}

/// Thread-safe map from session ID to session.
///
/// Lookups never create entries and registration never overwrites one.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<dyn Session>>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session under a fresh ID.
    ///
    /// Returns the newly assigned session ID.
    pub fn register(&self, session: Arc<dyn Session>) -> Result<SessionId> {
        let id = SessionId::new();
        self.insert(id, session)?;
        Ok(id)
    }

    /// Register a session under a caller-chosen ID.
    ///
    /// Fails with `SessionExists` if the ID is taken.
    pub fn insert(&self, id: SessionId, session: Arc<dyn Session>) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| EngineError::LockPoisoned)?;

        match sessions.entry(id) {
            Entry::Occupied(_) => Err(EngineError::SessionExists(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    /// Look up a session.
    pub fn resolve(&self, id: &SessionId) -> Result<Arc<dyn Session>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| EngineError::LockPoisoned)?;

        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    /// Check if a session exists.
    pub fn contains(&self, id: &SessionId) -> Result<bool> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| EngineError::LockPoisoned)?;
        Ok(sessions.contains_key(id))
    }

    /// File paths in a session's code context.
    pub fn list_contexts(&self, id: &SessionId) -> Result<Vec<PathBuf>> {
        Ok(self.resolve(id)?.code_context_paths())
    }

    /// Remove a session and close it.
    pub fn remove(&self, id: &SessionId) -> Result<Arc<dyn Session>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| EngineError::LockPoisoned)?;

        let session = sessions
            .remove(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        drop(sessions);

        session.close();
        Ok(session)
    }

    /// Get the number of registered sessions. Reads through a poisoned
    /// lock, so the count stays accurate when other accessors fail.
    pub fn count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// List all session IDs.
    pub fn list_ids(&self) -> Result<Vec<SessionId>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| EngineError::LockPoisoned)?;
        Ok(sessions.keys().copied().collect())
    }

    /// Remove and close every session.
    ///
    /// Returns the number of sessions removed.
    pub fn clear(&self) -> Result<usize> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| EngineError::LockPoisoned)?;
        let drained: Vec<_> = sessions.drain().map(|(_, s)| s).collect();
        drop(sessions);

        for session in &drained {
            session.close();
        }
        Ok(drained.len())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
