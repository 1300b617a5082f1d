//! Registry of authenticated sessions.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::session::SessionId;
use crate::tracing::prelude::*;

/// Concurrent set of sessions that completed login.
///
/// Lookups happen on every submit and take the shared lock; registration
/// and removal happen once per connection and take the exclusive lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashSet<SessionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Registering twice is harmless.
    pub fn register(&self, id: SessionId) {
        let inserted = self.sessions.write().insert(id);
        if !inserted {
            debug!(session = %id, "Session re-registered");
        }
    }

    /// Remove a session, returning whether it was registered.
    pub fn unregister(&self, id: SessionId) -> bool {
        self.sessions.write().remove(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
