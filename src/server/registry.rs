//! Connection registry
//!
//! Bounded collection of live sessions. The server keeps it behind a mutex;
//! the registry itself is plain data.

use std::sync::Arc;

use crate::error::{Result, SocketError};
use crate::server::session::{Session, SessionId};

/// Registry of live sessions with a fixed upper bound.
///
/// The live count is the collection length, so the two can never disagree.
#[derive(Debug)]
pub struct ConnectionRegistry {
    sessions: Vec<Arc<Session>>,
    max_clients: usize,
}

impl ConnectionRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: Vec::new(),
            max_clients,
        }
    }

    /// Adds a session, failing with `CapacityExceeded` once full.
    pub fn add(&mut self, session: Arc<Session>) -> Result<()> {
        if self.is_full() {
            return Err(SocketError::CapacityExceeded {
                max_clients: self.max_clients,
            });
        }
        self.sessions.push(session);
        Ok(())
    }

    /// Removes and returns a session. Removing an absent session is a no-op.
    pub fn remove(&mut self, id: SessionId) -> Option<Arc<Session>> {
        let index = self.sessions.iter().position(|s| s.id() == id)?;
        Some(self.sessions.swap_remove(index))
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.iter().find(|s| s.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_clients
    }

    /// Clones the current session list.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.clone()
    }

    /// Empties the registry, returning every session it held.
    pub fn drain(&mut self) -> Vec<Arc<Session>> {
        std::mem::take(&mut self.sessions)
    }
}
