use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::session::{Session, SessionId};

// -----------------------------------------------------------------------------
// ----- SessionService --------------------------------------------------------

/// Hands out session ids and tracks every live session by id.
///
/// Shared by all connections; each connection only ever touches its own
/// entry, so a sharded map is enough.
#[derive(Debug, Default)]
pub struct SessionService {
    sequence: AtomicU64,
    sessions: DashMap<SessionId, Arc<Session>>,
}

// -----------------------------------------------------------------------------
// ----- SessionService: Static ------------------------------------------------

impl SessionService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

// -----------------------------------------------------------------------------
// ----- SessionService: Public ------------------------------------------------

impl SessionService {
    /// Next id from the shared counter. The first id handed out is 1.
    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of every registered session, ascending.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Request an immediate close of every registered session.
    ///
    /// Sessions leave the registry as their transports confirm the close.
    pub fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        info!("closing {} sessions", sessions.len());

        for session in sessions {
            session.close_immediately();
        }
    }
}

// -----------------------------------------------------------------------------
// ----- SessionService: Lifecycle ---------------------------------------------

impl SessionService {
    pub(crate) fn register(&self, session: Arc<Session>) {
        let id = session.id();
        if self.sessions.insert(id, session).is_some() {
            // Ids come from our own counter, so this is a lifecycle bug.
            debug_assert!(false, "session {id} registered twice");
        }
        debug!(session_id = %id, "session registered");
    }

    pub(crate) fn unregister(&self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!(session_id = %id, "session unregistered");
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
