//! Listener that logs and counts store lifecycle events.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use sessiond_store::{SessionHandle, SessionListener, SessionRecord};
use tracing::debug;

/// Counts of notifications received from the store.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EventCounts {
    pub removed: u64,
    pub expired_batches: u64,
    pub expired_sessions: u64,
    pub reactivated: u64,
}

#[derive(Debug, Default)]
pub struct EventLog {
    removed: AtomicU64,
    expired_batches: AtomicU64,
    expired_sessions: AtomicU64,
    reactivated: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> EventCounts {
        EventCounts {
            removed: self.removed.load(Ordering::Relaxed),
            expired_batches: self.expired_batches.load(Ordering::Relaxed),
            expired_sessions: self.expired_sessions.load(Ordering::Relaxed),
            reactivated: self.reactivated.load(Ordering::Relaxed),
        }
    }
}

impl SessionListener for EventLog {
    fn on_session_removed(&self, session: &SessionRecord) -> sessiond_store::Result<()> {
        self.removed.fetch_add(1, Ordering::Relaxed);
        debug!(
            session_id = %session.session_id(),
            user_id = %session.user_id(),
            context_id = %session.context_id(),
            "Session removed"
        );
        Ok(())
    }

    fn on_container_removed(&self, sessions: &[SessionHandle]) -> sessiond_store::Result<()> {
        self.expired_batches.fetch_add(1, Ordering::Relaxed);
        self.expired_sessions
            .fetch_add(sessions.len() as u64, Ordering::Relaxed);
        debug!(count = sessions.len(), "Expired sessions discarded");
        Ok(())
    }

    fn on_session_reactivated(&self, session: &SessionRecord) -> sessiond_store::Result<()> {
        self.reactivated.fetch_add(1, Ordering::Relaxed);
        debug!(session_id = %session.session_id(), "Session reactivated");
        Ok(())
    }
}
