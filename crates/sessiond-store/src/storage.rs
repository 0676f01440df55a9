//! Secondary session storage consulted on local misses.
//!
//! The store itself is single-process. Deployments that share sessions
//! between nodes plug a [`SessionStorage`] in: the store writes sessions
//! through when they are added or promoted, fetches them when a lookup
//! misses locally, and deletes them on explicit removal.

use std::sync::Arc;

use crate::error::Result;
use crate::record::SessionSnapshot;

/// Trait for secondary storage backends.
pub trait SessionStorage: Send + Sync {
    /// Fetch a session that is not resident locally.
    ///
    /// Return `Ok(None)` if the backend does not know the session.
    fn lookup(&self, session_id: &str) -> Result<Option<SessionSnapshot>>;

    /// Write a session through to the backend.
    fn store(&self, session: &SessionSnapshot) -> Result<()>;

    /// Delete a session from the backend.
    fn remove(&self, session_id: &str) -> Result<()>;
}

impl<T: SessionStorage + ?Sized> SessionStorage for Arc<T> {
    fn lookup(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        (**self).lookup(session_id)
    }

    fn store(&self, session: &SessionSnapshot) -> Result<()> {
        (**self).store(session)
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        (**self).remove(session_id)
    }
}

/// A no-op backend for purely local operation.
#[derive(Debug, Clone, Default)]
pub struct NoStorage;

impl SessionStorage for NoStorage {
    fn lookup(&self, _session_id: &str) -> Result<Option<SessionSnapshot>> {
        Ok(None)
    }

    fn store(&self, _session: &SessionSnapshot) -> Result<()> {
        Ok(())
    }

    fn remove(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }
}
