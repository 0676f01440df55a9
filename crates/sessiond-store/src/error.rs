//! Error types for session store operations.

/// Error type for session store operations.
///
/// Only admission failures surface to callers. Lookups and removals report
/// absence as `None`; storage and listener faults are logged and absorbed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Global or per-context session count is at its configured maximum.
    #[error("{}", capacity_message(*limit, context_id.as_deref()))]
    CapacityExceeded {
        limit: usize,
        /// Set when the per-context limit was hit rather than the global one.
        context_id: Option<String>,
    },

    /// A resident session already carries this auth id.
    #[error("Duplicate auth id: {0}")]
    DuplicateAuthId(String),

    /// A resident session already has this session id.
    #[error("Duplicate session id: {0}")]
    DuplicateSessionId(String),

    /// The record's random token is already registered for another session.
    #[error("Duplicate random token")]
    DuplicateRandomToken,

    /// Error from the secondary session storage.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A listener failed to handle a notification.
    #[error("Listener error: {0}")]
    Listener(String),
}

fn capacity_message(limit: usize, context_id: Option<&str>) -> String {
    match context_id {
        Some(ctx) => format!("Max. number of sessions ({limit}) exceeded for context {ctx}"),
        None => format!("Max. number of sessions ({limit}) exceeded"),
    }
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
