//! Outbound notifications about session lifecycle events.

use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::record::{SessionHandle, SessionRecord};

/// Receives lifecycle notifications from the store.
///
/// Implementations are called after the store has released its locks. A
/// returned error is logged and otherwise ignored; it never fails the
/// operation that triggered the notification.
pub trait SessionListener: Send + Sync {
    /// A session was explicitly removed or finally evicted from the
    /// long-term window.
    fn on_session_removed(&self, _session: &SessionRecord) -> Result<()> {
        Ok(())
    }

    /// A batch of sessions fell off the short-term window and was discarded.
    fn on_container_removed(&self, _sessions: &[SessionHandle]) -> Result<()> {
        Ok(())
    }

    /// A long-term session was read and moved back to the short-term window.
    fn on_session_reactivated(&self, _session: &SessionRecord) -> Result<()> {
        Ok(())
    }
}

/// Fan-out over registered listeners.
#[derive(Default, Clone)]
pub(crate) struct Listeners {
    listeners: Vec<Arc<dyn SessionListener>>,
}

impl Listeners {
    pub fn push(&mut self, listener: Arc<dyn SessionListener>) {
        self.listeners.push(listener);
    }

    pub fn session_removed(&self, session: &SessionRecord) {
        for listener in &self.listeners {
            if let Err(e) = listener.on_session_removed(session) {
                warn!(session_id = %session.session_id(), error = %e, "Listener failed on session removal");
            }
        }
    }

    pub fn container_removed(&self, sessions: &[SessionHandle]) {
        if sessions.is_empty() {
            return;
        }
        for listener in &self.listeners {
            if let Err(e) = listener.on_container_removed(sessions) {
                warn!(count = sessions.len(), error = %e, "Listener failed on container removal");
            }
        }
    }

    pub fn session_reactivated(&self, session: &SessionRecord) {
        for listener in &self.listeners {
            if let Err(e) = listener.on_session_reactivated(session) {
                warn!(session_id = %session.session_id(), error = %e, "Listener failed on reactivation");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    impl SessionListener for Failing {
        fn on_session_removed(&self, _session: &SessionRecord) -> Result<()> {
            Err(Error::Listener("sink unavailable".to_string()))
        }
    }

    #[derive(Default)]
    struct Counting {
        removed: AtomicUsize,
        containers: AtomicUsize,
    }

    impl SessionListener for Counting {
        fn on_session_removed(&self, _session: &SessionRecord) -> Result<()> {
            self.removed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_container_removed(&self, _sessions: &[SessionHandle]) -> Result<()> {
            self.containers.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_failing_listener_does_not_stop_fan_out() {
        let counting = Arc::new(Counting::default());
        let mut listeners = Listeners::default();
        listeners.push(Arc::new(Failing));
        listeners.push(counting.clone());

        listeners.session_removed(&SessionRecord::new("u1", "c1"));
        assert_eq!(counting.removed.load(Ordering::SeqCst), 1);
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn test_empty_container_not_posted() {
        let counting = Arc::new(Counting::default());
        let mut listeners = Listeners::default();
        listeners.push(counting.clone());

        listeners.container_removed(&[]);
        assert_eq!(counting.containers.load(Ordering::SeqCst), 0);

        listeners.container_removed(&[Arc::new(SessionRecord::new("u1", "c1"))]);
        assert_eq!(counting.containers.load(Ordering::SeqCst), 1);
    }
}
