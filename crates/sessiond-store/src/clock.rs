//! Periodic driver for window rotation and token expiry.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::storage::SessionStorage;
use crate::store::SessionStore;

/// Background task that rotates the store's windows and reaps expired
/// random tokens.
///
/// Each period gets its own interval. The first tick of every interval is
/// one full period after start, so a freshly started clock never rotates
/// immediately. Dropping the clock stops the task.
pub struct RotationClock {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RotationClock {
    /// Start the clock on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<S: SessionStorage + 'static>(store: SessionStore<S>) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let config = store.config().clone();
        let short_period = non_zero(config.short_term_interval);
        let long_period = non_zero(config.long_term_interval);
        let reap_period = non_zero(config.random_token_ttl);
        let long_term = store.long_term_enabled();

        info!(
            short_term_interval_secs = short_period.as_secs(),
            long_term_interval_secs = long_term.then(|| long_period.as_secs()),
            token_reap_interval_ms = reap_period.as_millis() as u64,
            "Rotation clock started"
        );

        let task = tokio::spawn(async move {
            let mut short_tick = ticker(short_period);
            let mut long_tick = ticker(long_period);
            let mut reap_tick = ticker(reap_period);

            loop {
                tokio::select! {
                    _ = short_tick.tick() => {
                        offload("short-term rotation", &store, |s| {
                            s.rotate();
                        }).await;
                    }
                    _ = long_tick.tick(), if long_term => {
                        offload("long-term rotation", &store, |s| {
                            s.rotate_long_term();
                        }).await;
                    }
                    _ = reap_tick.tick() => {
                        offload("token purge", &store, |s| {
                            s.purge_expired_tokens();
                        }).await;
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            debug!("Rotation clock received shutdown");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            shutdown,
            task: Some(task),
        }
    }

    /// Stop the clock and wait for its task to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            debug!(error = %e, "Rotation clock task ended abnormally");
        }
        info!("Rotation clock stopped");
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for RotationClock {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for RotationClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationClock")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Run a maintenance step on the blocking pool; it takes window writer
/// locks and calls listeners.
async fn offload<S, F>(step: &'static str, store: &SessionStore<S>, f: F)
where
    S: SessionStorage + 'static,
    F: FnOnce(&SessionStore<S>) + Send + 'static,
{
    let store = store.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || f(&store)).await {
        warn!(step, error = %e, "Rotation clock step failed");
    }
}

fn non_zero(period: Duration) -> Duration {
    period.max(Duration::from_millis(1))
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread::{self, ThreadId};

    use parking_lot::Mutex;

    use crate::config::StoreConfig;
    use crate::error::Result;
    use crate::listener::SessionListener;
    use crate::record::{SessionHandle, SessionRecord};

    fn config() -> StoreConfig {
        StoreConfig::new()
            .with_short_term_depth(2)
            .with_short_term_interval(Duration::from_secs(60))
            .with_long_term_depth(2)
            .with_long_term_interval(Duration::from_secs(600))
            .with_random_token_ttl(Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_rotation_before_first_period() {
        let store = SessionStore::new(config());
        let clock = RotationClock::start(store.clone());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(store.stats().short_term_rotations, 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.stats().short_term_rotations, 1);
        clock.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotations_follow_their_intervals() {
        let store = SessionStore::new(config());
        let handle = store
            .add_session(SessionRecord::new("u1", "c1"), false)
            .unwrap();
        let clock = RotationClock::start(store.clone());

        // Two short rotations move the session into the long-term window.
        tokio::time::sleep(Duration::from_secs(121)).await;
        let stats = store.stats();
        assert_eq!(stats.short_term_rotations, 2);
        assert_eq!(stats.long_term_rotations, 0);
        assert_eq!(stats.long_term, vec![1, 0]);

        // The token was reaped after its lifetime.
        assert_eq!(stats.random_tokens, 0);

        // Two long rotations evict it.
        tokio::time::sleep(Duration::from_secs(1200)).await;
        assert_eq!(store.stats().long_term_rotations, 2);
        assert!(store.peek(handle.session_id()).is_none());
        assert_eq!(store.active_count(), 0);
        clock.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_term_disabled_never_rotates_long() {
        let store = SessionStore::new(config().without_long_term());
        let clock = RotationClock::start(store.clone());

        tokio::time::sleep(Duration::from_secs(1300)).await;
        let stats = store.stats();
        assert_eq!(stats.long_term_rotations, 0);
        assert!(stats.short_term_rotations >= 21);
        clock.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_rotation() {
        let store = SessionStore::new(config());
        let clock = RotationClock::start(store.clone());
        assert!(clock.is_running());

        clock.stop().await;
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(store.stats().short_term_rotations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_halts_rotation() {
        let store = SessionStore::new(config());
        drop(RotationClock::start(store.clone()));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(store.stats().short_term_rotations, 0);
    }

    #[derive(Default)]
    struct ThreadRecorder {
        threads: Mutex<Vec<ThreadId>>,
    }

    impl SessionListener for ThreadRecorder {
        fn on_container_removed(&self, _sessions: &[SessionHandle]) -> Result<()> {
            self.threads.lock().push(thread::current().id());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_runs_off_the_runtime_thread() {
        let store = SessionStore::new(config().with_short_term_depth(1).without_long_term());
        let recorder = Arc::new(ThreadRecorder::default());
        store.add_listener(recorder.clone());
        store
            .add_session(SessionRecord::new("u1", "c1"), false)
            .unwrap();
        let clock = RotationClock::start(store.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        let threads = recorder.threads.lock().clone();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], thread::current().id());
        clock.stop().await;
    }
}
