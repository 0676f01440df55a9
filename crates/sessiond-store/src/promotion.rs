//! Coalescing background promotion of warm sessions.
//!
//! A lookup that hits a session outside the newest generation must not move
//! it itself, since that needs the window's writer lock. Instead it schedules
//! a promotion here and returns. Repeated hits on the same session coalesce
//! into the single pending task.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Cancellation flag handed to a promotion's work.
#[derive(Debug, Default)]
pub(crate) struct PromotionTicket {
    cancelled: AtomicBool,
}

impl PromotionTicket {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Deduplicated, cancellable promotion tasks keyed by session id.
#[derive(Debug, Default)]
pub(crate) struct PromotionScheduler {
    pending: Mutex<HashMap<String, Arc<PromotionTicket>>>,
    migrations: AtomicU64,
}

impl PromotionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `work` for a session unless a task is already pending.
    ///
    /// `work` returns whether it actually moved the session. It runs on the
    /// current tokio runtime's blocking pool when called from inside one,
    /// otherwise on a dedicated thread. Returns `true` if a task was queued.
    pub fn schedule<F>(self: &Arc<Self>, session_id: &str, work: F) -> bool
    where
        F: FnOnce(&PromotionTicket) -> bool + Send + 'static,
    {
        let ticket = {
            let mut pending = self.pending.lock();
            if pending.contains_key(session_id) {
                trace!(session_id = %session_id, "Promotion already pending");
                return false;
            }
            let ticket = Arc::new(PromotionTicket::default());
            pending.insert(session_id.to_string(), Arc::clone(&ticket));
            ticket
        };

        let scheduler = Arc::clone(self);
        let id = session_id.to_string();
        let job = move || scheduler.run(&id, &ticket, work);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("session-promotion".to_string())
                    .spawn(job);
                if let Err(e) = spawned {
                    warn!(session_id = %session_id, error = %e, "Failed to start promotion thread");
                    self.pending.lock().remove(session_id);
                    return false;
                }
            }
        }

        trace!(session_id = %session_id, "Promotion scheduled");
        true
    }

    fn run<F>(&self, session_id: &str, ticket: &Arc<PromotionTicket>, work: F)
    where
        F: FnOnce(&PromotionTicket) -> bool,
    {
        if ticket.is_cancelled() {
            trace!(session_id = %session_id, "Promotion cancelled before start");
        } else {
            match catch_unwind(AssertUnwindSafe(|| work(ticket))) {
                Ok(true) => {
                    self.migrations.fetch_add(1, Ordering::Relaxed);
                    debug!(session_id = %session_id, "Session promoted to newest generation");
                }
                Ok(false) => {
                    trace!(session_id = %session_id, "Promotion had nothing to move");
                }
                Err(_) => {
                    warn!(session_id = %session_id, "Promotion task panicked; session left in place");
                }
            }
        }

        let mut pending = self.pending.lock();
        if pending
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, ticket))
        {
            pending.remove(session_id);
        }
    }

    /// Make a pending promotion inert. Returns `true` if one was pending.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.pending.lock().remove(session_id) {
            Some(ticket) => {
                ticket.cancel();
                trace!(session_id = %session_id, "Promotion cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending promotion.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, ticket) in &drained {
            ticket.cancel();
        }
        drained.len()
    }

    pub fn is_pending(&self, session_id: &str) -> bool {
        self.pending.lock().contains_key(session_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of promotions that moved a session.
    pub fn migrations(&self) -> u64 {
        self.migrations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    fn wait_idle(scheduler: &PromotionScheduler) {
        for _ in 0..200 {
            if scheduler.pending_count() == 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("promotions did not finish");
    }

    #[test]
    fn test_schedule_runs_work() {
        let scheduler = Arc::new(PromotionScheduler::new());
        assert!(scheduler.schedule("s1", |_| true));

        wait_idle(&scheduler);
        assert_eq!(scheduler.migrations(), 1);
    }

    #[test]
    fn test_repeated_schedule_coalesces() {
        let scheduler = Arc::new(PromotionScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let counter = Arc::clone(&runs);
        assert!(scheduler.schedule("s1", move |_| {
            release_rx.recv().ok();
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }));

        for _ in 0..10 {
            let counter = Arc::clone(&runs);
            assert!(!scheduler.schedule("s1", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }));
        }
        assert!(scheduler.is_pending("s1"));

        release_tx.send(()).unwrap();
        wait_idle(&scheduler);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.migrations(), 1);
    }

    #[test]
    fn test_cancel_makes_started_task_inert() {
        let scheduler = Arc::new(PromotionScheduler::new());
        let (release_tx, release_rx) = mpsc::channel::<()>();

        assert!(scheduler.schedule("s1", move |ticket| {
            release_rx.recv().ok();
            !ticket.is_cancelled()
        }));

        assert!(scheduler.cancel("s1"));
        assert!(!scheduler.is_pending("s1"));
        release_tx.send(()).unwrap();

        // The cancelled ticket must not clear a newer task for the same id.
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        assert!(scheduler.schedule("s1", move |_| {
            hold_rx.recv().ok();
            false
        }));
        std::thread::sleep(Duration::from_millis(20));
        assert!(scheduler.is_pending("s1"));

        hold_tx.send(()).unwrap();
        wait_idle(&scheduler);
        assert_eq!(scheduler.migrations(), 0);
    }

    #[test]
    fn test_panicking_work_is_absorbed() {
        let scheduler = Arc::new(PromotionScheduler::new());
        assert!(scheduler.schedule("s1", |_| panic!("boom")));

        wait_idle(&scheduler);
        assert_eq!(scheduler.migrations(), 0);
        assert!(scheduler.schedule("s1", |_| true));
        wait_idle(&scheduler);
        assert_eq!(scheduler.migrations(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_schedule_on_runtime() {
        let scheduler = Arc::new(PromotionScheduler::new());
        assert!(scheduler.schedule("s1", |_| true));

        for _ in 0..200 {
            if scheduler.pending_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(scheduler.migrations(), 1);
    }

    #[test]
    fn test_cancel_all() {
        let scheduler = Arc::new(PromotionScheduler::new());
        let (tx, rx) = mpsc::channel::<()>();
        let rx = Arc::new(Mutex::new(rx));

        for id in ["s1", "s2"] {
            let rx = Arc::clone(&rx);
            scheduler.schedule(id, move |ticket| {
                rx.lock().recv().ok();
                !ticket.is_cancelled()
            });
        }

        assert_eq!(scheduler.cancel_all(), 2);
        assert_eq!(scheduler.pending_count(), 0);
        tx.send(()).unwrap();
        tx.send(()).unwrap();
    }
}
