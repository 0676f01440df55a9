//! The session store facade.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::clock::RotationClock;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::listener::{Listeners, SessionListener};
use crate::promotion::{PromotionScheduler, PromotionTicket};
use crate::record::{SessionHandle, SessionRecord, UserKey};
use crate::storage::{NoStorage, SessionStorage};
use crate::token::RandomTokenIndex;
use crate::window::{Generations, Window, WindowKind};

/// Where a resident session currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionLocation {
    pub window: WindowKind,
    /// Generation index within the window, 0 being newest.
    pub generation: usize,
}

/// Point-in-time statistics of the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Resident sessions across both windows.
    pub active: usize,
    /// Session count per short-term generation, newest first.
    pub short_term: Vec<usize>,
    /// Session count per long-term generation, newest first.
    pub long_term: Vec<usize>,
    /// Outstanding random tokens.
    pub random_tokens: usize,
    /// Promotions scheduled but not finished.
    pub pending_promotions: usize,
    /// Promotions that moved a session.
    pub migrations: u64,
    pub short_term_rotations: u64,
    pub long_term_rotations: u64,
}

struct StoreInner<S> {
    config: StoreConfig,
    short_term: Window,
    /// `None` when the long-term tier is disabled.
    long_term: Option<Window>,
    tokens: RandomTokenIndex,
    promotions: Arc<PromotionScheduler>,
    listeners: RwLock<Listeners>,
    storage: S,
    /// Serializes capacity and uniqueness checks with the insert they guard.
    admission: Mutex<()>,
    active: AtomicUsize,
    per_context: Mutex<HashMap<String, usize>>,
    short_term_rotations: AtomicU64,
    long_term_rotations: AtomicU64,
}

/// In-memory store of authenticated sessions.
///
/// Sessions live in a short-term window of generations that rotates on a
/// fixed interval, and optionally in a long-term window that catches what
/// falls off the short-term tail. Lookups never move a session themselves;
/// they schedule a promotion to the newest generation instead.
///
/// The store is cheap to clone; clones share state.
pub struct SessionStore<S: SessionStorage + 'static = NoStorage> {
    inner: Arc<StoreInner<S>>,
}

impl SessionStore<NoStorage> {
    /// Create a store with no secondary storage.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_storage(config, NoStorage)
    }
}

impl<S: SessionStorage + 'static> SessionStore<S> {
    /// Create a store backed by a secondary storage.
    pub fn with_storage(config: StoreConfig, storage: S) -> Self {
        let short_term = Window::new(WindowKind::ShortTerm, config.effective_short_term_depth());
        let long_term = config
            .long_term_enabled()
            .then(|| Window::new(WindowKind::LongTerm, config.long_term_depth));

        info!(
            short_term_depth = short_term.depth(),
            long_term_depth = config.long_term_depth,
            max_sessions = config.max_sessions,
            max_sessions_per_context = config.max_sessions_per_context,
            no_limit = config.no_limit,
            "Session store created"
        );

        let inner = StoreInner {
            config,
            short_term,
            long_term,
            tokens: RandomTokenIndex::new(),
            promotions: Arc::new(PromotionScheduler::new()),
            listeners: RwLock::new(Listeners::default()),
            storage,
            admission: Mutex::new(()),
            active: AtomicUsize::new(0),
            per_context: Mutex::new(HashMap::new()),
            short_term_rotations: AtomicU64::new(0),
            long_term_rotations: AtomicU64::new(0),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Register a listener for lifecycle notifications.
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.inner.listeners.write().push(listener);
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Admission
    // ─────────────────────────────────────────────────────────────────────

    /// Add a session to the newest short-term generation.
    ///
    /// Capacity limits are skipped when `allow_overflow` is set or the store
    /// runs in no-limit mode. Fails without touching any structure if the
    /// session id, auth id, or random token is already in use.
    pub fn add_session(&self, record: SessionRecord, allow_overflow: bool) -> Result<SessionHandle> {
        let handle = Arc::new(record);
        let session_id = handle.session_id().to_string();

        {
            let _admission = self.inner.admission.lock();
            let short = self.inner.short_term.read();
            let long = self.inner.long_term.as_ref().map(Window::read);

            if !allow_overflow && !self.inner.config.no_limit {
                self.check_capacity(handle.context_id())?;
            }

            if short.contains(&session_id) || long.as_ref().is_some_and(|l| l.contains(&session_id)) {
                return Err(Error::DuplicateSessionId(session_id));
            }

            if let Some(auth_id) = handle.auth_id() {
                check_auth_id(auth_id, &short, long.as_deref())?;
            }

            if let Some(token) = handle.random_token()
                && !self.inner.tokens.put(&token, &session_id, self.inner.config.random_token_ttl)
            {
                return Err(Error::DuplicateRandomToken);
            }

            short.head().insert(Arc::clone(&handle));
            self.admit(&handle);
        }

        self.write_through(&handle);

        debug!(
            session_id = %session_id,
            user_id = %handle.user_id(),
            context_id = %handle.context_id(),
            active = self.active_count(),
            "Session added"
        );

        Ok(handle)
    }

    fn check_capacity(&self, context_id: &str) -> Result<()> {
        let config = &self.inner.config;

        if config.max_sessions > 0 && self.active_count() >= config.max_sessions {
            warn!(limit = config.max_sessions, "Session limit reached");
            return Err(Error::CapacityExceeded {
                limit: config.max_sessions,
                context_id: None,
            });
        }

        if config.max_sessions_per_context > 0
            && self.count_for_context(context_id) >= config.max_sessions_per_context
        {
            warn!(
                context_id = %context_id,
                limit = config.max_sessions_per_context,
                "Per-context session limit reached"
            );
            return Err(Error::CapacityExceeded {
                limit: config.max_sessions_per_context,
                context_id: Some(context_id.to_string()),
            });
        }

        Ok(())
    }

    /// Fail with [`Error::DuplicateAuthId`] if any resident session carries
    /// `auth_id`.
    pub fn check_no_duplicate_auth_id(&self, auth_id: &str) -> Result<()> {
        self.with_windows(|short, long| check_auth_id(auth_id, short, long))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────

    /// Look up a session by id.
    ///
    /// A hit outside the newest short-term generation schedules a promotion.
    /// A hit in the long-term window is reactivated by that promotion, which
    /// notifies listeners once it has moved the session.
    /// On a local miss the secondary storage is consulted.
    pub fn get_by_id(&self, session_id: &str) -> Option<SessionHandle> {
        let long_term_hit = {
            let short = self.inner.short_term.read();
            match short.find(session_id) {
                Some((0, handle)) => {
                    trace!(session_id = %session_id, "Session found in newest generation");
                    return Some(handle);
                }
                Some((generation, handle)) => {
                    trace!(session_id = %session_id, generation, "Session found in older generation");
                    self.schedule_promotion(session_id);
                    return Some(handle);
                }
                None => {}
            }

            // Short-term reader lock stays held so a concurrent promotion
            // cannot move the session between the two scans.
            let long = self.inner.long_term.as_ref().map(Window::read);
            let hit = long.as_ref().and_then(|l| l.find(session_id));
            if hit.is_some() {
                self.schedule_promotion(session_id);
            }
            hit.map(|(_, handle)| handle)
        };

        if long_term_hit.is_some() {
            return long_term_hit;
        }

        self.fetch_from_storage(session_id)
    }

    /// Look up a session by id without promoting it.
    pub fn peek(&self, session_id: &str) -> Option<SessionHandle> {
        self.with_windows(|short, long| {
            short
                .find(session_id)
                .or_else(|| long.and_then(|l| l.find(session_id)))
                .map(|(_, handle)| handle)
        })
    }

    /// Report which window and generation hold a session.
    pub fn locate(&self, session_id: &str) -> Option<SessionLocation> {
        self.with_windows(|short, long| {
            if let Some((generation, _)) = short.find(session_id) {
                return Some(SessionLocation {
                    window: WindowKind::ShortTerm,
                    generation,
                });
            }
            long.and_then(|l| l.find(session_id))
                .map(|(generation, _)| SessionLocation {
                    window: WindowKind::LongTerm,
                    generation,
                })
        })
    }

    /// Redeem a random token.
    ///
    /// The token is consumed atomically; any concurrent redemption or expiry
    /// of the same token observes `None`.
    pub fn get_by_random_token(&self, token: &str) -> Option<SessionHandle> {
        let session_id = self.inner.tokens.take_if_present(token)?;
        let handle = self.get_by_id(&session_id)?;
        if !handle.redeem_random_token(token) {
            debug!(session_id = %session_id, "Random token no longer matches session");
            return None;
        }
        self.write_through(&handle);
        debug!(session_id = %session_id, "Random token redeemed");
        Some(handle)
    }

    /// Look up the session carrying an auth id.
    pub fn get_by_auth_id(&self, auth_id: &str) -> Option<SessionHandle> {
        self.with_windows(|short, long| {
            short
                .get_by_auth_id(auth_id)
                .or_else(|| long.and_then(|l| l.get_by_auth_id(auth_id)))
        })
    }

    /// All resident sessions of a user.
    pub fn sessions_for_user(&self, user_id: &str, context_id: &str) -> Vec<SessionHandle> {
        let key = UserKey::new(user_id, context_id);
        self.with_windows(|short, long| {
            let mut sessions = short.sessions_for_user(&key);
            if let Some(long) = long {
                sessions.extend(long.sessions_for_user(&key));
            }
            sessions
        })
    }

    /// Any one resident session of a user, preferring recently active ones.
    pub fn any_session_for_user(&self, user_id: &str, context_id: &str) -> Option<SessionHandle> {
        self.find_first_for_user(user_id, context_id, |_| true)
    }

    /// First session of a user matching `predicate`, newest generation first.
    pub fn find_first_for_user<F>(
        &self,
        user_id: &str,
        context_id: &str,
        predicate: F,
    ) -> Option<SessionHandle>
    where
        F: Fn(&SessionRecord) -> bool,
    {
        self.sessions_for_user(user_id, context_id)
            .into_iter()
            .find(|handle| predicate(handle))
    }

    /// Number of resident sessions of a user.
    pub fn count_for_user(&self, user_id: &str, context_id: &str) -> usize {
        let key = UserKey::new(user_id, context_id);
        self.with_windows(|short, long| {
            short.count_for_user(&key) + long.map_or(0, |l| l.count_for_user(&key))
        })
    }

    /// Whether a user has any resident session.
    pub fn is_user_active(&self, user_id: &str, context_id: &str) -> bool {
        let key = UserKey::new(user_id, context_id);
        self.with_windows(|short, long| {
            short.has_user(&key) || long.is_some_and(|l| l.has_user(&key))
        })
    }

    /// Number of resident sessions in a context.
    pub fn count_for_context(&self, context_id: &str) -> usize {
        self.inner
            .per_context
            .lock()
            .get(context_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of resident sessions.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Removal
    // ─────────────────────────────────────────────────────────────────────

    /// Remove a session.
    ///
    /// Cancels its pending promotion and outstanding random token, notifies
    /// listeners, and deletes it from secondary storage.
    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        let removed = self.with_windows(|short, long| {
            short
                .remove(session_id)
                .or_else(|| long.and_then(|l| l.remove(session_id)))
        });
        self.inner.promotions.cancel(session_id);
        self.delete_from_storage(session_id);

        let handle = removed?;
        self.depart(&handle);
        self.listeners().session_removed(&handle);

        debug!(session_id = %session_id, active = self.active_count(), "Session removed");
        Some(handle)
    }

    /// Remove every session of a user.
    pub fn remove_all_for_user(&self, user_id: &str, context_id: &str) -> Vec<SessionHandle> {
        let key = UserKey::new(user_id, context_id);
        let removed = self.with_windows(|short, long| {
            let mut removed = short.remove_user(&key);
            if let Some(long) = long {
                removed.extend(long.remove_user(&key));
            }
            removed
        });

        self.finish_removal(&removed);
        if !removed.is_empty() {
            info!(
                user_id = %user_id,
                context_id = %context_id,
                count = removed.len(),
                "Removed all sessions of user"
            );
        }
        removed
    }

    /// Remove every session of a context.
    pub fn remove_all_for_context(&self, context_id: &str) -> Vec<SessionHandle> {
        let removed = self.with_windows(|short, long| {
            let mut removed = short.remove_matching(|h| h.context_id() == context_id);
            if let Some(long) = long {
                removed.extend(long.remove_matching(|h| h.context_id() == context_id));
            }
            removed
        });

        self.finish_removal(&removed);
        if !removed.is_empty() {
            info!(context_id = %context_id, count = removed.len(), "Removed all sessions of context");
        }
        removed
    }

    fn finish_removal(&self, removed: &[SessionHandle]) {
        let listeners = self.listeners();
        for handle in removed {
            self.inner.promotions.cancel(handle.session_id());
            self.delete_from_storage(handle.session_id());
            self.depart(handle);
            listeners.session_removed(handle);
        }
    }

    /// Remove every resident session locally, notifying listeners.
    ///
    /// Secondary storage is left untouched.
    pub fn clear(&self) -> usize {
        let drained = {
            let mut short = self.inner.short_term.write();
            let mut long = self.inner.long_term.as_ref().map(Window::write);
            let mut drained = short.drain();
            if let Some(long) = long.as_mut() {
                drained.extend(long.drain());
            }
            drained
        };
        self.inner.promotions.cancel_all();

        let listeners = self.listeners();
        for handle in &drained {
            self.depart(handle);
            listeners.session_removed(handle);
        }
        drained.len()
    }

    /// Start the rotation clock for this store on the current runtime.
    pub fn start_clock(&self) -> RotationClock {
        RotationClock::start(self.clone())
    }

    /// Stop all background work and drop every resident session.
    ///
    /// Stop the [`RotationClock`] first; a clock left running keeps rotating
    /// the now empty windows.
    pub fn shutdown(&self) {
        let cancelled = self.inner.promotions.cancel_all();
        let cleared = self.clear();
        info!(cleared, cancelled_promotions = cancelled, "Session store shut down");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rotation (driven by the rotation clock)
    // ─────────────────────────────────────────────────────────────────────

    /// Advance the short-term window by one generation.
    ///
    /// The popped tail moves into the long-term head when that tier is
    /// enabled; transient sessions and everything else are discarded and
    /// posted as one container. Returns the number of discarded sessions.
    pub(crate) fn rotate(&self) -> usize {
        let (discarded, kept) = {
            let mut short = self.inner.short_term.write();
            let tail = short.rotate();
            match self.inner.long_term.as_ref() {
                Some(long_window) => {
                    let long = long_window.write();
                    let transient = tail.remove_matching(|h| h.is_transient());
                    let kept = tail.len();
                    if !tail.is_empty() {
                        long.head().absorb(tail);
                    }
                    (transient, kept)
                }
                None => (tail.into_sessions(), 0),
            }
        };
        self.inner.short_term_rotations.fetch_add(1, Ordering::Relaxed);

        for handle in &discarded {
            self.inner.promotions.cancel(handle.session_id());
            self.depart(handle);
        }
        self.listeners().container_removed(&discarded);

        debug!(
            window = %self.inner.short_term.kind(),
            discarded = discarded.len(),
            moved_to_long_term = kept,
            active = self.active_count(),
            "Window rotated"
        );
        discarded.len()
    }

    /// Advance the long-term window by one generation, evicting its tail.
    /// Returns the number of evicted sessions.
    pub(crate) fn rotate_long_term(&self) -> usize {
        let Some(long_window) = self.inner.long_term.as_ref() else {
            return 0;
        };
        let evicted = long_window.write().rotate().into_sessions();
        self.inner.long_term_rotations.fetch_add(1, Ordering::Relaxed);

        let listeners = self.listeners();
        for handle in &evicted {
            self.inner.promotions.cancel(handle.session_id());
            self.depart(handle);
            listeners.session_removed(handle);
        }

        debug!(
            window = %long_window.kind(),
            evicted = evicted.len(),
            active = self.active_count(),
            "Window rotated"
        );
        evicted.len()
    }

    /// Drop random tokens whose lifetime has passed.
    pub(crate) fn purge_expired_tokens(&self) -> usize {
        let expired = self.inner.tokens.purge_expired();
        if expired > 0 {
            debug!(expired, "Expired random tokens purged");
        }
        expired
    }

    pub(crate) fn long_term_enabled(&self) -> bool {
        self.inner.long_term.is_some()
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        let (short_term, long_term) = self.with_windows(|short, long| {
            (short.sizes(), long.map(Generations::sizes).unwrap_or_default())
        });
        StoreStats {
            active: self.active_count(),
            short_term,
            long_term,
            random_tokens: self.inner.tokens.len(),
            pending_promotions: self.inner.promotions.pending_count(),
            migrations: self.inner.promotions.migrations(),
            short_term_rotations: self.inner.short_term_rotations.load(Ordering::Relaxed),
            long_term_rotations: self.inner.long_term_rotations.load(Ordering::Relaxed),
        }
    }

    /// Whether a promotion is pending for a session.
    pub fn is_promotion_pending(&self, session_id: &str) -> bool {
        self.inner.promotions.is_pending(session_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Run `f` with reader locks on both windows, short-term first.
    fn with_windows<R>(&self, f: impl FnOnce(&Generations, Option<&Generations>) -> R) -> R {
        let short = self.inner.short_term.read();
        let long = self.inner.long_term.as_ref().map(Window::read);
        f(&short, long.as_deref())
    }

    /// Snapshot of the registered listeners, taken so none is called under
    /// a lock.
    fn listeners(&self) -> Listeners {
        self.inner.listeners.read().clone()
    }

    fn schedule_promotion(&self, session_id: &str) {
        let store = self.clone();
        let id = session_id.to_string();
        self.inner
            .promotions
            .schedule(session_id, move |ticket| store.promote(&id, ticket));
    }

    /// Move a session into the newest short-term generation.
    ///
    /// A move out of the long-term window is a reactivation and is reported
    /// once, however many reads coalesced into this promotion.
    fn promote(&self, session_id: &str, ticket: &PromotionTicket) -> bool {
        let (moved, reactivated) = {
            let short = self.inner.short_term.write();
            let long = self.inner.long_term.as_ref().map(Window::write);
            if ticket.is_cancelled() {
                return false;
            }

            let (handle, reactivated) = match short.find(session_id) {
                Some((0, _)) => (None, false),
                Some(_) => (short.remove(session_id), false),
                None => (long.as_ref().and_then(|l| l.remove(session_id)), true),
            };
            match handle {
                Some(handle) => {
                    short.head().insert(Arc::clone(&handle));
                    (handle, reactivated)
                }
                None => return false,
            }
        };

        if reactivated {
            debug!(session_id = %session_id, "Long-term session reactivated");
            self.listeners().session_reactivated(&moved);
        }
        self.write_through(&moved);
        true
    }

    fn fetch_from_storage(&self, session_id: &str) -> Option<SessionHandle> {
        let mut snapshot = match self.inner.storage.lookup(session_id) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                trace!(session_id = %session_id, "Session not found");
                return None;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Secondary storage lookup failed");
                return None;
            }
        };
        if snapshot.session_id != session_id {
            warn!(
                session_id = %session_id,
                returned = %snapshot.session_id,
                "Secondary storage returned a different session"
            );
            return None;
        }

        // A session old enough to need fetching is past its token's window.
        snapshot.random_token = None;
        let handle = Arc::new(SessionRecord::from(snapshot));
        let _admission = self.inner.admission.lock();
        let short = self.inner.short_term.read();
        let long = self.inner.long_term.as_ref().map(Window::read);

        // Another lookup may have fetched it while we were asking storage.
        if let Some((_, existing)) = short
            .find(session_id)
            .or_else(|| long.as_ref().and_then(|l| l.find(session_id)))
        {
            return Some(existing);
        }

        if let Some(auth_id) = handle.auth_id()
            && let Err(e) = check_auth_id(auth_id, &short, long.as_deref())
        {
            warn!(session_id = %session_id, error = %e, "Fetched session not admitted");
            return None;
        }

        short.head().insert(Arc::clone(&handle));
        self.admit(&handle);

        debug!(session_id = %session_id, "Session fetched from secondary storage");
        Some(handle)
    }

    fn write_through(&self, handle: &SessionHandle) {
        if handle.is_transient() {
            return;
        }
        if let Err(e) = self.inner.storage.store(&handle.snapshot()) {
            warn!(session_id = %handle.session_id(), error = %e, "Secondary storage write failed");
        }
    }

    fn delete_from_storage(&self, session_id: &str) {
        if let Err(e) = self.inner.storage.remove(session_id) {
            warn!(session_id = %session_id, error = %e, "Secondary storage delete failed");
        }
    }

    fn admit(&self, handle: &SessionHandle) {
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        *self
            .inner
            .per_context
            .lock()
            .entry(handle.context_id().to_string())
            .or_insert(0) += 1;
    }

    /// Bookkeeping for a session that left both windows.
    fn depart(&self, handle: &SessionHandle) {
        let _ = self
            .inner
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        let mut per_context = self.inner.per_context.lock();
        if let Some(count) = per_context.get_mut(handle.context_id()) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                per_context.remove(handle.context_id());
            }
        }
        drop(per_context);

        if let Some(token) = handle.random_token() {
            self.inner.tokens.cancel(&token);
        }
    }
}

fn check_auth_id(auth_id: &str, short: &Generations, long: Option<&Generations>) -> Result<()> {
    if short.contains_auth_id(auth_id) || long.is_some_and(|l| l.contains_auth_id(auth_id)) {
        return Err(Error::DuplicateAuthId(auth_id.to_string()));
    }
    Ok(())
}

impl<S: SessionStorage + 'static> Clone for SessionStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SessionStorage + 'static> std::fmt::Debug for SessionStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.inner.config)
            .field("active", &self.active_count())
            .field("listeners", &self.inner.listeners.read().len())
            .finish()
    }
}
