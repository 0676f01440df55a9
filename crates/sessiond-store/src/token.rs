//! One-shot random token exchange.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct TokenEntry {
    session_id: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct TokenState {
    entries: HashMap<String, TokenEntry>,
    /// Deadlines in registration order. Token lifetimes are uniform, so this
    /// is also expiry order.
    deadlines: VecDeque<(Instant, String)>,
}

/// Maps random tokens to session ids until redeemed or expired.
///
/// Redemption and expiry both go through the same lock and remove the entry,
/// so for any token exactly one of them wins.
#[derive(Debug, Default)]
pub(crate) struct RandomTokenIndex {
    state: Mutex<TokenState>,
}

impl RandomTokenIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token. Returns `false` if a live entry already uses it.
    pub fn put(&self, token: &str, session_id: &str, ttl: Duration) -> bool {
        self.put_at(token, session_id, ttl, Instant::now())
    }

    fn put_at(&self, token: &str, session_id: &str, ttl: Duration, now: Instant) -> bool {
        let mut state = self.state.lock();
        if let Some(existing) = state.entries.get(token)
            && existing.expires_at > now
        {
            return false;
        }
        let expires_at = now + ttl;
        state.entries.insert(
            token.to_string(),
            TokenEntry {
                session_id: session_id.to_string(),
                expires_at,
            },
        );
        state.deadlines.push_back((expires_at, token.to_string()));
        true
    }

    /// Atomically remove a token and return its session id.
    ///
    /// An expired entry that has not been reaped yet counts as absent.
    pub fn take_if_present(&self, token: &str) -> Option<String> {
        self.take_at(token, Instant::now())
    }

    fn take_at(&self, token: &str, now: Instant) -> Option<String> {
        let entry = self.state.lock().entries.remove(token)?;
        if entry.expires_at <= now {
            trace!("Random token expired before redemption");
            return None;
        }
        Some(entry.session_id)
    }

    /// Drop a token ahead of its deadline.
    pub fn cancel(&self, token: &str) -> bool {
        self.state.lock().entries.remove(token).is_some()
    }

    /// Remove all entries whose deadline has passed. Returns how many expired.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let mut expired = 0;
        while let Some((deadline, _)) = state.deadlines.front() {
            if *deadline > now {
                break;
            }
            let Some((deadline, token)) = state.deadlines.pop_front() else {
                break;
            };
            // Entry may have been redeemed, cancelled, or re-registered since.
            let matches = state
                .entries
                .get(&token)
                .is_some_and(|entry| entry.expires_at == deadline);
            if matches {
                state.entries.remove(&token);
                expired += 1;
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.state.lock().deadlines.len()
    }
}
