//! Sliding windows of generations.

use std::collections::VecDeque;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;

use crate::generation::Generation;
use crate::record::{SessionHandle, UserKey};

/// Role of a window within the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowKind {
    /// Fast-rotating window of recently active sessions.
    ShortTerm,
    /// Slow-rotating window of sessions kept past normal expiry.
    LongTerm,
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowKind::ShortTerm => write!(f, "short-term"),
            WindowKind::LongTerm => write!(f, "long-term"),
        }
    }
}

/// Fixed-length sequence of generations, index 0 newest.
#[derive(Debug)]
pub(crate) struct Generations {
    buckets: VecDeque<Generation>,
}

impl Generations {
    fn with_depth(depth: usize) -> Self {
        let buckets = (0..depth).map(|_| Generation::new()).collect();
        Self { buckets }
    }

    /// The newest generation.
    pub fn head(&self) -> &Generation {
        &self.buckets[0]
    }

    /// Locate a session, returning its generation index.
    pub fn find(&self, session_id: &str) -> Option<(usize, SessionHandle)> {
        self.buckets
            .iter()
            .enumerate()
            .find_map(|(idx, g)| g.get(session_id).map(|handle| (idx, handle)))
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.buckets.iter().find_map(|g| g.remove(session_id))
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.buckets.iter().any(|g| g.contains(session_id))
    }

    pub fn contains_auth_id(&self, auth_id: &str) -> bool {
        self.buckets.iter().any(|g| g.contains_auth_id(auth_id))
    }

    pub fn get_by_auth_id(&self, auth_id: &str) -> Option<SessionHandle> {
        self.buckets.iter().find_map(|g| g.get_by_auth_id(auth_id))
    }

    pub fn sessions_for_user(&self, key: &UserKey) -> Vec<SessionHandle> {
        self.buckets
            .iter()
            .flat_map(|g| g.sessions_for_user(key))
            .collect()
    }

    pub fn count_for_user(&self, key: &UserKey) -> usize {
        self.buckets.iter().map(|g| g.count_for_user(key)).sum()
    }

    pub fn has_user(&self, key: &UserKey) -> bool {
        self.buckets.iter().any(|g| g.has_user(key))
    }

    pub fn remove_user(&self, key: &UserKey) -> Vec<SessionHandle> {
        self.buckets
            .iter()
            .flat_map(|g| g.remove_user(key))
            .collect()
    }

    pub fn remove_matching<F>(&self, predicate: F) -> Vec<SessionHandle>
    where
        F: Fn(&SessionHandle) -> bool,
    {
        self.buckets
            .iter()
            .flat_map(|g| g.remove_matching(&predicate))
            .collect()
    }

    /// Push a fresh head and pop the tail.
    pub fn rotate(&mut self) -> Generation {
        self.buckets.push_front(Generation::new());
        self.buckets.pop_back().unwrap_or_default()
    }

    /// Replace every generation with an empty one, returning the contents.
    pub fn drain(&mut self) -> Vec<SessionHandle> {
        let depth = self.buckets.len();
        let old = std::mem::replace(self, Self::with_depth(depth));
        old.buckets
            .into_iter()
            .flat_map(Generation::into_sessions)
            .collect()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.buckets.iter().map(Generation::len).collect()
    }
}

/// A window of generations guarded by one reader/writer lock.
///
/// The lock only covers the shape of the sequence. Readers may insert into
/// and remove from individual generations; rotation and promotion take the
/// writer side.
#[derive(Debug)]
pub(crate) struct Window {
    kind: WindowKind,
    generations: RwLock<Generations>,
}

impl Window {
    pub fn new(kind: WindowKind, depth: usize) -> Self {
        Self {
            kind,
            generations: RwLock::new(Generations::with_depth(depth.max(1))),
        }
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Generations> {
        self.generations.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Generations> {
        self.generations.write()
    }

    pub fn depth(&self) -> usize {
        self.generations.read().buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SessionRecord;
    use std::sync::Arc;

    fn session(id: &str) -> SessionHandle {
        Arc::new(SessionRecord::new("u1", "c1").with_session_id(id))
    }

    #[test]
    fn test_find_reports_generation() {
        let window = Window::new(WindowKind::ShortTerm, 3);
        window.read().head().insert(session("s1"));
        window.write().rotate();
        window.read().head().insert(session("s2"));

        let generations = window.read();
        assert_eq!(generations.find("s2").map(|(idx, _)| idx), Some(0));
        assert_eq!(generations.find("s1").map(|(idx, _)| idx), Some(1));
        assert!(generations.find("s3").is_none());
    }

    #[test]
    fn test_rotate_pops_tail() {
        let window = Window::new(WindowKind::ShortTerm, 2);
        window.read().head().insert(session("s1"));

        let popped = window.write().rotate();
        assert!(popped.is_empty());
        assert!(window.read().contains("s1"));

        let popped = window.write().rotate();
        assert_eq!(popped.len(), 1);
        assert!(!window.read().contains("s1"));
        assert_eq!(window.depth(), 2);
    }

    #[test]
    fn test_zero_depth_is_clamped() {
        let window = Window::new(WindowKind::LongTerm, 0);
        assert_eq!(window.depth(), 1);
        assert_eq!(window.kind(), WindowKind::LongTerm);
    }

    #[test]
    fn test_drain() {
        let window = Window::new(WindowKind::ShortTerm, 2);
        window.read().head().insert(session("s1"));
        window.write().rotate();
        window.read().head().insert(session("s2"));

        let drained = window.write().drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(window.read().sizes(), vec![0, 0]);
    }

    #[test]
    fn test_user_queries_span_generations() {
        let window = Window::new(WindowKind::ShortTerm, 2);
        let key = UserKey::new("u1", "c1");
        window.read().head().insert(session("s1"));
        window.write().rotate();
        window.read().head().insert(session("s2"));

        let generations = window.read();
        assert_eq!(generations.count_for_user(&key), 2);
        assert_eq!(generations.sessions_for_user(&key).len(), 2);
        assert_eq!(generations.remove_user(&key).len(), 2);
        assert!(!generations.has_user(&key));
    }
}
