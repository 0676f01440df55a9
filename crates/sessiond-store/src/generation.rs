//! A single time-bucket of sessions.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::record::{SessionHandle, UserKey};

#[derive(Debug, Default)]
struct Maps {
    sessions: HashMap<String, SessionHandle>,
    by_user: HashMap<UserKey, HashSet<String>>,
    by_auth_id: HashMap<String, String>,
}

impl Maps {
    fn index(&mut self, handle: &SessionHandle) {
        let id = handle.session_id().to_string();
        self.by_user
            .entry(handle.user_key())
            .or_default()
            .insert(id.clone());
        if let Some(auth_id) = handle.auth_id() {
            self.by_auth_id.insert(auth_id.to_string(), id);
        }
    }

    fn unindex(&mut self, handle: &SessionHandle) {
        let key = handle.user_key();
        if let Some(ids) = self.by_user.get_mut(&key) {
            ids.remove(handle.session_id());
            if ids.is_empty() {
                self.by_user.remove(&key);
            }
        }
        if let Some(auth_id) = handle.auth_id() {
            self.by_auth_id.remove(auth_id);
        }
    }
}

/// Sessions sharing an approximate age.
///
/// The id map and its derived indexes sit behind one lock so they never
/// disagree. Window-level locks only protect the sequence of generations.
#[derive(Debug, Default)]
pub(crate) struct Generation {
    maps: RwLock<Maps>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Returns the displaced handle if the id was present.
    pub fn insert(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let mut maps = self.maps.write();
        let previous = maps
            .sessions
            .insert(handle.session_id().to_string(), handle.clone());
        if let Some(ref old) = previous {
            maps.unindex(old);
        }
        maps.index(&handle);
        previous
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        let mut maps = self.maps.write();
        let handle = maps.sessions.remove(session_id)?;
        maps.unindex(&handle);
        Some(handle)
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.maps.read().sessions.get(session_id).cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.maps.read().sessions.contains_key(session_id)
    }

    pub fn get_by_auth_id(&self, auth_id: &str) -> Option<SessionHandle> {
        let maps = self.maps.read();
        maps.by_auth_id
            .get(auth_id)
            .and_then(|id| maps.sessions.get(id))
            .cloned()
    }

    pub fn contains_auth_id(&self, auth_id: &str) -> bool {
        self.maps.read().by_auth_id.contains_key(auth_id)
    }

    pub fn sessions_for_user(&self, key: &UserKey) -> Vec<SessionHandle> {
        let maps = self.maps.read();
        match maps.by_user.get(key) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| maps.sessions.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn count_for_user(&self, key: &UserKey) -> usize {
        self.maps.read().by_user.get(key).map_or(0, HashSet::len)
    }

    pub fn has_user(&self, key: &UserKey) -> bool {
        self.maps.read().by_user.contains_key(key)
    }

    /// Remove every session of a user, returning the removed handles.
    pub fn remove_user(&self, key: &UserKey) -> Vec<SessionHandle> {
        let mut maps = self.maps.write();
        let Some(ids) = maps.by_user.remove(key) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(handle) = maps.sessions.remove(&id) {
                if let Some(auth_id) = handle.auth_id() {
                    maps.by_auth_id.remove(auth_id);
                }
                removed.push(handle);
            }
        }
        removed
    }

    /// Remove every session matching `predicate`.
    pub fn remove_matching<F>(&self, predicate: F) -> Vec<SessionHandle>
    where
        F: Fn(&SessionHandle) -> bool,
    {
        let mut maps = self.maps.write();
        let ids: Vec<String> = maps
            .sessions
            .iter()
            .filter(|(_, handle)| predicate(handle))
            .map(|(id, _)| id.clone())
            .collect();
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(handle) = maps.sessions.remove(&id) {
                maps.unindex(&handle);
                removed.push(handle);
            }
        }
        removed
    }

    /// Move all sessions of `other` into this generation.
    pub fn absorb(&self, other: Generation) {
        let incoming = other.maps.into_inner();
        let mut maps = self.maps.write();
        for (id, handle) in incoming.sessions {
            if let Some(old) = maps.sessions.insert(id, handle.clone()) {
                maps.unindex(&old);
            }
            maps.index(&handle);
        }
    }

    /// Consume the generation and return its sessions.
    pub fn into_sessions(self) -> Vec<SessionHandle> {
        self.maps.into_inner().sessions.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.maps.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().sessions.is_empty()
    }
}
