//! Session records and their serializable snapshot form.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shared handle to a resident session.
pub type SessionHandle = Arc<SessionRecord>;

/// Key of the per-user index: a user is only unique within its context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct UserKey {
    pub user_id: String,
    pub context_id: String,
}

impl UserKey {
    pub fn new(user_id: &str, context_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            context_id: context_id.to_string(),
        }
    }
}

/// One authenticated user session.
///
/// Identity fields are fixed at construction. The random token can be
/// cleared exactly once, and the parameter bag is shared mutable state that
/// other subsystems use to stash per-session values.
#[derive(Debug)]
pub struct SessionRecord {
    session_id: String,
    user_id: String,
    context_id: String,
    login: Option<String>,
    auth_id: Option<String>,
    credentials: Option<String>,
    origin_host: Option<String>,
    client: Option<String>,
    created_at: DateTime<Utc>,
    transient: bool,
    random_token: Mutex<Option<String>>,
    parameters: RwLock<HashMap<String, serde_json::Value>>,
}

impl SessionRecord {
    /// Create a record with freshly generated session id and random token.
    pub fn new(user_id: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            session_id: new_identifier(),
            user_id: user_id.into(),
            context_id: context_id.into(),
            login: None,
            auth_id: None,
            credentials: None,
            origin_host: None,
            client: None,
            created_at: Utc::now(),
            transient: false,
            random_token: Mutex::new(Some(new_identifier())),
            parameters: RwLock::new(HashMap::new()),
        }
    }

    /// Use an externally assigned session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Use an externally assigned random token.
    pub fn with_random_token(mut self, token: impl Into<String>) -> Self {
        *self.random_token.get_mut() = Some(token.into());
        self
    }

    /// Create the record without a random token.
    pub fn without_random_token(mut self) -> Self {
        *self.random_token.get_mut() = None;
        self
    }

    /// Set the login name.
    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    /// Set the auth id used to detect duplicate logins.
    pub fn with_auth_id(mut self, auth_id: impl Into<String>) -> Self {
        self.auth_id = Some(auth_id.into());
        self
    }

    /// Set the opaque credentials reference.
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Set the origin host of the client.
    pub fn with_origin_host(mut self, host: impl Into<String>) -> Self {
        self.origin_host = Some(host.into());
        self
    }

    /// Set the client identifier.
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Set the creation timestamp.
    pub fn with_created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = ts;
        self
    }

    /// Mark the session as transient.
    ///
    /// Transient sessions never enter the long-term window and are never
    /// written to secondary storage.
    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// Set a parameter while building the record.
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.get_mut().insert(key.into(), value);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    pub fn auth_id(&self) -> Option<&str> {
        self.auth_id.as_deref()
    }

    pub fn credentials(&self) -> Option<&str> {
        self.credentials.as_deref()
    }

    pub fn origin_host(&self) -> Option<&str> {
        self.origin_host.as_deref()
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Current random token, if it has not been redeemed yet.
    pub fn random_token(&self) -> Option<String> {
        self.random_token.lock().clone()
    }

    /// Clear the random token if it still equals `token`.
    ///
    /// Returns `true` for exactly one caller per token.
    pub(crate) fn redeem_random_token(&self, token: &str) -> bool {
        let mut current = self.random_token.lock();
        if current.as_deref() == Some(token) {
            *current = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn user_key(&self) -> UserKey {
        UserKey::new(&self.user_id, &self.context_id)
    }

    /// Get a parameter value.
    pub fn parameter(&self, key: &str) -> Option<serde_json::Value> {
        self.parameters.read().get(key).cloned()
    }

    /// Set a parameter value, returning the previous one.
    pub fn set_parameter(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.parameters.write().insert(key.into(), value)
    }

    /// Remove a parameter, returning its value.
    pub fn remove_parameter(&self, key: &str) -> Option<serde_json::Value> {
        self.parameters.write().remove(key)
    }

    /// Names of all parameters currently set.
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.read().keys().cloned().collect()
    }

    /// Copy the record into its plain-data form.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            random_token: self.random_token(),
            user_id: self.user_id.clone(),
            context_id: self.context_id.clone(),
            login: self.login.clone(),
            auth_id: self.auth_id.clone(),
            credentials: self.credentials.clone(),
            origin_host: self.origin_host.clone(),
            client: self.client.clone(),
            created_at: self.created_at,
            transient: self.transient,
            parameters: self.parameters.read().clone(),
        }
    }
}

impl From<SessionSnapshot> for SessionRecord {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            user_id: snapshot.user_id,
            context_id: snapshot.context_id,
            login: snapshot.login,
            auth_id: snapshot.auth_id,
            credentials: snapshot.credentials,
            origin_host: snapshot.origin_host,
            client: snapshot.client,
            created_at: snapshot.created_at,
            transient: snapshot.transient,
            random_token: Mutex::new(snapshot.random_token),
            parameters: RwLock::new(snapshot.parameters),
        }
    }
}

/// Serializable copy of a [`SessionRecord`].
///
/// Used at the secondary storage boundary and for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_token: Option<String>,
    pub user_id: String,
    pub context_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub transient: bool,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

fn new_identifier() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_generates_identifiers() {
        let a = SessionRecord::new("user-1", "ctx-1");
        let b = SessionRecord::new("user-1", "ctx-1");

        assert_eq!(a.session_id().len(), 32);
        assert_ne!(a.session_id(), b.session_id());
        assert!(a.random_token().is_some());
        assert_ne!(a.random_token(), b.random_token());
    }

    #[test]
    fn test_redeem_random_token_once() {
        let record = SessionRecord::new("user-1", "ctx-1").with_random_token("tok");

        assert!(!record.redeem_random_token("other"));
        assert!(record.redeem_random_token("tok"));
        assert!(!record.redeem_random_token("tok"));
        assert!(record.random_token().is_none());
    }

    #[test]
    fn test_parameters() {
        let record = SessionRecord::new("user-1", "ctx-1").with_parameter("lang", json!("en"));

        assert_eq!(record.parameter("lang"), Some(json!("en")));
        assert_eq!(record.set_parameter("lang", json!("de")), Some(json!("en")));
        assert_eq!(record.remove_parameter("lang"), Some(json!("de")));
        assert!(record.parameter_names().is_empty());
    }

    #[test]
    fn test_snapshot_serde() {
        let record = SessionRecord::new("user-1", "ctx-1")
            .with_session_id("s1")
            .with_login("alice@example.com")
            .with_auth_id("auth-1")
            .with_client("webmail")
            .with_parameter("count", json!(3));

        let snapshot = record.snapshot();
        let encoded = serde_json::to_string(&snapshot).unwrap();
        assert!(!encoded.contains("origin_host"));

        let decoded: SessionSnapshot = serde_json::from_str(&encoded).unwrap();
        let restored = SessionRecord::from(decoded);
        assert_eq!(restored.session_id(), "s1");
        assert_eq!(restored.auth_id(), Some("auth-1"));
        assert_eq!(restored.parameter("count"), Some(json!(3)));
        assert_eq!(restored.random_token(), record.random_token());
    }
}
