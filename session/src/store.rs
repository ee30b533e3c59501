use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sessionkit_core::SessionResult;

/// Session data structure
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStore {
    /// Unique session identifier
    pub id: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last time the session was read or written
    pub last_accessed: DateTime<Utc>,
    /// Session values, kept in insertion order
    pub values: Map<String, Value>,
}

impl SessionStore {
    /// Create an empty session with the given ID
    pub fn new(id: String) -> Self {
        Self::new_at(id, Utc::now())
    }

    pub fn new_at(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            last_accessed: now,
            values: Map::new(),
        }
    }

    /// Set a key-value pair in the session data
    pub fn set(&mut self, key: String, value: Value) {
        self.values.insert(key, value);
    }

    /// Get a value from the session data by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Remove a key-value pair, keeping the order of the remaining keys
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Whether the session sat idle for longer than `max_lifetime` as of `now`
    pub fn is_expired(&self, max_lifetime: Duration, now: DateTime<Utc>) -> bool {
        expiry_cutoff(now, max_lifetime).is_some_and(|cutoff| self.last_accessed < cutoff)
    }
}

/// Oldest access time still considered live, `None` when nothing can have expired yet
pub fn expiry_cutoff(now: DateTime<Utc>, max_lifetime: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(max_lifetime)
        .ok()
        .and_then(|lifetime| now.checked_sub_signed(lifetime))
}

/// Handle to a live session, handed to request handling code.
///
/// A handle refers to provider-owned state; it is not a copy. Writes through one handle are
/// visible to every later read of the same identifier. Implementations must synchronize
/// concurrent handles to the same session internally.
#[async_trait]
pub trait Session: Send + Sync + Debug {
    /// Store `value` under `key`
    async fn set(&self, key: &str, value: Value) -> SessionResult<()>;

    /// Read the value under `key`
    async fn get(&self, key: &str) -> Option<Value>;

    /// Remove `key`; removing a missing key is not an error
    async fn delete(&self, key: &str) -> SessionResult<()>;

    /// Session identifier
    fn id(&self) -> &str;

    /// Copy of the current session state
    async fn snapshot(&self) -> SessionResult<SessionStore>;
}

/// Type alias for Arc-wrapped Session trait objects
pub type SessionRef = Arc<dyn Session>;

/// Storage backend for sessions
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Create an empty session under `id`.
    ///
    /// Fails with `AlreadyExists` when a session is held under `id`.
    async fn init(&self, id: &str) -> SessionResult<SessionRef>;

    /// Fetch the session under `id`, refreshing its access time.
    ///
    /// Fails with `NotFound` when the session is absent or was idle for longer than
    /// `max_lifetime`; an expired session is dropped rather than revived.
    async fn read(&self, id: &str, max_lifetime: Duration) -> SessionResult<SessionRef>;

    /// Remove the session under `id`; fails with `NotFound` when absent
    async fn destroy(&self, id: &str) -> SessionResult<()>;

    /// Remove every session idle for longer than `max_lifetime`, returning how many went
    async fn gc(&self, max_lifetime: Duration) -> SessionResult<usize>;

    /// Number of sessions currently held
    async fn count(&self) -> SessionResult<usize>;
}

/// Type alias for Arc-wrapped Provider trait objects
pub type ProviderRef = Arc<dyn Provider>;
