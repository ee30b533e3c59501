use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sessionkit_core::{SessionError, SessionResult};
use tracing::{debug, info, warn};

use crate::registry::ProviderRegistry;
use crate::store::{expiry_cutoff, Provider, Session, SessionRef, SessionStore};

/// Name the in-memory backend registers under
pub const MEMORY_PROVIDER: &str = "memory";

/// Register the in-memory backend in `registry`
pub fn register(registry: &mut ProviderRegistry) {
    registry.register(MEMORY_PROVIDER, Arc::new(MemoryProvider::new()));
}

/// Position in the recency index: access time, then insertion sequence for ties
type RecencyKey = (DateTime<Utc>, u64);

type SharedStore = Arc<RwLock<SessionStore>>;

#[derive(Debug)]
struct Entry {
    store: SharedStore,
    recency: RecencyKey,
}

/// All live sessions plus an index ordering them from least to most recently used.
///
/// Every id in `recency` has exactly one entry in `sessions` and the entry's `recency`
/// field is its key in the index.
#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<String, Entry>,
    recency: BTreeMap<RecencyKey, String>,
    next_seq: u64,
}

impl Registry {
    fn next_key(&mut self, at: DateTime<Utc>) -> RecencyKey {
        let key = (at, self.next_seq);
        self.next_seq += 1;
        key
    }

    fn insert(&mut self, store: SessionStore) -> SharedStore {
        let key = self.next_key(store.last_accessed);
        let id = store.id.clone();
        let shared = Arc::new(RwLock::new(store));

        if let Some(old) = self.sessions.insert(
            id.clone(),
            Entry {
                store: Arc::clone(&shared),
                recency: key,
            },
        ) {
            self.recency.remove(&old.recency);
        }
        self.recency.insert(key, id);
        shared
    }

    /// Mark `id` as used at `now`, moving it to the most recent end of the index
    fn touch(&mut self, id: &str, now: DateTime<Utc>) -> SessionResult<Option<SharedStore>> {
        let Some(entry) = self.sessions.get_mut(id) else {
            return Ok(None);
        };
        let key = (now, self.next_seq);
        self.next_seq += 1;

        self.recency.remove(&entry.recency);
        self.recency.insert(key, id.to_string());
        entry.recency = key;
        write_store(&entry.store)?.last_accessed = now;
        Ok(Some(Arc::clone(&entry.store)))
    }

    /// Like `touch`, but only when `id` still maps to `store`
    fn touch_if_current(
        &mut self,
        id: &str,
        store: &SharedStore,
        now: DateTime<Utc>,
    ) -> SessionResult<bool> {
        let current = self
            .sessions
            .get(id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.store, store));
        if !current {
            return Ok(false);
        }
        Ok(self.touch(id, now)?.is_some())
    }

    fn remove(&mut self, id: &str) -> Option<Entry> {
        let entry = self.sessions.remove(id)?;
        self.recency.remove(&entry.recency);
        Some(entry)
    }

    /// Whether `id` is held but idle for longer than `max_lifetime`
    fn is_expired(
        &self,
        id: &str,
        max_lifetime: Duration,
        now: DateTime<Utc>,
    ) -> SessionResult<bool> {
        match self.sessions.get(id) {
            Some(entry) => Ok(read_store(&entry.store)?.is_expired(max_lifetime, now)),
            None => Ok(false),
        }
    }

    /// Remove sessions last used before `cutoff`, oldest first.
    ///
    /// Stops at the first session still live: everything after it in the index is newer.
    fn sweep(&mut self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut removed = Vec::new();
        while let Some((key, _)) = self.recency.first_key_value() {
            if key.0 >= cutoff {
                break;
            }
            let Some((_, id)) = self.recency.pop_first() else {
                break;
            };
            self.sessions.remove(&id);
            removed.push(id);
        }
        removed
    }
}

fn lock_registry(registry: &Mutex<Registry>) -> SessionResult<MutexGuard<'_, Registry>> {
    registry.lock().map_err(|e| {
        SessionError::Storage(format!("Failed to acquire session registry lock: {}", e))
    })
}

fn read_store(store: &RwLock<SessionStore>) -> SessionResult<RwLockReadGuard<'_, SessionStore>> {
    store
        .read()
        .map_err(|e| SessionError::Storage(format!("Failed to acquire read lock: {}", e)))
}

fn write_store(store: &RwLock<SessionStore>) -> SessionResult<RwLockWriteGuard<'_, SessionStore>> {
    store
        .write()
        .map_err(|e| SessionError::Storage(format!("Failed to acquire write lock: {}", e)))
}

/// In-memory implementation of Provider
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    /// Thread-safe storage of sessions
    registry: Arc<Mutex<Registry>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: &str, store: SharedStore) -> SessionRef {
        Arc::new(MemorySession {
            id: id.to_string(),
            store,
            registry: Arc::clone(&self.registry),
        })
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn init(&self, id: &str) -> SessionResult<SessionRef> {
        let now = Utc::now();
        let mut registry = lock_registry(&self.registry)?;

        // Expired leftovers are dropped by read and gc, so any held id counts as live
        if registry.sessions.contains_key(id) {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }

        let store = registry.insert(SessionStore::new_at(id.to_string(), now));
        debug!(session_id = %id, "Created session");
        Ok(self.handle(id, store))
    }

    async fn read(&self, id: &str, max_lifetime: Duration) -> SessionResult<SessionRef> {
        let now = Utc::now();
        let mut registry = lock_registry(&self.registry)?;

        if registry.is_expired(id, max_lifetime, now)? {
            registry.remove(id);
            debug!(session_id = %id, "Dropped expired session on read");
            return Err(SessionError::NotFound(id.to_string()));
        }

        let store = registry
            .touch(id, now)?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        Ok(self.handle(id, store))
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        let mut registry = lock_registry(&self.registry)?;

        let entry = registry
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let lived_secs = (Utc::now() - read_store(&entry.store)?.created_at).num_seconds();
        debug!(session_id = %id, lived_secs, "Destroyed session");
        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> SessionResult<usize> {
        let Some(cutoff) = expiry_cutoff(Utc::now(), max_lifetime) else {
            return Ok(0);
        };
        let removed = lock_registry(&self.registry)?.sweep(cutoff);

        for id in &removed {
            debug!(session_id = %id, "Reclaimed expired session");
        }
        if !removed.is_empty() {
            info!("Reclaimed {} expired sessions", removed.len());
        }

        Ok(removed.len())
    }

    async fn count(&self) -> SessionResult<usize> {
        Ok(lock_registry(&self.registry)?.sessions.len())
    }
}

/// Handle to a session held by `MemoryProvider`.
///
/// Every operation refreshes the session's access time. Once the session is destroyed or
/// reclaimed, writes fail with `NotFound` and reads return nothing.
#[derive(Debug)]
pub struct MemorySession {
    id: String,
    store: SharedStore,
    registry: Arc<Mutex<Registry>>,
}

impl MemorySession {
    /// Refresh the access time; false when the session is no longer live
    fn refresh(&self) -> SessionResult<bool> {
        lock_registry(&self.registry)?.touch_if_current(&self.id, &self.store, Utc::now())
    }

    fn ensure_live(&self) -> SessionResult<()> {
        if self.refresh()? {
            Ok(())
        } else {
            Err(SessionError::NotFound(self.id.clone()))
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn set(&self, key: &str, value: Value) -> SessionResult<()> {
        self.ensure_live()?;
        write_store(&self.store)?.set(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<Value> {
        match self.ensure_live() {
            Ok(()) => {}
            Err(SessionError::NotFound(_)) => return None,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Failed to read session value");
                return None;
            }
        }
        read_store(&self.store).ok()?.get(key).cloned()
    }

    async fn delete(&self, key: &str) -> SessionResult<()> {
        self.ensure_live()?;
        write_store(&self.store)?.remove(key);
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn snapshot(&self) -> SessionResult<SessionStore> {
        Ok(read_store(&self.store)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::sleep;

    const LONG: Duration = Duration::from_secs(3600);

    fn assert_consistent(provider: &MemoryProvider) {
        let registry = provider.registry.lock().unwrap();
        assert_eq!(registry.sessions.len(), registry.recency.len());
        for (key, id) in &registry.recency {
            let entry = registry.sessions.get(id).expect("indexed id has an entry");
            assert_eq!(&entry.recency, key);
            assert_eq!(entry.store.read().unwrap().last_accessed, key.0);
        }
    }

    #[tokio::test]
    async fn test_init_and_read_share_state() {
        let provider = MemoryProvider::new();

        let created = provider.init("s1").await.unwrap();
        assert_eq!(created.id(), "s1");
        created.set("username", json!("bob")).await.unwrap();

        let read = provider.read("s1", LONG).await.unwrap();
        assert_eq!(read.get("username").await, Some(json!("bob")));

        read.set("visits", json!(2)).await.unwrap();
        assert_eq!(created.get("visits").await, Some(json!(2)));
        assert_consistent(&provider);
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let provider = MemoryProvider::new();
        let session = provider.init("s1").await.unwrap();

        session.set("k", json!("v")).await.unwrap();
        assert_eq!(session.get("k").await, Some(json!("v")));

        session.delete("k").await.unwrap();
        assert_eq!(session.get("k").await, None);

        // Deleting a missing key is fine
        session.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_values_keep_insertion_order() {
        let provider = MemoryProvider::new();
        let session = provider.init("s1").await.unwrap();
        for key in ["z", "a", "m"] {
            session.set(key, json!(key)).await.unwrap();
        }

        let snapshot = session.snapshot().await.unwrap();
        let keys: Vec<&str> = snapshot.values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[tokio::test]
    async fn test_init_collision() {
        let provider = MemoryProvider::new();
        provider.init("s1").await.unwrap();

        let result = provider.init("s1").await;
        assert!(matches!(result, Err(SessionError::AlreadyExists(_))));
        assert_eq!(provider.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_missing() {
        let provider = MemoryProvider::new();
        let result = provider.read("nope", LONG).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_destroy() {
        let provider = MemoryProvider::new();
        let session = provider.init("s1").await.unwrap();
        session.set("k", json!("v")).await.unwrap();

        provider.destroy("s1").await.unwrap();

        assert!(matches!(provider.read("s1", LONG).await, Err(SessionError::NotFound(_))));
        assert!(matches!(provider.destroy("s1").await, Err(SessionError::NotFound(_))));
        assert_eq!(session.get("k").await, None);
        assert!(matches!(session.set("k", json!("w")).await, Err(SessionError::NotFound(_))));
        assert_eq!(provider.count().await.unwrap(), 0);
        assert_consistent(&provider);
    }

    #[tokio::test]
    async fn test_read_drops_session_idle_past_lifetime() {
        let provider = MemoryProvider::new();
        let old = provider.init("s1").await.unwrap();
        old.set("k", json!(1)).await.unwrap();

        sleep(Duration::from_millis(120)).await;

        let result = provider.read("s1", Duration::from_millis(50)).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
        assert_eq!(provider.count().await.unwrap(), 0);
        assert_consistent(&provider);

        // The id is free again and the old handle cannot reach the new session
        let fresh = provider.init("s1").await.unwrap();
        assert_eq!(fresh.get("k").await, None);
        assert!(matches!(old.set("k", json!(2)).await, Err(SessionError::NotFound(_))));
        assert_eq!(fresh.get("k").await, None);
    }

    #[tokio::test]
    async fn test_read_keeps_session_within_lifetime() {
        let provider = MemoryProvider::new();
        provider.init("s1").await.unwrap();

        sleep(Duration::from_millis(120)).await;

        assert!(provider.read("s1", Duration::from_secs(5)).await.is_ok());
        assert_eq!(provider.count().await.unwrap(), 1);
        assert_consistent(&provider);
    }

    #[tokio::test]
    async fn test_gc_reclaims_idle_session() {
        let provider = MemoryProvider::new();
        let session = provider.init("s1").await.unwrap();
        let id = session.id().to_string();

        // maxLifetime of one unit (100ms), idle for 1.5 units
        sleep(Duration::from_millis(150)).await;
        let reclaimed = provider.gc(Duration::from_millis(100)).await.unwrap();

        assert_eq!(reclaimed, 1);
        assert!(matches!(provider.read(&id, LONG).await, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_gc_keeps_recently_read_session() {
        let provider = MemoryProvider::new();
        provider.init("idle").await.unwrap();
        provider.init("busy").await.unwrap();

        sleep(Duration::from_millis(150)).await;
        provider.read("busy", LONG).await.unwrap();
        sleep(Duration::from_millis(150)).await;

        let reclaimed = provider.gc(Duration::from_millis(250)).await.unwrap();
        assert_eq!(reclaimed, 1);
        assert!(provider.read("busy", LONG).await.is_ok());
        assert!(provider.read("idle", LONG).await.is_err());
        assert_consistent(&provider);
    }

    #[tokio::test]
    async fn test_handle_activity_counts_as_access() {
        let provider = MemoryProvider::new();
        let session = provider.init("s1").await.unwrap();

        sleep(Duration::from_millis(150)).await;
        session.set("k", json!(true)).await.unwrap();
        sleep(Duration::from_millis(150)).await;

        assert_eq!(provider.gc(Duration::from_millis(250)).await.unwrap(), 0);
        assert_eq!(session.get("k").await, Some(json!(true)));
        assert_consistent(&provider);
    }

    #[test]
    fn test_sweep_stops_at_first_live_entry() {
        let now = Utc::now();
        let at = |secs: i64| now - chrono::Duration::seconds(secs);
        let mut registry = Registry::default();
        registry.insert(SessionStore::new_at("oldest".to_string(), at(30)));
        registry.insert(SessionStore::new_at("old".to_string(), at(20)));
        registry.insert(SessionStore::new_at("recent".to_string(), at(5)));
        registry.insert(SessionStore::new_at("newest".to_string(), at(1)));

        let removed = registry.sweep(at(10));

        assert_eq!(removed, vec!["oldest".to_string(), "old".to_string()]);
        assert!(registry.sessions.contains_key("recent"));
        assert!(registry.sessions.contains_key("newest"));
        assert_eq!(registry.recency.len(), 2);
    }

    #[test]
    fn test_touch_moves_entry_to_newest_end() {
        let now = Utc::now();
        let at = |secs: i64| now - chrono::Duration::seconds(secs);
        let mut registry = Registry::default();
        registry.insert(SessionStore::new_at("a".to_string(), at(30)));
        registry.insert(SessionStore::new_at("b".to_string(), at(20)));

        registry.touch("a", now).unwrap();

        let order: Vec<&str> = registry.recency.values().map(String::as_str).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(registry.sweep(at(10)), vec!["b".to_string()]);
        assert!(registry.sessions.contains_key("a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_on_one_session() {
        let provider = MemoryProvider::new();
        provider.init("shared").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let provider = provider.clone();
            tasks.push(tokio::spawn(async move {
                let session = provider.read("shared", LONG).await.unwrap();
                session.set(&format!("key{}", i), json!(i)).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let session = provider.read("shared", LONG).await.unwrap();
        assert_eq!(session.snapshot().await.unwrap().values.len(), 16);
        assert_consistent(&provider);
    }

    #[test]
    fn test_register_helper() {
        let mut registry = ProviderRegistry::new();
        register(&mut registry);
        assert_eq!(registry.names(), vec![MEMORY_PROVIDER]);
    }
}
