use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::storage::errors::StorageError;
use crate::storage::types::{SessionRecord, StoreLock};

use super::types::{InMemorySessionStore, SessionStore};

const SESSION_PREFIX: &str = "session";

impl InMemorySessionStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory session store");
        Self {
            entry: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn make_key(key: &str) -> String {
        format!("{SESSION_PREFIX}:{key}")
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.entry.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entry.lock().await.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(()) // Nothing to initialize for in-memory store
    }

    async fn lock(&self, key: &str) -> Result<StoreLock, StorageError> {
        let mutex = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(Self::make_key(key))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        Ok(StoreLock::from_guard(mutex.lock_owned().await))
    }

    async fn open(&self, key: &str) -> Result<Option<SessionRecord>, StorageError> {
        let key = Self::make_key(key);
        Ok(self.entry.lock().await.get(&key).cloned())
    }

    async fn write(
        &self,
        key: &str,
        record: &SessionRecord,
        _ttl: u64,
    ) -> Result<(), StorageError> {
        let key = Self::make_key(key);
        self.entry.lock().await.insert(key, record.clone());
        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<(), StorageError> {
        let key = Self::make_key(key);
        self.entry.lock().await.remove(&key);
        self.locks.lock().await.remove(&key);
        Ok(())
    }

    async fn regenerate(
        &self,
        old_key: &str,
        new_key: &str,
        record: &SessionRecord,
        _ttl: u64,
        delete_old: bool,
    ) -> Result<(), StorageError> {
        let mut entry = self.entry.lock().await;
        if delete_old {
            entry.remove(&Self::make_key(old_key));
        }
        entry.insert(Self::make_key(new_key), record.clone());
        Ok(())
    }

    async fn gc(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut entry = self.entry.lock().await;
        let before = entry.len();
        entry.retain(|_, record| !record.is_stale(cutoff));
        let removed = before - entry.len();

        // Drop lock slots nobody holds or waits on
        self.locks
            .lock()
            .await
            .retain(|_, mutex| Arc::strong_count(mutex) > 1);

        tracing::debug!("In-memory session gc removed {} sessions", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::SessionData;
    use chrono::Duration;
    use serde_json::Value;

    fn record_at(updated_at: DateTime<Utc>, user: i64) -> SessionRecord {
        let mut data = SessionData::new();
        data.insert("user_id".to_string(), Value::from(user));
        SessionRecord::new(data, updated_at)
    }

    #[test]
    fn test_make_key() {
        assert_eq!(InMemorySessionStore::make_key("abc123"), "session:abc123");
    }

    #[tokio::test]
    async fn test_init() {
        let store = InMemorySessionStore::new();
        assert!(store.init().await.is_ok());
    }

    #[tokio::test]
    async fn test_write_and_open() {
        let store = InMemorySessionStore::new();
        let record = record_at(Utc::now(), 7);

        store.write("key1", &record, 60).await.expect("write");
        let opened = store.open("key1").await.expect("open");

        assert_eq!(opened, Some(record));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_open_nonexistent_key() {
        let store = InMemorySessionStore::new();
        let opened = store.open("missing").await.expect("open");
        assert!(opened.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_destroy() {
        let store = InMemorySessionStore::new();
        store
            .write("key1", &record_at(Utc::now(), 1), 60)
            .await
            .expect("write");

        store.destroy("key1").await.expect("destroy");

        assert!(store.open("key1").await.expect("open").is_none());
    }

    #[tokio::test]
    async fn test_regenerate_deletes_old_key() {
        let store = InMemorySessionStore::new();
        let old = record_at(Utc::now(), 1);
        let current = record_at(Utc::now(), 2);
        store.write("old", &old, 60).await.expect("write");

        store
            .regenerate("old", "new", &current, 60, true)
            .await
            .expect("regenerate");

        assert!(store.open("old").await.expect("open").is_none());
        assert_eq!(store.open("new").await.expect("open"), Some(current));
    }

    #[tokio::test]
    async fn test_regenerate_keeps_old_key() {
        let store = InMemorySessionStore::new();
        let old = record_at(Utc::now(), 1);
        let current = record_at(Utc::now(), 2);
        store.write("old", &old, 60).await.expect("write");

        store
            .regenerate("old", "new", &current, 60, false)
            .await
            .expect("regenerate");

        assert_eq!(store.open("old").await.expect("open"), Some(old));
        assert_eq!(store.open("new").await.expect("open"), Some(current));
    }

    #[tokio::test]
    async fn test_gc_removes_only_stale_records() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        store
            .write("stale", &record_at(now - Duration::seconds(2000), 1), 60)
            .await
            .expect("write");
        store
            .write("fresh", &record_at(now - Duration::seconds(10), 2), 60)
            .await
            .expect("write");

        let removed = store.gc(now - Duration::seconds(1440)).await.expect("gc");

        assert_eq!(removed, 1);
        assert!(store.open("stale").await.expect("open").is_none());
        assert!(store.open("fresh").await.expect("open").is_some());
    }

    #[tokio::test]
    async fn test_lock_serializes_same_key() {
        let store = InMemorySessionStore::new();
        let first = store.lock("key1").await.expect("lock");
        assert!(first.is_held());

        // A second lock on the same key waits for the first to be released
        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(50), store.lock("key1")).await;
        assert!(blocked.is_err());

        // Other keys are not affected
        let other = store.lock("key2").await.expect("lock");
        assert!(other.is_held());

        drop(first);
        let second =
            tokio::time::timeout(std::time::Duration::from_millis(500), store.lock("key1"))
                .await
                .expect("lock should be released")
                .expect("lock");
        assert!(second.is_held());
    }

    #[tokio::test]
    async fn test_gc_prunes_unused_lock_slots() {
        let store = InMemorySessionStore::new();
        let held = store.lock("held").await.expect("lock");
        drop(store.lock("released").await.expect("lock"));

        store.gc(Utc::now()).await.expect("gc");

        let locks = store.locks.lock().await;
        assert!(locks.contains_key("session:held"));
        assert!(!locks.contains_key("session:released"));
        drop(locks);
        drop(held);
    }
}
