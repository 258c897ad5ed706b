use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::storage::errors::StorageError;
use crate::storage::types::{SessionRecord, StoreLock};

/// Process-local session store. Requests for the same session are serialized
/// through a per-key write lock.
pub struct InMemorySessionStore {
    pub(super) entry: Mutex<HashMap<String, SessionRecord>>,
    pub(super) locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

pub struct RedisSessionStore {
    pub(super) client: redis::Client,
}

/// Backing storage for sessions, addressed by the store key derived from the
/// session identifier.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Initialize the store. This is called when the store is created.
    async fn init(&self) -> Result<(), StorageError>;

    /// Acquire the write lock for a session. Held until the returned lock is dropped.
    async fn lock(&self, key: &str) -> Result<StoreLock, StorageError>;

    /// Load a session record, `None` if the key is unknown.
    async fn open(&self, key: &str) -> Result<Option<SessionRecord>, StorageError>;

    /// Persist a session record. `ttl` is the lifetime in seconds hint for stores
    /// that expire keys themselves.
    async fn write(&self, key: &str, record: &SessionRecord, ttl: u64)
    -> Result<(), StorageError>;

    /// Remove a session record.
    async fn destroy(&self, key: &str) -> Result<(), StorageError>;

    /// Store `record` under `new_key`, removing `old_key` when `delete_old` is set.
    async fn regenerate(
        &self,
        old_key: &str,
        new_key: &str,
        record: &SessionRecord,
        ttl: u64,
        delete_old: bool,
    ) -> Result<(), StorageError>;

    /// Remove every record last written before `cutoff`. Returns the number removed.
    async fn gc(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;
}
