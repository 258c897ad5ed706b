use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OwnedMutexGuard;

/// The per-client key-value mapping held by a session.
pub type SessionData = Map<String, Value>;

/// A session as persisted by a [`SessionStore`](super::SessionStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub data: SessionData,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(data: SessionData, updated_at: DateTime<Utc>) -> Self {
        Self { data, updated_at }
    }

    /// True when the record was last written before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.updated_at < cutoff
    }
}

/// Write lock on a single session, released when dropped.
#[derive(Default)]
pub struct StoreLock {
    guard: Option<OwnedMutexGuard<()>>,
}

impl StoreLock {
    /// A lock that holds nothing, for stores without per-session locking.
    pub fn none() -> Self {
        Self { guard: None }
    }

    pub fn from_guard(guard: OwnedMutexGuard<()>) -> Self {
        Self { guard: Some(guard) }
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }
}

impl fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLock")
            .field("held", &self.is_held())
            .finish()
    }
}
