//! Fixtures for session manager tests

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::{COOKIE, HeaderValue, SET_COOKIE};
use http::HeaderMap;

use crate::session::config::{SessionConfig, SessionOptions};
use crate::storage::{
    InMemorySessionStore, SessionRecord, SessionStore, StorageError, StoreLock,
};
use crate::test_utils::{ManualClock, init_test_environment};
use crate::transport::HttpTransport;

use super::manager::SessionManager;

pub(crate) const TEST_EPOCH: i64 = 1_700_000_000;

/// Defaults with garbage collection switched off and a long store lifetime, so
/// tests that move the clock forward keep their sessions.
pub(crate) fn test_options() -> SessionOptions {
    SessionOptions {
        gc_probability: Some(0),
        gc_maxlifetime: Some(86_400),
        ..Default::default()
    }
}

pub(crate) fn request_with_cookie(name: &str, value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(header_value) = HeaderValue::from_str(&format!("{name}={value}")) {
        headers.insert(COOKIE, header_value);
    }
    headers
}

/// All `Set-Cookie` values emitted so far.
pub(crate) fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// One store and clock shared by the managers of consecutive requests.
pub(crate) struct TestContext<S: SessionStore = InMemorySessionStore> {
    pub(crate) store: Arc<S>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) config: SessionConfig,
}

impl TestContext<InMemorySessionStore> {
    pub(crate) fn new(options: SessionOptions) -> Self {
        Self::with_store(options, InMemorySessionStore::new())
    }
}

impl<S: SessionStore> TestContext<S> {
    pub(crate) fn with_store(options: SessionOptions, store: S) -> Self {
        init_test_environment();
        Self {
            store: Arc::new(store),
            clock: Arc::new(ManualClock::at(TEST_EPOCH)),
            config: SessionConfig::from_options(options).expect("test options are valid"),
        }
    }

    /// Manager for a request carrying `session_id` in its cookie, if any.
    pub(crate) fn manager(&self, session_id: Option<&str>) -> SessionManager<HttpTransport> {
        let request = match session_id {
            Some(id) => request_with_cookie(&self.config.name, id),
            None => HeaderMap::new(),
        };
        let store: Arc<dyn SessionStore> = self.store.clone();
        SessionManager::with_clock(
            self.config.clone(),
            store,
            HttpTransport::new(request),
            self.clock.clone(),
        )
    }

    pub(crate) async fn started_manager(
        &self,
        session_id: Option<&str>,
    ) -> SessionManager<HttpTransport> {
        let mut manager = self.manager(session_id);
        manager.start().await.expect("session starts");
        manager
    }

    /// Closes the request's session and returns the id the client holds next.
    pub(crate) async fn finish(&self, manager: &mut SessionManager<HttpTransport>) -> String {
        let id = manager
            .id()
            .expect("session has an id")
            .as_str()
            .to_string();
        assert!(manager.close_write().await, "session write succeeds");
        id
    }
}

/// Store wrapper whose operations can be made to fail one by one.
#[derive(Default)]
pub(crate) struct FailingStore {
    pub(crate) inner: InMemorySessionStore,
    pub(crate) fail_open: bool,
    pub(crate) fail_write: bool,
    pub(crate) fail_destroy: bool,
    pub(crate) fail_regenerate: bool,
    pub(crate) fail_gc: bool,
}

fn injected(operation: &str) -> StorageError {
    StorageError::Storage(format!("injected {operation} failure"))
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn init(&self) -> Result<(), StorageError> {
        self.inner.init().await
    }

    async fn lock(&self, key: &str) -> Result<StoreLock, StorageError> {
        self.inner.lock(key).await
    }

    async fn open(&self, key: &str) -> Result<Option<SessionRecord>, StorageError> {
        if self.fail_open {
            return Err(injected("open"));
        }
        self.inner.open(key).await
    }

    async fn write(&self, key: &str, record: &SessionRecord, ttl: u64) -> Result<(), StorageError> {
        if self.fail_write {
            return Err(injected("write"));
        }
        self.inner.write(key, record, ttl).await
    }

    async fn destroy(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_destroy {
            return Err(injected("destroy"));
        }
        self.inner.destroy(key).await
    }

    async fn regenerate(
        &self,
        old_key: &str,
        new_key: &str,
        record: &SessionRecord,
        ttl: u64,
        delete_old: bool,
    ) -> Result<(), StorageError> {
        if self.fail_regenerate {
            return Err(injected("regenerate"));
        }
        self.inner
            .regenerate(old_key, new_key, record, ttl, delete_old)
            .await
    }

    async fn gc(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        if self.fail_gc {
            return Err(injected("gc"));
        }
        self.inner.gc(cutoff).await
    }
}
