use std::sync::Arc;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::session::config::SessionConfig;
use crate::session::errors::SessionError;
use crate::session::types::{SessionAccess, SessionId};
use crate::storage::{SessionData, SessionRecord, SessionStore, StorageError, StoreLock};
use crate::transport::{HttpTransport, SessionTransport};
use crate::utils::gen_random_u32;

use super::cookie::{SessionCookie, cache_limiter_headers};
use super::csrf::{TOKEN_KEY, TOKEN_TIMESTAMP_KEY};
use super::flash::{FLASH_KEY, FLASH_NEW_KEY};

/// Minimum age, in seconds, of a session id before `start` rotates it.
pub const REGENERATION_INTERVAL_SECS: i64 = 300;

pub(super) const LAST_REGENERATION_KEY: &str = "__last_regeneration";

const RESERVED_KEYS: [&str; 5] = [
    FLASH_KEY,
    FLASH_NEW_KEY,
    TOKEN_KEY,
    TOKEN_TIMESTAMP_KEY,
    LAST_REGENERATION_KEY,
];

pub(crate) fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Per-request handle on a client's session.
///
/// A manager starts out inactive. [`start`](Self::start) acquires the store's write
/// lock for the session and loads its data; [`close_write`](Self::close_write)
/// persists the data and releases the lock; [`destroy`](Self::destroy) removes the
/// session for good. Dropping an active manager releases the lock without writing.
///
/// Value, flash and token operations are synchronous and act on the loaded data.
/// While the session is not active, reads return nothing and writes are ignored.
pub struct SessionManager<T: SessionTransport = HttpTransport> {
    pub(super) config: SessionConfig,
    store: Arc<dyn SessionStore>,
    transport: T,
    pub(super) clock: Arc<dyn Clock>,
    id: Option<SessionId>,
    pub(super) data: SessionData,
    lock: StoreLock,
    pub(super) is_started: bool,
    destroyed: bool,
    last_regeneration: Option<i64>,
}

struct OpenedSession {
    id: SessionId,
    record: Option<SessionRecord>,
    lock: StoreLock,
    is_new: bool,
}

impl<T: SessionTransport> SessionManager<T> {
    pub fn new(config: SessionConfig, store: Arc<dyn SessionStore>, transport: T) -> Self {
        Self::with_clock(config, store, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SessionConfig,
        store: Arc<dyn SessionStore>,
        transport: T,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            clock,
            id: None,
            data: SessionData::new(),
            lock: StoreLock::none(),
            is_started: false,
            destroyed: false,
            last_regeneration: None,
        }
    }

    /// Starts the session: resolves the client's session id, takes the write lock,
    /// loads the data, promotes pending flash messages and rotates the id when it
    /// is older than [`REGENERATION_INTERVAL_SECS`].
    ///
    /// Does nothing if the session is already active.
    #[tracing::instrument(skip(self), fields(name = %self.config.name))]
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.destroyed {
            return Err(SessionError::Destroyed);
        }
        if self.is_started {
            tracing::debug!("Session already started");
            return Ok(());
        }
        if self.transport.headers_sent() {
            tracing::error!("Cannot start session, response headers already sent");
            return Err(SessionError::HeadersAlreadySent);
        }

        let opened = self.open_session().await?;
        self.id = Some(opened.id);
        self.lock = opened.lock;
        self.data = opened.record.map(|record| record.data).unwrap_or_default();
        self.last_regeneration = self
            .data
            .get(LAST_REGENERATION_KEY)
            .and_then(Value::as_i64)
            .or(self.last_regeneration);

        self.load_flash_data();

        let now = self.clock.timestamp();
        let send_cookie = opened.is_new && !self.regeneration_due(now);
        if let Err(e) = self.apply_configuration(send_cookie) {
            self.release();
            return Err(e);
        }

        self.is_started = true;
        tracing::debug!("Session started, new: {}", opened.is_new);

        if let Err(e) = self.check_regenerate_id().await {
            self.release();
            return Err(e);
        }
        self.gc(false).await;
        Ok(())
    }

    async fn open_session(&self) -> Result<OpenedSession, SessionError> {
        let start_failure = |e: StorageError| {
            tracing::error!("Failed to open session: {}", e);
            SessionError::StartFailure(e.to_string())
        };

        // A manager reopened after close_write keeps its id
        let incoming = self.id.clone().or_else(|| {
            self.transport
                .request_cookie(&self.config.name)
                .and_then(|value| {
                    let id = SessionId::parse(
                        &value,
                        self.config.sid_length,
                        self.config.sid_bits_per_character,
                    );
                    if id.is_none() {
                        tracing::warn!("Discarding malformed session id from request");
                    }
                    id
                })
        });

        if let Some(id) = incoming {
            let key = id.store_key(self.config.hash_function);
            let lock = self.store.lock(&key).await.map_err(start_failure)?;
            let cutoff = self.gc_cutoff();
            let record = self
                .store
                .open(&key)
                .await
                .map_err(start_failure)?
                .filter(|record| !record.is_stale(cutoff));

            if record.is_some() {
                return Ok(OpenedSession {
                    id,
                    record,
                    lock,
                    is_new: false,
                });
            }
            // Strict mode: never adopt an id the store does not know about
            tracing::debug!("Rejecting uninitialized session id {:?}", id);
        }

        let id = SessionId::generate(self.config.sid_length, self.config.sid_bits_per_character)
            .map_err(|e| SessionError::StartFailure(e.to_string()))?;
        let lock = self
            .store
            .lock(&id.store_key(self.config.hash_function))
            .await
            .map_err(start_failure)?;

        Ok(OpenedSession {
            id,
            record: None,
            lock,
            is_new: true,
        })
    }

    fn apply_configuration(&mut self, send_cookie: bool) -> Result<(), SessionError> {
        let now = self.clock.now();
        if send_cookie {
            if let Some(id) = &self.id {
                let cookie = SessionCookie::for_session(&self.config, id.as_str(), now);
                self.transport.set_cookie(&cookie)?;
            }
        }
        for (name, value) in
            cache_limiter_headers(self.config.cache_limiter, self.config.cache_expire, now)
        {
            self.transport.set_header(name, &value)?;
        }
        Ok(())
    }

    fn regeneration_due(&self, now: i64) -> bool {
        self.last_regeneration
            .is_none_or(|last| now - last > REGENERATION_INTERVAL_SECS)
    }

    async fn check_regenerate_id(&mut self) -> Result<(), SessionError> {
        let now = self.clock.timestamp();
        if !self.regeneration_due(now) {
            return Ok(());
        }

        self.regenerate_id(true).await?;
        self.last_regeneration = Some(now);
        self.data
            .insert(LAST_REGENERATION_KEY.to_string(), Value::from(now));
        Ok(())
    }

    /// Moves the session to a fresh identifier and sends the new cookie.
    ///
    /// With `delete_old_session` the record under the previous identifier is removed
    /// immediately; concurrent requests still carrying the old id will start a new,
    /// empty session.
    #[tracing::instrument(skip(self))]
    pub async fn regenerate_id(&mut self, delete_old_session: bool) -> Result<(), SessionError> {
        if !self.is_started {
            return Err(SessionError::NotStarted);
        }
        let old_id = self.id.clone().ok_or(SessionError::NotStarted)?;
        // The client could never learn the new id; keep the old one intact
        if self.transport.headers_sent() {
            tracing::error!("Cannot regenerate session id, response headers already sent");
            return Err(SessionError::RegenerationFailure(
                "response headers already sent".to_string(),
            ));
        }

        let regeneration_failure = |e: StorageError| {
            tracing::error!("Failed to regenerate session id: {}", e);
            SessionError::RegenerationFailure(e.to_string())
        };

        let new_id =
            SessionId::generate(self.config.sid_length, self.config.sid_bits_per_character)
                .map_err(|e| SessionError::RegenerationFailure(e.to_string()))?;
        let old_key = old_id.store_key(self.config.hash_function);
        let new_key = new_id.store_key(self.config.hash_function);

        let new_lock = self
            .store
            .lock(&new_key)
            .await
            .map_err(regeneration_failure)?;
        let record = SessionRecord::new(self.data.clone(), self.clock.now());
        self.store
            .regenerate(
                &old_key,
                &new_key,
                &record,
                self.config.gc_maxlifetime,
                delete_old_session,
            )
            .await
            .map_err(regeneration_failure)?;

        self.lock = new_lock;
        let cookie = SessionCookie::for_session(&self.config, new_id.as_str(), self.clock.now());
        self.id = Some(new_id);
        self.transport.set_cookie(&cookie)?;

        tracing::debug!("Session id regenerated");
        Ok(())
    }

    /// Persists the session and releases the write lock.
    ///
    /// Returns `false` when the store write fails; the session then stays active
    /// and keeps the lock so the caller may retry.
    #[tracing::instrument(skip(self))]
    pub async fn close_write(&mut self) -> bool {
        if !self.is_started {
            return true;
        }
        let Some(id) = &self.id else {
            self.release();
            return true;
        };

        let key = id.store_key(self.config.hash_function);
        let record = SessionRecord::new(self.data.clone(), self.clock.now());
        match self
            .store
            .write(&key, &record, self.config.gc_maxlifetime)
            .await
        {
            Ok(()) => {
                self.release();
                tracing::debug!("Session written and closed");
                true
            }
            Err(e) => {
                tracing::error!("Failed to write session: {}", e);
                false
            }
        }
    }

    /// Runs garbage collection over the store with probability
    /// `gc_probability / gc_divisor`, or always when `force` is set.
    ///
    /// Returns whether a collection pass ran and succeeded. Failures are logged,
    /// never propagated.
    pub async fn gc(&mut self, force: bool) -> bool {
        if !self.is_started {
            tracing::warn!("Session gc requested while session is not active");
            return false;
        }
        if !force && !self.gc_roll() {
            return false;
        }

        match self.store.gc(self.gc_cutoff()).await {
            Ok(removed) => {
                tracing::debug!("Session gc removed {} expired sessions", removed);
                true
            }
            Err(e) => {
                tracing::error!("Session gc failed: {}", e);
                false
            }
        }
    }

    fn gc_roll(&self) -> bool {
        if self.config.gc_probability == 0 {
            return false;
        }
        match gen_random_u32() {
            Ok(roll) => roll % self.config.gc_divisor < self.config.gc_probability,
            Err(e) => {
                tracing::warn!("Skipping session gc: {}", e);
                false
            }
        }
    }

    fn gc_cutoff(&self) -> chrono::DateTime<chrono::Utc> {
        let max_lifetime = i64::try_from(self.config.gc_maxlifetime).unwrap_or(i64::MAX);
        self.clock
            .now()
            .checked_sub_signed(Duration::seconds(max_lifetime))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
    }

    /// Destroys the session: clears its data, removes it from the store and expires
    /// the cookie. The cookie is expired even if the session was never started.
    ///
    /// The data is cleared before the store is touched, so after a
    /// [`SessionError::DestroyFailure`] a later write persists an empty session.
    #[tracing::instrument(skip(self))]
    pub async fn destroy(&mut self) -> Result<(), SessionError> {
        if self.is_started {
            self.data.clear();
            if let Some(id) = &self.id {
                let key = id.store_key(self.config.hash_function);
                self.store.destroy(&key).await.map_err(|e| {
                    tracing::error!("Failed to destroy session: {}", e);
                    SessionError::DestroyFailure(e.to_string())
                })?;
            }
            self.release();
            self.id = None;
            self.destroyed = true;
            tracing::debug!("Session destroyed");
        }

        let cookie = SessionCookie::expired(&self.config, self.clock.now());
        self.transport.set_cookie(&cookie)
    }

    /// Starts the session, runs `f`, then writes and closes the session whatever `f`
    /// returned. If the final write fails the lock is released anyway and
    /// [`SessionError::WriteFailure`] is returned.
    pub async fn scoped<F, R>(&mut self, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.start().await?;
        let result = f(self);
        if !self.close_write().await {
            self.release();
            return Err(SessionError::WriteFailure(
                "session data could not be persisted".to_string(),
            ));
        }
        Ok(result)
    }

    fn release(&mut self) {
        self.lock = StoreLock::none();
        self.data.clear();
        self.is_started = false;
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }

    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Time of the last id rotation, in seconds since the epoch.
    pub fn last_regeneration(&self) -> Option<i64> {
        self.last_regeneration
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Reads a user value. Internal bookkeeping entries are never returned.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if is_reserved_key(key) {
            return None;
        }
        self.data.get(key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Reads a value and deserializes it into `D`; `None` if absent or of another shape.
    pub fn get_as<D: DeserializeOwned>(&self, key: &str) -> Option<D> {
        let value = self.get(key)?;
        serde_json::from_value(value.clone())
            .inspect_err(|e| tracing::debug!("Session value '{}' has unexpected shape: {}", key, e))
            .ok()
    }

    pub fn has(&self, key: &str) -> bool {
        !is_reserved_key(key) && self.data.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        if !self.writable(key) {
            return;
        }
        self.data.insert(key.to_string(), value.into());
    }

    pub fn delete(&mut self, key: &str) {
        if !self.writable(key) {
            return;
        }
        self.data.remove(key);
    }

    /// Number of user entries.
    pub fn len(&self) -> usize {
        self.keys().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry, including flash messages and the CSRF token.
    pub fn clear(&mut self) {
        if !self.is_started {
            tracing::warn!("Ignoring session clear, session not started");
            return;
        }
        self.data.clear();
    }

    /// User keys currently set, excluding internal bookkeeping entries.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data
            .keys()
            .map(String::as_str)
            .filter(|key| !is_reserved_key(key))
    }

    fn writable(&self, key: &str) -> bool {
        if !self.is_started {
            tracing::warn!("Ignoring write to '{}', session not started", key);
            return false;
        }
        if is_reserved_key(key) {
            tracing::warn!("Ignoring write to reserved session key '{}'", key);
            return false;
        }
        true
    }
}

impl<T: SessionTransport> SessionAccess for SessionManager<T> {
    fn has(&self, key: &str) -> bool {
        SessionManager::has(self, key)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        SessionManager::get(self, key)
    }

    fn set(&mut self, key: &str, value: Value) {
        SessionManager::set(self, key, value)
    }

    fn delete(&mut self, key: &str) {
        SessionManager::delete(self, key)
    }
}

impl<T: SessionTransport> Drop for SessionManager<T> {
    fn drop(&mut self) {
        if self.is_started {
            tracing::warn!("Session dropped while active, releasing lock without writing");
        }
    }
}
