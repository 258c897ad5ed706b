//! sessionkit - server-side session management
//!
//! This crate wraps a per-client key-value session with the operations a web
//! application needs around it: typed value access, one-shot flash messages,
//! CSRF token issuance and validation, session id rotation, and lifecycle control
//! (start, write-close, destroy, garbage collection).
//!
//! The session store, the request/response transport and the clock are injected,
//! so the same [`SessionManager`] runs against the in-memory store in tests and
//! redis in production.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sessionkit::{HttpTransport, InMemorySessionStore, SessionConfig, SessionManager};
//!
//! # async fn handle(request_headers: http::HeaderMap) -> Result<(), sessionkit::SessionError> {
//! let store = Arc::new(InMemorySessionStore::new());
//! let config = SessionConfig::from_env()?;
//! let mut session = SessionManager::new(config, store, HttpTransport::new(request_headers));
//!
//! let token = session
//!     .scoped(|session| {
//!         session.set("user_id", 42);
//!         session.set_flash_with_type("msg", "Saved!", "success");
//!         session.token()
//!     })
//!     .await??;
//! # let _ = token;
//! # Ok(()) }
//! ```

mod clock;
mod session;
mod storage;
mod transport;
mod utils;

#[cfg(test)]
mod test_utils;

pub use clock::{Clock, SystemClock};

pub use session::{
    CacheLimiter, DEFAULT_FLASH_TYPE, FLASH_LIFETIME_SECS, FlashMessage, FlashVisibility,
    HashFunction, REGENERATION_INTERVAL_SECS, SameSite, SessionAccess, SessionConfig,
    SessionCookie, SessionError, SessionId, SessionManager, SessionOptions, TOKEN_LIFETIME_SECS,
};

pub use storage::{
    InMemorySessionStore, RedisSessionStore, SESSION_STORE_TYPE, SESSION_STORE_URL, SessionData,
    SessionRecord, SessionStore, StorageError, StoreLock, build_store, store_from_env,
};

pub use transport::{HttpTransport, SessionTransport};

pub use utils::UtilError;
