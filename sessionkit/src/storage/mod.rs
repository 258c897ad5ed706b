mod config;
mod errors;
mod session_store;
mod types;

pub use config::{SESSION_STORE_TYPE, SESSION_STORE_URL, build_store, store_from_env};
pub use errors::StorageError;
pub use session_store::{InMemorySessionStore, RedisSessionStore, SessionStore};
pub use types::{SessionData, SessionRecord, StoreLock};
