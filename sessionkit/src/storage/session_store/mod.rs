mod memory;
mod redis;
mod types;

pub use types::{InMemorySessionStore, RedisSessionStore, SessionStore};
