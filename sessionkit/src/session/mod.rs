mod config;
mod errors;
mod main;
mod types;

pub use config::{
    CacheLimiter, FlashVisibility, HashFunction, SameSite, SessionConfig, SessionOptions,
};
pub use errors::SessionError;
pub use main::{
    DEFAULT_FLASH_TYPE, FLASH_LIFETIME_SECS, REGENERATION_INTERVAL_SECS, SessionCookie,
    SessionManager, TOKEN_LIFETIME_SECS,
};
pub use types::{FlashMessage, SessionAccess, SessionId};
