mod cookie;
mod csrf;
mod flash;
mod manager;

#[cfg(test)]
mod test_utils;

pub use cookie::SessionCookie;
pub use csrf::TOKEN_LIFETIME_SECS;
pub use flash::{DEFAULT_FLASH_TYPE, FLASH_LIFETIME_SECS};
pub use manager::{REGENERATION_INTERVAL_SECS, SessionManager};
