use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::session::errors::SessionError;
use crate::transport::SessionTransport;
use crate::utils::gen_random_token;

use super::manager::SessionManager;

/// Seconds a CSRF token stays valid after it was issued.
pub const TOKEN_LIFETIME_SECS: i64 = 1800;

pub(super) const TOKEN_KEY: &str = "_token";
pub(super) const TOKEN_TIMESTAMP_KEY: &str = "_token_timestamp";

const TOKEN_BYTES: usize = 32;

impl<T: SessionTransport> SessionManager<T> {
    /// Returns the session's CSRF token, issuing a new one if none exists or the
    /// current one is older than [`TOKEN_LIFETIME_SECS`].
    ///
    /// Unlike the value accessors this is not total: without an active session
    /// there is nowhere to keep the token, so it fails with
    /// [`SessionError::NotStarted`] instead of handing out a token that could
    /// never validate.
    pub fn token(&mut self) -> Result<String, SessionError> {
        if !self.is_started {
            return Err(SessionError::NotStarted);
        }
        let now = self.clock.timestamp();
        if let Some(token) = self.current_token(now) {
            return Ok(token.to_string());
        }
        self.issue_token(now)
    }

    /// Replaces the CSRF token unconditionally, e.g. after a privilege change.
    pub fn rotate_token(&mut self) -> Result<String, SessionError> {
        if !self.is_started {
            return Err(SessionError::NotStarted);
        }
        let now = self.clock.timestamp();
        self.issue_token(now)
    }

    /// Checks `candidate` against the stored token in constant time. Fails when no
    /// token was issued or it has expired.
    pub fn validate_token(&self, candidate: &str) -> bool {
        let now = self.clock.timestamp();
        let Some(stored) = self.current_token(now) else {
            tracing::debug!("No valid CSRF token in session");
            return false;
        };

        let valid: bool = stored.as_bytes().ct_eq(candidate.as_bytes()).into();
        if !valid {
            tracing::warn!("CSRF token mismatch");
        }
        valid
    }

    fn current_token(&self, now: i64) -> Option<&str> {
        let token = self.data.get(TOKEN_KEY)?.as_str()?;
        let issued_at = self.data.get(TOKEN_TIMESTAMP_KEY)?.as_i64()?;
        (now - issued_at <= TOKEN_LIFETIME_SECS).then_some(token)
    }

    fn issue_token(&mut self, now: i64) -> Result<String, SessionError> {
        let token = gen_random_token(TOKEN_BYTES)?;
        self.data
            .insert(TOKEN_KEY.to_string(), Value::from(token.clone()));
        self.data
            .insert(TOKEN_TIMESTAMP_KEY.to_string(), Value::from(now));
        tracing::debug!("Issued new CSRF token");
        Ok(token)
    }
}
