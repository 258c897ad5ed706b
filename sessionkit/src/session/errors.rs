use thiserror::Error;

use crate::utils::UtilError;

#[derive(Debug, Error, Clone)]
pub enum SessionError {
    /// A mandatory security option was weakened or a parameter is out of range
    #[error("Session configuration rejected: {0}")]
    ConfigRejected(String),

    #[error("Response headers already sent")]
    HeadersAlreadySent,

    #[error("Session start failed: {0}")]
    StartFailure(String),

    #[error("Session id regeneration failed: {0}")]
    RegenerationFailure(String),

    #[error("Session destroy failed: {0}")]
    DestroyFailure(String),

    #[error("Session write failed: {0}")]
    WriteFailure(String),

    #[error("Session not started")]
    NotStarted,

    #[error("Session has been destroyed")]
    Destroyed,

    #[error("Cookie error: {0}")]
    Cookie(String),

    /// Error from utils operations
    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        assert_eq!(
            SessionError::ConfigRejected("cookie_secure cannot be disabled".to_string())
                .to_string(),
            "Session configuration rejected: cookie_secure cannot be disabled"
        );
        assert_eq!(
            SessionError::HeadersAlreadySent.to_string(),
            "Response headers already sent"
        );
        assert_eq!(SessionError::NotStarted.to_string(), "Session not started");
    }

    #[test]
    fn test_from_util_error() {
        let error: SessionError = UtilError::Crypto("rng".to_string()).into();
        match error {
            SessionError::Utils(UtilError::Crypto(msg)) => assert_eq!(msg, "rng"),
            other => panic!("Expected Utils variant, got {other:?}"),
        }
    }

    #[test]
    fn test_error_is_sync_and_send() {
        fn assert_sync_send<T: Sync + Send>() {}
        assert_sync_send::<SessionError>();
    }
}
