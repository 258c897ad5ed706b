use chrono::{DateTime, Duration, Utc};
use http::header::{CACHE_CONTROL, EXPIRES, HeaderName, PRAGMA};

use crate::session::config::{CacheLimiter, SameSite, SessionConfig};

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const EXPIRED_IN_THE_PAST: &str = "Thu, 19 Nov 1981 08:52:00 GMT";

/// A `Set-Cookie` for the session identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl SessionCookie {
    /// Cookie carrying `session_id` with the configured parameters.
    pub(crate) fn for_session(config: &SessionConfig, session_id: &str, now: DateTime<Utc>) -> Self {
        let (max_age, expires) = match config.cookie_lifetime {
            0 => (None, None),
            lifetime => {
                let lifetime = i64::try_from(lifetime).unwrap_or(i64::MAX);
                (
                    Some(lifetime),
                    now.checked_add_signed(Duration::seconds(lifetime)),
                )
            }
        };
        Self {
            name: config.name.clone(),
            value: session_id.to_string(),
            max_age,
            expires,
            path: config.cookie_path.clone(),
            domain: config.cookie_domain.clone(),
            secure: config.cookie_secure,
            http_only: config.cookie_httponly,
            same_site: config.cookie_samesite,
        }
    }

    /// Same cookie parameters with an expiry far in the past, so the client drops it.
    pub(crate) fn expired(config: &SessionConfig, now: DateTime<Utc>) -> Self {
        Self {
            max_age: Some(0),
            expires: Some(now - Duration::days(365)),
            ..Self::for_session(config, "", now)
        }
    }

    pub fn to_header_value(&self) -> String {
        let mut cookie = format!("{}={}", self.name, self.value);
        if let Some(expires) = self.expires {
            cookie.push_str(&format!("; Expires={}", expires.format(HTTP_DATE_FORMAT)));
        }
        if let Some(max_age) = self.max_age {
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        if !self.path.is_empty() {
            cookie.push_str(&format!("; Path={}", self.path));
        }
        if !self.domain.is_empty() {
            cookie.push_str(&format!("; Domain={}", self.domain));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie.push_str(&format!("; SameSite={}", self.same_site));
        cookie
    }
}

/// Response headers for the configured cache limiter. `cache_expire` is in minutes.
pub(crate) fn cache_limiter_headers(
    limiter: CacheLimiter,
    cache_expire: u64,
    now: DateTime<Utc>,
) -> Vec<(HeaderName, String)> {
    let max_age = cache_expire.saturating_mul(60);
    match limiter {
        CacheLimiter::NoCache => vec![
            (EXPIRES, EXPIRED_IN_THE_PAST.to_string()),
            (
                CACHE_CONTROL,
                "no-store, no-cache, must-revalidate".to_string(),
            ),
            (PRAGMA, "no-cache".to_string()),
        ],
        CacheLimiter::Private => vec![
            (EXPIRES, EXPIRED_IN_THE_PAST.to_string()),
            (CACHE_CONTROL, format!("private, max-age={max_age}")),
        ],
        CacheLimiter::PrivateNoExpire => {
            vec![(CACHE_CONTROL, format!("private, max-age={max_age}"))]
        }
        CacheLimiter::Public => {
            let expires = i64::try_from(max_age)
                .ok()
                .and_then(|secs| now.checked_add_signed(Duration::seconds(secs)))
                .unwrap_or(now);
            vec![
                (EXPIRES, expires.format(HTTP_DATE_FORMAT).to_string()),
                (CACHE_CONTROL, format!("public, max-age={max_age}")),
            ]
        }
        CacheLimiter::Off => Vec::new(),
    }
}
