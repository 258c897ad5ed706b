use std::env;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::session::errors::SessionError;

const SID_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 22..=256;
const SID_BITS_RANGE: std::ops::RangeInclusive<u8> = 4..=6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        };
        f.write_str(value)
    }
}

impl FromStr for SameSite {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => Err(SessionError::ConfigRejected(format!(
                "Unknown cookie_samesite value: {other}"
            ))),
        }
    }
}

/// Caching headers sent alongside a started session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum CacheLimiter {
    #[default]
    #[serde(rename = "nocache")]
    NoCache,
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "private_no_expire")]
    PrivateNoExpire,
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "", alias = "off")]
    Off,
}

impl FromStr for CacheLimiter {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nocache" => Ok(CacheLimiter::NoCache),
            "private" => Ok(CacheLimiter::Private),
            "private_no_expire" => Ok(CacheLimiter::PrivateNoExpire),
            "public" => Ok(CacheLimiter::Public),
            "" | "off" => Ok(CacheLimiter::Off),
            other => Err(SessionError::ConfigRejected(format!(
                "Unknown cache_limiter value: {other}"
            ))),
        }
    }
}

/// How session identifiers are turned into store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFunction {
    #[default]
    Sha256,
    None,
}

impl FromStr for HashFunction {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashFunction::Sha256),
            "none" => Ok(HashFunction::None),
            other => Err(SessionError::ConfigRejected(format!(
                "Unknown hash_function value: {other}"
            ))),
        }
    }
}

/// When a flash message set during a request becomes readable.
///
/// `NextRequest` keeps post-redirect-get semantics: messages set while handling
/// one request are only visible once the session is started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashVisibility {
    #[default]
    NextRequest,
    Immediate,
}

/// Partial session configuration. Unset fields take their defaults in
/// [`SessionConfig::from_options`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOptions {
    pub name: Option<String>,
    pub cookie_lifetime: Option<u64>,
    pub cookie_path: Option<String>,
    pub cookie_domain: Option<String>,
    pub cookie_secure: Option<bool>,
    pub cookie_httponly: Option<bool>,
    pub cookie_samesite: Option<SameSite>,
    pub use_strict_mode: Option<bool>,
    pub use_only_cookies: Option<bool>,
    pub use_trans_sid: Option<bool>,
    pub sid_length: Option<usize>,
    pub sid_bits_per_character: Option<u8>,
    pub hash_function: Option<HashFunction>,
    pub gc_maxlifetime: Option<u64>,
    pub gc_probability: Option<u32>,
    pub gc_divisor: Option<u32>,
    pub cache_limiter: Option<CacheLimiter>,
    pub cache_expire: Option<u64>,
    pub flash_visibility: Option<FlashVisibility>,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .and_then(|s| match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        })
}

impl SessionOptions {
    /// Reads `SESSION_*` environment variables. Values that fail to parse are
    /// left unset so the defaults apply.
    pub fn from_env() -> Self {
        Self {
            name: env::var("SESSION_NAME").ok(),
            cookie_lifetime: env_parse("SESSION_COOKIE_LIFETIME"),
            cookie_path: env::var("SESSION_COOKIE_PATH").ok(),
            cookie_domain: env::var("SESSION_COOKIE_DOMAIN").ok(),
            cookie_secure: env_bool("SESSION_COOKIE_SECURE"),
            cookie_httponly: env_bool("SESSION_COOKIE_HTTPONLY"),
            cookie_samesite: env_parse("SESSION_COOKIE_SAMESITE"),
            use_strict_mode: env_bool("SESSION_USE_STRICT_MODE"),
            use_only_cookies: env_bool("SESSION_USE_ONLY_COOKIES"),
            use_trans_sid: env_bool("SESSION_USE_TRANS_SID"),
            sid_length: env_parse("SESSION_SID_LENGTH"),
            sid_bits_per_character: env_parse("SESSION_SID_BITS_PER_CHARACTER"),
            hash_function: env_parse("SESSION_HASH_FUNCTION"),
            gc_maxlifetime: env_parse("SESSION_GC_MAXLIFETIME"),
            gc_probability: env_parse("SESSION_GC_PROBABILITY"),
            gc_divisor: env_parse("SESSION_GC_DIVISOR"),
            cache_limiter: env_parse("SESSION_CACHE_LIMITER"),
            cache_expire: env_parse("SESSION_CACHE_EXPIRE"),
            flash_visibility: None,
        }
    }
}

/// Validated session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) name: String,
    pub(crate) cookie_lifetime: u64,
    pub(crate) cookie_path: String,
    pub(crate) cookie_domain: String,
    pub(crate) cookie_secure: bool,
    pub(crate) cookie_httponly: bool,
    pub(crate) cookie_samesite: SameSite,
    pub(crate) use_strict_mode: bool,
    pub(crate) sid_length: usize,
    pub(crate) sid_bits_per_character: u8,
    pub(crate) hash_function: HashFunction,
    pub(crate) gc_maxlifetime: u64,
    pub(crate) gc_probability: u32,
    pub(crate) gc_divisor: u32,
    pub(crate) cache_limiter: CacheLimiter,
    pub(crate) cache_expire: u64,
    pub(crate) flash_visibility: FlashVisibility,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "SESSIONID".to_string(),
            cookie_lifetime: 0,
            cookie_path: "/".to_string(),
            cookie_domain: String::new(),
            cookie_secure: true,
            cookie_httponly: true,
            cookie_samesite: SameSite::Lax,
            use_strict_mode: true,
            sid_length: 48,
            sid_bits_per_character: 6,
            hash_function: HashFunction::Sha256,
            gc_maxlifetime: 1440,
            gc_probability: 1,
            gc_divisor: 100,
            cache_limiter: CacheLimiter::NoCache,
            cache_expire: 180,
            flash_visibility: FlashVisibility::NextRequest,
        }
    }
}

fn reject_disabled(option: &str, value: Option<bool>) -> Result<(), SessionError> {
    if value == Some(false) {
        tracing::error!("Refusing to disable mandatory session option {}", option);
        return Err(SessionError::ConfigRejected(format!(
            "{option} cannot be disabled"
        )));
    }
    Ok(())
}

impl SessionConfig {
    /// Merges `options` over the defaults.
    ///
    /// Fails with [`SessionError::ConfigRejected`] when `cookie_secure`,
    /// `cookie_httponly` or `use_strict_mode` is switched off, when URL-based
    /// session id transport is requested, or when an entropy/gc parameter is out
    /// of range.
    pub fn from_options(options: SessionOptions) -> Result<Self, SessionError> {
        reject_disabled("cookie_secure", options.cookie_secure)?;
        reject_disabled("cookie_httponly", options.cookie_httponly)?;
        reject_disabled("use_strict_mode", options.use_strict_mode)?;

        if options.use_only_cookies == Some(false) || options.use_trans_sid == Some(true) {
            return Err(SessionError::ConfigRejected(
                "Session ids are only transported in cookies".to_string(),
            ));
        }

        let defaults = Self::default();
        let config = Self {
            name: options.name.unwrap_or(defaults.name),
            cookie_lifetime: options.cookie_lifetime.unwrap_or(defaults.cookie_lifetime),
            cookie_path: options.cookie_path.unwrap_or(defaults.cookie_path),
            cookie_domain: options.cookie_domain.unwrap_or(defaults.cookie_domain),
            cookie_secure: true,
            cookie_httponly: true,
            cookie_samesite: options.cookie_samesite.unwrap_or(defaults.cookie_samesite),
            use_strict_mode: true,
            sid_length: options.sid_length.unwrap_or(defaults.sid_length),
            sid_bits_per_character: options
                .sid_bits_per_character
                .unwrap_or(defaults.sid_bits_per_character),
            hash_function: options.hash_function.unwrap_or(defaults.hash_function),
            gc_maxlifetime: options.gc_maxlifetime.unwrap_or(defaults.gc_maxlifetime),
            gc_probability: options.gc_probability.unwrap_or(defaults.gc_probability),
            gc_divisor: options.gc_divisor.unwrap_or(defaults.gc_divisor),
            cache_limiter: options.cache_limiter.unwrap_or(defaults.cache_limiter),
            cache_expire: options.cache_expire.unwrap_or(defaults.cache_expire),
            flash_visibility: options.flash_visibility.unwrap_or(defaults.flash_visibility),
        };

        config.validate()?;
        Ok(config)
    }

    /// Shorthand for `from_options(SessionOptions::from_env())`.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_options(SessionOptions::from_env())
    }

    fn validate(&self) -> Result<(), SessionError> {
        if self.name.is_empty()
            || !self
                .name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(SessionError::ConfigRejected(format!(
                "Invalid session name: {:?}",
                self.name
            )));
        }
        if !SID_LENGTH_RANGE.contains(&self.sid_length) {
            return Err(SessionError::ConfigRejected(format!(
                "sid_length must be within {SID_LENGTH_RANGE:?}, got {}",
                self.sid_length
            )));
        }
        if !SID_BITS_RANGE.contains(&self.sid_bits_per_character) {
            return Err(SessionError::ConfigRejected(format!(
                "sid_bits_per_character must be within {SID_BITS_RANGE:?}, got {}",
                self.sid_bits_per_character
            )));
        }
        if self.gc_divisor == 0 {
            return Err(SessionError::ConfigRejected(
                "gc_divisor must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cookie_lifetime(&self) -> u64 {
        self.cookie_lifetime
    }

    pub fn cookie_samesite(&self) -> SameSite {
        self.cookie_samesite
    }

    pub fn gc_maxlifetime(&self) -> u64 {
        self.gc_maxlifetime
    }

    pub fn flash_visibility(&self) -> FlashVisibility {
        self.flash_visibility
    }
}
