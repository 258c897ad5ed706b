use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::config::HashFunction;
use crate::utils::{UtilError, gen_session_id, is_valid_session_id, sha256_hex};

/// A one-shot message stored in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub value: Value,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: i64,
}

impl FlashMessage {
    pub(crate) fn new(value: Value, kind: &str, timestamp: i64) -> Self {
        Self {
            value,
            kind: kind.to_string(),
            timestamp,
        }
    }

    pub fn is_expired(&self, now: i64, lifetime: i64) -> bool {
        now - self.timestamp > lifetime
    }
}

/// Identifier correlating a client with its stored session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub(crate) fn generate(length: usize, bits_per_character: u8) -> Result<Self, UtilError> {
        gen_session_id(length, bits_per_character).map(Self)
    }

    /// Accepts an incoming identifier only if it matches the configured length and alphabet.
    pub(crate) fn parse(value: &str, length: usize, bits_per_character: u8) -> Option<Self> {
        is_valid_session_id(value, length, bits_per_character).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn store_key(&self, hash_function: HashFunction) -> String {
        match hash_function {
            HashFunction::Sha256 => sha256_hex(&self.0),
            HashFunction::None => self.0.clone(),
        }
    }
}

// Session ids are credentials; keep them out of logs.
impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "SessionId({prefix}…)")
    }
}

/// Map-style access to session values.
pub trait SessionAccess {
    fn has(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> Option<&Value>;
    fn set(&mut self, key: &str, value: Value);
    fn delete(&mut self, key: &str);
}
