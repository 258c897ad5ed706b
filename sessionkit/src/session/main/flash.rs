use serde_json::{Map, Value};

use crate::session::config::FlashVisibility;
use crate::session::types::FlashMessage;
use crate::storage::SessionData;
use crate::transport::SessionTransport;

use super::manager::SessionManager;

/// Seconds a flash message stays readable after it was set.
pub const FLASH_LIFETIME_SECS: i64 = 3600;

pub const DEFAULT_FLASH_TYPE: &str = "info";

pub(super) const FLASH_KEY: &str = "__flash";
pub(super) const FLASH_NEW_KEY: &str = "__flash_new";

fn object_entry<'a>(data: &'a mut SessionData, key: &str) -> &'a mut Map<String, Value> {
    let slot = data
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("flash batch was just replaced by an object"),
    }
}

fn flash_timestamp(entry: &Value) -> Option<i64> {
    entry.get("timestamp").and_then(Value::as_i64)
}

impl<T: SessionTransport> SessionManager<T> {
    /// Queues a flash message of type `info`. See [`set_flash_with_type`](Self::set_flash_with_type).
    pub fn set_flash(&mut self, key: &str, value: impl Into<Value>) {
        self.set_flash_with_type(key, value, DEFAULT_FLASH_TYPE);
    }

    /// Stores a flash message under `key`, replacing any message queued under the
    /// same key.
    ///
    /// With [`FlashVisibility::NextRequest`] the message becomes readable once the
    /// session is started again, typically after a redirect.
    pub fn set_flash_with_type(&mut self, key: &str, value: impl Into<Value>, kind: &str) {
        if !self.is_started {
            tracing::warn!("Ignoring flash '{}', session not started", key);
            return;
        }
        let message = FlashMessage::new(value.into(), kind, self.clock.timestamp());
        let entry = match serde_json::to_value(&message) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!("Failed to serialize flash message '{}': {}", key, e);
                return;
            }
        };

        let batch = match self.config.flash_visibility {
            FlashVisibility::NextRequest => FLASH_NEW_KEY,
            FlashVisibility::Immediate => FLASH_KEY,
        };
        object_entry(&mut self.data, batch).insert(key.to_string(), entry);
    }

    /// Consumes the flash message under `key`.
    ///
    /// The entry is removed whether or not it was still valid, so a message is
    /// returned at most once.
    pub fn get_flash(&mut self, key: &str) -> Option<Value> {
        let now = self.clock.timestamp();
        let entry = self.remove_active_flash(key)?;
        match serde_json::from_value::<FlashMessage>(entry) {
            Ok(message) if !message.is_expired(now, FLASH_LIFETIME_SECS) => Some(message.value),
            Ok(_) => {
                tracing::debug!("Flash message '{}' expired", key);
                None
            }
            Err(e) => {
                tracing::warn!("Discarding malformed flash message '{}': {}", key, e);
                None
            }
        }
    }

    pub fn get_flash_or(&mut self, key: &str, default: Value) -> Value {
        self.get_flash(key).unwrap_or(default)
    }

    /// Whether a readable flash message exists under `key`, optionally of type `kind`.
    ///
    /// Does not consume the message. An expired entry is removed.
    pub fn has_flash(&mut self, key: &str, kind: Option<&str>) -> bool {
        let now = self.clock.timestamp();
        let Some(message) = self.peek_flash(key) else {
            return false;
        };
        if message.is_expired(now, FLASH_LIFETIME_SECS) {
            self.remove_active_flash(key);
            return false;
        }
        kind.is_none_or(|kind| message.kind == kind)
    }

    /// Keys of the readable flash messages, without consuming them.
    pub fn flash_keys(&self) -> Vec<String> {
        let now = self.clock.timestamp();
        let Some(batch) = self.data.get(FLASH_KEY).and_then(Value::as_object) else {
            return Vec::new();
        };
        batch
            .iter()
            .filter(|(_, entry)| {
                flash_timestamp(entry).is_some_and(|ts| now - ts <= FLASH_LIFETIME_SECS)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Re-queues a readable flash message so it survives one more request.
    pub fn keep_flash(&mut self, key: &str) -> bool {
        if !self.is_started {
            return false;
        }
        let Some(entry) = self.remove_active_flash(key) else {
            return false;
        };
        object_entry(&mut self.data, FLASH_NEW_KEY).insert(key.to_string(), entry);
        true
    }

    /// Consumes every readable flash message, ordered by key.
    pub fn take_all_flashes(&mut self) -> Vec<(String, FlashMessage)> {
        let now = self.clock.timestamp();
        let Some(Value::Object(batch)) = self.data.remove(FLASH_KEY) else {
            return Vec::new();
        };
        let mut messages: Vec<(String, FlashMessage)> = batch
            .into_iter()
            .filter_map(|(key, entry)| {
                serde_json::from_value::<FlashMessage>(entry)
                    .ok()
                    .filter(|message| !message.is_expired(now, FLASH_LIFETIME_SECS))
                    .map(|message| (key, message))
            })
            .collect();
        messages.sort_by(|a, b| a.0.cmp(&b.0));
        messages
    }

    /// Promotes messages queued by the previous request into the readable batch
    /// and drops the ones past their lifetime.
    pub(super) fn load_flash_data(&mut self) {
        let now = self.clock.timestamp();
        let pending = self.data.remove(FLASH_NEW_KEY);

        let active = object_entry(&mut self.data, FLASH_KEY);
        if let Some(Value::Object(pending)) = pending {
            active.extend(pending);
        }
        active.retain(|_, entry| {
            flash_timestamp(entry).is_some_and(|ts| now - ts <= FLASH_LIFETIME_SECS)
        });
        if active.is_empty() {
            self.data.remove(FLASH_KEY);
        }
    }

    fn peek_flash(&self, key: &str) -> Option<FlashMessage> {
        let entry = self.data.get(FLASH_KEY)?.get(key)?;
        serde_json::from_value(entry.clone()).ok()
    }

    fn remove_active_flash(&mut self, key: &str) -> Option<Value> {
        let batch = self.data.get_mut(FLASH_KEY)?.as_object_mut()?;
        let entry = batch.remove(key);
        if batch.is_empty() {
            self.data.remove(FLASH_KEY);
        }
        entry
    }
}
