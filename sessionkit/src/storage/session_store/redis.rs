use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{self, AsyncCommands};

use crate::storage::errors::StorageError;
use crate::storage::types::{SessionRecord, StoreLock};

use super::types::{RedisSessionStore, SessionStore};

const SESSION_PREFIX: &str = "session";

impl RedisSessionStore {
    pub fn new(url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    fn make_key(key: &str) -> String {
        format!("{SESSION_PREFIX}:{key}")
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn init(&self) -> Result<(), StorageError> {
        // Verify the connection works
        let _conn = self.client.get_multiplexed_async_connection().await?;
        Ok(())
    }

    async fn lock(&self, _key: &str) -> Result<StoreLock, StorageError> {
        // Concurrent requests on one session are last-writer-wins with redis
        Ok(StoreLock::none())
    }

    async fn open(&self, key: &str) -> Result<Option<SessionRecord>, StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = Self::make_key(key);
        let value: Option<String> = conn.get(&key).await?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        key: &str,
        record: &SessionRecord,
        ttl: u64,
    ) -> Result<(), StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = Self::make_key(key);
        let value = serde_json::to_string(record)?;
        let _: () = conn.set(&key, value).await?;
        if ttl > 0 {
            let _: () = conn.expire(&key, ttl as i64).await?;
        }
        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = Self::make_key(key);
        let _: () = conn.del(&key).await?;
        Ok(())
    }

    async fn regenerate(
        &self,
        old_key: &str,
        new_key: &str,
        record: &SessionRecord,
        ttl: u64,
        delete_old: bool,
    ) -> Result<(), StorageError> {
        self.write(new_key, record, ttl).await?;
        if delete_old {
            self.destroy(old_key).await?;
        }
        Ok(())
    }

    async fn gc(&self, _cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        // Keys carry their own EXPIRE, redis evicts them
        Ok(0)
    }
}
