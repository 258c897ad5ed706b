use std::env;
use std::sync::{Arc, LazyLock};

use super::errors::StorageError;
use super::session_store::{InMemorySessionStore, RedisSessionStore, SessionStore};

pub static SESSION_STORE_TYPE: LazyLock<String> = LazyLock::new(|| {
    env::var("SESSION_STORE_TYPE")
        .ok()
        .unwrap_or("memory".to_string())
});

pub static SESSION_STORE_URL: LazyLock<String> = LazyLock::new(|| {
    env::var("SESSION_STORE_URL")
        .ok()
        .unwrap_or("redis://127.0.0.1:6379".to_string())
});

/// Builds the session store selected by `SESSION_STORE_TYPE` / `SESSION_STORE_URL`.
pub async fn store_from_env() -> Result<Arc<dyn SessionStore>, StorageError> {
    build_store(SESSION_STORE_TYPE.as_str(), SESSION_STORE_URL.as_str()).await
}

/// Builds and initializes a session store of the given type.
///
/// Supported types are `memory` and `redis`; `url` is only used by `redis`.
pub async fn build_store(
    store_type: &str,
    store_url: &str,
) -> Result<Arc<dyn SessionStore>, StorageError> {
    tracing::info!("Initializing session store with type: {}", store_type);

    let store: Arc<dyn SessionStore> = match store_type {
        "memory" => Arc::new(InMemorySessionStore::new()),
        "redis" => {
            let store = RedisSessionStore::new(store_url).inspect_err(|e| {
                tracing::error!("Failed to create Redis client: {}", e);
            })?;
            store.init().await.inspect_err(|e| {
                tracing::error!("Failed to connect to Redis: {}", e);
            })?;
            Arc::new(store)
        }
        t => {
            return Err(StorageError::Storage(format!(
                "Unsupported session store type: {t}. Supported types are 'memory' and 'redis'"
            )));
        }
    };

    tracing::info!("Connected to session store: type={}", store_type);
    Ok(store)
}
