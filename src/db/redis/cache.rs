use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;

/// Keys for the similarity response cache
///
/// Both similarity queries are user-independent, which is what makes them
/// safe to cache: nothing in the value depends on who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    SimilarPrograms { program_id: i64, limit: usize },
    FieldSearch { field: String, limit: usize },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::SimilarPrograms { program_id, limit } => {
                write!(f, "similar:{}:{}", program_id, limit)
            }
            CacheKey::FieldSearch { field, limit } => {
                write!(f, "field:{}:{}", field.to_lowercase(), limit)
            }
        }
    }
}

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Read-through cache over Redis with non-blocking writes
///
/// Reads hit Redis directly; writes are handed to a background task via a
/// channel so a slow Redis never delays an API response.
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

impl Cache {
    /// Creates the cache and spawns its background writer task
    pub fn new(redis_client: Client) -> Self {
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::writer_task(client, write_rx).await;
        });

        Self {
            redis_client,
            write_tx,
        }
    }

    /// Drains the write channel for the lifetime of the process
    ///
    /// The task exits when the last Cache clone (and with it the sender)
    /// is dropped.
    async fn writer_task(client: Client, mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>) {
        tracing::debug!("Cache writer task started");

        while let Some(msg) = write_rx.recv().await {
            let result: AppResult<()> = async {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let _: () = conn.set_ex(&msg.key, &msg.value, msg.ttl).await?;
                Ok(())
            }
            .await;

            if let Err(e) = result {
                tracing::error!(key = %msg.key, error = %e, "Cache write failed");
            }
        }

        tracing::debug!("Cache writer task stopped");
    }

    /// Retrieves and deserializes a cached value, or None on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Serializes a value and queues it for a background write
    ///
    /// Returns immediately; a failed write only costs a future cache miss.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if self.write_tx.send(msg).is_err() {
            tracing::error!("Cache writer channel closed, dropping write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display_similar_programs() {
        let key = CacheKey::SimilarPrograms {
            program_id: 42,
            limit: 5,
        };
        assert_eq!(key.to_string(), "similar:42:5");
    }

    #[test]
    fn test_cache_key_display_field_search_lowercase() {
        let key = CacheKey::FieldSearch {
            field: "Computer Science".to_string(),
            limit: 10,
        };
        assert_eq!(key.to_string(), "field:computer science:10");
    }

    #[tokio::test]
    async fn test_cache_miss_returns_none() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = create_redis_client(&redis_url).unwrap();
        let cache = Cache::new(client);

        let key = CacheKey::SimilarPrograms {
            program_id: -999,
            limit: 1,
        };
        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    async fn test_background_write_then_read() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = create_redis_client(&redis_url).unwrap();
        let cache = Cache::new(client.clone());

        let key = CacheKey::FieldSearch {
            field: "cache-write-test".to_string(),
            limit: 3,
        };
        let value = vec!["a".to_string(), "b".to_string()];

        cache.set_in_background(&key, &value, 60);

        // Give the writer task time to flush
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }
}
