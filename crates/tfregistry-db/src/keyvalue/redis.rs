//! Redis adapter for the key/value engine

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::keyvalue::store::{KvConnector, KvStore};
use crate::pool::mask_password;

/// Replace the value only while it still holds the expected bytes
const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// Redis-backed [`KvStore`]
#[derive(Clone)]
pub struct RedisKvStore {
    connection: ConnectionManager,
    cas: Arc<Script>,
}

impl RedisKvStore {
    /// Connect to Redis
    pub async fn connect(redis_url: &str) -> DbResult<Self> {
        info!("Connecting to Redis at {}", mask_password(redis_url));

        let client = Client::open(redis_url)
            .map_err(|e| DbError::Configuration(format!("Invalid Redis URL: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DbError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        info!("Successfully connected to Redis");

        Ok(Self {
            connection,
            cas: Arc::new(Script::new(COMPARE_AND_SWAP)),
        })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> DbResult<bool> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
    ) -> DbResult<bool> {
        let mut conn = self.connection.clone();
        let swapped: i32 = self
            .cas
            .key(key)
            .arg(expected)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn scan_prefix(&self, prefix: &str) -> DbResult<Vec<(String, Vec<u8>)>> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", escape_glob(prefix));

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        keys.sort();
        keys.dedup();
        debug!("Redis SCAN {} matched {} keys", pattern, keys.len());

        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        Ok(keys
            .into_iter()
            .zip(values)
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    async fn ping(&self) -> DbResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        // ConnectionManager closes when the last clone drops
        Ok(())
    }
}

/// Connector for [`RedisKvStore`]
#[derive(Debug, Clone)]
pub struct RedisConnector {
    redis_url: String,
}

impl RedisConnector {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
        }
    }
}

#[async_trait]
impl KvConnector for RedisConnector {
    async fn connect(&self) -> DbResult<Arc<dyn KvStore>> {
        let store = RedisKvStore::connect(&self.redis_url).await?;
        Ok(Arc::new(store))
    }
}

/// Escape Redis glob metacharacters so a key prefix matches literally
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("provider_versions:01H:"), "provider_versions:01H:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }
}
