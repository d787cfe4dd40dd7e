//! Redis-backed fast store.

use super::{FastStore, WindowDecision};
use crate::error::StoreError;
use async_trait::async_trait;
use redis::AsyncCommands as _;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Purge-count-record admission as a single server-side script so that
/// concurrent admits for the same identity serialize on the Redis side.
/// Returns {allowed, retry_after_secs}.
const ADMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local max = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local count = redis.call('ZCARD', key)
if count >= max then
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    local retry = 1
    if oldest[2] then
        retry = math.max(1, math.ceil((tonumber(oldest[2]) + window - now) / 1000))
    end
    return {0, retry}
end
redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return {1, 0}
"#;

/// Shared fast store over a Redis connection manager.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    admit_script: std::sync::Arc<redis::Script>,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut manager = ConnectionManager::new(client).await?;
        redis::cmd("PING").exec_async(&mut manager).await?;

        Ok(Self {
            manager,
            admit_script: std::sync::Arc::new(redis::Script::new(ADMIT_SCRIPT)),
        })
    }
}

#[async_trait]
impl FastStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys(format!("*{pattern}*")).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn list_push_trim(
        &self,
        key: &str,
        values: &[String],
        keep: usize,
    ) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: redis::Value = redis::pipe()
            .atomic()
            .lpush(key, values)
            .ltrim(key, 0, keep as isize - 1)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        Ok(conn.lrange(key, 0, -1).await?)
    }

    async fn admit_window(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        max: u32,
    ) -> Result<WindowDecision, StoreError> {
        let mut conn = self.manager.clone();
        // The member must be unique per request: two admits in the same
        // millisecond would otherwise collapse into one sorted-set entry.
        let member = format!("{now_ms}:{}", uuid::Uuid::new_v4());
        let (allowed, retry_secs): (i64, i64) = self
            .admit_script
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(max)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowDecision {
            allowed: allowed == 1,
            retry_after: Duration::from_secs(retry_secs.max(0) as u64),
        })
    }
}
