//! Redis-backed rate limit store
//!
//! Each key is a hash with `count`, `reset` and `blocked` fields (unix
//! milliseconds). The increment runs as a Lua script so concurrent API
//! instances see a consistent count, and the key expires on its own once
//! both the window and any lockout are over.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{RateLimitError, RateLimitRecord, RateLimitStore};
use crate::redis::RedisClient;

const INCREMENT_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])

local reset = tonumber(redis.call('HGET', key, 'reset'))
if (not reset) or reset <= now then
    redis.call('DEL', key)
    reset = now + window
    redis.call('HSET', key, 'count', 1, 'reset', reset)
else
    redis.call('HINCRBY', key, 'count', 1)
end

local values = redis.call('HMGET', key, 'count', 'blocked')
local blocked = tonumber(values[2]) or 0
redis.call('PEXPIREAT', key, math.max(reset, blocked))

return {tonumber(values[1]), reset, blocked}
"#;

/// Rate limit counters shared through Redis
#[derive(Clone)]
pub struct RedisRateLimitStore {
    client: RedisClient,
    script: redis::Script,
}

impl RedisRateLimitStore {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            script: redis::Script::new(INCREMENT_SCRIPT),
        }
    }
}

fn store_error(e: redis::RedisError) -> RateLimitError {
    RateLimitError::Store(e.to_string())
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, RateLimitError> {
        let mut conn = self.client.get_connection();

        let (count, reset, blocked): (Option<u32>, Option<i64>, Option<i64>) = redis::cmd("HMGET")
            .arg(key)
            .arg("count")
            .arg("reset")
            .arg("blocked")
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        let (Some(count), Some(reset)) = (count, reset.and_then(from_millis)) else {
            return Ok(None);
        };

        Ok(Some(RateLimitRecord {
            count,
            window_reset: reset,
            blocked_until: blocked.filter(|ms| *ms > 0).and_then(from_millis),
        }))
    }

    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRecord, RateLimitError> {
        let mut conn = self.client.get_connection();

        let (count, reset, blocked): (u32, i64, i64) = self
            .script
            .key(key)
            .arg(now.timestamp_millis())
            .arg(window.num_milliseconds())
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;

        let window_reset = from_millis(reset)
            .ok_or_else(|| RateLimitError::Store(format!("invalid reset timestamp {}", reset)))?;

        Ok(RateLimitRecord {
            count,
            window_reset,
            blocked_until: if blocked > 0 { from_millis(blocked) } else { None },
        })
    }

    async fn block(&self, key: &str, until: DateTime<Utc>) -> Result<(), RateLimitError> {
        let mut conn = self.client.get_connection();
        let until_ms = until.timestamp_millis();

        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(key)
            .arg("blocked")
            .arg(until_ms)
            .ignore()
            .cmd("PEXPIREAT")
            .arg(key)
            .arg(until_ms)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn expire(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.client.get_connection();

        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, RateLimitError> {
        // Keys carry their own PEXPIREAT
        Ok(0)
    }
}
