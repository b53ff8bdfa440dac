//! Redis cache
//!
//! JSON values under string keys with a TTL. The cache is a side channel:
//! every public operation fails open (miss, `false` or `0`) and logs, so a
//! Redis outage only costs latency.
//!
//! # Example
//!
//! ```no_run
//! use calendar_agent_shared::infra::cache::{ttl, Cache};
//!
//! # async fn example(cache: Cache) {
//! cache.set_json("calendar:42:events", &vec!["standup"], ttl::CALENDAR_EVENTS).await;
//! let events: Option<Vec<String>> = cache.get_json("calendar:42:events").await;
//! # }
//! ```

use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Preferences;
use crate::redis::RedisClient;

/// TTLs in seconds
pub mod ttl {
    pub const USER_PREFERENCES: u64 = 300;
    pub const CALENDAR_EVENTS: u64 = 60;
    pub const TASK_LISTS: u64 = 30;
    pub const SCHEDULE_CALCULATIONS: u64 = 300;
    pub const SESSION: u64 = 3600;
    pub const RATE_LIMIT: u64 = 60;
}

const SCAN_BATCH: usize = 100;

/// Cache errors, only surfaced by [`Cache::ping`]
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache is not configured")]
    Disabled,

    #[error("Cache command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache round trip failed: {0}")]
    RoundTrip(String),

    #[error("Cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Redis cache, or a no-op when Redis is not configured
#[derive(Clone, Default)]
pub struct Cache {
    client: Option<RedisClient>,
}

impl Cache {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Cache that always misses
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Reads and decodes a value; None on miss or any failure
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get_json(key).await {
            Ok(value) => value,
            Err(CacheError::Disabled) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache get failed");
                None
            }
        }
    }

    /// Stores a value with a TTL; false on failure
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) -> bool {
        match self.try_set_json(key, value, ttl_secs).await {
            Ok(()) => true,
            Err(CacheError::Disabled) => false,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache set failed");
                false
            }
        }
    }

    /// Removes a key; false on failure
    pub async fn delete(&self, key: &str) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        let mut conn = client.get_connection();

        match conn.del::<_, ()>(key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    /// Removes every key matching a glob pattern, e.g. `user:123:*`
    ///
    /// Returns the number of keys removed; 0 on failure.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        match self.try_invalidate_pattern(pattern).await {
            Ok(removed) => removed,
            Err(CacheError::Disabled) => 0,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Cache invalidation failed");
                0
            }
        }
    }

    /// Set, get and delete of a probe key
    ///
    /// Unlike the other operations this reports failure, for health checks.
    pub async fn ping(&self) -> Result<Duration, CacheError> {
        let client = self.client.as_ref().ok_or(CacheError::Disabled)?;
        client
            .round_trip("health:check")
            .await
            .map_err(|e| CacheError::RoundTrip(e.to_string()))
    }

    pub fn user_preferences_key(user_id: Uuid) -> String {
        format!("user:{}:preferences", user_id)
    }

    pub async fn get_user_preferences(&self, user_id: Uuid) -> Option<Preferences> {
        self.get_json(&Self::user_preferences_key(user_id)).await
    }

    pub async fn set_user_preferences(&self, user_id: Uuid, preferences: &Preferences) -> bool {
        self.set_json(
            &Self::user_preferences_key(user_id),
            preferences,
            ttl::USER_PREFERENCES,
        )
        .await
    }

    /// Drops everything cached for a user
    pub async fn invalidate_user(&self, user_id: Uuid) -> u64 {
        self.invalidate_pattern(&format!("user:{}:*", user_id)).await
    }

    async fn try_get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let client = self.client.as_ref().ok_or(CacheError::Disabled)?;
        let mut conn = client.get_connection();

        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn try_set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let client = self.client.as_ref().ok_or(CacheError::Disabled)?;
        let mut conn = client.get_connection();

        let raw = serde_json::to_string(value)?;
        conn.set_ex::<_, _, ()>(key, raw, ttl_secs).await?;
        Ok(())
    }

    async fn try_invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let client = self.client.as_ref().ok_or(CacheError::Disabled)?;
        let mut conn = client.get_connection();

        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }
}
