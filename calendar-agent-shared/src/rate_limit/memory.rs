//! In-process rate limit store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{RateLimitError, RateLimitRecord, RateLimitStore};

/// Rate limit counters held in a concurrent map
///
/// State is per process. Pair with [`super::spawn_cleanup`] so abandoned keys
/// do not accumulate.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    records: DashMap<String, RateLimitRecord>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, RateLimitError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRecord, RateLimitError> {
        // The entry guard holds the shard lock, so read-modify-write is atomic
        let record = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.window_reset <= now {
                    *record = RateLimitRecord::fresh(now, window);
                } else {
                    record.count += 1;
                }
                record.clone()
            }
            Entry::Vacant(vacant) => vacant
                .insert(RateLimitRecord::fresh(now, window))
                .value()
                .clone(),
        };

        Ok(record)
    }

    async fn block(&self, key: &str, until: DateTime<Utc>) -> Result<(), RateLimitError> {
        if let Some(mut record) = self.records.get_mut(key) {
            record.blocked_until = Some(until);
        }
        Ok(())
    }

    async fn expire(&self, key: &str) -> Result<(), RateLimitError> {
        self.records.remove(key);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, RateLimitError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_stale_at(now));
        Ok(before.saturating_sub(self.records.len()))
    }
}
