//! Rate limiting
//!
//! Two limiters share one storage abstraction:
//!
//! - [`SignInRateLimiter`]: fixed window per identifier (email) with a
//!   lockout. Five attempts per 15 minutes; the sixth blocks the identifier
//!   for 30 minutes.
//! - [`RequestRateLimiter`]: plain fixed-window counters per client for the
//!   HTTP presets in [`RateLimitPreset`].
//!
//! Counters live behind [`RateLimitStore`], so the in-process
//! [`InMemoryRateLimitStore`] can be swapped for [`RedisRateLimitStore`]
//! when several API instances must share state.
//!
//! Store failures never lock anyone out: both limiters fail open and log.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use calendar_agent_shared::rate_limit::{InMemoryRateLimitStore, SignInRateLimiter};
//!
//! # async fn example() {
//! let limiter = SignInRateLimiter::new(Arc::new(InMemoryRateLimitStore::new()));
//!
//! for _ in 0..5 {
//!     assert!(limiter.check("ada@example.com").await.allowed);
//! }
//! let sixth = limiter.check("ada@example.com").await;
//! assert!(!sixth.allowed);
//! assert!(sixth.reset_time.is_some());
//! # }
//! ```

mod memory;
mod redis_store;

pub use memory::InMemoryRateLimitStore;
pub use redis_store::RedisRateLimitStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Rate limit store errors
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("rate limit store error: {0}")]
    Store(String),
}

/// Counter state for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// Attempts in the current window
    pub count: u32,

    /// When the current window ends
    pub window_reset: DateTime<Utc>,

    /// Lockout end, if the key is locked out
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitRecord {
    /// First attempt of a new window
    pub fn fresh(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            window_reset: now + window,
            blocked_until: None,
        }
    }

    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.map(|until| until > now).unwrap_or(false)
    }

    /// True once neither the window nor a lockout is still running
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.window_reset <= now && !self.is_blocked_at(now)
    }
}

/// Storage strategy for rate limit counters
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Reads the record for a key
    async fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, RateLimitError>;

    /// Counts one attempt
    ///
    /// Starts a fresh window (count 1) when the key is unknown or its window
    /// has ended; otherwise increments the count.
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRecord, RateLimitError>;

    /// Locks a key out until the given instant
    async fn block(&self, key: &str, until: DateTime<Utc>) -> Result<(), RateLimitError>;

    /// Forgets a key
    async fn expire(&self, key: &str) -> Result<(), RateLimitError>;

    /// Drops records whose window and lockout have both ended
    ///
    /// Stores with native expiry may return 0 without doing anything.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, RateLimitError>;
}

/// Sign-in lockout parameters
#[derive(Debug, Clone, Copy)]
pub struct SignInPolicy {
    /// Attempts allowed per window
    pub max_attempts: u32,

    /// Counting window
    pub window: Duration,

    /// Lockout applied when the window's attempts are exhausted
    pub block: Duration,
}

impl Default for SignInPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(15),
            block: Duration::minutes(30),
        }
    }
}

/// Result of a sign-in check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,

    /// When a denied identifier may try again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reset_time: None,
        }
    }

    fn deny(until: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            reset_time: Some(until),
        }
    }
}

/// Per-identifier sign-in limiter with lockout
#[derive(Clone)]
pub struct SignInRateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: SignInPolicy,
}

impl SignInRateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self::with_policy(store, SignInPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn RateLimitStore>, policy: SignInPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> SignInPolicy {
        self.policy
    }

    /// Records a sign-in attempt and decides whether it may proceed
    pub async fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Utc::now()).await
    }

    /// [`Self::check`] with an explicit clock
    pub async fn check_at(&self, identifier: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let key = format!("signin:{}", identifier.to_lowercase());

        match self.store.get(&key).await {
            Ok(Some(record)) => match record.blocked_until {
                Some(until) if until > now => return RateLimitDecision::deny(until),
                Some(_) => {
                    // Lockout over; the next attempt opens a new window
                    if let Err(e) = self.store.expire(&key).await {
                        tracing::warn!(error = %e, "Failed to clear lapsed sign-in lockout");
                    }
                }
                None => {}
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in rate limit store unavailable, allowing attempt");
                return RateLimitDecision::allow();
            }
        }

        let record = match self.store.increment(&key, self.policy.window, now).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in rate limit store unavailable, allowing attempt");
                return RateLimitDecision::allow();
            }
        };

        if record.count > self.policy.max_attempts {
            let until = now + self.policy.block;
            if let Err(e) = self.store.block(&key, until).await {
                tracing::warn!(error = %e, "Failed to persist sign-in lockout");
            }
            return RateLimitDecision::deny(until);
        }

        RateLimitDecision::allow()
    }
}

/// HTTP rate limit presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitPreset {
    Public,
    Authenticated,
    Auth,
    Signup,
    PasswordReset,
    Email,
    Ai,
    Upload,
    Webhook,
}

impl RateLimitPreset {
    /// Requests allowed per window
    pub fn limit(&self) -> u32 {
        match self {
            RateLimitPreset::Public => 100,
            RateLimitPreset::Authenticated => 1000,
            RateLimitPreset::Auth => 5,
            RateLimitPreset::Signup => 3,
            RateLimitPreset::PasswordReset => 3,
            RateLimitPreset::Email => 10,
            RateLimitPreset::Ai => 50,
            RateLimitPreset::Upload => 20,
            RateLimitPreset::Webhook => 1000,
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            RateLimitPreset::Public | RateLimitPreset::Authenticated | RateLimitPreset::Webhook => {
                Duration::minutes(1)
            }
            RateLimitPreset::Auth => Duration::minutes(15),
            _ => Duration::hours(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitPreset::Public => "public",
            RateLimitPreset::Authenticated => "authenticated",
            RateLimitPreset::Auth => "auth",
            RateLimitPreset::Signup => "signup",
            RateLimitPreset::PasswordReset => "password_reset",
            RateLimitPreset::Email => "email",
            RateLimitPreset::Ai => "ai",
            RateLimitPreset::Upload => "upload",
            RateLimitPreset::Webhook => "webhook",
        }
    }
}

/// Outcome of a request rate limit check, surfaced as `X-RateLimit-*` headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

impl RateLimitInfo {
    /// Seconds until the window resets, at least 1
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.reset - now).num_seconds().max(1) as u64
    }
}

/// Fixed-window limiter for HTTP traffic
#[derive(Clone)]
pub struct RequestRateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RequestRateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub async fn check(&self, identifier: &str, preset: RateLimitPreset) -> RateLimitInfo {
        self.check_at(identifier, preset, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        identifier: &str,
        preset: RateLimitPreset,
        now: DateTime<Utc>,
    ) -> RateLimitInfo {
        let key = format!("ratelimit:{}:{}", preset.as_str(), identifier);
        let limit = preset.limit();

        match self.store.increment(&key, preset.window(), now).await {
            Ok(record) => RateLimitInfo {
                success: record.count <= limit,
                limit,
                remaining: limit.saturating_sub(record.count),
                reset: record.window_reset,
            },
            Err(e) => {
                tracing::warn!(error = %e, preset = preset.as_str(), "Rate limit check failed, allowing request");
                RateLimitInfo {
                    success: true,
                    limit,
                    remaining: limit,
                    reset: now + preset.window(),
                }
            }
        }
    }
}

/// Periodically purges stale records from a store
pub fn spawn_cleanup(store: Arc<dyn RateLimitStore>, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged stale rate limit records"),
                Err(e) => tracing::warn!(error = %e, "Rate limit cleanup failed"),
            }
        }
    })
}
