/// Redis connectivity
///
/// Redis backs several optional services:
///
/// ```text
///                 ┌──────────────┐
///   cache ───────>│              │  GET/SETEX/DEL
///   rate limits ─>│ RedisClient  │  Lua counter script
///   jobs ────────>│ (connection  │  XADD jobs:events
///   realtime ────>│   manager)   │  PUBLISH realtime:{channel}
///                 └──────────────┘
/// ```
///
/// When `REDIS_URL` is unset each of those falls back to its disabled mode.

pub mod client;

pub use client::{sanitize_url, RedisClient, RedisClientError, RedisConfig};
