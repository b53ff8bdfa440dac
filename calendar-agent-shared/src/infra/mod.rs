//! Infrastructure adapters
//!
//! Each adapter has a disabled mode for when its backing service is not
//! configured, so the API and worker start with nothing but Postgres.
//!
//! | adapter | backing | on failure |
//! |---------|---------|------------|
//! | [`cache`] | Redis strings | miss / no-op, logged |
//! | [`jobs`] | Redis stream `jobs:events` | error returned |
//! | [`realtime`] | Redis pub/sub | dropped, logged |
//! | [`monitoring`] | HTTP store endpoint | dropped, logged |

pub mod cache;
pub mod jobs;
pub mod monitoring;
pub mod realtime;

pub use cache::Cache;
pub use jobs::{JobClient, JobEvent, JobQueueError, JOB_STREAM};
pub use monitoring::ErrorTracker;
pub use realtime::RealtimeClient;
