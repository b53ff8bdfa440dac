//! # Calendar Agent Shared Library
//!
//! Types and business logic shared by the calendar agent API server and
//! background worker.
//!
//! ## Module Organization
//!
//! - `models`: Database models and their SQL
//! - `db`: Connection pool and migrations
//! - `repository`: Storage seam over Postgres, with an in-memory twin
//! - `workspace`: Workspace context and personal workspace provisioning
//! - `html`: Text escaping for rendered HTML
//! - `auth`: Sessions, OAuth, authorization, confirmation tokens, auth events
//! - `rate_limit`: Sign-in lockout and request rate limiting
//! - `validation`: Request body schemas
//! - `redis`: Shared Redis connection
//! - `infra`: Cache, job queue, realtime push and error tracking adapters

pub mod auth;
pub mod db;
pub mod html;
pub mod infra;
pub mod models;
pub mod rate_limit;
pub mod redis;
pub mod repository;
pub mod validation;
pub mod workspace;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
