//! Database layer: connection pool and migrations
//!
//! Models live in [`crate::models`].

pub mod migrations;
pub mod pool;

pub use pool::{create_pool, health_check, DatabaseConfig};
