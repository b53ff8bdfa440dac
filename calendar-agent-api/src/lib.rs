//! # Calendar Agent API Server Library
//!
//! Account settings backend: OAuth sign-in, profile management and
//! account deletion.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request extractors
//! - `middleware`: Session, rate limit, security and error tracking layers
//! - `routes`: API route handlers and pages

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
