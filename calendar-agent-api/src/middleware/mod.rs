/// Middleware modules for the API server
///
/// This module contains custom middleware for:
/// - Security headers
/// - Session resolution and gating
/// - Request rate limiting
/// - Error tracking of internal errors

pub mod monitoring;
pub mod rate_limit;
pub mod security;
pub mod session;
