/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `test_infrastructure`: Adapter self-test (development only)
/// - `auth`: OAuth sign-in, sign-out and session endpoints
/// - `profile`: Profile read and update
/// - `account`: Account deletion
/// - `pages`: Server-rendered pages

pub mod account;
pub mod auth;
pub mod health;
pub mod pages;
pub mod profile;
pub mod test_infrastructure;
