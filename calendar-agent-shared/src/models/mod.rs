//! Database models for the calendar agent
//!
//! Each model owns its SQL and exposes `async fn` operations over a `&PgPool`.
//! Handlers normally reach these through [`crate::repository::PgRepository`].
//!
//! # Models
//!
//! - `user`: Accounts and scheduling preferences
//! - `workspace`: Tenant boundary, one per user
//! - `account`: Linked OAuth provider accounts
//! - `session`: Server-side session records (revocation)
//! - `audit_log`: Append-only trail of account changes

pub mod account;
pub mod audit_log;
pub mod session;
pub mod user;
pub mod workspace;

pub use account::{Account, LinkAccount};
pub use audit_log::{AuditLog, NewAuditLog};
pub use session::Session;
pub use user::{CreateUser, Preferences, ProfileChanges, User, UserRole};
pub use workspace::{CreateWorkspace, Workspace, WorkspaceType};
