//! Persistence seam
//!
//! Handlers talk to [`Repository`] rather than to the models directly so the
//! HTTP layer can run against [`MemoryRepository`] in tests and against
//! [`PgRepository`] in production.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use calendar_agent_shared::repository::{MemoryRepository, Repository};
//! use calendar_agent_shared::models::CreateUser;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
//! let user = repo.create_user(CreateUser {
//!     email: "ada@example.com".to_string(),
//!     name: Some("Ada".to_string()),
//!     image: None,
//! }).await?;
//! assert!(repo.find_user(user.id).await?.is_some());
//! # Ok(())
//! # }
//! ```

mod memory;
mod pg;

pub use memory::MemoryRepository;
pub use pg::PgRepository;

use crate::models::{
    Account, AuditLog, CreateUser, CreateWorkspace, LinkAccount, NewAuditLog, ProfileChanges,
    Session, User, Workspace,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Repository errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique constraint violated
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Storage operations used by the API and worker
///
/// Lookups never return soft-deleted users or expired sessions.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Probes the backing store, returning the round-trip latency
    async fn ping(&self) -> RepositoryResult<Duration>;

    // Users

    async fn find_user(&self, id: Uuid) -> RepositoryResult<Option<User>>;

    /// Case-insensitive email lookup
    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    async fn create_user(&self, data: CreateUser) -> RepositoryResult<User>;

    /// Writes only the supplied fields; None when the user does not exist
    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> RepositoryResult<Option<User>>;

    async fn assign_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> RepositoryResult<bool>;

    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool>;

    /// Soft-deletes a user, revokes their sessions and records `audit`
    /// as one unit: either all three happen or none do.
    ///
    /// # Returns
    ///
    /// Number of sessions revoked, or None when no live user matched
    async fn delete_account(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        audit: NewAuditLog,
    ) -> RepositoryResult<Option<u64>>;

    // Workspaces

    async fn find_workspace(&self, id: Uuid) -> RepositoryResult<Option<Workspace>>;

    async fn workspace_slug_exists(&self, slug: &str) -> RepositoryResult<bool>;

    async fn create_workspace(&self, data: CreateWorkspace) -> RepositoryResult<Workspace>;

    // Connected accounts

    async fn list_accounts(&self, user_id: Uuid) -> RepositoryResult<Vec<Account>>;

    async fn link_account(&self, data: LinkAccount) -> RepositoryResult<Account>;

    // Sessions

    async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<Session>;

    /// Finds a session that exists and has not expired
    async fn find_session(&self, id: Uuid) -> RepositoryResult<Option<Session>>;

    /// Slides a live session's expiry forward
    async fn extend_session(&self, id: Uuid, expires_at: DateTime<Utc>) -> RepositoryResult<bool>;

    async fn delete_session(&self, id: Uuid) -> RepositoryResult<bool>;

    /// Revokes every session of a user, returning how many were removed
    async fn delete_user_sessions(&self, user_id: Uuid) -> RepositoryResult<u64>;

    // Audit log

    async fn record_audit(&self, entry: NewAuditLog) -> RepositoryResult<AuditLog>;

    async fn list_audit_logs(&self, user_id: Uuid, limit: i64) -> RepositoryResult<Vec<AuditLog>>;
}
