use super::{Repository, RepositoryError, RepositoryResult};
use crate::db::pool::health_check;
use crate::models::{
    Account, AuditLog, CreateUser, CreateWorkspace, LinkAccount, NewAuditLog, ProfileChanges,
    Session, User, Workspace,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::future::Future;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Workspace queries slower than this are logged
const SLOW_WORKSPACE_QUERY: Duration = Duration::from_millis(50);

/// Postgres-backed repository
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps unique violations to [`RepositoryError::Conflict`]
fn map_unique(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return RepositoryError::Conflict(format!("{} already exists", what));
        }
    }
    RepositoryError::Database(err)
}

/// Times a workspace query and warns when it is slow
async fn monitored<T, F>(operation: &'static str, fut: F) -> Result<T, sqlx::Error>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let started = Instant::now();
    let result = fut.await;
    let elapsed = started.elapsed();

    if elapsed > SLOW_WORKSPACE_QUERY {
        tracing::warn!(
            operation,
            elapsed_ms = elapsed.as_millis() as u64,
            "Slow workspace query"
        );
    }

    result
}

#[async_trait]
impl Repository for PgRepository {
    async fn ping(&self) -> RepositoryResult<Duration> {
        Ok(health_check(&self.pool).await?)
    }

    async fn find_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn create_user(&self, data: CreateUser) -> RepositoryResult<User> {
        User::create(&self.pool, data)
            .await
            .map_err(|e| map_unique(e, "user"))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> RepositoryResult<Option<User>> {
        Ok(User::update_profile(&self.pool, id, changes).await?)
    }

    async fn assign_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> RepositoryResult<bool> {
        Ok(User::assign_workspace(&self.pool, user_id, workspace_id).await?)
    }

    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        Ok(User::soft_delete(&self.pool, id, at).await?)
    }

    async fn delete_account(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        audit: NewAuditLog,
    ) -> RepositoryResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        // Dropping the transaction without commit rolls it back
        if !User::soft_delete(&mut *tx, id, at).await? {
            return Ok(None);
        }
        let revoked = Session::delete_for_user(&mut *tx, id).await?;
        AuditLog::create(&mut *tx, audit).await?;

        tx.commit().await?;
        Ok(Some(revoked))
    }

    async fn find_workspace(&self, id: Uuid) -> RepositoryResult<Option<Workspace>> {
        Ok(monitored("find_workspace", Workspace::find_by_id(&self.pool, id)).await?)
    }

    async fn workspace_slug_exists(&self, slug: &str) -> RepositoryResult<bool> {
        Ok(monitored("workspace_slug_exists", Workspace::slug_exists(&self.pool, slug)).await?)
    }

    async fn create_workspace(&self, data: CreateWorkspace) -> RepositoryResult<Workspace> {
        monitored("create_workspace", Workspace::create(&self.pool, data))
            .await
            .map_err(|e| map_unique(e, "workspace slug"))
    }

    async fn list_accounts(&self, user_id: Uuid) -> RepositoryResult<Vec<Account>> {
        Ok(Account::list_by_user(&self.pool, user_id).await?)
    }

    async fn link_account(&self, data: LinkAccount) -> RepositoryResult<Account> {
        Ok(Account::upsert(&self.pool, data).await?)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<Session> {
        Ok(Session::create(&self.pool, user_id, expires_at).await?)
    }

    async fn find_session(&self, id: Uuid) -> RepositoryResult<Option<Session>> {
        Ok(Session::find_valid(&self.pool, id).await?)
    }

    async fn extend_session(&self, id: Uuid, expires_at: DateTime<Utc>) -> RepositoryResult<bool> {
        Ok(Session::extend(&self.pool, id, expires_at).await?)
    }

    async fn delete_session(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(Session::delete(&self.pool, id).await?)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> RepositoryResult<u64> {
        Ok(Session::delete_for_user(&self.pool, user_id).await?)
    }

    async fn record_audit(&self, entry: NewAuditLog) -> RepositoryResult<AuditLog> {
        Ok(AuditLog::create(&self.pool, entry).await?)
    }

    async fn list_audit_logs(&self, user_id: Uuid, limit: i64) -> RepositoryResult<Vec<AuditLog>> {
        Ok(AuditLog::list_for_user(&self.pool, user_id, limit).await?)
    }
}
