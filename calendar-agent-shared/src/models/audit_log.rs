//! Audit trail for account changes
//!
//! Entries are append-only. The user reference survives soft deletion so the
//! deletion itself stays attributable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Action recorded when a profile is edited
pub const ACTION_PROFILE_UPDATED: &str = "user.profile.updated";

/// Action recorded when an account is deleted
pub const ACTION_ACCOUNT_DELETED: &str = "user.account.deleted";

/// Resource name for user records
pub const RESOURCE_USER: &str = "User";

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,

    /// Free-form change description (JSONB)
    pub changes: JsonValue,

    /// Client IP, "unknown" when no forwarding header was present
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording an audit entry
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub workspace_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub changes: JsonValue,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl AuditLog {
    /// Appends an entry
    pub async fn create<'e, E>(executor: E, entry: NewAuditLog) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (
                workspace_id, user_id, action, resource, resource_id,
                changes, ip_address, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, workspace_id, user_id, action, resource, resource_id,
                      changes, ip_address, user_agent, created_at
            "#,
        )
        .bind(entry.workspace_id)
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(entry.resource)
        .bind(entry.resource_id)
        .bind(entry.changes)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .fetch_one(executor)
        .await
    }

    /// Lists a user's entries, newest first
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT id, workspace_id, user_id, action, resource, resource_id,
                   changes, ip_address, user_agent, created_at
            FROM audit_logs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
