//! Workspace model and database operations
//!
//! Workspaces are the tenant boundary. A personal workspace is created for
//! every user on first sign-in; see [`crate::workspace`] for that flow.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE workspaces (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     name VARCHAR(255) NOT NULL,
//!     slug VARCHAR(255) NOT NULL UNIQUE,
//!     type VARCHAR(20) NOT NULL DEFAULT 'PERSONAL',
//!     plan VARCHAR(50) NOT NULL DEFAULT 'free',
//!     owner_id UUID NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Workspace kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkspaceType {
    Personal,
    Team,
    Enterprise,
}

impl WorkspaceType {
    /// Converts type to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceType::Personal => "PERSONAL",
            WorkspaceType::Team => "TEAM",
            WorkspaceType::Enterprise => "ENTERPRISE",
        }
    }

    /// Parses type from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PERSONAL" => Some(WorkspaceType::Personal),
            "TEAM" => Some(WorkspaceType::Team),
            "ENTERPRISE" => Some(WorkspaceType::Enterprise),
            _ => None,
        }
    }
}

/// Workspace record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    pub id: Uuid,

    /// Display name, e.g. "Ada Workspace"
    pub name: String,

    /// URL-safe unique identifier
    pub slug: String,

    /// "PERSONAL", "TEAM" or "ENTERPRISE"
    #[sqlx(rename = "type")]
    pub workspace_type: String,

    /// Billing plan name
    pub plan: String,

    /// User who created the workspace
    pub owner_id: Uuid,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a workspace
#[derive(Debug, Clone)]
pub struct CreateWorkspace {
    pub name: String,
    pub slug: String,
    pub workspace_type: WorkspaceType,
    pub plan: String,
    pub owner_id: Uuid,
}

impl Workspace {
    /// Gets the parsed workspace type
    pub fn get_type(&self) -> Option<WorkspaceType> {
        WorkspaceType::from_str(&self.workspace_type)
    }

    /// Creates a workspace
    ///
    /// # Errors
    ///
    /// Returns an error if the slug is already taken.
    pub async fn create(pool: &PgPool, data: CreateWorkspace) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Workspace>(
            r#"
            INSERT INTO workspaces (name, slug, type, plan, owner_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, slug, type, plan, owner_id, created_at, updated_at
            "#,
        )
        .bind(data.name)
        .bind(data.slug)
        .bind(data.workspace_type.as_str())
        .bind(data.plan)
        .bind(data.owner_id)
        .fetch_one(pool)
        .await
    }

    /// Finds a workspace by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Workspace>(
            r#"
            SELECT id, name, slug, type, plan, owner_id, created_at, updated_at
            FROM workspaces
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Checks whether a slug is already in use
    pub async fn slug_exists(pool: &PgPool, slug: &str) -> Result<bool, sqlx::Error> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM workspaces WHERE slug = $1)")
                .bind(slug)
                .fetch_one(pool)
                .await?;

        Ok(exists)
    }
}

/// Derives the base slug for a personal workspace from an email address
///
/// Takes the local part, lowercases it and replaces every character outside
/// `[a-z0-9]` with `-`.
pub fn personal_slug_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    local
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect()
}

/// Display name for a personal workspace
pub fn personal_workspace_name(user_name: Option<&str>) -> String {
    match user_name {
        Some(name) if !name.trim().is_empty() => format!("{} Workspace", name.trim()),
        _ => "My Workspace".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_email() {
        assert_eq!(personal_slug_base("Ada.Lovelace+cal@example.com"), "ada-lovelace-cal");
        assert_eq!(personal_slug_base("grace99@example.com"), "grace99");
    }

    #[test]
    fn test_workspace_name() {
        assert_eq!(personal_workspace_name(Some("Ada")), "Ada Workspace");
        assert_eq!(personal_workspace_name(Some("  ")), "My Workspace");
        assert_eq!(personal_workspace_name(None), "My Workspace");
    }

    #[test]
    fn test_workspace_type_round_trip() {
        for kind in [WorkspaceType::Personal, WorkspaceType::Team, WorkspaceType::Enterprise] {
            assert_eq!(WorkspaceType::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(WorkspaceType::from_str("personal"), None);
    }
}
