//! User model and database operations
//!
//! A user is created on first OAuth sign-in and carries the scheduling
//! preferences edited from the account settings page.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE users (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     email VARCHAR(255) NOT NULL,
//!     name VARCHAR(100),
//!     image VARCHAR(1024),
//!     role VARCHAR(20) NOT NULL DEFAULT 'user',
//!     is_active BOOLEAN NOT NULL DEFAULT TRUE,
//!     timezone VARCHAR(50) NOT NULL DEFAULT 'UTC',
//!     work_hours_start INTEGER NOT NULL DEFAULT 9,
//!     work_hours_end INTEGER NOT NULL DEFAULT 17,
//!     work_days TEXT[] NOT NULL DEFAULT ARRAY['Mon', 'Tue', 'Wed', 'Thu', 'Fri'],
//!     break_duration INTEGER NOT NULL DEFAULT 15,
//!     workspace_id UUID REFERENCES workspaces(id),
//!     deleted_at TIMESTAMPTZ,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! Soft-deleted rows (`deleted_at IS NOT NULL`) are never returned by the
//! lookups in this module.
//!
//! # Example
//!
//! ```no_run
//! use calendar_agent_shared::models::user::{User, CreateUser, ProfileChanges};
//! use calendar_agent_shared::db::pool::{create_pool, DatabaseConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool(DatabaseConfig::default()).await?;
//!
//! let user = User::create(&pool, CreateUser {
//!     email: "ada@example.com".to_string(),
//!     name: Some("Ada".to_string()),
//!     image: None,
//! }).await?;
//!
//! let changes = ProfileChanges {
//!     timezone: Some("Europe/London".to_string()),
//!     ..Default::default()
//! };
//! User::update_profile(&pool, user.id, &changes).await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, name, image, role, is_active, timezone, \
    work_hours_start, work_hours_end, work_days, break_duration, workspace_id, \
    deleted_at, created_at, updated_at";

/// Default working days for new accounts
pub const DEFAULT_WORK_DAYS: [&str; 5] = ["Mon", "Tue", "Wed", "Thu", "Fri"];

/// Account role
///
/// Admins bypass ownership checks on modify operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
    Premium,
}

impl UserRole {
    /// Converts role to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::Premium => "premium",
        }
    }

    /// Parses role from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(UserRole::User),
            "admin" => Some(UserRole::Admin),
            "premium" => Some(UserRole::Premium),
            _ => None,
        }
    }
}

/// User model representing an account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Email address as supplied by the identity provider
    ///
    /// Unique case-insensitively among live accounts
    pub email: String,

    /// Optional display name
    pub name: Option<String>,

    /// Optional avatar URL
    pub image: Option<String>,

    /// Role string ("user", "admin" or "premium"); see [`User::role`]
    pub role: String,

    /// Inactive accounts cannot hold a session
    pub is_active: bool,

    /// IANA timezone name
    pub timezone: String,

    /// First working hour (0-23)
    pub work_hours_start: i32,

    /// Last working hour (0-23), always after `work_hours_start`
    pub work_hours_end: i32,

    /// Three-letter weekday abbreviations
    pub work_days: Vec<String>,

    /// Break length in minutes
    pub break_duration: i32,

    /// Workspace the user belongs to
    pub workspace_id: Option<Uuid>,

    /// Set when the account has been soft-deleted
    pub deleted_at: Option<DateTime<Utc>>,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last updated
    pub updated_at: DateTime<Utc>,
}

/// Scheduling preferences as exposed over the API and cached in Redis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub timezone: String,
    pub work_hours_start: i32,
    pub work_hours_end: i32,
    pub work_days: Vec<String>,
    pub break_duration: i32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            work_hours_start: 9,
            work_hours_end: 17,
            work_days: DEFAULT_WORK_DAYS.iter().map(|d| d.to_string()).collect(),
            break_duration: 15,
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Email address from the identity provider
    pub email: String,

    /// Optional display name
    pub name: Option<String>,

    /// Optional avatar URL
    pub image: Option<String>,
}

/// Partial profile update
///
/// Only `Some` fields are written; everything else keeps its stored value.
/// Serializes to exactly the supplied fields, which is what the audit log
/// records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_hours_start: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_hours_end: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_days: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_duration: Option<i32>,
}

impl ProfileChanges {
    /// True when no field was supplied
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.timezone.is_none()
            && self.work_hours_start.is_none()
            && self.work_hours_end.is_none()
            && self.work_days.is_none()
            && self.break_duration.is_none()
    }

    /// Applies the supplied fields to an in-memory user
    pub fn apply_to(&self, user: &mut User) {
        if let Some(ref name) = self.name {
            user.name = Some(name.clone());
        }
        if let Some(ref timezone) = self.timezone {
            user.timezone = timezone.clone();
        }
        if let Some(start) = self.work_hours_start {
            user.work_hours_start = start;
        }
        if let Some(end) = self.work_hours_end {
            user.work_hours_end = end;
        }
        if let Some(ref days) = self.work_days {
            user.work_days = days.clone();
        }
        if let Some(minutes) = self.break_duration {
            user.break_duration = minutes;
        }
    }
}

impl User {
    /// Gets the parsed role, treating unknown values as a plain user
    pub fn role(&self) -> UserRole {
        UserRole::from_str(&self.role).unwrap_or(UserRole::User)
    }

    /// Whether the account has been soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Extracts the scheduling preferences
    pub fn preferences(&self) -> Preferences {
        Preferences {
            timezone: self.timezone.clone(),
            work_hours_start: self.work_hours_start,
            work_hours_end: self.work_hours_end,
            work_days: self.work_days.clone(),
            break_duration: self.break_duration,
        }
    }

    /// Creates a new user with default preferences
    ///
    /// # Errors
    ///
    /// Returns an error if a live account with the same email exists
    /// (unique index violation) or the database is unreachable.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, name, image) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(data.email)
            .bind(data.name)
            .bind(data.image)
            .fetch_one(pool)
            .await?;

        Ok(user)
    }

    /// Finds a live user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Finds a live user by email address (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL",
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Applies a partial profile update
    ///
    /// Only the supplied fields appear in the SET clause. `updated_at` is
    /// always refreshed.
    ///
    /// # Returns
    ///
    /// The updated user, or None if no live user has this ID
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use calendar_agent_shared::models::user::{User, ProfileChanges};
    /// # use sqlx::PgPool;
    /// # use uuid::Uuid;
    /// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    /// let changes = ProfileChanges {
    ///     name: Some("Grace Hopper".to_string()),
    ///     ..Default::default()
    /// };
    ///
    /// if let Some(user) = User::update_profile(&pool, user_id, &changes).await? {
    ///     assert_eq!(user.name.as_deref(), Some("Grace Hopper"));
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 1;

        if changes.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if changes.timezone.is_some() {
            bind_count += 1;
            query.push_str(&format!(", timezone = ${}", bind_count));
        }
        if changes.work_hours_start.is_some() {
            bind_count += 1;
            query.push_str(&format!(", work_hours_start = ${}", bind_count));
        }
        if changes.work_hours_end.is_some() {
            bind_count += 1;
            query.push_str(&format!(", work_hours_end = ${}", bind_count));
        }
        if changes.work_days.is_some() {
            bind_count += 1;
            query.push_str(&format!(", work_days = ${}", bind_count));
        }
        if changes.break_duration.is_some() {
            bind_count += 1;
            query.push_str(&format!(", break_duration = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        ));

        let mut q = sqlx::query_as::<_, User>(&query).bind(id);

        if let Some(ref name) = changes.name {
            q = q.bind(name.clone());
        }
        if let Some(ref timezone) = changes.timezone {
            q = q.bind(timezone.clone());
        }
        if let Some(start) = changes.work_hours_start {
            q = q.bind(start);
        }
        if let Some(end) = changes.work_hours_end {
            q = q.bind(end);
        }
        if let Some(ref days) = changes.work_days {
            q = q.bind(days.clone());
        }
        if let Some(minutes) = changes.break_duration {
            q = q.bind(minutes);
        }

        q.fetch_optional(pool).await
    }

    /// Moves a user into a workspace
    pub async fn assign_workspace(
        pool: &PgPool,
        id: Uuid,
        workspace_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET workspace_id = $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(workspace_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Soft-deletes a user
    ///
    /// The row is kept for audit purposes but marked inactive and hidden
    /// from every lookup.
    ///
    /// # Returns
    ///
    /// True if a live user was marked deleted
    pub async fn soft_delete<'e, E>(
        executor: E,
        id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET deleted_at = $2, is_active = FALSE, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(deleted_at)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        let now = Utc::now();
        let prefs = Preferences::default();
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            name: Some("Ada".to_string()),
            image: None,
            role: "user".to_string(),
            is_active: true,
            timezone: prefs.timezone,
            work_hours_start: prefs.work_hours_start,
            work_hours_end: prefs.work_hours_end,
            work_days: prefs.work_days,
            break_duration: prefs.break_duration,
            workspace_id: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(UserRole::from_str("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_str("premium"), Some(UserRole::Premium));
        assert_eq!(UserRole::from_str("root"), None);

        let mut user = sample_user();
        user.role = "mystery".to_string();
        assert_eq!(user.role(), UserRole::User);
    }

    #[test]
    fn test_default_preferences() {
        let prefs = Preferences::default();
        assert_eq!(prefs.timezone, "UTC");
        assert_eq!(prefs.work_hours_start, 9);
        assert_eq!(prefs.work_hours_end, 17);
        assert_eq!(prefs.work_days, vec!["Mon", "Tue", "Wed", "Thu", "Fri"]);
        assert_eq!(prefs.break_duration, 15);
    }

    #[test]
    fn test_apply_only_touches_supplied_fields() {
        let mut user = sample_user();
        let before = user.preferences();

        let changes = ProfileChanges {
            name: Some("Ada Lovelace".to_string()),
            ..Default::default()
        };
        changes.apply_to(&mut user);

        assert_eq!(user.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(user.preferences(), before);
    }

    #[test]
    fn test_changes_serialize_supplied_fields_only() {
        let changes = ProfileChanges {
            work_hours_start: Some(8),
            break_duration: Some(0),
            ..Default::default()
        };

        let json = serde_json::to_value(&changes).unwrap();
        assert_eq!(json, serde_json::json!({"workHoursStart": 8, "breakDuration": 0}));
        assert!(!changes.is_empty());
        assert!(ProfileChanges::default().is_empty());
    }
}
