//! Connected OAuth accounts
//!
//! One row per (provider, provider account) pair. Tokens are refreshed on
//! every sign-in through [`Account::upsert`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Provider account linked to a user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Provider name, e.g. "google"
    pub provider: String,

    /// Subject identifier at the provider
    pub provider_account_id: String,

    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub token_type: Option<String>,

    #[serde(skip_serializing)]
    pub id_token: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Input for linking a provider account
#[derive(Debug, Clone, Default)]
pub struct LinkAccount {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    pub id_token: Option<String>,
}

impl Account {
    /// Links a provider account, refreshing tokens if the link already exists
    ///
    /// A missing refresh token in `data` keeps the stored one; providers only
    /// hand it out on the first consent.
    pub async fn upsert(pool: &PgPool, data: LinkAccount) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (
                user_id, provider, provider_account_id, access_token, refresh_token,
                expires_at, scope, token_type, id_token
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (provider, provider_account_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, accounts.refresh_token),
                expires_at = EXCLUDED.expires_at,
                scope = EXCLUDED.scope,
                token_type = EXCLUDED.token_type,
                id_token = EXCLUDED.id_token
            RETURNING id, user_id, provider, provider_account_id, access_token, refresh_token,
                      expires_at, scope, token_type, id_token, created_at
            "#,
        )
        .bind(data.user_id)
        .bind(data.provider)
        .bind(data.provider_account_id)
        .bind(data.access_token)
        .bind(data.refresh_token)
        .bind(data.expires_at)
        .bind(data.scope)
        .bind(data.token_type)
        .bind(data.id_token)
        .fetch_one(pool)
        .await
    }

    /// Lists the accounts linked to a user, oldest first
    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, user_id, provider, provider_account_id, access_token, refresh_token,
                   expires_at, scope, token_type, id_token, created_at
            FROM accounts
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
