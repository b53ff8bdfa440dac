/// Profile endpoints
///
/// - `GET /api/v1/user/profile` - Profile, preferences, workspace and linked accounts
/// - `PATCH /api/v1/user/profile` - Partial update of name and scheduling preferences

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ClientInfo, ValidatedJson},
    middleware::session::require_session,
};
use axum::{extract::State, Extension, Json};
use calendar_agent_shared::{
    auth::{authorization::authorize_resource_access, middleware::SessionContext},
    models::{
        audit_log::{ACTION_PROFILE_UPDATED, RESOURCE_USER},
        Account, NewAuditLog, Preferences, ProfileChanges, Workspace,
    },
    validation::UpdateProfileRequest,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub workspace_type: String,
    pub plan: String,
}

impl From<Workspace> for WorkspaceSummary {
    fn from(w: Workspace) -> Self {
        Self {
            id: w.id,
            name: w.name,
            slug: w.slug,
            workspace_type: w.workspace_type,
            plan: w.plan,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccount {
    pub id: Uuid,
    pub provider: String,
    pub account_id: String,
}

impl From<Account> for ConnectedAccount {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            provider: a.provider,
            account_id: a.provider_account_id,
        }
    }
}

/// GET response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user: ProfileUser,
    pub preferences: Preferences,
    pub workspace: Option<WorkspaceSummary>,
    pub connected_accounts: Vec<ConnectedAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// PATCH response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileResponse {
    pub user: UpdatedUser,
    pub preferences: Preferences,
}

/// Returns the signed-in user's profile
///
/// # Errors
///
/// - `401 Unauthorized`: No session
/// - `404 Not Found`: User no longer exists
/// - `500 Internal Server Error`: Database failure
pub async fn get_profile(
    State(state): State<AppState>,
    session: Option<Extension<SessionContext>>,
) -> ApiResult<Json<ProfileResponse>> {
    let session = require_session(session.as_deref())?;

    load_profile(&state, session)
        .await
        .map(Json)
        .map_err(|e| e.or_internal("Failed to fetch profile"))
}

async fn load_profile(state: &AppState, session: &SessionContext) -> ApiResult<ProfileResponse> {
    let user = state
        .repo
        .find_user(session.user_id)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    let workspace = match user.workspace_id {
        Some(id) => state.repo.find_workspace(id).await?.map(WorkspaceSummary::from),
        None => None,
    };

    let connected_accounts = state
        .repo
        .list_accounts(user.id)
        .await?
        .into_iter()
        .map(ConnectedAccount::from)
        .collect();

    Ok(ProfileResponse {
        preferences: user.preferences(),
        user: ProfileUser {
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
            created_at: user.created_at,
            updated_at: user.updated_at,
        },
        workspace,
        connected_accounts,
    })
}

/// Updates the supplied profile fields
///
/// Fields left out of the body keep their stored values. The change is
/// written to the audit log and the cached preferences are refreshed.
///
/// # Errors
///
/// - `400 Bad Request`: Invalid JSON or validation failure
/// - `401 Unauthorized`: No session
/// - `403 Forbidden`: Not the owner of the profile
/// - `404 Not Found`: User no longer exists
/// - `500 Internal Server Error`: Database failure
pub async fn update_profile(
    State(state): State<AppState>,
    session: Option<Extension<SessionContext>>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<Json<UpdateProfileResponse>> {
    let session = require_session(session.as_deref())?;

    apply_update(&state, session, &client, req.into())
        .await
        .map(Json)
        .map_err(|e| e.or_internal("Failed to update profile"))
}

async fn apply_update(
    state: &AppState,
    session: &SessionContext,
    client: &ClientInfo,
    changes: ProfileChanges,
) -> ApiResult<UpdateProfileResponse> {
    let existing = state
        .repo
        .find_user(session.user_id)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    authorize_resource_access(Some(session), Some(&existing))?;

    let updated = state
        .repo
        .update_profile(existing.id, &changes)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    state
        .repo
        .record_audit(NewAuditLog {
            workspace_id: existing.workspace_id,
            user_id: Some(session.user_id),
            action: ACTION_PROFILE_UPDATED.to_string(),
            resource: RESOURCE_USER.to_string(),
            resource_id: Some(session.user_id.to_string()),
            changes: json!({ "updated": changes }),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        })
        .await?;

    let preferences = updated.preferences();
    state
        .cache
        .set_user_preferences(updated.id, &preferences)
        .await;

    tracing::info!(user_id = %updated.id, "Profile updated");

    Ok(UpdateProfileResponse {
        user: UpdatedUser {
            id: updated.id,
            name: updated.name,
            email: updated.email,
            image: updated.image,
            updated_at: updated.updated_at,
        },
        preferences,
    })
}
