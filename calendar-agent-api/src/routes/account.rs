/// Account deletion endpoints
///
/// Deletion is a two-step flow:
///
/// 1. `POST /api/v1/user/delete/request` issues a signed confirmation token
///    valid for one hour and emails it (returned inline outside production).
/// 2. `DELETE /api/v1/user/delete` with `{confirmationToken, email}` soft
///    deletes the account and revokes every session.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ClientInfo, ValidatedJson},
    middleware::session::require_session,
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use calendar_agent_shared::{
    auth::{
        authorization::authorize_resource_access,
        confirmation,
        middleware::{clear_cookie, session_cookie_name, SessionContext},
    },
    models::{
        audit_log::{ACTION_ACCOUNT_DELETED, RESOURCE_USER},
        NewAuditLog,
    },
    validation::DeleteAccountRequest,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Email template used for the confirmation message
pub const DELETION_EMAIL_TEMPLATE: &str = "account-deletion";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub message: String,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRequestResponse {
    pub message: String,

    /// Only outside production, where no email is sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub development_token: Option<String>,
}

/// Deletes the signed-in user's account
///
/// # Errors
///
/// - `400 Bad Request`: Invalid body, `EMAIL_MISMATCH` or `INVALID_TOKEN`
/// - `401 Unauthorized`: No session
/// - `403 Forbidden`: Not the owner of the account
/// - `404 Not Found`: User no longer exists
/// - `500 Internal Server Error`: Database failure
pub async fn delete_account(
    State(state): State<AppState>,
    session: Option<Extension<SessionContext>>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<DeleteAccountRequest>,
) -> ApiResult<Response> {
    let session = require_session(session.as_deref())?;

    let deleted = delete(&state, session, &client, req)
        .await
        .map_err(|e| e.or_internal("Failed to delete account"))?;

    let production = state.config.api.production;
    let cookie = clear_cookie(session_cookie_name(production), production);

    Ok((CookieJar::new().add(cookie), Json(deleted)).into_response())
}

async fn delete(
    state: &AppState,
    session: &SessionContext,
    client: &ClientInfo,
    req: DeleteAccountRequest,
) -> ApiResult<DeleteAccountResponse> {
    if req.email != session.email.to_lowercase() {
        tracing::warn!(user_id = %session.user_id, "Account deletion email mismatch");
        return Err(ApiError::EmailMismatch);
    }

    confirmation::verify(
        &state.config.session.secret,
        &req.confirmation_token,
        session.user_id,
        &session.email,
    )?;

    let user = state
        .repo
        .find_user(session.user_id)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    authorize_resource_access(Some(session), Some(&user))?;

    let deleted_at = Utc::now();

    let audit = NewAuditLog {
        workspace_id: user.workspace_id,
        user_id: Some(user.id),
        action: ACTION_ACCOUNT_DELETED.to_string(),
        resource: RESOURCE_USER.to_string(),
        resource_id: Some(user.id.to_string()),
        changes: json!({
            "email": user.email,
            "name": user.name,
            "deletedAt": deleted_at.to_rfc3339(),
        }),
        ip_address: client.ip_address.clone(),
        user_agent: client.user_agent.clone(),
    };

    let revoked = state
        .repo
        .delete_account(user.id, deleted_at, audit)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    state.cache.invalidate_user(user.id).await;

    tracing::info!(
        user_id = %user.id,
        sessions_revoked = revoked,
        "User account deleted"
    );

    Ok(DeleteAccountResponse {
        success: true,
        message: "Account deleted successfully".to_string(),
        deleted_at,
    })
}

/// Issues an account deletion confirmation token
///
/// # Errors
///
/// - `401 Unauthorized`: No session
/// - `503 Service Unavailable`: Email jobs not configured (production)
/// - `500 Internal Server Error`: Job enqueue failure
pub async fn request_deletion(
    State(state): State<AppState>,
    session: Option<Extension<SessionContext>>,
) -> ApiResult<Json<DeletionRequestResponse>> {
    let session = require_session(session.as_deref())?;

    issue(&state, session)
        .await
        .map(Json)
        .map_err(|e| e.or_internal("Failed to request account deletion"))
}

async fn issue(state: &AppState, session: &SessionContext) -> ApiResult<DeletionRequestResponse> {
    let token = confirmation::generate(
        &state.config.session.secret,
        session.user_id,
        &session.email,
    )?;

    if !state.config.api.production {
        tracing::debug!(user_id = %session.user_id, "Issued development deletion token");
        return Ok(DeletionRequestResponse {
            message: "Confirmation email sent".to_string(),
            development_token: Some(token.token),
        });
    }

    state
        .jobs
        .schedule_email(
            session.email.clone(),
            "Confirm your account deletion",
            DELETION_EMAIL_TEMPLATE,
            json!({
                "name": session.name,
                "confirmationToken": token.token,
                "expiresAt": token.expires_at.to_rfc3339(),
            }),
        )
        .await?;

    tracing::info!(user_id = %session.user_id, "Account deletion confirmation queued");

    Ok(DeletionRequestResponse {
        message: "Confirmation email sent. Please check your email to complete account deletion."
            .to_string(),
        development_token: None,
    })
}
