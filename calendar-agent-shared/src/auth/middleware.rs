//! Request session resolution
//!
//! Turns the session cookie (or a `Bearer` token) into a [`SessionContext`]
//! that handlers receive through request extensions. The HTTP layer decides
//! what a failure means: JSON 401 for API routes, a redirect for pages.

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::{
    create_session_token, validate_session_token, SessionError, SESSION_UPDATE_AGE_HOURS,
};
use crate::models::UserRole;
use crate::repository::Repository;

/// Cookie name outside production
pub const SESSION_COOKIE: &str = "session-token";

/// Cookie name in production (requires HTTPS)
pub const SECURE_SESSION_COOKIE: &str = "__Secure-session-token";

/// Authenticated user attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub workspace_id: Option<Uuid>,
    pub expires_at: DateTime<chrono::Utc>,
}

impl SessionContext {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub context: SessionContext,

    /// Set when the token was old enough to be re-issued
    pub refreshed_token: Option<String>,
}

/// Name of the session cookie for the environment
pub fn session_cookie_name(production: bool) -> &'static str {
    if production {
        SECURE_SESSION_COOKIE
    } else {
        SESSION_COOKIE
    }
}

/// Reads a cookie value from the request headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(name)
        .map(|cookie| cookie.value().to_string())
}

/// Builds an `HttpOnly; SameSite=Lax; Path=/` cookie
pub fn build_cookie(
    name: impl Into<String>,
    value: impl Into<String>,
    max_age_secs: i64,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.into(), value.into()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .secure(secure)
        .build()
}

/// Builds a cookie that removes `name` from the browser
pub fn clear_cookie(name: impl Into<String>, secure: bool) -> Cookie<'static> {
    let mut cookie = build_cookie(name, "", 0, secure);
    cookie.make_removal();
    cookie
}

/// Extracts the session token: cookie first, then `Authorization: Bearer`
pub fn extract_session_token(headers: &HeaderMap, production: bool) -> Option<String> {
    if let Some(token) = read_cookie(headers, session_cookie_name(production)) {
        if !token.is_empty() {
            return Some(token);
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolves a session token against the session store
///
/// The token must verify, its session row must exist and be unexpired, and
/// the user must exist and be active. Role and profile fields come from the
/// stored user, not the token.
pub async fn resolve_session(
    repo: &dyn Repository,
    token: &str,
    secret: &str,
    max_age: Duration,
) -> Result<ResolvedSession, SessionError> {
    let claims = validate_session_token(token, secret)?;

    let session = repo
        .find_session(claims.sid)
        .await
        .map_err(|e| SessionError::Store(e.to_string()))?
        .ok_or(SessionError::Revoked)?;

    if session.user_id != claims.sub {
        return Err(SessionError::Invalid("session does not match user".to_string()));
    }

    let user = repo
        .find_user(claims.sub)
        .await
        .map_err(|e| SessionError::Store(e.to_string()))?
        .ok_or(SessionError::UserNotFound)?;

    if !user.is_active {
        return Err(SessionError::Inactive);
    }

    let mut expires_at = claims.expires_at();
    let mut refreshed_token = None;

    if claims.needs_refresh(Duration::hours(SESSION_UPDATE_AGE_HOURS)) {
        let fresh = claims.refreshed(max_age);
        match create_session_token(&fresh, secret) {
            Ok(token) => {
                // The row must outlive the new token or it stops resolving early
                let extended = repo
                    .extend_session(session.id, fresh.expires_at())
                    .await
                    .map_err(|e| SessionError::Store(e.to_string()))?;
                if !extended {
                    return Err(SessionError::Revoked);
                }

                tracing::debug!(user_id = %user.id, "Re-issued session token");
                expires_at = fresh.expires_at();
                refreshed_token = Some(token);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to re-issue session token"),
        }
    }

    let role = user.role();
    Ok(ResolvedSession {
        context: SessionContext {
            user_id: user.id,
            session_id: session.id,
            email: user.email,
            name: user.name,
            image: user.image,
            role,
            is_active: user.is_active,
            workspace_id: user.workspace_id,
            expires_at,
        },
        refreshed_token,
    })
}
