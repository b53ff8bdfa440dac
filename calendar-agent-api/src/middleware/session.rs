/// Session gating
///
/// Runs on every request. A valid session is resolved into a
/// [`SessionContext`] request extension; what happens without one depends on
/// the path:
///
/// | path | no session | inactive account |
/// |------|------------|------------------|
/// | `/api/auth/*`, public pages | continue | continue |
/// | `/api/v1/*` | 401 JSON | 401 JSON |
/// | `/dashboard`, `/settings`, `/calendar`, `/profile` | redirect `/signin?callbackUrl=…` | redirect `/signin?error=SessionRequired&message=…` |
///
/// When the session token is due for re-issue, the fresh token is set on the
/// response.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use calendar_agent_shared::auth::{
    events::{log_auth_event, AuthEvent, AuthEventLog},
    middleware::{
        build_cookie, extract_session_token, resolve_session, session_cookie_name, SessionContext,
    },
    oauth::signin_url,
    session::SessionError,
};

/// Prefixes that require a signed-in user
const PROTECTED_PREFIXES: &[&str] = &["/api/v1", "/dashboard", "/settings", "/calendar", "/profile"];

fn is_protected(path: &str) -> bool {
    if path.starts_with("/api/auth") {
        return false;
    }
    PROTECTED_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{}/", prefix)))
}

fn is_api(path: &str) -> bool {
    path.starts_with("/api/")
}

/// Resolves the session and enforces sign-in on protected paths
pub async fn session_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let production = state.config.api.production;

    let resolved = match extract_session_token(req.headers(), production) {
        Some(token) => Some(
            resolve_session(
                state.repo.as_ref(),
                &token,
                &state.config.session.secret,
                state.config.session_max_age(),
            )
            .await,
        ),
        None => None,
    };

    let (context, refreshed_token, failure) = match resolved {
        Some(Ok(resolved)) => (Some(resolved.context), resolved.refreshed_token, None),
        Some(Err(e)) => {
            if matches!(e, SessionError::Expired) {
                log_auth_event(&AuthEventLog::failure(AuthEvent::SessionExpired, e.to_string()));
            }
            (None, None, Some(e))
        }
        None => (None, None, None),
    };

    if context.is_none() && is_protected(&path) {
        let failure = failure.unwrap_or(SessionError::Missing);
        return reject(&state, &req, failure);
    }

    if let Some(context) = context {
        req.extensions_mut().insert(context);
    }

    let mut response = next.run(req).await;

    if let Some(token) = refreshed_token {
        let cookie = build_cookie(
            session_cookie_name(production),
            token,
            state.config.session_max_age().num_seconds(),
            production,
        );
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
            log_auth_event(&AuthEventLog::success(AuthEvent::TokenRefresh));
        }
    }

    response
}

fn reject(state: &AppState, req: &Request, failure: SessionError) -> Response {
    let path = req.uri().path();

    if is_api(path) {
        return ApiError::from(failure).into_response();
    }

    let base_url = &state.config.api.base_url;
    let target = match failure {
        SessionError::Inactive => signin_url(
            base_url,
            &[
                ("error", "SessionRequired"),
                ("message", "Your account is inactive"),
            ],
        ),
        SessionError::Store(e) => {
            tracing::error!(error = %e, "Session lookup failed");
            signin_url(base_url, &[("error", "SessionRequired")])
        }
        _ => {
            let callback = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or(path);
            signin_url(base_url, &[("callbackUrl", callback)])
        }
    };

    Redirect::temporary(&target).into_response()
}

/// The signed-in user, for handlers on gated routes
pub fn require_session(context: Option<&SessionContext>) -> Result<&SessionContext, ApiError> {
    context.ok_or_else(|| ApiError::from(SessionError::Missing))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_paths() {
        assert!(is_protected("/api/v1/user/profile"));
        assert!(is_protected("/dashboard"));
        assert!(is_protected("/settings/notifications"));
        assert!(is_protected("/profile"));

        assert!(!is_protected("/"));
        assert!(!is_protected("/signin"));
        assert!(!is_protected("/api/health"));
        assert!(!is_protected("/api/auth/session"));
        assert!(!is_protected("/calendars-marketing"));
    }

    #[test]
    fn test_require_session_message() {
        let err = require_session(None).unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized - No session found");
    }
}
