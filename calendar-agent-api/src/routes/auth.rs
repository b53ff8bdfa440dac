/// Authentication endpoints
///
/// - `GET /api/auth/signin/google` - Start the OAuth flow
/// - `GET /api/auth/callback/google` - Finish it and create a session
/// - `POST /api/auth/signout` - Revoke the current session
/// - `GET /api/auth/session` - Current session, `{}` when signed out
///
/// Callback failures never surface as JSON: the browser is sent back to
/// `/signin?error=<code>` with one of `OAuthSignin`, `OAuthCallback`,
/// `AccessDenied`, `RateLimited` or `Callback`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use calendar_agent_shared::{
    auth::{
        events::{log_auth_event, AuthEvent, AuthEventLog},
        middleware::{build_cookie, clear_cookie, read_cookie, session_cookie_name, SessionContext},
        oauth::{
            generate_state, resolve_redirect, signin_url, states_match, OAuthError, OAuthProfile,
            OAUTH_CALLBACK_COOKIE, OAUTH_STATE_COOKIE, OAUTH_STATE_MAX_AGE_SECS,
        },
        session::{create_session_token, SessionClaims},
    },
    infra::monitoring::Level,
    models::{CreateUser, LinkAccount, User},
    repository::RepositoryError,
    workspace::create_personal_workspace,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Where the browser lands when no callback URL was given
const DEFAULT_CALLBACK: &str = "/dashboard";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInParams {
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub workspace_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
}

fn redirect_uri(state: &AppState) -> String {
    format!(
        "{}/api/auth/callback/{}",
        state.config.api.base_url,
        state.oauth.id()
    )
}

fn with_cookies(response: Response, cookies: Vec<Cookie<'static>>) -> Response {
    let jar = cookies
        .into_iter()
        .fold(CookieJar::new(), |jar, cookie| jar.add(cookie));
    (jar, response).into_response()
}

fn clear_oauth_cookies(production: bool) -> Vec<Cookie<'static>> {
    vec![
        clear_cookie(OAUTH_STATE_COOKIE, production),
        clear_cookie(OAUTH_CALLBACK_COOKIE, production),
    ]
}

/// Starts the OAuth flow
///
/// Stores a CSRF state and the post-sign-in destination in short-lived
/// cookies, then redirects to the provider's consent page.
pub async fn signin(
    State(state): State<AppState>,
    Query(params): Query<SignInParams>,
) -> ApiResult<Response> {
    let oauth_state = generate_state();

    let url = state
        .oauth
        .authorization_url(&oauth_state, &redirect_uri(&state))
        .map_err(|e| {
            tracing::error!(error = %e, "OAuth provider unavailable");
            ApiError::ServiceUnavailable("Sign-in is not available".to_string())
        })?;

    let callback = params
        .callback_url
        .unwrap_or_else(|| DEFAULT_CALLBACK.to_string());

    let production = state.config.api.production;
    let cookies = vec![
        build_cookie(OAUTH_STATE_COOKIE, oauth_state, OAUTH_STATE_MAX_AGE_SECS, production),
        build_cookie(
            OAUTH_CALLBACK_COOKIE,
            hex::encode(callback.as_bytes()),
            OAUTH_STATE_MAX_AGE_SECS,
            production,
        ),
    ];

    Ok(with_cookies(Redirect::temporary(&url).into_response(), cookies))
}

/// Why a callback did not produce a session
#[derive(Debug)]
enum CallbackFailure {
    /// Provider reported an error or the state did not match
    OAuth(String),
    /// Code exchange or profile fetch failed
    Exchange(OAuthError),
    RateLimited { email: String, reset: Option<DateTime<Utc>> },
    NoEmail,
    Inactive(User),
    Internal(String),
}

impl CallbackFailure {
    fn error_code(&self) -> &'static str {
        match self {
            CallbackFailure::OAuth(_) | CallbackFailure::Exchange(_) => "OAuthCallback",
            CallbackFailure::RateLimited { .. } => "RateLimited",
            CallbackFailure::NoEmail | CallbackFailure::Inactive(_) => "AccessDenied",
            CallbackFailure::Internal(_) => "Callback",
        }
    }

    fn log(&self, provider: &str) {
        let entry = match self {
            CallbackFailure::OAuth(reason) => {
                AuthEventLog::failure(AuthEvent::OauthError, reason.clone()).provider(provider)
            }
            CallbackFailure::Exchange(e) => {
                AuthEventLog::failure(AuthEvent::OauthError, e.to_string()).provider(provider)
            }
            CallbackFailure::RateLimited { email, reset } => AuthEventLog::failure(
                AuthEvent::RateLimitExceeded,
                format!(
                    "Rate limit exceeded. Try again after {}",
                    reset.map(|r| r.to_rfc3339()).unwrap_or_default()
                ),
            )
            .email(email.clone()),
            CallbackFailure::NoEmail => {
                AuthEventLog::failure(AuthEvent::SigninFailure, "No email provided")
                    .provider(provider)
            }
            CallbackFailure::Inactive(user) => {
                AuthEventLog::failure(AuthEvent::SigninFailure, "User account is inactive")
                    .user(user.id)
                    .email(user.email.clone())
                    .provider(provider)
            }
            CallbackFailure::Internal(e) => {
                AuthEventLog::failure(AuthEvent::SigninFailure, e.clone()).provider(provider)
            }
        };
        log_auth_event(&entry);
    }
}

impl From<RepositoryError> for CallbackFailure {
    fn from(err: RepositoryError) -> Self {
        CallbackFailure::Internal(err.to_string())
    }
}

struct SignedIn {
    user: User,
    token: String,
    is_new_user: bool,
}

/// Finishes the OAuth flow
///
/// State check, code exchange, sign-in rate limit on the email, user and
/// workspace provisioning, account link, then a new session.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    let production = state.config.api.production;
    let provider = state.oauth.id();
    let base_url = state.config.api.base_url.clone();
    let mut cookies = clear_oauth_cookies(production);

    match complete_sign_in(&state, &params, &headers).await {
        Ok(signed_in) => {
            log_auth_event(
                &AuthEventLog::success(AuthEvent::SessionCreated)
                    .user(signed_in.user.id)
                    .provider(provider),
            );
            log_auth_event(
                &AuthEventLog::success(AuthEvent::SigninSuccess)
                    .user(signed_in.user.id)
                    .email(signed_in.user.email.clone())
                    .provider(provider)
                    .metadata(json!({ "isNewUser": signed_in.is_new_user })),
            );

            cookies.push(build_cookie(
                session_cookie_name(production),
                signed_in.token.clone(),
                state.config.session_max_age().num_seconds(),
                production,
            ));

            let destination = read_cookie(&headers, OAUTH_CALLBACK_COOKIE)
                .and_then(|v| hex::decode(v).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .unwrap_or_else(|| DEFAULT_CALLBACK.to_string());

            let target = resolve_redirect(&destination, &base_url);
            with_cookies(Redirect::temporary(&target).into_response(), cookies)
        }
        Err(failure) => {
            failure.log(provider);
            if let CallbackFailure::Internal(ref e) = failure {
                state.tracker.capture_message(
                    e,
                    Level::Error,
                    Some(json!({ "route": "oauth_callback", "provider": provider })),
                );
            }

            let target = signin_url(&base_url, &[("error", failure.error_code())]);
            with_cookies(Redirect::temporary(&target).into_response(), cookies)
        }
    }
}

async fn complete_sign_in(
    state: &AppState,
    params: &CallbackParams,
    headers: &HeaderMap,
) -> Result<SignedIn, CallbackFailure> {
    if let Some(ref error) = params.error {
        return Err(CallbackFailure::OAuth(format!("Provider returned {}", error)));
    }

    let expected = read_cookie(headers, OAUTH_STATE_COOKIE).unwrap_or_default();
    let actual = params.state.as_deref().unwrap_or_default();
    if !states_match(&expected, actual) {
        return Err(CallbackFailure::OAuth(OAuthError::InvalidState.to_string()));
    }

    let code = params
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CallbackFailure::OAuth("Missing authorization code".to_string()))?;

    let profile = state
        .oauth
        .exchange_code(code, &redirect_uri(state))
        .await
        .map_err(CallbackFailure::Exchange)?;

    log_auth_event(
        &AuthEventLog::success(AuthEvent::OauthCallback)
            .provider(profile.provider.clone())
            .metadata(json!({ "providerAccountId": profile.provider_account_id })),
    );

    let identifier = profile.email.clone().unwrap_or_else(|| "unknown".to_string());
    let decision = state.sign_in_limiter.check(&identifier).await;
    if !decision.allowed {
        return Err(CallbackFailure::RateLimited {
            email: identifier,
            reset: decision.reset_time,
        });
    }

    let email = profile
        .email
        .clone()
        .filter(|e| !e.trim().is_empty())
        .ok_or(CallbackFailure::NoEmail)?;

    let (user, is_new_user) = provision_user(state, &email, &profile).await?;

    state
        .repo
        .link_account(LinkAccount {
            user_id: user.id,
            provider: profile.provider.clone(),
            provider_account_id: profile.provider_account_id.clone(),
            access_token: profile.tokens.access_token.clone(),
            refresh_token: profile.tokens.refresh_token.clone(),
            expires_at: profile.tokens.expires_at,
            scope: profile.tokens.scope.clone(),
            token_type: profile.tokens.token_type.clone(),
            id_token: profile.tokens.id_token.clone(),
        })
        .await?;

    let max_age = state.config.session_max_age();
    let session = state
        .repo
        .create_session(user.id, Utc::now() + max_age)
        .await?;

    let claims = SessionClaims::new(
        user.id,
        session.id,
        user.email.clone(),
        user.name.clone(),
        user.role(),
        max_age,
    );
    let token = create_session_token(&claims, &state.config.session.secret)
        .map_err(|e| CallbackFailure::Internal(e.to_string()))?;

    Ok(SignedIn {
        user,
        token,
        is_new_user,
    })
}

/// Finds or creates the user, making sure they have a workspace
async fn provision_user(
    state: &AppState,
    email: &str,
    profile: &OAuthProfile,
) -> Result<(User, bool), CallbackFailure> {
    let (user, is_new_user) = match state.repo.find_user_by_email(email).await? {
        Some(user) if !user.is_active => return Err(CallbackFailure::Inactive(user)),
        Some(user) => (user, false),
        None => {
            let user = state
                .repo
                .create_user(CreateUser {
                    email: email.to_lowercase(),
                    name: profile.name.clone(),
                    image: profile.image.clone(),
                })
                .await?;
            tracing::info!(user_id = %user.id, "Created user on first sign-in");
            (user, true)
        }
    };

    if user.workspace_id.is_some() {
        return Ok((user, is_new_user));
    }

    let workspace = create_personal_workspace(state.repo.as_ref(), &user).await?;
    let mut user = user;
    user.workspace_id = Some(workspace.id);
    Ok((user, is_new_user))
}

/// Revokes the current session and clears the cookie
pub async fn signout(
    State(state): State<AppState>,
    session: Option<Extension<SessionContext>>,
) -> ApiResult<Response> {
    if let Some(Extension(session)) = session {
        state.repo.delete_session(session.session_id).await?;
        log_auth_event(
            &AuthEventLog::success(AuthEvent::Signout)
                .user(session.user_id)
                .email(session.email.clone()),
        );
    }

    let production = state.config.api.production;
    let cookie = clear_cookie(session_cookie_name(production), production);

    Ok((
        CookieJar::new().add(cookie),
        Json(json!({ "url": format!("{}/", state.config.api.base_url) })),
    )
        .into_response())
}

/// Returns the current session, or `{}` when signed out
pub async fn session(session: Option<Extension<SessionContext>>) -> Json<serde_json::Value> {
    let Some(Extension(session)) = session else {
        return Json(json!({}));
    };

    let body = SessionResponse {
        user: SessionUser {
            id: session.user_id,
            name: session.name,
            email: session.email,
            image: session.image,
            role: session.role.as_str().to_string(),
            is_active: session.is_active,
            workspace_id: session.workspace_id,
        },
        expires: session.expires_at,
    };

    Json(serde_json::to_value(body).unwrap_or_else(|_| json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn test_failure_codes() {
        assert_eq!(CallbackFailure::NoEmail.error_code(), "AccessDenied");
        assert_eq!(
            CallbackFailure::RateLimited {
                email: "ada@example.com".to_string(),
                reset: None
            }
            .error_code(),
            "RateLimited"
        );
        assert_eq!(
            CallbackFailure::OAuth("Invalid OAuth state".to_string()).error_code(),
            "OAuthCallback"
        );
        assert_eq!(
            CallbackFailure::Internal("db down".to_string()).error_code(),
            "Callback"
        );
    }

    #[test]
    fn test_with_cookies_appends() {
        let response = with_cookies(
            Redirect::temporary("/").into_response(),
            clear_oauth_cookies(false),
        );
        let cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }
}
