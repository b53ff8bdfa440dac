//! OAuth sign-in
//!
//! The sign-in flow is authorization code with a CSRF `state`:
//!
//! 1. `/api/auth/signin/google` stores a random state in the
//!    [`OAUTH_STATE_COOKIE`] and redirects to [`OAuthProvider::authorization_url`].
//! 2. The provider redirects back with `code` and `state`; the callback
//!    compares the state with the cookie ([`states_match`]) and calls
//!    [`OAuthProvider::exchange_code`].
//! 3. The resulting [`OAuthProfile`] is turned into a user, an account link
//!    and a session by the API crate.
//!
//! Providers sit behind a trait so tests can sign users in without network.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

/// Cookie carrying the CSRF state between redirect and callback
pub const OAUTH_STATE_COOKIE: &str = "oauth-state";

/// Cookie carrying the post-sign-in destination (hex encoded)
pub const OAUTH_CALLBACK_COOKIE: &str = "oauth-callback-url";

/// Lifetime of the state and callback cookies
pub const OAUTH_STATE_MAX_AGE_SECS: i64 = 600;

/// Scopes requested from Google: identity plus calendar access
pub const GOOGLE_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events",
];

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// OAuth errors
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("OAuth provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid OAuth state")]
    InvalidState,

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Failed to fetch user profile: {0}")]
    Profile(String),

    #[error("OAuth request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Tokens returned by the provider, stored on the linked account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    pub id_token: Option<String>,
}

/// Identity returned by a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    /// Provider name, e.g. "google"
    pub provider: String,

    /// Subject identifier at the provider
    pub provider_account_id: String,

    /// Some providers omit the email; sign-in is refused without one
    pub email: Option<String>,

    pub name: Option<String>,
    pub image: Option<String>,
    pub tokens: OAuthTokens,
}

/// Identity provider seam
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider name used in routes and account links
    fn id(&self) -> &'static str;

    /// URL the browser is sent to for consent
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String, OAuthError>;

    /// Exchanges an authorization code for a profile
    async fn exchange_code(&self, code: &str, redirect_uri: &str)
        -> Result<OAuthProfile, OAuthError>;
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// Google sign-in with offline calendar access
#[derive(Clone)]
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http: reqwest::Client::new(),
        }
    }

    fn ensure_configured(&self) -> Result<(), OAuthError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(OAuthError::NotConfigured(
                "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET are required".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn id(&self) -> &'static str {
        "google"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String, OAuthError> {
        self.ensure_configured()?;

        let scope = GOOGLE_SCOPES.join(" ");
        let url = Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| OAuthError::NotConfigured(e.to_string()))?;

        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        self.ensure_configured()?;

        let params = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self.http.post(GOOGLE_TOKEN_URL).form(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Exchange(format!("{}: {}", status, body)));
        }
        let tokens: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OAuthError::Profile(response.status().to_string()));
        }
        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))?;

        Ok(OAuthProfile {
            provider: self.id().to_string(),
            provider_account_id: info.sub,
            email: info.email,
            name: info.name,
            image: info.picture,
            tokens: OAuthTokens {
                access_token: Some(tokens.access_token),
                refresh_token: tokens.refresh_token,
                expires_at: tokens
                    .expires_in
                    .map(|secs| Utc::now() + Duration::seconds(secs)),
                scope: tokens.scope,
                token_type: tokens.token_type,
                id_token: tokens.id_token,
            },
        })
    }
}

/// Random CSRF state, 32 bytes hex encoded
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Compares the callback state with the cookie without early exit
pub fn states_match(expected: &str, actual: &str) -> bool {
    if expected.is_empty() || expected.len() != actual.len() {
        return false;
    }
    expected
        .bytes()
        .zip(actual.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Where to send the browser after sign-in
///
/// Relative paths are joined to the base URL and same-origin absolute URLs
/// pass through. Anything else lands on the base URL.
pub fn resolve_redirect(url: &str, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');

    if url.starts_with('/') && !url.starts_with("//") {
        return format!("{}{}", base, url);
    }

    match (Url::parse(url), Url::parse(base)) {
        (Ok(target), Ok(base_parsed)) if target.origin() == base_parsed.origin() => url.to_string(),
        _ => base.to_string(),
    }
}

/// Absolute sign-in page URL with query parameters, e.g. `callbackUrl`
pub fn signin_url(base_url: &str, params: &[(&str, &str)]) -> String {
    let page = format!("{}/signin", base_url.trim_end_matches('/'));
    match Url::parse_with_params(&page, params) {
        Ok(url) if params.is_empty() => url.as_str().trim_end_matches('?').to_string(),
        Ok(url) => url.into(),
        Err(_) => "/signin".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signin_url() {
        assert_eq!(
            signin_url("http://localhost:8080/", &[("callbackUrl", "/dashboard?tab=1")]),
            "http://localhost:8080/signin?callbackUrl=%2Fdashboard%3Ftab%3D1"
        );
        assert_eq!(signin_url("http://localhost:8080", &[]), "http://localhost:8080/signin");
    }

    #[test]
    fn test_google_authorization_url() {
        let provider = GoogleProvider::new("client-123", "secret");
        let url = provider
            .authorization_url("abc", "http://localhost:3000/api/auth/callback/google")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["state"], "abc");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert!(params["scope"].contains("https://www.googleapis.com/auth/calendar.events"));
    }

    #[test]
    fn test_unconfigured_provider() {
        let provider = GoogleProvider::new("", "");
        assert!(matches!(
            provider.authorization_url("s", "http://localhost/cb"),
            Err(OAuthError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_state_generation_and_match() {
        let a = generate_state();
        let b = generate_state();

        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(states_match(&a, &a.clone()));
        assert!(!states_match(&a, &b));
        assert!(!states_match("", ""));
    }

    #[test]
    fn test_resolve_redirect() {
        let base = "https://app.example.com";

        assert_eq!(resolve_redirect("/dashboard", base), "https://app.example.com/dashboard");
        assert_eq!(
            resolve_redirect("https://app.example.com/settings", base),
            "https://app.example.com/settings"
        );
        assert_eq!(resolve_redirect("https://evil.example.net/", base), base);
        assert_eq!(resolve_redirect("//evil.example.net", base), base);
        assert_eq!(resolve_redirect("not a url", base), base);
    }
}
