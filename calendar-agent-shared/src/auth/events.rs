//! Authentication event log
//!
//! Sign-in, sign-out and session lifecycle events all go through
//! [`log_auth_event`], so they share one target and field layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Log target for authentication events
pub const AUTH_EVENT_TARGET: &str = "auth_event";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SigninSuccess,
    SigninFailure,
    Signout,
    SessionCreated,
    SessionUpdated,
    SessionExpired,
    TokenRefresh,
    RateLimitExceeded,
    OauthCallback,
    OauthError,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::SigninSuccess => "SIGNIN_SUCCESS",
            AuthEvent::SigninFailure => "SIGNIN_FAILURE",
            AuthEvent::Signout => "SIGNOUT",
            AuthEvent::SessionCreated => "SESSION_CREATED",
            AuthEvent::SessionUpdated => "SESSION_UPDATED",
            AuthEvent::SessionExpired => "SESSION_EXPIRED",
            AuthEvent::TokenRefresh => "TOKEN_REFRESH",
            AuthEvent::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AuthEvent::OauthCallback => "OAUTH_CALLBACK",
            AuthEvent::OauthError => "OAUTH_ERROR",
        }
    }
}

/// One authentication event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEventLog {
    pub event: AuthEvent,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub provider: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl AuthEventLog {
    /// A successful event
    pub fn success(event: AuthEvent) -> Self {
        Self::new(event, true)
    }

    /// A failed event with its reason
    pub fn failure(event: AuthEvent, error: impl Into<String>) -> Self {
        let mut log = Self::new(event, false);
        log.error = Some(error.into());
        log
    }

    fn new(event: AuthEvent, success: bool) -> Self {
        Self {
            event,
            user_id: None,
            email: None,
            provider: None,
            timestamp: Utc::now(),
            success,
            error: None,
            metadata: None,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Writes an event: `info` on success, `error` on failure
pub fn log_auth_event(log: &AuthEventLog) {
    let user_id = log.user_id.map(|id| id.to_string());
    let metadata = log.metadata.as_ref().map(|m| m.to_string());

    if log.success {
        tracing::info!(
            target: AUTH_EVENT_TARGET,
            event = log.event.as_str(),
            user_id = user_id.as_deref(),
            email = log.email.as_deref(),
            provider = log.provider.as_deref(),
            metadata = metadata.as_deref(),
            timestamp = %log.timestamp.to_rfc3339(),
            "[AUTH EVENT]"
        );
    } else {
        tracing::error!(
            target: AUTH_EVENT_TARGET,
            event = log.event.as_str(),
            user_id = user_id.as_deref(),
            email = log.email.as_deref(),
            provider = log.provider.as_deref(),
            error = log.error.as_deref(),
            timestamp = %log.timestamp.to_rfc3339(),
            "[AUTH EVENT]"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let id = Uuid::new_v4();
        let log = AuthEventLog::success(AuthEvent::SigninSuccess)
            .user(id)
            .email("ada@example.com")
            .provider("google")
            .metadata(serde_json::json!({ "isNewUser": true }));

        assert!(log.success);
        assert_eq!(log.user_id, Some(id));
        assert_eq!(log.provider.as_deref(), Some("google"));

        let failed = AuthEventLog::failure(AuthEvent::SigninFailure, "No email provided");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("No email provided"));

        log_auth_event(&log);
        log_auth_event(&failed);
    }

    #[test]
    fn test_event_names_serialize_screaming() {
        let json = serde_json::to_string(&AuthEvent::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_EXCEEDED\"");
        assert_eq!(AuthEvent::OauthCallback.as_str(), "OAUTH_CALLBACK");
    }
}
