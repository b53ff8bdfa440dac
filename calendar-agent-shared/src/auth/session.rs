//! Session tokens
//!
//! A signed-in browser holds an HS256 JWT in the session cookie. The token
//! names a server-side session row (`sid`), so it can be revoked before it
//! expires; see [`super::middleware::resolve_session`].
//!
//! # Lifetimes
//!
//! - Tokens live for 30 days ([`SESSION_MAX_AGE_DAYS`]).
//! - Tokens issued more than 24 hours ago are re-issued on use
//!   ([`SessionClaims::needs_refresh`]).
//!
//! # Example
//!
//! ```
//! use calendar_agent_shared::auth::session::{
//!     create_session_token, validate_session_token, SessionClaims,
//! };
//! use calendar_agent_shared::models::UserRole;
//! use chrono::Duration;
//! use uuid::Uuid;
//!
//! let secret = "an-example-secret-that-is-long-enough";
//! let claims = SessionClaims::new(
//!     Uuid::new_v4(),
//!     Uuid::new_v4(),
//!     "ada@example.com".to_string(),
//!     Some("Ada".to_string()),
//!     UserRole::User,
//!     Duration::days(30),
//! );
//!
//! let token = create_session_token(&claims, secret).unwrap();
//! let decoded = validate_session_token(&token, secret).unwrap();
//! assert_eq!(decoded.sub, claims.sub);
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserRole;

/// Issuer written into and required from every session token
pub const SESSION_ISSUER: &str = "calendar-agent";

/// Default session lifetime
pub const SESSION_MAX_AGE_DAYS: i64 = 30;

/// Tokens older than this are re-issued on use
pub const SESSION_UPDATE_AGE_HOURS: i64 = 24;

/// Session errors
///
/// The display strings are what follows "Unauthorized - " in 401 responses.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No session found")]
    Missing,

    #[error("Failed to create session token: {0}")]
    CreateError(String),

    #[error("Session token is invalid: {0}")]
    Invalid(String),

    #[error("Session has expired")]
    Expired,

    #[error("Session has been revoked")]
    Revoked,

    #[error("User account no longer exists")]
    UserNotFound,

    #[error("User account is inactive")]
    Inactive,

    #[error("Session store error: {0}")]
    Store(String),
}

/// Claims carried in the session cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User ID
    pub sub: Uuid,

    /// Session row ID
    pub sid: Uuid,

    pub email: String,

    pub name: Option<String>,

    pub role: UserRole,

    pub iss: String,

    /// Issued at (unix seconds)
    pub iat: i64,

    /// Not before (unix seconds)
    pub nbf: i64,

    /// Expiration (unix seconds)
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(
        user_id: Uuid,
        session_id: Uuid,
        email: String,
        name: Option<String>,
        role: UserRole,
        max_age: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            sid: session_id,
            email,
            name,
            role,
            iss: SESSION_ISSUER.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + max_age).timestamp(),
        }
    }

    /// Same session, fresh issue time and expiry
    pub fn refreshed(&self, max_age: Duration) -> Self {
        let now = Utc::now();

        Self {
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + max_age).timestamp(),
            ..self.clone()
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Whether the token is old enough to be re-issued
    pub fn needs_refresh(&self, update_age: Duration) -> bool {
        Utc::now().timestamp() - self.iat >= update_age.num_seconds()
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Signs session claims with HS256
pub fn create_session_token(claims: &SessionClaims, secret: &str) -> Result<String, SessionError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key).map_err(|e| SessionError::CreateError(e.to_string()))
}

/// Verifies signature, issuer, expiry and not-before
pub fn validate_session_token(token: &str, secret: &str) -> Result<SessionClaims, SessionError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[SESSION_ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                SessionError::Invalid("unexpected issuer".to_string())
            }
            _ => SessionError::Invalid(e.to_string()),
        }
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn claims(max_age: Duration) -> SessionClaims {
        SessionClaims::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "ada@example.com".to_string(),
            None,
            UserRole::Admin,
            max_age,
        )
    }

    #[test]
    fn test_create_and_validate() {
        let claims = claims(Duration::days(SESSION_MAX_AGE_DAYS));
        let token = create_session_token(&claims, SECRET).unwrap();

        let decoded = validate_session_token(&token, SECRET).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.iss, "calendar-agent");
        assert_eq!(decoded.role, UserRole::Admin);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_session_token(&claims(Duration::hours(1)), SECRET).unwrap();
        let result = validate_session_token(&token, "another-secret-of-sufficient-length!");
        assert!(matches!(result, Err(SessionError::Invalid(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired = claims(Duration::seconds(-3600));
        assert!(expired.is_expired());

        let token = create_session_token(&expired, SECRET).unwrap();
        assert!(matches!(
            validate_session_token(&token, SECRET),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn test_refresh_window() {
        let mut c = claims(Duration::days(30));
        assert!(!c.needs_refresh(Duration::hours(SESSION_UPDATE_AGE_HOURS)));

        c.iat -= 25 * 3600;
        assert!(c.needs_refresh(Duration::hours(SESSION_UPDATE_AGE_HOURS)));

        let fresh = c.refreshed(Duration::days(30));
        assert_eq!(fresh.sid, c.sid);
        assert!(!fresh.needs_refresh(Duration::hours(SESSION_UPDATE_AGE_HOURS)));
        assert!(fresh.exp >= c.exp);
    }

    #[test]
    fn test_unauthorized_messages() {
        assert_eq!(SessionError::Missing.to_string(), "No session found");
        assert_eq!(SessionError::Inactive.to_string(), "User account is inactive");
    }
}
