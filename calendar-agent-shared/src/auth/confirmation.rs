//! Account deletion confirmation tokens
//!
//! Format: `{expires}.{nonce}.{mac}` where `expires` is unix seconds, `nonce`
//! is 32 random bytes and `mac` is HMAC-SHA256 over
//! `user_id|email|expires|nonce`, all hex. The email is lowercased before
//! signing. Tokens are bound to one user and one address and live for an hour.
//!
//! # Example
//!
//! ```
//! use calendar_agent_shared::auth::confirmation;
//! use uuid::Uuid;
//!
//! let secret = "an-example-secret-that-is-long-enough";
//! let user_id = Uuid::new_v4();
//!
//! let issued = confirmation::generate(secret, user_id, "Ada@Example.com").unwrap();
//! assert!(confirmation::verify(secret, &issued.token, user_id, "ada@example.com").is_ok());
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime
pub const CONFIRMATION_TTL_SECS: i64 = 3600;

const NONCE_LEN: usize = 32;

/// Confirmation token errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("Invalid or expired confirmation token")]
    Invalid,

    #[error("Failed to sign confirmation token")]
    Signing,
}

/// A freshly issued token
#[derive(Debug, Clone)]
pub struct ConfirmationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues a token for the user and email
pub fn generate(
    secret: &str,
    user_id: Uuid,
    email: &str,
) -> Result<ConfirmationToken, ConfirmationError> {
    generate_at(secret, user_id, email, Utc::now())
}

/// [`generate`] with an explicit clock
pub fn generate_at(
    secret: &str,
    user_id: Uuid,
    email: &str,
    now: DateTime<Utc>,
) -> Result<ConfirmationToken, ConfirmationError> {
    let expires_at = now + Duration::seconds(CONFIRMATION_TTL_SECS);
    let expires = expires_at.timestamp();

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce = hex::encode(nonce);

    let mac = sign(secret, user_id, email, expires, &nonce)?.finalize().into_bytes();

    Ok(ConfirmationToken {
        token: format!("{}.{}.{}", expires, nonce, hex::encode(mac)),
        expires_at: Utc.timestamp_opt(expires, 0).single().unwrap_or(expires_at),
    })
}

/// Checks a token against the user and email
///
/// Empty, malformed, expired and forged tokens are all [`ConfirmationError::Invalid`].
pub fn verify(
    secret: &str,
    token: &str,
    user_id: Uuid,
    email: &str,
) -> Result<(), ConfirmationError> {
    verify_at(secret, token, user_id, email, Utc::now())
}

/// [`verify`] with an explicit clock
pub fn verify_at(
    secret: &str,
    token: &str,
    user_id: Uuid,
    email: &str,
    now: DateTime<Utc>,
) -> Result<(), ConfirmationError> {
    let mut parts = token.trim().split('.');
    let (Some(expires), Some(nonce), Some(mac), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ConfirmationError::Invalid);
    };

    let expires: i64 = expires.parse().map_err(|_| ConfirmationError::Invalid)?;
    if expires <= now.timestamp() {
        return Err(ConfirmationError::Invalid);
    }

    if nonce.len() != NONCE_LEN * 2 {
        return Err(ConfirmationError::Invalid);
    }
    let provided = hex::decode(mac).map_err(|_| ConfirmationError::Invalid)?;

    sign(secret, user_id, email, expires, nonce)?
        .verify_slice(&provided)
        .map_err(|_| ConfirmationError::Invalid)
}

fn sign(
    secret: &str,
    user_id: Uuid,
    email: &str,
    expires: i64,
    nonce: &str,
) -> Result<HmacSha256, ConfirmationError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ConfirmationError::Signing)?;
    mac.update(
        format!(
            "{}|{}|{}|{}",
            user_id,
            email.trim().to_lowercase(),
            expires,
            nonce
        )
        .as_bytes(),
    );
    Ok(mac)
}
