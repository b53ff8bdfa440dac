/// Request extractors
///
/// - [`ValidatedJson`]: JSON body parsed and run through its validation rules
/// - [`ClientInfo`]: caller IP and user agent for audit entries and rate limits

use crate::error::ApiError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
};
use calendar_agent_shared::validation::{ValidateRequest, ValidationIssue};
use serde::de::DeserializeOwned;
use std::convert::Infallible;

/// JSON body that has passed [`ValidateRequest::validated`]
///
/// Bodies that are not JSON at all are rejected with `INVALID_JSON`; JSON of
/// the wrong shape and rule failures are `VALIDATION_ERROR`.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<T> ValidatedJson<T>
where
    T: DeserializeOwned + ValidateRequest,
{
    pub fn parse(bytes: &[u8]) -> Result<Self, ApiError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|_| ApiError::InvalidJson)?;

        let request: T = serde_json::from_value(value).map_err(|e| {
            ApiError::Validation(vec![ValidationIssue {
                field: "body".to_string(),
                message: e.to_string(),
            }])
        })?;

        request.validated().map(ValidatedJson).map_err(ApiError::Validation)
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + ValidateRequest,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| ApiError::InvalidJson)?;

        Self::parse(&bytes)
    }
}

/// Caller identity as far as headers tell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: client_ip(headers),
            user_agent: header_str(headers, "user-agent").map(str::to_string),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// First `x-forwarded-for` hop, then `x-real-ip`, then `cf-connecting-ip`
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    header_str(headers, "x-real-ip")
        .or_else(|| header_str(headers, "cf-connecting-ip"))
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use calendar_agent_shared::validation::{DeleteAccountRequest, UpdateProfileRequest};

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_ip(&headers), "198.51.100.7");

        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_ip(&headers), "203.0.113.9");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.0.2.1, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "192.0.2.1");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let result = ValidatedJson::<UpdateProfileRequest>::parse(b"name=Ada");
        assert!(matches!(result, Err(ApiError::InvalidJson)));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let result = ValidatedJson::<UpdateProfileRequest>::parse(br#"{"workHoursStart":"nine"}"#);
        assert!(matches!(result, Err(ApiError::Validation(_))));

        let result = ValidatedJson::<UpdateProfileRequest>::parse(br#"{"nickname":"Ada"}"#);
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_parse_normalizes() {
        let ValidatedJson(req) = ValidatedJson::<DeleteAccountRequest>::parse(
            br#"{"confirmationToken":"abc","email":"  Ada@Example.com "}"#,
        )
        .unwrap();
        assert_eq!(req.email, "ada@example.com");
    }
}
