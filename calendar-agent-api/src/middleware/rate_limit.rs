/// Request rate limiting
///
/// Fixed-window limits backed by the shared [`RequestRateLimiter`], keyed by
/// user ID for signed-in callers and by client IP otherwise.
///
/// | route | preset | limit |
/// |-------|--------|-------|
/// | `POST /api/v1/user/delete/request` | `email` | 10 / hour |
/// | other routes, signed in | `authenticated` | 1000 / minute |
/// | other routes, anonymous | `public` | 100 / minute |
///
/// # Headers
///
/// Every limited response carries:
/// - `X-RateLimit-Limit`: Requests allowed per window
/// - `X-RateLimit-Remaining`: Requests left in the window
/// - `X-RateLimit-Reset`: Unix timestamp when the window resets
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// Limiter store failures let the request through.

use crate::{app::AppState, error::ApiError, extract::client_ip};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use calendar_agent_shared::{
    auth::middleware::SessionContext,
    rate_limit::{RateLimitInfo, RateLimitPreset},
};
use chrono::Utc;

/// Preset applied to a request
pub fn preset_for(method: &Method, path: &str, signed_in: bool) -> RateLimitPreset {
    if method == Method::POST && path == "/api/v1/user/delete/request" {
        RateLimitPreset::Email
    } else if signed_in {
        RateLimitPreset::Authenticated
    } else {
        RateLimitPreset::Public
    }
}

/// Rate limiting middleware layer
///
/// Must run inside the session layer so signed-in callers are keyed by user.
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let session = request.extensions().get::<SessionContext>();
    let preset = preset_for(request.method(), request.uri().path(), session.is_some());

    let identifier = match session {
        Some(s) => format!("user:{}", s.user_id),
        None => format!("ip:{}", client_ip(request.headers())),
    };

    let info = state.request_limiter.check(&identifier, preset).await;

    if !info.success {
        tracing::warn!(
            identifier = %identifier,
            preset = preset.as_str(),
            "Rate limit exceeded"
        );

        let mut response = ApiError::RateLimitExceeded {
            retry_after: info.retry_after_secs(Utc::now()),
            message: "Too Many Requests".to_string(),
        }
        .into_response();
        apply_headers(response.headers_mut(), &info);
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &info);
    response
}

/// Sets the `X-RateLimit-*` headers
pub fn apply_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(info.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(info.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(info.reset.timestamp()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_selection() {
        assert_eq!(
            preset_for(&Method::POST, "/api/v1/user/delete/request", true),
            RateLimitPreset::Email
        );
        assert_eq!(
            preset_for(&Method::GET, "/api/v1/user/profile", true),
            RateLimitPreset::Authenticated
        );
        assert_eq!(
            preset_for(&Method::GET, "/api/health", false),
            RateLimitPreset::Public
        );
    }

    #[test]
    fn test_headers() {
        let info = RateLimitInfo {
            success: true,
            limit: 100,
            remaining: 99,
            reset: chrono::DateTime::from_timestamp(1_700_000_060, 0).unwrap(),
        };

        let mut headers = HeaderMap::new();
        apply_headers(&mut headers, &info);

        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "100");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "99");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "1700000060");
    }
}
