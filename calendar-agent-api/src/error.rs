/// Error handling for the API server
///
/// Handlers return `ApiResult<T>`; every failure converts to a JSON body of
/// the form:
///
/// ```json
/// { "error": "User not found", "code": "USER_NOT_FOUND" }
/// ```
///
/// with optional `message` and `details` fields for validation failures.
/// Internal errors are logged with their cause and answered with a generic
/// message; the cause is attached to the response as an [`InternalErrorReport`]
/// extension so the error-tracking layer can forward it.
///
/// # Example
///
/// ```no_run
/// use calendar_agent_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler() -> ApiResult<Json<serde_json::Value>> {
///     Err(ApiError::UserNotFound)
/// }
/// ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use calendar_agent_shared::{
    auth::{
        authorization::AuthorizationError, confirmation::ConfirmationError, session::SessionError,
    },
    infra::JobQueueError,
    repository::RepositoryError,
    validation::ValidationIssue,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Generic message for 500 responses without a route-specific one
const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// 401, message is the full "Unauthorized - ..." text
    Unauthorized(String),

    /// 403 / 401 from an authorization check
    Authorization(AuthorizationError),

    /// 403 without a more specific code
    Forbidden(String),

    /// 404
    UserNotFound,

    /// 400, body was not JSON
    InvalidJson,

    /// 400, body failed its schema
    Validation(Vec<ValidationIssue>),

    /// 400, confirmation email differs from the session email
    EmailMismatch,

    /// 400, confirmation token rejected
    InvalidToken(String),

    /// 429
    RateLimitExceeded { retry_after: u64, message: String },

    /// 500; `message` is returned, `cause` is only logged
    Internal { message: String, cause: String },

    /// 503
    ServiceUnavailable(String),
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error
    pub error: String,

    /// Machine-readable code, e.g. `VALIDATION_ERROR`
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationIssue>>,
}

/// Cause of a 500 response, read by the error-tracking layer
#[derive(Debug, Clone)]
pub struct InternalErrorReport(pub String);

impl ApiError {
    /// Internal error with the generic public message
    pub fn internal(cause: impl fmt::Display) -> Self {
        ApiError::Internal {
            message: INTERNAL_MESSAGE.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Replaces the public message of an internal error; other variants pass through
    pub fn or_internal(self, message: &str) -> Self {
        match self {
            ApiError::Internal { cause, .. } => ApiError::Internal {
                message: message.to_string(),
                cause,
            },
            other => other,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Authorization(err) => err.code(),
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::UserNotFound => "USER_NOT_FOUND",
            ApiError::InvalidJson => "INVALID_JSON",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::EmailMismatch => "EMAIL_MISMATCH",
            ApiError::InvalidToken(_) => "INVALID_TOKEN",
            ApiError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(err) => err.status(),
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::UserNotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidJson
            | ApiError::Validation(_)
            | ApiError::EmailMismatch
            | ApiError::InvalidToken(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "{}", msg),
            ApiError::Authorization(err) => write!(f, "{}", err),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::UserNotFound => write!(f, "User not found"),
            ApiError::InvalidJson => write!(f, "Invalid JSON"),
            ApiError::Validation(issues) => {
                write!(f, "Validation failed: {} errors", issues.len())
            }
            ApiError::EmailMismatch => write!(f, "Email does not match authenticated user"),
            ApiError::InvalidToken(msg) => write!(f, "{}", msg),
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
            ApiError::Internal { message, cause } => write!(f, "{}: {}", message, cause),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();

        let mut report = None;
        let mut retry_after_secs = None;

        let (error, message, details) = match self {
            ApiError::Unauthorized(msg) => (msg, None, None),
            ApiError::Authorization(err) => (err.to_string(), None, None),
            ApiError::Forbidden(msg) => (msg, None, None),
            ApiError::UserNotFound => ("User not found".to_string(), None, None),
            ApiError::InvalidJson => (
                "Invalid JSON".to_string(),
                Some("Request body must be valid JSON".to_string()),
                None,
            ),
            ApiError::Validation(issues) => {
                let first = issues
                    .first()
                    .map(|i| i.message.clone())
                    .unwrap_or_else(|| "Invalid input".to_string());
                ("Validation failed".to_string(), Some(first), Some(issues))
            }
            ApiError::EmailMismatch => (
                "Email does not match authenticated user".to_string(),
                None,
                None,
            ),
            ApiError::InvalidToken(msg) => (msg, None, None),
            ApiError::RateLimitExceeded {
                retry_after,
                message,
            } => {
                retry_after_secs = Some(retry_after);
                (message, None, None)
            }
            ApiError::Internal { message, cause } => {
                // Log internal errors but don't expose details to clients
                tracing::error!(error = %cause, "Internal error: {}", message);
                report = Some(InternalErrorReport(format!("{}: {}", message, cause)));
                (message, None, None)
            }
            ApiError::ServiceUnavailable(msg) => (msg, None, None),
        };

        let body = Json(ErrorResponse {
            error,
            code,
            message,
            details,
        });

        let mut response = (status, body).into_response();

        if let Some(retry_after) = retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        if let Some(report) = report {
            response.extensions_mut().insert(report);
        }

        response
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError::internal(err)
    }
}

/// Session failures are 401s; store failures are the server's fault
impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Store(_) | SessionError::CreateError(_) => ApiError::internal(err),
            other => ApiError::Unauthorized(format!("Unauthorized - {}", other)),
        }
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        ApiError::Authorization(err)
    }
}

impl From<ConfirmationError> for ApiError {
    fn from(err: ConfirmationError) -> Self {
        match err {
            ConfirmationError::Invalid => ApiError::InvalidToken(err.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<JobQueueError> for ApiError {
    fn from(err: JobQueueError) -> Self {
        match err {
            JobQueueError::NotConfigured => {
                ApiError::ServiceUnavailable("Background jobs are not configured".to_string())
            }
            other => ApiError::internal(other),
        }
    }
}
