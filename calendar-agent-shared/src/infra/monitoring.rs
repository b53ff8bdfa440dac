//! Error tracking
//!
//! A small client for a Sentry-compatible store endpoint. Events are built
//! synchronously (so callers get an event ID back) and posted in the
//! background; delivery failures are logged and never reach the caller.
//!
//! Without a DSN the tracker is disabled and every capture is a no-op.
//!
//! # Example
//!
//! ```no_run
//! use calendar_agent_shared::infra::monitoring::{ErrorTracker, Level};
//!
//! # async fn example() {
//! let tracker = ErrorTracker::from_dsn(Some("https://key@o1.ingest.example.com/42"), "production");
//! tracker.add_breadcrumb("profile update", "http", Level::Info, None);
//! tracker.capture_message("Something odd happened", Level::Warning, None);
//! # }
//! ```

use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Breadcrumbs retained per process
pub const MAX_BREADCRUMBS: usize = 100;

/// Exception messages that are never reported
pub const IGNORE_PATTERNS: &[&str] = &[
    "ResizeObserver loop limit exceeded",
    "Non-Error promise rejection captured",
    "cancelled",
];

/// Monitoring configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MonitoringError {
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),
}

/// Parsed `https://{public_key}@{host}/{project_id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub scheme: String,
    pub public_key: String,
    pub host: String,
    pub project_id: String,
}

impl Dsn {
    pub fn parse(raw: &str) -> Result<Self, MonitoringError> {
        let url = Url::parse(raw).map_err(|e| MonitoringError::InvalidDsn(e.to_string()))?;

        let public_key = url.username();
        if public_key.is_empty() {
            return Err(MonitoringError::InvalidDsn("missing public key".to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| MonitoringError::InvalidDsn("missing host".to_string()))?;
        let project_id = url.path().trim_matches('/');
        if project_id.is_empty() {
            return Err(MonitoringError::InvalidDsn("missing project id".to_string()));
        }

        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            scheme: url.scheme().to_string(),
            public_key: public_key.to_string(),
            host,
            project_id: project_id.to_string(),
        })
    }

    /// Event ingestion endpoint
    pub fn store_url(&self) -> String {
        format!(
            "{}://{}/api/{}/store/",
            self.scheme, self.host, self.project_id
        )
    }

    fn auth_header(&self) -> String {
        format!(
            "Sentry sentry_version=7, sentry_key={}, sentry_client=calendar-agent/{}",
            self.public_key,
            env!("CARGO_PKG_VERSION")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub message: String,
    pub category: String,
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Unix seconds
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub url: Option<String>,
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
}

/// Event payload posted to the store endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub event_id: String,
    pub timestamp: String,
    pub level: Level,
    pub platform: String,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<TrackedUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// Scrubs an event before it leaves the process
///
/// Cookies and headers are removed; noisy exceptions are dropped (None).
pub fn before_send(mut event: ErrorEvent) -> Option<ErrorEvent> {
    if let Some(request) = event.request.as_mut() {
        request.cookies = None;
        request.headers = None;
    }

    if let Some(exception) = &event.exception {
        if IGNORE_PATTERNS.iter().any(|p| exception.value.contains(p)) {
            return None;
        }
    }

    Some(event)
}

/// Fraction of traces to keep
pub fn traces_sample_rate(production: bool) -> f64 {
    if production {
        0.1
    } else {
        1.0
    }
}

struct TrackerInner {
    dsn: Dsn,
    environment: String,
    http: reqwest::Client,
    breadcrumbs: Mutex<VecDeque<Breadcrumb>>,
    user: Mutex<Option<TrackedUser>>,
}

/// Error tracker; cheap to clone
#[derive(Clone, Default)]
pub struct ErrorTracker {
    inner: Option<Arc<TrackerInner>>,
}

impl ErrorTracker {
    /// Builds a tracker from an optional DSN
    ///
    /// A missing or invalid DSN yields a disabled tracker and a warning.
    pub fn from_dsn(dsn: Option<&str>, environment: &str) -> Self {
        let Some(raw) = dsn.filter(|d| !d.trim().is_empty()) else {
            tracing::warn!("Error tracking DSN not configured, error tracking disabled");
            return Self::disabled();
        };

        match Dsn::parse(raw) {
            Ok(dsn) => {
                tracing::info!(
                    host = %dsn.host,
                    environment,
                    sample_rate = traces_sample_rate(environment == "production"),
                    "Error tracking initialized"
                );
                Self {
                    inner: Some(Arc::new(TrackerInner {
                        dsn,
                        environment: environment.to_string(),
                        http: reqwest::Client::new(),
                        breadcrumbs: Mutex::new(VecDeque::with_capacity(MAX_BREADCRUMBS)),
                        user: Mutex::new(None),
                    })),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Invalid error tracking DSN, error tracking disabled");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Records a breadcrumb, evicting the oldest beyond [`MAX_BREADCRUMBS`]
    pub fn add_breadcrumb(
        &self,
        message: &str,
        category: &str,
        level: Level,
        data: Option<serde_json::Value>,
    ) {
        let Some(inner) = &self.inner else { return };
        let Ok(mut crumbs) = inner.breadcrumbs.lock() else {
            return;
        };

        if crumbs.len() == MAX_BREADCRUMBS {
            crumbs.pop_front();
        }
        crumbs.push_back(Breadcrumb {
            message: message.to_string(),
            category: category.to_string(),
            level,
            data,
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
        });
    }

    /// Associates later events with a user
    ///
    /// The email is only kept in development.
    pub fn set_user(&self, id: &str, email: Option<&str>, name: Option<&str>) {
        let Some(inner) = &self.inner else { return };
        if let Ok(mut user) = inner.user.lock() {
            *user = Some(TrackedUser {
                id: id.to_string(),
                email: email
                    .filter(|_| inner.environment == "development")
                    .map(str::to_string),
                username: name.map(str::to_string),
            });
        }
    }

    pub fn clear_user(&self) {
        if let Some(inner) = &self.inner {
            if let Ok(mut user) = inner.user.lock() {
                *user = None;
            }
        }
    }

    /// Reports an error; returns the event ID unless disabled or filtered
    pub fn capture_exception(
        &self,
        error: &(dyn std::error::Error + 'static),
        context: Option<serde_json::Value>,
    ) -> Option<String> {
        let exception = ExceptionInfo {
            kind: error_kind(error),
            value: error.to_string(),
        };
        tracing::error!(error = %error, "Error captured");
        self.capture(Level::Error, None, Some(exception), context)
    }

    /// Reports a message at the given level
    pub fn capture_message(
        &self,
        message: &str,
        level: Level,
        context: Option<serde_json::Value>,
    ) -> Option<String> {
        self.capture(level, Some(message.to_string()), None, context)
    }

    /// Number of retained breadcrumbs
    pub fn breadcrumb_count(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|inner| inner.breadcrumbs.lock().ok().map(|c| c.len()))
            .unwrap_or(0)
    }

    fn capture(
        &self,
        level: Level,
        message: Option<String>,
        exception: Option<ExceptionInfo>,
        extra: Option<serde_json::Value>,
    ) -> Option<String> {
        let inner = self.inner.as_ref()?;
        let event = before_send(self.build_event(inner, level, message, exception, extra))?;
        let event_id = event.event_id.clone();

        let inner = inner.clone();
        tokio::spawn(async move {
            let result = inner
                .http
                .post(inner.dsn.store_url())
                .header("X-Sentry-Auth", inner.dsn.auth_header())
                .json(&event)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            if let Err(e) = result {
                tracing::warn!(event_id = %event.event_id, error = %e, "Failed to deliver error event");
            }
        });

        Some(event_id)
    }

    fn build_event(
        &self,
        inner: &TrackerInner,
        level: Level,
        message: Option<String>,
        exception: Option<ExceptionInfo>,
        extra: Option<serde_json::Value>,
    ) -> ErrorEvent {
        ErrorEvent {
            event_id: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            level,
            platform: "rust".to_string(),
            environment: inner.environment.clone(),
            message,
            exception,
            user: inner.user.lock().ok().and_then(|u| u.clone()),
            request: None,
            extra,
            breadcrumbs: inner
                .breadcrumbs
                .lock()
                .map(|c| c.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

fn error_kind(error: &(dyn std::error::Error + 'static)) -> String {
    let debug = format!("{:?}", error);
    debug
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string()
}
