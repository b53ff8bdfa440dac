/// Health check endpoint
///
/// Probes the database and Redis, and reports whether the remaining
/// adapters are configured.
///
/// # Endpoint
///
/// ```text
/// GET /api/health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2026-01-01T00:00:00Z",
///   "services": {
///     "database": { "status": "up", "latency": 3 },
///     "redis": { "status": "up", "latency": 1 },
///     "jobs": { "status": "up" },
///     "realtime": { "status": "down", "message": "Not configured" },
///     "monitoring": { "status": "up" }
///   },
///   "responseTime": 5
/// }
/// ```
///
/// `unhealthy` (503) when a critical service is down, `degraded` (200) when
/// any other service is down, `healthy` (200) otherwise. The database is
/// always critical; Redis is critical once configured.

use crate::app::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: ServiceState,

    /// Probe round trip in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceStatus {
    fn up(latency: Option<u64>) -> Self {
        Self {
            status: ServiceState::Up,
            latency,
            message: None,
        }
    }

    fn down(message: impl Into<String>) -> Self {
        Self {
            status: ServiceState::Down,
            latency: None,
            message: Some(message.into()),
        }
    }

    fn configured(enabled: bool) -> Self {
        if enabled {
            Self::up(None)
        } else {
            Self::down("Not configured")
        }
    }

    fn is_down(&self) -> bool {
        self.status == ServiceState::Down
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Services {
    pub database: ServiceStatus,
    pub redis: ServiceStatus,
    pub jobs: ServiceStatus,
    pub realtime: ServiceStatus,
    pub monitoring: ServiceStatus,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: OverallStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub services: Services,

    /// Milliseconds spent producing this response
    pub response_time: u64,
}

/// Combines service states into the overall status
pub fn overall_status(services: &Services, redis_critical: bool) -> OverallStatus {
    let critical_down =
        services.database.is_down() || (redis_critical && services.redis.is_down());

    if critical_down {
        return OverallStatus::Unhealthy;
    }

    let any_down = [
        &services.database,
        &services.redis,
        &services.jobs,
        &services.realtime,
        &services.monitoring,
    ]
    .iter()
    .any(|s| s.is_down());

    if any_down {
        OverallStatus::Degraded
    } else {
        OverallStatus::Healthy
    }
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();

    let database = match state.repo.ping().await {
        Ok(latency) => ServiceStatus::up(Some(latency.as_millis() as u64)),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            ServiceStatus::down("Connection failed")
        }
    };

    let redis = if state.cache.is_enabled() {
        match state.cache.ping().await {
            Ok(latency) => ServiceStatus::up(Some(latency.as_millis() as u64)),
            Err(e) => {
                tracing::error!(error = %e, "Redis health check failed");
                ServiceStatus::down("Connection failed")
            }
        }
    } else {
        ServiceStatus::down("Not configured")
    };

    let services = Services {
        database,
        redis,
        jobs: ServiceStatus::configured(state.jobs.is_enabled()),
        realtime: ServiceStatus::configured(state.realtime.is_enabled()),
        monitoring: ServiceStatus::configured(state.tracker.is_enabled()),
    };

    let status = overall_status(&services, state.cache.is_enabled());
    let code = match status {
        OverallStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        services,
        response_time: started.elapsed().as_millis() as u64,
    };

    (code, Json(body))
}
