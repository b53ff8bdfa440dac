//! # Calendar Agent API Server
//!
//! Account settings backend for Calendar Agent.
//!
//! ## Architecture
//!
//! The API server is built with Axum and provides:
//! - Google OAuth sign-in with signed, database-backed sessions
//! - Profile read/update and two-step account deletion
//! - Sign-in lockout and per-route request rate limits
//! - Health and infrastructure self-test endpoints
//!
//! Redis is optional: without `REDIS_URL` the cache, job queue and realtime
//! adapters are disabled and rate limits are kept in process.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p calendar-agent-api
//! ```

use calendar_agent_api::{
    app::{build_router, AppState},
    config::Config,
};
use calendar_agent_shared::{
    auth::oauth::GoogleProvider,
    db::{self, migrations::run_migrations},
    infra::{realtime::RealtimeCredentials, Cache, ErrorTracker, JobClient, RealtimeClient},
    rate_limit::{spawn_cleanup, InMemoryRateLimitStore, RateLimitStore, RedisRateLimitStore},
    redis::{RedisClient, RedisConfig},
    repository::{MemoryRepository, PgRepository, Repository},
};
use std::{sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often stale rate limit records are purged
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "calendar_agent_api=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn connect_repository(config: &Config) -> anyhow::Result<Arc<dyn Repository>> {
    if config.is_test() && config.database.url.is_empty() {
        tracing::warn!("No DATABASE_URL in test environment, using in-memory repository");
        return Ok(Arc::new(MemoryRepository::new()));
    }

    let pool = db::create_pool(db::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;

    run_migrations(&pool).await?;

    Ok(Arc::new(PgRepository::new(pool)))
}

async fn connect_redis(config: &Config) -> Option<RedisClient> {
    let url = config.redis_url.as_ref()?;

    match RedisClient::new(RedisConfig::from_url(url.clone())).await {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, continuing without it");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "Calendar Agent API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;
    let repo = connect_repository(&config).await?;
    let redis = connect_redis(&config).await;

    let rate_limits: Arc<dyn RateLimitStore> = match &redis {
        Some(client) => Arc::new(RedisRateLimitStore::new(client.clone())),
        None => Arc::new(InMemoryRateLimitStore::new()),
    };
    spawn_cleanup(rate_limits.clone(), RATE_LIMIT_CLEANUP_INTERVAL);

    let credentials = config.realtime.as_ref().map(|r| RealtimeCredentials {
        app_key: r.app_key.clone(),
        app_secret: r.app_secret.clone(),
    });

    let (cache, jobs) = match &redis {
        Some(client) => (Cache::new(client.clone()), JobClient::new(client.clone())),
        None => (Cache::disabled(), JobClient::disabled()),
    };

    let tracker = ErrorTracker::from_dsn(config.monitoring_dsn.as_deref(), &config.api.app_env);

    let oauth = Arc::new(GoogleProvider::new(
        config.oauth.google_client_id.clone(),
        config.oauth.google_client_secret.clone(),
    ));

    let bind_address = config.bind_address();

    let state = AppState::new(config, repo, oauth, rate_limits)
        .with_cache(cache)
        .with_jobs(jobs)
        .with_realtime(RealtimeClient::new(redis, credentials))
        .with_tracker(tracker);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, exiting...");
}
