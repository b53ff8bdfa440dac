//! # Calendar Agent Worker
//!
//! Background job runner for Calendar Agent.
//!
//! ## Architecture
//!
//! The worker:
//! - Joins the `workers` consumer group on the `jobs:events` Redis stream
//! - Recovers its own unacknowledged jobs on startup
//! - Dispatches each job to the function registered for its event
//! - Retries retriable failures with exponential backoff
//!
//! `REDIS_URL` is required. `DATABASE_URL` is optional and lets schedule
//! generation read stored preferences.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p calendar-agent-worker
//! ```

use calendar_agent_shared::{
    db,
    infra::{realtime::RealtimeCredentials, Cache, RealtimeClient},
    redis::{RedisClient, RedisConfig},
    repository::{PgRepository, Repository},
};
use calendar_agent_worker::{
    functions::JobContext,
    orchestrator::{OrchestratorConfig, WorkerOrchestrator},
    queue::JobQueue,
};
use std::{env, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "calendar_agent_worker=debug".into());

    let json = env::var("LOG_FORMAT")
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

async fn connect_repository() -> anyhow::Result<Option<Arc<dyn Repository>>> {
    let Some(url) = env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty()) else {
        tracing::warn!("DATABASE_URL not set, schedule generation will use default preferences");
        return Ok(None);
    };

    let pool = db::create_pool(db::DatabaseConfig {
        url,
        max_connections: 5,
        ..Default::default()
    })
    .await?;

    let repo: Arc<dyn Repository> = Arc::new(PgRepository::new(pool));
    Ok(Some(repo))
}

fn realtime_credentials() -> Option<RealtimeCredentials> {
    let app_key = env::var("REALTIME_APP_KEY").ok()?;
    let app_secret = env::var("REALTIME_APP_SECRET").ok()?;
    Some(RealtimeCredentials { app_key, app_secret })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!(
        "Calendar Agent Worker v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let redis_config = RedisConfig::from_env()
        .ok_or_else(|| anyhow::anyhow!("REDIS_URL is required to run the worker"))?;
    let redis = RedisClient::new(redis_config).await?;
    let repo = connect_repository().await?;

    let ctx = JobContext {
        realtime: RealtimeClient::new(Some(redis.clone()), realtime_credentials()),
        cache: Cache::new(redis.clone()),
        repo,
    };

    let consumer = env::var("WORKER_ID")
        .ok()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()));

    let orchestrator = WorkerOrchestrator::new(
        JobQueue::new(redis, consumer),
        ctx,
        OrchestratorConfig::default(),
    );

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received, exiting...");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    tracing::info!("Worker ready and listening for jobs");
    orchestrator.run().await
}
