/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use calendar_agent_api::{app::{build_router, AppState}, config::Config};
/// use calendar_agent_shared::{auth::oauth::GoogleProvider, repository::MemoryRepository};
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let oauth = GoogleProvider::new(
///     config.oauth.google_client_id.clone(),
///     config.oauth.google_client_secret.clone(),
/// );
/// let state = AppState::for_test(config, Arc::new(MemoryRepository::new()), Arc::new(oauth));
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        monitoring::error_tracking_layer, rate_limit::rate_limit_layer,
        security::SecurityHeadersLayer, session::session_layer,
    },
    routes,
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use calendar_agent_shared::{
    auth::oauth::OAuthProvider,
    infra::{Cache, ErrorTracker, JobClient, RealtimeClient},
    rate_limit::{InMemoryRateLimitStore, RateLimitStore, RequestRateLimiter, SignInRateLimiter},
    repository::Repository,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every field is an `Arc` or a cheap handle.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub config: Arc<Config>,
    pub sign_in_limiter: SignInRateLimiter,
    pub request_limiter: RequestRateLimiter,
    pub oauth: Arc<dyn OAuthProvider>,
    pub cache: Cache,
    pub jobs: JobClient,
    pub realtime: RealtimeClient,
    pub tracker: ErrorTracker,
}

impl AppState {
    /// Creates state with every optional adapter disabled
    ///
    /// Both limiters share `rate_limits`.
    pub fn new(
        config: Config,
        repo: Arc<dyn Repository>,
        oauth: Arc<dyn OAuthProvider>,
        rate_limits: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self {
            repo,
            config: Arc::new(config),
            sign_in_limiter: SignInRateLimiter::new(rate_limits.clone()),
            request_limiter: RequestRateLimiter::new(rate_limits),
            oauth,
            cache: Cache::disabled(),
            jobs: JobClient::disabled(),
            realtime: RealtimeClient::disabled(),
            tracker: ErrorTracker::disabled(),
        }
    }

    /// State for router tests: in-process rate limits, no Redis
    pub fn for_test(config: Config, repo: Arc<dyn Repository>, oauth: Arc<dyn OAuthProvider>) -> Self {
        Self::new(config, repo, oauth, Arc::new(InMemoryRateLimitStore::new()))
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_jobs(mut self, jobs: JobClient) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_realtime(mut self, realtime: RealtimeClient) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn with_tracker(mut self, tracker: ErrorTracker) -> Self {
        self.tracker = tracker;
        self
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /                          # Landing page
/// ├── GET  /signin                    # Sign-in page
/// ├── GET  /dashboard|/calendar|/profile|/settings   (session required)
/// └── /api
///     ├── GET  /health
///     ├── GET  /test-infrastructure   # 403 in production
///     ├── /auth
///     │   ├── GET  /signin/google
///     │   ├── GET  /callback/google
///     │   ├── POST /signout
///     │   └── GET  /session
///     └── /v1/user                    (session required)
///         ├── GET|PATCH /profile
///         ├── DELETE    /delete
///         └── POST      /delete/request
/// ```
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. Security headers
/// 2. CORS
/// 3. Logging (tower-http TraceLayer)
/// 4. Session resolution and gating
/// 5. Error tracking
/// 6. Request rate limiting
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/signin/google", get(routes::auth::signin))
        .route("/callback/google", get(routes::auth::callback))
        .route("/signout", post(routes::auth::signout))
        .route("/session", get(routes::auth::session));

    let user_routes = Router::new()
        .route(
            "/profile",
            get(routes::profile::get_profile).patch(routes::profile::update_profile),
        )
        .route("/delete", delete(routes::account::delete_account))
        .route("/delete/request", post(routes::account::request_deletion));

    let api_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/test-infrastructure",
            get(routes::test_infrastructure::test_infrastructure),
        )
        .nest("/auth", auth_routes)
        .nest("/v1/user", user_routes);

    let page_routes = Router::new()
        .route("/", get(routes::pages::home))
        .route("/signin", get(routes::pages::signin))
        .route("/dashboard", get(routes::pages::dashboard))
        .route("/calendar", get(routes::pages::calendar))
        .route("/profile", get(routes::pages::profile))
        .route("/settings", get(routes::pages::settings));

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(page_routes)
        .nest("/api", api_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_layer,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            error_tracking_layer,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session_layer,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
