/// Common test utilities for integration tests
///
/// This module provides shared infrastructure for router tests:
/// - In-memory repository with a signed-in test user
/// - Stub OAuth provider with a configurable profile
/// - Request helpers that carry the session cookie

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use calendar_agent_api::{
    app::{build_router, AppState},
    config::Config,
};
use calendar_agent_shared::{
    auth::{
        middleware::SESSION_COOKIE,
        oauth::{OAuthError, OAuthProfile, OAuthProvider, OAuthTokens},
        session::{create_session_token, SessionClaims},
    },
    models::{
        Account, AuditLog, CreateUser, CreateWorkspace, LinkAccount, NewAuditLog,
        ProfileChanges, Session, User, Workspace,
    },
    repository::{MemoryRepository, Repository, RepositoryError, RepositoryResult},
    workspace::create_personal_workspace,
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

/// OAuth provider that accepts any code
pub struct StubOAuthProvider {
    profile: Mutex<OAuthProfile>,
}

impl StubOAuthProvider {
    pub fn new(email: Option<&str>) -> Self {
        Self {
            profile: Mutex::new(OAuthProfile {
                provider: "google".to_string(),
                provider_account_id: "google-subject-1".to_string(),
                email: email.map(str::to_string),
                name: Some("Grace Hopper".to_string()),
                image: None,
                tokens: OAuthTokens {
                    access_token: Some("access".to_string()),
                    refresh_token: Some("refresh".to_string()),
                    ..Default::default()
                },
            }),
        }
    }
}

#[async_trait]
impl OAuthProvider for StubOAuthProvider {
    fn id(&self) -> &'static str {
        "google"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String, OAuthError> {
        Ok(format!(
            "https://accounts.example.com/auth?state={}&redirect_uri={}",
            state, redirect_uri
        ))
    }

    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        if code == "bad" {
            return Err(OAuthError::Exchange("invalid_grant".to_string()));
        }
        Ok(self.profile.lock().unwrap().clone())
    }
}

/// Delegates to [`MemoryRepository`] but fails `delete_account`
pub struct FailingDeletionRepository(Arc<MemoryRepository>);

#[async_trait]
impl Repository for FailingDeletionRepository {
    async fn ping(&self) -> RepositoryResult<Duration> {
        self.0.ping().await
    }

    async fn find_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        self.0.find_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        self.0.find_user_by_email(email).await
    }

    async fn create_user(&self, data: CreateUser) -> RepositoryResult<User> {
        self.0.create_user(data).await
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> RepositoryResult<Option<User>> {
        self.0.update_profile(id, changes).await
    }

    async fn assign_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> RepositoryResult<bool> {
        self.0.assign_workspace(user_id, workspace_id).await
    }

    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        self.0.soft_delete_user(id, at).await
    }

    async fn delete_account(
        &self,
        _id: Uuid,
        _at: DateTime<Utc>,
        _audit: NewAuditLog,
    ) -> RepositoryResult<Option<u64>> {
        Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn find_workspace(&self, id: Uuid) -> RepositoryResult<Option<Workspace>> {
        self.0.find_workspace(id).await
    }

    async fn workspace_slug_exists(&self, slug: &str) -> RepositoryResult<bool> {
        self.0.workspace_slug_exists(slug).await
    }

    async fn create_workspace(&self, data: CreateWorkspace) -> RepositoryResult<Workspace> {
        self.0.create_workspace(data).await
    }

    async fn list_accounts(&self, user_id: Uuid) -> RepositoryResult<Vec<Account>> {
        self.0.list_accounts(user_id).await
    }

    async fn link_account(&self, data: LinkAccount) -> RepositoryResult<Account> {
        self.0.link_account(data).await
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<Session> {
        self.0.create_session(user_id, expires_at).await
    }

    async fn find_session(&self, id: Uuid) -> RepositoryResult<Option<Session>> {
        self.0.find_session(id).await
    }

    async fn extend_session(&self, id: Uuid, expires_at: DateTime<Utc>) -> RepositoryResult<bool> {
        self.0.extend_session(id, expires_at).await
    }

    async fn delete_session(&self, id: Uuid) -> RepositoryResult<bool> {
        self.0.delete_session(id).await
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> RepositoryResult<u64> {
        self.0.delete_user_sessions(user_id).await
    }

    async fn record_audit(&self, entry: NewAuditLog) -> RepositoryResult<AuditLog> {
        self.0.record_audit(entry).await
    }

    async fn list_audit_logs(&self, user_id: Uuid, limit: i64) -> RepositoryResult<Vec<AuditLog>> {
        self.0.list_audit_logs(user_id, limit).await
    }
}

/// Test context containing the router and a signed-in user
pub struct TestContext {
    pub repo: Arc<MemoryRepository>,
    pub app: Router,
    pub config: Config,
    pub user: User,
    pub session_token: String,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(Config::for_test()).await
    }

    pub async fn with_config(config: Config) -> Self {
        Self::build(config, |repo| repo as Arc<dyn Repository>).await
    }

    /// Router whose store fails every account deletion
    pub async fn with_failing_account_deletion() -> Self {
        Self::build(Config::for_test(), |repo| {
            Arc::new(FailingDeletionRepository(repo)) as Arc<dyn Repository>
        })
        .await
    }

    async fn build(
        config: Config,
        store: impl FnOnce(Arc<MemoryRepository>) -> Arc<dyn Repository>,
    ) -> Self {
        let repo = Arc::new(MemoryRepository::new());

        let user = repo
            .create_user(CreateUser {
                email: "ada@example.com".to_string(),
                name: Some("Ada Lovelace".to_string()),
                image: None,
            })
            .await
            .unwrap();
        let workspace = create_personal_workspace(repo.as_ref(), &user).await.unwrap();
        let user = User {
            workspace_id: Some(workspace.id),
            ..user
        };

        let max_age = config.session_max_age();
        let session = repo
            .create_session(user.id, Utc::now() + max_age)
            .await
            .unwrap();
        let claims = SessionClaims::new(
            user.id,
            session.id,
            user.email.clone(),
            user.name.clone(),
            user.role(),
            max_age,
        );
        let session_token = create_session_token(&claims, &config.session.secret).unwrap();

        let state = AppState::for_test(
            config.clone(),
            store(repo.clone()),
            Arc::new(StubOAuthProvider::new(Some("grace@example.com"))),
        );

        Self {
            app: build_router(state),
            repo,
            config,
            user,
            session_token,
        }
    }

    pub fn session_cookie(&self) -> String {
        format!("{}={}", SESSION_COOKIE, self.session_token)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// JSON request with the session cookie attached
    pub async fn authed_json(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, self.session_cookie())
            .header(header::CONTENT_TYPE, "application/json");

        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        self.send(builder.body(body).unwrap()).await
    }

    /// Request without a session
    pub async fn anonymous(&self, method: &str, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}
