/// Integration tests for the Calendar Agent API
///
/// These tests drive the full router against the in-memory repository:
/// - Session gating for API routes and pages
/// - Profile read and partial update
/// - Two-step account deletion
/// - OAuth callback, sign-in lockout and sign-out
/// - Health and infrastructure endpoints

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use calendar_agent_api::config::Config;
use calendar_agent_shared::{
    auth::{
        middleware::SESSION_COOKIE,
        oauth::OAUTH_STATE_COOKIE,
        session::{create_session_token, SessionClaims},
    },
    models::audit_log::{ACTION_ACCOUNT_DELETED, ACTION_PROFILE_UPDATED},
    repository::Repository,
};
use common::{json_body, location, TestContext};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

fn callback_request(state: &str, code: &str) -> Request<Body> {
    Request::builder()
        .uri(format!(
            "/api/auth/callback/google?code={}&state={}",
            code, state
        ))
        .header(header::COOKIE, format!("{}={}", OAUTH_STATE_COOKIE, state))
        .body(Body::empty())
        .unwrap()
}

fn session_cookie_from(response: &axum::http::Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|c| c.starts_with(&format!("{}=", SESSION_COOKIE)))
        .and_then(|c| c.split(';').next())
        .map(str::to_string)
}

#[tokio::test]
async fn test_health_degraded_without_redis() {
    let ctx = TestContext::new().await;

    let response = ctx.anonymous("GET", "/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["database"]["status"], "up");
    assert_eq!(body["services"]["redis"]["status"], "down");
    assert_eq!(body["services"]["redis"]["message"], "Not configured");
    assert!(body["responseTime"].is_number());
}

#[tokio::test]
async fn test_responses_carry_security_and_rate_limit_headers() {
    let ctx = TestContext::new().await;

    let response = ctx.anonymous("GET", "/api/health").await;
    let headers = response.headers();

    assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "100");
    assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "99");
    assert!(headers.get("Strict-Transport-Security").is_none());
}

#[tokio::test]
async fn test_profile_requires_session() {
    let ctx = TestContext::new().await;

    let response = ctx.anonymous("GET", "/api/v1/user/profile").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json_body(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_get_profile() {
    let ctx = TestContext::new().await;

    let response = ctx.authed_json("GET", "/api/v1/user/profile", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["id"], ctx.user.id.to_string());
    assert_eq!(body["preferences"]["workHoursStart"], 9);
    assert_eq!(body["preferences"]["workHoursEnd"], 17);
    assert_eq!(body["workspace"]["slug"], "ada");
    assert_eq!(body["workspace"]["type"], "PERSONAL");
    assert_eq!(body["connectedAccounts"], json!([]));
}

#[tokio::test]
async fn test_partial_profile_update_keeps_other_fields() {
    let ctx = TestContext::new().await;

    let response = ctx
        .authed_json(
            "PATCH",
            "/api/v1/user/profile",
            Some(json!({
                "timezone": "Europe/Berlin",
                "workHoursStart": 8,
                "workHoursEnd": 18,
                "workDays": ["Mon", "Wed"],
                "breakDuration": 45,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let before = json_body(ctx.authed_json("GET", "/api/v1/user/profile", None).await).await;
    assert_eq!(before["preferences"]["timezone"], "Europe/Berlin");
    assert_eq!(before["preferences"]["workDays"], json!(["Mon", "Wed"]));

    let response = ctx
        .authed_json(
            "PATCH",
            "/api/v1/user/profile",
            Some(json!({ "name": "  Ada King  " })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user"]["name"], "Ada King");

    let after = json_body(ctx.authed_json("GET", "/api/v1/user/profile", None).await).await;
    assert_eq!(after["user"]["name"], "Ada King");
    assert_eq!(after["preferences"], before["preferences"]);
    assert_eq!(after["preferences"]["workHoursStart"], 8);
    assert_eq!(after["preferences"]["workHoursEnd"], 18);
    assert_eq!(after["preferences"]["breakDuration"], 45);

    let audit = ctx.repo.list_audit_logs(ctx.user.id, 10).await.unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].action, ACTION_PROFILE_UPDATED);
    assert_eq!(audit[0].changes["updated"]["name"], "Ada King");
    assert!(audit[0].changes["updated"].get("timezone").is_none());
}

#[tokio::test]
async fn test_profile_update_validation() {
    let ctx = TestContext::new().await;

    let response = ctx
        .authed_json(
            "PATCH",
            "/api/v1/user/profile",
            Some(json!({ "workHoursStart": 25 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"], "Validation failed");

    let response = ctx
        .authed_json(
            "PATCH",
            "/api/v1/user/profile",
            Some(json!({ "workHoursStart": 17, "workHoursEnd": 9 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Work hours start must be before work hours end");

    let response = ctx
        .authed_json(
            "PATCH",
            "/api/v1/user/profile",
            Some(json!({ "workDays": ["Monday"] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");

    let profile = json_body(ctx.authed_json("GET", "/api/v1/user/profile", None).await).await;
    assert_eq!(
        profile["preferences"]["workDays"],
        json!(["Mon", "Tue", "Wed", "Thu", "Fri"])
    );

    let audit = ctx.repo.list_audit_logs(ctx.user.id, 10).await.unwrap();
    assert!(audit.is_empty());
}

#[tokio::test]
async fn test_profile_update_rejects_malformed_json() {
    let ctx = TestContext::new().await;

    let request = Request::builder()
        .method("PATCH")
        .uri("/api/v1/user/profile")
        .header(header::COOKIE, ctx.session_cookie())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = ctx.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_JSON");
}

async fn development_token(ctx: &TestContext) -> String {
    let response = ctx
        .authed_json("POST", "/api/v1/user/delete/request", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["message"], "Confirmation email sent");
    body["developmentToken"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_delete_account_flow() {
    let ctx = TestContext::new().await;
    let token = development_token(&ctx).await;

    let response = ctx
        .authed_json(
            "DELETE",
            "/api/v1/user/delete",
            Some(json!({ "confirmationToken": token, "email": "ADA@Example.com" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cleared.contains("Max-Age=0"));

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Account deleted successfully");

    assert!(ctx.repo.find_user(ctx.user.id).await.unwrap().is_none());

    let audit = ctx.repo.list_audit_logs(ctx.user.id, 10).await.unwrap();
    assert_eq!(audit[0].action, ACTION_ACCOUNT_DELETED);

    // Every session was revoked
    let response = ctx.authed_json("GET", "/api/v1/user/profile", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_delete_account_store_failure_changes_nothing() {
    let ctx = TestContext::with_failing_account_deletion().await;
    let token = development_token(&ctx).await;

    let response = ctx
        .authed_json(
            "DELETE",
            "/api/v1/user/delete",
            Some(json!({ "confirmationToken": token, "email": "ada@example.com" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    assert!(ctx.repo.find_user(ctx.user.id).await.unwrap().is_some());
    assert!(ctx.repo.list_audit_logs(ctx.user.id, 10).await.unwrap().is_empty());

    let response = ctx.authed_json("GET", "/api/v1/user/profile", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delete_account_email_mismatch() {
    let ctx = TestContext::new().await;
    let token = development_token(&ctx).await;

    let response = ctx
        .authed_json(
            "DELETE",
            "/api/v1/user/delete",
            Some(json!({ "confirmationToken": token, "email": "someone@example.com" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "EMAIL_MISMATCH");

    assert!(ctx.repo.find_user(ctx.user.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_account_invalid_token() {
    let ctx = TestContext::new().await;

    let response = ctx
        .authed_json(
            "DELETE",
            "/api/v1/user/delete",
            Some(json!({ "confirmationToken": "forged", "email": "ada@example.com" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_TOKEN");

    assert!(ctx.repo.find_user(ctx.user.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_protected_page_redirects_to_signin() {
    let ctx = TestContext::new().await;

    let response = ctx.anonymous("GET", "/dashboard?view=week").await;
    assert_eq!(
        location(&response),
        "http://localhost:8080/signin?callbackUrl=%2Fdashboard%3Fview%3Dweek"
    );
}

#[tokio::test]
async fn test_inactive_user_is_redirected() {
    let ctx = TestContext::new().await;
    assert!(ctx.repo.set_user_flags(ctx.user.id, "user", false).await);

    let request = Request::builder()
        .uri("/settings")
        .header(header::COOKIE, ctx.session_cookie())
        .body(Body::empty())
        .unwrap();

    let target = location(&ctx.send(request).await);
    assert!(target.contains("error=SessionRequired"));
    assert!(target.contains("inactive"));
}

#[tokio::test]
async fn test_signed_in_page_renders() {
    let ctx = TestContext::new().await;

    let request = Request::builder()
        .uri("/calendar")
        .header(header::COOKIE, ctx.session_cookie())
        .body(Body::empty())
        .unwrap();

    let response = ctx.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("Ada Lovelace"));
}

#[tokio::test]
async fn test_signin_sets_state_cookies() {
    let ctx = TestContext::new().await;

    let response = ctx
        .anonymous("GET", "/api/auth/signin/google?callbackUrl=/calendar")
        .await;
    assert!(location(&response).starts_with("https://accounts.example.com/auth?state="));

    let cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().any(|c| c.starts_with("oauth-state=")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with(&format!("oauth-callback-url={}", hex::encode("/calendar")))));
}

#[tokio::test]
async fn test_callback_creates_user_and_session() {
    let ctx = TestContext::new().await;

    let response = ctx.send(callback_request("state-1", "good")).await;
    assert_eq!(location(&response), "http://localhost:8080/dashboard");

    let cookie = session_cookie_from(&response).expect("session cookie");

    let user = ctx
        .repo
        .find_user_by_email("grace@example.com")
        .await
        .unwrap()
        .expect("user created");
    assert!(user.workspace_id.is_some());
    assert_eq!(ctx.repo.list_accounts(user.id).await.unwrap().len(), 1);

    let request = Request::builder()
        .uri("/api/auth/session")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let body = json_body(ctx.send(request).await).await;
    assert_eq!(body["user"]["email"], "grace@example.com");
    assert_eq!(body["user"]["isActive"], true);
}

#[tokio::test]
async fn test_callback_rejects_state_mismatch() {
    let ctx = TestContext::new().await;

    let request = Request::builder()
        .uri("/api/auth/callback/google?code=good&state=forged")
        .header(header::COOKIE, format!("{}=expected", OAUTH_STATE_COOKIE))
        .body(Body::empty())
        .unwrap();

    let response = ctx.send(request).await;
    assert!(session_cookie_from(&response).is_none());
    assert_eq!(
        location(&response),
        "http://localhost:8080/signin?error=OAuthCallback"
    );
}

#[tokio::test]
async fn test_callback_exchange_failure() {
    let ctx = TestContext::new().await;

    let response = ctx.send(callback_request("state-1", "bad")).await;
    assert_eq!(
        location(&response),
        "http://localhost:8080/signin?error=OAuthCallback"
    );
}

#[tokio::test]
async fn test_sixth_sign_in_attempt_is_locked_out() {
    let ctx = TestContext::new().await;

    for _ in 0..5 {
        let response = ctx.send(callback_request("state-1", "good")).await;
        assert_eq!(location(&response), "http://localhost:8080/dashboard");
    }

    let response = ctx.send(callback_request("state-1", "good")).await;
    assert!(session_cookie_from(&response).is_none());
    assert_eq!(
        location(&response),
        "http://localhost:8080/signin?error=RateLimited"
    );
}

#[tokio::test]
async fn test_signout_revokes_session() {
    let ctx = TestContext::new().await;

    let response = ctx.authed_json("POST", "/api/auth/signout", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx.authed_json("GET", "/api/v1/user/profile", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_day_old_token_slides_session() {
    let ctx = TestContext::new().await;

    let session = ctx
        .repo
        .create_session(ctx.user.id, Utc::now() + Duration::seconds(2))
        .await
        .unwrap();
    let issued = Utc::now() - Duration::hours(25);
    let mut claims = SessionClaims::new(
        ctx.user.id,
        session.id,
        ctx.user.email.clone(),
        ctx.user.name.clone(),
        ctx.user.role(),
        ctx.config.session_max_age(),
    );
    claims.iat = issued.timestamp();
    claims.nbf = issued.timestamp();
    claims.exp = (issued + ctx.config.session_max_age()).timestamp();
    let token = create_session_token(&claims, &ctx.config.session.secret).unwrap();

    let request = Request::builder()
        .uri("/api/auth/session")
        .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
        .body(Body::empty())
        .unwrap();
    let response = ctx.send(request).await;
    assert!(session_cookie_from(&response).is_some());

    let body = json_body(response).await;
    let expires: DateTime<Utc> = serde_json::from_value(body["expires"].clone()).unwrap();
    assert!(expires > Utc::now() + Duration::days(29));

    let row = ctx.repo.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(row.expires_at, expires);
}

#[tokio::test]
async fn test_session_endpoint_when_signed_out() {
    let ctx = TestContext::new().await;

    let response = ctx.anonymous("GET", "/api/auth/session").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({}));
}

#[tokio::test]
async fn test_infrastructure_report_outside_production() {
    let ctx = TestContext::new().await;

    let response = ctx.anonymous("GET", "/api/test-infrastructure").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["tests"][0]["service"], "Database");
    assert_eq!(body["tests"][0]["status"], "pass");
    assert_eq!(body["summary"]["failed"], 0);
}

#[tokio::test]
async fn test_infrastructure_disabled_in_production() {
    let mut config = Config::for_test();
    config.api.production = true;
    let ctx = TestContext::with_config(config).await;

    let response = ctx.anonymous("GET", "/api/test-infrastructure").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        json_body(response).await["error"],
        "This endpoint is disabled in production"
    );
}
