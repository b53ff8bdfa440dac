/// Minimal server-rendered pages
///
/// The dashboard pages sit behind the session layer, which redirects
/// signed-out browsers to `/signin` before these handlers run.

use axum::{extract::Query, response::Html, Extension};
use calendar_agent_shared::{auth::middleware::SessionContext, html::escape};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInPageParams {
    pub callback_url: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
}

/// User-facing text for a `/signin?error=` code
pub fn signin_error_message(code: &str) -> &'static str {
    match code {
        "OAuthSignin" => "Error connecting to authentication provider. Please try again.",
        "OAuthCallback" => "Error during authentication. Please try again.",
        "OAuthCreateAccount" => "Could not create account. Please try again.",
        "Callback" => "Authentication failed. Please try again.",
        "AccessDenied" => "Access denied. Your account may be inactive or missing an email.",
        "RateLimited" => "Too many sign-in attempts. Please try again later.",
        "SessionRequired" => "Please sign in to access this page.",
        _ => "An error occurred. Please try again.",
    }
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{} | Calendar Agent</title></head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    ))
}

pub async fn home() -> Html<String> {
    layout(
        "Home",
        "<h1>Calendar Agent</h1>\n<p>AI scheduling for your calendar.</p>\n<a href=\"/signin\">Sign in</a>",
    )
}

pub async fn signin(Query(params): Query<SignInPageParams>) -> Html<String> {
    let alert = params
        .error
        .as_deref()
        .map(|code| {
            let text = params
                .message
                .as_deref()
                .unwrap_or_else(|| signin_error_message(code));
            format!("<p role=\"alert\">{}</p>\n", escape(text))
        })
        .unwrap_or_default();

    let callback = params.callback_url.as_deref().unwrap_or("/dashboard");

    let body = format!(
        "<h1>Sign in</h1>\n{}<form method=\"get\" action=\"/api/auth/signin/google\">\n<input type=\"hidden\" name=\"callbackUrl\" value=\"{}\">\n<button type=\"submit\">Continue with Google</button>\n</form>",
        alert,
        escape(callback)
    );

    layout("Sign in", &body)
}

fn signed_in_page(title: &str, session: &SessionContext) -> Html<String> {
    let who = session.name.as_deref().unwrap_or(&session.email);
    let body = format!(
        "<h1>{}</h1>\n<p>Signed in as {}</p>\n<nav><a href=\"/dashboard\">Dashboard</a> <a href=\"/calendar\">Calendar</a> <a href=\"/profile\">Profile</a> <a href=\"/settings\">Settings</a></nav>",
        escape(title),
        escape(who)
    );
    layout(title, &body)
}

pub async fn dashboard(Extension(session): Extension<SessionContext>) -> Html<String> {
    signed_in_page("Dashboard", &session)
}

pub async fn profile(Extension(session): Extension<SessionContext>) -> Html<String> {
    signed_in_page("Profile", &session)
}

pub async fn settings(Extension(session): Extension<SessionContext>) -> Html<String> {
    signed_in_page("Settings", &session)
}

pub async fn calendar(Extension(session): Extension<SessionContext>) -> Html<String> {
    signed_in_page("Calendar", &session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signin_page_shows_error() {
        let Html(page) = signin(Query(SignInPageParams {
            error: Some("RateLimited".to_string()),
            ..Default::default()
        }))
        .await;

        assert!(page.contains("Too many sign-in attempts"));
        assert!(page.contains("value=\"/dashboard\""));
    }

    #[test]
    fn test_unknown_error_code() {
        assert_eq!(
            signin_error_message("Bogus"),
            "An error occurred. Please try again."
        );
    }
}
