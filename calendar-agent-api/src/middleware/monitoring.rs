/// Forwards 500 responses to the error tracker
///
/// [`ApiError`](crate::error::ApiError) attaches an [`InternalErrorReport`]
/// to every internal error response; this layer reports it with the request
/// method and path. Reporting never affects the response.

use crate::{app::AppState, error::InternalErrorReport};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use calendar_agent_shared::{auth::middleware::SessionContext, infra::monitoring::Level};
use serde_json::json;

pub async fn error_tracking_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let user_id = request
        .extensions()
        .get::<SessionContext>()
        .map(|s| s.user_id.to_string());

    state
        .tracker
        .add_breadcrumb(&format!("{} {}", method, path), "http", Level::Info, None);

    let response = next.run(request).await;

    if let Some(InternalErrorReport(cause)) = response.extensions().get::<InternalErrorReport>() {
        state.tracker.capture_message(
            cause,
            Level::Error,
            Some(json!({
                "method": method,
                "path": path,
                "userId": user_id,
                "status": response.status().as_u16(),
            })),
        );
    }

    response
}
