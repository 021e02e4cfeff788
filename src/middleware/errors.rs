use axum::{
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};

use crate::error::{ApiError, ErrorReport};
use crate::state::AppState;

/// Rewrite every 4xx/5xx response as `{type, message, path, at}`.
///
/// Handler errors carry their classification as an [`ErrorReport`]
/// extension; bare framework statuses are classified by code.
pub async fn error_envelope(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().clone();
    let response = next.run(request).await;

    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let report = response
        .extensions()
        .get::<ErrorReport>()
        .cloned()
        .unwrap_or_else(|| ApiError::from_status(status).report());

    if state.config.is_development() {
        tracing::debug!(
            "{} {} -> {} {}: {}",
            method,
            path,
            status.as_u16(),
            report.error_type,
            report.message
        );
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    (parts, Json(report.to_json(&path))).into_response()
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Can not find on this server")
}
