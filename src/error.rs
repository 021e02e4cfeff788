// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 missing/invalid/expired token, wrong password
    Unauthenticated(String),

    // 403 role not permitted
    Unauthorized(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Duplication(String),

    // 413 body over the configured size
    PayloadTooLarge(String),

    // 422 decryption failures and business-rule violations
    Unprocessable(String),

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    Internal(String),
}

/// Classification attached to error responses so the global error responder
/// can rebuild the envelope with the request path.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub error_type: &'static str,
    pub message: String,
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthenticated(_) => 401,
            ApiError::Unauthorized(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Duplication(_) => 409,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::Unprocessable(_) => 422,
            ApiError::TooManyRequests(_) => 429,
            ApiError::Internal(_) => 500,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthenticated(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::Duplication(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::Internal(msg) => msg,
        }
    }

    /// The `type` field of the error envelope
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Unauthenticated(_) => "Unauthenticated",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Duplication(_) => "Conflict(Duplication)",
            ApiError::PayloadTooLarge(_) => "PayloadTooLarge",
            ApiError::Unprocessable(_) => "Unprocessable",
            ApiError::TooManyRequests(_) => "TooManyRequests",
            ApiError::Internal(_) => "InternalError",
        }
    }

    /// Classify a bare status produced outside of the handlers (method not
    /// allowed, payload too large and similar framework responses).
    pub fn from_status(status: StatusCode) -> Self {
        let message = status.canonical_reason().unwrap_or("Request failed").to_string();
        match status.as_u16() {
            401 => ApiError::Unauthenticated(message),
            403 => ApiError::Unauthorized(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Duplication(message),
            413 => ApiError::PayloadTooLarge(message),
            422 => ApiError::Unprocessable(message),
            429 => ApiError::TooManyRequests(message),
            400..=499 => ApiError::BadRequest(message),
            _ => ApiError::Internal(message),
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            error_type: self.error_type(),
            message: self.message().to_string(),
        }
    }
}

impl ErrorReport {
    /// Convert to JSON response body
    pub fn to_json(&self, path: &str) -> Value {
        json!({
            "type": self.error_type,
            "message": self.message,
            "path": path,
            "at": Utc::now(),
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::Unauthenticated(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn duplication(message: impl Into<String>) -> Self {
        ApiError::Duplication(message.into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError::PayloadTooLarge(message.into())
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        ApiError::Unprocessable(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        ApiError::TooManyRequests(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

// Convert other error types to ApiError
impl From<crate::database::manager::DatabaseError> for ApiError {
    fn from(err: crate::database::manager::DatabaseError) -> Self {
        use crate::database::manager::DatabaseError;
        match err {
            DatabaseError::Unavailable(e) => {
                tracing::error!("Database pool error: {}", e);
                ApiError::internal("database unavailable")
            }
            DatabaseError::Sqlx(sqlx_err) => ApiError::from(sqlx_err),
            DatabaseError::InvalidDatabaseUrl(e) => {
                tracing::error!("Invalid database url: {}", e);
                ApiError::internal("database unavailable")
            }
            DatabaseError::Migration(e) => {
                tracing::error!("Migration error: {}", e);
                ApiError::internal("database unavailable")
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                tracing::error!("Database pool error: {}", err);
                return ApiError::internal("database unavailable");
            }
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => {
                    tracing::debug!("Unique violation: {}", db_err);
                    return ApiError::duplication(duplicate_message(db_err.constraint()));
                }
                // foreign_key_violation; referenced rows are checked up front,
                // so this is mostly a delete of a row still in use
                Some("23503") => {
                    tracing::debug!("Foreign key violation: {}", db_err);
                    return ApiError::duplication("referenced row is missing or still in use");
                }
                _ => {}
            },
            _ => {}
        }

        // Log the real error but return generic message
        tracing::error!("SQLx error: {}", err);
        ApiError::internal("Database error occurred")
    }
}

fn duplicate_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("users_email_active_key") => "email already exists".to_string(),
        Some("topics_name_key") => "duplicated name".to_string(),
        Some("covers_insight_idx_key") => "insight already exists".to_string(),
        Some(name) => format!("duplicated value ({})", name),
        None => "duplicated value".to_string(),
    }
}

impl From<crate::filter::error::FilterError> for ApiError {
    fn from(err: crate::filter::error::FilterError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<crate::auth::TokenError> for ApiError {
    fn from(err: crate::auth::TokenError) -> Self {
        use crate::auth::TokenError;
        match err {
            TokenError::Expired => ApiError::unauthenticated("token expired"),
            TokenError::Invalid(_) => ApiError::unauthenticated("invalid token"),
            TokenError::Generation(msg) => {
                tracing::error!("Token generation error: {}", msg);
                ApiError::internal("failed to issue tokens")
            }
        }
    }
}

impl From<crate::auth::password::CryptoError> for ApiError {
    fn from(err: crate::auth::password::CryptoError) -> Self {
        use crate::auth::password::CryptoError;
        match err {
            CryptoError::Hash(msg) => {
                tracing::error!("Password hashing error: {}", msg);
                ApiError::internal("An error occurred while processing your request")
            }
            other => {
                tracing::debug!("Password decryption failed: {}", other);
                ApiError::unprocessable("encryption error")
            }
        }
    }
}

impl From<crate::services::blob_store::BlobError> for ApiError {
    fn from(err: crate::services::blob_store::BlobError) -> Self {
        tracing::error!("Blob store error: {}", err);
        ApiError::internal("Upload failed. Try again")
    }
}

/// Body rejections are bad requests unless the body hit the size limit.
fn body_rejection(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(text)
    } else {
        ApiError::bad_request(text)
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        body_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::bad_request(err.body_text())
    }
}

impl From<axum::extract::multipart::MultipartRejection> for ApiError {
    fn from(rejection: axum::extract::multipart::MultipartRejection) -> Self {
        body_rejection(rejection.status(), rejection.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_type(), self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum. The path is filled in by the
// global error responder, which sees the incoming request.
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let report = self.report();
        let mut response = (status, Json(report.to_json(""))).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_status_and_type() {
        let cases = [
            (ApiError::bad_request("x"), 400, "BadRequest"),
            (ApiError::unauthenticated("x"), 401, "Unauthenticated"),
            (ApiError::unauthorized("x"), 403, "Unauthorized"),
            (ApiError::not_found("x"), 404, "NotFound"),
            (ApiError::duplication("x"), 409, "Conflict(Duplication)"),
            (ApiError::payload_too_large("x"), 413, "PayloadTooLarge"),
            (ApiError::unprocessable("x"), 422, "Unprocessable"),
            (ApiError::too_many_requests("x"), 429, "TooManyRequests"),
            (ApiError::internal("x"), 500, "InternalError"),
        ];
        for (err, status, ty) in cases {
            assert_eq!(err.status_code(), status);
            assert_eq!(err.error_type(), ty);
        }
    }

    #[test]
    fn response_carries_report_extension() {
        let response = ApiError::not_found("topic not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.error_type, "NotFound");
        assert_eq!(report.message, "topic not found");
    }

    #[test]
    fn envelope_has_all_fields() {
        let body = ApiError::duplication("duplicated name").report().to_json("/archon-api/v1/topics");
        assert_eq!(body["type"], "Conflict(Duplication)");
        assert_eq!(body["message"], "duplicated name");
        assert_eq!(body["path"], "/archon-api/v1/topics");
        assert!(body["at"].is_string());
    }

    #[test]
    fn framework_statuses_are_classified() {
        assert_eq!(ApiError::from_status(StatusCode::METHOD_NOT_ALLOWED).error_type(), "BadRequest");
        let too_large = ApiError::from_status(StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(too_large.status_code(), 413);
        assert_eq!(too_large.error_type(), "PayloadTooLarge");
        assert_eq!(ApiError::from_status(StatusCode::BAD_GATEWAY).error_type(), "InternalError");
    }
}
