use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::error::ApiError;

/// Resource body plus status. Resources are rendered as-is; list endpoints
/// use [`ListResponse`] for their `{total, data}` shape.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self::with_status(data, StatusCode::OK)
    }

    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self { data, status_code }
    }

    /// Create a 201 Created response
    pub fn created(data: T) -> Self {
        Self::with_status(data, StatusCode::CREATED)
    }

    /// Create a 204 No Content response (data will be ignored)
    pub fn no_content() -> ApiResponse<()> {
        ApiResponse::with_status((), StatusCode::NO_CONTENT)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        if self.status_code == StatusCode::NO_CONTENT {
            return self.status_code.into_response();
        }

        match serde_json::to_value(&self.data) {
            Ok(value) => (self.status_code, Json(value)).into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                ApiError::internal("Failed to serialize response data").into_response()
            }
        }
    }
}

/// Page of a list endpoint. `offset`/`limit` are echoed only by endpoints
/// that paginate.
#[derive(Debug, Serialize)]
pub struct ListResponse<T: Serialize> {
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    pub data: Vec<T>,
}

impl<T: Serialize> ListResponse<T> {
    pub fn all(data: Vec<T>) -> Self {
        Self {
            total: data.len() as i64,
            offset: None,
            limit: None,
            data,
        }
    }

    pub fn page(data: Vec<T>, total: i64, offset: i64, limit: i64) -> Self {
        Self {
            total,
            offset: Some(offset),
            limit: Some(limit),
            data,
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
