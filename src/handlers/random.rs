// handlers/random.rs - GET /random/insights

use axum::extract::{rejection::QueryRejection, Query, State};
use serde::Deserialize;

use crate::database::models::insight::{self, RandomInsight};
use crate::database::DbConn;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, ListResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    pub limit: Option<i64>,
}

fn sample_size(requested: Option<i64>, default: i64, max: i64) -> Result<i64, ApiError> {
    match requested {
        None => Ok(default),
        Some(limit) if (1..=max).contains(&limit) => Ok(limit),
        Some(_) => Err(ApiError::bad_request(format!("limit must be between 1 and {}", max))),
    }
}

/// Random sample of live insights.
pub async fn insights(
    State(state): State<AppState>,
    query: Result<Query<RandomQuery>, QueryRejection>,
) -> ApiResult<ListResponse<RandomInsight>> {
    let Query(query) = query?;
    let limit = sample_size(query.limit, state.config.limits.random, state.config.filter.max_limit)?;
    let mut conn = DbConn::acquire(&state.pool).await?;
    let found = insight::random(&mut conn, limit).await?;
    Ok(ApiResponse::success(ListResponse::all(found)))
}
