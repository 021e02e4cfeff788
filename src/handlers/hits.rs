// handlers/hits.rs - /insights/:idx/hits

use serde_json::{json, Value};

use crate::database::models::{hit, insight};
use crate::database::DbConn;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, ClientIp};

use super::extract::IdxPath;

/// POST /insights/:idx/hits - record one view from the client address
pub async fn record(IdxPath(idx): IdxPath, ClientIp(ip): ClientIp, mut conn: DbConn) -> ApiResult<Value> {
    if !insight::exists(&mut conn, idx).await? {
        return Err(ApiError::not_found("no insight found"));
    }
    let hit_idx = hit::record(&mut conn, idx, ip).await?;
    tracing::debug!("Recorded hit {} on insight {} from {}", hit_idx, idx, ip);
    Ok(ApiResponse::created(json!({ "idx": hit_idx })))
}

/// GET /insights/:idx/hits
pub async fn count(IdxPath(idx): IdxPath, mut conn: DbConn) -> ApiResult<hit::HitCount> {
    if !insight::exists(&mut conn, idx).await? {
        return Err(ApiError::not_found("no insight found"));
    }
    let hits = hit::count(&mut conn, idx).await?;
    if hits == 0 {
        return Err(ApiError::not_found("no insight hits found"));
    }
    Ok(ApiResponse::success(hit::HitCount { insight_idx: idx, hits }))
}
