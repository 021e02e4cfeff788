// handlers/topics.rs - /topics
//
// GET is public; every mutation is gated to admin and editor by the router.

use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;

use crate::database::models::{topic, Topic};
use crate::database::{transaction, DbConn};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, ListResponse};
use crate::state::AppState;

use super::extract::{IdxPath, ValidJson};
use super::validate::{check_not_blank, required};

#[derive(Debug, Deserialize)]
pub struct TopicBody {
    pub name: Option<String>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SequenceBody {
    pub idx_sequence: Option<Value>,
}

/// GET /topics - every topic ordered by `seq`
pub async fn list(mut conn: DbConn) -> ApiResult<ListResponse<Topic>> {
    let topics = Topic::list(&mut conn).await?;
    Ok(ApiResponse::success(ListResponse::all(topics)))
}

/// POST /topics - append a topic at the end of the sequence
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(body): ValidJson<TopicBody>,
) -> ApiResult<Topic> {
    let name = required(body.name, "name")?;
    check_not_blank(&name, "name")?;
    let created_by = body.created_by.unwrap_or(user.idx);

    let mut conn = DbConn::acquire(&state.pool).await?;

    let created = transaction(&mut conn, move |tx| {
        Box::pin(async move {
            if Topic::name_taken(&mut *tx, &name, None).await? {
                return Err(ApiError::duplication("duplicated name"));
            }
            let seq = Topic::next_seq(&mut *tx).await?;
            Ok(Topic::insert(&mut *tx, &name, created_by, seq).await?)
        })
    })
    .await?;

    tracing::info!("Created topic {} '{}' at seq {}", created.idx, created.name, created.seq);
    Ok(ApiResponse::created(created))
}

/// PATCH /topics/:idx - rename
pub async fn update(
    State(state): State<AppState>,
    IdxPath(idx): IdxPath,
    ValidJson(body): ValidJson<TopicBody>,
) -> ApiResult<Topic> {
    let name = required(body.name, "name")?;
    check_not_blank(&name, "name")?;

    let mut conn = DbConn::acquire(&state.pool).await?;

    if Topic::find(&mut conn, idx).await?.is_none() {
        return Err(ApiError::not_found("topic not found"));
    }
    if Topic::name_taken(&mut conn, &name, Some(idx)).await? {
        return Err(ApiError::duplication("duplicated name"));
    }

    let updated = Topic::update(&mut conn, idx, &name, body.created_by)
        .await?
        .ok_or_else(|| ApiError::not_found("topic not found"))?;
    Ok(ApiResponse::success(updated))
}

/// PUT /topics - reorder; `idx_sequence[i]` gets `seq = i + 1`
pub async fn reorder(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<SequenceBody>,
) -> ApiResult<ListResponse<Topic>> {
    let sequence = parse_sequence(body.idx_sequence)?;

    let mut conn = DbConn::acquire(&state.pool).await?;

    let topics = transaction(&mut conn, move |tx| {
        Box::pin(async move {
            let existing = Topic::all_idx(&mut *tx).await?;
            topic::validate_sequence(&existing, &sequence).map_err(ApiError::bad_request)?;

            for (position, idx) in sequence.iter().enumerate() {
                let seq = i32::try_from(position + 1).map_err(|_| ApiError::bad_request("check idx_sequence length"))?;
                Topic::set_seq(&mut *tx, *idx, seq).await?;
            }
            Ok(Topic::list(&mut *tx).await?)
        })
    })
    .await?;

    Ok(ApiResponse::success(ListResponse::all(topics)))
}

/// DELETE /topics/:idx
pub async fn remove(IdxPath(idx): IdxPath, mut conn: DbConn) -> ApiResult<Value> {
    if Topic::delete(&mut conn, idx).await? == 0 {
        return Err(ApiError::not_found("topic not found"));
    }
    Ok(ApiResponse::success(serde_json::json!({ "idx": idx })))
}

/// `idx_sequence` arrives as a JSON array or as a string holding one
/// (`"[3,1,2]"`, single quotes tolerated).
fn parse_sequence(value: Option<Value>) -> Result<Vec<i64>, ApiError> {
    let value = value.ok_or_else(|| ApiError::bad_request("idx_sequence is required"))?;
    let value = match value {
        Value::String(raw) => serde_json::from_str::<Value>(&raw.replace('\'', "\""))
            .map_err(|_| ApiError::bad_request("idx_sequence should be an array of idx"))?,
        other => other,
    };
    serde_json::from_value::<Vec<i64>>(value).map_err(|_| ApiError::bad_request("idx_sequence should be an array of idx"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequence_accepts_array_or_string() {
        assert_eq!(parse_sequence(Some(json!([3, 1, 2]))).unwrap(), vec![3, 1, 2]);
        assert_eq!(parse_sequence(Some(json!("[3,1,2]"))).unwrap(), vec![3, 1, 2]);
        assert!(parse_sequence(Some(json!("three"))).is_err());
        assert!(parse_sequence(Some(json!(["a"]))).is_err());
        assert_eq!(
            parse_sequence(None).unwrap_err(),
            ApiError::bad_request("idx_sequence is required")
        );
    }
}
