// handlers/insights.rs - /insights and /insights/:idx
//
// Reads are public; create/update/delete are gated to admin and writer.

use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::database::models::insight::{self, InsightDetail, InsightListRow, InsightSummary, NewInsight};
use crate::database::models::Topic;
use crate::database::query_builder::{fetch_page, ListSource, UpdateBuilder};
use crate::database::DbConn;
use crate::error::ApiError;
use crate::filter::FieldSet;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, ListResponse};
use crate::state::AppState;
use crate::types::Patch;

use super::extract::{IdxPath, ListSpec, Listing, ValidJson};
use super::validate::{check_not_blank, required};

pub struct InsightList;

impl ListSpec for InsightList {
    fn fields() -> &'static FieldSet {
        &insight::INSIGHT_FIELDS
    }

    fn default_limit(config: &AppConfig) -> i64 {
        config.limits.insights
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateInsight {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub topic_idx: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateInsight {
    pub title: Patch<String>,
    pub thumbnail: Patch<String>,
    pub content: Patch<String>,
    pub summary: Patch<String>,
    pub topic_idx: Patch<i64>,
}

/// GET /insights - filtered, sorted page
pub async fn list(
    listing: Listing<InsightList>,
    mut conn: DbConn,
) -> ApiResult<ListResponse<InsightSummary>> {
    let filter = listing.filter;
    let source = ListSource {
        select: insight::INSIGHT_LIST_SELECT,
        from: insight::INSIGHT_FROM,
        base: &[insight::ACTIVE],
    };
    let (rows, total) = fetch_page::<InsightListRow>(&mut conn, &filter, &source).await?;
    let data = rows.into_iter().map(InsightSummary::from).collect();
    Ok(ApiResponse::success(ListResponse::page(data, total, filter.offset(), filter.limit())))
}

/// GET /insights/:idx
pub async fn get(IdxPath(idx): IdxPath, mut conn: DbConn) -> ApiResult<InsightDetail> {
    let found = insight::find_detail(&mut conn, idx)
        .await?
        .ok_or_else(|| ApiError::not_found("insight not found"))?;
    Ok(ApiResponse::success(found))
}

async fn ensure_topic_exists(conn: &mut sqlx::PgConnection, topic_idx: i64) -> Result<(), ApiError> {
    if Topic::find(conn, topic_idx).await?.is_none() {
        return Err(ApiError::not_found("topic not found"));
    }
    Ok(())
}

/// POST /insights - the caller becomes the author
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(body): ValidJson<CreateInsight>,
) -> ApiResult<InsightDetail> {
    let new = NewInsight {
        title: required(body.title, "title")?,
        thumbnail: required(body.thumbnail, "thumbnail")?,
        content: required(body.content, "content")?,
        summary: required(body.summary, "summary")?,
        topic_idx: required(body.topic_idx, "topic_idx")?,
        created_by: user.idx,
    };
    check_not_blank(&new.title, "title")?;

    let mut conn = DbConn::acquire(&state.pool).await?;
    ensure_topic_exists(&mut conn, new.topic_idx).await?;
    let idx = insight::insert(&mut conn, &new).await?;
    tracing::info!("User {} created insight {}", user.idx, idx);

    let created = insight::find_detail(&mut conn, idx)
        .await?
        .ok_or_else(|| ApiError::internal("insight vanished after insert"))?;
    Ok(ApiResponse::created(created))
}

/// PATCH /insights/:idx - stamps `edited_at` / `edited_by`
pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    IdxPath(idx): IdxPath,
    ValidJson(body): ValidJson<UpdateInsight>,
) -> ApiResult<InsightDetail> {
    let topic_idx = body.topic_idx.required("topic_idx").map_err(ApiError::bad_request)?;
    let mut update = UpdateBuilder::new("insights");
    update
        .set_opt("title", body.title.required("title").map_err(ApiError::bad_request)?)
        .set_opt("thumbnail", body.thumbnail.required("thumbnail").map_err(ApiError::bad_request)?)
        .set_opt("content", body.content.required("content").map_err(ApiError::bad_request)?)
        .set_opt("summary", body.summary.required("summary").map_err(ApiError::bad_request)?)
        .set_opt("topic_idx", topic_idx)
        .set("edited_by", user.idx)
        .set_expr("edited_at", "now()");

    let mut conn = DbConn::acquire(&state.pool).await?;
    if let Some(topic_idx) = topic_idx {
        ensure_topic_exists(&mut conn, topic_idx).await?;
    }
    if update.execute(&mut conn, "idx", idx, Some("del_at IS NULL")).await? == 0 {
        return Err(ApiError::not_found("insight not found"));
    }

    let updated = insight::find_detail(&mut conn, idx)
        .await?
        .ok_or_else(|| ApiError::not_found("insight not found"))?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /insights/:idx - soft delete
pub async fn remove(IdxPath(idx): IdxPath, mut conn: DbConn) -> ApiResult<Value> {
    if insight::soft_delete(&mut conn, idx).await? == 0 {
        return Err(ApiError::not_found("insight not found"));
    }
    Ok(ApiResponse::success(json!({ "idx": idx })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_body_distinguishes_absent_fields() {
        let body: UpdateInsight = serde_json::from_str(r#"{"title": "New", "topic_idx": null}"#).unwrap();
        assert_eq!(body.title, Patch::Set("New".to_string()));
        assert_eq!(body.topic_idx, Patch::Clear);
        assert!(body.content.is_unchanged());
        assert!(body.topic_idx.required("topic_idx").is_err());
    }
}
