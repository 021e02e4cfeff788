// handlers/covers.rs - /covers
//
// Covers pin insights to the front page; exactly one of them is the
// headline (`is_main`).

use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::database::models::cover::{self, Cover, CoverRow, CoverView};
use crate::database::models::insight;
use crate::database::query_builder::{fetch_page, ListSource};
use crate::database::{transaction, DbConn};
use crate::error::ApiError;
use crate::filter::FieldSet;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, ListResponse};
use crate::state::AppState;

use super::extract::{IdxPath, ListSpec, Listing, ValidJson};
use super::validate::required;

pub struct CoverList;

impl ListSpec for CoverList {
    fn fields() -> &'static FieldSet {
        &cover::COVER_FIELDS
    }

    fn default_limit(config: &AppConfig) -> i64 {
        config.limits.covers
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCover {
    pub insight_idx: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCover {
    pub is_main: Option<bool>,
}

/// GET /covers
pub async fn list(listing: Listing<CoverList>, mut conn: DbConn) -> ApiResult<ListResponse<CoverView>> {
    let filter = listing.filter;
    let source = ListSource {
        select: cover::COVER_SELECT,
        from: cover::COVER_FROM,
        base: &[cover::ACTIVE],
    };
    let (rows, total) = fetch_page::<CoverRow>(&mut conn, &filter, &source).await?;
    let data = rows.into_iter().map(CoverView::from).collect();
    Ok(ApiResponse::success(ListResponse::page(data, total, filter.offset(), filter.limit())))
}

/// GET /covers/headline
pub async fn headline(mut conn: DbConn) -> ApiResult<CoverView> {
    let main = cover::headline(&mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found("no headline found"))?;
    Ok(ApiResponse::success(main))
}

/// POST /covers - the first cover becomes the headline
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(body): ValidJson<CreateCover>,
) -> ApiResult<Cover> {
    let insight_idx = required(body.insight_idx, "insight_idx")?;
    let max_covers = state.config.limits.covers;

    let mut conn = DbConn::acquire(&state.pool).await?;
    let created = transaction(&mut conn, move |tx| {
        Box::pin(async move {
            // Concurrent creates queue here so the count below stays accurate
            cover::lock_table(&mut *tx).await?;
            if !insight::exists(&mut *tx, insight_idx).await? {
                return Err(ApiError::not_found("insight not found"));
            }
            if cover::covers_insight(&mut *tx, insight_idx).await? {
                return Err(ApiError::duplication("insight already exists"));
            }
            let total = cover::count(&mut *tx).await?;
            if total >= max_covers {
                return Err(ApiError::unprocessable(format!(
                    "covers are limited to {}",
                    max_covers
                )));
            }
            Ok(cover::insert(&mut *tx, insight_idx, total == 0, user.idx).await?)
        })
    })
    .await?;

    Ok(ApiResponse::created(created))
}

/// PATCH /covers/:idx - promote to headline
pub async fn update(
    State(state): State<AppState>,
    IdxPath(idx): IdxPath,
    ValidJson(body): ValidJson<UpdateCover>,
) -> ApiResult<Cover> {
    if body.is_main != Some(true) {
        return Err(ApiError::bad_request("is_main should exists"));
    }

    let mut conn = DbConn::acquire(&state.pool).await?;

    let promoted = transaction(&mut conn, move |tx| {
        Box::pin(async move {
            cover::promote(&mut *tx, idx)
                .await?
                .ok_or_else(|| ApiError::not_found("cover not found"))
        })
    })
    .await?;

    Ok(ApiResponse::success(promoted))
}

/// DELETE /covers/:idx - the headline cannot be removed
pub async fn remove(IdxPath(idx): IdxPath, mut conn: DbConn) -> ApiResult<Value> {
    let found = cover::find(&mut conn, idx)
        .await?
        .ok_or_else(|| ApiError::not_found("cover not found"))?;
    if found.is_main {
        return Err(ApiError::bad_request("main cover cannot be removed"));
    }
    cover::delete(&mut conn, idx).await?;
    Ok(ApiResponse::success(json!({ "idx": idx })))
}
