// handlers/trending.rs - /trending/insights, /trending/authors

use axum::extract::State;
use serde::Serialize;

use crate::database::models::insight::{self, TrendingInsight};
use crate::database::models::user::{self, TrendingAuthorRow};
use crate::database::DbConn;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, ListResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TrendingTopic {
    pub idx: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TrendingAuthor {
    pub cnt: i64,
    pub idx: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub topics: Vec<TrendingTopic>,
}

impl TrendingAuthor {
    fn new(row: TrendingAuthorRow, topics: Vec<TrendingTopic>) -> Self {
        Self {
            cnt: row.cnt,
            idx: row.idx,
            first_name: row.first_name,
            last_name: row.last_name,
            avatar: row.avatar,
            topics,
        }
    }
}

/// GET /trending/insights - most viewed over the last three months
pub async fn insights(State(state): State<AppState>, mut conn: DbConn) -> ApiResult<ListResponse<TrendingInsight>> {
    let found = insight::trending(&mut conn, state.config.limits.trending).await?;
    // A single entry does not make a ranking.
    if found.len() < 2 {
        return Err(ApiError::not_found("No or too less insights found"));
    }
    Ok(ApiResponse::success(ListResponse::all(found)))
}

/// GET /trending/authors - authors ranked by hits on their insights
pub async fn authors(State(state): State<AppState>, mut conn: DbConn) -> ApiResult<ListResponse<TrendingAuthor>> {
    let rows = user::trending_authors(&mut conn, state.config.limits.trending).await?;
    let idxs: Vec<i64> = rows.iter().map(|row| row.idx).collect();
    let mut topics = user::topics_for(&mut conn, &idxs).await?;

    let data = rows
        .into_iter()
        .map(|row| {
            let author_topics = topics
                .remove(&row.idx)
                .unwrap_or_default()
                .into_iter()
                .map(|topic| TrendingTopic {
                    idx: topic.idx,
                    name: topic.name,
                })
                .collect();
            TrendingAuthor::new(row, author_topics)
        })
        .collect();

    Ok(ApiResponse::success(ListResponse::all(data)))
}
