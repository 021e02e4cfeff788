use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use crate::filter::{Field, FieldKind, FieldSet};

use super::insight::TopicBrief;

pub static COVER_FIELDS: FieldSet = FieldSet {
    fields: &[
        Field::new("idx", "c.idx", FieldKind::Int),
        Field::new("insight_idx", "c.insight_idx", FieldKind::Int),
        Field::new("is_main", "c.is_main", FieldKind::Bool),
        Field::new("created_by", "c.created_by", FieldKind::Int),
        Field::new("created_at", "c.created_at", FieldKind::Timestamp),
    ],
    default_sort: "-is_main",
    tiebreaker: "-idx",
};

pub const COVER_SELECT: &str = "c.idx, c.is_main, c.insight_idx, i.title, i.thumbnail, i.summary, \
     i.topic_idx, t.name AS topic_name, c.created_at, c.created_by";
pub const COVER_FROM: &str =
    "FROM covers c JOIN insights i ON i.idx = c.insight_idx JOIN topics t ON t.idx = i.topic_idx";
pub const ACTIVE: &str = "i.del_at IS NULL";

#[derive(Debug, Clone, FromRow)]
pub struct CoverRow {
    pub idx: i64,
    pub is_main: bool,
    pub insight_idx: i64,
    pub title: String,
    pub thumbnail: String,
    pub summary: String,
    pub topic_idx: i64,
    pub topic_name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverInsight {
    pub idx: i64,
    pub title: String,
    pub thumbnail: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverView {
    pub idx: i64,
    pub is_main: bool,
    pub insight: CoverInsight,
    pub topic: TopicBrief,
    pub created_at: DateTime<Utc>,
    pub created_by: i64,
}

impl From<CoverRow> for CoverView {
    fn from(row: CoverRow) -> Self {
        Self {
            idx: row.idx,
            is_main: row.is_main,
            insight: CoverInsight {
                idx: row.insight_idx,
                title: row.title,
                thumbnail: row.thumbnail,
                summary: row.summary,
            },
            topic: TopicBrief {
                idx: row.topic_idx,
                name: row.topic_name,
            },
            created_at: row.created_at,
            created_by: row.created_by,
        }
    }
}

/// Bare cover row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Cover {
    pub idx: i64,
    pub insight_idx: i64,
    pub is_main: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "idx, insight_idx, is_main, created_by, created_at";

pub async fn find(conn: &mut PgConnection, idx: i64) -> Result<Option<Cover>, sqlx::Error> {
    sqlx::query_as::<_, Cover>(&format!("SELECT {} FROM covers WHERE idx = $1", COLUMNS))
        .bind(idx)
        .fetch_optional(conn)
        .await
}

pub async fn headline(conn: &mut PgConnection) -> Result<Option<CoverView>, sqlx::Error> {
    let row = sqlx::query_as::<_, CoverRow>(&format!(
        "SELECT {} {} WHERE c.is_main AND {} LIMIT 1",
        COVER_SELECT, COVER_FROM, ACTIVE
    ))
    .fetch_optional(conn)
    .await?;
    Ok(row.map(CoverView::from))
}

/// Serialise cover inserts for the rest of the transaction. Readers are not
/// blocked.
pub async fn lock_table(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("LOCK TABLE covers IN SHARE ROW EXCLUSIVE MODE")
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn count(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM covers")
        .fetch_one(conn)
        .await
}

pub async fn covers_insight(conn: &mut PgConnection, insight_idx: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM covers WHERE insight_idx = $1)")
        .bind(insight_idx)
        .fetch_one(conn)
        .await
}

pub async fn insert(
    conn: &mut PgConnection,
    insight_idx: i64,
    is_main: bool,
    created_by: i64,
) -> Result<Cover, sqlx::Error> {
    sqlx::query_as::<_, Cover>(&format!(
        "INSERT INTO covers (insight_idx, is_main, created_by) VALUES ($1, $2, $3) RETURNING {}",
        COLUMNS
    ))
    .bind(insight_idx)
    .bind(is_main)
    .bind(created_by)
    .fetch_one(conn)
    .await
}

/// Make `idx` the only main cover. Call inside a transaction.
pub async fn promote(conn: &mut PgConnection, idx: i64) -> Result<Option<Cover>, sqlx::Error> {
    sqlx::query("UPDATE covers SET is_main = FALSE WHERE is_main AND idx <> $1")
        .bind(idx)
        .execute(&mut *conn)
        .await?;
    sqlx::query_as::<_, Cover>(&format!(
        "UPDATE covers SET is_main = TRUE WHERE idx = $1 RETURNING {}",
        COLUMNS
    ))
    .bind(idx)
    .fetch_optional(conn)
    .await
}

pub async fn delete(conn: &mut PgConnection, idx: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM covers WHERE idx = $1")
        .bind(idx)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
