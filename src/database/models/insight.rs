use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use crate::filter::{Field, FieldKind, FieldSet};

use super::topic::TopicRef;

pub static INSIGHT_FIELDS: FieldSet = FieldSet {
    fields: &[
        Field::new("idx", "i.idx", FieldKind::Int),
        Field::new("topic_idx", "i.topic_idx", FieldKind::Int),
        Field::new("created_by", "i.created_by", FieldKind::Int),
        Field::new("title", "i.title", FieldKind::Text),
        Field::new("created_at", "i.created_at", FieldKind::Timestamp),
        Field::new("edited_at", "i.edited_at", FieldKind::Timestamp),
    ],
    default_sort: "-created_at",
    tiebreaker: "-idx",
};

pub const INSIGHT_LIST_SELECT: &str = "i.idx, i.title, i.thumbnail, i.summary, i.topic_idx, t.name AS topic_name, \
     i.created_by, u.first_name, u.last_name, u.avatar, i.created_at, i.edited_at";
pub const INSIGHT_FROM: &str = "FROM insights i JOIN topics t ON t.idx = i.topic_idx JOIN users u ON u.idx = i.created_by";
pub const ACTIVE: &str = "i.del_at IS NULL";

#[derive(Debug, Clone, Serialize)]
pub struct TopicBrief {
    pub idx: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Creator {
    pub idx: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InsightListRow {
    pub idx: i64,
    pub title: String,
    pub thumbnail: String,
    pub summary: String,
    pub topic_idx: i64,
    pub topic_name: String,
    pub created_by: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightSummary {
    pub idx: i64,
    pub title: String,
    pub thumbnail: String,
    pub summary: String,
    pub topic: TopicBrief,
    pub created_by: Creator,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl From<InsightListRow> for InsightSummary {
    fn from(row: InsightListRow) -> Self {
        Self {
            idx: row.idx,
            title: row.title,
            thumbnail: row.thumbnail,
            summary: row.summary,
            topic: TopicBrief {
                idx: row.topic_idx,
                name: row.topic_name,
            },
            created_by: Creator {
                idx: row.created_by,
                first_name: row.first_name,
                last_name: row.last_name,
                avatar: row.avatar,
            },
            created_at: row.created_at,
            edited_at: row.edited_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct InsightDetailRow {
    idx: i64,
    title: String,
    thumbnail: String,
    content: String,
    summary: String,
    topic_idx: i64,
    topic_name: String,
    created_by: i64,
    first_name: String,
    last_name: String,
    avatar: Option<String>,
    biography: Option<String>,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    edited_by: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Author {
    pub idx: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub biography: Option<String>,
    pub topics: Vec<TopicRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightDetail {
    pub idx: i64,
    pub title: String,
    pub thumbnail: String,
    pub content: String,
    pub summary: String,
    pub topic: TopicBrief,
    pub created_by: Author,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub edited_by: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewInsight {
    pub title: String,
    pub thumbnail: String,
    pub content: String,
    pub summary: String,
    pub topic_idx: i64,
    pub created_by: i64,
}

pub async fn find_detail(conn: &mut PgConnection, idx: i64) -> Result<Option<InsightDetail>, sqlx::Error> {
    let row = sqlx::query_as::<_, InsightDetailRow>(&format!(
        "SELECT i.idx, i.title, i.thumbnail, i.content, i.summary, i.topic_idx, t.name AS topic_name, \
         i.created_by, u.first_name, u.last_name, u.avatar, u.biography, i.created_at, i.edited_at, i.edited_by \
         {} WHERE i.idx = $1 AND {}",
        INSIGHT_FROM, ACTIVE
    ))
    .bind(idx)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let topics = super::user::topics_of(conn, row.created_by).await?;

    Ok(Some(InsightDetail {
        idx: row.idx,
        title: row.title,
        thumbnail: row.thumbnail,
        content: row.content,
        summary: row.summary,
        topic: TopicBrief {
            idx: row.topic_idx,
            name: row.topic_name,
        },
        created_by: Author {
            idx: row.created_by,
            first_name: row.first_name,
            last_name: row.last_name,
            avatar: row.avatar,
            biography: row.biography,
            topics,
        },
        created_at: row.created_at,
        edited_at: row.edited_at,
        edited_by: row.edited_by,
    }))
}

pub async fn exists(conn: &mut PgConnection, idx: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM insights WHERE idx = $1 AND del_at IS NULL)")
        .bind(idx)
        .fetch_one(conn)
        .await
}

pub async fn insert(conn: &mut PgConnection, insight: &NewInsight) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO insights (title, thumbnail, content, summary, topic_idx, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING idx",
    )
    .bind(&insight.title)
    .bind(&insight.thumbnail)
    .bind(&insight.content)
    .bind(&insight.summary)
    .bind(insight.topic_idx)
    .bind(insight.created_by)
    .fetch_one(conn)
    .await
}

pub async fn soft_delete(conn: &mut PgConnection, idx: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE insights SET del_at = now() WHERE idx = $1 AND del_at IS NULL")
        .bind(idx)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RandomInsight {
    pub idx: i64,
    pub thumbnail: String,
    pub title: String,
    pub summary: String,
}

pub async fn random(conn: &mut PgConnection, limit: i64) -> Result<Vec<RandomInsight>, sqlx::Error> {
    sqlx::query_as::<_, RandomInsight>(
        "SELECT idx, thumbnail, title, summary FROM insights WHERE del_at IS NULL ORDER BY random() LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await
}

#[derive(Debug, Clone, FromRow)]
struct TrendingRow {
    hits: i64,
    #[sqlx(flatten)]
    insight: InsightListRow,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendingInsight {
    pub idx: i64,
    pub hits: i64,
    pub title: String,
    pub thumbnail: String,
    pub summary: String,
    pub topic: TopicBrief,
    pub creator: Creator,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

/// Most viewed insights over the last three months.
pub async fn trending(conn: &mut PgConnection, limit: i64) -> Result<Vec<TrendingInsight>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TrendingRow>(&format!(
        "SELECT h.hits, {} \
         FROM (SELECT insight_idx, COUNT(*) AS hits FROM insight_hits \
               WHERE created_at >= now() - interval '3 months' GROUP BY insight_idx) h \
         JOIN insights i ON i.idx = h.insight_idx \
         JOIN topics t ON t.idx = i.topic_idx \
         JOIN users u ON u.idx = i.created_by \
         WHERE {} \
         ORDER BY h.hits DESC, i.idx DESC \
         LIMIT $1",
        INSIGHT_LIST_SELECT, ACTIVE
    ))
    .bind(limit)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let summary = InsightSummary::from(row.insight);
            TrendingInsight {
                idx: summary.idx,
                hits: row.hits,
                title: summary.title,
                thumbnail: summary.thumbnail,
                summary: summary.summary,
                topic: summary.topic,
                creator: summary.created_by,
                created_at: summary.created_at,
                edited_at: summary.edited_at,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_nests_topic_and_creator() {
        let row = InsightListRow {
            idx: 3,
            title: "Rust".to_string(),
            thumbnail: "https://img/t.png".to_string(),
            summary: "short".to_string(),
            topic_idx: 2,
            topic_name: "dev".to_string(),
            created_by: 7,
            first_name: "Ada".to_string(),
            last_name: "L".to_string(),
            avatar: None,
            created_at: Utc::now(),
            edited_at: None,
        };
        let json = serde_json::to_value(InsightSummary::from(row)).unwrap();
        assert_eq!(json["topic"], serde_json::json!({"idx": 2, "name": "dev"}));
        assert_eq!(json["created_by"]["idx"], 7);
        assert!(json.get("content").is_none());
    }
}
