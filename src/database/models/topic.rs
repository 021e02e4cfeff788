use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Topic {
    pub idx: i64,
    pub name: String,
    pub seq: i32,
    pub created_by: i64,
}

/// Topic as embedded in users and insights.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopicRef {
    pub idx: i64,
    pub name: String,
    pub seq: i32,
}

const COLUMNS: &str = "idx, name, seq, created_by";

impl Topic {
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Topic>, sqlx::Error> {
        sqlx::query_as::<_, Topic>(&format!("SELECT {} FROM topics ORDER BY seq ASC, idx ASC", COLUMNS))
            .fetch_all(conn)
            .await
    }

    pub async fn find(conn: &mut PgConnection, idx: i64) -> Result<Option<Topic>, sqlx::Error> {
        sqlx::query_as::<_, Topic>(&format!("SELECT {} FROM topics WHERE idx = $1", COLUMNS))
            .bind(idx)
            .fetch_optional(conn)
            .await
    }

    /// Whether another topic already uses `name`.
    pub async fn name_taken(conn: &mut PgConnection, name: &str, except: Option<i64>) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM topics WHERE name = $1 AND idx IS DISTINCT FROM $2)")
            .bind(name)
            .bind(except)
            .fetch_one(conn)
            .await
    }

    pub async fn next_seq(conn: &mut PgConnection) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar::<_, i32>("SELECT COALESCE(MAX(seq), 0) + 1 FROM topics")
            .fetch_one(conn)
            .await
    }

    pub async fn insert(conn: &mut PgConnection, name: &str, created_by: i64, seq: i32) -> Result<Topic, sqlx::Error> {
        sqlx::query_as::<_, Topic>(&format!(
            "INSERT INTO topics (name, created_by, seq) VALUES ($1, $2, $3) RETURNING {}",
            COLUMNS
        ))
        .bind(name)
        .bind(created_by)
        .bind(seq)
        .fetch_one(conn)
        .await
    }

    pub async fn update(
        conn: &mut PgConnection,
        idx: i64,
        name: &str,
        created_by: Option<i64>,
    ) -> Result<Option<Topic>, sqlx::Error> {
        sqlx::query_as::<_, Topic>(&format!(
            "UPDATE topics SET name = $2, created_by = COALESCE($3, created_by) WHERE idx = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(idx)
        .bind(name)
        .bind(created_by)
        .fetch_optional(conn)
        .await
    }

    pub async fn all_idx(conn: &mut PgConnection) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT idx FROM topics")
            .fetch_all(conn)
            .await
    }

    pub async fn set_seq(conn: &mut PgConnection, idx: i64, seq: i32) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE topics SET seq = $2 WHERE idx = $1")
            .bind(idx)
            .bind(seq)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(conn: &mut PgConnection, idx: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM topics WHERE idx = $1")
            .bind(idx)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Members of `idxs` with no topic row.
    pub async fn missing(conn: &mut PgConnection, idxs: &[i64]) -> Result<Vec<i64>, sqlx::Error> {
        if idxs.is_empty() {
            return Ok(vec![]);
        }
        sqlx::query_scalar::<_, i64>(
            "SELECT wanted FROM unnest($1::bigint[]) AS wanted WHERE wanted NOT IN (SELECT idx FROM topics)",
        )
        .bind(idxs)
        .fetch_all(conn)
        .await
    }
}

/// Validate that `sequence` names every existing topic exactly once.
pub fn validate_sequence(existing: &[i64], sequence: &[i64]) -> Result<(), String> {
    if existing.len() != sequence.len() {
        return Err("check idx_sequence length".to_string());
    }
    let mut wanted = sequence.to_vec();
    wanted.sort_unstable();
    if wanted.windows(2).any(|w| w[0] == w[1]) {
        return Err("idx_sequence contains duplicates".to_string());
    }
    let mut have = existing.to_vec();
    have.sort_unstable();
    if have != wanted {
        return Err("idx_sequence must list every topic".to_string());
    }
    Ok(())
}
