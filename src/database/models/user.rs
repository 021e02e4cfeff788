use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{types::Json, FromRow, PgConnection};

use crate::filter::{Field, FieldKind, FieldSet};
use crate::types::Role;

use super::topic::TopicRef;

/// Filterable and sortable user fields
pub static USER_FIELDS: FieldSet = FieldSet {
    fields: &[
        Field::new("idx", "u.idx", FieldKind::Int),
        Field::new("email", "u.email", FieldKind::Text),
        Field::new("first_name", "u.first_name", FieldKind::Text),
        Field::new("last_name", "u.last_name", FieldKind::Text),
        Field::new("role", "u.role", FieldKind::Text),
        Field::new("job_title", "u.job_title", FieldKind::Text),
        Field::new("created_at", "u.created_at", FieldKind::Timestamp),
    ],
    default_sort: "-idx",
    tiebreaker: "-idx",
};

pub const USER_SELECT: &str =
    "u.idx, u.email, u.first_name, u.last_name, u.role, u.avatar, u.job_title, u.biography, u.careers, u.created_at, u.updated_at";
pub const USER_FROM: &str = "FROM users u";
pub const ACTIVE: &str = "u.del_at IS NULL";

/// Public columns of a user. The password hash is never selected here.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub idx: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub avatar: Option<String>,
    pub job_title: Option<String>,
    pub biography: Option<String>,
    pub careers: Option<Json<Vec<String>>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// What the auth middleware and the sign-in flow need.
#[derive(Debug, Clone, FromRow)]
pub struct Credentials {
    pub idx: i64,
    pub email: String,
    pub password: String,
    pub role: String,
    pub avatar: Option<String>,
    pub password_updated_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn role(&self) -> Result<Role, sqlx::Error> {
        parse_role(&self.role)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub idx: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub job_title: Option<String>,
    pub biography: Option<String>,
    pub careers: Vec<String>,
    pub topics: Vec<TopicRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserRow {
    pub fn into_view(self, topics: Vec<TopicRef>) -> Result<UserView, sqlx::Error> {
        Ok(UserView {
            role: parse_role(&self.role)?,
            idx: self.idx,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            avatar: self.avatar,
            job_title: self.job_title,
            biography: self.biography,
            careers: self.careers.map(|c| c.0).unwrap_or_default(),
            topics,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_role(value: &str) -> Result<Role, sqlx::Error> {
    Role::try_from(value).map_err(|e| sqlx::Error::Decode(e.into()))
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub job_title: Option<String>,
    pub biography: Option<String>,
    pub careers: Option<Vec<String>>,
    pub avatar: Option<String>,
}

#[derive(Debug, FromRow)]
struct UserTopicRow {
    user_idx: i64,
    idx: i64,
    name: String,
    seq: i32,
}

pub async fn find(conn: &mut PgConnection, idx: i64) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} {} WHERE u.idx = $1 AND {}",
        USER_SELECT, USER_FROM, ACTIVE
    ))
    .bind(idx)
    .fetch_optional(conn)
    .await
}

pub async fn find_view(conn: &mut PgConnection, idx: i64) -> Result<Option<UserView>, sqlx::Error> {
    let Some(row) = find(&mut *conn, idx).await? else {
        return Ok(None);
    };
    let topics = topics_of(conn, idx).await?;
    row.into_view(topics).map(Some)
}

pub async fn credentials_by_idx(conn: &mut PgConnection, idx: i64) -> Result<Option<Credentials>, sqlx::Error> {
    sqlx::query_as::<_, Credentials>(
        "SELECT idx, email, password, role, avatar, password_updated_at \
         FROM users WHERE idx = $1 AND del_at IS NULL",
    )
    .bind(idx)
    .fetch_optional(conn)
    .await
}

pub async fn credentials_by_email(conn: &mut PgConnection, email: &str) -> Result<Option<Credentials>, sqlx::Error> {
    sqlx::query_as::<_, Credentials>(
        "SELECT idx, email, password, role, avatar, password_updated_at \
         FROM users WHERE email = $1 AND del_at IS NULL",
    )
    .bind(email)
    .fetch_optional(conn)
    .await
}

pub async fn email_taken(conn: &mut PgConnection, email: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND del_at IS NULL)")
        .bind(email)
        .fetch_one(conn)
        .await
}

pub async fn insert(conn: &mut PgConnection, user: &NewUser) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (email, password, first_name, last_name, role, job_title, biography, careers, avatar) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING idx",
    )
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.role.as_str())
    .bind(&user.job_title)
    .bind(&user.biography)
    .bind(user.careers.clone().map(Json))
    .bind(&user.avatar)
    .fetch_one(conn)
    .await
}

pub async fn topics_of(conn: &mut PgConnection, user_idx: i64) -> Result<Vec<TopicRef>, sqlx::Error> {
    sqlx::query_as::<_, TopicRef>(
        "SELECT t.idx, t.name, t.seq FROM user_topics ut JOIN topics t ON t.idx = ut.topic_idx \
         WHERE ut.user_idx = $1 ORDER BY t.seq ASC",
    )
    .bind(user_idx)
    .fetch_all(conn)
    .await
}

/// Topics for a batch of users, keyed by user idx.
pub async fn topics_for(
    conn: &mut PgConnection,
    user_idxs: &[i64],
) -> Result<HashMap<i64, Vec<TopicRef>>, sqlx::Error> {
    let mut by_user: HashMap<i64, Vec<TopicRef>> = HashMap::new();
    if user_idxs.is_empty() {
        return Ok(by_user);
    }
    let rows = sqlx::query_as::<_, UserTopicRow>(
        "SELECT ut.user_idx, t.idx, t.name, t.seq FROM user_topics ut JOIN topics t ON t.idx = ut.topic_idx \
         WHERE ut.user_idx = ANY($1) ORDER BY t.seq ASC",
    )
    .bind(user_idxs)
    .fetch_all(conn)
    .await?;
    for row in rows {
        by_user.entry(row.user_idx).or_default().push(TopicRef {
            idx: row.idx,
            name: row.name,
            seq: row.seq,
        });
    }
    Ok(by_user)
}

/// Replace the user's topic set.
pub async fn set_topics(conn: &mut PgConnection, user_idx: i64, topics: &[i64]) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM user_topics WHERE user_idx = $1")
        .bind(user_idx)
        .execute(&mut *conn)
        .await?;
    if !topics.is_empty() {
        sqlx::query("INSERT INTO user_topics (user_idx, topic_idx) SELECT $1, unnest($2::bigint[]) ON CONFLICT DO NOTHING")
            .bind(user_idx)
            .bind(topics)
            .execute(conn)
            .await?;
    }
    Ok(())
}

pub async fn soft_delete(conn: &mut PgConnection, idx: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET del_at = now() WHERE idx = $1 AND del_at IS NULL")
        .bind(idx)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() > 0 {
        sqlx::query("DELETE FROM user_topics WHERE user_idx = $1")
            .bind(idx)
            .execute(conn)
            .await?;
    }
    Ok(result.rows_affected())
}

pub async fn set_avatar(conn: &mut PgConnection, idx: i64, avatar: Option<&str>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET avatar = $2, updated_at = now() WHERE idx = $1 AND del_at IS NULL")
        .bind(idx)
        .bind(avatar)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Authors ranked by hits on their insights in the last three months.
#[derive(Debug, FromRow)]
pub struct TrendingAuthorRow {
    pub cnt: i64,
    pub idx: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
}

pub async fn trending_authors(conn: &mut PgConnection, limit: i64) -> Result<Vec<TrendingAuthorRow>, sqlx::Error> {
    sqlx::query_as::<_, TrendingAuthorRow>(
        "SELECT COUNT(*) AS cnt, u.idx, u.first_name, u.last_name, u.avatar \
         FROM insight_hits h \
         JOIN insights i ON i.idx = h.insight_idx AND i.del_at IS NULL \
         JOIN users u ON u.idx = i.created_by AND u.del_at IS NULL \
         WHERE h.created_at >= now() - interval '3 months' \
         GROUP BY u.idx \
         ORDER BY cnt DESC, u.idx DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str) -> UserRow {
        UserRow {
            idx: 1,
            email: "a@b.io".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: role.to_string(),
            avatar: None,
            job_title: None,
            biography: None,
            careers: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn view_never_contains_password() {
        let view = row("writer").into_view(vec![]).unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "writer");
        assert_eq!(json["careers"], serde_json::json!([]));
    }

    #[test]
    fn unknown_role_is_a_decode_error() {
        assert!(matches!(row("root").into_view(vec![]), Err(sqlx::Error::Decode(_))));
    }
}
