mod common;

use anyhow::Result;
use archon_api::database::models::Topic;
use archon_api::database::{transaction, DbConn};
use archon_api::error::ApiError;
use axum::http::StatusCode;
use serde_json::json;

use common::{database_app, pool_settled, request, send, API};

async fn seed_topics(app: &axum::Router, token: &str, names: &[&str]) -> Result<()> {
    for name in names {
        let (status, body) =
            send(app, request("POST", &format!("{}/topics", API), Some(token), Some(json!({"name": name})))).await?;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }
    Ok(())
}

async fn topic_positions(pool: &sqlx::PgPool) -> Result<Vec<(i64, i32, String)>> {
    Ok(sqlx::query_as("SELECT idx, seq, name FROM topics ORDER BY idx")
        .fetch_all(pool)
        .await?)
}

#[tokio::test]
async fn connections_return_to_the_pool_on_every_path() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };

    // Success
    let (status, _) = send(&app, request("GET", &format!("{}/topics", API), None, None)).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(pool_settled(&state.pool).await, "connection held after success");

    // Business error
    let (status, _) = send(&app, request("GET", &format!("{}/insights/999", API), None, None)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(pool_settled(&state.pool).await, "connection held after a not-found");

    // Driver error
    let mut conn = DbConn::acquire(&state.pool).await?;
    let failed = sqlx::query("SELECT * FROM no_such_table").execute(&mut *conn).await;
    assert!(failed.is_err());
    drop(conn);
    assert!(pool_settled(&state.pool).await, "connection held after a driver error");

    // Failed transaction
    let mut conn = DbConn::acquire(&state.pool).await?;
    let failed: Result<(), ApiError> = transaction(&mut conn, |tx| {
        Box::pin(async move {
            sqlx::query("SELECT * FROM no_such_table").execute(&mut *tx).await?;
            Ok(())
        })
    })
    .await;
    assert!(failed.is_err());
    drop(conn);
    assert!(pool_settled(&state.pool).await, "connection held after a rolled back transaction");
    Ok(())
}

#[tokio::test]
async fn failure_after_a_write_rolls_the_transaction_back() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };
    let (editor_idx, editor) = common::seed_user(&state, "editor@archon.io", "editor").await?;
    seed_topics(&app, &editor, &["Tech", "Finance", "Culture"]).await?;
    let before = topic_positions(&state.pool).await?;

    // Business error after two seq updates
    let mut conn = DbConn::acquire(&state.pool).await?;
    let failed: Result<(), ApiError> = transaction(&mut conn, |tx| {
        Box::pin(async move {
            Topic::set_seq(&mut *tx, 1, 3).await?;
            Topic::set_seq(&mut *tx, 3, 1).await?;
            Err(ApiError::bad_request("stop after the swap"))
        })
    })
    .await;
    assert_eq!(failed, Err(ApiError::bad_request("stop after the swap")));

    // Driver error after an insert
    let failed: Result<(), ApiError> = transaction(&mut conn, move |tx| {
        Box::pin(async move {
            Topic::insert(&mut *tx, "Doomed", editor_idx, 4).await?;
            sqlx::query("SELECT * FROM no_such_table").execute(&mut *tx).await?;
            Ok(())
        })
    })
    .await;
    assert!(failed.is_err());
    drop(conn);

    assert_eq!(topic_positions(&state.pool).await?, before);

    // The connection that saw both rollbacks is usable again
    let (status, body) = send(&app, request("GET", &format!("{}/topics", API), None, None)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    Ok(())
}

#[tokio::test]
async fn concurrent_cover_creates_respect_the_cap() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };
    let (editor_idx, editor) = common::seed_user(&state, "editor@archon.io", "editor").await?;
    let max = state.config.limits.covers;

    sqlx::query("INSERT INTO topics (name, created_by, seq) VALUES ('Tech', $1, 1)")
        .bind(editor_idx)
        .execute(&state.pool)
        .await?;
    sqlx::query(
        "INSERT INTO insights (title, thumbnail, content, summary, topic_idx, created_by) \
         SELECT 'insight ' || g, 't', 'c', 's', 1, $1 FROM generate_series(1, $2) g",
    )
    .bind(editor_idx)
    .bind(max + 1)
    .execute(&state.pool)
    .await?;
    // One slot left
    sqlx::query(
        "INSERT INTO covers (insight_idx, is_main, created_by) \
         SELECT g, g = 1, $1 FROM generate_series(1, $2) g",
    )
    .bind(editor_idx)
    .bind(max - 1)
    .execute(&state.pool)
    .await?;

    let create = |insight_idx: i64| {
        send(
            &app,
            request("POST", &format!("{}/covers", API), Some(&editor), Some(json!({"insight_idx": insight_idx}))),
        )
    };
    let (a, b) = tokio::join!(create(max), create(max + 1));
    let mut statuses = vec![a?.0, b?.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::UNPROCESSABLE_ENTITY]);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM covers")
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(total, max);
    Ok(())
}
