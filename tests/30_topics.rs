mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{database_app, request, send, API};

#[tokio::test]
async fn create_then_duplicate_name_conflicts() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };
    let (editor, token) = common::seed_user(&state, "editor@archon.io", "editor").await?;

    let body = json!({"name": "Tech", "created_by": editor});
    let (status, created) = send(&app, request("POST", &format!("{}/topics", API), Some(&token), Some(body.clone()))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["seq"], 1);

    let (status, error) = send(&app, request("POST", &format!("{}/topics", API), Some(&token), Some(body))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["type"], "Conflict(Duplication)");

    let (status, list) = send(&app, request("GET", &format!("{}/topics", API), None, None)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    Ok(())
}

#[tokio::test]
async fn reorder_assigns_positions_in_request_order() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };
    let (_, token) = common::seed_user(&state, "editor@archon.io", "editor").await?;
    for name in ["Tech", "Finance", "Policy"] {
        let (status, _) =
            send(&app, request("POST", &format!("{}/topics", API), Some(&token), Some(json!({"name": name})))).await?;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, list) = send(
        &app,
        request("PUT", &format!("{}/topics", API), Some(&token), Some(json!({"idx_sequence": [3, 1, 2]}))),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let order: Vec<(i64, i64)> = list["data"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|t| (t["idx"].as_i64().unwrap_or_default(), t["seq"].as_i64().unwrap_or_default()))
        .collect();
    assert_eq!(order, vec![(3, 1), (1, 2), (2, 3)]);

    // An incomplete sequence changes nothing
    let (status, _) = send(
        &app,
        request("PUT", &format!("{}/topics", API), Some(&token), Some(json!({"idx_sequence": [1, 2]}))),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = send(&app, request("GET", &format!("{}/topics", API), None, None)).await?;
    assert_eq!(list["data"][0]["idx"], 3);
    Ok(())
}

#[tokio::test]
async fn plain_users_cannot_manage_topics() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };
    let (_, token) = common::seed_user(&state, "reader@archon.io", "user").await?;

    let (status, body) =
        send(&app, request("POST", &format!("{}/topics", API), Some(&token), Some(json!({"name": "Tech"})))).await?;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["type"], "Unauthorized");
    Ok(())
}
