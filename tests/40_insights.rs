mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{database_app, offline_app, query, request, send, API};

#[tokio::test]
async fn unknown_filter_field_is_rejected_without_a_query() -> Result<()> {
    // The pool cannot connect: reaching SQL would surface as a 500
    let (app, _) = offline_app()?;

    let uri = format!("{}/insights{}", API, query(&[("filter", r#"{"bogus_field":1}"#)]));
    let (status, body) = send(&app, request("GET", &uri, None, None)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "BadRequest");
    assert!(body["message"].as_str().unwrap_or_default().contains("bogus_field"));
    Ok(())
}

#[tokio::test]
async fn unknown_sort_field_is_rejected() -> Result<()> {
    let (app, _) = offline_app()?;

    let uri = format!("{}/users{}", API, query(&[("sorts", r#"["-password"]"#)]));
    let (status, _) = send(&app, request("GET", &uri, None, None)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn irregular_idx_is_a_bad_request() -> Result<()> {
    let (app, _) = offline_app()?;

    for path in ["/insights/abc", "/insights/0", "/insights/-4/hits"] {
        let (status, body) = send(&app, request("GET", &format!("{}{}", API, path), None, None)).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
        assert_eq!(body["message"], "idx is irregular value");
    }
    Ok(())
}

async fn seed_insight(app: &axum::Router, token: &str, topic_idx: i64, title: &str) -> Result<i64> {
    let (status, body) = send(
        app,
        request(
            "POST",
            &format!("{}/insights", API),
            Some(token),
            Some(json!({
                "title": title,
                "thumbnail": "https://img.archon.io/t.png",
                "content": "<p>body</p>",
                "summary": "summary",
                "topic_idx": topic_idx
            })),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    Ok(body["idx"].as_i64().unwrap_or_default())
}

#[tokio::test]
async fn filter_and_sort_by_topic_and_recency() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };
    let (_, editor) = common::seed_user(&state, "editor@archon.io", "editor").await?;
    let (_, writer) = common::seed_user(&state, "writer@archon.io", "writer").await?;
    for name in ["Tech", "Finance"] {
        send(&app, request("POST", &format!("{}/topics", API), Some(&editor), Some(json!({"name": name})))).await?;
    }

    let first = seed_insight(&app, &writer, 1, "first").await?;
    let _other = seed_insight(&app, &writer, 2, "elsewhere").await?;
    let second = seed_insight(&app, &writer, 1, "second").await?;

    let uri = format!(
        "{}/insights{}",
        API,
        query(&[("filter", r#"{"topic_idx":1}"#), ("sorts", r#"["-created_at"]"#)])
    );
    let (status, body) = send(&app, request("GET", &uri, None, None)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    let idxs: Vec<Value> = body["data"].as_array().cloned().unwrap_or_default().iter().map(|i| i["idx"].clone()).collect();
    assert_eq!(idxs, vec![json!(second), json!(first)]);
    assert_eq!(body["data"][0]["topic"]["name"], "Tech");

    // Soft-deleted insights drop out of the list
    let (status, _) = send(&app, request("DELETE", &format!("{}/insights/{}", API, second), Some(&writer), None)).await?;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app, request("GET", &uri, None, None)).await?;
    assert_eq!(body["total"], 1);

    let (status, _) = send(&app, request("GET", &format!("{}/insights/{}", API, second), None, None)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn hits_and_covers() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };
    let (_, editor) = common::seed_user(&state, "editor@archon.io", "editor").await?;
    let (_, writer) = common::seed_user(&state, "writer@archon.io", "writer").await?;
    send(&app, request("POST", &format!("{}/topics", API), Some(&editor), Some(json!({"name": "Tech"})))).await?;
    let a = seed_insight(&app, &writer, 1, "a").await?;
    let b = seed_insight(&app, &writer, 1, "b").await?;

    // No hits yet
    let (status, _) = send(&app, request("GET", &format!("{}/insights/{}/hits", API, a), None, None)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut hit = request("POST", &format!("{}/insights/{}/hits", API, a), None, None);
    hit.headers_mut().insert("x-forwarded-for", "10.1.2.3, 172.16.0.1".parse()?);
    let (status, _) = send(&app, hit).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, request("GET", &format!("{}/insights/{}/hits", API, a), None, None)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"insight_idx": a, "hits": 1}));

    // First cover is the headline
    let (status, first) =
        send(&app, request("POST", &format!("{}/covers", API), Some(&editor), Some(json!({"insight_idx": a})))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["is_main"], true);

    let (status, _) =
        send(&app, request("POST", &format!("{}/covers", API), Some(&editor), Some(json!({"insight_idx": a})))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, second) =
        send(&app, request("POST", &format!("{}/covers", API), Some(&editor), Some(json!({"insight_idx": b})))).await?;
    assert_eq!(second["is_main"], false);

    let (status, _) =
        send(&app, request("DELETE", &format!("{}/covers/{}", API, first["idx"]), Some(&editor), None)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Promote the second; exactly one headline remains
    let (status, _) = send(
        &app,
        request("PATCH", &format!("{}/covers/{}", API, second["idx"]), Some(&editor), Some(json!({"is_main": true}))),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, headline) = send(&app, request("GET", &format!("{}/covers/headline", API), None, None)).await?;
    assert_eq!(headline["insight"]["idx"], b);

    let mains: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM covers WHERE is_main")
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(mains, 1);
    Ok(())
}

#[tokio::test]
async fn missing_topic_is_not_found_and_used_topic_cannot_go() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };
    let (_, editor) = common::seed_user(&state, "editor@archon.io", "editor").await?;
    let (_, writer) = common::seed_user(&state, "writer@archon.io", "writer").await?;
    send(&app, request("POST", &format!("{}/topics", API), Some(&editor), Some(json!({"name": "Tech"})))).await?;

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("{}/insights", API),
            Some(&writer),
            Some(json!({
                "title": "orphan",
                "thumbnail": "https://img.archon.io/t.png",
                "content": "<p>body</p>",
                "summary": "summary",
                "topic_idx": 9999
            })),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "topic not found");

    let idx = seed_insight(&app, &writer, 1, "kept").await?;
    let (status, body) = send(
        &app,
        request("PATCH", &format!("{}/insights/{}", API, idx), Some(&writer), Some(json!({"topic_idx": 9999}))),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "topic not found");

    // The insight still points at the topic, so the topic stays
    let (status, body) = send(&app, request("DELETE", &format!("{}/topics/1", API), Some(&editor), None)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["type"], "Conflict(Duplication)");
    Ok(())
}

#[tokio::test]
async fn repeated_page_requests_agree() -> Result<()> {
    let Some((app, state, _guard)) = database_app().await? else {
        return Ok(());
    };
    let (_, editor) = common::seed_user(&state, "editor@archon.io", "editor").await?;
    let (_, writer) = common::seed_user(&state, "writer@archon.io", "writer").await?;
    send(&app, request("POST", &format!("{}/topics", API), Some(&editor), Some(json!({"name": "Tech"})))).await?;
    for n in 0..5 {
        seed_insight(&app, &writer, 1, &format!("insight {}", n)).await?;
    }

    // Every row ties on topic_idx, so the order rests on the tiebreaker
    let page = |offset: &str| {
        format!(
            "{}/insights{}",
            API,
            query(&[("sorts", r#"["topic_idx"]"#), ("limit", "2"), ("offset", offset)])
        )
    };
    let (_, first) = send(&app, request("GET", &page("0"), None, None)).await?;
    let (_, again) = send(&app, request("GET", &page("0"), None, None)).await?;
    assert_eq!(first["total"], 5);
    assert_eq!(first["total"], again["total"]);
    assert_eq!(first["data"], again["data"]);

    let (_, next) = send(&app, request("GET", &page("2"), None, None)).await?;
    let seen: Vec<&Value> = first["data"].as_array().into_iter().flatten().map(|i| &i["idx"]).collect();
    for item in next["data"].as_array().into_iter().flatten() {
        assert!(!seen.contains(&&item["idx"]), "{} repeated across pages", item["idx"]);
    }
    Ok(())
}

#[tokio::test]
async fn random_limit_out_of_range_is_rejected_without_a_query() -> Result<()> {
    let (app, _) = offline_app()?;

    let uri = format!("{}/random/insights{}", API, query(&[("limit", "0")]));
    let (status, _) = send(&app, request("GET", &uri, None, None)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
