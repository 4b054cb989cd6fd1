//! Watch-progress API tests: round trips, completion semantics, and the
//! continue-watching projection.

mod common;

use common::{register_user, seed_movie, TestHarness};

async fn seed_watchable(harness: &TestHarness, path: &str, duration: f64) -> i64 {
    let id = seed_movie(harness, "Movie", path, 1 << 20);
    let conn = harness.conn();
    streambox_db::queries::media::update_probe_info(
        &conn,
        streambox_core::MediaItemId::new(id),
        Some(duration),
        None,
    )
    .unwrap();
    id
}

#[tokio::test]
async fn update_then_get_roundtrip() {
    let (harness, addr) = TestHarness::with_server().await;
    let (token, _) = register_user(addr, "u", "password").await;
    let media_id = seed_watchable(&harness, "/m.mp4", 3600.0).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/metadata/watch/progress"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "mediaItemId": media_id,
            "currentTime": 1800.0,
            "duration": 3600.0,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("http://{addr}/api/watch/progress/{media_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!((body["positionSecs"].as_f64().unwrap() - 1800.0).abs() < 1e-6);
    assert!((body["durationSecs"].as_f64().unwrap() - 3600.0).abs() < 1e-6);
    assert!((body["progress"].as_f64().unwrap() - 0.5).abs() < 1e-6);
    assert_eq!(body["completed"], false);
}

#[tokio::test]
async fn ninety_five_percent_completes() {
    let (harness, addr) = TestHarness::with_server().await;
    let (token, _) = register_user(addr, "u", "password").await;
    let media_id = seed_watchable(&harness, "/m.mp4", 1000.0).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/metadata/watch/progress"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "mediaItemId": media_id,
            "currentTime": 950.0,
            "duration": 1000.0,
        }))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["completed"], true);
}

#[tokio::test]
async fn mark_watched_then_get_is_complete() {
    let (harness, addr) = TestHarness::with_server().await;
    let (token, _) = register_user(addr, "u", "password").await;
    let media_id = seed_watchable(&harness, "/m.mp4", 5400.0).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/watch/mark-watched/{media_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("http://{addr}/api/watch/progress/{media_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["completed"], true);
    assert_eq!(body["progress"], 1.0);
    assert!((body["positionSecs"].as_f64().unwrap() - 5400.0).abs() < 1e-6);
}

#[tokio::test]
async fn mark_unwatched_removes_record() {
    let (harness, addr) = TestHarness::with_server().await;
    let (token, _) = register_user(addr, "u", "password").await;
    let media_id = seed_watchable(&harness, "/m.mp4", 100.0).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{addr}/api/watch/mark-watched/{media_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    let response = client
        .delete(format!("http://{addr}/api/watch/mark-unwatched/{media_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("http://{addr}/api/watch/progress/{media_id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn continue_watching_orders_by_recency_and_skips_completed() {
    let (harness, addr) = TestHarness::with_server().await;
    let (token, _) = register_user(addr, "u", "password").await;
    let first = seed_watchable(&harness, "/a.mp4", 1000.0).await;
    let second = seed_watchable(&harness, "/b.mp4", 1000.0).await;
    let finished = seed_watchable(&harness, "/c.mp4", 1000.0).await;
    let client = reqwest::Client::new();

    for (id, position) in [(first, 100.0), (second, 200.0)] {
        client
            .post(format!("http://{addr}/api/metadata/watch/progress"))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "mediaItemId": id,
                "currentTime": position,
                "duration": 1000.0,
            }))
            .send()
            .await
            .unwrap();
        // Distinct last-watched timestamps.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    client
        .post(format!("http://{addr}/api/watch/mark-watched/{finished}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("http://{addr}/api/watch/continue-watching"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2, "completed item must be excluded");
    assert_eq!(items[0]["item"]["id"], second, "most recent first");
    assert_eq!(items[1]["item"]["id"], first);
}

#[tokio::test]
async fn stats_aggregate() {
    let (harness, addr) = TestHarness::with_server().await;
    let (token, _) = register_user(addr, "u", "password").await;
    let a = seed_watchable(&harness, "/a.mp4", 1000.0).await;
    let b = seed_watchable(&harness, "/b.mp4", 2000.0).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{addr}/api/metadata/watch/progress"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "mediaItemId": a, "currentTime": 500.0, "duration": 1000.0 }))
        .send()
        .await
        .unwrap();
    client
        .post(format!("http://{addr}/api/watch/mark-watched/{b}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("http://{addr}/api/watch/stats"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["totalItems"], 2);
    assert_eq!(body["completedItems"], 1);
    assert_eq!(body["inProgressItems"], 1);
    assert!((body["totalWatchedSecs"].as_f64().unwrap() - 2500.0).abs() < 1e-6);
}

#[tokio::test]
async fn watch_records_are_per_user() {
    let (harness, addr) = TestHarness::with_server().await;
    let (alice, _) = register_user(addr, "alice", "password").await;
    let (bob, _) = register_user(addr, "bob", "password").await;
    let media_id = seed_watchable(&harness, "/m.mp4", 1000.0).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{addr}/api/watch/mark-watched/{media_id}"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("http://{addr}/api/watch/progress/{media_id}"))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404, "bob has no record of alice's watch");
}
