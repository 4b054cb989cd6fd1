//! Authentication flow tests: register/login/verify round trips and the
//! missing-vs-invalid credential distinction.

mod common;

use common::{register_user, TestHarness};

#[tokio::test]
async fn register_login_verify_roundtrip() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let (register_token, _) = register_user(addr, "alice", "password123").await;

    // Login with the same credentials.
    let response = client
        .post(format!("http://{addr}/api/auth/login"))
        .json(&serde_json::json!({ "username": "alice", "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let login_token = body["token"].as_str().unwrap().to_string();

    // Both tokens pass verification.
    for token in [register_token.as_str(), login_token.as_str()] {
        let response = client
            .get(format!("http://{addr}/api/auth/verify"))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["valid"], true);
        assert_eq!(body["user"]["username"], "alice");
    }
}

#[tokio::test]
async fn first_user_is_admin_second_is_not() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    register_user(addr, "root", "password").await;
    let (token, _) = register_user(addr, "guest", "password").await;

    let response = client
        .get(format!("http://{addr}/api/auth/verify"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["user"]["isAdmin"], false);
}

#[tokio::test]
async fn duplicate_username_is_conflict() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    register_user(addr, "dup", "password").await;
    let response = client
        .post(format!("http://{addr}/api/auth/register"))
        .json(&serde_json::json!({ "username": "dup", "password": "other" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn invalid_registration_is_rejected() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    for payload in [
        serde_json::json!({ "username": "", "password": "password" }),
        serde_json::json!({ "username": "ok", "password": "x" }),
    ] {
        let response = client
            .post(format!("http://{addr}/api/auth/register"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }
}

#[tokio::test]
async fn bad_login_is_unauthorized_without_detail() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    register_user(addr, "carol", "rightpass").await;

    // Wrong password and unknown user produce the same response.
    let mut bodies = Vec::new();
    for (user, pass) in [("carol", "wrongpass"), ("nobody", "whatever")] {
        let response = client
            .post(format!("http://{addr}/api/auth/login"))
            .json(&serde_json::json!({ "username": user, "password": pass }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
        bodies.push(response.json::<serde_json::Value>().await.unwrap());
    }
    assert_eq!(bodies[0]["error"], bodies[1]["error"]);
}

#[tokio::test]
async fn missing_credential_is_401_invalid_is_403() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/api/library/movies"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .get(format!("http://{addr}/api/library/movies"))
        .bearer_auth("definitely.not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn token_accepted_via_query_parameter() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let (token, _) = register_user(addr, "dave", "password").await;

    let response = client
        .get(format!("http://{addr}/api/library/movies?token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn admin_routes_are_gated() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let (admin_token, _) = register_user(addr, "admin", "password").await;
    let (user_token, _) = register_user(addr, "pleb", "password").await;

    let response = client
        .get(format!("http://{addr}/api/admin/users"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = client
        .get(format!("http://{addr}/api/admin/users"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["count"], 2);
}
