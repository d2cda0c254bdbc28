mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use common::{CaptureMailer, mailer, seed_user, test_config, test_store};
use pawgate::services::ActionTokenKind;

const PASSWORD: &str = "correct horse battery";

async fn spawn_app() -> (Router, Arc<CaptureMailer>) {
    let config = test_config();
    let store = test_store(&config).await;
    seed_user(&store, &config, "root", PASSWORD, true).await;
    seed_user(&store, &config, "alice", PASSWORD, false).await;

    let mail = mailer();
    let state = pawgate::api::create_app_state(config, store, mail.clone(), None)
        .expect("Failed to create app state");
    (pawgate::api::router(state), mail)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn json_of(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    json_of(&body)["data"]["session_token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let (app, _) = spawn_app().await;

    let (status, body) = send(&app, "GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_of(&body)["error"], "Unauthorized");

    let (status, _) = send(&app, "GET", "/api/auth/me", Some("not.a.jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = login(&app, "alice", PASSWORD).await;
    let (status, body) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_of(&body);
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["is_admin"], false);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let (app, _) = spawn_app().await;

    let unknown = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "nobody", "password": PASSWORD })),
    )
    .await;
    let wrong = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong password" })),
    )
    .await;

    assert_eq!(unknown.0, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, wrong);
    assert_eq!(json_of(&unknown.1)["error"], "Invalid username or password");
}

async fn attempt(app: &Router, password: &str) -> (StatusCode, Vec<u8>) {
    send(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": password })),
    )
    .await
}

#[tokio::test]
async fn locked_account_looks_like_a_wrong_password() {
    let (app, _) = spawn_app().await;

    let mut failures = Vec::new();
    for _ in 0..5 {
        failures.push(attempt(&app, "wrong password").await);
    }
    let locked = attempt(&app, PASSWORD).await;

    assert!(failures.iter().all(|f| *f == locked));
}

#[tokio::test]
async fn forgot_password_response_does_not_reveal_accounts() {
    let (app, mail) = spawn_app().await;

    let known = send(
        &app,
        "POST",
        "/api/auth/forgot-password",
        None,
        Some(json!({ "email": "alice@shelter.org" })),
    )
    .await;
    let unknown = send(
        &app,
        "POST",
        "/api/auth/forgot-password",
        None,
        Some(json!({ "email": "ghost@shelter.org" })),
    )
    .await;

    assert_eq!(known.0, StatusCode::OK);
    assert_eq!(known, unknown);
    assert_eq!(mail.wait_for(1).await.to, "alice@shelter.org");
}

#[tokio::test]
async fn reset_over_http_is_single_use() {
    let (app, mail) = spawn_app().await;

    send(
        &app,
        "POST",
        "/api/auth/forgot-password",
        None,
        Some(json!({ "email": "alice@shelter.org" })),
    )
    .await;
    let token = mail.token(1, ActionTokenKind::Reset).await;
    let body = json!({ "token": token, "new_password": "brand new secret" });

    let (status, _) = send(&app, "POST", "/api/auth/reset-password", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    login(&app, "alice", "brand new secret").await;

    let (status, reused) = send(&app, "POST", "/api/auth/reset-password", None, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&reused)["error"], "Invalid or expired token");
}

#[tokio::test]
async fn invited_user_completes_setup_and_logs_in() {
    let (app, mail) = spawn_app().await;
    let admin = login(&app, "root", PASSWORD).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/admin/users",
        Some(&admin),
        Some(json!({ "username": "bea", "email": "bea@shelter.org" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["data"]["requires_password_setup"], true);

    let token = mail.token(1, ActionTokenKind::Setup).await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/setup-password",
        None,
        Some(json!({ "token": token, "new_password": "first password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let bea = login(&app, "bea", "first password").await;
    let (_, me) = send(&app, "GET", "/api/auth/me", Some(&bea), None).await;
    assert_eq!(json_of(&me)["data"]["requires_password_setup"], false);
}

#[tokio::test]
async fn admin_routes_are_forbidden_to_volunteers() {
    let (app, _) = spawn_app().await;
    let alice = login(&app, "alice", PASSWORD).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/admin/users",
        Some(&alice),
        Some(json!({ "username": "eve", "email": "eve@shelter.org" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_of(&body)["error"], "Forbidden");

    let (status, _) = send(&app, "GET", "/api/metrics", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn user_listing_is_admin_only() {
    let (app, _) = spawn_app().await;
    let admin = login(&app, "root", PASSWORD).await;
    let alice = login(&app, "alice", PASSWORD).await;

    let (status, body) = send(&app, "GET", "/api/admin/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_of(&body);
    let names: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["alice", "root"]);
    assert!(body["data"][0].get("password_hash").is_none());

    let (status, _) = send(&app, "GET", "/api/admin/users", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn group_membership_over_http() {
    let (app, _) = spawn_app().await;
    let admin = login(&app, "root", PASSWORD).await;
    let alice = login(&app, "alice", PASSWORD).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/groups",
        Some(&admin),
        Some(json!({ "name": "Dog Walkers" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let group = json_of(&body)["data"]["id"].as_i64().unwrap();
    let members_uri = format!("/api/groups/{group}/members");

    let (status, _) = send(&app, "GET", &members_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, me) = send(&app, "GET", "/api/auth/me", Some(&alice), None).await;
    let alice_id = json_of(&me)["data"]["id"].as_i64().unwrap();
    let (status, _) = send(
        &app,
        "POST",
        &members_uri,
        Some(&admin),
        Some(json!({ "user_id": alice_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", &members_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["data"][0]["username"], "alice");

    let (status, _) = send(&app, "GET", "/api/groups/4242/members", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", "/api/groups/4242/members", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_security_headers() {
    let (app, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["cache-control"], "no-store");
}
