mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use common::{assert_error, test_app};
use serde_json::{Value, json};

#[tokio::test]
async fn unknown_routes_answer_with_the_error_envelope() {
    let app = test_app();
    let response = app.get("/nope?x=1", None).await;

    assert_error(&response, StatusCode::NOT_FOUND, "Cannot GET /nope");
    assert_eq!(response.body["path"], "/nope?x=1");
    assert_eq!(response.body["errors"], "Cannot GET /nope");
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["status"], "error");
    assert_eq!(response.body["path"], "/users");
}

#[tokio::test]
async fn json_of_the_wrong_shape_is_unprocessable() {
    let app = test_app();
    let response = app
        .post("/users", None, json!({ "user": { "username": 42 }}))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["status"], "error");
}

#[tokio::test]
async fn timestamps_are_iso_with_millis() {
    let app = test_app();
    let response = app.get("/articles/missing", None).await;
    let timestamp = response.body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    assert!(timestamp.ends_with('Z'));
    // YYYY-MM-DDTHH:MM:SS.mmmZ
    assert_eq!(timestamp.len(), 24);
}

#[tokio::test]
async fn profile_lookup() {
    let app = test_app();
    app.register("jake").await;

    let found = app.get("/profiles/jake", None).await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(
        found.body,
        json!({ "profile": { "username": "jake", "bio": null, "image": null, "following": false }})
    );

    let missing = app.get("/profiles/nobody", None).await;
    assert_error(&missing, StatusCode::NOT_FOUND, "Profile not found");
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app();
    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = test_app();
    let response = app.get("/tags", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "tags": [] }));
    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn successful_responses_are_not_rewritten() {
    let app = test_app();
    app.register("jake").await;
    let response = app.get("/profiles/jake", None).await;
    assert!(response.body.get("path").is_none());
    assert_ne!(response.body["profile"], Value::Null);
}
