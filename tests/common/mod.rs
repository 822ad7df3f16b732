#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use conduit_api::{AppConfig, AppState, MemoryRepository, RepositoryState, create_router};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Router over a fresh in-memory repository, with handles to both for assertions.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryRepository>,
    pub state: AppState,
}

pub fn test_app() -> TestApp {
    test_app_with(AppConfig::default())
}

pub fn test_app_with(config: AppConfig) -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let state = AppState::new(repo.clone() as RepositoryState, config);
    TestApp {
        router: create_router(state.clone()),
        repo,
        state,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    /// Sends one request through the full middleware stack.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Registers `username` with `<username>@conduit.test` / `password123` and returns the
    /// issued token.
    pub async fn register(&self, username: &str) -> String {
        let response = self
            .post(
                "/users",
                None,
                json!({ "user": {
                    "username": username,
                    "email": format!("{username}@conduit.test"),
                    "password": "password123"
                }}),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["user"]["token"]
            .as_str()
            .expect("token in user envelope")
            .to_string()
    }

    /// Creates an article and returns the `article` object of the response.
    pub async fn create_article(&self, token: &str, title: &str, tags: &[&str]) -> Value {
        let response = self
            .post(
                "/articles",
                Some(token),
                json!({ "article": {
                    "title": title,
                    "description": format!("About {title}"),
                    "body": format!("All about {title}."),
                    "tagList": tags
                }}),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["article"].clone()
    }
}

/// Asserts the standard error envelope.
pub fn assert_error(response: &TestResponse, status: StatusCode, message: &str) {
    assert_eq!(response.status, status, "{}", response.body);
    assert_eq!(response.body["status"], "error");
    assert_eq!(response.body["message"], message);
    assert!(response.body["timestamp"].is_string());
    assert!(response.body["path"].is_string());
}
