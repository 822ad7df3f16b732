use std::{borrow::Cow, error::Error as StdError, fmt};

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{password::PasswordError, repository::RepositoryError};

/// ErrorKind
///
/// Classification of every failure the API can report. Each kind maps to exactly one
/// HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    UnprocessableEntity,
    TooManyRequests,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// AppError
///
/// The single error type returned by services and handlers. Carries a client-facing
/// message, an optional list of validation messages and an optional source error that is
/// logged but never serialised.
pub struct AppError {
    kind: ErrorKind,
    message: Cow<'static, str>,
    details: Option<Vec<String>>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn too_many_requests(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::TooManyRequests, message)
    }

    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// 422 carrying one message per failed field rule.
    pub fn validation(details: Vec<String>) -> Self {
        Self {
            details: Some(details),
            ..Self::new(ErrorKind::UnprocessableEntity, "Validation failed")
        }
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&[String]> {
        self.details.as_deref()
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("AppError");
        builder.field("kind", &self.kind);
        builder.field("message", &self.message);
        if let Some(details) = &self.details {
            builder.field("details", details);
        }
        if let Some(source) = &self.source {
            builder.field("source", source);
        }
        builder.finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// ErrorEnvelope
///
/// Uniform JSON body of every error response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub status: String,
    pub message: String,
    #[schema(value_type = Object)]
    pub errors: Value,
    pub timestamp: String,
    pub path: String,
}

impl ErrorEnvelope {
    fn from_error(error: &AppError) -> Self {
        let errors = match (&error.details, error.kind) {
            (Some(details), _) => Value::from(details.clone()),
            (None, ErrorKind::Internal) => Value::Null,
            (None, _) => Value::String(error.message.to_string()),
        };

        Self {
            status: "error".to_string(),
            message: error.message.to_string(),
            errors,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            // Filled in by `stamp_error_path`, which knows the request URI.
            path: String::new(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.kind == ErrorKind::Internal {
            tracing::error!(error = ?self, "request failed with an internal error");
        } else {
            tracing::debug!(kind = ?self.kind, message = %self.message, "request rejected");
        }

        let envelope = ErrorEnvelope::from_error(&self);
        let mut response = (self.status(), Json(envelope.clone())).into_response();
        response.extensions_mut().insert(envelope);
        response
    }
}

/// stamp_error_path
///
/// Outer middleware that rewrites error envelopes produced anywhere below it so their
/// `path` field carries the original request path and query.
pub async fn stamp_error_path(request: Request, next: Next) -> Response {
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let mut response = next.run(request).await;

    match response.extensions_mut().remove::<ErrorEnvelope>() {
        Some(mut envelope) => {
            envelope.path = path;
            (response.status(), Json(envelope)).into_response()
        }
        None => response,
    }
}

/// Fallback for unmatched routes.
pub async fn route_not_found(request: Request) -> AppError {
    AppError::not_found(format!(
        "Cannot {} {}",
        request.method(),
        request.uri().path()
    ))
}

/// Response for a panicking handler, installed through `CatchPanicLayer`.
pub fn panic_response(_panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    AppError::internal("Internal server error").into_response()
}

// --- Conversions from lower layers ---

impl From<RepositoryError> for AppError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::UniqueViolation(constraint) => {
                AppError::conflict(format!("Duplicate value violates {constraint}"))
            }
            other => AppError::internal("Internal server error").with_source(other),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(error: PasswordError) -> Self {
        AppError::internal("Internal server error").with_source(error)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let kind = match rejection {
            JsonRejection::JsonDataError(_) => ErrorKind::UnprocessableEntity,
            _ => ErrorKind::BadRequest,
        };
        AppError::new(kind, rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

// --- Extractors that reject with the error envelope ---

/// `Json` whose rejection is an [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Query` whose rejection is an [`AppError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// `Path` whose rejection is an [`AppError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_echo_the_message_in_errors() {
        let envelope = ErrorEnvelope::from_error(&AppError::not_found("Article not found"));
        assert_eq!(envelope.status, "error");
        assert_eq!(envelope.errors, Value::String("Article not found".into()));
    }

    #[test]
    fn internal_errors_hide_details() {
        let envelope = ErrorEnvelope::from_error(&AppError::internal("Internal server error"));
        assert_eq!(envelope.errors, Value::Null);
    }

    #[test]
    fn validation_errors_list_every_message() {
        let error = AppError::validation(vec!["a".into(), "b".into()]);
        assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let envelope = ErrorEnvelope::from_error(&error);
        assert_eq!(envelope.errors, serde_json::json!(["a", "b"]));
    }
}
