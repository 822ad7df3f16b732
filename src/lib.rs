use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod rate_limit;
pub mod repository;
pub mod services;
pub mod slug;

// Public routes with optional auth, and routes behind `auth_middleware`.
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use password::PasswordHasherConfig;
pub use rate_limit::{LoginRateLimiter, RateLimitConfig};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document assembled from the `#[utoipa::path]` handlers and the `ToSchema`
/// models. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::register_user, handlers::login_user,
        handlers::get_current_user, handlers::update_current_user, handlers::get_profile,
        handlers::list_articles, handlers::feed_articles, handlers::get_article,
        handlers::create_article,
        handlers::update_article, handlers::delete_article, handlers::favorite_article,
        handlers::unfavorite_article, handlers::list_comments, handlers::add_comment,
        handlers::delete_comment, handlers::list_tags
    ),
    components(
        schemas(
            models::RegisterUserRequest, models::RegisterUser, models::LoginUserRequest,
            models::LoginUser, models::UpdateUserRequest, models::UpdateUser,
            models::UserEnvelope, models::UserView, models::ProfileEnvelope, models::Profile,
            models::CreateArticleRequest, models::CreateArticle, models::UpdateArticleRequest,
            models::UpdateArticle, models::ArticleEnvelope, models::ArticleListEnvelope,
            models::ArticleView, models::CreateCommentRequest, models::CreateComment,
            models::CommentEnvelope, models::CommentListEnvelope, models::CommentView,
            models::TagListEnvelope, models::MessageResponse, error::ErrorEnvelope,
            handlers::HealthResponse,
        )
    ),
    tags(
        (name = "conduit", description = "Medium-style publishing API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Shared, cheaply cloneable container for everything the handlers need. The rate
/// limiter is the only piece of mutable state and lives behind its own mutex.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub config: AppConfig,
    pub hasher: PasswordHasherConfig,
    pub login_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    /// Builds the state with the default login limit of five attempts per minute.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            hasher: PasswordHasherConfig::new(config.password_hash_cost),
            login_limiter: Arc::new(LoginRateLimiter::new(RateLimitConfig::default())),
            repo,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards `authenticated_routes`. A failed `AuthUser` extraction rejects the request with
/// the 401 envelope before any handler runs; on success the identity is stored in the
/// request extensions so the handler's own `AuthUser` does not hit the database again.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// create_router
///
/// Assembles every route, the auth layer, error shaping and the observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .fallback(error::route_not_found)
        .with_state(state);

    base_router
        // Innermost: a panicking handler still answers with the 500 envelope.
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(middleware::from_fn(error::stamp_error_path))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the `http_request` span for `TraceLayer`, tagged with method, URI and the
/// request id set by `SetRequestIdLayer`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
