use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token. Article, profile and comment reads resolve an
/// optional `AuthUser` themselves, so a bad token degrades to an anonymous request
/// instead of a 401.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe; also checks the database answers.
        .route("/health", get(handlers::health))
        // POST /users
        .route("/users", post(handlers::register_user))
        // POST /users/login
        // Rate limited per client IP and attempted email.
        .route("/users/login", post(handlers::login_user))
        // GET /profiles/{username}
        .route("/profiles/{username}", get(handlers::get_profile))
        // GET /articles?tag=&author=&favorited=&limit=&offset=
        .route("/articles", get(handlers::list_articles))
        // GET /articles/{slug}
        .route("/articles/{slug}", get(handlers::get_article))
        // GET /articles/{slug}/comments
        .route("/articles/{slug}/comments", get(handlers::list_comments))
        // GET /tags
        .route("/tags", get(handlers::list_tags))
}
