use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind `auth_middleware`, which rejects the request with a 401
/// envelope unless a valid token for an existing user is presented. Ownership checks
/// (author-only updates and deletes) happen in the services.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /user
        .route(
            "/user",
            get(handlers::get_current_user).put(handlers::update_current_user),
        )
        // POST /articles
        .route("/articles", post(handlers::create_article))
        // GET /articles/feed
        // Static segment, so it wins over /articles/{slug}.
        .route("/articles/feed", get(handlers::feed_articles))
        // PUT/DELETE /articles/{slug}
        // Author only.
        .route(
            "/articles/{slug}",
            put(handlers::update_article).delete(handlers::delete_article),
        )
        // POST/DELETE /articles/{slug}/favorite
        // Favoriting is idempotent.
        .route(
            "/articles/{slug}/favorite",
            post(handlers::favorite_article).delete(handlers::unfavorite_article),
        )
        // POST /articles/{slug}/comments
        .route("/articles/{slug}/comments", post(handlers::add_comment))
        // DELETE /articles/{slug}/comments/{id}
        // Comment author only; the comment must belong to the article.
        .route(
            "/articles/{slug}/comments/{id}",
            delete(handlers::delete_comment),
        )
}
