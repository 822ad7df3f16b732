use crate::{
    AppState,
    auth::{AuthUser, ClientIp},
    error::{AppJson, AppPath, AppQuery, AppResult, ErrorEnvelope},
    models::{
        ArticleEnvelope, ArticleListEnvelope, ArticleQuery, CommentEnvelope, FeedQuery,
        CommentListEnvelope, CreateArticleRequest, CreateCommentRequest, LoginUserRequest,
        MessageResponse, ProfileEnvelope, RegisterUserRequest, TagListEnvelope,
        UpdateArticleRequest, UpdateUserRequest, UserEnvelope,
    },
    services::{articles, comments, profiles, users},
};
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

// --- Health ---

/// health
///
/// [Public Route] Liveness check that also round-trips the database.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database reachable", body = HealthResponse),
        (status = 500, description = "Database unreachable", body = ErrorEnvelope)
    )
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    state.repo.ping().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

// --- Users & Auth ---

/// register_user
///
/// [Public Route] Creates an account and returns it with a signed token.
#[utoipa::path(
    post,
    path = "/users",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "User registered", body = UserEnvelope),
        (status = 409, description = "Email already exists", body = ErrorEnvelope),
        (status = 422, description = "Validation failed", body = ErrorEnvelope)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<UserEnvelope>)> {
    let user = users::register(
        state.repo.as_ref(),
        &state.config,
        state.hasher,
        payload.user,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(UserEnvelope { user })))
}

/// login_user
///
/// [Public Route] Exchanges credentials for a token. Attempts are rate limited per client
/// IP and email.
#[utoipa::path(
    post,
    path = "/users/login",
    request_body = LoginUserRequest,
    responses(
        (status = 200, description = "Logged in", body = UserEnvelope),
        (status = 401, description = "Invalid credentials", body = ErrorEnvelope),
        (status = 429, description = "Too many login attempts", body = ErrorEnvelope)
    )
)]
pub async fn login_user(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    AppJson(payload): AppJson<LoginUserRequest>,
) -> AppResult<Json<UserEnvelope>> {
    let user = users::login(
        state.repo.as_ref(),
        &state.config,
        &state.login_limiter,
        &client_ip,
        payload.user,
    )
    .await?;
    Ok(Json(UserEnvelope { user }))
}

/// get_current_user
///
/// [Authenticated Route] The caller's account, echoing the presented token.
#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "Current user", body = UserEnvelope),
        (status = 401, description = "Missing or invalid token", body = ErrorEnvelope)
    )
)]
pub async fn get_current_user(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserEnvelope>> {
    let user = users::current_user(state.repo.as_ref(), &auth).await?;
    Ok(Json(UserEnvelope { user }))
}

/// update_current_user
///
/// [Authenticated Route] Partial update of the caller's account.
#[utoipa::path(
    put,
    path = "/user",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserEnvelope),
        (status = 409, description = "Email already exists", body = ErrorEnvelope),
        (status = 422, description = "Validation failed", body = ErrorEnvelope)
    )
)]
pub async fn update_current_user(
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<UserEnvelope>> {
    let user = users::update_user(
        state.repo.as_ref(),
        &state.config,
        state.hasher,
        &auth,
        payload.user,
    )
    .await?;
    Ok(Json(UserEnvelope { user }))
}

// --- Profiles ---

#[utoipa::path(
    get,
    path = "/profiles/{username}",
    params(("username" = String, Path, description = "Username of the profile")),
    responses(
        (status = 200, description = "Profile", body = ProfileEnvelope),
        (status = 404, description = "Profile not found", body = ErrorEnvelope)
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
) -> AppResult<Json<ProfileEnvelope>> {
    let profile = profiles::get_profile(state.repo.as_ref(), &username).await?;
    Ok(Json(ProfileEnvelope { profile }))
}

// --- Articles ---

/// list_articles
///
/// [Public Route] Filtered, paginated listing. A valid token adds the caller's favorite
/// state; an invalid one is ignored.
#[utoipa::path(
    get,
    path = "/articles",
    params(ArticleQuery),
    responses((status = 200, description = "Articles, newest first", body = ArticleListEnvelope))
)]
pub async fn list_articles(
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ArticleQuery>,
) -> AppResult<Json<ArticleListEnvelope>> {
    let page =
        articles::list_articles(state.repo.as_ref(), viewer.map(|u| u.id), query).await?;
    Ok(Json(page))
}

/// feed_articles
///
/// [Authenticated Route] Articles from followed authors. Following is not supported, so
/// the feed is empty.
#[utoipa::path(
    get,
    path = "/articles/feed",
    params(FeedQuery),
    responses(
        (status = 200, description = "Always an empty page", body = ArticleListEnvelope),
        (status = 401, description = "Missing or invalid token", body = ErrorEnvelope)
    )
)]
pub async fn feed_articles(
    auth: AuthUser,
    AppQuery(query): AppQuery<FeedQuery>,
) -> AppResult<Json<ArticleListEnvelope>> {
    Ok(Json(articles::feed_articles(auth.id, query)))
}

#[utoipa::path(
    get,
    path = "/articles/{slug}",
    params(("slug" = String, Path, description = "Article slug")),
    responses(
        (status = 200, description = "Article", body = ArticleEnvelope),
        (status = 404, description = "Article not found", body = ErrorEnvelope)
    )
)]
pub async fn get_article(
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> AppResult<Json<ArticleEnvelope>> {
    let article =
        articles::get_article(state.repo.as_ref(), &slug, viewer.map(|u| u.id)).await?;
    Ok(Json(ArticleEnvelope { article }))
}

/// create_article
///
/// [Authenticated Route] Publishes an article. The slug is derived from the title and made
/// unique with a numeric suffix.
#[utoipa::path(
    post,
    path = "/articles",
    request_body = CreateArticleRequest,
    responses(
        (status = 201, description = "Article created", body = ArticleEnvelope),
        (status = 422, description = "Validation failed", body = ErrorEnvelope)
    )
)]
pub async fn create_article(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateArticleRequest>,
) -> AppResult<(StatusCode, Json<ArticleEnvelope>)> {
    let article = articles::create_article(state.repo.as_ref(), user_id, payload.article).await?;
    Ok((StatusCode::CREATED, Json(ArticleEnvelope { article })))
}

#[utoipa::path(
    put,
    path = "/articles/{slug}",
    params(("slug" = String, Path, description = "Article slug")),
    request_body = UpdateArticleRequest,
    responses(
        (status = 200, description = "Article updated", body = ArticleEnvelope),
        (status = 403, description = "Not the author", body = ErrorEnvelope),
        (status = 404, description = "Article not found", body = ErrorEnvelope)
    )
)]
pub async fn update_article(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
    AppJson(payload): AppJson<UpdateArticleRequest>,
) -> AppResult<Json<ArticleEnvelope>> {
    let article =
        articles::update_article(state.repo.as_ref(), user_id, &slug, payload.article).await?;
    Ok(Json(ArticleEnvelope { article }))
}

#[utoipa::path(
    delete,
    path = "/articles/{slug}",
    params(("slug" = String, Path, description = "Article slug")),
    responses(
        (status = 200, description = "Article deleted", body = MessageResponse),
        (status = 403, description = "Not the author", body = ErrorEnvelope),
        (status = 404, description = "Article not found", body = ErrorEnvelope)
    )
)]
pub async fn delete_article(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    articles::delete_article(state.repo.as_ref(), user_id, &slug).await?;
    Ok(Json(MessageResponse::new("Article deleted successfully")))
}

// --- Favorites ---

/// favorite_article
///
/// [Authenticated Route] Idempotent: favoriting an already favorited article is a no-op.
#[utoipa::path(
    post,
    path = "/articles/{slug}/favorite",
    params(("slug" = String, Path, description = "Article slug")),
    responses(
        (status = 200, description = "Article with updated favorite state", body = ArticleEnvelope),
        (status = 404, description = "Article not found", body = ErrorEnvelope)
    )
)]
pub async fn favorite_article(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> AppResult<Json<ArticleEnvelope>> {
    let article = articles::favorite_article(state.repo.as_ref(), user_id, &slug).await?;
    Ok(Json(ArticleEnvelope { article }))
}

#[utoipa::path(
    delete,
    path = "/articles/{slug}/favorite",
    params(("slug" = String, Path, description = "Article slug")),
    responses(
        (status = 200, description = "Article with updated favorite state", body = ArticleEnvelope),
        (status = 404, description = "Article not found", body = ErrorEnvelope)
    )
)]
pub async fn unfavorite_article(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> AppResult<Json<ArticleEnvelope>> {
    let article = articles::unfavorite_article(state.repo.as_ref(), user_id, &slug).await?;
    Ok(Json(ArticleEnvelope { article }))
}

// --- Comments ---

#[utoipa::path(
    get,
    path = "/articles/{slug}/comments",
    params(("slug" = String, Path, description = "Article slug")),
    responses(
        (status = 200, description = "Comments, newest first", body = CommentListEnvelope),
        (status = 404, description = "Article not found", body = ErrorEnvelope)
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> AppResult<Json<CommentListEnvelope>> {
    let comments = comments::list_comments(state.repo.as_ref(), &slug).await?;
    Ok(Json(CommentListEnvelope { comments }))
}

#[utoipa::path(
    post,
    path = "/articles/{slug}/comments",
    params(("slug" = String, Path, description = "Article slug")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = CommentEnvelope),
        (status = 404, description = "Article not found", body = ErrorEnvelope)
    )
)]
pub async fn add_comment(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
    AppJson(payload): AppJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CommentEnvelope>)> {
    let comment =
        comments::add_comment(state.repo.as_ref(), user_id, &slug, payload.comment).await?;
    Ok((StatusCode::CREATED, Json(CommentEnvelope { comment })))
}

/// delete_comment
///
/// [Authenticated Route] Only the comment's author may delete it, and only through the
/// article it belongs to.
#[utoipa::path(
    delete,
    path = "/articles/{slug}/comments/{id}",
    params(
        ("slug" = String, Path, description = "Article slug"),
        ("id" = i64, Path, description = "Comment id")
    ),
    responses(
        (status = 200, description = "Comment deleted", body = MessageResponse),
        (status = 403, description = "Not the author", body = ErrorEnvelope),
        (status = 404, description = "Article or comment not found", body = ErrorEnvelope)
    )
)]
pub async fn delete_comment(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppPath((slug, comment_id)): AppPath<(String, i64)>,
) -> AppResult<Json<MessageResponse>> {
    comments::delete_comment(state.repo.as_ref(), user_id, &slug, comment_id).await?;
    Ok(Json(MessageResponse::new("Comment deleted successfully")))
}

// --- Tags ---

#[utoipa::path(
    get,
    path = "/tags",
    responses((status = 200, description = "All tags, sorted by name", body = TagListEnvelope))
)]
pub async fn list_tags(State(state): State<AppState>) -> AppResult<Json<TagListEnvelope>> {
    let tags = articles::list_tags(state.repo.as_ref()).await?;
    Ok(Json(TagListEnvelope { tags }))
}
