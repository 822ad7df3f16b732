use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    ArticleChanges, ArticleFilter, ArticleRecord, CommentRecord, NewArticle, NewUser, Tag, User,
    UserChanges,
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Unique constraint guarding `users.email`.
pub const USERS_EMAIL_KEY: &str = "users_email_key";

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A write collided with a unique constraint, identified by name.
    #[error("unique constraint `{0}` violated")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &error {
            if db.is_unique_violation() {
                return RepositoryError::UniqueViolation(
                    db.constraint().unwrap_or("unknown").to_string(),
                );
            }
        }
        RepositoryError::Database(error)
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// Persistence contract used by the services. Implementations must honour the relational
/// rules of the schema: unique emails, slugs and tag names, one favorite per
/// (article, user) pair, and cascading deletes from users and articles. Tags are never
/// removed when the articles referencing them go away.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn ping(&self) -> RepoResult<()>;

    // --- Users ---
    async fn find_user_by_id(&self, id: i64) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    /// Applies the present fields. `None` when the user no longer exists.
    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<Option<User>>;

    // --- Articles ---
    async fn find_article_by_id(&self, id: i64) -> RepoResult<Option<ArticleRecord>>;
    async fn find_article_by_slug(&self, slug: &str) -> RepoResult<Option<ArticleRecord>>;
    /// Whether `slug` belongs to an article other than `exclude`.
    async fn slug_taken(&self, slug: &str, exclude: Option<i64>) -> RepoResult<bool>;
    /// Inserts the article and returns its id.
    async fn create_article(&self, article: NewArticle) -> RepoResult<i64>;
    async fn update_article(&self, id: i64, changes: ArticleChanges) -> RepoResult<()>;
    /// Deletes the article with its comments, favorites and tag links.
    async fn delete_article(&self, id: i64) -> RepoResult<bool>;
    /// One page of matching articles, newest first, plus the total match count.
    async fn list_articles(&self, filter: &ArticleFilter) -> RepoResult<(Vec<ArticleRecord>, i64)>;

    // --- Tags ---
    /// Resolves each name to a tag row, inserting missing ones. Output follows input order.
    async fn find_or_create_tags(&self, names: &[String]) -> RepoResult<Vec<Tag>>;
    /// Replaces the tag links of an article.
    async fn set_article_tags(&self, article_id: i64, tag_ids: &[i64]) -> RepoResult<()>;
    async fn list_tags(&self) -> RepoResult<Vec<String>>;

    // --- Favorites ---
    /// Insert-if-absent. Returns true when a row was added.
    async fn add_favorite(&self, article_id: i64, user_id: i64) -> RepoResult<bool>;
    async fn remove_favorite(&self, article_id: i64, user_id: i64) -> RepoResult<bool>;
    /// Favorite totals keyed by article id. Articles without favorites are absent.
    async fn favorite_counts(&self, article_ids: &[i64]) -> RepoResult<HashMap<i64, i64>>;
    /// The subset of `article_ids` favorited by `user_id`.
    async fn favorited_by(&self, user_id: i64, article_ids: &[i64]) -> RepoResult<HashSet<i64>>;

    // --- Comments ---
    async fn create_comment(
        &self,
        article_id: i64,
        author_id: i64,
        body: &str,
    ) -> RepoResult<CommentRecord>;
    /// Comments on an article, newest first.
    async fn list_comments(&self, article_id: i64) -> RepoResult<Vec<CommentRecord>>;
    async fn find_comment(&self, id: i64) -> RepoResult<Option<CommentRecord>>;
    async fn delete_comment(&self, id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// Shared handle to the persistence layer held in application state.
pub type RepositoryState = Arc<dyn Repository>;
