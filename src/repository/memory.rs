use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{RepoResult, Repository, RepositoryError, USERS_EMAIL_KEY};
use crate::models::{
    ArticleChanges, ArticleFilter, ArticleRecord, CommentRecord, NewArticle, NewUser, Tag, User,
    UserChanges,
};

#[derive(Debug, Clone)]
struct ArticleRow {
    id: i64,
    slug: String,
    title: String,
    description: String,
    body: String,
    author_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CommentRow {
    id: i64,
    body: String,
    article_id: i64,
    author_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    articles: Vec<ArticleRow>,
    tags: Vec<Tag>,
    article_tags: Vec<(i64, i64)>,
    favorites: Vec<(i64, i64)>,
    comments: Vec<CommentRow>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn article_record(&self, row: &ArticleRow) -> Option<ArticleRecord> {
        let author = self.user(row.author_id)?;
        let mut tag_list: Vec<String> = self
            .article_tags
            .iter()
            .filter(|(article_id, _)| *article_id == row.id)
            .filter_map(|(_, tag_id)| self.tags.iter().find(|t| t.id == *tag_id))
            .map(|t| t.name.clone())
            .collect();
        tag_list.sort();

        Some(ArticleRecord {
            id: row.id,
            slug: row.slug.clone(),
            title: row.title.clone(),
            description: row.description.clone(),
            body: row.body.clone(),
            author_id: author.id,
            author_username: author.username.clone(),
            author_bio: author.bio.clone(),
            author_image: author.image.clone(),
            tag_list,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn comment_record(&self, row: &CommentRow) -> Option<CommentRecord> {
        let author = self.user(row.author_id)?;
        Some(CommentRecord {
            id: row.id,
            body: row.body.clone(),
            article_id: row.article_id,
            author_id: author.id,
            author_username: author.username.clone(),
            author_bio: author.bio.clone(),
            author_image: author.image.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn matches(&self, row: &ArticleRow, filter: &ArticleFilter) -> bool {
        if let Some(tag) = &filter.tag {
            let tagged = self.article_tags.iter().any(|(article_id, tag_id)| {
                *article_id == row.id
                    && self.tags.iter().any(|t| t.id == *tag_id && &t.name == tag)
            });
            if !tagged {
                return false;
            }
        }
        if let Some(author) = &filter.author {
            if self.user(row.author_id).map(|u| &u.username) != Some(author) {
                return false;
            }
        }
        if let Some(user_id) = filter.favorited_by {
            if !self.favorites.contains(&(row.id, user_id)) {
                return false;
            }
        }
        true
    }

    /// Removes an article and everything that cascades from it.
    fn remove_article(&mut self, id: i64) -> bool {
        let before = self.articles.len();
        self.articles.retain(|a| a.id != id);
        self.article_tags.retain(|(article_id, _)| *article_id != id);
        self.favorites.retain(|(article_id, _)| *article_id != id);
        self.comments.retain(|c| c.article_id != id);
        self.articles.len() != before
    }
}

/// MemoryRepository
///
/// Process-local [`Repository`] with the same constraint and cascade behaviour as the
/// Postgres schema. Used by the test suites and handy for running the API without a
/// database.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deletes a user along with their articles, favorites and comments.
    pub fn delete_user(&self, id: i64) -> bool {
        let mut tables = self.tables();
        let owned: Vec<i64> = tables
            .articles
            .iter()
            .filter(|a| a.author_id == id)
            .map(|a| a.id)
            .collect();
        for article_id in owned {
            tables.remove_article(article_id);
        }
        tables.favorites.retain(|(_, user_id)| *user_id != id);
        tables.comments.retain(|c| c.author_id != id);

        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        tables.users.len() != before
    }

    pub fn comment_count(&self) -> usize {
        self.tables().comments.len()
    }

    pub fn favorite_count(&self) -> usize {
        self.tables().favorites.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }

    // --- USERS ---

    async fn find_user_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.tables().user(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.tables().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut tables = self.tables();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(RepositoryError::UniqueViolation(USERS_EMAIL_KEY.to_string()));
        }

        let now = Utc::now();
        let created = User {
            id: tables.next_id(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            bio: user.bio,
            image: user.image,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<Option<User>> {
        let mut tables = self.tables();
        if let Some(email) = &changes.email {
            if tables.users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(RepositoryError::UniqueViolation(USERS_EMAIL_KEY.to_string()));
            }
        }

        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(bio) = changes.bio {
            user.bio = bio;
        }
        if let Some(image) = changes.image {
            user.image = image;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    // --- ARTICLES ---

    async fn find_article_by_id(&self, id: i64) -> RepoResult<Option<ArticleRecord>> {
        let tables = self.tables();
        Ok(tables
            .articles
            .iter()
            .find(|a| a.id == id)
            .and_then(|row| tables.article_record(row)))
    }

    async fn find_article_by_slug(&self, slug: &str) -> RepoResult<Option<ArticleRecord>> {
        let tables = self.tables();
        Ok(tables
            .articles
            .iter()
            .find(|a| a.slug == slug)
            .and_then(|row| tables.article_record(row)))
    }

    async fn slug_taken(&self, slug: &str, exclude: Option<i64>) -> RepoResult<bool> {
        Ok(self
            .tables()
            .articles
            .iter()
            .any(|a| a.slug == slug && Some(a.id) != exclude))
    }

    async fn create_article(&self, article: NewArticle) -> RepoResult<i64> {
        let mut tables = self.tables();
        if tables.articles.iter().any(|a| a.slug == article.slug) {
            return Err(RepositoryError::UniqueViolation("articles_slug_key".to_string()));
        }
        if tables.user(article.author_id).is_none() {
            return Err(RepositoryError::Database(sqlx::Error::RowNotFound));
        }

        let now = Utc::now();
        let id = tables.next_id();
        tables.articles.push(ArticleRow {
            id,
            slug: article.slug,
            title: article.title,
            description: article.description,
            body: article.body,
            author_id: article.author_id,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn update_article(&self, id: i64, changes: ArticleChanges) -> RepoResult<()> {
        let mut tables = self.tables();
        if let Some(slug) = &changes.slug {
            if tables.articles.iter().any(|a| a.id != id && &a.slug == slug) {
                return Err(RepositoryError::UniqueViolation("articles_slug_key".to_string()));
            }
        }

        if let Some(row) = tables.articles.iter_mut().find(|a| a.id == id) {
            if let Some(slug) = changes.slug {
                row.slug = slug;
            }
            if let Some(title) = changes.title {
                row.title = title;
            }
            if let Some(description) = changes.description {
                row.description = description;
            }
            if let Some(body) = changes.body {
                row.body = body;
            }
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_article(&self, id: i64) -> RepoResult<bool> {
        Ok(self.tables().remove_article(id))
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> RepoResult<(Vec<ArticleRecord>, i64)> {
        let tables = self.tables();
        let mut matching: Vec<&ArticleRow> = tables
            .articles
            .iter()
            .filter(|row| tables.matches(row, filter))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let offset = usize::try_from(filter.offset).unwrap_or(0);
        let limit = usize::try_from(filter.limit).unwrap_or(0);
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|row| tables.article_record(row))
            .collect();

        Ok((page, total))
    }

    // --- TAGS ---

    async fn find_or_create_tags(&self, names: &[String]) -> RepoResult<Vec<Tag>> {
        let mut tables = self.tables();
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let tag = match tables.tags.iter().find(|t| &t.name == name).cloned() {
                Some(existing) => existing,
                None => {
                    let tag = Tag {
                        id: tables.next_id(),
                        name: name.clone(),
                    };
                    tables.tags.push(tag.clone());
                    tag
                }
            };
            resolved.push(tag);
        }
        Ok(resolved)
    }

    async fn set_article_tags(&self, article_id: i64, tag_ids: &[i64]) -> RepoResult<()> {
        let mut tables = self.tables();
        tables.article_tags.retain(|(id, _)| *id != article_id);
        for tag_id in tag_ids {
            if !tables.article_tags.contains(&(article_id, *tag_id)) {
                tables.article_tags.push((article_id, *tag_id));
            }
        }
        Ok(())
    }

    async fn list_tags(&self) -> RepoResult<Vec<String>> {
        let mut names: Vec<String> = self.tables().tags.iter().map(|t| t.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    // --- FAVORITES ---

    async fn add_favorite(&self, article_id: i64, user_id: i64) -> RepoResult<bool> {
        let mut tables = self.tables();
        if tables.favorites.contains(&(article_id, user_id)) {
            return Ok(false);
        }
        tables.favorites.push((article_id, user_id));
        Ok(true)
    }

    async fn remove_favorite(&self, article_id: i64, user_id: i64) -> RepoResult<bool> {
        let mut tables = self.tables();
        let before = tables.favorites.len();
        tables.favorites.retain(|pair| *pair != (article_id, user_id));
        Ok(tables.favorites.len() != before)
    }

    async fn favorite_counts(&self, article_ids: &[i64]) -> RepoResult<HashMap<i64, i64>> {
        let tables = self.tables();
        let mut counts = HashMap::new();
        for (article_id, _) in &tables.favorites {
            if article_ids.contains(article_id) {
                *counts.entry(*article_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn favorited_by(&self, user_id: i64, article_ids: &[i64]) -> RepoResult<HashSet<i64>> {
        Ok(self
            .tables()
            .favorites
            .iter()
            .filter(|(article_id, uid)| *uid == user_id && article_ids.contains(article_id))
            .map(|(article_id, _)| *article_id)
            .collect())
    }

    // --- COMMENTS ---

    async fn create_comment(
        &self,
        article_id: i64,
        author_id: i64,
        body: &str,
    ) -> RepoResult<CommentRecord> {
        let mut tables = self.tables();
        let now = Utc::now();
        let row = CommentRow {
            id: tables.next_id(),
            body: body.to_string(),
            article_id,
            author_id,
            created_at: now,
            updated_at: now,
        };
        let record = tables
            .comment_record(&row)
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))?;
        tables.comments.push(row);
        Ok(record)
    }

    async fn list_comments(&self, article_id: i64) -> RepoResult<Vec<CommentRecord>> {
        let tables = self.tables();
        let mut rows: Vec<&CommentRow> = tables
            .comments
            .iter()
            .filter(|c| c.article_id == article_id)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .filter_map(|row| tables.comment_record(row))
            .collect())
    }

    async fn find_comment(&self, id: i64) -> RepoResult<Option<CommentRecord>> {
        let tables = self.tables();
        Ok(tables
            .comments
            .iter()
            .find(|c| c.id == id)
            .and_then(|row| tables.comment_record(row)))
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let mut tables = self.tables();
        let before = tables.comments.len();
        tables.comments.retain(|c| c.id != id);
        Ok(tables.comments.len() != before)
    }
}
