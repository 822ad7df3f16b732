use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};

use super::{RepoResult, Repository};
use crate::models::{
    ArticleChanges, ArticleFilter, ArticleRecord, CommentRecord, NewArticle, NewUser, Tag, User,
    UserChanges,
};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, bio, image, created_at, updated_at";

/// Article rows joined with the author and an aggregated, name-sorted tag list.
/// Callers append a `WHERE` clause and then [`ARTICLE_GROUP_BY`].
const ARTICLE_SELECT: &str = r#"
    SELECT a.id, a.slug, a.title, a.description, a.body, a.author_id,
           u.username AS author_username, u.bio AS author_bio, u.image AS author_image,
           COALESCE(
               array_agg(t.name ORDER BY t.name) FILTER (WHERE t.name IS NOT NULL),
               '{}'
           ) AS tag_list,
           a.created_at, a.updated_at
    FROM articles a
    JOIN users u ON u.id = a.author_id
    LEFT JOIN article_tags atg ON atg.article_id = a.id
    LEFT JOIN tags t ON t.id = atg.tag_id
"#;

const ARTICLE_GROUP_BY: &str = " GROUP BY a.id, u.id";

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.body, c.article_id, c.author_id,
           u.username AS author_username, u.bio AS author_bio, u.image AS author_image,
           c.created_at, c.updated_at
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

/// PostgresRepository
///
/// [`Repository`] backed by PostgreSQL through a shared connection pool.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends the listing filters to a query whose `FROM` clause aliases articles as `a`
/// and users as `u`.
fn push_article_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ArticleFilter) {
    builder.push(" WHERE TRUE");

    if let Some(tag) = &filter.tag {
        builder.push(
            " AND EXISTS (SELECT 1 FROM article_tags ft JOIN tags tn ON tn.id = ft.tag_id \
             WHERE ft.article_id = a.id AND tn.name = ",
        );
        builder.push_bind(tag.clone());
        builder.push(")");
    }

    if let Some(author) = &filter.author {
        builder.push(" AND u.username = ");
        builder.push_bind(author.clone());
    }

    if let Some(user_id) = filter.favorited_by {
        builder.push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.article_id = a.id AND f.user_id = ");
        builder.push_bind(user_id);
        builder.push(")");
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // --- USERS ---

    async fn find_user_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        // Usernames are not unique in the schema; the oldest account wins.
        let sql =
            format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 ORDER BY id LIMIT 1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, bio, image) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user.username)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.bio)
            .bind(user.image)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_user
    ///
    /// `COALESCE` covers the plain optional columns. `bio` and `image` can be cleared, so
    /// each gets a "was it sent" flag next to its value.
    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                bio = CASE WHEN $5::boolean THEN $6::text ELSE bio END,
                image = CASE WHEN $7::boolean THEN $8::text ELSE image END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.username)
            .bind(changes.email)
            .bind(changes.password_hash)
            .bind(changes.bio.is_some())
            .bind(changes.bio.flatten())
            .bind(changes.image.is_some())
            .bind(changes.image.flatten())
            .fetch_optional(&self.pool)
            .await?)
    }

    // --- ARTICLES ---

    async fn find_article_by_id(&self, id: i64) -> RepoResult<Option<ArticleRecord>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(ARTICLE_SELECT);
        builder.push(" WHERE a.id = ");
        builder.push_bind(id);
        builder.push(ARTICLE_GROUP_BY);
        Ok(builder
            .build_query_as::<ArticleRecord>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_article_by_slug(&self, slug: &str) -> RepoResult<Option<ArticleRecord>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(ARTICLE_SELECT);
        builder.push(" WHERE a.slug = ");
        builder.push_bind(slug);
        builder.push(ARTICLE_GROUP_BY);
        Ok(builder
            .build_query_as::<ArticleRecord>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn slug_taken(&self, slug: &str, exclude: Option<i64>) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM articles WHERE slug = $1 AND ($2::bigint IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn create_article(&self, article: NewArticle) -> RepoResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "INSERT INTO articles (slug, title, description, body, author_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(article.slug)
        .bind(article.title)
        .bind(article.description)
        .bind(article.body)
        .bind(article.author_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_article(&self, id: i64, changes: ArticleChanges) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE articles
            SET slug = COALESCE($2, slug),
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                body = COALESCE($5, body),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.slug)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_article(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// list_articles
    ///
    /// Two statements built from the same filters: a `COUNT` over every match, then the
    /// requested page ordered by `created_at DESC, id DESC`.
    async fn list_articles(&self, filter: &ArticleFilter) -> RepoResult<(Vec<ArticleRecord>, i64)> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM articles a JOIN users u ON u.id = a.author_id",
        );
        push_article_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut page: QueryBuilder<Postgres> = QueryBuilder::new(ARTICLE_SELECT);
        push_article_filters(&mut page, filter);
        page.push(ARTICLE_GROUP_BY);
        page.push(" ORDER BY a.created_at DESC, a.id DESC LIMIT ");
        page.push_bind(filter.limit);
        page.push(" OFFSET ");
        page.push_bind(filter.offset);

        let articles = page
            .build_query_as::<ArticleRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok((articles, total))
    }

    // --- TAGS ---

    async fn find_or_create_tags(&self, names: &[String]) -> RepoResult<Vec<Tag>> {
        let mut tags = Vec::with_capacity(names.len());
        for name in names {
            // The no-op update makes RETURNING yield the existing row on conflict.
            let tag = sqlx::query_as::<_, Tag>(
                "INSERT INTO tags (name) VALUES ($1) \
                 ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id, name",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
            tags.push(tag);
        }
        Ok(tags)
    }

    async fn set_article_tags(&self, article_id: i64, tag_ids: &[i64]) -> RepoResult<()> {
        sqlx::query("DELETE FROM article_tags WHERE article_id = $1")
            .bind(article_id)
            .execute(&self.pool)
            .await?;

        if !tag_ids.is_empty() {
            sqlx::query(
                "INSERT INTO article_tags (article_id, tag_id) \
                 SELECT $1, UNNEST($2::bigint[]) ON CONFLICT DO NOTHING",
            )
            .bind(article_id)
            .bind(tag_ids.to_vec())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_tags(&self) -> RepoResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>("SELECT name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    // --- FAVORITES ---

    async fn add_favorite(&self, article_id: i64, user_id: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            "INSERT INTO favorites (article_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(article_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_favorite(&self, article_id: i64, user_id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE article_id = $1 AND user_id = $2")
            .bind(article_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn favorite_counts(&self, article_ids: &[i64]) -> RepoResult<HashMap<i64, i64>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (i64, i64)>(
            "SELECT article_id, COUNT(*) FROM favorites WHERE article_id = ANY($1) GROUP BY article_id",
        )
        .bind(article_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn favorited_by(&self, user_id: i64, article_ids: &[i64]) -> RepoResult<HashSet<i64>> {
        if article_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query_scalar::<_, i64>(
            "SELECT article_id FROM favorites WHERE user_id = $1 AND article_id = ANY($2)",
        )
        .bind(user_id)
        .bind(article_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    // --- COMMENTS ---

    /// create_comment
    ///
    /// Inserts and joins the author in one round trip through a CTE.
    async fn create_comment(
        &self,
        article_id: i64,
        author_id: i64,
        body: &str,
    ) -> RepoResult<CommentRecord> {
        Ok(sqlx::query_as::<_, CommentRecord>(
            r#"
            WITH c AS (
                INSERT INTO comments (body, article_id, author_id) VALUES ($1, $2, $3)
                RETURNING id, body, article_id, author_id, created_at, updated_at
            )
            SELECT c.id, c.body, c.article_id, c.author_id,
                   u.username AS author_username, u.bio AS author_bio, u.image AS author_image,
                   c.created_at, c.updated_at
            FROM c JOIN users u ON u.id = c.author_id
            "#,
        )
        .bind(body)
        .bind(article_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_comments(&self, article_id: i64) -> RepoResult<Vec<CommentRecord>> {
        let sql = format!(
            "{COMMENT_SELECT} WHERE c.article_id = $1 ORDER BY c.created_at DESC, c.id DESC"
        );
        Ok(sqlx::query_as::<_, CommentRecord>(&sql)
            .bind(article_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_comment(&self, id: i64) -> RepoResult<Option<CommentRecord>> {
        let sql = format!("{COMMENT_SELECT} WHERE c.id = $1");
        Ok(sqlx::query_as::<_, CommentRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
