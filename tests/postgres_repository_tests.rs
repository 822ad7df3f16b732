use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use conduit_api::{
    PostgresRepository,
    models::{ArticleFilter, NewArticle, NewUser, User, UserChanges},
    repository::{Repository, RepositoryError, USERS_EMAIL_KEY},
};
use sqlx::PgPool;

// --- Test Context and Setup ---

/// Pool against the database named by `DATABASE_URL`, with migrations applied.
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    /// `None` when no database is configured, so the suite still runs without Postgres.
    async fn setup() -> Option<Self> {
        dotenv::dotenv().ok();

        let Ok(db_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping Postgres repository test");
            return None;
        };

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        Some(DbTestContext { pool })
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Tests share one database, so every name they create carries a run-unique suffix.
fn unique(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}{:x}{n:x}", nanos % 0xff_ffff_ffff)
}

async fn create_test_user(repo: &PostgresRepository, prefix: &str) -> User {
    let username = unique(prefix);
    repo.create_user(NewUser {
        email: format!("{username}@conduit.test"),
        username,
        password_hash: "$argon2id$placeholder".to_string(),
        bio: Some("original bio".to_string()),
        image: Some("me.png".to_string()),
    })
    .await
    .expect("Failed to create test user")
}

async fn create_test_article(repo: &PostgresRepository, author_id: i64, tags: &[&str]) -> i64 {
    let slug = unique("article-");
    let id = repo
        .create_article(NewArticle {
            author_id,
            title: slug.clone(),
            slug,
            description: "d".to_string(),
            body: "b".to_string(),
        })
        .await
        .expect("Failed to create test article");

    if !tags.is_empty() {
        let names: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let tag_ids: Vec<i64> = repo
            .find_or_create_tags(&names)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        repo.set_article_tags(id, &tag_ids).await.unwrap();
    }
    id
}

// --- Tests ---

#[tokio::test]
async fn test_list_articles_counts_matches_before_paginating() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let author = create_test_user(&repo, "pa").await;
    let tag = unique("tag-");
    let other_tag = unique("other-");

    let oldest = create_test_article(&repo, author.id, &[&tag]).await;
    let middle = create_test_article(&repo, author.id, &[&tag, &other_tag]).await;
    let newest = create_test_article(&repo, author.id, &[&tag]).await;
    create_test_article(&repo, author.id, &[]).await;

    let (page, total) = repo
        .list_articles(&ArticleFilter {
            tag: Some(tag.clone()),
            limit: 2,
            ..ArticleFilter::default()
        })
        .await
        .unwrap();

    assert_eq!(total, 3);
    let ids: Vec<i64> = page.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![newest, middle]);

    // The tag filter must not trim the aggregated tag list.
    let mut expected_tags = vec![other_tag.clone(), tag.clone()];
    expected_tags.sort();
    assert_eq!(page[1].tag_list, expected_tags);
    assert_eq!(page[1].author_username, author.username);

    let (rest, total) = repo
        .list_articles(&ArticleFilter {
            tag: Some(tag),
            limit: 2,
            offset: 2,
            ..ArticleFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(rest.iter().map(|a| a.id).collect::<Vec<_>>(), vec![oldest]);

    let (by_author, total) = repo
        .list_articles(&ArticleFilter {
            author: Some(author.username.clone()),
            limit: 20,
            ..ArticleFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 4);
    assert!(by_author.iter().any(|a| a.tag_list.is_empty()));
}

#[tokio::test]
async fn test_favorited_filter_and_idempotent_favorites() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let author = create_test_user(&repo, "fa").await;
    let fan = create_test_user(&repo, "ff").await;
    let liked = create_test_article(&repo, author.id, &[]).await;
    create_test_article(&repo, author.id, &[]).await;

    assert!(repo.add_favorite(liked, fan.id).await.unwrap());
    assert!(!repo.add_favorite(liked, fan.id).await.unwrap());

    let counts = repo.favorite_counts(&[liked]).await.unwrap();
    assert_eq!(counts.get(&liked), Some(&1));
    assert!(repo.favorited_by(fan.id, &[liked]).await.unwrap().contains(&liked));

    let (page, total) = repo
        .list_articles(&ArticleFilter {
            favorited_by: Some(fan.id),
            limit: 20,
            ..ArticleFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(page[0].id, liked);

    assert!(repo.remove_favorite(liked, fan.id).await.unwrap());
    assert!(!repo.remove_favorite(liked, fan.id).await.unwrap());
    assert!(repo.favorite_counts(&[liked]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_article_cascades_but_keeps_tags() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let author = create_test_user(&repo, "da").await;
    let reader = create_test_user(&repo, "dr").await;
    let tag = unique("kept-");
    let id = create_test_article(&repo, author.id, &[&tag]).await;

    repo.add_favorite(id, reader.id).await.unwrap();
    let comment = repo.create_comment(id, reader.id, "nice").await.unwrap();

    assert!(repo.delete_article(id).await.unwrap());
    assert!(!repo.delete_article(id).await.unwrap());

    assert!(repo.find_article_by_id(id).await.unwrap().is_none());
    assert!(repo.find_comment(comment.id).await.unwrap().is_none());
    assert!(repo.favorite_counts(&[id]).await.unwrap().is_empty());
    assert!(repo.list_tags().await.unwrap().contains(&tag));

    // The surviving tag row is reused rather than duplicated.
    let again = repo.find_or_create_tags(&[tag.clone()]).await.unwrap();
    let again_twice = repo.find_or_create_tags(&[tag]).await.unwrap();
    assert_eq!(again[0].id, again_twice[0].id);
}

#[tokio::test]
async fn test_update_user_clears_and_keeps_optional_columns() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let user = create_test_user(&repo, "ua").await;

    let updated = repo
        .update_user(
            user.id,
            UserChanges {
                bio: Some(None),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap()
        .expect("user exists");

    assert_eq!(updated.bio, None);
    assert_eq!(updated.image.as_deref(), Some("me.png"));
    assert_eq!(updated.username, user.username);
    assert_eq!(updated.email, user.email);

    assert!(
        repo.update_user(i64::MAX, UserChanges::default())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_duplicate_email_reports_the_constraint() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let user = create_test_user(&repo, "ea").await;

    let err = repo
        .create_user(NewUser {
            username: unique("eb"),
            email: user.email.clone(),
            password_hash: "$argon2id$placeholder".to_string(),
            bio: None,
            image: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::UniqueViolation(ref c) if c == USERS_EMAIL_KEY));
}

#[tokio::test]
async fn test_comments_carry_their_author_and_list_newest_first() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let author = create_test_user(&repo, "ca").await;
    let id = create_test_article(&repo, author.id, &[]).await;

    let first = repo.create_comment(id, author.id, "first").await.unwrap();
    let second = repo.create_comment(id, author.id, "second").await.unwrap();
    assert_eq!(first.author_username, author.username);
    assert_eq!(first.author_bio.as_deref(), Some("original bio"));

    let listed = repo.list_comments(id).await.unwrap();
    assert_eq!(
        listed.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );

    assert!(repo.delete_comment(first.id).await.unwrap());
    assert_eq!(repo.list_comments(id).await.unwrap().len(), 1);
}
