use crate::{
    error::{AppError, AppResult},
    models::{
        ArticleChanges, ArticleFilter, ArticleListEnvelope, ArticleQuery, ArticleRecord,
        ArticleView, CreateArticle, DEFAULT_PAGE_LIMIT, FeedQuery, NewArticle, UpdateArticle,
    },
    repository::Repository,
    slug,
};

/// Slugs that collide with static routes under `/articles`.
const RESERVED_SLUGS: &[&str] = &["feed"];

/// unique_slug
///
/// Slugifies `title` and appends `-1`, `-2`, ... until no article other than `exclude`
/// holds the result and it is not reserved.
pub async fn unique_slug(
    repo: &dyn Repository,
    title: &str,
    exclude: Option<i64>,
) -> AppResult<String> {
    let base = slug::slugify(title);
    if base.is_empty() {
        return Err(AppError::validation(vec![
            "title must contain at least one letter or digit".into(),
        ]));
    }

    let mut n = 0;
    loop {
        let candidate = slug::candidate(&base, n);
        if !RESERVED_SLUGS.contains(&candidate.as_str())
            && !repo.slug_taken(&candidate, exclude).await?
        {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Trims tag names, drops blanks and duplicates, and keeps first-seen order.
pub fn normalize_tags(names: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(names.len());
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !seen.iter().any(|s: &String| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

async fn replace_tags(repo: &dyn Repository, article_id: i64, names: &[String]) -> AppResult<()> {
    let tags = repo.find_or_create_tags(&normalize_tags(names)).await?;
    let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
    repo.set_article_tags(article_id, &ids).await?;
    Ok(())
}

/// Attaches favorite totals and the viewer's favorite flag to a batch of records in one
/// pass keyed by article id.
async fn present(
    repo: &dyn Repository,
    records: Vec<ArticleRecord>,
    viewer: Option<i64>,
    include_body: bool,
) -> AppResult<Vec<ArticleView>> {
    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
    let counts = repo.favorite_counts(&ids).await?;
    let favorited = match viewer {
        Some(user_id) => repo.favorited_by(user_id, &ids).await?,
        None => Default::default(),
    };

    Ok(records
        .into_iter()
        .map(|record| {
            let count = counts.get(&record.id).copied().unwrap_or(0);
            let is_favorited = favorited.contains(&record.id);
            ArticleView::new(record, include_body, is_favorited, count)
        })
        .collect())
}

async fn present_one(
    repo: &dyn Repository,
    record: ArticleRecord,
    viewer: Option<i64>,
) -> AppResult<ArticleView> {
    present(repo, vec![record], viewer, true)
        .await?
        .pop()
        .ok_or_else(|| AppError::internal("Internal server error"))
}

async fn find_by_slug(repo: &dyn Repository, slug: &str) -> AppResult<ArticleRecord> {
    repo.find_article_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::not_found("Article not found"))
}

async fn find_by_id(repo: &dyn Repository, id: i64) -> AppResult<ArticleRecord> {
    repo.find_article_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("Article not found"))
}

/// create_article
///
/// `POST /articles`.
pub async fn create_article(
    repo: &dyn Repository,
    author_id: i64,
    input: CreateArticle,
) -> AppResult<ArticleView> {
    input.validate()?;

    if repo.find_user_by_id(author_id).await?.is_none() {
        return Err(AppError::not_found("User not found"));
    }

    let slug = unique_slug(repo, &input.title, None).await?;
    let id = repo
        .create_article(NewArticle {
            author_id,
            slug,
            title: input.title,
            description: input.description,
            body: input.body,
        })
        .await?;

    if let Some(tags) = &input.tag_list {
        replace_tags(repo, id, tags).await?;
    }

    let record = find_by_id(repo, id).await?;
    tracing::info!(article_id = id, slug = %record.slug, author_id, "article created");
    present_one(repo, record, Some(author_id)).await
}

/// `GET /articles/{slug}`.
pub async fn get_article(
    repo: &dyn Repository,
    slug: &str,
    viewer: Option<i64>,
) -> AppResult<ArticleView> {
    let record = find_by_slug(repo, slug).await?;
    present_one(repo, record, viewer).await
}

/// list_articles
///
/// `GET /articles`. A `favorited` username that matches nobody yields an empty page rather
/// than an error. The total is counted before pagination.
pub async fn list_articles(
    repo: &dyn Repository,
    viewer: Option<i64>,
    query: ArticleQuery,
) -> AppResult<ArticleListEnvelope> {
    let favorited_by = match &query.favorited {
        Some(username) => match repo.find_user_by_username(username).await? {
            Some(user) => Some(user.id),
            None => {
                return Ok(ArticleListEnvelope {
                    articles: Vec::new(),
                    articles_count: 0,
                });
            }
        },
        None => None,
    };

    let filter = ArticleFilter {
        tag: query.tag,
        author: query.author,
        favorited_by,
        limit: i64::from(query.limit.unwrap_or(DEFAULT_PAGE_LIMIT)),
        offset: i64::from(query.offset.unwrap_or(0)),
    };

    let (records, total) = repo.list_articles(&filter).await?;
    let articles = present(repo, records, viewer, false).await?;

    Ok(ArticleListEnvelope {
        articles,
        articles_count: total,
    })
}

/// feed_articles
///
/// `GET /articles/feed`. Articles by authors the caller follows; nobody follows anyone,
/// so the page is always empty.
pub fn feed_articles(user_id: i64, query: FeedQuery) -> ArticleListEnvelope {
    tracing::debug!(
        user_id,
        limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        offset = query.offset.unwrap_or(0),
        "feed requested"
    );
    ArticleListEnvelope {
        articles: Vec::new(),
        articles_count: 0,
    }
}

/// update_article
///
/// `PUT /articles/{slug}`. Author only. A changed title re-slugs the article; `tagList`
/// replaces the existing tags when present.
pub async fn update_article(
    repo: &dyn Repository,
    user_id: i64,
    slug: &str,
    input: UpdateArticle,
) -> AppResult<ArticleView> {
    let article = find_by_slug(repo, slug).await?;
    if article.author_id != user_id {
        return Err(AppError::forbidden("You can only update your own articles"));
    }

    let blank: Vec<String> = [
        ("title", &input.title),
        ("description", &input.description),
        ("body", &input.body),
    ]
    .into_iter()
    .filter(|(_, value)| value.as_deref().is_some_and(|v| v.trim().is_empty()))
    .map(|(field, _)| format!("{field} should not be empty"))
    .collect();
    if !blank.is_empty() {
        return Err(AppError::validation(blank));
    }

    let new_slug = match &input.title {
        Some(title) if *title != article.title => {
            Some(unique_slug(repo, title, Some(article.id)).await?)
        }
        _ => None,
    };

    repo.update_article(
        article.id,
        ArticleChanges {
            slug: new_slug,
            title: input.title,
            description: input.description,
            body: input.body,
        },
    )
    .await?;

    if let Some(tags) = &input.tag_list {
        replace_tags(repo, article.id, tags).await?;
    }

    let record = find_by_id(repo, article.id).await?;
    tracing::info!(article_id = article.id, slug = %record.slug, "article updated");
    present_one(repo, record, Some(user_id)).await
}

/// delete_article
///
/// `DELETE /articles/{slug}`. Author only. Comments, favorites and tag links go with the
/// article; the tags stay.
pub async fn delete_article(repo: &dyn Repository, user_id: i64, slug: &str) -> AppResult<()> {
    let article = find_by_slug(repo, slug).await?;
    if article.author_id != user_id {
        return Err(AppError::forbidden("You can only delete your own articles"));
    }

    repo.delete_article(article.id).await?;
    tracing::info!(article_id = article.id, slug, "article deleted");
    Ok(())
}

/// `POST /articles/{slug}/favorite`. Favoriting twice changes nothing.
pub async fn favorite_article(
    repo: &dyn Repository,
    user_id: i64,
    slug: &str,
) -> AppResult<ArticleView> {
    let article = find_by_slug(repo, slug).await?;
    if repo.add_favorite(article.id, user_id).await? {
        tracing::debug!(article_id = article.id, user_id, "article favorited");
    }
    present_one(repo, article, Some(user_id)).await
}

/// `DELETE /articles/{slug}/favorite`.
pub async fn unfavorite_article(
    repo: &dyn Repository,
    user_id: i64,
    slug: &str,
) -> AppResult<ArticleView> {
    let article = find_by_slug(repo, slug).await?;
    if repo.remove_favorite(article.id, user_id).await? {
        tracing::debug!(article_id = article.id, user_id, "article unfavorited");
    }
    present_one(repo, article, Some(user_id)).await
}

/// `GET /tags`, sorted by name.
pub async fn list_tags(repo: &dyn Repository) -> AppResult<Vec<String>> {
    Ok(repo.list_tags().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_normalisation_dedupes_in_order() {
        let raw = vec![
            " rust ".to_string(),
            "axum".to_string(),
            "rust".to_string(),
            "".to_string(),
            "sqlx".to_string(),
        ];
        assert_eq!(normalize_tags(&raw), vec!["rust", "axum", "sqlx"]);
    }
}
