use crate::{
    error::{AppError, AppResult},
    models::{ArticleRecord, CommentView, CreateComment},
    repository::Repository,
};

async fn find_article(repo: &dyn Repository, slug: &str) -> AppResult<ArticleRecord> {
    repo.find_article_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::not_found("Article not found"))
}

/// `POST /articles/{slug}/comments`.
pub async fn add_comment(
    repo: &dyn Repository,
    author_id: i64,
    slug: &str,
    input: CreateComment,
) -> AppResult<CommentView> {
    input.validate()?;

    let article = find_article(repo, slug).await?;
    if repo.find_user_by_id(author_id).await?.is_none() {
        return Err(AppError::not_found("User not found"));
    }

    let comment = repo
        .create_comment(article.id, author_id, &input.body)
        .await?;
    tracing::info!(comment_id = comment.id, article_id = article.id, "comment added");
    Ok(comment.into())
}

/// `GET /articles/{slug}/comments`, newest first.
pub async fn list_comments(repo: &dyn Repository, slug: &str) -> AppResult<Vec<CommentView>> {
    let article = find_article(repo, slug).await?;
    let comments = repo.list_comments(article.id).await?;
    Ok(comments.into_iter().map(CommentView::from).collect())
}

/// delete_comment
///
/// `DELETE /articles/{slug}/comments/{id}`. The comment must belong to the article named in
/// the path, and only its author may remove it.
pub async fn delete_comment(
    repo: &dyn Repository,
    user_id: i64,
    slug: &str,
    comment_id: i64,
) -> AppResult<()> {
    let article = find_article(repo, slug).await?;

    let comment = repo
        .find_comment(comment_id)
        .await?
        .filter(|c| c.article_id == article.id)
        .ok_or_else(|| AppError::not_found("Comment not found"))?;

    if comment.author_id != user_id {
        return Err(AppError::forbidden("You can only delete your own comments"));
    }

    repo.delete_comment(comment.id).await?;
    tracing::info!(comment_id, article_id = article.id, "comment deleted");
    Ok(())
}
