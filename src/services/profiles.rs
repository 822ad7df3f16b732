use crate::{
    error::{AppError, AppResult},
    models::Profile,
    repository::Repository,
};

/// `GET /profiles/{username}`. There is no follow graph, so `following` is always false.
pub async fn get_profile(repo: &dyn Repository, username: &str) -> AppResult<Profile> {
    repo.find_user_by_username(username)
        .await?
        .map(|user| Profile::from(&user))
        .ok_or_else(|| AppError::not_found("Profile not found"))
}
