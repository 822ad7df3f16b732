use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

pub const USERNAME_MIN_LENGTH: usize = 3;
pub const USERNAME_MAX_LENGTH: usize = 30;
pub const EMAIL_MAX_LENGTH: usize = 100;
pub const PASSWORD_MIN_LENGTH: usize = 6;
pub const BIO_MAX_LENGTH: usize = 160;
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// An account row from `users`. Never serialised directly; the password hash stays
/// on the server.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// ArticleRecord
///
/// An article joined with its author's public fields and the names of its tags.
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRecord {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub author_id: i64,
    pub author_username: String,
    pub author_bio: Option<String>,
    pub author_image: Option<String>,
    pub tag_list: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// CommentRecord
///
/// A comment joined with its author's public fields.
#[derive(Debug, Clone, FromRow)]
pub struct CommentRecord {
    pub id: i64,
    pub body: String,
    pub article_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub author_bio: Option<String>,
    pub author_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Repository Inputs ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub image: Option<String>,
}

/// Partial user update. `bio`/`image` distinguish "leave alone" (`None`) from
/// "clear" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub bio: Option<Option<String>>,
    pub image: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub author_id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleChanges {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
}

/// ArticleFilter
///
/// Resolved listing filter. `favorited_by` is a user id: the username lookup happens in
/// the service so an unknown name can short-circuit to an empty page.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub tag: Option<String>,
    pub author: Option<String>,
    pub favorited_by: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub user: RegisterUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterUser {
    pub fn validate(&self) -> AppResult<()> {
        let mut problems = Vec::new();
        check_username(&self.username, &mut problems);
        check_email(&self.email, &mut problems);
        check_password(&self.password, &mut problems);
        into_validation_result(problems)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginUserRequest {
    pub user: LoginUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginUser {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUserRequest {
    pub user: UpdateUser,
}

/// UpdateUser
///
/// Every field is optional. An explicit `null` for `bio` or `image` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Nullable::is_absent")]
    #[ts(as = "Option<String>", optional)]
    #[schema(value_type = Option<String>)]
    pub image: Nullable<String>,
    #[serde(default, skip_serializing_if = "Nullable::is_absent")]
    #[ts(as = "Option<String>", optional)]
    #[schema(value_type = Option<String>)]
    pub bio: Nullable<String>,
}

impl UpdateUser {
    pub fn validate(&self) -> AppResult<()> {
        let mut problems = Vec::new();
        if let Some(username) = &self.username {
            check_username(username, &mut problems);
        }
        if let Some(email) = &self.email {
            check_email(email, &mut problems);
        }
        if let Some(password) = &self.password {
            check_password(password, &mut problems);
        }
        if let Nullable::Present(bio) = &self.bio {
            if bio.chars().count() > BIO_MAX_LENGTH {
                problems.push(format!(
                    "bio must be shorter than or equal to {BIO_MAX_LENGTH} characters"
                ));
            }
        }
        into_validation_result(problems)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateArticleRequest {
    pub article: CreateArticle,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateArticle {
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub tag_list: Option<Vec<String>>,
}

impl CreateArticle {
    pub fn validate(&self) -> AppResult<()> {
        let mut problems = Vec::new();
        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("body", &self.body),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{field} should not be empty"));
            }
        }
        into_validation_result(problems)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateArticleRequest {
    pub article: UpdateArticle,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateArticle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub tag_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub comment: CreateComment,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateComment {
    pub body: String,
}

impl CreateComment {
    pub fn validate(&self) -> AppResult<()> {
        if self.body.trim().is_empty() {
            return Err(AppError::validation(vec!["body should not be empty".into()]));
        }
        Ok(())
    }
}

/// ArticleQuery
///
/// Query string accepted by `GET /articles`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ArticleQuery {
    /// Only articles carrying this tag.
    pub tag: Option<String>,
    /// Only articles written by this username.
    pub author: Option<String>,
    /// Only articles favorited by this username.
    pub favorited: Option<String>,
    /// Page size, defaults to 20.
    pub limit: Option<u32>,
    /// Number of articles to skip, defaults to 0.
    pub offset: Option<u32>,
}

/// FeedQuery
///
/// Pagination accepted by `GET /articles/feed`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// --- Response Envelopes (Output Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserView {
    pub email: String,
    pub token: String,
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
}

impl UserView {
    pub fn new(user: &User, token: String) -> Self {
        Self {
            email: user.email.clone(),
            token,
            username: user.username.clone(),
            bio: user.bio.clone(),
            image: user.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserEnvelope {
    pub user: UserView,
}

/// Profile
///
/// Public projection of a user. `following` is always false: there is no follow graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Profile {
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub following: bool,
}

impl From<&User> for Profile {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            bio: user.bio.clone(),
            image: user.image.clone(),
            following: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileEnvelope {
    pub profile: Profile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ArticleView {
    pub slug: String,
    pub title: String,
    pub description: String,
    /// Present on single-article responses, omitted from listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub body: Option<String>,
    pub tag_list: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub favorited: bool,
    #[ts(type = "number")]
    pub favorites_count: i64,
    pub author: Profile,
}

impl ArticleView {
    pub fn new(record: ArticleRecord, include_body: bool, favorited: bool, favorites_count: i64) -> Self {
        Self {
            author: Profile {
                username: record.author_username,
                bio: record.author_bio,
                image: record.author_image,
                following: false,
            },
            slug: record.slug,
            title: record.title,
            description: record.description,
            body: include_body.then_some(record.body),
            tag_list: record.tag_list,
            created_at: iso_timestamp(&record.created_at),
            updated_at: iso_timestamp(&record.updated_at),
            favorited,
            favorites_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticleEnvelope {
    pub article: ArticleView,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ArticleListEnvelope {
    pub articles: Vec<ArticleView>,
    #[ts(type = "number")]
    pub articles_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CommentView {
    #[ts(type = "number")]
    pub id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub body: String,
    pub author: Profile,
}

impl From<CommentRecord> for CommentView {
    fn from(record: CommentRecord) -> Self {
        Self {
            id: record.id,
            created_at: iso_timestamp(&record.created_at),
            updated_at: iso_timestamp(&record.updated_at),
            body: record.body,
            author: Profile {
                username: record.author_username,
                bio: record.author_bio,
                image: record.author_image,
                following: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentEnvelope {
    pub comment: CommentView,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentListEnvelope {
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TagListEnvelope {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// --- Helpers ---

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Nullable
///
/// A request field that tells an absent key apart from an explicit `null`. Pair it with
/// `#[serde(default)]` so a missing key stays `Absent`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Nullable<T> {
    #[default]
    Absent,
    Null,
    Present(T),
}

impl<T> Nullable<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Nullable::Absent)
    }

    /// `None` leaves the column alone, `Some(None)` clears it.
    pub fn into_change(self) -> Option<Option<T>> {
        match self {
            Nullable::Absent => None,
            Nullable::Null => Some(None),
            Nullable::Present(value) => Some(Some(value)),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Nullable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Nullable::Present(value),
            None => Nullable::Null,
        })
    }
}

impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Nullable::Present(value) => value.serialize(serializer),
            _ => serializer.serialize_none(),
        }
    }
}

fn check_username(username: &str, problems: &mut Vec<String>) {
    let len = username.trim().chars().count();
    if !(USERNAME_MIN_LENGTH..=USERNAME_MAX_LENGTH).contains(&len) {
        problems.push(format!(
            "username must be between {USERNAME_MIN_LENGTH} and {USERNAME_MAX_LENGTH} characters"
        ));
    }
}

fn check_email(email: &str, problems: &mut Vec<String>) {
    if !is_plausible_email(email) {
        problems.push("email must be an email".to_string());
    }
    if email.chars().count() > EMAIL_MAX_LENGTH {
        problems.push(format!(
            "email must be shorter than or equal to {EMAIL_MAX_LENGTH} characters"
        ));
    }
}

fn check_password(password: &str, problems: &mut Vec<String>) {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        problems.push(format!(
            "password must be longer than or equal to {PASSWORD_MIN_LENGTH} characters"
        ));
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\A[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\z",
    )
    .expect("static regex")
});

fn is_plausible_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn into_validation_result(problems: Vec<String>) -> AppResult<()> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(problems))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_plausibility() {
        assert!(is_plausible_email("jake@jake.jake"));
        assert!(!is_plausible_email("jake"));
        assert!(!is_plausible_email("jake@localhost"));
        assert!(!is_plausible_email("@jake.jake"));
        assert!(!is_plausible_email("ja ke@jake.jake"));
        assert!(!is_plausible_email("jake@jake..jake"));
        assert!(is_plausible_email("Jake.Doe+news@Mail.Example.com"));
    }

    #[test]
    fn overlong_emails_are_rejected() {
        let email = format!("{}@conduit.test", "a".repeat(EMAIL_MAX_LENGTH));
        let err = RegisterUser {
            username: "jake".into(),
            email,
            password: "password123".into(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err.details(),
            Some(&["email must be shorter than or equal to 100 characters".to_string()][..])
        );
    }

    #[test]
    fn register_collects_every_problem() {
        let err = RegisterUser {
            username: "jo".into(),
            email: "nope".into(),
            password: "123".into(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.details().map(<[String]>::len), Some(3));
    }

    #[test]
    fn update_user_distinguishes_null_from_absent() {
        let parsed: UpdateUser = serde_json::from_str(r#"{"bio": null}"#).unwrap();
        assert_eq!(parsed.bio, Nullable::Null);
        assert_eq!(parsed.image, Nullable::Absent);
        assert_eq!(parsed.bio.into_change(), Some(None));

        let set: UpdateUser = serde_json::from_str(r#"{"image": "me.png"}"#).unwrap();
        assert_eq!(set.image.into_change(), Some(Some("me.png".to_string())));
    }
}
