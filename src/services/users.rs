use crate::{
    auth::{AuthUser, issue_token},
    config::AppConfig,
    error::{AppError, AppResult},
    models::{LoginUser, NewUser, RegisterUser, UpdateUser, User, UserChanges, UserView},
    password::{ClearTextPassword, HashedPassword, PasswordHasherConfig},
    rate_limit::{LoginRateLimiter, RateLimitDecision},
    repository::{Repository, RepositoryError, USERS_EMAIL_KEY},
};

/// How a new account's password is supplied.
#[derive(Debug)]
pub enum PasswordInput {
    /// Hashed before it is stored.
    Plain(ClearTextPassword),
    /// Stored as is.
    Hashed(HashedPassword),
}

#[derive(Debug)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: PasswordInput,
    pub bio: Option<String>,
    pub image: Option<String>,
}

fn email_taken() -> AppError {
    AppError::conflict("Email already exists")
}

/// Maps a lost race on the email constraint to the same conflict as the pre-check.
fn map_email_conflict(error: RepositoryError) -> AppError {
    match &error {
        RepositoryError::UniqueViolation(constraint) if constraint == USERS_EMAIL_KEY => {
            email_taken()
        }
        _ => error.into(),
    }
}

/// create_user
///
/// Inserts an account after checking the email is free.
pub async fn create_user(
    repo: &dyn Repository,
    hasher: PasswordHasherConfig,
    account: NewAccount,
) -> AppResult<User> {
    if repo.find_user_by_email(&account.email).await?.is_some() {
        return Err(email_taken());
    }

    let password_hash = match account.password {
        PasswordInput::Plain(clear) => hasher.hash_blocking(clear).await?,
        PasswordInput::Hashed(hashed) => hashed,
    };

    let user = repo
        .create_user(NewUser {
            username: account.username,
            email: account.email,
            password_hash: password_hash.into_phc_string(),
            bio: account.bio,
            image: account.image,
        })
        .await
        .map_err(map_email_conflict)?;

    tracing::info!(user_id = user.id, "user registered");
    Ok(user)
}

/// register
///
/// `POST /users`: validates the payload, creates the account and signs a token.
pub async fn register(
    repo: &dyn Repository,
    config: &AppConfig,
    hasher: PasswordHasherConfig,
    input: RegisterUser,
) -> AppResult<UserView> {
    input.validate()?;

    let user = create_user(
        repo,
        hasher,
        NewAccount {
            username: input.username.trim().to_string(),
            email: input.email.trim().to_string(),
            password: PasswordInput::Plain(ClearTextPassword::new(input.password)),
            bio: None,
            image: None,
        },
    )
    .await?;

    let token = issue_token(&user, config)?;
    Ok(UserView::new(&user, token))
}

/// login
///
/// `POST /users/login`. The attempt is counted against `(client_ip, email)` before the
/// credentials are looked at. Unknown emails and wrong passwords produce the same 401.
pub async fn login(
    repo: &dyn Repository,
    config: &AppConfig,
    limiter: &LoginRateLimiter,
    client_ip: &str,
    input: LoginUser,
) -> AppResult<UserView> {
    let email = input.email.trim();
    let limiter_email = if email.is_empty() { "unknown" } else { email };
    let key = LoginRateLimiter::key(client_ip, limiter_email);

    if let RateLimitDecision::Limited { retry_after } = limiter.check(&key) {
        tracing::warn!(
            client_ip,
            retry_after_secs = retry_after.as_secs(),
            "login rate limit exceeded"
        );
        return Err(AppError::too_many_requests(
            "Too many login attempts. Please try again later.",
        ));
    }

    let invalid = || AppError::unauthorized("Invalid credentials");

    let Some(user) = repo.find_user_by_email(email).await? else {
        tracing::warn!(client_ip, "login failed: user not found");
        return Err(invalid());
    };

    let stored = HashedPassword::from_phc_string(user.password_hash.clone())?;
    let matches =
        PasswordHasherConfig::verify_blocking(stored, ClearTextPassword::new(input.password))
            .await?;
    if !matches {
        tracing::warn!(user_id = user.id, client_ip, "login failed: invalid password");
        return Err(invalid());
    }

    tracing::info!(user_id = user.id, "user logged in");
    let token = issue_token(&user, config)?;
    Ok(UserView::new(&user, token))
}

/// current_user
///
/// `GET /user`: the caller's account with the presented token echoed back.
pub async fn current_user(repo: &dyn Repository, auth: &AuthUser) -> AppResult<UserView> {
    let user = repo
        .find_user_by_id(auth.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(UserView::new(&user, auth.token.clone()))
}

/// update_user
///
/// `PUT /user`: applies the present fields. A new password is re-hashed and a fresh
/// token is issued so its email claim matches the stored account.
pub async fn update_user(
    repo: &dyn Repository,
    config: &AppConfig,
    hasher: PasswordHasherConfig,
    auth: &AuthUser,
    input: UpdateUser,
) -> AppResult<UserView> {
    input.validate()?;

    let email = input.email.map(|e| e.trim().to_string());
    if let Some(email) = &email {
        if let Some(owner) = repo.find_user_by_email(email).await? {
            if owner.id != auth.id {
                return Err(email_taken());
            }
        }
    }

    let password_hash = match input.password {
        Some(raw) => Some(
            hasher
                .hash_blocking(ClearTextPassword::new(raw))
                .await?
                .into_phc_string(),
        ),
        None => None,
    };

    let changes = UserChanges {
        username: input.username.map(|u| u.trim().to_string()),
        email,
        password_hash,
        bio: input.bio.into_change(),
        image: input.image.into_change(),
    };

    let user = repo
        .update_user(auth.id, changes)
        .await
        .map_err(map_email_conflict)?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    tracing::info!(user_id = user.id, "user updated");
    let token = issue_token(&user, config)?;
    Ok(UserView::new(&user, token))
}
