use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult, ErrorKind},
    models::User,
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the HS256 tokens issued on registration and login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Id of the user the token was issued to.
    pub id: i64,
    pub email: String,
    /// Issued At, seconds since the epoch.
    pub iat: usize,
    /// Expiration Time, seconds since the epoch.
    pub exp: usize,
}

/// issue_token
///
/// Signs a token for `user` that expires after the configured lifetime.
pub fn issue_token(user: &User, config: &AppConfig) -> AppResult<String> {
    let now = Utc::now().timestamp().max(0) as usize;
    let claims = Claims {
        id: user.id,
        email: user.email.clone(),
        iat: now,
        exp: now + config.jwt_expires_in.as_secs() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::internal("Internal server error").with_source(e))
}

/// decode_token
///
/// Verifies signature and expiry. Every failure is reported as the same 401.
pub fn decode_token(token: &str, config: &AppConfig) -> AppResult<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        AppError::unauthorized("Invalid or expired token")
    })
}

/// Pulls the raw token out of `Authorization: Bearer <jwt>` or `Authorization: Token <jwt>`.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim();
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("Token "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// AuthUser
///
/// Identity of an authenticated request. The token is kept so `GET /user` can echo it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub token: String,
}

impl AuthUser {
    /// Validates the bearer token and loads its user. A token whose user has since been
    /// deleted is rejected.
    async fn resolve(parts: &Parts, repo: &RepositoryState, config: &AppConfig) -> AppResult<Self> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::unauthorized("Missing authorization token"))?;
        let claims = decode_token(token, config)?;

        let user = repo
            .find_user_by_id(claims.id)
            .await?
            .ok_or_else(|| AppError::unauthorized("Invalid or expired token"))?;

        Ok(AuthUser {
            id: user.id,
            email: user.email,
            username: user.username,
            token: token.to_string(),
        })
    }
}

/// Required authentication. Reuses the identity stored by the auth middleware when the
/// route sits behind it, otherwise validates the request itself.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        AuthUser::resolve(parts, &repo, &config).await
    }
}

/// Optional authentication: a missing, malformed or expired token yields `None`.
/// Only infrastructure failures reject the request.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        match AuthUser::resolve(parts, &repo, &config).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.kind() == ErrorKind::Unauthorized => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// ClientIp
///
/// Address the login limiter keys on: the socket peer, or `"unknown"` when the server
/// was started without connect info. The first `X-Forwarded-For` hop replaces the peer
/// only when `trust_proxy` is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn resolve(parts: &Parts, trust_proxy: bool) -> Self {
        let forwarded = trust_proxy
            .then(|| parts.headers.get("x-forwarded-for"))
            .flatten()
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        ClientIp(forwarded.or(peer).unwrap_or_else(|| "unknown".to_string()))
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    AppConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        Ok(ClientIp::resolve(parts, config.trust_proxy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn sample_user() -> User {
        User {
            id: 42,
            username: "jake".into(),
            email: "jake@jake.jake".into(),
            password_hash: String::new(),
            bio: None,
            image: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_tokens_decode_to_the_same_user() {
        let config = AppConfig::default();
        let token = issue_token(&sample_user(), &config).unwrap();
        let claims = decode_token(&token, &config).unwrap();

        assert_eq!(claims.id, 42);
        assert_eq!(claims.email, "jake@jake.jake");
        assert_eq!(claims.exp - claims.iat, 86_400);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let config = AppConfig::default();
        let token = issue_token(&sample_user(), &config).unwrap();
        let other = AppConfig {
            jwt_secret: "a-completely-different-secret".into(),
            ..AppConfig::default()
        };
        assert_eq!(
            decode_token(&token, &other).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn accepts_bearer_and_token_schemes() {
        for header_value in ["Bearer abc.def.ghi", "Token abc.def.ghi"] {
            let (parts, _) = Request::builder()
                .header(header::AUTHORIZATION, header_value)
                .body(())
                .unwrap()
                .into_parts();
            assert_eq!(bearer_token(&parts), Some("abc.def.ghi"));
        }

        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), None);
    }

    fn parts_from(peer: &str, forwarded: Option<&str>) -> Parts {
        let mut builder = Request::builder()
            .extension(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        if let Some(forwarded) = forwarded {
            builder = builder.header("x-forwarded-for", forwarded);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn forwarded_header_is_ignored_unless_the_proxy_is_trusted() {
        let parts = parts_from("192.0.2.10:5000", Some("203.0.113.7"));
        assert_eq!(ClientIp::resolve(&parts, false).0, "192.0.2.10");
        assert_eq!(ClientIp::resolve(&parts, true).0, "203.0.113.7");
    }

    #[test]
    fn trusted_proxy_uses_the_first_hop_and_falls_back_to_the_peer() {
        let chained = parts_from("192.0.2.10:5000", Some("203.0.113.7, 10.0.0.1"));
        assert_eq!(ClientIp::resolve(&chained, true).0, "203.0.113.7");

        let bare = parts_from("192.0.2.10:5000", None);
        assert_eq!(ClientIp::resolve(&bare, true).0, "192.0.2.10");

        let (no_peer, _) = Request::builder().body(()).unwrap().into_parts();
        assert_eq!(ClientIp::resolve(&no_peer, false).0, "unknown");
    }
}
