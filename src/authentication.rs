use std::sync::Arc;

use crate::db_helpers::get_admin_password_hash;
use crate::errors::RequestError;
use crate::AppContext;
use anyhow::{Context, Result};
use argon2::PasswordVerifier;
use argon2::{password_hash::SaltString, Argon2, PasswordHash};
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";
pub const SESSION_COOKIE: &str = "plog_session";
pub const FLASH_COOKIE: &str = "plog_flash";

const SESSION_DURATION: time::Duration = time::Duration::days(7);
const FLASH_DURATION: time::Duration = time::Duration::minutes(10);
const SESSION_SUBJECT: &str = "admin";

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaim {
    sub: String,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct FlashClaim {
    msg: String,
    exp: i64,
}

/// Whether the browser presented a valid admin session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub authenticated: bool,
}

/// The pending flash message, if any. Pages that render it must clear the
/// cookie with [`clear_flash_cookie`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash(pub Option<String>);

fn context(parts: &Parts) -> Result<Arc<AppContext>, RequestError> {
    match parts.extensions.get::<Arc<AppContext>>() {
        Some(ctx) => Ok(ctx.clone()),
        None => {
            log::error!("AppContext extension is missing from the router");
            Err(RequestError::ServerError)
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync + 'static,
{
    type Rejection = RequestError;
    async fn from_request_parts(
        parts: &mut Parts,
        _: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let ctx = context(parts)?;
        let authenticated = match cookie_value(&parts.headers, SESSION_COOKIE) {
            Some(token) => verify_session_token(&ctx.config.secret_key, token).is_ok(),
            None => false,
        };
        Ok(Session { authenticated })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Flash
where
    S: Send + Sync + 'static,
{
    type Rejection = RequestError;
    async fn from_request_parts(
        parts: &mut Parts,
        _: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let ctx = context(parts)?;
        let message = cookie_value(&parts.headers, FLASH_COOKIE)
            .and_then(|token| read_flash_token(&ctx.config.secret_key, token));
        Ok(Flash(message))
    }
}

/// Route guard for the admin area: anonymous visitors are sent to the login
/// form instead of getting an error.
pub async fn require_login<B>(session: Session, request: Request<B>, next: Next<B>) -> Response {
    if session.authenticated {
        next.run(request).await
    } else {
        Redirect::to("/login").into_response()
    }
}

// ----------------- Cookies -----------------

pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn cookie(name: &str, value: &str, max_age: time::Duration) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name,
        value,
        max_age.whole_seconds()
    )
}

pub fn session_cookie(token: &str) -> String {
    cookie(SESSION_COOKIE, token, SESSION_DURATION)
}

pub fn clear_session_cookie() -> String {
    cookie(SESSION_COOKIE, "", time::Duration::ZERO)
}

pub fn clear_flash_cookie() -> String {
    cookie(FLASH_COOKIE, "", time::Duration::ZERO)
}

/// Redirects to `to`, leaving `message` for the next rendered page.
pub fn flash_redirect(secret: &str, to: &str, message: &str) -> Response {
    match get_flash_token(secret, message) {
        Ok(token) => (
            AppendHeaders([(header::SET_COOKIE, cookie(FLASH_COOKIE, &token, FLASH_DURATION))]),
            Redirect::to(to),
        )
            .into_response(),
        Err(e) => {
            log::error!("Could not sign flash message: {:#}", e);
            Redirect::to(to).into_response()
        }
    }
}

// ----------------- Tokens -----------------

fn sign<T: Serialize>(secret: &str, claim: &T) -> Result<String> {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        claim,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_ref()),
    )
    .context("Failed to sign token")
}

fn verify<T: serde::de::DeserializeOwned>(secret: &str, token: &str) -> Result<T, RequestError> {
    let token_data = jsonwebtoken::decode::<T>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(secret.as_ref()),
        &jsonwebtoken::Validation::default(),
    )
    .map_err(|e| {
        log::debug!("Rejected token: {}", e);
        RequestError::NotAuthorized("Invalid session")
    })?;
    Ok(token_data.claims)
}

pub fn get_session_token(secret: &str) -> Result<String> {
    let expiry_date = OffsetDateTime::now_utc() + SESSION_DURATION;
    let claim = SessionClaim {
        sub: SESSION_SUBJECT.to_owned(),
        exp: expiry_date.unix_timestamp(),
    };
    sign(secret, &claim)
}

pub fn verify_session_token(secret: &str, token: &str) -> Result<(), RequestError> {
    let claim: SessionClaim = verify(secret, token)?;
    if claim.sub != SESSION_SUBJECT {
        return Err(RequestError::NotAuthorized("Invalid session"));
    }
    if claim.exp < OffsetDateTime::now_utc().unix_timestamp() {
        return Err(RequestError::NotAuthorized("Session expired"));
    }
    Ok(())
}

fn get_flash_token(secret: &str, message: &str) -> Result<String> {
    let claim = FlashClaim {
        msg: message.to_owned(),
        exp: (OffsetDateTime::now_utc() + FLASH_DURATION).unix_timestamp(),
    };
    sign(secret, &claim)
}

fn read_flash_token(secret: &str, token: &str) -> Option<String> {
    verify::<FlashClaim>(secret, token).ok().map(|claim| claim.msg)
}

// ----------------- Passwords -----------------

/// Checks `password` against the stored admin hash. A missing record never
/// matches.
pub async fn check_admin_password(pool: &SqlitePool, password: String) -> Result<bool, RequestError> {
    let hash = match get_admin_password_hash(pool).await? {
        Some(hash) => hash,
        None => {
            log::warn!("No admin password is stored, login is impossible");
            return Ok(false);
        }
    };
    verify_password_argon2(password, &hash)
        .await
        .map_err(|_| RequestError::ServerError)
}

pub async fn verify_password_argon2(password: String, hash: &str) -> Result<bool> {
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || {
        let hash = PasswordHash::new(hash.as_str())
            .map_err(|_| anyhow::anyhow!("Stored password hash is malformed"))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok())
    })
    .await
    .context("Failed to verify password")?
}

pub async fn hash_password_argon2(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(rand::thread_rng());
        let hash = PasswordHash::generate(Argon2::default(), password, salt.as_salt())
            .map_err(|_| anyhow::anyhow!("Failed to hash password"))?;
        Ok(hash.to_string())
    })
    .await
    .context("Failed to hash password")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    #[test]
    fn session_tokens_verify_only_with_their_secret() {
        let token = get_session_token(SECRET).unwrap();
        assert!(verify_session_token(SECRET, &token).is_ok());
        assert!(verify_session_token("another-secret", &token).is_err());
        assert!(verify_session_token(SECRET, "garbage").is_err());
    }

    #[test]
    fn flash_tokens_carry_the_message() {
        let token = get_flash_token(SECRET, "Password changed").unwrap();
        assert_eq!(
            read_flash_token(SECRET, &token).as_deref(),
            Some("Password changed")
        );
        assert_eq!(read_flash_token("another-secret", &token), None);
    }

    #[test]
    fn cookies_are_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; plog_session=abc.def; other=1"),
        );
        assert_eq!(cookie_value(&headers, SESSION_COOKIE), Some("abc.def"));
        assert_eq!(cookie_value(&headers, FLASH_COOKIE), None);
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn password_hash_round_trip() {
        let hash = hash_password_argon2("s3cret".to_owned()).await.unwrap();
        assert!(verify_password_argon2("s3cret".to_owned(), &hash).await.unwrap());
        assert!(!verify_password_argon2("wrong".to_owned(), &hash).await.unwrap());
    }

    #[tokio::test]
    async fn admin_password_is_checked_against_the_store() {
        let (_dir, pool) = crate::test_helpers::test_pool().await;
        assert!(!check_admin_password(&pool, DEFAULT_ADMIN_PASSWORD.to_owned()).await.unwrap());

        assert!(crate::db_helpers::ensure_admin_password(&pool).await.unwrap());
        assert!(!crate::db_helpers::ensure_admin_password(&pool).await.unwrap());
        assert!(check_admin_password(&pool, DEFAULT_ADMIN_PASSWORD.to_owned()).await.unwrap());
        assert!(!check_admin_password(&pool, "nope".to_owned()).await.unwrap());
    }
}
