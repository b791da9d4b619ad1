//! Browser sessions kept in HMAC-signed cookies.
//!
//! The payload is a [`SessionUser`] serialised as JSON and base64url-encoded so
//! that it survives cookie value rules. The signature comes from
//! [`SignedCookieJar`]; the embedded `expires_at` is checked on every read.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{error::AppError, state::AppState};

pub const SESSION_COOKIE: &str = "session";
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Identity of the signed-in browser user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub email: String,
    pub name: Option<String>,
    /// Raw provider claims for OAuth logins, `null` for local logins.
    #[serde(default)]
    pub claims: serde_json::Value,
    pub expires_at: i64,
}

impl SessionUser {
    pub fn new(
        email: impl Into<String>,
        name: Option<String>,
        claims: serde_json::Value,
        ttl: Duration,
    ) -> Self {
        Self {
            email: email.into(),
            name,
            claims,
            expires_at: (OffsetDateTime::now_utc() + ttl).unix_timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= OffsetDateTime::now_utc().unix_timestamp()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

pub(crate) fn put_json_cookie<T: Serialize>(
    jar: SignedCookieJar,
    name: &'static str,
    value: &T,
    max_age: Duration,
    secure: bool,
) -> anyhow::Result<SignedCookieJar> {
    let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?);
    let cookie = Cookie::build((name, encoded))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age);
    Ok(jar.add(cookie))
}

pub(crate) fn read_json_cookie<T: DeserializeOwned>(jar: &SignedCookieJar, name: &str) -> Option<T> {
    let cookie = jar.get(name)?;
    let raw = URL_SAFE_NO_PAD.decode(cookie.value()).ok()?;
    match serde_json::from_slice(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(error = %e, cookie = name, "undecodable cookie payload");
            None
        }
    }
}

pub(crate) fn remove_cookie(jar: SignedCookieJar, name: &'static str) -> SignedCookieJar {
    jar.remove(Cookie::build(name).path("/"))
}

/// The bearer token for browser clients that also want to call the API.
pub fn set_access_token(
    jar: SignedCookieJar,
    token: String,
    ttl: Duration,
    secure: bool,
) -> SignedCookieJar {
    let cookie = Cookie::build((ACCESS_TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(ttl);
    jar.add(cookie)
}

pub fn set(jar: SignedCookieJar, user: &SessionUser, secure: bool) -> anyhow::Result<SignedCookieJar> {
    let remaining = user.expires_at - OffsetDateTime::now_utc().unix_timestamp();
    put_json_cookie(jar, SESSION_COOKIE, user, Duration::seconds(remaining.max(0)), secure)
}

pub fn get(jar: &SignedCookieJar) -> Option<SessionUser> {
    let user: SessionUser = read_json_cookie(jar, SESSION_COOKIE)?;
    if user.is_expired() {
        debug!(email = %user.email, "session expired");
        return None;
    }
    Some(user)
}

/// Drops every piece of session state. Safe to call on an empty jar.
pub fn clear(jar: SignedCookieJar) -> SignedCookieJar {
    let jar = remove_cookie(jar, SESSION_COOKIE);
    let jar = remove_cookie(jar, ACCESS_TOKEN_COOKIE);
    remove_cookie(jar, OAUTH_STATE_COOKIE)
}

/// Requires a live session.
pub struct CurrentUser(pub SessionUser);

/// Session user if there is one.
pub struct MaybeUser(pub Option<SessionUser>);

fn jar_from_parts(parts: &Parts, state: &AppState) -> SignedCookieJar {
    SignedCookieJar::from_headers(&parts.headers, state.cookie_key.clone())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        get(&jar_from_parts(parts, state))
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(get(&jar_from_parts(parts, state))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn jar() -> SignedCookieJar {
        SignedCookieJar::new(Key::generate())
    }

    /// Replays the `Set-Cookie` output of a jar as a request `Cookie` header.
    fn reload(jar: SignedCookieJar, key: Key) -> SignedCookieJar {
        use axum::response::IntoResponse;

        let res = jar.into_response();
        let header = res
            .headers()
            .get_all(axum::http::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter(|pair| !pair.ends_with('='))
            .collect::<Vec<_>>()
            .join("; ");
        let mut headers = HeaderMap::new();
        if !header.is_empty() {
            headers.insert(axum::http::header::COOKIE, header.parse().unwrap());
        }
        SignedCookieJar::from_headers(&headers, key)
    }

    #[test]
    fn set_then_get_roundtrip() {
        let key = Key::generate();
        let user = SessionUser::new("a@b.com", None, serde_json::Value::Null, Duration::hours(1));
        let jar = set(SignedCookieJar::new(key.clone()), &user, false).unwrap();
        let reloaded = reload(jar, key);
        assert_eq!(get(&reloaded), Some(user));
    }

    #[test]
    fn cookie_signed_by_other_key_is_ignored() {
        let user = SessionUser::new("a@b.com", None, serde_json::Value::Null, Duration::hours(1));
        let jar = set(SignedCookieJar::new(Key::generate()), &user, false).unwrap();
        let reloaded = reload(jar, Key::generate());
        assert_eq!(get(&reloaded), None);
    }

    #[test]
    fn expired_session_reads_as_absent() {
        let key = Key::generate();
        let mut user = SessionUser::new("a@b.com", None, serde_json::Value::Null, Duration::hours(1));
        user.expires_at = OffsetDateTime::now_utc().unix_timestamp() - 5;
        let jar = put_json_cookie(
            SignedCookieJar::new(key.clone()),
            SESSION_COOKIE,
            &user,
            Duration::hours(1),
            false,
        )
        .unwrap();
        assert_eq!(get(&reload(jar, key)), None);
    }

    #[test]
    fn clear_is_idempotent() {
        let once = clear(jar());
        assert_eq!(get(&once), None);
        let twice = clear(once);
        assert_eq!(get(&twice), None);
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let anon = SessionUser::new("a@b.com", None, serde_json::Value::Null, Duration::hours(1));
        assert_eq!(anon.display_name(), "a@b.com");
        let named = SessionUser::new("a@b.com", Some("Alice".into()), serde_json::Value::Null, Duration::hours(1));
        assert_eq!(named.display_name(), "Alice");
    }
}
