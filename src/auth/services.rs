use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        oauth::UserInfo,
        password::{hash_password_blocking, verify_password_blocking},
        repo_types::User,
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    Ok(email)
}

pub async fn register_local(state: &AppState, email: &str, password: &str) -> AppResult<User> {
    let email = normalize_email(email)?;
    if password.is_empty() {
        return Err(AppError::Validation("Password is required".into()));
    }

    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::DuplicateEmail);
    }

    let hash = hash_password_blocking(password.to_string()).await?;
    // The insert is conditional, so a racing registration still loses here.
    let user = state
        .store
        .create_user(&email, Some(&hash))
        .await?
        .ok_or(AppError::DuplicateEmail)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Checks local credentials. Unknown emails, OAuth-only accounts and wrong
/// passwords are indistinguishable to the caller.
pub async fn authenticate_local(state: &AppState, email: &str, password: &str) -> AppResult<User> {
    let email = email.trim().to_lowercase();
    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };
    let Some(hash) = user.password_hash.clone() else {
        warn!(%email, user_id = %user.id, "login to oauth-only account");
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password_blocking(password.to_string(), hash).await? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(user)
}

/// Looks up the local account for a federated identity, creating it on first login.
pub async fn find_or_create_federated(state: &AppState, info: &UserInfo) -> AppResult<User> {
    let email = info.email().ok_or(AppError::UserInfoUnavailable)?;
    if let Some(user) = state.store.find_user_by_email(&email).await? {
        return Ok(user);
    }
    match state.store.create_user(&email, None).await? {
        Some(user) => {
            info!(user_id = %user.id, email = %user.email, "user created from oauth");
            Ok(user)
        }
        // Lost a race with a concurrent first login.
        None => state
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AppError::NotFound),
    }
}
