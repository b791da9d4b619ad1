use axum::{
    extract::{FromRef, Path, Query, State},
    http::{header, HeaderMap},
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::SignedCookieJar;
use time::Duration;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{CallbackQuery, CredentialsForm, MessageResponse, TokenResponse},
        jwt::JwtKeys,
        oauth::PendingAuthorization,
        services::{authenticate_local, find_or_create_federated, register_local},
        session::{self, SessionUser, OAUTH_STATE_COOKIE},
    },
    error::{AppError, AppResult},
    state::AppState,
};

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/login/google", get(login_google))
        .route("/auth", get(auth_callback))
        .route("/verify-token/:token", get(verify_token))
        .route("/logout", get(logout))
}

#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Redirect> {
    register_local(&state, &form.email, &form.password).await?;
    Ok(Redirect::to("/"))
}

#[instrument(skip(state, jar, form))]
pub async fn login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<CredentialsForm>,
) -> AppResult<(SignedCookieJar, Json<TokenResponse>)> {
    let user = authenticate_local(&state, &form.email, &form.password).await?;

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.issue(&user.email, None)?;

    let session_user = SessionUser::new(
        user.email,
        None,
        serde_json::Value::Null,
        Duration::minutes(state.config.session.ttl_minutes),
    );
    let jar = session::set(jar, &session_user, state.config.is_production())?;

    Ok((
        jar,
        Json(TokenResponse {
            access_token,
            token_type: "bearer",
            expires_in: keys.ttl_seconds(),
        }),
    ))
}

#[instrument(skip_all)]
pub async fn verify_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    JwtKeys::from_ref(&state).verify(&token)?;
    Ok(Json(MessageResponse {
        message: "Token is valid",
    }))
}

/// Callback URL for the provider: configured explicitly or derived from `Host`.
fn callback_url(state: &AppState, headers: &HeaderMap) -> AppResult<String> {
    if let Some(url) = &state.config.oauth.redirect_url {
        return Ok(url.clone());
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing Host header".into()))?;
    let scheme = if state.config.is_production() { "https" } else { "http" };
    Ok(format!("{scheme}://{host}/auth"))
}

#[instrument(skip_all)]
pub async fn login_google(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: SignedCookieJar,
) -> AppResult<(SignedCookieJar, Redirect)> {
    let redirect_url = callback_url(&state, &headers)?;
    let request = state.identity.authorize(&redirect_url)?;
    let pending = PendingAuthorization {
        csrf_state: request.csrf_state,
        pkce_verifier: request.pkce_verifier,
        redirect_url,
    };
    let jar = session::put_json_cookie(
        jar,
        OAUTH_STATE_COOKIE,
        &pending,
        Duration::minutes(OAUTH_STATE_TTL_MINUTES),
        state.config.is_production(),
    )?;
    Ok((jar, Redirect::to(&request.url)))
}

#[instrument(skip_all)]
pub async fn auth_callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<CallbackQuery>,
) -> AppResult<(SignedCookieJar, Redirect)> {
    if let Some(error) = &query.error {
        warn!(%error, "provider returned an error");
        return Err(AppError::AuthenticationFailed);
    }
    let pending: PendingAuthorization =
        session::read_json_cookie(&jar, OAUTH_STATE_COOKIE).ok_or_else(|| {
            warn!("oauth callback without pending authorization");
            AppError::AuthenticationFailed
        })?;
    let (Some(code), Some(returned_state)) = (query.code, query.state) else {
        warn!("oauth callback missing code or state");
        return Err(AppError::AuthenticationFailed);
    };
    if returned_state != pending.csrf_state {
        warn!("oauth state mismatch");
        return Err(AppError::AuthenticationFailed);
    }

    let info = state
        .identity
        .exchange(&code, &pending.pkce_verifier, &pending.redirect_url)
        .await?;
    let user = find_or_create_federated(&state, &info).await?;

    let secure = state.config.is_production();
    let session_user = SessionUser::new(
        user.email.clone(),
        info.name(),
        info.claims,
        Duration::minutes(state.config.session.ttl_minutes),
    );
    let jar = session::remove_cookie(jar, OAUTH_STATE_COOKIE);
    let jar = session::set(jar, &session_user, secure)?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.issue(&user.email, None)?;
    let jar = session::set_access_token(jar, token, keys.ttl, secure);

    info!(user_id = %user.id, email = %user.email, "oauth login");
    Ok((jar, Redirect::to("/qrcode")))
}

#[instrument(skip_all)]
pub async fn logout(jar: SignedCookieJar) -> (SignedCookieJar, Redirect) {
    (session::clear(jar), Redirect::to("/"))
}
