use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use tera::Context;
use tracing::instrument;

use super::{
    dto::{GenerateParams, HistoryEntry, SaveHistoryRequest},
    services::{list_history, render_png, save_history},
};
use crate::{
    auth::session::{CurrentUser, MaybeUser},
    error::{AppError, AppResult},
    pages,
    state::AppState,
};

pub fn qr_routes() -> Router<AppState> {
    Router::new()
        .route("/generate_qr_code", post(generate_qr_code))
        .route("/save_qr_history", post(save_qr_history))
        .route("/history", get(history))
}

/// POST /generate_qr_code?data=... (or `data` as a form field)
#[instrument(skip_all)]
pub async fn generate_qr_code(
    Query(query): Query<GenerateParams>,
    form: Option<Form<GenerateParams>>,
) -> AppResult<impl IntoResponse> {
    let data = query
        .data
        .or_else(|| form.and_then(|Form(f)| f.data))
        .ok_or_else(|| AppError::Validation("data is required".into()))?;
    let png = render_png(&data)?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        png,
    ))
}

#[instrument(skip(state, user, body))]
pub async fn save_qr_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<SaveHistoryRequest>,
) -> AppResult<(StatusCode, Json<HistoryEntry>)> {
    let entry = save_history(&state, &user, body).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

/// GET /history: JSON for API clients, an HTML page otherwise.
#[instrument(skip_all)]
pub async fn history(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
) -> AppResult<Response> {
    let json = wants_json(&headers);
    let Some(user) = user else {
        if json {
            return Err(AppError::Unauthorized);
        }
        return Ok(Redirect::to("/").into_response());
    };

    let entries = list_history(&state, &user).await?;
    if json {
        return Ok(Json(entries).into_response());
    }
    let mut ctx = Context::new();
    ctx.insert("entries", &entries);
    Ok(pages::render("history.html", &ctx)?.into_response())
}
