//! Server-rendered HTML pages, with templates embedded in the binary.

use axum::{
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use lazy_static::lazy_static;
use tera::{Context, Tera};

use crate::{
    auth::session::MaybeUser,
    error::{AppError, AppResult},
    state::AppState,
};

lazy_static! {
    static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", include_str!("../templates/base.html")),
            ("home.html", include_str!("../templates/home.html")),
            ("register.html", include_str!("../templates/register.html")),
            ("qrcode.html", include_str!("../templates/qrcode.html")),
            ("history.html", include_str!("../templates/history.html")),
        ])
        .expect("embedded templates parse");
        tera
    };
}

pub fn render(template: &str, context: &Context) -> AppResult<Html<String>> {
    TEMPLATES
        .render(template, context)
        .map(Html)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("render {template}: {e:?}")))
}

pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/qrcode", get(qrcode_page))
        .route("/register", get(register_page))
}

pub async fn index(MaybeUser(user): MaybeUser) -> AppResult<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/qrcode").into_response());
    }
    Ok(render("home.html", &Context::new())?.into_response())
}

pub async fn qrcode_page(MaybeUser(user): MaybeUser) -> AppResult<Response> {
    let Some(user) = user else {
        return Ok(Redirect::to("/").into_response());
    };
    let mut ctx = Context::new();
    ctx.insert("user_name", user.display_name());
    Ok(render("qrcode.html", &ctx)?.into_response())
}

pub async fn register_page() -> AppResult<Html<String>> {
    render("register.html", &Context::new())
}
