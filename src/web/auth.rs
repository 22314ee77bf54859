//! Account endpoints: register, login, logout, current identity.

use super::store_token;
use crate::app_config::AppConfig;
use crate::db::Store;
use crate::error::ForumError;
use crate::middleware::ClientCtx;
use crate::session;
use crate::user::{self, NewUser, UserView};
use actix_session::Session;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(register)
        .service(login)
        .service(logout)
        .service(me);
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[post("/api/auth/register")]
pub async fn register(
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    form: web::Json<NewUser>,
) -> Result<HttpResponse, ForumError> {
    let user = user::register(&store, &config.auth.admin_set(), &form).await?;
    Ok(HttpResponse::Created().json(json!({
        "ok": true,
        "user": UserView::from(&user),
    })))
}

#[post("/api/auth/login")]
pub async fn login(
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    cookies: Session,
    form: web::Json<LoginForm>,
) -> Result<HttpResponse, ForumError> {
    let user = user::authenticate(store.conn(), &form.username, &form.password).await?;
    if user.is_banned {
        log::debug!("Login refused for banned user_id={}", user.id);
        return Err(ForumError::Forbidden(user::ban_message(
            user.ban_reason.as_deref(),
        )));
    }

    let token = session::issue(&store, user.id, config.auth.session_ttl()).await?;
    store_token(&cookies, token)?;

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "user": {
            "id": user.id,
            "username": user.username,
            "is_admin": user.is_admin,
            "is_banned": user.is_banned,
        },
    })))
}

/// Always succeeds, with or without a session.
#[post("/api/auth/logout")]
pub async fn logout(
    client: ClientCtx,
    store: web::Data<Store>,
    cookies: Session,
) -> Result<HttpResponse, ForumError> {
    if let Some(token) = client.get_token() {
        session::revoke(&store, token).await?;
    }
    cookies.purge();

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

#[get("/api/auth/me")]
pub async fn me(client: ClientCtx) -> HttpResponse {
    match client.get_user() {
        Some(user) => HttpResponse::Ok().json(json!({
            "logged_in": true,
            "user": UserView::from(user),
        })),
        None => HttpResponse::Ok().json(json!({ "logged_in": false })),
    }
}
