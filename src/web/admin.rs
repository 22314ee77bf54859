//! Super-admin endpoints: moderation queue, reports, decisions, unban.

use crate::app_config::AppConfig;
use crate::db::Store;
use crate::error::ForumError;
use crate::middleware::ClientCtx;
use crate::orm::posts::PostStatus;
use crate::post::{self, Audience, ModerationAction};
use crate::report;
use crate::user;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_queue)
        .service(view_reports)
        .service(moderate_post)
        .service(unban_user);
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModerateForm {
    pub action: String,
}

/// Posts in one status, newest first. Defaults to the pending queue.
#[get("/api/admin/posts")]
pub async fn view_queue(
    req: HttpRequest,
    client: ClientCtx,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    query: web::Query<QueueQuery>,
) -> Result<HttpResponse, ForumError> {
    client.require_admin(&req, &config.auth)?;

    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => PostStatus::Pending,
        Some(raw) => {
            PostStatus::parse(raw).ok_or_else(|| ForumError::validation("invalid status"))?
        }
    };

    let posts = post::list_by_status(
        store.conn(),
        status,
        config.posting.page_size,
        Audience::Admin,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "posts": posts })))
}

#[get("/api/admin/reports")]
pub async fn view_reports(
    req: HttpRequest,
    client: ClientCtx,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ForumError> {
    client.require_admin(&req, &config.auth)?;

    let reports = report::list_reports(store.conn()).await?;
    Ok(HttpResponse::Ok().json(json!({ "reports": reports })))
}

#[post("/api/admin/posts/{post_id}/moderate")]
pub async fn moderate_post(
    req: HttpRequest,
    client: ClientCtx,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    path: web::Path<i32>,
    form: web::Json<ModerateForm>,
) -> Result<HttpResponse, ForumError> {
    client.require_admin(&req, &config.auth)?;

    let action =
        ModerationAction::parse(&form.action).ok_or_else(|| ForumError::validation("invalid action"))?;
    let outcome = post::moderate(
        &store,
        path.into_inner(),
        action,
        &config.auth.super_admin_username,
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "action": outcome.action,
        "author_banned": outcome.author_banned,
    })))
}

#[post("/api/admin/users/{user_id}/unban")]
pub async fn unban_user(
    req: HttpRequest,
    client: ClientCtx,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ForumError> {
    client.require_admin(&req, &config.auth)?;

    if !user::unban(&store, path.into_inner()).await? {
        return Err(ForumError::not_found("user not found"));
    }
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}
