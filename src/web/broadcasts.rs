use crate::app_config::AppConfig;
use crate::broadcast::{self, NewBroadcast};
use crate::db::Store;
use crate::error::ForumError;
use crate::middleware::ClientCtx;
use crate::user;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde_json::json;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_broadcasts).service(create_broadcast);
}

#[get("/api/broadcasts")]
pub async fn view_broadcasts(store: web::Data<Store>) -> Result<HttpResponse, ForumError> {
    let broadcasts = broadcast::list(store.conn()).await?;
    Ok(HttpResponse::Ok().json(json!({ "broadcasts": broadcasts })))
}

/// Published under the admin's account, or as "system" with the token header.
#[post("/api/admin/broadcasts")]
pub async fn create_broadcast(
    req: HttpRequest,
    client: ClientCtx,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    form: web::Json<NewBroadcast>,
) -> Result<HttpResponse, ForumError> {
    client.require_admin(&req, &config.auth)?;

    let author = client
        .get_user()
        .filter(|u| user::is_protected(&u.username, &config.auth.super_admin_username))
        .map(|u| u.id);
    let created = broadcast::publish(&store, &form, author).await?;
    Ok(HttpResponse::Created().json(json!({ "ok": true, "id": created.id })))
}
