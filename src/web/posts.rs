//! Public post endpoints: feed, listings, submission, comments, votes and reports.

use super::json_or_default;
use crate::app_config::AppConfig;
use crate::classifier::ContentClassifier;
use crate::db::Store;
use crate::error::ForumError;
use crate::ip;
use crate::middleware::ClientCtx;
use crate::post::{self, NewPost, PostSubmission, SubmitPolicy};
use crate::rate_limit::PostCooldown;
use crate::report::{self, Reporter};
use crate::sensitive::SensitiveWords;
use crate::user;
use actix_session::Session;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_feed)
        .service(create_post)
        .service(view_search)
        .service(view_hot)
        .service(view_topic)
        .service(view_comments)
        .service(create_comment)
        .service(cast_vote)
        .service(report_post);
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopicQuery {
    pub tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VoteForm {
    pub value: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReportForm {
    pub reason: Option<String>,
}

#[get("/api/posts")]
pub async fn view_feed(
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ForumError> {
    let posts = post::list_approved(store.conn(), config.posting.page_size).await?;
    Ok(HttpResponse::Ok().json(json!({ "posts": posts })))
}

#[allow(clippy::too_many_arguments)]
#[post("/api/posts")]
pub async fn create_post(
    req: HttpRequest,
    client: ClientCtx,
    cookies: Session,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    words: web::Data<SensitiveWords>,
    cooldown: web::Data<PostCooldown>,
    classifier: Option<web::Data<ContentClassifier>>,
    form: web::Json<NewPost>,
) -> Result<HttpResponse, ForumError> {
    let author = client.get_user();
    if config.posting.require_login && author.is_none() {
        return Err(ForumError::Unauthorized("login required".to_string()));
    }
    if let Some(user) = author.filter(|u| u.is_banned) {
        return Err(ForumError::Forbidden(user::ban_message(
            user.ban_reason.as_deref(),
        )));
    }

    let client_ip = ip::client_ip_or_unknown(&req);
    let permit = cooldown.try_acquire(&client_ip).map_err(|e| {
        log::debug!("Post cooldown: ip={} retry_after={}s", client_ip, e.retry_after_seconds);
        ForumError::RateLimited {
            retry_after_seconds: e.retry_after_seconds,
        }
    })?;

    let submission = PostSubmission::from_input(&form, config.posting.max_content_length)?;

    // The classifier is only consulted for text the word list let through.
    let verdict = match classifier.as_deref() {
        Some(classifier) if submission.scan(&words).is_empty() => {
            Some(classifier.classify(&submission.content).await)
        }
        _ => None,
    };

    let policy = SubmitPolicy {
        auto_ban_on_sensitive: config.moderation.auto_ban_on_sensitive,
        super_admin: &config.auth.super_admin_username,
    };
    let created = match post::create_post(
        &store,
        &words,
        &submission,
        client.get_id(),
        policy,
        verdict.as_ref(),
    )
    .await
    {
        Ok(created) => created,
        // The ban already revoked the server-side session.
        Err(
            err @ ForumError::ContentBanned {
                account_banned: true,
                ..
            },
        ) => {
            cookies.purge();
            return Err(err);
        }
        Err(err) => return Err(err),
    };
    permit.commit();

    Ok(HttpResponse::Created().json(json!({
        "ok": true,
        "id": created.id,
        "status": created.status,
        "flagged": created.flagged,
        "sensitive_hits": created.sensitive_hits,
    })))
}

#[get("/api/search")]
pub async fn view_search(
    store: web::Data<Store>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ForumError> {
    let posts = post::search(store.conn(), query.q.as_deref().unwrap_or("")).await?;
    Ok(HttpResponse::Ok().json(json!({ "posts": posts })))
}

#[get("/api/hot")]
pub async fn view_hot(store: web::Data<Store>) -> Result<HttpResponse, ForumError> {
    let posts = post::hot(store.conn()).await?;
    Ok(HttpResponse::Ok().json(json!({ "posts": posts })))
}

#[get("/api/topics")]
pub async fn view_topic(
    store: web::Data<Store>,
    query: web::Query<TopicQuery>,
) -> Result<HttpResponse, ForumError> {
    let (tag, posts) = post::list_by_tag(store.conn(), query.tag.as_deref().unwrap_or("")).await?;
    Ok(HttpResponse::Ok().json(json!({ "tag": tag, "posts": posts })))
}

#[get("/api/posts/{post_id}/comments")]
pub async fn view_comments(
    store: web::Data<Store>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ForumError> {
    let comments = post::list_comments(store.conn(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "comments": comments })))
}

#[post("/api/posts/{post_id}/comments")]
pub async fn create_comment(
    client: ClientCtx,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    path: web::Path<i32>,
    form: web::Json<CommentForm>,
) -> Result<HttpResponse, ForumError> {
    let user = client.require_login()?;
    let comment = post::add_comment(
        &store,
        path.into_inner(),
        user.id,
        &form.content,
        config.posting.max_comment_length,
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({ "ok": true, "id": comment.id })))
}

#[post("/api/posts/{post_id}/vote")]
pub async fn cast_vote(
    client: ClientCtx,
    store: web::Data<Store>,
    path: web::Path<i32>,
    form: web::Json<VoteForm>,
) -> Result<HttpResponse, ForumError> {
    let user = client.require_login()?;
    let outcome = post::cast_vote(&store, path.into_inner(), user.id, form.value).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true, "updated": outcome.updated })))
}

/// Anyone may report. Logged-in reporters are told apart by account,
/// everyone else by IP.
#[post("/api/posts/{post_id}/report")]
pub async fn report_post(
    req: HttpRequest,
    client: ClientCtx,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    path: web::Path<i32>,
    body: web::Bytes,
) -> Result<HttpResponse, ForumError> {
    let post_id = path.into_inner();
    let form: ReportForm = json_or_default(&body)?;
    let reporter = Reporter {
        user_id: client.get_id(),
        ip: ip::client_ip_or_unknown(&req),
    };

    let outcome = report::report_post(
        &store,
        post_id,
        &reporter,
        form.reason.as_deref(),
        config.moderation.report_hide_threshold,
    )
    .await?;
    if outcome.duplicate {
        return Err(ForumError::Conflict("already reported".to_string()));
    }

    if config.moderation.ban_author_on_report {
        if let Some(author_id) = outcome.post_author_id {
            let reason = format!("reported post #{}", post_id);
            user::ban(&store, &config.auth.super_admin_username, author_id, &reason).await?;
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "auto_hidden": outcome.auto_hidden,
        "report_count": outcome.report_count,
    })))
}
