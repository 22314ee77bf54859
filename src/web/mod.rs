pub mod admin;
pub mod auth;
pub mod broadcasts;
pub mod posts;

use crate::error::ForumError;
use crate::middleware::SESSION_TOKEN_KEY;
use actix_session::config::PersistentSession;
use actix_session::storage::CookieSessionStore;
use actix_session::{Session, SessionMiddleware};
use actix_web::cookie::{time, Key, SameSite};
use actix_web::web;
use serde::de::DeserializeOwned;

/// Name of the cookie carrying the signed session.
pub const SESSION_COOKIE_NAME: &str = "session_token";

/// Configures the web app by adding services from each web file.
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut web::ServiceConfig) {
    conf.app_data(json_config()).app_data(path_config());

    // Order is important. Route resolution will stop at the first match.
    auth::configure(conf);
    admin::configure(conf);
    broadcasts::configure(conf);
    posts::configure(conf);
}

/// Malformed or oversized bodies get the same JSON error shape as everything else.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_BODY_LIMIT)
        .content_type_required(false)
        .error_handler(|err, _req| {
            log::debug!("Rejected JSON body: {}", err);
            ForumError::validation("invalid json").into()
        })
}

/// All path parameters are numeric ids.
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|_err, _req| ForumError::validation("invalid post id").into())
}

const JSON_BODY_LIMIT: usize = 64 * 1024;

/// Parse an optional JSON body. No body at all reads as the default value.
pub(crate) fn json_or_default<T>(body: &web::Bytes) -> Result<T, ForumError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| {
        log::debug!("Rejected JSON body: {}", err);
        ForumError::validation("invalid json")
    })
}

/// Signed cookie session, HTTP-only, site-wide, lasting `session_days`.
pub fn session_middleware(key: Key, session_days: u32) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(SESSION_COOKIE_NAME.to_string())
        .cookie_http_only(true)
        .cookie_path("/".to_string())
        .cookie_same_site(SameSite::Lax)
        .cookie_secure(false) // Allow HTTP for development
        .session_lifecycle(
            PersistentSession::default().session_ttl(time::Duration::days(i64::from(session_days))),
        )
        .build()
}

/// Put a freshly issued token into the cookie.
pub(crate) fn store_token(session: &Session, token: String) -> Result<(), ForumError> {
    session.renew();
    session
        .insert(SESSION_TOKEN_KEY, token)
        .map_err(|e| ForumError::Internal(format!("session cookie: {}", e)))
}
