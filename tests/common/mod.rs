//! Shared integration test scaffolding
#![allow(dead_code)]
#![allow(unused_macros)]

pub mod database;
pub mod fixtures;

use actix_web::web::Data;
use treehole::app_config::AppConfig;
use treehole::db::Store;
use treehole::rate_limit::PostCooldown;
use treehole::sensitive::SensitiveWords;

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const SUPER_ADMIN: &str = "signupbook";
pub const PASSWORD: &str = "password123";

/// Everything a test app is built from, kept so tests can inspect the store.
pub struct TestState {
    pub store: Data<Store>,
    pub config: Data<AppConfig>,
    pub words: Data<SensitiveWords>,
    pub cooldown: Data<PostCooldown>,
}

impl TestState {
    pub async fn new(config: AppConfig) -> Self {
        let store = database::setup_test_store()
            .await
            .expect("in-memory database should open");
        let words = SensitiveWords::new(config.moderation.sensitive_words.iter());
        let cooldown = PostCooldown::new(
            config.posting.cooldown(),
            config.rate_limit.max_tracked_ips,
        );
        Self {
            store: Data::new(store),
            config: Data::new(config),
            words: Data::new(words),
            cooldown: Data::new(cooldown),
        }
    }

    pub async fn with_defaults() -> Self {
        Self::new(test_config()).await
    }
}

/// Defaults with a known admin token, no post cooldown and one banned word.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.admin_token = ADMIN_TOKEN.to_string();
    config.auth.super_admin_username = SUPER_ADMIN.to_string();
    config.posting.cooldown_seconds = 0;
    config.moderation.sensitive_words = vec!["forbidden".to_string()];
    config
}

/// Build the service the way the binary does, minus logging and headers.
macro_rules! test_app {
    ($state:expr) => {{
        let state: &common::TestState = &$state;
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(state.store.clone())
                .app_data(state.config.clone())
                .app_data(state.words.clone())
                .app_data(state.cooldown.clone())
                .wrap(treehole::middleware::ClientCtx::default())
                .wrap(treehole::web::session_middleware(
                    actix_web::cookie::Key::generate(),
                    7,
                ))
                .configure(treehole::web::configure),
        )
        .await
    }};
}

/// Send a `TestRequest` and return `(status, json body, session cookie if set)`.
macro_rules! send {
    ($app:expr, $req:expr) => {{
        let resp = actix_web::test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == treehole::web::SESSION_COOKIE_NAME)
            .map(|c| c.into_owned());
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        (status, body, cookie)
    }};
}

/// Register `$name` with [`PASSWORD`], log in, and return the session cookie.
macro_rules! sign_in {
    ($app:expr, $name:expr) => {{
        let (status, _, _) = send!(
            $app,
            actix_web::test::TestRequest::post()
                .uri("/api/auth/register")
                .set_json(serde_json::json!({ "username": $name, "password": common::PASSWORD }))
        );
        assert_eq!(status, actix_web::http::StatusCode::CREATED, "register {}", $name);

        let (status, _, cookie) = send!(
            $app,
            actix_web::test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(serde_json::json!({ "username": $name, "password": common::PASSWORD }))
        );
        assert_eq!(status, actix_web::http::StatusCode::OK, "login {}", $name);
        cookie.expect("login should set the session cookie")
    }};
}
