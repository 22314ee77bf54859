use actix_web::cookie::Key;
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use env_logger::Env;
use rand::{distributions::Alphanumeric, Rng};
use std::path::Path;
use std::time::Duration;
use treehole::app_config::AppConfig;
use treehole::classifier::ContentClassifier;
use treehole::db::Store;
use treehole::middleware::ClientCtx;
use treehole::rate_limit::PostCooldown;
use treehole::sensitive::SensitiveWords;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_lib_mods();

    let config = AppConfig::load().expect("Failed to load configuration");
    let store = Data::new(
        Store::connect(&config.database.url)
            .await
            .expect("Failed to open database"),
    );

    let words = Data::new(SensitiveWords::load(
        Path::new(&config.moderation.sensitive_words_file),
        &config.moderation.sensitive_words,
    ));

    let cooldown = Data::new(PostCooldown::new(
        config.posting.cooldown(),
        config.rate_limit.max_tracked_ips,
    ));

    let classifier = if config.ai_moderation.enabled {
        let classifier = ContentClassifier::from_config(&config.ai_moderation)
            .expect("Failed to build moderation HTTP client");
        log::info!("External content classifier enabled");
        Some(Data::new(classifier))
    } else {
        None
    };

    let secret_key = match Key::try_from(config.server.secret_key.as_bytes()) {
        Ok(key) => key,
        Err(err) => {
            let random_string: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(128)
                .map(char::from)
                .collect();
            log::warn!("server.secret_key was invalid. Reason: {:?}\r\nThis means the key used for signing session cookies will invalidate every time the application is restarted. A secret key must be at least 64 bytes to be accepted.", err);
            Key::from(random_string.as_bytes())
        }
    };

    // Spawn post cooldown cleanup task
    {
        let cooldown = cooldown.clone();
        actix_web::rt::spawn(async move {
            let mut interval = actix_web::rt::time::interval(Duration::from_secs(300)); // Every 5 minutes
            loop {
                interval.tick().await;
                let evicted = cooldown.evict_expired();
                log::debug!(
                    "Post cooldown cleanup: evicted={} tracked={}",
                    evicted,
                    cooldown.tracked_ips()
                );
            }
        });
    }

    let bind = (config.server.host.clone(), config.server.port);
    let session_days = config.auth.session_days;
    let config = Data::new(config);
    log::info!("Treehole listening on http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(store.clone())
            .app_data(config.clone())
            .app_data(words.clone())
            .app_data(cooldown.clone());
        if let Some(classifier) = &classifier {
            app = app.app_data(classifier.clone());
        }

        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        app
            // Security headers - applied to all responses
            .wrap(
                DefaultHeaders::new()
                    .add((header::X_FRAME_OPTIONS, "DENY"))
                    .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                    .add(("Referrer-Policy", "strict-origin-when-cross-origin")),
            )
            .wrap(ClientCtx::default())
            .wrap(treehole::web::session_middleware(
                secret_key.clone(),
                session_days,
            ))
            .wrap(Logger::new("%a \"%r\" %s %Dms"))
            .configure(treehole::web::configure)
    })
    .bind(bind)?
    .run()
    .await
}

/// Initialize third party crates we rely on but don't have control over.
pub fn init_lib_mods() {
    // A missing .env file is fine; the environment may be set another way.
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}
