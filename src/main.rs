// src/main.rs
mod announcements;
mod auth;
mod backend;
mod config;
mod handlers;
mod models;
mod notify;
mod poller;
mod preferences;
mod query;
mod social;
mod state;
mod storage;
mod tickets;
mod utils;

use actix_web::{App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::rest::RestBackend;
use crate::backend::RemoteBackend;
use crate::config::Config;
use crate::query::SampQuery;
use crate::state::AppState;
use crate::storage::local::LocalStorage;
use crate::storage::memory::MemoryBackend;

fn build_backend(config: &Config) -> std::io::Result<Arc<dyn RemoteBackend>> {
    match (&config.backend_url, &config.backend_api_key) {
        (Some(url), Some(key)) => {
            info!("Using hosted backend at {}", url);
            Ok(Arc::new(RestBackend::new(url.clone(), key.clone())))
        }
        _ => {
            warn!("BACKEND_URL/BACKEND_API_KEY not set, using in-memory backend");
            let backend = MemoryBackend::new();
            if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
                let hash = auth::hash_password(password).map_err(|e| {
                    std::io::Error::new(std::io::ErrorKind::Other, format!("Failed to hash admin password: {}", e))
                })?;
                backend.add_admin(email, hash);
                info!("Seeded admin account {}", email);
            }
            Ok(Arc::new(backend))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logger only once at the start
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    // Load configuration
    let config = Config::from_env();
    info!("Loaded configuration: {:?}", config);

    let backend = build_backend(&config)?;
    let storage = Arc::new(LocalStorage::open(&config.local_storage_path));
    let query = Arc::new(SampQuery::new(
        config.game_server_host.clone(),
        config.game_server_port,
        config.query_timeout(),
    ));

    let state = AppState::new(&config, backend, query, storage);

    let feed = state.feed.clone().into_inner();
    if let Err(e) = feed.refresh().await {
        error!("Initial announcement fetch failed: {}", e);
    }
    let listener = feed.listen();
    let poller = state.poller.clone().into_inner().spawn();

    let sessions = state.sessions.clone().into_inner();
    let janitor = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                info!("Purged {} expired admin sessions", purged);
            }
        }
    });

    let bind = config.bind();
    info!("Starting server on {}", bind);
    let app_state = state.clone();
    let result = HttpServer::new(move || App::new().configure(|cfg| app_state.configure(cfg)))
        .bind(&bind)?
        .run()
        .await;

    poller.stop();
    listener.abort();
    janitor.abort();
    result
}
