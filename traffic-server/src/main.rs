use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use tracing::info;

use traffic_server::github::GitHubClient;
use traffic_server::service::CacheService;
use traffic_server::theme::ThemeStore;
use traffic_server::{routes, settings};

const SETTINGS_ENV: &str = "TRAFFIC_CONFIG";
const DEFAULT_SETTINGS_PATH: &str = "traffic.toml";

#[tokio::main]
async fn main() -> Result<()> {
    shared::init_tracing!()?;
    let config = shared::load_config!()?;

    let settings_path =
        PathBuf::from(env::var(SETTINGS_ENV).unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_owned()));
    let settings = settings::load(&settings_path)
        .with_context(|| format!("Can't load settings from {}", settings_path.display()))?;

    let themes = match &settings.themes_dir {
        Some(dir) => ThemeStore::new(dir.clone()),
        None => ThemeStore::bundled(),
    };
    info!("loading themes from {}", themes.dir().display());
    let source = GitHubClient::new(&config.token, settings.fetch_concurrency)
        .context("Error creating GitHub client")?;

    let service = Arc::new(CacheService::new(Arc::new(source), themes, settings));
    service.start();

    let app = Router::new()
        .route("/", get(routes::root))
        .route("/api", get(routes::traffic_chart))
        .with_state(Arc::clone(&service));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    info!("listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("server error")?;

    service.shutdown();
    Ok(())
}
