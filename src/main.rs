use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::settings::AppConfig;
use crate::modules::catalog::{ManifestCatalog, MediaCatalog, PgCatalog};
use crate::state::AppState;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new();
    let catalog = open_catalog(&config).await?;
    let port = config.server_port;

    let state = AppState::new(config, catalog);
    let shutdown = CancellationToken::new();

    let watchdog = tokio::spawn(workers::watchdog::start_watchdog(
        state.clone(),
        shutdown.clone(),
    ));

    let app = app::create_app(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server running on http://{}", addr);
    info!("Swagger UI at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone(), shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Err(e) = watchdog.await {
        warn!(error = %e, "watchdog task ended abnormally");
    }
    info!("Server stopped");
    Ok(())
}

async fn open_catalog(config: &AppConfig) -> anyhow::Result<Arc<dyn MediaCatalog>> {
    match &config.database_url {
        Some(url) => {
            let pool = infrastructure::db::pool::connect_to_db(url)
                .await
                .context("connecting to catalog database")?;
            Ok(Arc::new(PgCatalog::new(pool)))
        }
        None => {
            let catalog = ManifestCatalog::load(&config.catalog_file)
                .await
                .with_context(|| format!("loading catalog {}", config.catalog_file.display()))?;
            info!("📚 Using manifest catalog {}", config.catalog_file.display());
            Ok(Arc::new(catalog))
        }
    }
}

/// Waits for Ctrl-C or SIGTERM, then kills every running transcoder before
/// the server stops accepting work.
async fn shutdown_signal(state: AppState, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
    state.supervisor.shutdown().await;
}
