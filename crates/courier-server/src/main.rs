mod config;
mod logging;
mod purge;

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use courier_api::AppStateInner;
use courier_db::Database;
use courier_types::models::Role;

use crate::config::Config;

const PURGE_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            eprintln!("       Set COURIER_JWT_SECRET to a long random value, e.g.");
            eprintln!("       openssl rand -base64 48");
            std::process::exit(1);
        }
    };

    let _guard = logging::init(config.request_log_dir.as_deref());

    let db = Database::open(&config.db_path)?;
    for username in &config.admins {
        if db.set_user_role(username, Role::Admin.as_str())? {
            info!("Granted admin role to {}", username);
        } else {
            warn!("COURIER_ADMINS names unknown user '{}'", username);
        }
    }
    let state = AppStateInner::new(db, config.api.clone());

    tokio::spawn(purge::run_purge_loop(state.clone(), PURGE_INTERVAL_SECS));

    let app = courier_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Courier server listening on {}", config.addr);
    if let Some(window) = config.api.restricted_hours {
        info!(
            "Chat endpoints closed between {:02}:00 and {:02}:00 UTC",
            window.start_hour, window.end_hour
        );
    }

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Courier server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
