mod config;
mod engine;
mod handlers;
mod models;
mod routes;
mod state;

use crate::config::Config;
use crate::engine::dispatcher::broadcast_server_status;
use crate::state::{AppState, ServerStatus, SharedState};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("{e}, falling back to defaults");
        Config::default()
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    std::panic::set_hook(Box::new(|info| {
        error!("panic: {info}");
    }));
    info!(
        environment = %config.environment,
        build = %config.build_number,
        "starting room hub"
    );

    let state = AppState::new(config);
    let _hw_sampler = handlers::health::start_hw_sampler();

    let app = routes::api::build_router(state.clone());
    let addr = state.config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            return;
        }
    };
    info!("listening on {addr}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
    {
        error!("server error: {e}");
    }
    info!("server stopped");
}

/// Wait for SIGINT or SIGTERM, then warn every room, stop the housekeepers
/// and give clients a moment to disconnect on their own terms.
async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("failed to listen for sigterm: {e}"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("shutdown requested");
    state.stop_housekeepers();
    broadcast_server_status(&state, ServerStatus::ShuttingDown).await;
    tokio::time::sleep(Duration::from_secs(state.config.shutdown_wait_sec)).await;
}
