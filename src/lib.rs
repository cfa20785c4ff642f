// SPDX-License-Identifier: MPL-2.0

//! Engagement ledger service for BlueBizHub.
//!
//! Records who engaged with which post, comment or reply, keeps the
//! denormalized counters on content and profiles in step with that ledger,
//! and removes whole threads in one atomic cascade.

pub mod cascade;
pub mod config;
pub mod content;
pub mod error;
pub mod http;
pub mod ledger;
pub mod model;
pub mod projector;
pub mod state;
pub mod store;

use config::Config;
use state::AppState;
use std::sync::Arc;
use store::Store;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

/// Serve the HTTP API until Ctrl+C or SIGTERM
pub async fn serve(config: Config, store: Arc<dyn Store>) -> std::io::Result<()> {
    let address = config.address();
    info!(backend = store.backend_tag(), "Initializing state...");
    let state = AppState::new(store);
    let app = http::router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
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
}
