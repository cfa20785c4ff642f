// SPDX-License-Identifier: MPL-2.0

use bluebizhub::config::Config;
use bluebizhub::store::SqliteStore;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Environment misconfigured: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("Opening database at {}", config.db_path.display());
    let store = match SqliteStore::open(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open database: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = bluebizhub::serve(config, Arc::new(store)).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
