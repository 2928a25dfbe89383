//! StayVista API server.
//!
//! Usage:
//!   cargo run --bin load_data      # seed the catalogue
//!   cargo run --bin stayvista      # start the REST API
//!
//! Settings come from the environment (or `.env`); see `config.rs`.

use tokio::net::TcpListener;

use stayvista::config::Config;
use stayvista::logging;
use stayvista::rest::{create_router, AppState};
use stayvista::storage::Storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    // Keep the guards alive so buffered log lines are flushed on exit
    let _log_guards = logging::init(&config.log);

    config.validate()?;

    let storage = Storage::open(&config.data_dir)?;
    tokio::fs::create_dir_all(&config.blob_dir).await?;

    let state = AppState::new(storage.clone(), &config);
    let app = create_router(state, &config);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        data_dir = %config.data_dir,
        blob_dir = %config.blob_dir,
        production = config.log.production,
        "StayVista API listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.flush().await?;
    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
