//! HubNotes HTTP server.
//!
//! Serves the JSON API on `bindAddress` (default `127.0.0.1:3000`). Runs in
//! mock mode when no HubSpot token is configured.

use std::sync::Arc;

use anyhow::Context;

use hubnotes_lib::api::router;
use hubnotes_lib::state::{load_config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let state = AppState::new(load_config()).context("Failed to initialise HubNotes")?;
    if state.hubspot.is_mock() {
        log::info!("Serving fixture data (mock mode)");
    } else {
        let strategies: Vec<&str> = state
            .hubspot
            .strategies()
            .iter()
            .map(|s| s.as_str())
            .collect();
        log::info!("Note association strategies: {}", strategies.join(", "));
    }

    let bind_address = &state.config.bind_address;
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    log::info!("HubNotes listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("HubNotes stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested; finishing in-flight requests");
}
