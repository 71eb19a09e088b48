//! SMART CDS backend
//!
//! Main entry point for the clinical decision support server.

use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::{debug, info};
use tracing_actix_web::TracingLogger;

use smart_cds::{api, config, init_tracing, AppState};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = config::load_config().context("Failed to load configuration")?;
    if config.llm.api_key.is_empty() {
        tracing::warn!(provider = ?config.llm.provider, "no LLM API key configured");
    }

    let bind = (config.server.host.clone(), config.server.port);
    let origin = config.frontend.origin.clone();
    let state = AppState::new(config).context("Failed to initialise application state")?;
    let state = web::Data::new(state);

    let sessions = state.sessions.clone();
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = sessions.len(), "expired sessions swept");
            }
        }
    });

    info!(host = %bind.0, port = bind.1, frontend = %origin, "starting SMART CDS backend");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(api::cors(&origin))
            .wrap(TracingLogger::default())
            .configure(api::configure)
    })
    .bind(bind)
    .context("Failed to bind HTTP listener")?
    .run()
    .await
    .context("HTTP server error")
}
