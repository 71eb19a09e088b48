//! SMART on FHIR clinical decision support backend
//!
//! Authenticates providers against a FHIR server with OAuth2 + PKCE, proxies
//! their clinical searches, and asks an LLM for short recommendations based on
//! the fetched chart.

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod fhir;
pub mod models;
pub mod state;

pub use error::CdsError;
pub use state::AppState;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` controls the filter (default `info`). `CDS_LOG_FORMAT=json`
/// switches to one JSON object per line.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CDS_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}
