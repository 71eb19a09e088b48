use std::sync::Arc;

use chrono::Duration;
use reqwest::Client;

use crate::auth::{OAuthClient, SessionStore};
use crate::config::Config;
use crate::core::ai::{AdvisorService, ChatCompletionsClient, RecommendationModel};
use crate::error::CdsError;
use crate::fhir::FhirClient;

/// Shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub oauth: Arc<OAuthClient>,
    pub fhir: FhirClient,
    pub advisor: AdvisorService,
}

impl AppState {
    /// Wire up clients for the configured FHIR server and LLM provider
    pub fn new(config: Config) -> Result<Self, CdsError> {
        let model = ChatCompletionsClient::new(&config.llm)
            .map_err(|e| CdsError::Internal(format!("failed to build LLM client: {}", e)))?;
        Self::with_model(config, Arc::new(model))
    }

    /// Same as [`AppState::new`] with a caller-supplied recommendation model
    pub fn with_model(config: Config, model: Arc<dyn RecommendationModel>) -> Result<Self, CdsError> {
        let http = Client::builder()
            .build()
            .map_err(|e| CdsError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(AppState {
            sessions: Arc::new(SessionStore::new(Duration::minutes(
                config.server.session_ttl_minutes,
            ))),
            oauth: Arc::new(OAuthClient::new(http.clone(), config.smart.clone())),
            fhir: FhirClient::new(http, &config.smart.fhir_base_url),
            advisor: AdvisorService::new(model),
            config: Arc::new(config),
        })
    }
}
