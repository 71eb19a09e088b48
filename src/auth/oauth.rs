use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

use super::pkce::CHALLENGE_METHOD;
use crate::config::SmartConfig;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid authorization endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned {status}")]
    Rejected { status: u16, body: Value },

    #[error("malformed token response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl OAuthError {
    pub fn details(&self) -> Value {
        match self {
            OAuthError::Rejected { body, .. } => body.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

/// Tokens granted to a provider session
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("scope", &self.scope)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .finish()
    }
}

pub struct OAuthClient {
    http: Client,
    smart: SmartConfig,
}

impl OAuthClient {
    pub fn new(http: Client, smart: SmartConfig) -> Self {
        OAuthClient { http, smart }
    }

    /// URL the browser is sent to in order to start the login
    pub fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, OAuthError> {
        let mut url = Url::parse(&self.smart.authorization_endpoint)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.smart.client_id)
            .append_pair("redirect_uri", &self.smart.redirect_uri)
            .append_pair("scope", &self.smart.scope)
            .append_pair("state", state)
            .append_pair("aud", &self.smart.fhir_base_url)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD);
        Ok(url.into())
    }

    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, OAuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.smart.redirect_uri.as_str()),
            ("client_id", self.smart.client_id.as_str()),
            ("client_secret", self.smart.client_secret.as_str()),
            ("code_verifier", code_verifier),
        ];
        let tokens = self.token_request(&form).await?;
        info!(scope = ?tokens.scope, "authorization code exchanged");
        Ok(tokens)
    }

    /// Refresh grant; keeps the old refresh token if the server does not rotate it
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, OAuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.smart.client_id.as_str()),
            ("client_secret", self.smart.client_secret.as_str()),
        ];
        let mut tokens = self.token_request(&form).await?;
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        info!("access token refreshed");
        Ok(tokens)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, OAuthError> {
        let response = self
            .http
            .post(&self.smart.token_endpoint)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            warn!(status = status.as_u16(), "token endpoint rejected request");
            return Err(OAuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}
