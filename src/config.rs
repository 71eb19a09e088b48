//! Application configuration
//!
//! Settings are layered: built-in defaults, `config/default`, `config/{CDS_ENV}`,
//! `CDS__*` environment variables, then the plain variables the SMART app has
//! always read (`SMART_CLIENT_ID`, `SMART_CLIENT_SECRET`, `PPLX_API_KEY`).

use serde::Deserialize;
use url::Url;

use crate::error::CdsError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub frontend: FrontendConfig,
    pub smart: SmartConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub session_cookie: String,
    pub secure_cookies: bool,
    pub session_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    /// Browser origin allowed by CORS and targeted by post-login redirects
    pub origin: String,
}

/// SMART on FHIR client registration
#[derive(Clone, Deserialize)]
pub struct SmartConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub fhir_base_url: String,
    pub scope: String,
}

impl std::fmt::Debug for SmartConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("fhir_base_url", &self.fhir_base_url)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Perplexity,
    OpenAi,
}

#[derive(Clone, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key_set", &!self.api_key.is_empty())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

const DEFAULT_SCOPE: &str = "openid launch fhirUser user/Patient.read user/Observation.read \
user/Condition.read user/MedicationRequest.read user/DiagnosticReport.read \
user/AllergyIntolerance.read user/Practitioner.read user/Person.read offline_access";

fn defaults() -> Result<::config::ConfigBuilder<::config::builder::DefaultState>, ::config::ConfigError> {
    ::config::Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 5000)?
        .set_default("server.session_cookie", "cds_session")?
        .set_default("server.secure_cookies", false)?
        .set_default("server.session_ttl_minutes", 480)?
        .set_default("frontend.origin", "http://localhost:3000")?
        .set_default("smart.client_id", "")?
        .set_default("smart.client_secret", "")?
        .set_default("smart.redirect_uri", "http://localhost:5000/redirect")?
        .set_default(
            "smart.authorization_endpoint",
            "http://localhost:8080/oauth2/default/authorize",
        )?
        .set_default("smart.token_endpoint", "http://localhost:8080/oauth2/default/token")?
        .set_default("smart.fhir_base_url", "http://localhost:8080/apis/default/fhir")?
        .set_default("smart.scope", DEFAULT_SCOPE)?
        .set_default("llm.provider", "perplexity")?
        .set_default("llm.base_url", "https://api.perplexity.ai")?
        .set_default("llm.api_key", "")?
        .set_default("llm.model", "sonar-pro")?
        .set_default("llm.temperature", 0.3)?
        .set_default("llm.max_tokens", 400)?
        .set_default("llm.timeout_secs", 60)
}

/// Provider defaults for the OpenAI chat completions API
fn openai_defaults(
    builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
) -> Result<::config::ConfigBuilder<::config::builder::DefaultState>, ::config::ConfigError> {
    builder
        .set_default("llm.base_url", "https://api.openai.com/v1")?
        .set_default("llm.model", "gpt-4o-mini")?
        .set_default("llm.temperature", 0.7)?
        .set_default("llm.max_tokens", 1500)
}

/// Load configuration from files and the environment
pub fn load_config() -> Result<Config, CdsError> {
    dotenv::dotenv().ok();

    let env = std::env::var("CDS_ENV").unwrap_or_else(|_| "development".into());

    let mut builder = defaults()?
        .add_source(::config::File::with_name("config/default").required(false))
        .add_source(::config::File::with_name(&format!("config/{}", env)).required(false))
        .add_source(
            ::config::Environment::with_prefix("CDS")
                .prefix_separator("_")
                .separator("__"),
        );

    builder = builder
        .set_override_option("smart.client_id", std::env::var("SMART_CLIENT_ID").ok())?
        .set_override_option("smart.client_secret", std::env::var("SMART_CLIENT_SECRET").ok())?;

    let provider = builder
        .build_cloned()?
        .get_string("llm.provider")
        .unwrap_or_else(|_| "perplexity".into());
    let key_var = if provider == "openai" {
        builder = openai_defaults(builder)?;
        "OPENAI_API_KEY"
    } else {
        "PPLX_API_KEY"
    };
    builder = builder.set_override_option("llm.api_key", std::env::var(key_var).ok())?;

    let config: Config = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject settings that would only fail later, mid-login
    pub fn validate(&self) -> Result<(), CdsError> {
        if self.smart.client_id.trim().is_empty() {
            return Err(CdsError::Config(
                "smart.client_id is empty (set SMART_CLIENT_ID)".into(),
            ));
        }

        for (key, value) in [
            ("smart.redirect_uri", &self.smart.redirect_uri),
            ("smart.authorization_endpoint", &self.smart.authorization_endpoint),
            ("smart.token_endpoint", &self.smart.token_endpoint),
            ("smart.fhir_base_url", &self.smart.fhir_base_url),
            ("frontend.origin", &self.frontend.origin),
            ("llm.base_url", &self.llm.base_url),
        ] {
            Url::parse(value)
                .map_err(|e| CdsError::Config(format!("{} is not an absolute URL: {}", key, e)))?;
        }

        if self.server.session_ttl_minutes <= 0 {
            return Err(CdsError::Config("server.session_ttl_minutes must be positive".into()));
        }

        Ok(())
    }

    /// Configuration pointing every external service at the given base URL.
    /// Used by tests that stand up a mock server.
    pub fn for_upstream(base: &str) -> Config {
        let base = base.trim_end_matches('/');
        Config {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 5000,
                session_cookie: "cds_session".into(),
                secure_cookies: false,
                session_ttl_minutes: 480,
            },
            frontend: FrontendConfig {
                origin: "http://localhost:3000".into(),
            },
            smart: SmartConfig {
                client_id: "cds-client".into(),
                client_secret: "cds-secret".into(),
                redirect_uri: "http://localhost:5000/redirect".into(),
                authorization_endpoint: format!("{}/oauth2/default/authorize", base),
                token_endpoint: format!("{}/oauth2/default/token", base),
                fhir_base_url: format!("{}/apis/default/fhir", base),
                scope: DEFAULT_SCOPE.into(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Perplexity,
                base_url: base.to_string(),
                api_key: "test-key".into(),
                model: "sonar-pro".into(),
                temperature: 0.3,
                max_tokens: 400,
                timeout_secs: 5,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_openemr() {
        let config: Config = defaults()
            .and_then(|b| b.set_override("smart.client_id", "abc"))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.smart.redirect_uri, "http://localhost:5000/redirect");
        assert_eq!(config.smart.fhir_base_url, "http://localhost:8080/apis/default/fhir");
        assert!(config.smart.scope.starts_with("openid launch fhirUser"));
        assert!(config.smart.scope.ends_with("offline_access"));
        assert_eq!(config.llm.provider, LlmProvider::Perplexity);
        assert_eq!(config.llm.max_tokens, 400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn openai_provider_has_its_own_defaults() {
        let config: Config = defaults()
            .and_then(|b| b.set_override("llm.provider", "openai"))
            .and_then(openai_defaults)
            .and_then(|b| b.set_override("llm.model", "gpt-4o"))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 1500);
        assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_client_id_is_rejected() {
        let mut config = Config::for_upstream("http://localhost:9999");
        config.smart.client_id = "  ".into();
        assert!(matches!(config.validate(), Err(CdsError::Config(_))));
    }

    #[test]
    fn relative_url_is_rejected() {
        let mut config = Config::for_upstream("http://localhost:9999");
        config.smart.token_endpoint = "/oauth2/token".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("smart.token_endpoint"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = Config::for_upstream("http://localhost:9999");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("cds-secret"));
        assert!(!rendered.contains("test-key"));
    }
}
