use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::data::format_patient_data_for_ai;
use crate::config::{LlmConfig, LlmProvider};
use crate::models::patient::PatientData;

pub const NO_DATA_MESSAGE: &str = "No patient data available to generate recommendations. \
Please ensure the patient has recorded vitals, conditions, medications, or lab results.";

pub const DISCLAIMER: &str = "**Disclaimer:** These recommendations are generated by AI and \
should be reviewed by qualified healthcare providers before implementation. They are meant to \
assist clinical decision-making, not replace professional medical judgment.";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("LLM API unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM API returned {status}")]
    Rejected { status: u16, body: Value },

    #[error("LLM response had no message content")]
    EmptyCompletion,
}

impl AiError {
    pub fn details(&self) -> Value {
        match self {
            AiError::Rejected { body, .. } => body.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

/// Anything that can turn a chart summary into recommendation text
#[async_trait]
pub trait RecommendationModel: Send + Sync {
    async fn recommend(&self, summary: &str) -> Result<String, AiError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn system(content: String) -> Self {
        ChatMessage {
            role: "system".into(),
            content,
        }
    }

    fn user(content: String) -> Self {
        ChatMessage {
            role: "user".into(),
            content,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

const TERSE_INSTRUCTIONS: &str = "You are a clinical decision support assistant.

Analyze the following patient data and return a VERY SHORT summary in EXACTLY this format:

Out of range values:
- ...

Recommended actions:
- ...

Rules:
- Do NOT add any other headings or text.
- No explanations, no references, no citations, no markdown beyond the two headings and bullet points.
- Keep to 3–5 bullets per section.
- If nothing is out of range, write: \"None clearly out of range based on provided data.\"";

const SYSTEM_PROMPT: &str = "You are an experienced clinical decision support AI assistant.
Your role is to analyze patient data and provide evidence-based clinical recommendations.

Guidelines:
- Provide actionable, specific recommendations
- Identify any concerning trends or values
- Suggest appropriate follow-up actions
- Mention potential drug interactions if applicable
- Recommend lifestyle modifications when relevant
- Be concise but thorough
- Always emphasize that recommendations should be reviewed by healthcare providers
- Format your response with clear sections using markdown";

const REVIEW_AREAS: &str = "Provide recommendations covering:
1. Assessment of current vital signs and labs
2. Condition management recommendations
3. Medication review and interactions
4. Suggested follow-up actions
5. Lifestyle modifications if applicable";

/// How the chart summary is framed for the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Single user turn asking for two terse bullet lists
    Terse,
    /// System prompt plus a five-area review, with a disclaimer appended
    Detailed,
}

impl From<LlmProvider> for PromptStyle {
    fn from(provider: LlmProvider) -> Self {
        match provider {
            LlmProvider::Perplexity => PromptStyle::Terse,
            LlmProvider::OpenAi => PromptStyle::Detailed,
        }
    }
}

impl PromptStyle {
    pub fn messages(self, summary: &str) -> Vec<ChatMessage> {
        match self {
            PromptStyle::Terse => vec![ChatMessage::user(format!(
                "{}\n\nPatient data:\n{}",
                TERSE_INSTRUCTIONS, summary
            ))],
            PromptStyle::Detailed => vec![
                ChatMessage::system(SYSTEM_PROMPT.to_string()),
                ChatMessage::user(format!(
                    "Please analyze the following patient data and provide clinical recommendations:\n\n{}\n\n{}",
                    summary, REVIEW_AREAS
                )),
            ],
        }
    }

    pub fn finish(self, completion: String) -> String {
        match self {
            PromptStyle::Terse => completion,
            PromptStyle::Detailed => format!("{}\n\n---\n{}", completion, DISCLAIMER),
        }
    }
}

/// OpenAI-compatible `/chat/completions` client (Perplexity, OpenAI)
pub struct ChatCompletionsClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    style: PromptStyle,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> Result<Self, AiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(ChatCompletionsClient {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            style: config.provider.into(),
        })
    }
}

#[async_trait]
impl RecommendationModel for ChatCompletionsClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn recommend(&self, summary: &str) -> Result<String, AiError> {
        let request = ChatRequest {
            model: &self.model,
            messages: self.style.messages(summary),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            warn!(status = status.as_u16(), "LLM API rejected request");
            return Err(AiError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AiError::EmptyCompletion)?;

        Ok(self.style.finish(content))
    }
}

/// Produces recommendation text for a patient's chart
#[derive(Clone)]
pub struct AdvisorService {
    model: Arc<dyn RecommendationModel>,
}

impl AdvisorService {
    pub fn new(model: Arc<dyn RecommendationModel>) -> Self {
        AdvisorService { model }
    }

    #[instrument(skip(self, patient_id, data), fields(patient_id = patient_id.unwrap_or("-")))]
    pub async fn recommendations(
        &self,
        patient_id: Option<&str>,
        data: &PatientData,
    ) -> Result<String, AiError> {
        let summary = format_patient_data_for_ai(data);
        if summary.trim().is_empty() {
            info!("no chart data; skipping model call");
            return Ok(NO_DATA_MESSAGE.to_string());
        }

        let recommendations = self.model.recommend(&summary).await?;
        info!(chars = recommendations.len(), "recommendations generated");
        Ok(recommendations)
    }
}
