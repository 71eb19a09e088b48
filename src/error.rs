//! Error types for the SMART CDS backend
//!
//! Every error leaving a handler is rendered as `{"error": ..., "details": ...}`,
//! the shape the dashboard frontend already understands.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::auth::OAuthError;
use crate::core::ai::AiError;
use crate::fhir::FhirError;

#[derive(Debug, Error)]
pub enum CdsError {
    #[error("Not authenticated")]
    Unauthenticated,

    /// A FHIR or token endpoint call failed
    #[error("{context}")]
    Upstream {
        context: String,
        status: Option<StatusCode>,
        details: Option<Value>,
    },

    #[error("Failed to generate recommendations")]
    Recommendation(#[from] AiError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Request body rejected before reaching a handler (bad JSON, too large)
    #[error("Invalid request body")]
    InvalidBody { status: StatusCode, details: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CdsError {
    /// Wrap a FHIR failure with the message shown to the dashboard
    pub fn upstream(context: impl Into<String>, err: FhirError) -> Self {
        match err {
            FhirError::Status { status, body } => CdsError::Upstream {
                context: context.into(),
                status: StatusCode::from_u16(status).ok(),
                details: Some(body),
            },
            other => CdsError::Upstream {
                context: context.into(),
                status: None,
                details: Some(Value::String(other.to_string())),
            },
        }
    }

    /// Wrap a token endpoint failure
    pub fn token_endpoint(context: impl Into<String>, err: OAuthError) -> Self {
        let status = match &err {
            OAuthError::Rejected { status, .. } => StatusCode::from_u16(*status).ok(),
            _ => None,
        };
        CdsError::Upstream {
            context: context.into(),
            status,
            details: Some(err.details()),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            CdsError::Upstream { details, .. } => details.clone(),
            CdsError::Recommendation(err) => Some(err.details()),
            CdsError::InvalidBody { details, .. } => Some(Value::String(details.clone())),
            CdsError::Config(msg) => Some(Value::String(msg.clone())),
            _ => None,
        }
    }
}

impl From<::config::ConfigError> for CdsError {
    fn from(err: ::config::ConfigError) -> Self {
        CdsError::Config(err.to_string())
    }
}

impl ResponseError for CdsError {
    fn status_code(&self) -> StatusCode {
        match self {
            CdsError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CdsError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CdsError::NotFound(_) => StatusCode::NOT_FOUND,
            CdsError::InvalidBody { status, .. } => *status,
            CdsError::Upstream { status, .. } => status
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = self.to_string();
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: &message,
            details: self.details(),
        })
    }
}
