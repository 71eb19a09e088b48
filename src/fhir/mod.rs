//! FHIR server access
//!
//! Every call is made on behalf of the logged-in provider with their bearer
//! token. Response bodies are passed through as JSON; typed views are only
//! built where the backend itself needs to read the data.

pub mod display;
pub mod queries;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::models::patient::BundleEntry;

pub const FHIR_JSON: &str = "application/fhir+json";

#[derive(Debug, Error)]
pub enum FhirError {
    #[error("FHIR server returned {status}")]
    Status { status: u16, body: Value },

    #[error("FHIR request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected FHIR payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct FhirClient {
    http: Client,
    base_url: String,
}

impl FhirClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        FhirClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET [base]/[resource]?params`
    #[instrument(skip(self, access_token, params), fields(resource = %resource))]
    pub async fn search(
        &self,
        access_token: &str,
        resource: &str,
        params: &[(&str, String)],
    ) -> Result<Value, FhirError> {
        let url = format!("{}/{}", self.base_url, resource);
        debug!(?params, "FHIR search");
        let request = self.http.get(&url).query(params);
        self.send(request, access_token).await
    }

    /// Read a resource by absolute URL
    #[instrument(skip(self, access_token))]
    pub async fn read_url(&self, access_token: &str, url: &str) -> Result<Value, FhirError> {
        self.send(self.http.get(url), access_token).await
    }

    async fn send(&self, request: reqwest::RequestBuilder, access_token: &str) -> Result<Value, FhirError> {
        let response = request
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, FHIR_JSON)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "FHIR request rejected");
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(FhirError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

/// FHIR logical id: 1-64 of `[A-Za-z0-9.-]`
pub fn is_valid_id(id: &str) -> bool {
    (1..=64).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
}

/// Typed entries of a search Bundle; entries that do not fit `T` are skipped
pub fn bundle_entries<T: DeserializeOwned + Default>(bundle: &Value) -> Vec<BundleEntry<T>> {
    let Some(entries) = bundle.get("entry").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("skipping bundle entry: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resources::Observation;
    use serde_json::json;

    #[test]
    fn bundle_without_entries_is_empty() {
        let bundle = json!({"resourceType": "Bundle", "total": 0});
        assert!(bundle_entries::<Observation>(&bundle).is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"id": "good", "valueQuantity": {"value": 72, "unit": "/min"}}},
                {"resource": {"id": "bad", "valueQuantity": {"value": "seventy"}}}
            ]
        });
        let entries = bundle_entries::<Observation>(&bundle);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource.id.as_deref(), Some("good"));
    }

    #[test]
    fn logical_ids() {
        assert!(is_valid_id("a1b2-c3.d4"));
        assert!(is_valid_id("9"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("../Practitioner"));
        assert!(!is_valid_id("1?_format=xml"));
        assert!(!is_valid_id(&"x".repeat(65)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = FhirClient::new(Client::new(), "http://ehr/fhir/");
        assert_eq!(client.base_url(), "http://ehr/fhir");
    }
}
