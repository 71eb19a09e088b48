use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::resources::{Condition, DiagnosticReport, MedicationRequest, Observation};

/// One `Bundle.entry`; only the resource is kept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry<T> {
    #[serde(default)]
    pub resource: T,
}

impl<T> BundleEntry<T> {
    pub fn new(resource: T) -> Self {
        BundleEntry { resource }
    }
}

/// Entries that do not fit `T` (or a `null` list) are dropped rather than failing the whole payload
fn lenient_entries<'de, D, T>(deserializer: D) -> Result<Vec<BundleEntry<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("skipping patient data entry: {}", e);
                None
            }
        })
        .collect())
}

/// Everything the dashboard loads for one patient, as bundle entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientData {
    #[serde(default, deserialize_with = "lenient_entries")]
    pub vitals: Vec<BundleEntry<Observation>>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub labs: Vec<BundleEntry<Observation>>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub conditions: Vec<BundleEntry<Condition>>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub medications: Vec<BundleEntry<MedicationRequest>>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub diagnostic_reports: Vec<BundleEntry<DiagnosticReport>>,
}

impl PatientData {
    pub fn is_empty(&self) -> bool {
        self.vitals.is_empty()
            && self.labs.is_empty()
            && self.conditions.is_empty()
            && self.medications.is_empty()
            && self.diagnostic_reports.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_data: PatientData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: String,
}

/// Normalized view of the logged-in provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Option<String>,
    pub resource_type: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub scope: Option<String>,
    pub has_id_token: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResponse {
    pub auth_url: String,
}
