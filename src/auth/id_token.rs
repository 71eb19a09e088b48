//! `fhirUser` lookup from the OpenID Connect id token
//!
//! The token is decoded without checking its signature. It only selects which
//! FHIR resource to display for the logged-in provider; every FHIR read still
//! goes out with the access token.

use std::collections::HashSet;

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(rename = "fhirUser")]
    fhir_user: Option<String>,
    #[serde(rename = "extension_fhirUser")]
    extension_fhir_user: Option<String>,
}

/// The `fhirUser` claim, or `extension_fhirUser` for servers that namespace it
pub fn fhir_user_claim(id_token: &str) -> Option<String> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims = HashSet::new();

    match decode::<IdTokenClaims>(id_token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => data.claims.fhir_user.or(data.claims.extension_fhir_user),
        Err(e) => {
            warn!("failed to decode id_token: {}", e);
            None
        }
    }
}

/// Absolute URL of the user's FHIR resource
pub fn resolve_fhir_user_url(claim: &str, fhir_base_url: &str) -> String {
    if claim.starts_with("http://") || claim.starts_with("https://") {
        claim.to_string()
    } else {
        format!(
            "{}/{}",
            fhir_base_url.trim_end_matches('/'),
            claim.trim_start_matches('/')
        )
    }
}
