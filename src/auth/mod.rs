//! SMART on FHIR authorization
//!
//! Handles the provider-facing half of the OAuth2 authorization code flow with
//! PKCE: building the authorize URL, exchanging the code, keeping tokens in a
//! server-side session and reading the `fhirUser` claim from the id token.

pub mod id_token;
pub mod oauth;
pub mod pkce;
pub mod session;

pub use oauth::{OAuthClient, OAuthError, TokenSet};
pub use pkce::{generate_state, PkcePair};
pub use session::{PendingAuthorization, Session, SessionStore};
