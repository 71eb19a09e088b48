//! Request guards and cookie helpers for provider sessions

use std::future::{ready, Ready};

use actix_cors::Cors;
use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::http::{header, Method};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use uuid::Uuid;

use crate::auth::TokenSet;
use crate::config::ServerConfig;
use crate::error::CdsError;
use crate::state::AppState;

/// CORS for the dashboard: one origin, credentialed, GET/POST with JSON bodies
pub fn cors(origin: &str) -> Cors {
    Cors::default()
        .allowed_origin(origin)
        .allowed_methods([Method::GET, Method::POST])
        .allowed_headers([header::CONTENT_TYPE])
        .supports_credentials()
}

/// Session id from the request cookie, if it parses
pub fn session_id(req: &HttpRequest, config: &ServerConfig) -> Option<Uuid> {
    req.cookie(&config.session_cookie)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
}

pub fn session_cookie(config: &ServerConfig, id: Uuid) -> Cookie<'static> {
    Cookie::build(config.session_cookie.clone(), id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .finish()
}

pub fn expired_session_cookie(config: &ServerConfig) -> Cookie<'static> {
    let mut cookie = session_cookie(config, Uuid::nil());
    cookie.set_value("");
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

/// A session that has completed login; rejects the request with 401 otherwise
pub struct ProviderSession {
    pub id: Uuid,
    pub tokens: TokenSet,
}

impl ProviderSession {
    pub fn access_token(&self) -> &str {
        &self.tokens.access_token
    }
}

impl FromRequest for ProviderSession {
    type Error = CdsError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}

fn extract(req: &HttpRequest) -> Result<ProviderSession, CdsError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| CdsError::Internal("application state missing".into()))?;

    let id = session_id(req, &state.config.server).ok_or(CdsError::Unauthenticated)?;
    let tokens = state
        .sessions
        .update(&id, |s| s.tokens.clone())
        .flatten()
        .ok_or(CdsError::Unauthenticated)?;

    Ok(ProviderSession { id, tokens })
}
