//! Route table for the SMART CDS backend

use actix_web::error::JsonPayloadError;
use actix_web::{web, HttpRequest, ResponseError};
use tracing::warn;

use super::handlers;
use crate::error::CdsError;

/// Largest chart payload accepted by the recommendations endpoint
pub const MAX_JSON_BODY: usize = 2 * 1024 * 1024;

fn json_error(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    warn!(path = req.path(), "rejected JSON body: {}", err);
    CdsError::InvalidBody {
        status: err.status_code(),
        details: err.to_string(),
    }
    .into()
}

/// Register every route on an `App`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(MAX_JSON_BODY)
            .error_handler(json_error),
    )
        // SMART launch
        .route("/launch", web::get().to(handlers::launch))
        .route("/redirect", web::get().to(handlers::oauth_redirect))
        .service(
            web::scope("/api")
                .route("/user/me", web::get().to(handlers::current_user))
                .route("/patients", web::get().to(handlers::list_patients))
                // dashboard must win over the generic category route
                .route(
                    "/patient/{id}/dashboard",
                    web::get().to(handlers::patient_dashboard),
                )
                .route(
                    "/patient/{id}/{category}",
                    web::get().to(handlers::patient_resources),
                )
                .route("/ai/recommendations", web::post().to(handlers::recommendations))
                .route("/auth/status", web::get().to(handlers::auth_status))
                .route("/auth/refresh", web::post().to(handlers::refresh_token))
                .route("/logout", web::post().to(handlers::logout)),
        );
}
