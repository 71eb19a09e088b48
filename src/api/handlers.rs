//! HTTP handlers for the clinical dashboard

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use super::middleware::{expired_session_cookie, session_cookie, session_id, ProviderSession};
use crate::auth::id_token::{fhir_user_claim, resolve_fhir_user_url};
use crate::auth::{generate_state, PendingAuthorization, PkcePair};
use crate::error::CdsError;
use crate::fhir::display::{user_display_name, DashboardView};
use crate::fhir::queries::{patient_list_params, ClinicalCategory, UnknownCategory, PATIENTS_ERROR};
use crate::fhir::{bundle_entries, is_valid_id};
use crate::models::patient::{
    AuthStatus, CurrentUser, LaunchResponse, PatientData, RecommendationRequest,
    RecommendationResponse, UserProfile,
};
use crate::models::resources::{Patient, UserResource};
use crate::state::AppState;

type HandlerResult = Result<HttpResponse, CdsError>;

fn found(state: &AppState, query: &str) -> HttpResponseBuilder {
    let mut builder = HttpResponse::Found();
    builder.insert_header((
        header::LOCATION,
        format!("{}?{}", state.config.frontend.origin, query),
    ));
    builder
}

fn redirect_to_frontend(state: &AppState, query: &str) -> HttpResponse {
    found(state, query).finish()
}

fn checked_patient_id(id: String) -> Result<String, CdsError> {
    if is_valid_id(&id) {
        Ok(id)
    } else {
        Err(CdsError::BadRequest(format!("Invalid patient id '{}'", id)))
    }
}

/// Start the SMART launch: remember state and verifier, hand back the authorize URL
#[instrument(skip_all)]
pub async fn launch(req: HttpRequest, state: web::Data<AppState>) -> HandlerResult {
    let server = &state.config.server;

    let purged = state.sessions.purge_expired();
    if purged > 0 {
        debug!(purged, "expired sessions removed");
    }

    let id = session_id(&req, server)
        .filter(|id| state.sessions.get(id).is_some())
        .unwrap_or_else(|| state.sessions.create());

    let oauth_state = generate_state();
    let pkce = PkcePair::generate();
    let auth_url = state
        .oauth
        .authorization_url(&oauth_state, &pkce.challenge)
        .map_err(|e| CdsError::Internal(e.to_string()))?;

    state
        .sessions
        .update(&id, |s| {
            s.pending = Some(PendingAuthorization {
                state: oauth_state,
                code_verifier: pkce.verifier,
            });
        })
        .ok_or_else(|| CdsError::Internal("session disappeared during launch".into()))?;

    info!(session_id = %id, "SMART launch started");
    Ok(HttpResponse::Ok()
        .cookie(session_cookie(server, id))
        .json(LaunchResponse { auth_url }))
}

#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// OAuth redirect target: check state, swap the code for tokens, bounce to the dashboard
#[instrument(skip_all)]
pub async fn oauth_redirect(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<RedirectQuery>,
) -> HttpResponse {
    let id = session_id(&req, &state.config.server);
    let pending = id
        .and_then(|id| state.sessions.get(&id))
        .and_then(|s| s.pending);

    let (id, pending) = match (id, pending) {
        (Some(id), Some(pending)) if query.state.as_deref() == Some(pending.state.as_str()) => {
            (id, pending)
        }
        _ => {
            warn!("OAuth redirect with missing or mismatched state");
            return redirect_to_frontend(&state, "error=invalid_state");
        }
    };

    let Some(code) = query.code.as_deref() else {
        warn!("OAuth redirect without authorization code");
        return redirect_to_frontend(&state, "error=token_exchange_failed");
    };

    match state.oauth.exchange_code(code, &pending.code_verifier).await {
        Ok(tokens) => {
            let stored = state.sessions.update(&id, |s| {
                s.tokens = Some(tokens);
                s.pending = None;
            });
            // a fresh id once tokens are attached, so a pre-login id is worthless
            let rotated = stored.and_then(|_| state.sessions.rotate(&id));
            let Some(new_id) = rotated else {
                warn!(session_id = %id, "session expired during token exchange");
                return redirect_to_frontend(&state, "error=invalid_state");
            };
            info!(session_id = %new_id, "provider authenticated");
            found(&state, "auth=success")
                .cookie(session_cookie(&state.config.server, new_id))
                .finish()
        }
        Err(e) => {
            error!("Token exchange error: {}", e);
            redirect_to_frontend(&state, "error=token_exchange_failed")
        }
    }
}

/// Who is logged in, resolved through the id token's `fhirUser` claim
#[instrument(skip_all)]
pub async fn current_user(session: ProviderSession, state: web::Data<AppState>) -> HandlerResult {
    let claim = session.tokens.id_token.as_deref().and_then(fhir_user_claim);
    let Some(claim) = claim else {
        return Ok(HttpResponse::Ok().json(CurrentUser {
            authenticated: true,
            user: None,
        }));
    };

    let url = resolve_fhir_user_url(&claim, state.fhir.base_url());
    let resource = match state.fhir.read_url(session.access_token(), &url).await {
        Ok(value) => serde_json::from_value::<UserResource>(value).ok(),
        Err(e) => {
            warn!("Error loading fhirUser resource: {}", e);
            None
        }
    };

    let user = resource.map(|r| UserProfile {
        name: user_display_name(&r),
        id: r.id,
        resource_type: r.resource_type,
    });

    Ok(HttpResponse::Ok().json(CurrentUser {
        authenticated: true,
        user,
    }))
}

#[instrument(skip_all)]
pub async fn list_patients(session: ProviderSession, state: web::Data<AppState>) -> HandlerResult {
    let bundle = state
        .fhir
        .search(session.access_token(), "Patient", &patient_list_params())
        .await
        .map_err(|e| CdsError::upstream(PATIENTS_ERROR, e))?;
    Ok(HttpResponse::Ok().json(bundle))
}

/// One clinical search for one patient, forwarded as the raw Bundle
#[instrument(skip(session, state))]
pub async fn patient_resources(
    session: ProviderSession,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> HandlerResult {
    let (patient_id, segment) = path.into_inner();
    let category: ClinicalCategory = segment
        .parse()
        .map_err(|e: UnknownCategory| CdsError::NotFound(e.to_string()))?;
    let patient_id = checked_patient_id(patient_id)?;

    let bundle = state
        .fhir
        .search(
            session.access_token(),
            category.resource(),
            &category.search_params(&patient_id),
        )
        .await
        .map_err(|e| CdsError::upstream(category.error_context(), e))?;
    Ok(HttpResponse::Ok().json(bundle))
}

/// Every clinical section for a patient, fetched concurrently and formatted for display
#[instrument(skip(session, state))]
pub async fn patient_dashboard(
    session: ProviderSession,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HandlerResult {
    let patient_id = checked_patient_id(path.into_inner())?;
    let fhir = &state.fhir;
    let token = session.access_token();
    let pid = patient_id.as_str();

    let fetch = move |category: ClinicalCategory| async move {
        fhir.search(token, category.resource(), &category.search_params(pid))
            .await
            .map_err(|e| CdsError::upstream(category.error_context(), e))
    };
    let patient_url = format!("{}/Patient/{}", fhir.base_url(), pid);
    let patient = async {
        fhir.read_url(token, &patient_url)
            .await
            .map_err(|e| CdsError::upstream("Failed to fetch patient", e))
    };

    let (patient, vitals, labs, conditions, medications, reports) = futures::try_join!(
        patient,
        fetch(ClinicalCategory::Vitals),
        fetch(ClinicalCategory::Labs),
        fetch(ClinicalCategory::Conditions),
        fetch(ClinicalCategory::Medications),
        fetch(ClinicalCategory::DiagnosticReports),
    )?;

    let data = PatientData {
        vitals: bundle_entries(&vitals),
        labs: bundle_entries(&labs),
        conditions: bundle_entries(&conditions),
        medications: bundle_entries(&medications),
        diagnostic_reports: bundle_entries(&reports),
    };
    let patient: Option<Patient> = serde_json::from_value(patient).ok();

    Ok(HttpResponse::Ok().json(DashboardView::build(patient.as_ref(), &data)))
}

#[instrument(skip_all)]
pub async fn recommendations(
    _session: ProviderSession,
    state: web::Data<AppState>,
    body: web::Json<RecommendationRequest>,
) -> HandlerResult {
    let request = body.into_inner();
    info!(
        patient_id = request.patient_id.as_deref().unwrap_or("-"),
        "Generating AI recommendations"
    );

    let recommendations = state
        .advisor
        .recommendations(request.patient_id.as_deref(), &request.patient_data)
        .await
        .map_err(|e| {
            error!("AI recommendations error: {}", e);
            CdsError::from(e)
        })?;

    Ok(HttpResponse::Ok().json(RecommendationResponse { recommendations }))
}

/// Login state for the dashboard; never fails with 401
pub async fn auth_status(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let tokens = session_id(&req, &state.config.server)
        .and_then(|id| state.sessions.get(&id))
        .and_then(|s| s.tokens);

    HttpResponse::Ok().json(AuthStatus {
        authenticated: tokens.is_some(),
        scope: tokens.as_ref().and_then(|t| t.scope.clone()),
        has_id_token: tokens.as_ref().map_or(false, |t| t.id_token.is_some()),
    })
}

/// Trade the stored refresh token for a new access token
#[instrument(skip_all)]
pub async fn refresh_token(session: ProviderSession, state: web::Data<AppState>) -> HandlerResult {
    let Some(refresh) = session.tokens.refresh_token.as_deref() else {
        return Err(CdsError::Unauthenticated);
    };

    let mut tokens = state
        .oauth
        .refresh(refresh)
        .await
        .map_err(|e| CdsError::token_endpoint("Failed to refresh token", e))?;
    if tokens.id_token.is_none() {
        tokens.id_token = session.tokens.id_token.clone();
    }

    let status = AuthStatus {
        authenticated: true,
        scope: tokens.scope.clone(),
        has_id_token: tokens.id_token.is_some(),
    };
    state
        .sessions
        .update(&session.id, |s| s.tokens = Some(tokens))
        .ok_or(CdsError::Unauthenticated)?;

    Ok(HttpResponse::Ok().json(status))
}

pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let server = &state.config.server;
    if let Some(id) = session_id(&req, server) {
        if state.sessions.remove(&id) {
            info!(session_id = %id, "session destroyed");
        }
    }

    HttpResponse::Ok()
        .cookie(expired_session_cookie(server))
        .json(json!({ "success": true }))
}
