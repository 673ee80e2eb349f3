//! HTTP-Routen des Servers
//!
//! ```text
//! GET  /subscribe     WebSocket-Upgrade (Relay)
//! GET  /profile?id=   Einzelnes Profil
//! GET  /taxis?ids=    Profile mehrerer Taxis
//! GET  /route?from=&to=
//! POST /otp/senden    { "telefon" }
//! POST /otp/pruefen   { "telefon", "code" }
//! GET  /health
//! GET  /metrics       (wenn aktiviert)
//! ```

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use taximap_core::Identitaet;
use taximap_dienste::{DienstError, OtpDienst, ProfilQuelle, RoutenDienst};
use taximap_observability::{metrics_router, request_timing_layer, timing_middleware};
use taximap_relay::{relay_router, RegistryUebersicht, RelayState};

/// Geteilter Zustand der HTTP-Handler
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayState>,
    pub profile: Arc<dyn ProfilQuelle>,
    pub routen: Arc<dyn RoutenDienst>,
    pub otp: Arc<dyn OtpDienst>,
    pub start: Instant,
}

/// Erstellt den vollstaendigen Router inklusive Timing-Layer
pub fn router(state: AppState, metriken_aktiviert: bool) -> Router {
    let mut app = Router::new()
        .route("/profile", get(profil))
        .route("/taxis", get(taxis))
        .route("/route", get(route))
        .route("/otp/senden", post(otp_senden))
        .route("/otp/pruefen", post(otp_pruefen))
        .route("/health", get(health))
        .with_state(state.clone())
        .merge(relay_router(state.relay.clone()));

    if metriken_aktiviert {
        app = app.merge(metrics_router(state.relay.metriken.clone()));
    }

    app.layer(axum::middleware::from_fn(timing_middleware))
        .layer(request_timing_layer())
}

// ---------------------------------------------------------------------------
// Fehlerantworten
// ---------------------------------------------------------------------------

fn fehler_antwort(status: StatusCode, nachricht: &str) -> Response {
    (status, Json(json!({ "fehler": nachricht }))).into_response()
}

fn dienst_fehler(e: DienstError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::warn!(fehler = %e, "Dienstaufruf fehlgeschlagen");
    }
    fehler_antwort(status, &e.to_string())
}

// ---------------------------------------------------------------------------
// Profile & Routen
// ---------------------------------------------------------------------------

async fn profil(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(id) = query.get("id") else {
        return fehler_antwort(StatusCode::BAD_REQUEST, "Parameter 'id' fehlt");
    };
    let id: Identitaet = match id.parse() {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(fehler = %e, "Ungueltige Profil-ID");
            return fehler_antwort(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    match state.profile.profil(&id).await {
        Ok(p) => Json(p).into_response(),
        Err(e) => dienst_fehler(e),
    }
}

async fn taxis(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let ids: Result<Vec<Identitaet>, _> = query
        .get("ids")
        .map(String::as_str)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<Identitaet>)
        .collect();
    let ids = match ids {
        Ok(ids) => ids,
        Err(e) => return fehler_antwort(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match state.profile.profile(&ids).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => dienst_fehler(e),
    }
}

async fn route(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let von = query.get("from").map(String::as_str).unwrap_or_default();
    let nach = query.get("to").map(String::as_str).unwrap_or_default();
    if von.is_empty() || nach.is_empty() {
        return fehler_antwort(
            StatusCode::BAD_REQUEST,
            "Parameter 'from' oder 'to' fehlt",
        );
    }

    match state.routen.route(von, nach).await {
        Ok(abschnitte) => Json(abschnitte).into_response(),
        Err(e) => dienst_fehler(e),
    }
}

// ---------------------------------------------------------------------------
// Einmal-Codes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OtpSendenAnfrage {
    pub telefon: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpPruefenAnfrage {
    pub telefon: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtpPruefenAntwort {
    pub gueltig: bool,
}

async fn otp_senden(State(state): State<AppState>, Json(anfrage): Json<OtpSendenAnfrage>) -> Response {
    match state.otp.code_senden(&anfrage.telefon).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => dienst_fehler(e),
    }
}

async fn otp_pruefen(
    State(state): State<AppState>,
    Json(anfrage): Json<OtpPruefenAnfrage>,
) -> Response {
    match state.otp.code_pruefen(&anfrage.telefon, &anfrage.code).await {
        Ok(gueltig) => Json(OtpPruefenAntwort { gueltig }).into_response(),
        Err(e) => dienst_fehler(e),
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthAntwort {
    pub status: String,
    pub version: String,
    pub uptime_sek: u64,
    pub admins: usize,
    pub clients: usize,
    pub taxis: usize,
    pub verbindungen: usize,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let RegistryUebersicht {
        admins,
        clients,
        taxis,
        verbindungen,
        ..
    } = state.relay.registry.uebersicht();
    let status = if state.relay.abbruch.is_cancelled() {
        "shutdown"
    } else {
        "ok"
    };

    Json(HealthAntwort {
        status: status.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_sek: state.start.elapsed().as_secs(),
        admins,
        clients,
        taxis,
        verbindungen,
    })
}
