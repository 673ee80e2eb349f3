//! WebSocket-Adapter fuer die Verbindungs-Session
//!
//! Pruefung der Upgrade-Parameter, Sub-Protokoll-Aushandlung und die
//! Abbildung von axum-Frames auf [`Leser`]/[`Schreiber`].

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{
            close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket,
            WebSocketUpgrade,
        },
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::collections::HashMap;
use std::sync::Arc;
use taximap_core::{Rolle, PROTOKOLLE};

use crate::error::{RelayError, RelayResult};
use crate::session::{Leser, Schreiber, Session};
use crate::state::RelayState;
use crate::subscriber::Ausgang;
use crate::wire::AnmeldeParameter;

/// Router mit dem Upgrade-Endpunkt `/subscribe`
pub fn relay_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/subscribe", get(subscribe))
        .with_state(state)
}

/// Upgrade-Handler.
///
/// Ungueltige Query-Parameter werden vor dem Upgrade mit 400 abgelehnt;
/// es wird dann nichts registriert.
pub async fn subscribe(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<HashMap<String, String>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let parameter = match AnmeldeParameter::aus_query(&query) {
        Ok(p) => p,
        Err(e) => {
            state.metriken.eingabe_abgelehnt("query");
            tracing::warn!(fehler = %e, "Upgrade abgelehnt: ungueltige Parameter");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(ablehnung) => return ablehnung.into_response(),
    };

    let sessions = state.sessions.clone();
    ws.protocols(PROTOKOLLE)
        .on_upgrade(move |socket| sessions.track_future(verbindung_bedienen(state, parameter, socket)))
}

async fn verbindung_bedienen(state: Arc<RelayState>, parameter: AnmeldeParameter, socket: WebSocket) {
    let rolle = Rolle::aus_protokoll(socket.protocol().and_then(|p| p.to_str().ok()));
    let (sink, stream) = socket.split();

    let session = Session::neu(state, parameter, rolle);
    tracing::debug!(
        verbindung = %session.verbindung(),
        identitaet = %parameter.identitaet,
        rolle = %rolle,
        "WebSocket-Upgrade abgeschlossen"
    );
    let _ = session.ausfuehren(WsLeser(stream), WsSchreiber(sink)).await;
}

// ---------------------------------------------------------------------------
// Transport-Adapter
// ---------------------------------------------------------------------------

/// Lesende Haelfte eines WebSockets
pub struct WsLeser(pub SplitStream<WebSocket>);

#[async_trait]
impl Leser for WsLeser {
    async fn lesen(&mut self) -> RelayResult<String> {
        loop {
            match self.0.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(daten))) => match String::from_utf8(daten) {
                    Ok(text) => return Ok(text),
                    Err(_) => tracing::debug!("Binaer-Frame ohne UTF-8 ignoriert"),
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(Some(frame)))) if frame.code == close_code::NORMAL => {
                    return Err(RelayError::NormalGeschlossen)
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| f.code).unwrap_or(close_code::STATUS);
                    return Err(RelayError::verbindung(format!("geschlossen mit Status {code}")));
                }
                Some(Err(e)) => return Err(RelayError::verbindung(e.to_string())),
                None => return Err(RelayError::verbindung("Stream beendet")),
            }
        }
    }
}

/// Schreibende Haelfte eines WebSockets
pub struct WsSchreiber(pub SplitSink<WebSocket, Message>);

#[async_trait]
impl Schreiber for WsSchreiber {
    async fn senden(&mut self, ausgang: Ausgang) -> RelayResult<()> {
        let nachricht = match ausgang {
            Ausgang::Text(text) => Message::Text(text.to_string()),
            Ausgang::Schliessen { code, grund } => Message::Close(Some(CloseFrame {
                code: code.code(),
                reason: grund.into(),
            })),
        };
        self.0
            .send(nachricht)
            .await
            .map_err(|e| RelayError::verbindung(e.to_string()))
    }

    /// Leert die Close-Bestaetigung und beendet den Handshake
    async fn schliessen(&mut self) -> RelayResult<()> {
        self.0
            .close()
            .await
            .map_err(|e| RelayError::verbindung(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RelayKonfig;
    use axum::body::Body;
    use axum::http::Request;
    use taximap_observability::RelayMetriken;
    use tower::ServiceExt;

    fn upgrade_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .header("sec-websocket-protocol", "map-taxi")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn ungueltige_parameter_ergeben_400() {
        let state = RelayState::neu(RelayKonfig::default(), RelayMetriken::neu().unwrap());
        let app = relay_router(state.clone());

        let antwort = app
            .oneshot(upgrade_request(
                "/subscribe?lat=abc&lon=2&id=11111111-1111-1111-1111-111111111111&head=0",
            ))
            .await
            .unwrap();

        assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.registry.uebersicht().verbindungen, 0);
        assert_eq!(
            state
                .metriken
                .eingaben_abgelehnt
                .with_label_values(&["query"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn fehlender_parameter_ergibt_400() {
        let state = RelayState::neu(RelayKonfig::default(), RelayMetriken::neu().unwrap());
        let antwort = relay_router(state)
            .oneshot(upgrade_request("/subscribe?lat=1&lon=2&head=0"))
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn gueltige_parameter_ohne_upgrade_werden_nicht_registriert() {
        let state = RelayState::neu(RelayKonfig::default(), RelayMetriken::neu().unwrap());
        let antwort = relay_router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/subscribe?lat=1&lon=2&id=11111111-1111-1111-1111-111111111111&head=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(antwort.status().is_client_error());
        assert_eq!(state.registry.uebersicht().verbindungen, 0);
    }
}
