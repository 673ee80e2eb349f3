//! Integration-Tests fuer die HTTP-Routen (oneshot gegen den Router)

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taximap_core::{Identitaet, Position, Rolle};
use taximap_dienste::{KeinRoutenDienst, Profil, SpeicherOtpDienst, SpeicherProfilQuelle};
use taximap_observability::RelayMetriken;
use taximap_relay::{RelayKonfig, RelayState, VerbindungsId};
use taximap_server::{config::ServerConfig, routes, Server};
use tokio::net::TcpListener;
use tower::ServiceExt;

const TAXI_ID: &str = "11111111-1111-1111-1111-111111111111";

struct Testaufbau {
    app: Router,
    relay: Arc<RelayState>,
    otp: Arc<SpeicherOtpDienst>,
}

fn aufbau(metriken_aktiviert: bool) -> Testaufbau {
    let relay = RelayState::neu(RelayKonfig::default(), RelayMetriken::neu().unwrap());
    let otp = Arc::new(SpeicherOtpDienst::neu(Duration::from_secs(600), 6));
    let profile = SpeicherProfilQuelle::neu([Profil {
        id: TAXI_ID.parse().unwrap(),
        slug: "taxi-1".into(),
        rolle: "taxi".into(),
        username: "fahrer1".into(),
        full_name: "Erster Fahrer".into(),
        avatar_url: None,
        cover_img_url: None,
        phone: Some("+4915100000001".into()),
    }]);

    let state = routes::AppState {
        relay: relay.clone(),
        profile: Arc::new(profile),
        routen: Arc::new(KeinRoutenDienst),
        otp: otp.clone(),
        start: Instant::now(),
    };
    Testaufbau {
        app: routes::router(state, metriken_aktiviert),
        relay,
        otp,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn json_body(antwort: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(antwort.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn profil_laden() {
    let t = aufbau(true);
    let antwort = t.app.oneshot(get(&format!("/profile?id={TAXI_ID}"))).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::OK);

    let json = json_body(antwort).await;
    assert_eq!(json["id"], TAXI_ID);
    assert_eq!(json["role"], "taxi");
    assert_eq!(json["username"], "fahrer1");
}

#[tokio::test]
async fn profil_fehlerfaelle() {
    let t = aufbau(true);

    let antwort = t.app.clone().oneshot(get("/profile?id=kein-uuid")).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);

    let antwort = t.app.clone().oneshot(get("/profile")).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);

    let unbekannt = Identitaet::new();
    let antwort = t
        .app
        .oneshot(get(&format!("/profile?id={unbekannt}")))
        .await
        .unwrap();
    assert_eq!(antwort.status(), StatusCode::NOT_FOUND);
    assert!(json_body(antwort).await["fehler"].is_string());
}

#[tokio::test]
async fn taxis_liefert_bekannte_profile() {
    let t = aufbau(true);
    let uri = format!("/taxis?ids={TAXI_ID},{}", Identitaet::new());
    let antwort = t.app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::OK);

    let json = json_body(antwort).await;
    let liste = json.as_array().unwrap();
    assert_eq!(liste.len(), 1);
    assert_eq!(liste[0]["slug"], "taxi-1");

    let antwort = t.app.oneshot(get("/taxis?ids=abc")).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn route_ohne_anbieter() {
    let t = aufbau(true);

    let antwort = t.app.clone().oneshot(get("/route?from=A")).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);

    let antwort = t.app.oneshot(get("/route?from=A&to=B")).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn otp_senden_und_pruefen() {
    let t = aufbau(true);
    let telefon = "+4915100000009";

    let antwort = t
        .app
        .clone()
        .oneshot(post_json("/otp/senden", serde_json::json!({ "telefon": telefon })))
        .await
        .unwrap();
    assert_eq!(antwort.status(), StatusCode::ACCEPTED);

    let code = t.otp.ausstehender_code(telefon).unwrap();
    let antwort = t
        .app
        .clone()
        .oneshot(post_json(
            "/otp/pruefen",
            serde_json::json!({ "telefon": telefon, "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(antwort.status(), StatusCode::OK);
    assert_eq!(json_body(antwort).await["gueltig"], true);

    // Code ist verbraucht
    let antwort = t
        .app
        .oneshot(post_json(
            "/otp/pruefen",
            serde_json::json!({ "telefon": telefon, "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(json_body(antwort).await["gueltig"], false);
}

#[tokio::test]
async fn otp_ungueltige_nummer() {
    let t = aufbau(true);
    let antwort = t
        .app
        .oneshot(post_json("/otp/senden", serde_json::json!({ "telefon": "12345" })))
        .await
        .unwrap();
    assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_zeigt_registry() {
    let t = aufbau(true);
    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    t.relay.registry.anmelden(
        VerbindungsId::naechste(),
        TAXI_ID.parse().unwrap(),
        Rolle::Taxi,
        Position::neu(10.0, 20.0, 90),
        tx,
    );

    let antwort = t.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::OK);
    let json = json_body(antwort).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["taxis"], 1);
    assert_eq!(json["clients"], 0);
    assert_eq!(json["verbindungen"], 1);
}

#[tokio::test]
async fn subscribe_mit_ungueltiger_query() {
    let t = aufbau(true);
    let antwort = t
        .app
        .oneshot(get("/subscribe?lat=1&lon=2&id=abc&head=0"))
        .await
        .unwrap();
    assert_eq!(antwort.status(), StatusCode::BAD_REQUEST);
    assert_eq!(t.relay.registry.uebersicht().verbindungen, 0);
}

#[tokio::test]
async fn metriken_abschaltbar() {
    let t = aufbau(true);
    let antwort = t.app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::OK);

    let t = aufbau(false);
    let antwort = t.app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(antwort.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn server_faehrt_herunter() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = ServerConfig::default();
    config.server.shutdown_budget_sek = 2;

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(Server::neu(config).starten_mit(listener, async {
        let _ = rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();

    let ergebnis = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("Shutdown dauert zu lange")
        .unwrap();
    assert!(ergebnis.is_ok());
}

#[test]
fn server_baut_zustand_aus_config() {
    let server = Server::neu(ServerConfig::default());
    let state = server.zustand_aufbauen().unwrap();
    assert_eq!(state.relay.konfig.broadcast_intervall, Duration::from_secs(2));
    assert!(state.relay.konfig.publish_limit_aktiv);
}
