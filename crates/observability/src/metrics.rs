//! Prometheus-kompatible Metriken fuer Taximap
//!
//! Registrierte Metriken:
//! - `taximap_subscribers{rolle}` – Gauge: Registrierte Teilnehmer pro Rolle
//! - `taximap_registrierungen_ersetzt_total` – Counter: Doppelte Registrierungen
//! - `taximap_positionen_total` – Counter: Uebernommene Positionsmeldungen
//! - `taximap_eingaben_abgelehnt_total{grund}` – Counter: Abgelehnte Eingaben
//! - `taximap_broadcasts_total` – Counter: Broadcast-Runden mit Taxi-Daten
//! - `taximap_broadcast_zustellungen_total` – Counter: Erfolgreiche Client-Zustellungen
//! - `taximap_clients_verdraengt_total` – Counter: Clients nach Sendefehler entfernt

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Relay-Metriken in einer eigenen Registry
#[derive(Clone)]
pub struct RelayMetriken {
    pub registry: Arc<Registry>,

    pub subscribers: IntGaugeVec,
    pub registrierungen_ersetzt: IntCounter,
    pub positionen: IntCounter,
    pub eingaben_abgelehnt: IntCounterVec,
    pub broadcasts: IntCounter,
    pub broadcast_zustellungen: IntCounter,
    pub clients_verdraengt: IntCounter,
}

impl RelayMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let subscribers = IntGaugeVec::new(
            Opts::new(
                "taximap_subscribers",
                "Anzahl registrierter Teilnehmer pro Rolle",
            ),
            &["rolle"],
        )?;
        registry.register(Box::new(subscribers.clone()))?;

        let registrierungen_ersetzt = IntCounter::with_opts(Opts::new(
            "taximap_registrierungen_ersetzt_total",
            "Registrierungen, die einen bestehenden Eintrag derselben Identitaet ersetzt haben",
        ))?;
        registry.register(Box::new(registrierungen_ersetzt.clone()))?;

        let positionen = IntCounter::with_opts(Opts::new(
            "taximap_positionen_total",
            "Uebernommene Positionsmeldungen von Taxis",
        ))?;
        registry.register(Box::new(positionen.clone()))?;

        let eingaben_abgelehnt = IntCounterVec::new(
            Opts::new(
                "taximap_eingaben_abgelehnt_total",
                "Abgelehnte Eingaben (Query-Parameter, Positions-Payload)",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(eingaben_abgelehnt.clone()))?;

        let broadcasts = IntCounter::with_opts(Opts::new(
            "taximap_broadcasts_total",
            "Broadcast-Runden, in denen Taxi-Positionen verteilt wurden",
        ))?;
        registry.register(Box::new(broadcasts.clone()))?;

        let broadcast_zustellungen = IntCounter::with_opts(Opts::new(
            "taximap_broadcast_zustellungen_total",
            "Erfolgreich eingereihte Broadcast-Nachrichten an Clients",
        ))?;
        registry.register(Box::new(broadcast_zustellungen.clone()))?;

        let clients_verdraengt = IntCounter::with_opts(Opts::new(
            "taximap_clients_verdraengt_total",
            "Clients, die nach einem Sendefehler aus dem Broadcast entfernt wurden",
        ))?;
        registry.register(Box::new(clients_verdraengt.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            subscribers,
            registrierungen_ersetzt,
            positionen,
            eingaben_abgelehnt,
            broadcasts,
            broadcast_zustellungen,
            clients_verdraengt,
        })
    }

    /// Zaehlt eine abgelehnte Eingabe
    pub fn eingabe_abgelehnt(&self, grund: &str) {
        self.eingaben_abgelehnt.with_label_values(&[grund]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelayMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelayMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
