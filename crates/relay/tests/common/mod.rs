//! In-Memory-Transport fuer Session-Tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taximap_core::{Identitaet, Position, Rolle};
use taximap_observability::RelayMetriken;
use taximap_relay::{
    wire::AnmeldeParameter, Ausgang, Leser, RelayError, RelayKonfig, RelayResult, RelayState,
    Schreiber, Session,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const TAXI_ID: &str = "11111111-1111-1111-1111-111111111111";

pub struct TestLeser {
    rx: mpsc::UnboundedReceiver<RelayResult<String>>,
}

#[async_trait]
impl Leser for TestLeser {
    async fn lesen(&mut self) -> RelayResult<String> {
        match self.rx.recv().await {
            Some(ergebnis) => ergebnis,
            None => Err(RelayError::verbindung("Gegenstelle getrennt")),
        }
    }
}

pub struct TestSchreiber {
    tx: mpsc::UnboundedSender<Ausgang>,
    haengend: bool,
    geschlossen: Arc<AtomicBool>,
}

#[async_trait]
impl Schreiber for TestSchreiber {
    async fn senden(&mut self, ausgang: Ausgang) -> RelayResult<()> {
        if self.haengend {
            std::future::pending::<()>().await;
        }
        self.tx.send(ausgang).map_err(|_| RelayError::SendFehler)
    }

    async fn schliessen(&mut self) -> RelayResult<()> {
        self.geschlossen.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Testseite einer Verbindung
pub struct Gegenstelle {
    eingang: mpsc::UnboundedSender<RelayResult<String>>,
    pub ausgang: mpsc::UnboundedReceiver<Ausgang>,
    geschlossen: Arc<AtomicBool>,
}

impl Gegenstelle {
    pub fn senden(&self, text: &str) {
        self.eingang.send(Ok(text.to_string())).unwrap();
    }

    pub fn schliessen(&self) {
        self.eingang.send(Err(RelayError::NormalGeschlossen)).unwrap();
    }

    /// Transport ohne eigenen Close-Frame geschlossen
    pub fn transport_geschlossen(&self) -> bool {
        self.geschlossen.load(Ordering::SeqCst)
    }

    pub async fn empfangen(&mut self) -> Option<Ausgang> {
        tokio::time::timeout(Duration::from_secs(5), self.ausgang.recv())
            .await
            .ok()
            .flatten()
    }

    /// Alle bereits eingereihten Nachrichten
    pub fn alle(&mut self) -> Vec<Ausgang> {
        let mut nachrichten = Vec::new();
        while let Ok(n) = self.ausgang.try_recv() {
            nachrichten.push(n);
        }
        nachrichten
    }
}

pub fn transport(haengend: bool) -> (TestLeser, TestSchreiber, Gegenstelle) {
    let (eingang, rx) = mpsc::unbounded_channel();
    let (tx, ausgang) = mpsc::unbounded_channel();
    let geschlossen = Arc::new(AtomicBool::new(false));
    (
        TestLeser { rx },
        TestSchreiber {
            tx,
            haengend,
            geschlossen: geschlossen.clone(),
        },
        Gegenstelle {
            eingang,
            ausgang,
            geschlossen,
        },
    )
}

pub fn state(konfig: RelayKonfig) -> Arc<RelayState> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    RelayState::neu(konfig, RelayMetriken::neu().unwrap())
}

pub fn parameter(identitaet: Identitaet, position: Position) -> AnmeldeParameter {
    AnmeldeParameter {
        identitaet,
        position,
    }
}

/// Startet eine Session in einem eigenen Task
pub fn verbinden(
    state: &Arc<RelayState>,
    identitaet: Identitaet,
    rolle: Rolle,
    haengend: bool,
) -> (JoinHandle<RelayResult<()>>, Gegenstelle) {
    let (leser, schreiber, gegenstelle) = transport(haengend);
    let session = Session::neu(
        state.clone(),
        parameter(identitaet, Position::neu(10.0, 20.0, 90)),
        rolle,
    );
    (tokio::spawn(session.ausfuehren(leser, schreiber)), gegenstelle)
}

/// Wartet bis `bedingung` erfuellt ist (hoechstens 5 s)
pub async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    for _ in 0..500 {
        if bedingung() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Bedingung nicht innerhalb von 5 s erfuellt");
}
