//! Verbindungs-Session – Steuerschleife einer einzelnen Verbindung
//!
//! Jede akzeptierte Verbindung bekommt eine `Session` in einem eigenen
//! tokio-Task. Die Session kennt nur die Transport-Traits [`Leser`] und
//! [`Schreiber`]; der WebSocket-Adapter lebt in `ws.rs`.
//!
//! ## State Machine
//! ```text
//! Verhandlung -> Registriert -> Entleeren -> Geschlossen
//!                  |      ^
//!                  +------+  (Limiter, Lesen, Verarbeiten)
//! ```
//!
//! Ausgehende Nachrichten laufen ueber eine begrenzte Queue in einen
//! separaten Writer-Task, damit der Broadcaster nie auf I/O wartet.

use async_trait::async_trait;
use std::sync::Arc;
use taximap_core::{Position, Rolle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};
use crate::rate_limit::TokenBucket;
use crate::state::RelayState;
use crate::subscriber::{Ausgang, SchliessCode, VerbindungsId};
use crate::wire::{self, AnmeldeParameter, Eingehend};

/// Begruendung im Close-Frame fuer langsame Konsumenten
pub const GRUND_LANGSAM: &str = "slow subscriber";

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Lesende Haelfte einer Verbindung
#[async_trait]
pub trait Leser: Send {
    /// Liest die naechste Text-Nachricht.
    ///
    /// Regulaeres Schliessen durch die Gegenstelle liefert
    /// [`RelayError::NormalGeschlossen`].
    async fn lesen(&mut self) -> RelayResult<String>;
}

/// Schreibende Haelfte einer Verbindung
#[async_trait]
pub trait Schreiber: Send {
    async fn senden(&mut self, ausgang: Ausgang) -> RelayResult<()>;

    /// Schliesst den Transport ohne eigenen Close-Frame und leert dabei
    /// noch ausstehende Antworten (z.B. die Bestaetigung eines Close der
    /// Gegenstelle).
    async fn schliessen(&mut self) -> RelayResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Zustand einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// Upgrade-Parameter geprueft, noch nicht registriert
    Verhandlung,
    /// In der Registry, Leseschleife laeuft
    Registriert,
    /// Leseschleife beendet, Abbau laeuft
    Entleeren,
    /// Abgemeldet, Writer beendet
    Geschlossen,
}

/// Steuerschleife einer Verbindung
pub struct Session {
    state: Arc<RelayState>,
    parameter: AnmeldeParameter,
    rolle: Rolle,
    verbindung: VerbindungsId,
    zustand: SessionZustand,
}

impl Session {
    /// Erstellt eine Session fuer bereits gepruefte Upgrade-Parameter
    pub fn neu(state: Arc<RelayState>, parameter: AnmeldeParameter, rolle: Rolle) -> Self {
        Self {
            state,
            parameter,
            rolle,
            verbindung: VerbindungsId::naechste(),
            zustand: SessionZustand::Verhandlung,
        }
    }

    pub fn verbindung(&self) -> VerbindungsId {
        self.verbindung
    }

    fn zustand_setzen(&mut self, neu: SessionZustand) {
        tracing::trace!(
            verbindung = %self.verbindung,
            von = ?self.zustand,
            nach = ?neu,
            "Session-Zustand gewechselt"
        );
        self.zustand = neu;
    }

    /// Fuehrt die Session bis zum Ende der Verbindung aus.
    ///
    /// `Ok(())` bei regulaerem Schliessen durch die Gegenstelle, sonst der
    /// Fehler, der die Schleife beendet hat. Die Abmeldung aus der Registry
    /// erfolgt in jedem Fall.
    pub async fn ausfuehren<L, S>(mut self, mut leser: L, schreiber: S) -> RelayResult<()>
    where
        L: Leser,
        S: Schreiber + 'static,
    {
        let state = Arc::clone(&self.state);
        let konfig = &state.konfig;
        let abbruch = state.abbruch.child_token();
        let schreib_fehler = CancellationToken::new();

        let (tx, rx) = mpsc::channel(konfig.nachrichten_puffer.max(1));
        let writer = tokio::spawn(schreiben(
            schreiber,
            rx,
            schreib_fehler.clone(),
            self.verbindung,
        ));

        let subscriber = state.registry.anmelden(
            self.verbindung,
            self.parameter.identitaet,
            self.rolle,
            self.parameter.position,
            tx.clone(),
        );
        self.zustand_setzen(SessionZustand::Registriert);

        let limiter = TokenBucket::neu(konfig.verbindung_intervall, konfig.verbindung_burst);

        let ergebnis: RelayResult<()> = loop {
            let gelesen = tokio::select! {
                biased;
                _ = abbruch.cancelled() => break Err(RelayError::Abgebrochen),
                _ = subscriber.langsam_signal().cancelled() => {
                    break Err(RelayError::LangsamerKonsument)
                }
                _ = schreib_fehler.cancelled() => break Err(RelayError::SendFehler),
                gelesen = async {
                    limiter.erwerben(&abbruch).await?;
                    leser.lesen().await
                } => gelesen,
            };

            let verarbeitet = gelesen.and_then(|text| self.verarbeiten(&text));
            match verarbeitet {
                Ok(()) => {}
                Err(e) if e.ist_normal() => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.zustand_setzen(SessionZustand::Entleeren);
        state.registry.verbindung_abmelden(self.verbindung);
        self.ende_protokollieren(&ergebnis);

        // Nach regulaerem Schliessen der Gegenstelle antwortet der Transport
        // selbst; der Writer schliesst dann nur noch den Transport.
        let schliessen = match &ergebnis {
            Ok(()) | Err(RelayError::SendFehler) => None,
            Err(RelayError::LangsamerKonsument) => Some(Ausgang::Schliessen {
                code: SchliessCode::LangsamerKonsument,
                grund: GRUND_LANGSAM.to_string(),
            }),
            Err(_) => Some(Ausgang::Schliessen {
                code: SchliessCode::InternerFehler,
                grund: String::new(),
            }),
        };
        let frist = konfig.schliess_frist;
        if let Some(schliessen) = schliessen {
            let _ = tokio::time::timeout(frist, tx.send(schliessen)).await;
        }
        drop(tx);
        drop(subscriber);

        let mut writer = writer;
        if tokio::time::timeout(frist, &mut writer).await.is_err() {
            tracing::debug!(verbindung = %self.verbindung, "Writer-Task haengt – wird abgebrochen");
            writer.abort();
        }

        self.zustand_setzen(SessionZustand::Geschlossen);
        ergebnis
    }

    /// Verarbeitet eine gelesene Nachricht
    fn verarbeiten(&self, text: &str) -> RelayResult<()> {
        let payload = match wire::klassifizieren(text) {
            Eingehend::Positionsbericht(payload) => payload,
            Eingehend::Unbekannt => {
                tracing::trace!(verbindung = %self.verbindung, "Unbekannte Nachricht ignoriert");
                return Ok(());
            }
        };

        let position = payload.parse::<Position>().map_err(|e| {
            self.state.metriken.eingabe_abgelehnt("position");
            tracing::warn!(
                verbindung = %self.verbindung,
                identitaet = %self.parameter.identitaet,
                fehler = %e,
                "Ungueltige Positionsmeldung"
            );
            e
        })?;

        match self.rolle {
            Rolle::Taxi => {
                self.state
                    .registry
                    .position_aktualisieren(&self.parameter.identitaet, position);
            }
            Rolle::Admin | Rolle::Client => {
                tracing::trace!(
                    verbindung = %self.verbindung,
                    rolle = %self.rolle,
                    "Positionsmeldung ohne Taxi-Rolle ignoriert"
                );
            }
        }
        Ok(())
    }

    fn ende_protokollieren(&self, ergebnis: &RelayResult<()>) {
        let identitaet = self.parameter.identitaet;
        match ergebnis {
            Ok(()) => {
                tracing::info!(verbindung = %self.verbindung, identitaet = %identitaet, "Verbindung regulaer geschlossen")
            }
            Err(RelayError::Abgebrochen) => {
                tracing::info!(verbindung = %self.verbindung, identitaet = %identitaet, "Session abgebrochen (Shutdown)")
            }
            Err(RelayError::LangsamerKonsument) => {
                tracing::warn!(verbindung = %self.verbindung, identitaet = %identitaet, "Langsamer Konsument – Verbindung wird geschlossen")
            }
            Err(e) => {
                tracing::warn!(verbindung = %self.verbindung, identitaet = %identitaet, fehler = %e, "Session beendet")
            }
        }
    }
}

/// Writer-Task: leert die Queue in den Transport bis zum Close-Frame
async fn schreiben<S: Schreiber>(
    mut schreiber: S,
    mut rx: mpsc::Receiver<Ausgang>,
    fehler: CancellationToken,
    verbindung: VerbindungsId,
) {
    while let Some(ausgang) = rx.recv().await {
        let letzte = matches!(ausgang, Ausgang::Schliessen { .. });
        if let Err(e) = schreiber.senden(ausgang).await {
            tracing::debug!(verbindung = %verbindung, fehler = %e, "Schreiben fehlgeschlagen");
            fehler.cancel();
            break;
        }
        if letzte {
            return;
        }
    }

    // Queue ohne Close-Frame beendet oder Schreibfehler (z.B. Text nach
    // einem Close der Gegenstelle)
    if let Err(e) = schreiber.schliessen().await {
        tracing::debug!(verbindung = %verbindung, fehler = %e, "Transport nicht sauber geschlossen");
    }
}
