//! Subscriber – Handle auf einen registrierten Teilnehmer
//!
//! Der Subscriber gehoert seiner Session. Die Registry haelt nur Klone des
//! Handles, um Broadcasts einzureihen und den Teilnehmer bei Bedarf als
//! langsamen Konsumenten schliessen zu lassen.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use taximap_core::{Identitaet, Position, Rolle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Verbindungs-Handle
// ---------------------------------------------------------------------------

/// Prozessweit eindeutiges Handle einer Transportverbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerbindungsId(u64);

impl VerbindungsId {
    /// Vergibt das naechste freie Handle
    pub fn naechste() -> Self {
        static ZAEHLER: AtomicU64 = AtomicU64::new(1);
        Self(ZAEHLER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Ausgehende Nachrichten
// ---------------------------------------------------------------------------

/// WebSocket-Statuscodes beim Schliessen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchliessCode {
    /// 1008 – langsamer Konsument
    LangsamerKonsument,
    /// 1011 – Session beendet sich selbst
    InternerFehler,
}

impl SchliessCode {
    pub fn code(&self) -> u16 {
        match self {
            SchliessCode::LangsamerKonsument => 1008,
            SchliessCode::InternerFehler => 1011,
        }
    }
}

/// Nachricht an den Writer-Task einer Session
#[derive(Debug, Clone, PartialEq)]
pub enum Ausgang {
    /// Text-Frame; `Arc`, damit ein Broadcast nur einmal kodiert wird
    Text(Arc<str>),
    /// Close-Frame mit Status und Begruendung
    Schliessen { code: SchliessCode, grund: String },
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// Registrierter Teilnehmer
#[derive(Clone, Debug)]
pub struct Subscriber {
    pub identitaet: Identitaet,
    pub rolle: Rolle,
    pub verbindung: VerbindungsId,
    /// Position aus dem Upgrade-Request
    pub position: Position,
    tx: mpsc::Sender<Ausgang>,
    langsam: CancellationToken,
}

impl Subscriber {
    pub fn neu(
        identitaet: Identitaet,
        rolle: Rolle,
        verbindung: VerbindungsId,
        position: Position,
        tx: mpsc::Sender<Ausgang>,
    ) -> Self {
        Self {
            identitaet,
            rolle,
            verbindung,
            position,
            tx,
            langsam: CancellationToken::new(),
        }
    }

    /// Reiht eine Text-Nachricht nicht-blockierend ein.
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, text: Arc<str>) -> bool {
        match self.tx.try_send(Ausgang::Text(text)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(identitaet = %self.identitaet, "Send-Queue voll");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    identitaet = %self.identitaet,
                    "Send-Queue geschlossen (Verbindung getrennt)"
                );
                false
            }
        }
    }

    /// Fordert die Session auf, die Verbindung als langsamen Konsumenten zu schliessen
    pub fn langsam_schliessen(&self) {
        self.langsam.cancel();
    }

    /// Wird ausgeloest sobald `langsam_schliessen` aufgerufen wurde
    pub fn langsam_signal(&self) -> &CancellationToken {
        &self.langsam
    }
}
