//! Fehlertypen fuer das Relay

use taximap_core::FormatFehler;
use thiserror::Error;

/// Fehlertyp fuer Sessions, Rate Limiter und Transport
#[derive(Debug, Error)]
pub enum RelayError {
    /// Ungueltige Eingabe (Query-Parameter oder Positions-Payload)
    #[error("Ungueltige Eingabe: {0}")]
    Format(#[from] FormatFehler),

    /// Gegenstelle hat die Verbindung regulaer geschlossen (Status 1000)
    #[error("Verbindung regulaer geschlossen")]
    NormalGeschlossen,

    /// Lese-/Schreibfehler oder Schliessen mit anderem Status
    #[error("Verbindungsfehler: {0}")]
    Verbindung(String),

    /// Kontext abgebrochen (Shutdown, Timeout)
    #[error("Abgebrochen")]
    Abgebrochen,

    /// Teilnehmer wurde als langsamer Konsument geschlossen
    #[error("Langsamer Konsument")]
    LangsamerKonsument,

    /// Ausgehende Queue geschlossen
    #[error("Senden fehlgeschlagen")]
    SendFehler,
}

impl RelayError {
    /// Erstellt einen Verbindungsfehler
    pub fn verbindung(msg: impl Into<String>) -> Self {
        Self::Verbindung(msg.into())
    }

    /// Regulaeres Ende durch die Gegenstelle
    pub fn ist_normal(&self) -> bool {
        matches!(self, Self::NormalGeschlossen)
    }
}

/// Result-Typ fuer das Relay
pub type RelayResult<T> = Result<T, RelayError>;
