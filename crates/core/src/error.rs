//! Fehlertypen fuer Eingabeformate
//!
//! Alle Fehler beim Parsen von Query-Parametern und Positionsmeldungen
//! landen in `FormatFehler`. Sie werden immer lokal behandelt und fuehren
//! nie zum Abbruch des Prozesses.

use thiserror::Error;

/// Result-Alias fuer Parse-Operationen
pub type FormatResult<T> = std::result::Result<T, FormatFehler>;

/// Ungueltige Eingabe (Query-Parameter oder Positions-Payload)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatFehler {
    #[error("Ungueltiges Positionsformat: 2 oder 3 Felder erwartet, {anzahl} erhalten")]
    FeldAnzahl { anzahl: usize },

    #[error("Ungueltiger Breitengrad: {0}")]
    Breitengrad(String),

    #[error("Ungueltiger Laengengrad: {0}")]
    Laengengrad(String),

    #[error("Ungueltige Fahrtrichtung: {0}")]
    Richtung(String),

    #[error("Ungueltige Identitaet: {0}")]
    Identitaet(String),

    #[error("Parameter fehlt: {0}")]
    FehlenderParameter(&'static str),
}
