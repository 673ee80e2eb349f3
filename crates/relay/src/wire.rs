//! Wire-Format des Relays
//!
//! Eingehend (Text-Frame):  `pos#<lat>,<lon>,<head>`, alles andere wird ignoriert.
//! Ausgehend (nur Clients): `taxis-<pos>&<id>$<pos>&<id>...`
//! Upgrade-Query:           `?lat=<f64>&lon=<f64>&id=<uuid>&head=<i16>`

use std::collections::HashMap;
use taximap_core::{FormatFehler, FormatResult, Identitaet, Position};

/// Praefix einer Positionsmeldung (Tag + Trennzeichen)
pub const POSITIONS_PRAEFIX: &str = "pos#";
/// Praefix der Broadcast-Nachricht an Clients
pub const TAXIS_PRAEFIX: &str = "taxis-";
/// Trennzeichen zwischen Eintraegen
pub const EINTRAG_TRENNER: char = '$';
/// Trennzeichen zwischen Position und Identitaet
pub const ID_TRENNER: char = '&';

// ---------------------------------------------------------------------------
// Eingehende Nachrichten
// ---------------------------------------------------------------------------

/// Klassifikation einer eingehenden Text-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eingehend<'a> {
    /// Positionsmeldung, Payload nach dem Praefix (noch ungeparst)
    Positionsbericht(&'a str),
    /// Unbekannte Form, wird ohne Zustandsaenderung akzeptiert
    Unbekannt,
}

/// Ordnet eine Nachricht anhand ihres fuehrenden Tags ein
pub fn klassifizieren(text: &str) -> Eingehend<'_> {
    match text.strip_prefix(POSITIONS_PRAEFIX) {
        Some(payload) => Eingehend::Positionsbericht(payload),
        None => Eingehend::Unbekannt,
    }
}

// ---------------------------------------------------------------------------
// Broadcast an Clients
// ---------------------------------------------------------------------------

/// Kodiert eine geordnete Folge von Taxi-Positionen als Broadcast-Nachricht
pub fn taxis_kodieren(eintraege: &[(Identitaet, Position)]) -> String {
    let mut text = String::with_capacity(TAXIS_PRAEFIX.len() + eintraege.len() * 64);
    text.push_str(TAXIS_PRAEFIX);
    for (i, (identitaet, position)) in eintraege.iter().enumerate() {
        if i > 0 {
            text.push(EINTRAG_TRENNER);
        }
        text.push_str(&position.to_string());
        text.push(ID_TRENNER);
        text.push_str(&identitaet.to_string());
    }
    text
}

/// Dekodiert eine Broadcast-Nachricht, `None` bei ungueltigem Aufbau.
///
/// Gegenstueck zu [`taxis_kodieren`], fuer Tests und Simulatoren.
pub fn taxis_dekodieren(text: &str) -> Option<Vec<(Identitaet, Position)>> {
    let rumpf = text.strip_prefix(TAXIS_PRAEFIX)?;
    rumpf
        .split(EINTRAG_TRENNER)
        .map(|eintrag| {
            let (position, identitaet) = eintrag.split_once(ID_TRENNER)?;
            Some((identitaet.parse().ok()?, position.parse().ok()?))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Upgrade-Parameter
// ---------------------------------------------------------------------------

/// Pflichtparameter des Upgrade-Requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnmeldeParameter {
    pub identitaet: Identitaet,
    pub position: Position,
}

impl AnmeldeParameter {
    /// Parst `lat`, `lon`, `id` und `head` aus den Query-Parametern
    pub fn aus_query(query: &HashMap<String, String>) -> FormatResult<Self> {
        let feld = |name: &'static str| {
            query
                .get(name)
                .map(String::as_str)
                .ok_or(FormatFehler::FehlenderParameter(name))
        };

        let breitengrad = feld("lat")?
            .parse::<f64>()
            .map_err(|e| FormatFehler::Breitengrad(e.to_string()))?;
        let laengengrad = feld("lon")?
            .parse::<f64>()
            .map_err(|e| FormatFehler::Laengengrad(e.to_string()))?;
        let identitaet = feld("id")?.parse::<Identitaet>()?;
        let richtung = feld("head")?
            .trim()
            .parse::<i16>()
            .map_err(|e| FormatFehler::Richtung(e.to_string()))?;

        Ok(Self {
            identitaet,
            position: Position::neu(breitengrad, laengengrad, richtung),
        })
    }
}
