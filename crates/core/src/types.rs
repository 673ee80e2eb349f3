//! Gemeinsame Wertetypen fuer Taximap
//!
//! `Identitaet` verwendet das Newtype-Pattern, damit eine Teilnehmer-ID nicht
//! mit anderen UUIDs verwechselt werden kann. `Position` ist ein reiner
//! Wert und wird aus der kompakten Textform `lat,lon[,head]` geparst.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{FormatFehler, FormatResult};

// ---------------------------------------------------------------------------
// Identitaet
// ---------------------------------------------------------------------------

/// Eindeutige Teilnehmer-ID fuer die Lebensdauer einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identitaet(pub Uuid);

impl Identitaet {
    /// Erstellt eine neue zufaellige Identitaet
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for Identitaet {
    fn default() -> Self {
        Self::new()
    }
}

/// Ausgabe ohne Praefix, da die ID so im Broadcast-Format steht
impl fmt::Display for Identitaet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Identitaet {
    type Err = FormatFehler;

    fn from_str(s: &str) -> FormatResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| FormatFehler::Identitaet(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Rolle
// ---------------------------------------------------------------------------

/// Sub-Protokoll fuer Admins
pub const PROTOKOLL_ADMIN: &str = "map-admin";
/// Sub-Protokoll fuer Clients
pub const PROTOKOLL_CLIENT: &str = "map-client";
/// Sub-Protokoll fuer Taxis
pub const PROTOKOLL_TAXI: &str = "map-taxi";

/// Alle aushandelbaren Sub-Protokolle
pub const PROTOKOLLE: [&str; 3] = [PROTOKOLL_ADMIN, PROTOKOLL_CLIENT, PROTOKOLL_TAXI];

/// Rolle eines Teilnehmers, einmal pro Verbindung festgelegt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rolle {
    Admin,
    Client,
    Taxi,
}

impl Rolle {
    /// Alle Rollen in fester Reihenfolge
    pub const ALLE: [Rolle; 3] = [Rolle::Admin, Rolle::Client, Rolle::Taxi];

    /// Leitet die Rolle aus dem ausgehandelten Sub-Protokoll ab.
    ///
    /// Fehlendes oder unbekanntes Protokoll ergibt `Client`.
    pub fn aus_protokoll(protokoll: Option<&str>) -> Self {
        match protokoll {
            Some(PROTOKOLL_ADMIN) => Rolle::Admin,
            Some(PROTOKOLL_TAXI) => Rolle::Taxi,
            _ => Rolle::Client,
        }
    }

    /// Sub-Protokoll-Token dieser Rolle
    pub fn protokoll(&self) -> &'static str {
        match self {
            Rolle::Admin => PROTOKOLL_ADMIN,
            Rolle::Client => PROTOKOLL_CLIENT,
            Rolle::Taxi => PROTOKOLL_TAXI,
        }
    }

    /// Kurzname, z.B. als Metrik-Label
    pub fn name(&self) -> &'static str {
        match self {
            Rolle::Admin => "admin",
            Rolle::Client => "client",
            Rolle::Taxi => "taxi",
        }
    }
}

impl fmt::Display for Rolle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Zuletzt bekannte Position eines Taxis
///
/// Die Fahrtrichtung wird in Grad angegeben, ohne Bereichspruefung.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub breitengrad: f64,
    pub laengengrad: f64,
    pub richtung: i16,
}

impl Position {
    pub fn neu(breitengrad: f64, laengengrad: f64, richtung: i16) -> Self {
        Self {
            breitengrad,
            laengengrad,
            richtung,
        }
    }
}

impl FromStr for Position {
    type Err = FormatFehler;

    /// Parst `lat,lon` oder `lat,lon,head`; fehlende Richtung ist 0.
    fn from_str(s: &str) -> FormatResult<Self> {
        let felder: Vec<&str> = s.split(',').collect();
        if !(2..=3).contains(&felder.len()) {
            return Err(FormatFehler::FeldAnzahl {
                anzahl: felder.len(),
            });
        }

        let breitengrad = felder[0]
            .trim()
            .parse::<f64>()
            .map_err(|e| FormatFehler::Breitengrad(e.to_string()))?;
        let laengengrad = felder[1]
            .trim()
            .parse::<f64>()
            .map_err(|e| FormatFehler::Laengengrad(e.to_string()))?;
        let richtung = match felder.get(2) {
            Some(feld) => feld
                .trim()
                .parse::<i16>()
                .map_err(|e| FormatFehler::Richtung(e.to_string()))?,
            None => 0,
        };

        Ok(Self::neu(breitengrad, laengengrad, richtung))
    }
}

/// Kompakte Textform mit sechs Nachkommastellen: `10.500000,20.500000,95`
impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6},{:.6},{}",
            self.breitengrad, self.laengengrad, self.richtung
        )
    }
}
