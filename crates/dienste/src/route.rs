//! Routen-Dienst – Routenberechnung zwischen zwei Adressen

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DienstError, DienstResult};

/// Ein Abschnitt einer berechneten Route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutenAbschnitt {
    pub zusammenfassung: String,
    pub distanz_meter: u64,
    pub dauer_sek: u64,
    pub start_adresse: String,
    pub ziel_adresse: String,
    /// Kodierte Polyline des Abschnitts
    pub polyline: String,
}

#[async_trait]
pub trait RoutenDienst: Send + Sync {
    async fn route(&self, von: &str, nach: &str) -> DienstResult<Vec<RoutenAbschnitt>>;
}

/// Platzhalter ohne Kartenanbieter
#[derive(Debug, Default, Clone, Copy)]
pub struct KeinRoutenDienst;

#[async_trait]
impl RoutenDienst for KeinRoutenDienst {
    async fn route(&self, _von: &str, _nach: &str) -> DienstResult<Vec<RoutenAbschnitt>> {
        Err(DienstError::NichtKonfiguriert("Routenberechnung"))
    }
}
