//! Profil-Quelle – Benutzer- und Taxi-Profile
//!
//! Das JSON-Format entspricht den Datensaetzen der Profil-Tabelle
//! (`role` statt `rolle`), damit bestehende Clients es direkt lesen.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use taximap_core::Identitaet;

use crate::error::{DienstError, DienstResult};

/// Profil eines Teilnehmers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profil {
    pub id: Identitaet,
    #[serde(default)]
    pub slug: String,
    #[serde(rename = "role", default)]
    pub rolle: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub cover_img_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Lesender Zugriff auf Profile
#[async_trait]
pub trait ProfilQuelle: Send + Sync {
    /// Einzelnes Profil, `NichtGefunden` wenn unbekannt
    async fn profil(&self, id: &Identitaet) -> DienstResult<Profil>;

    /// Alle bekannten Profile zu `ids`; unbekannte werden uebersprungen
    async fn profile(&self, ids: &[Identitaet]) -> DienstResult<Vec<Profil>>;
}

/// Profile im Speicher
#[derive(Debug, Default)]
pub struct SpeicherProfilQuelle {
    profile: HashMap<Identitaet, Profil>,
}

impl SpeicherProfilQuelle {
    pub fn neu(profile: impl IntoIterator<Item = Profil>) -> Self {
        Self {
            profile: profile.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    /// Laedt ein JSON-Array von Profilen
    pub fn aus_json(json: &str) -> DienstResult<Self> {
        let profile: Vec<Profil> = serde_json::from_str(json)?;
        Ok(Self::neu(profile))
    }

    /// Laedt Profile aus einer JSON-Datei
    pub fn laden(pfad: &Path) -> DienstResult<Self> {
        let inhalt = std::fs::read_to_string(pfad)?;
        let quelle = Self::aus_json(&inhalt)?;
        tracing::info!(
            pfad = %pfad.display(),
            anzahl = quelle.anzahl(),
            "Profile geladen"
        );
        Ok(quelle)
    }

    pub fn anzahl(&self) -> usize {
        self.profile.len()
    }
}

#[async_trait]
impl ProfilQuelle for SpeicherProfilQuelle {
    async fn profil(&self, id: &Identitaet) -> DienstResult<Profil> {
        self.profile
            .get(id)
            .cloned()
            .ok_or_else(|| DienstError::nicht_gefunden(format!("Profil {id}")))
    }

    async fn profile(&self, ids: &[Identitaet]) -> DienstResult<Vec<Profil>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.profile.get(id).cloned())
            .collect())
    }
}
