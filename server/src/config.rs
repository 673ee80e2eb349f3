//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use taximap_relay::RelayKonfig;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Relay-Takt, Rate Limits und Queues
    pub relay: RelayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Externe Dienste (Profile, OTP)
    pub dienste: DiensteEinstellungen,
    /// Observability-Einstellungen (Metriken)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    pub port: u16,
    /// Maximale Wartezeit beim Herunterfahren
    pub shutdown_budget_sek: u64,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Taximap".into(),
            bind_adresse: "127.0.0.1".into(),
            port: 4200,
            shutdown_budget_sek: 10,
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Abstand zwischen zwei Broadcasts an Clients
    pub broadcast_intervall_ms: u64,
    /// Token-Auffuellung pro Verbindung
    pub verbindung_intervall_ms: u64,
    pub verbindung_burst: u32,
    /// Token-Auffuellung des serverweiten Publish-Limiters; obere Grenze
    /// der Broadcast-Frequenz, greift nur unterhalb dieses Takts
    pub publish_intervall_ms: u64,
    pub publish_burst: u32,
    /// `false` = Publish-Limiter wird nicht angelegt
    pub publish_limit_aktiv: bool,
    /// Ausgehende Queue pro Teilnehmer
    pub nachrichten_puffer: usize,
    /// Bei doppelter Identitaet die alte Verbindung schliessen (1008)
    pub ersetzte_schliessen: bool,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            broadcast_intervall_ms: 2000,
            verbindung_intervall_ms: 100,
            verbindung_burst: 10,
            publish_intervall_ms: 100,
            publish_burst: 8,
            publish_limit_aktiv: true,
            nachrichten_puffer: 16,
            ersetzte_schliessen: false,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Einstellungen der externen Dienste
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiensteEinstellungen {
    /// JSON-Datei mit Profil-Datensaetzen (leer = keine Profile)
    pub profile_datei: Option<String>,
    /// Gueltigkeit eines Einmal-Codes
    pub otp_gueltigkeit_sek: u64,
    pub otp_code_laenge: usize,
    /// Abstand zwischen zwei Laeufen der Code-Bereinigung
    pub otp_aufraeumen_sek: u64,
}

impl Default for DiensteEinstellungen {
    fn default() -> Self {
        Self {
            profile_datei: None,
            otp_gueltigkeit_sek: 600,
            otp_code_laenge: 6,
            otp_aufraeumen_sek: 60,
        }
    }
}

/// Observability-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Stellt `GET /metrics` bereit
    pub metriken_aktiviert: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            metriken_aktiviert: true,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.server.bind_adresse, self.server.port)
    }

    /// Socket-Adresse des Listeners; `ueberschreiben` (erstes
    /// Kommandozeilenargument) ersetzt Adresse und Port vollstaendig.
    pub fn socket_adresse(&self, ueberschreiben: Option<&str>) -> anyhow::Result<SocketAddr> {
        let adresse = ueberschreiben
            .map(str::to_string)
            .unwrap_or_else(|| self.bind_adresse());
        adresse
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{adresse}'"))
    }

    pub fn shutdown_budget(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_budget_sek)
    }

    pub fn otp_aufraeumen_intervall(&self) -> Duration {
        Duration::from_secs(self.dienste.otp_aufraeumen_sek.max(1))
    }

    /// Relay-Konfiguration mit `Duration`-Werten
    pub fn relay_konfig(&self) -> RelayKonfig {
        let r = &self.relay;
        RelayKonfig {
            broadcast_intervall: Duration::from_millis(r.broadcast_intervall_ms.max(1)),
            verbindung_intervall: Duration::from_millis(r.verbindung_intervall_ms),
            verbindung_burst: r.verbindung_burst,
            publish_intervall: Duration::from_millis(r.publish_intervall_ms),
            publish_burst: r.publish_burst,
            publish_limit_aktiv: r.publish_limit_aktiv,
            nachrichten_puffer: r.nachrichten_puffer,
            ersetzte_schliessen: r.ersetzte_schliessen,
            ..RelayKonfig::default()
        }
    }
}
