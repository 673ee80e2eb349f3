//! Gemeinsamer Relay-Zustand
//!
//! Haelt Registry, Konfiguration, Metriken und die Abbruch-Hierarchie als
//! Arc-Referenz, die zwischen Sessions und Scheduler geteilt wird.

use std::sync::Arc;
use std::time::Duration;
use taximap_observability::RelayMetriken;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::registry::{RegistryOptionen, SubscriberRegistry};

/// Konfiguration des Relays
#[derive(Debug, Clone)]
pub struct RelayKonfig {
    /// Abstand zwischen zwei Broadcast-Runden
    pub broadcast_intervall: Duration,
    /// Auffuellintervall des Limiters pro Verbindung
    pub verbindung_intervall: Duration,
    /// Burst des Limiters pro Verbindung
    pub verbindung_burst: u32,
    /// Auffuellintervall des serverweiten Publish-Limiters
    pub publish_intervall: Duration,
    /// Burst des Publish-Limiters
    pub publish_burst: u32,
    /// Publish-Limiter verwenden
    pub publish_limit_aktiv: bool,
    /// Groesse der ausgehenden Queue pro Teilnehmer
    pub nachrichten_puffer: usize,
    /// Bei doppelter Registrierung die alte Verbindung schliessen
    pub ersetzte_schliessen: bool,
    /// Frist fuer den Writer-Task, den Close-Frame zu senden
    pub schliess_frist: Duration,
}

impl Default for RelayKonfig {
    fn default() -> Self {
        Self {
            broadcast_intervall: Duration::from_secs(2),
            verbindung_intervall: Duration::from_millis(100),
            verbindung_burst: 10,
            publish_intervall: Duration::from_millis(100),
            publish_burst: 8,
            publish_limit_aktiv: true,
            nachrichten_puffer: 16,
            ersetzte_schliessen: false,
            schliess_frist: Duration::from_secs(1),
        }
    }
}

/// Gemeinsamer Relay-Zustand (Arc-geteilt)
pub struct RelayState {
    pub konfig: RelayKonfig,
    pub registry: SubscriberRegistry,
    pub metriken: RelayMetriken,
    /// Wurzel der Abbruch-Hierarchie; Sessions und Scheduler erhalten Kinder
    pub abbruch: CancellationToken,
    /// Alle laufenden Sessions, fuer den Shutdown
    pub sessions: TaskTracker,
}

impl RelayState {
    pub fn neu(konfig: RelayKonfig, metriken: RelayMetriken) -> Arc<Self> {
        let registry = SubscriberRegistry::neu(
            RegistryOptionen {
                ersetzte_schliessen: konfig.ersetzte_schliessen,
            },
            metriken.clone(),
        );
        Arc::new(Self {
            konfig,
            registry,
            metriken,
            abbruch: CancellationToken::new(),
            sessions: TaskTracker::new(),
        })
    }

    /// Loest den Shutdown aller Sessions und des Schedulers aus
    pub fn herunterfahren(&self) {
        self.abbruch.cancel();
        self.sessions.close();
    }
}
