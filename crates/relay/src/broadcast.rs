//! Broadcast-Scheduler – Verteilt Taxi-Positionen an alle Clients
//!
//! Ein einziger langlebiger Task, unabhaengig von den Sessions. Pro Tick
//! wird (optional) ein Token des serverweiten Publish-Limiters erworben,
//! danach liefert die Registry unter ihrer Sperre eine konsistente
//! Momentaufnahme an alle Clients aus.
//!
//! Der Publish-Limiter begrenzt die Broadcast-Frequenz nach oben. Beim
//! Standardtakt (2 s, Limiter Burst 8 / 100 ms) greift er nie; erst ein
//! `broadcast_intervall` unter `publish_intervall` wird auf dessen Rate
//! gedrosselt.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};
use crate::rate_limit::TokenBucket;
use crate::registry::Zustellung;
use crate::state::RelayState;
use crate::wire;

/// Periodischer Broadcast an alle Clients
pub struct BroadcastScheduler {
    state: Arc<RelayState>,
    publish_limiter: Option<TokenBucket>,
}

impl BroadcastScheduler {
    pub fn neu(state: Arc<RelayState>) -> Self {
        let publish_limiter = state
            .konfig
            .publish_limit_aktiv
            .then(|| TokenBucket::neu(state.konfig.publish_intervall, state.konfig.publish_burst));
        Self {
            state,
            publish_limiter,
        }
    }

    /// Eine Broadcast-Runde. `None` wenn keine Taxi-Position bekannt ist.
    pub async fn tick(&self, abbruch: &CancellationToken) -> RelayResult<Option<Zustellung>> {
        if let Some(limiter) = &self.publish_limiter {
            limiter.erwerben(abbruch).await?;
        }

        let Some(zustellung) = self.state.registry.clients_beliefern(wire::taxis_kodieren) else {
            tracing::trace!("Keine Taxi-Positionen – Broadcast uebersprungen");
            return Ok(None);
        };

        let metriken = &self.state.metriken;
        metriken.broadcasts.inc();
        metriken
            .broadcast_zustellungen
            .inc_by(zustellung.zugestellt as u64);

        tracing::debug!(
            taxis = zustellung.taxis,
            zugestellt = zustellung.zugestellt,
            verdraengt = zustellung.verdraengt.len(),
            "Taxi-Positionen verteilt"
        );
        Ok(Some(zustellung))
    }

    /// Laeuft bis `abbruch` ausgeloest wird. Der erste Tick folgt nach
    /// einem vollen Intervall.
    pub async fn ausfuehren(self, abbruch: CancellationToken) {
        let periode = self.state.konfig.broadcast_intervall;
        let mut intervall = tokio::time::interval_at(Instant::now() + periode, periode);
        intervall.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(intervall_ms = periode.as_millis() as u64, "Broadcast-Scheduler gestartet");

        loop {
            tokio::select! {
                biased;
                _ = abbruch.cancelled() => break,
                _ = intervall.tick() => {
                    if let Err(RelayError::Abgebrochen) = self.tick(&abbruch).await {
                        break;
                    }
                }
            }
        }

        tracing::info!("Broadcast-Scheduler beendet");
    }

    /// Startet den Scheduler als eigenen Task
    pub fn starten(self, abbruch: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.ausfuehren(abbruch))
    }
}
