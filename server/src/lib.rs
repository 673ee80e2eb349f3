//! taximap-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;
pub mod routes;

use anyhow::{Context, Result};
use config::ServerConfig;
use routes::AppState;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taximap_dienste::{KeinRoutenDienst, OtpDienst, SpeicherOtpDienst, SpeicherProfilQuelle};
use taximap_observability::RelayMetriken;
use taximap_relay::{BroadcastScheduler, RelayState};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    /// Ersetzt die Bind-Adresse aus der Konfiguration
    adresse: Option<String>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self {
            config,
            adresse: None,
        }
    }

    /// Ueberschreibt die Bind-Adresse (`host:port`)
    pub fn mit_adresse(mut self, adresse: impl Into<String>) -> Self {
        self.adresse = Some(adresse.into());
        self
    }

    /// Baut Relay-Zustand und Dienste aus der Konfiguration
    pub fn zustand_aufbauen(&self) -> Result<AppState> {
        let metriken = RelayMetriken::neu().context("Metriken konnten nicht registriert werden")?;
        let relay = RelayState::neu(self.config.relay_konfig(), metriken);

        let profile = match &self.config.dienste.profile_datei {
            Some(pfad) => SpeicherProfilQuelle::laden(Path::new(pfad))
                .with_context(|| format!("Profile aus '{pfad}' nicht ladbar"))?,
            None => {
                tracing::warn!("Keine Profil-Datei konfiguriert – /profile liefert 404");
                SpeicherProfilQuelle::default()
            }
        };
        let otp = SpeicherOtpDienst::neu(
            Duration::from_secs(self.config.dienste.otp_gueltigkeit_sek),
            self.config.dienste.otp_code_laenge,
        );

        Ok(AppState {
            relay,
            profile: Arc::new(profile),
            routen: Arc::new(KeinRoutenDienst),
            otp: Arc::new(otp),
            start: Instant::now(),
        })
    }

    /// Startet den Server und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let adresse: SocketAddr = self.config.socket_adresse(self.adresse.as_deref())?;
        let listener = TcpListener::bind(adresse)
            .await
            .with_context(|| format!("Bind auf {adresse} fehlgeschlagen"))?;

        self.starten_mit(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht registriert werden");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Startet den Server auf einem bereits gebundenen Listener
    ///
    /// Reihenfolge:
    /// 1. Relay-Zustand und Dienste aufbauen
    /// 2. Broadcast-Scheduler starten
    /// 3. HTTP/WebSocket bedienen bis `shutdown` eintritt
    /// 4. Sessions abbrechen und hoechstens `shutdown_budget_sek` warten
    pub async fn starten_mit(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let state = self.zustand_aufbauen()?;
        let relay = state.relay.clone();
        let otp = state.otp.clone();
        let app = routes::router(state, self.config.observability.metriken_aktiviert);

        let scheduler = BroadcastScheduler::neu(relay.clone()).starten(relay.abbruch.child_token());
        let bereinigung = otp_aufraeumen_starten(
            otp,
            self.config.otp_aufraeumen_intervall(),
            relay.abbruch.child_token(),
        );

        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %listener.local_addr()?,
            "Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)..."
        );

        let http_abbruch = relay.abbruch.clone();
        let mut http = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { http_abbruch.cancelled().await })
                .await
        });

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            }
            ergebnis = &mut http => {
                relay.herunterfahren();
                scheduler.abort();
                bereinigung.abort();
                ergebnis
                    .context("HTTP-Task abgebrochen")?
                    .context("HTTP-Server beendet")?;
                return Ok(());
            }
        }

        relay.herunterfahren();
        let budget = self.config.shutdown_budget();
        let abschluss = async {
            let _ = (&mut http).await;
            relay.sessions.wait().await;
            let _ = scheduler.await;
            let _ = bereinigung.await;
        };

        if tokio::time::timeout(budget, abschluss).await.is_err() {
            tracing::warn!(
                offene_sessions = relay.sessions.len(),
                budget_sek = budget.as_secs(),
                "Shutdown-Budget ueberschritten – verbleibende Verbindungen werden abgebrochen"
            );
            http.abort();
        }

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Entfernt periodisch abgelaufene Einmal-Codes bis `abbruch` ausgeloest wird
pub fn otp_aufraeumen_starten(
    otp: Arc<dyn OtpDienst>,
    intervall: Duration,
    abbruch: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut takt = tokio::time::interval_at(tokio::time::Instant::now() + intervall, intervall);
        takt.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = abbruch.cancelled() => break,
                _ = takt.tick() => {
                    otp.aufraeumen();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn abgelaufene_codes_werden_periodisch_entfernt() {
        let otp = Arc::new(SpeicherOtpDienst::neu(Duration::from_secs(600), 6));
        for i in 0..100u32 {
            otp.code_senden(&format!("+49151{i:08}")).await.unwrap();
        }

        let abbruch = CancellationToken::new();
        let handle = otp_aufraeumen_starten(otp.clone(), Duration::from_secs(60), abbruch.clone());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(otp.anzahl(), 100, "gueltige Codes bleiben erhalten");

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(otp.anzahl(), 0);

        abbruch.cancel();
        handle.await.unwrap();
    }
}
