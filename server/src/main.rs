//! Taximap Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.
//! Ein optionales erstes Argument ersetzt die Bind-Adresse (`host:port`).

use anyhow::Result;
use taximap_observability::{log_filter_gueltig, log_format_gueltig, logging_initialisieren};
use taximap_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("TAXIMAP_CONFIG").unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&config_pfad)?;

    // Logging initialisieren
    logging_initialisieren(&config.logging.level, &config.logging.format);
    if !log_filter_gueltig(&config.logging.level) {
        tracing::warn!(level = %config.logging.level, "Ungueltiger Log-Filter, verwende info");
    }
    if !log_format_gueltig(&config.logging.format) {
        tracing::warn!(format = %config.logging.format, "Unbekanntes Log-Format, verwende text");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Taximap Server wird initialisiert"
    );

    let mut server = Server::neu(config);
    if let Some(adresse) = std::env::args().nth(1) {
        server = server.mit_adresse(adresse);
    }
    server.starten().await?;

    Ok(())
}
