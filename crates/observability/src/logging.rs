//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `TAXIMAP_LOG_LEVEL`: Filter-Direktive (z.B. `debug` oder
//!   `taximap_relay=trace,info`), Standard: Wert aus der Konfiguration
//! - `TAXIMAP_LOG_FORMAT`: Format (text/json), Standard: Wert aus der Konfiguration

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const LOG_LEVEL_ENV: &str = "TAXIMAP_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const LOG_FORMAT_ENV: &str = "TAXIMAP_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor den uebergebenen Werten.
/// Faellt auf `info` zurueck wenn der Filter nicht parsebar ist.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format_aus_env(format).as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Gibt das Log-Format aus der Umgebung zurueck, sonst `standard`.
pub fn log_format_aus_env(standard: &str) -> String {
    std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| standard.to_string())
}

/// Prueft ob `level` als Filter-Direktive parsebar ist.
pub fn log_filter_gueltig(level: &str) -> bool {
    EnvFilter::try_new(level).is_ok()
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
