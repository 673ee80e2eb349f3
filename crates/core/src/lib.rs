//! taximap-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Wertetypen bereit, die Relay, Dienste und Server
//! gemeinsam nutzen: die Identitaet eines Teilnehmers, seine Rolle und die
//! zuletzt gemeldete Position eines Taxis.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{FormatFehler, FormatResult};
pub use types::{Identitaet, Position, Rolle, PROTOKOLLE};
