//! taximap-relay – Echtzeit-Relay fuer Taxi-Positionen
//!
//! Taxis melden ihre Position ueber eine WebSocket-Verbindung, Clients
//! erhalten alle zwei Sekunden die aktuellen Positionen aller Taxis.
//! Admins beobachten denselben Verbindungspool.
//!
//! ## Architektur
//!
//! ```text
//! GET /subscribe (ws::subscribe)
//!     |  Query pruefen, Sub-Protokoll -> Rolle
//!     v
//! Session (pro Verbindung ein Task)
//!     |  State Machine: Verhandlung -> Registriert -> Entleeren -> Geschlossen
//!     |  TokenBucket pro Verbindung (Burst 10, 100 ms)
//!     v
//! SubscriberRegistry (eine Sperre ueber alle Abbildungen)
//!     ^
//!     |  alle 2 s, Publish-Limiter (Burst 8, 100 ms)
//! BroadcastScheduler -> "taxis-..." an alle Clients
//! ```

pub mod broadcast;
pub mod error;
pub mod rate_limit;
pub mod registry;
pub mod session;
pub mod state;
pub mod subscriber;
pub mod wire;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::BroadcastScheduler;
pub use error::{RelayError, RelayResult};
pub use rate_limit::TokenBucket;
pub use registry::{
    RegistryEreignis, RegistryOptionen, RegistryUebersicht, SubscriberRegistry, Zustellung,
};
pub use session::{Leser, Schreiber, Session, SessionZustand};
pub use state::{RelayKonfig, RelayState};
pub use subscriber::{Ausgang, SchliessCode, Subscriber, VerbindungsId};
pub use ws::relay_router;
