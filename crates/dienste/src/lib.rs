//! taximap-dienste – Schnittstellen zu externen Diensten
//!
//! Profile, Routenberechnung und Einmal-Codes (OTP) liegen ausserhalb des
//! Relays. Dieser Crate definiert die Traits, ueber die der Server sie
//! anspricht, und In-Process-Implementierungen fuer Betrieb ohne externe
//! Anbieter sowie fuer Tests.

pub mod error;
pub mod otp;
pub mod profil;
pub mod route;

pub use error::{DienstError, DienstResult};
pub use otp::{OtpDienst, SpeicherOtpDienst};
pub use profil::{Profil, ProfilQuelle, SpeicherProfilQuelle};
pub use route::{KeinRoutenDienst, RoutenAbschnitt, RoutenDienst};
