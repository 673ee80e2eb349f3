//! Fehlertypen der externen Dienste

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DienstError {
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Dienst ist in dieser Installation nicht eingerichtet
    #[error("Dienst nicht konfiguriert: {0}")]
    NichtKonfiguriert(&'static str),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

impl DienstError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub fn ungueltig(msg: impl Into<String>) -> Self {
        Self::UngueltigeEingabe(msg.into())
    }

    /// HTTP-Statuscode fuer REST-Antworten
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NichtGefunden(_) => 404,
            Self::UngueltigeEingabe(_) => 400,
            Self::NichtKonfiguriert(_) => 503,
            Self::Io(_) | Self::Json(_) => 500,
        }
    }
}

pub type DienstResult<T> = Result<T, DienstError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(DienstError::nicht_gefunden("x").http_status(), 404);
        assert_eq!(DienstError::ungueltig("x").http_status(), 400);
        assert_eq!(DienstError::NichtKonfiguriert("Route").http_status(), 503);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "x");
        assert_eq!(DienstError::from(io).http_status(), 500);
    }
}
