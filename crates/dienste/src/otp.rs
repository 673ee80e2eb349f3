//! Einmal-Codes (OTP) zur Verifikation von Telefonnummern
//!
//! `SpeicherOtpDienst` erzeugt numerische Codes, haelt sie mit Ablaufzeit
//! im Speicher und protokolliert den Versand statt eine SMS zu senden.
//! Ein Code ist nach erfolgreicher Pruefung verbraucht.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{DienstError, DienstResult};

/// Fehlversuche bis ein Code verworfen wird
const MAX_FEHLVERSUCHE: u32 = 5;

#[async_trait]
pub trait OtpDienst: Send + Sync {
    /// Erzeugt einen Code fuer `telefon` und stellt ihn zu
    async fn code_senden(&self, telefon: &str) -> DienstResult<()>;

    /// Prueft einen vom Benutzer eingegebenen Code
    async fn code_pruefen(&self, telefon: &str, code: &str) -> DienstResult<bool>;

    /// Entfernt abgelaufene Codes, gibt die Anzahl entfernter zurueck
    fn aufraeumen(&self) -> usize;
}

#[derive(Debug, Clone)]
struct OtpEintrag {
    code: String,
    ablauf: Instant,
    fehlversuche: u32,
}

/// OTP-Dienst ohne SMS-Anbieter
#[derive(Debug)]
pub struct SpeicherOtpDienst {
    codes: DashMap<String, OtpEintrag>,
    gueltigkeit: Duration,
    code_laenge: usize,
}

impl SpeicherOtpDienst {
    pub fn neu(gueltigkeit: Duration, code_laenge: usize) -> Self {
        Self {
            codes: DashMap::new(),
            gueltigkeit,
            code_laenge: code_laenge.clamp(4, 10),
        }
    }

    /// Aktuell ausstehender Code einer Nummer (Entwicklungsbetrieb)
    pub fn ausstehender_code(&self, telefon: &str) -> Option<String> {
        self.codes.get(telefon).map(|e| e.code.clone())
    }

    /// Anzahl gespeicherter Codes (auch abgelaufener)
    pub fn anzahl(&self) -> usize {
        self.codes.len()
    }

    fn code_generieren(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.code_laenge)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

/// Telefonnummer im Format `+<Ziffern>` (E.164)
fn telefon_pruefen(telefon: &str) -> DienstResult<()> {
    let ziffern = telefon
        .strip_prefix('+')
        .ok_or_else(|| DienstError::ungueltig("Telefonnummer muss mit '+' beginnen"))?;
    if !(8..=15).contains(&ziffern.len()) || !ziffern.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DienstError::ungueltig(format!(
            "Ungueltige Telefonnummer: {telefon}"
        )));
    }
    Ok(())
}

#[async_trait]
impl OtpDienst for SpeicherOtpDienst {
    async fn code_senden(&self, telefon: &str) -> DienstResult<()> {
        telefon_pruefen(telefon)?;

        let code = self.code_generieren();
        tracing::info!(telefon = %telefon, "Verifikationscode versendet");
        tracing::debug!(telefon = %telefon, code = %code, "Verifikationscode (ohne SMS-Anbieter)");

        self.codes.insert(
            telefon.to_string(),
            OtpEintrag {
                code,
                ablauf: Instant::now() + self.gueltigkeit,
                fehlversuche: 0,
            },
        );
        Ok(())
    }

    async fn code_pruefen(&self, telefon: &str, code: &str) -> DienstResult<bool> {
        telefon_pruefen(telefon)?;

        let Some(mut eintrag) = self.codes.get_mut(telefon) else {
            return Ok(false);
        };

        if eintrag.ablauf <= Instant::now() {
            drop(eintrag);
            self.codes.remove(telefon);
            tracing::debug!(telefon = %telefon, "Verifikationscode abgelaufen");
            return Ok(false);
        }

        if eintrag.code == code.trim() {
            drop(eintrag);
            self.codes.remove(telefon);
            tracing::info!(telefon = %telefon, "Telefonnummer verifiziert");
            return Ok(true);
        }

        eintrag.fehlversuche += 1;
        if eintrag.fehlversuche >= MAX_FEHLVERSUCHE {
            drop(eintrag);
            self.codes.remove(telefon);
            tracing::warn!(telefon = %telefon, "Zu viele Fehlversuche – Code verworfen");
        }
        Ok(false)
    }

    fn aufraeumen(&self) -> usize {
        let jetzt = Instant::now();
        let vorher = self.codes.len();
        self.codes.retain(|_, e| e.ablauf > jetzt);
        let entfernt = vorher.saturating_sub(self.codes.len());
        if entfernt > 0 {
            tracing::debug!(entfernt, "Abgelaufene Verifikationscodes entfernt");
        }
        entfernt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TELEFON: &str = "+4915100000001";

    fn dienst() -> SpeicherOtpDienst {
        SpeicherOtpDienst::neu(Duration::from_secs(600), 6)
    }

    #[tokio::test]
    async fn code_ist_numerisch() {
        let dienst = dienst();
        dienst.code_senden(TELEFON).await.unwrap();
        let code = dienst.ausstehender_code(TELEFON).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| b.is_ascii_digit()));
    }

    #[tokio::test]
    async fn richtiger_code_wird_verbraucht() {
        let dienst = dienst();
        dienst.code_senden(TELEFON).await.unwrap();
        let code = dienst.ausstehender_code(TELEFON).unwrap();

        assert!(dienst.code_pruefen(TELEFON, &code).await.unwrap());
        assert!(!dienst.code_pruefen(TELEFON, &code).await.unwrap());
    }

    #[tokio::test]
    async fn falscher_code() {
        let dienst = dienst();
        dienst.code_senden(TELEFON).await.unwrap();
        let code = dienst.ausstehender_code(TELEFON).unwrap();
        let falsch = if code == "000000" { "111111" } else { "000000" };

        assert!(!dienst.code_pruefen(TELEFON, falsch).await.unwrap());
        assert!(dienst.code_pruefen(TELEFON, &code).await.unwrap());
    }

    #[tokio::test]
    async fn zu_viele_fehlversuche_verwerfen_code() {
        let dienst = dienst();
        dienst.code_senden(TELEFON).await.unwrap();
        let code = dienst.ausstehender_code(TELEFON).unwrap();
        let falsch = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..MAX_FEHLVERSUCHE {
            assert!(!dienst.code_pruefen(TELEFON, falsch).await.unwrap());
        }
        assert!(!dienst.code_pruefen(TELEFON, &code).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn abgelaufener_code() {
        let dienst = SpeicherOtpDienst::neu(Duration::from_secs(60), 6);
        dienst.code_senden(TELEFON).await.unwrap();
        let code = dienst.ausstehender_code(TELEFON).unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!dienst.code_pruefen(TELEFON, &code).await.unwrap());
        assert_eq!(dienst.ausstehender_code(TELEFON), None);
    }

    #[tokio::test(start_paused = true)]
    async fn aufraeumen_entfernt_abgelaufene() {
        let dienst = SpeicherOtpDienst::neu(Duration::from_secs(60), 6);
        dienst.code_senden(TELEFON).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        dienst.code_senden("+4915100000002").await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(dienst.aufraeumen(), 1);
        assert!(dienst.ausstehender_code("+4915100000002").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn nie_gepruefte_codes_werden_entfernt() {
        let dienst = SpeicherOtpDienst::neu(Duration::from_secs(600), 6);
        for i in 0..10_000u32 {
            dienst.code_senden(&format!("+49151{i:08}")).await.unwrap();
        }
        assert_eq!(dienst.anzahl(), 10_000);

        tokio::time::advance(Duration::from_secs(600 + 3600)).await;
        dienst.code_senden(TELEFON).await.unwrap();

        assert_eq!(dienst.aufraeumen(), 10_000);
        assert_eq!(dienst.anzahl(), 1);
    }

    #[tokio::test]
    async fn ungueltige_telefonnummer() {
        let dienst = dienst();
        for telefon in ["015100000001", "+49abc", "+123", ""] {
            assert!(matches!(
                dienst.code_senden(telefon).await,
                Err(DienstError::UngueltigeEingabe(_))
            ));
        }
    }

    #[tokio::test]
    async fn ohne_gesendeten_code() {
        let dienst = dienst();
        assert!(!dienst.code_pruefen(TELEFON, "123456").await.unwrap());
    }
}
