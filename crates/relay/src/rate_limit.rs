//! Rate Limiter fuer eingehende Nachrichten und ausgehende Broadcasts
//!
//! Implementiert den Token-Bucket-Algorithmus: ein Token wird pro
//! `intervall` nachgefuellt, hoechstens `burst` Token liegen bereit.
//! Jede Verbindung besitzt einen eigenen Bucket (Burst 10, 100 ms),
//! der Broadcaster teilt sich einen serverweiten (Burst 8, 100 ms).

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};

#[derive(Debug)]
struct BucketZustand {
    /// Aktuelle Token-Anzahl (als f64 fuer Bruchteil-Auffuellung)
    token: f64,
    /// Letzter Zeitpunkt der Auffuellung
    letzte_auffuellung: Instant,
}

/// Token-Bucket mit blockierendem, abbrechbarem `erwerben`
#[derive(Debug)]
pub struct TokenBucket {
    zustand: Mutex<BucketZustand>,
    /// Maximale Token-Anzahl (= Burst-Limit)
    max_token: f64,
    /// Auffuellrate in Token pro Sekunde
    fuellrate: f64,
}

impl TokenBucket {
    /// Erstellt einen vollen Bucket
    pub fn neu(intervall: Duration, burst: u32) -> Self {
        let max_token = burst.max(1) as f64;
        let intervall = intervall.max(Duration::from_micros(1));
        Self {
            zustand: Mutex::new(BucketZustand {
                token: max_token,
                letzte_auffuellung: Instant::now(),
            }),
            max_token,
            fuellrate: 1.0 / intervall.as_secs_f64(),
        }
    }

    /// Verbraucht ein Token ohne zu warten. Gibt `true` zurueck wenn erlaubt.
    pub fn versuchen(&self) -> bool {
        self.verbrauchen().is_ok()
    }

    /// Wartet bis ein Token verfuegbar ist oder `abbruch` ausgeloest wird.
    ///
    /// Ein bereits abgebrochener Kontext schlaegt sofort fehl, auch wenn
    /// noch Token vorhanden sind.
    pub async fn erwerben(&self, abbruch: &CancellationToken) -> RelayResult<()> {
        if abbruch.is_cancelled() {
            return Err(RelayError::Abgebrochen);
        }

        loop {
            let warten = match self.verbrauchen() {
                Ok(()) => return Ok(()),
                Err(warten) => warten,
            };

            tokio::select! {
                biased;
                _ = abbruch.cancelled() => return Err(RelayError::Abgebrochen),
                _ = tokio::time::sleep(warten) => {}
            }
        }
    }

    /// Aktuell verfuegbare (ganze) Token
    pub fn verfuegbar(&self) -> u32 {
        let mut zustand = self.zustand.lock();
        self.auffuellen(&mut zustand);
        zustand.token.floor() as u32
    }

    /// Verbraucht ein Token oder liefert die Wartezeit bis zum naechsten.
    fn verbrauchen(&self) -> Result<(), Duration> {
        let mut zustand = self.zustand.lock();
        self.auffuellen(&mut zustand);
        if zustand.token >= 1.0 {
            zustand.token -= 1.0;
            Ok(())
        } else {
            let fehlend = 1.0 - zustand.token;
            Err(Duration::from_secs_f64(fehlend / self.fuellrate))
        }
    }

    fn auffuellen(&self, zustand: &mut BucketZustand) {
        let jetzt = Instant::now();
        let vergangen = jetzt
            .duration_since(zustand.letzte_auffuellung)
            .as_secs_f64();
        zustand.token = (zustand.token + vergangen * self.fuellrate).min(self.max_token);
        zustand.letzte_auffuellung = jetzt;
    }
}
