//! Subscriber-Registry – Der geteilte Zustand des Relays
//!
//! Vier gemeinsam veraenderte Abbildungen unter genau einer Sperre:
//!
//! ```text
//! verbindungen: VerbindungsId -> Identitaet      (Rueckwaerts-Index fuer den Abbau)
//! admins / clients / taxis: Identitaet -> Subscriber
//! positionen:   Identitaet -> Position           (nur Taxis)
//! ```
//!
//! Invarianten:
//! - eine Identitaet steht in hoechstens einer Rollen-Abbildung
//! - eine Identitaet steht genau dann in `positionen`, wenn sie in `taxis` steht
//!
//! Aufrufer sehen die Abbildungen nie direkt; jede Operation nimmt die
//! Sperre fuer ihre gesamte Dauer und blockiert dabei nie auf I/O.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use taximap_core::{Identitaet, Position, Rolle};
use taximap_observability::RelayMetriken;
use tokio::sync::{broadcast, mpsc};

use crate::subscriber::{Ausgang, Subscriber, VerbindungsId};

/// Groesse des Broadcast-Kanals fuer Registry-Ereignisse
const EREIGNIS_KANAL_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// Ereignisse & Ergebnisse
// ---------------------------------------------------------------------------

/// Ereignisse die die Registry versendet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEreignis {
    /// Teilnehmer registriert
    Angemeldet {
        identitaet: Identitaet,
        rolle: Rolle,
        verbindung: VerbindungsId,
    },
    /// Bestehender Eintrag derselben Identitaet wurde ueberschrieben
    Ersetzt {
        identitaet: Identitaet,
        rolle: Rolle,
        alte_verbindung: VerbindungsId,
        neue_verbindung: VerbindungsId,
    },
    /// Teilnehmer entfernt
    Abgemeldet {
        identitaet: Identitaet,
        rolle: Rolle,
    },
    /// Client nach Sendefehler aus dem Broadcast entfernt
    Verdraengt {
        identitaet: Identitaet,
        verbindung: VerbindungsId,
    },
}

/// Verhalten der Registry bei doppelter Registrierung
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryOptionen {
    /// Ersetzten Teilnehmer per Close-Slow-Callback schliessen
    pub ersetzte_schliessen: bool,
}

/// Momentaufnahme der Registry-Groesse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryUebersicht {
    pub admins: usize,
    pub clients: usize,
    pub taxis: usize,
    pub positionen: usize,
    pub verbindungen: usize,
}

/// Ergebnis einer Broadcast-Runde
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zustellung {
    /// Anzahl der verteilten Taxi-Positionen
    pub taxis: usize,
    /// Clients, bei denen die Nachricht eingereiht wurde
    pub zugestellt: usize,
    /// Clients, die wegen Sendefehler entfernt wurden
    pub verdraengt: Vec<Identitaet>,
}

// ---------------------------------------------------------------------------
// SubscriberRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Abbildungen {
    verbindungen: HashMap<VerbindungsId, Identitaet>,
    admins: HashMap<Identitaet, Subscriber>,
    clients: HashMap<Identitaet, Subscriber>,
    taxis: HashMap<Identitaet, Subscriber>,
    positionen: BTreeMap<Identitaet, Position>,
}

impl Abbildungen {
    fn rolle(&mut self, rolle: Rolle) -> &mut HashMap<Identitaet, Subscriber> {
        match rolle {
            Rolle::Admin => &mut self.admins,
            Rolle::Client => &mut self.clients,
            Rolle::Taxi => &mut self.taxis,
        }
    }

    /// Entfernt die Identitaet aus einer Rollen-Abbildung (samt Position bei Taxis)
    fn entfernen(&mut self, rolle: Rolle, identitaet: &Identitaet) -> Option<Subscriber> {
        let entfernt = self.rolle(rolle).remove(identitaet);
        if entfernt.is_some() && rolle == Rolle::Taxi {
            self.positionen.remove(identitaet);
        }
        entfernt
    }
}

/// Zentrale Registry aller verbundenen Teilnehmer
///
/// Thread-safe via Arc + Mutex. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    abbildungen: Mutex<Abbildungen>,
    optionen: RegistryOptionen,
    metriken: RelayMetriken,
    event_tx: broadcast::Sender<RegistryEreignis>,
}

impl SubscriberRegistry {
    /// Erstellt eine leere Registry
    pub fn neu(optionen: RegistryOptionen, metriken: RelayMetriken) -> Self {
        let (event_tx, _) = broadcast::channel(EREIGNIS_KANAL_GROESSE);
        Self {
            inner: Arc::new(RegistryInner {
                abbildungen: Mutex::new(Abbildungen::default()),
                optionen,
                metriken,
                event_tx,
            }),
        }
    }

    /// Registriert einen Teilnehmer und gibt seinen Subscriber zurueck.
    ///
    /// Ist die Identitaet bereits registriert, wird der alte Eintrag
    /// ueberschrieben. Die alte Verbindung bleibt offen, ausser
    /// `ersetzte_schliessen` ist gesetzt.
    pub fn anmelden(
        &self,
        verbindung: VerbindungsId,
        identitaet: Identitaet,
        rolle: Rolle,
        position: Position,
        tx: mpsc::Sender<Ausgang>,
    ) -> Subscriber {
        let subscriber = Subscriber::neu(identitaet, rolle, verbindung, position, tx);

        let ersetzt: Vec<Subscriber> = {
            let mut abb = self.inner.abbildungen.lock();
            abb.verbindungen.insert(verbindung, identitaet);

            let ersetzt: Vec<Subscriber> = Rolle::ALLE
                .iter()
                .filter_map(|r| abb.entfernen(*r, &identitaet))
                .collect();

            abb.rolle(rolle).insert(identitaet, subscriber.clone());
            if rolle == Rolle::Taxi {
                abb.positionen.insert(identitaet, position);
            }
            ersetzt
        };

        for alt in &ersetzt {
            self.inner
                .metriken
                .subscribers
                .with_label_values(&[alt.rolle.name()])
                .dec();
            self.inner.metriken.registrierungen_ersetzt.inc();
            tracing::warn!(
                identitaet = %identitaet,
                rolle = %alt.rolle,
                alte_verbindung = %alt.verbindung,
                neue_verbindung = %verbindung,
                "Identitaet ist bereits registriert – Eintrag wird ueberschrieben"
            );
            let _ = self.inner.event_tx.send(RegistryEreignis::Ersetzt {
                identitaet,
                rolle: alt.rolle,
                alte_verbindung: alt.verbindung,
                neue_verbindung: verbindung,
            });
            if self.inner.optionen.ersetzte_schliessen {
                alt.langsam_schliessen();
            }
        }

        self.inner
            .metriken
            .subscribers
            .with_label_values(&[rolle.name()])
            .inc();
        tracing::info!(
            identitaet = %identitaet,
            rolle = %rolle,
            verbindung = %verbindung,
            "Teilnehmer registriert"
        );
        let _ = self.inner.event_tx.send(RegistryEreignis::Angemeldet {
            identitaet,
            rolle,
            verbindung,
        });

        subscriber
    }

    /// Entfernt eine Identitaet vollstaendig. Idempotent.
    ///
    /// Gibt `true` zurueck wenn ein Rollen-Eintrag entfernt wurde.
    pub fn abmelden(&self, identitaet: &Identitaet) -> bool {
        let entfernt = {
            let mut abb = self.inner.abbildungen.lock();
            abb.verbindungen.retain(|_, id| id != identitaet);
            Rolle::ALLE
                .iter()
                .find_map(|r| abb.entfernen(*r, identitaet))
        };

        match entfernt {
            Some(sub) => {
                self.abgemeldet_melden(&sub);
                true
            }
            None => false,
        }
    }

    /// Baut die Eintraege einer Verbindung ab.
    ///
    /// Rollen- und Positions-Eintraege werden nur entfernt, solange sie noch
    /// zu dieser Verbindung gehoeren; eine ersetzte Verbindung raeumt so nie
    /// den Eintrag ihrer Nachfolgerin ab.
    pub fn verbindung_abmelden(&self, verbindung: VerbindungsId) -> bool {
        let entfernt = {
            let mut abb = self.inner.abbildungen.lock();
            let Some(identitaet) = abb.verbindungen.remove(&verbindung) else {
                return false;
            };
            let rolle = Rolle::ALLE.iter().copied().find(|r| {
                abb.rolle(*r)
                    .get(&identitaet)
                    .is_some_and(|sub| sub.verbindung == verbindung)
            });
            rolle.and_then(|r| abb.entfernen(r, &identitaet))
        };

        match entfernt {
            Some(sub) => {
                self.abgemeldet_melden(&sub);
                true
            }
            None => {
                tracing::debug!(
                    verbindung = %verbindung,
                    "Verbindung ohne eigenen Rollen-Eintrag abgebaut"
                );
                false
            }
        }
    }

    /// Uebernimmt eine Positionsmeldung. No-op wenn die Identitaet kein Taxi ist.
    pub fn position_aktualisieren(&self, identitaet: &Identitaet, position: Position) -> bool {
        let mut abb = self.inner.abbildungen.lock();
        if !abb.taxis.contains_key(identitaet) {
            return false;
        }
        abb.positionen.insert(*identitaet, position);
        drop(abb);

        self.inner.metriken.positionen.inc();
        true
    }

    /// Alle bekannten Taxi-Positionen, aufsteigend nach Identitaet
    pub fn taxi_positionen(&self) -> Vec<(Identitaet, Position)> {
        self.inner
            .abbildungen
            .lock()
            .positionen
            .iter()
            .map(|(id, pos)| (*id, *pos))
            .collect()
    }

    /// Ruft `f` fuer jeden registrierten Client auf (unter der Sperre)
    pub fn fuer_jeden_client(&self, mut f: impl FnMut(&Subscriber)) {
        let abb = self.inner.abbildungen.lock();
        abb.clients.values().for_each(|sub| f(sub));
    }

    /// Verteilt die aktuellen Taxi-Positionen an alle Clients.
    ///
    /// Momentaufnahme, Kodierung und alle Sendeversuche laufen unter einer
    /// Sperre. Clients, deren Queue voll oder geschlossen ist, werden sofort
    /// aus der Client-Abbildung entfernt; ihre Verbindung bleibt offen.
    /// Ohne bekannte Positionen wird nichts gesendet (`None`).
    pub fn clients_beliefern(
        &self,
        kodieren: impl FnOnce(&[(Identitaet, Position)]) -> String,
    ) -> Option<Zustellung> {
        let mut verdraengte = Vec::new();
        let zustellung = {
            let mut abb = self.inner.abbildungen.lock();
            if abb.positionen.is_empty() {
                return None;
            }

            let momentaufnahme: Vec<(Identitaet, Position)> =
                abb.positionen.iter().map(|(id, pos)| (*id, *pos)).collect();
            let text: Arc<str> = kodieren(&momentaufnahme).into();

            let mut zugestellt = 0;
            for sub in abb.clients.values() {
                if sub.senden(Arc::clone(&text)) {
                    zugestellt += 1;
                } else {
                    verdraengte.push((sub.identitaet, sub.verbindung));
                }
            }
            for (identitaet, _) in &verdraengte {
                abb.clients.remove(identitaet);
            }

            Zustellung {
                taxis: momentaufnahme.len(),
                zugestellt,
                verdraengt: verdraengte.iter().map(|(id, _)| *id).collect(),
            }
        };

        for (identitaet, verbindung) in verdraengte {
            self.inner
                .metriken
                .subscribers
                .with_label_values(&[Rolle::Client.name()])
                .dec();
            self.inner.metriken.clients_verdraengt.inc();
            tracing::warn!(
                identitaet = %identitaet,
                verbindung = %verbindung,
                "Taxi-Positionen nicht zustellbar – Client aus Broadcast entfernt"
            );
            let _ = self.inner.event_tx.send(RegistryEreignis::Verdraengt {
                identitaet,
                verbindung,
            });
        }

        Some(zustellung)
    }

    /// Rolle unter der eine Identitaet aktuell registriert ist
    pub fn rolle_von(&self, identitaet: &Identitaet) -> Option<Rolle> {
        let mut abb = self.inner.abbildungen.lock();
        Rolle::ALLE
            .iter()
            .copied()
            .find(|r| abb.rolle(*r).contains_key(identitaet))
    }

    /// Registrierter Subscriber einer Identitaet
    pub fn subscriber(&self, identitaet: &Identitaet) -> Option<Subscriber> {
        let mut abb = self.inner.abbildungen.lock();
        Rolle::ALLE
            .iter()
            .find_map(|r| abb.rolle(*r).get(identitaet).cloned())
    }

    /// Zuletzt bekannte Position eines Taxis
    pub fn position_von(&self, identitaet: &Identitaet) -> Option<Position> {
        self.inner.abbildungen.lock().positionen.get(identitaet).copied()
    }

    /// Groesse aller Abbildungen
    pub fn uebersicht(&self) -> RegistryUebersicht {
        let abb = self.inner.abbildungen.lock();
        RegistryUebersicht {
            admins: abb.admins.len(),
            clients: abb.clients.len(),
            taxis: abb.taxis.len(),
            positionen: abb.positionen.len(),
            verbindungen: abb.verbindungen.len(),
        }
    }

    /// Abonniert Registry-Ereignisse
    pub fn events_abonnieren(&self) -> broadcast::Receiver<RegistryEreignis> {
        self.inner.event_tx.subscribe()
    }

    /// Metriken dieser Registry
    pub fn metriken(&self) -> &RelayMetriken {
        &self.inner.metriken
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn abgemeldet_melden(&self, sub: &Subscriber) {
        self.inner
            .metriken
            .subscribers
            .with_label_values(&[sub.rolle.name()])
            .dec();
        tracing::info!(
            identitaet = %sub.identitaet,
            rolle = %sub.rolle,
            verbindung = %sub.verbindung,
            "Teilnehmer abgemeldet"
        );
        let _ = self.inner.event_tx.send(RegistryEreignis::Abgemeldet {
            identitaet: sub.identitaet,
            rolle: sub.rolle,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
