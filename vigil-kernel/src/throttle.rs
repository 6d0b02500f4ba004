/**
 * ALERT THROTTLE - Fenêtres anti-rafale des alertes, par identité
 *
 * RÔLE : Une même personne vue en continu ne doit pas marteler les abonnés.
 * Une alerte ne repart que si la personne a disparu assez longtemps (seen gap)
 * ET que la dernière alerte est assez vieille (alert gap).
 *
 * FONCTIONNEMENT : Horloge monotone fournie par l'appelant, comparaison
 * strictement supérieure aux deux fenêtres. La décision et les mises à jour
 * se font sous un seul verrou, donc deux caméras qui voient la même identité
 * au même moment ne produisent qu'une alerte.
 */

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Sighting {
    last_seen: Instant,
    last_alert: Option<Instant>,
}

pub struct AlertThrottle {
    seen_gap: Duration,
    alert_gap: Duration,
    // une entrée par identité du roster, pas d'éviction
    sightings: Mutex<HashMap<String, Sighting>>,
}

pub type SharedThrottle = Arc<AlertThrottle>;

impl AlertThrottle {
    pub fn new(seen_gap: Duration, alert_gap: Duration) -> Self {
        Self { seen_gap, alert_gap, sightings: Mutex::new(HashMap::new()) }
    }

    /// Décide si cette observation déclenche une alerte. `last_seen` avance à
    /// chaque observation, `last_alert` seulement quand ça déclenche.
    pub fn observe(&self, identity: &str, now: Instant) -> bool {
        let mut sightings = self.sightings.lock();
        let fire = match sightings.get(identity) {
            None => true,
            Some(s) => {
                now.duration_since(s.last_seen) > self.seen_gap
                    && s.last_alert.map_or(true, |a| now.duration_since(a) > self.alert_gap)
            }
        };
        let entry = sightings
            .entry(identity.to_string())
            .or_insert(Sighting { last_seen: now, last_alert: None });
        entry.last_seen = now;
        if fire {
            entry.last_alert = Some(now);
        }
        fire
    }
}
