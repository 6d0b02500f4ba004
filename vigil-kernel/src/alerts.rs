/**
 * ALERT DISPATCH - Chaîne de traitement d'une identité reconnue
 *
 * RÔLE : Transformer un match du moteur de reconnaissance en alerte complète :
 * gate anti-rafale, capture labellisée sur disque, ligne de journal, diffusion
 * aux dashboards et envoi ciblé au mobile le plus proche de la caméra.
 *
 * FONCTIONNEMENT : Chaque étape est tolérante. Une capture qui échoue laisse
 * un chemin vide, une identité hors roster est journalisée puis abandonnée,
 * un abonné injoignable n'empêche pas les autres d'être servis.
 *
 * UTILITÉ : Seul point du noyau qui décide qu'une alerte part sur le fil.
 */

use crate::captures::CaptureStore;
use crate::geo;
use crate::hub::SharedHub;
use crate::matcher::IdentityMatch;
use crate::models::{AlertContext, GeoPoint};
use crate::store::{CameraRecord, SharedStore, SightingRow};
use crate::throttle::SharedThrottle;
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub struct AlertDispatcher {
    hub: SharedHub,
    store: SharedStore,
    captures: Arc<CaptureStore>,
    throttle: SharedThrottle,
}

pub type SharedDispatcher = Arc<AlertDispatcher>;

impl AlertDispatcher {
    pub fn new(
        hub: SharedHub,
        store: SharedStore,
        captures: Arc<CaptureStore>,
        throttle: SharedThrottle,
    ) -> Self {
        Self { hub, store, captures, throttle }
    }

    /// Déroule la chaîne complète pour une identité vue par une caméra.
    /// `now` vient de l'horloge monotone de l'appelant, ce qui rend le
    /// gate anti-rafale testable sans attente réelle.
    pub fn handle_sighting(
        &self,
        matched: &IdentityMatch,
        camera: &CameraRecord,
        image: &[u8],
        now: Instant,
    ) {
        if !self.throttle.observe(&matched.identity, now) {
            return;
        }

        let image_public = match self.captures.save_identity(image, &matched.identity, &camera.url)
        {
            Ok(path) => self.captures.public_path(&path),
            Err(e) => {
                eprintln!("[alerts] failed to save capture for {}: {e}", matched.identity);
                String::new()
            }
        };

        match matched.identity.trim().parse::<i64>() {
            Ok(person_id) => {
                let row = SightingRow {
                    person_id,
                    image: image_public,
                    date_recorded: OffsetDateTime::now_utc()
                        .format(&Rfc3339)
                        .unwrap_or_default(),
                    camera_id: Some(camera.id),
                };
                self.store.insert_sighting(&row);
            }
            Err(_) => eprintln!(
                "[alerts] identity {} is not a roster id, sighting not recorded",
                matched.identity
            ),
        }

        let Some(person) = self.store.person(&matched.identity) else {
            eprintln!("[alerts] unknown identity {}, alert dropped", matched.identity);
            return;
        };

        let payload = AlertContext {
            id: person.id,
            first_name: person.first_name,
            last_name: person.last_name,
            middle_name: person.middle_name,
            age: person.age,
            description: person.description,
            date_joined: person.date_joined,
            url: camera.url.clone(),
            camera: Some(camera.to_context(self.captures.base())),
        };
        let text = match serde_json::to_string(&payload) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("[alerts] failed to encode alert: {e}");
                return;
            }
        };

        let delivered = self.hub.broadcast(&text);
        println!(
            "[alerts] identity {} seen by {} (distance {:.1}), broadcast to {delivered} dashboards",
            matched.identity, camera.name, matched.distance
        );

        let origin = GeoPoint { latitude: camera.latitude, longitude: camera.longitude };
        if let Some(target) = geo::nearest(origin, &self.hub.mobile_locations()) {
            if self.hub.send_to(target, &text) {
                println!("[alerts] notified nearest mobile {target}");
            }
        }
    }
}
