/**
 * SUBSCRIBER HUB - Registre des abonnés connectés en WebSocket
 *
 * RÔLE : Tenir la partition dashboards / mobiles, diffuser les alertes aux
 * dashboards et fournir les positions mobiles au routage géographique.
 *
 * FONCTIONNEMENT : Un seul verrou sur la table des abonnés. La diffusion
 * prend un instantané sous verrou puis envoie hors verrou, et purge les
 * connexions mortes rencontrées en route. Un mobile inscrit sans coordonnées
 * exploitables reste inscrit mais n'apparaît jamais dans les positions.
 *
 * UTILITÉ : Point unique de vérité sur qui est connecté et où.
 */

use crate::models::GeoPoint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Dashboard,
    Mobile,
}

struct Subscriber {
    role: Role,
    location: Option<GeoPoint>,
    outbox: UnboundedSender<String>,
}

pub struct SubscriberHub {
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
}

pub type SharedHub = Arc<SubscriberHub>;

impl SubscriberHub {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(HashMap::new()) }
    }

    pub fn register(
        &self,
        id: Uuid,
        role: Role,
        location: Option<GeoPoint>,
        outbox: UnboundedSender<String>,
    ) {
        let mut subscribers = self.subscribers.lock();
        subscribers.insert(id, Subscriber { role, location, outbox });
        let (web, apk) = count(&subscribers);
        println!("[hub] registered {role:?} subscriber {id} (web: {web}, apk: {apk})");
    }

    /// Retire un abonné. Sans effet s'il est déjà parti.
    pub fn unregister(&self, id: Uuid) -> bool {
        let mut subscribers = self.subscribers.lock();
        let removed = subscribers.remove(&id).is_some();
        if removed {
            let (web, apk) = count(&subscribers);
            println!("[hub] unregistered subscriber {id} (web: {web}, apk: {apk})");
        }
        removed
    }

    /// Diffuse un message à tous les dashboards inscrits à cet instant.
    /// Retourne le nombre de livraisons effectives.
    pub fn broadcast(&self, text: &str) -> usize {
        let targets: Vec<(Uuid, UnboundedSender<String>)> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .filter(|(_, s)| s.role == Role::Dashboard)
                .map(|(id, s)| (*id, s.outbox.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, outbox) in targets {
            if outbox.send(text.to_string()).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }
        for id in dead {
            eprintln!("[hub] dropping dead subscriber {id}");
            self.unregister(id);
        }
        delivered
    }

    /// Envoi ciblé vers un abonné, au mieux.
    pub fn send_to(&self, id: Uuid, text: &str) -> bool {
        let outbox = self.subscribers.lock().get(&id).map(|s| s.outbox.clone());
        match outbox {
            Some(tx) => tx.send(text.to_string()).is_ok(),
            None => false,
        }
    }

    /// Positions des mobiles inscrits avec des coordonnées exploitables.
    pub fn mobile_locations(&self) -> Vec<(Uuid, GeoPoint)> {
        self.subscribers
            .lock()
            .iter()
            .filter(|(_, s)| s.role == Role::Mobile)
            .filter_map(|(id, s)| s.location.map(|location| (*id, location)))
            .collect()
    }

    pub fn counts(&self) -> (usize, usize) {
        count(&self.subscribers.lock())
    }
}

fn count(subscribers: &HashMap<Uuid, Subscriber>) -> (usize, usize) {
    let web = subscribers.values().filter(|s| s.role == Role::Dashboard).count();
    (web, subscribers.len() - web)
}
