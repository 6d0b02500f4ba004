/**
 * CAMERA STREAMS - Une boucle de traitement par caméra du roster
 *
 * RÔLE : Consommer les frames produites par les feeds, faire tourner le
 * moteur d'identification sur chaque visage et pousser les identités
 * reconnues vers la chaîne d'alerte. Entretient aussi les captures de
 * veille à intervalle régulier.
 *
 * FONCTIONNEMENT : Une tâche tokio par caméra, arrêtable par un canal
 * watch partagé. La fermeture du feed termine la boucle de sa caméra sans
 * toucher aux autres. Les visages d'une même frame sont identifiés en
 * parallèle puis dédupliqués avant dispatch.
 */

use crate::alerts::SharedDispatcher;
use crate::captures::CaptureStore;
use crate::feed;
use crate::matcher::{IdentityMatch, IdentityMatcher};
use crate::models::Frame;
use crate::store::CameraRecord;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct StreamDeps {
    pub matcher: Arc<IdentityMatcher>,
    pub dispatcher: SharedDispatcher,
    pub captures: Arc<CaptureStore>,
    pub snapshot_interval: Duration,
    pub frame_buffer: usize,
}

/// Lance une boucle par caméra et rend les handles pour le join à l'arrêt.
pub fn spawn_camera_tasks(
    cameras: Vec<CameraRecord>,
    deps: Arc<StreamDeps>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    cameras
        .into_iter()
        .map(|camera| {
            let deps = deps.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { run_camera(camera, deps, shutdown).await })
        })
        .collect()
}

async fn run_camera(
    camera: CameraRecord,
    deps: Arc<StreamDeps>,
    mut shutdown: watch::Receiver<bool>,
) {
    println!("[stream] watching {} ({})", camera.name, camera.url);
    let mut frames = feed::spawn_feed(&camera.url, deps.frame_buffer);
    let mut last_snapshot: Option<Instant> = None;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    println!("[stream] stopping {}", camera.name);
                    return;
                }
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    println!("[stream] feed for {} closed", camera.name);
                    return;
                };
                if last_snapshot.map_or(true, |at| at.elapsed() >= deps.snapshot_interval) {
                    last_snapshot = Some(Instant::now());
                    if let Err(e) = deps.captures.save_unmatched(&frame.image, &camera.url) {
                        eprintln!("[stream] failed to save snapshot for {}: {e}", camera.name);
                    }
                }
                process_frame(&camera, &frame, &deps).await;
            }
        }
    }
}

/// Identifie tous les visages d'une frame puis dispatche chaque identité
/// une seule fois, même vue plusieurs fois dans la même frame.
async fn process_frame(camera: &CameraRecord, frame: &Frame, deps: &StreamDeps) {
    if frame.faces.is_empty() {
        return;
    }

    let lookups = frame.faces.iter().map(|face| deps.matcher.identify(face));
    let mut unique: BTreeMap<String, IdentityMatch> = BTreeMap::new();
    for matched in join_all(lookups).await.into_iter().flatten() {
        unique.entry(matched.identity.clone()).or_insert(matched);
    }

    let now = Instant::now();
    for matched in unique.values() {
        deps.dispatcher.handle_sighting(matched, camera, &frame.image, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertDispatcher;
    use crate::hub::{Role, SharedHub, SubscriberHub};
    use crate::store::{PersonRecord, SharedStore, SightingRow, Store};
    use crate::throttle::AlertThrottle;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use uuid::Uuid;

    struct OnePersonStore {
        camera: CameraRecord,
    }

    impl Store for OnePersonStore {
        fn person(&self, identity: &str) -> Option<PersonRecord> {
            (identity == "7").then(|| PersonRecord {
                id: 7,
                first_name: "Anvar".into(),
                last_name: "Karimov".into(),
                middle_name: "B.".into(),
                age: 34,
                description: "wanted".into(),
                date_joined: "2023-05-14".into(),
            })
        }

        fn camera_by_url(&self, url: &str) -> Option<CameraRecord> {
            (self.camera.url == url).then(|| self.camera.clone())
        }

        fn camera_by_fragment(&self, _fragment: &str) -> Option<CameraRecord> {
            None
        }

        fn camera_urls(&self) -> Vec<String> {
            vec![self.camera.url.clone()]
        }

        fn encodings(&self) -> Vec<(String, Vec<f32>)> {
            vec![("7".into(), vec![0.0, 0.0, 0.0])]
        }

        fn insert_sighting(&self, _row: &SightingRow) {}
    }

    fn camera_with_url(url: &str) -> CameraRecord {
        CameraRecord {
            id: 1,
            name: "Gate A".into(),
            url: url.into(),
            longitude: 69.2401,
            latitude: 41.2995,
            image: String::new(),
        }
    }

    fn rig(dir: &std::path::Path, camera: &CameraRecord) -> (Arc<StreamDeps>, SharedHub) {
        let hub: SharedHub = Arc::new(SubscriberHub::new());
        let store: SharedStore = Arc::new(OnePersonStore { camera: camera.clone() });
        let captures =
            Arc::new(CaptureStore::new(dir.to_str().unwrap(), "http://127.0.0.1:8000"));
        let throttle =
            Arc::new(AlertThrottle::new(Duration::from_secs(5), Duration::from_secs(3)));
        let matcher = Arc::new(IdentityMatcher::from_encodings(store.encodings(), 500.0));
        let dispatcher =
            Arc::new(AlertDispatcher::new(hub.clone(), store, captures.clone(), throttle));
        let deps = Arc::new(StreamDeps {
            matcher,
            dispatcher,
            captures,
            snapshot_interval: Duration::from_secs(5),
            frame_buffer: 4,
        });
        (deps, hub)
    }

    #[tokio::test]
    async fn repeated_identity_in_one_frame_alerts_once() {
        let dir = tempfile::tempdir().unwrap();
        let camera = camera_with_url("rtsp://gate-a.local/stream");
        let (deps, hub) = rig(dir.path(), &camera);
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(Uuid::new_v4(), Role::Dashboard, None, tx);

        let frame = Frame {
            image: b"jpeg".to_vec(),
            faces: vec![vec![0.0, 0.0, 0.0], vec![0.1, 0.0, 0.0]],
        };
        process_frame(&camera, &frame, &deps).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_faces_alert_nobody() {
        let dir = tempfile::tempdir().unwrap();
        let camera = camera_with_url("rtsp://gate-a.local/stream");
        let (deps, hub) = rig(dir.path(), &camera);
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(Uuid::new_v4(), Role::Dashboard, None, tx);

        let frame = Frame { image: b"jpeg".to_vec(), faces: vec![vec![100.0, 0.0, 0.0]] };
        process_frame(&camera, &frame, &deps).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn camera_task_runs_feed_to_alert_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("gate-a.jsonl");
        std::fs::write(&script, "{\"after_ms\":0,\"faces\":[[0.0,0.0,0.0]]}\n").unwrap();
        let camera = camera_with_url(&format!("file:{}", script.display()));
        let (deps, hub) = rig(dir.path(), &camera);
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(Uuid::new_v4(), Role::Dashboard, None, tx);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = spawn_camera_tasks(vec![camera], deps.clone(), shutdown_rx);
        for handle in handles {
            timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        }

        let text = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(deps.captures.unmatched_paths().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_camera_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow.jsonl");
        std::fs::write(&script, "{\"after_ms\":60000,\"faces\":[]}\n").unwrap();
        let camera = camera_with_url(&format!("file:{}", script.display()));
        let (deps, _hub) = rig(dir.path(), &camera);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = spawn_camera_tasks(vec![camera], deps, shutdown_rx);
        shutdown_tx.send(true).unwrap();
        for handle in handles {
            timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        }
    }
}
