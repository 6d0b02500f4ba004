/**
 * STORE - Frontière de persistance du noyau
 *
 * RÔLE : Lecture du roster (personnes, caméras, encodages) et journal
 * append-only des détections. La vraie base vit chez un collaborateur
 * externe, le noyau n'en consomme qu'un instantané JSON chargé au démarrage.
 *
 * FONCTIONNEMENT : Absences et échecs transitoires renvoient None ou vide
 * avec un log, jamais d'erreur propagée dans la boucle temps réel. Seul le
 * chargement initial du roster peut échouer, et c'est fatal au démarrage.
 */

use crate::captures::sanitize_url;
use crate::models::CameraContext;
use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub age: i64,
    pub description: String,
    pub date_joined: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraRecord {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub image: String, // chemin relatif sous le frontal média, vide si absent
}

impl CameraRecord {
    /// Contexte caméra tel qu'il part sur le fil, photo résolue en URL publique.
    pub fn to_context(&self, public_base: &str) -> CameraContext {
        let image = if self.image.is_empty() {
            None
        } else {
            Some(format!("{}{}", public_base.trim_end_matches('/'), self.image))
        };
        CameraContext {
            id: self.id,
            name: self.name.clone(),
            url: self.url.clone(),
            longitude: self.longitude,
            latitude: self.latitude,
            image,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingRecord {
    pub person_id: i64,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub persons: Vec<PersonRecord>,
    #[serde(default)]
    pub cameras: Vec<CameraRecord>,
    #[serde(default)]
    pub encodings: Vec<EncodingRecord>,
}

/// Ligne du journal des détections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SightingRow {
    pub person_id: i64,
    pub image: String,
    pub date_recorded: String,
    pub camera_id: Option<i64>,
}

pub trait Store: Send + Sync {
    fn person(&self, identity: &str) -> Option<PersonRecord>;
    fn camera_by_url(&self, url: &str) -> Option<CameraRecord>;
    /// Caméra dont l'URL nettoyée correspond au fragment embarqué dans un nom de capture.
    fn camera_by_fragment(&self, fragment: &str) -> Option<CameraRecord>;
    fn camera_urls(&self) -> Vec<String>;
    fn encodings(&self) -> Vec<(String, Vec<f32>)>;
    fn insert_sighting(&self, row: &SightingRow);
}

pub type SharedStore = Arc<dyn Store>;

pub struct JsonStore {
    roster: Roster,
    sightings_path: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonStore {
    pub async fn load(roster_path: &str, sightings_path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(roster_path).await?;
        let roster: Roster = serde_json::from_str(&content)?;
        println!(
            "[store] loaded {} persons, {} cameras, {} encodings from {}",
            roster.persons.len(),
            roster.cameras.len(),
            roster.encodings.len(),
            roster_path
        );
        Ok(Self {
            roster,
            sightings_path: PathBuf::from(sightings_path),
            append_lock: Mutex::new(()),
        })
    }
}

impl Store for JsonStore {
    fn person(&self, identity: &str) -> Option<PersonRecord> {
        let id: i64 = identity.trim().parse().ok()?;
        self.roster.persons.iter().find(|p| p.id == id).cloned()
    }

    fn camera_by_url(&self, url: &str) -> Option<CameraRecord> {
        self.roster.cameras.iter().find(|c| c.url == url).cloned()
    }

    fn camera_by_fragment(&self, fragment: &str) -> Option<CameraRecord> {
        if fragment.is_empty() {
            return None;
        }
        self.roster
            .cameras
            .iter()
            .find(|c| sanitize_url(&c.url) == fragment || c.url.contains(fragment))
            .cloned()
    }

    fn camera_urls(&self) -> Vec<String> {
        self.roster.cameras.iter().map(|c| c.url.clone()).collect()
    }

    fn encodings(&self) -> Vec<(String, Vec<f32>)> {
        self.roster
            .encodings
            .iter()
            .map(|e| (e.person_id.to_string(), e.vector.clone()))
            .collect()
    }

    fn insert_sighting(&self, row: &SightingRow) {
        let _guard = self.append_lock.lock();
        let line = match serde_json::to_string(row) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("[store] failed to encode sighting: {e}");
                return;
            }
        };
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.sightings_path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = written {
            eprintln!("[store] failed to append sighting: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_roster() -> serde_json::Value {
        serde_json::json!({
            "persons": [{
                "id": 3,
                "first_name": "Anvar",
                "last_name": "Karimov",
                "middle_name": "B.",
                "age": 34,
                "description": "wanted since 2023",
                "date_joined": "2023-05-14"
            }],
            "cameras": [{
                "id": 1,
                "name": "Gate A",
                "url": "rtsp://gate-a.local/stream",
                "longitude": 69.2401,
                "latitude": 41.2995,
                "image": "/media/cameras/gate-a.jpg"
            }],
            "encodings": [
                {"person_id": 3, "vector": [0.1, 0.2, 0.3]}
            ]
        })
    }

    async fn store_in(dir: &std::path::Path) -> JsonStore {
        let roster_path = dir.join("roster.json");
        std::fs::write(&roster_path, sample_roster().to_string()).unwrap();
        let sightings_path = dir.join("sightings.jsonl");
        JsonStore::load(roster_path.to_str().unwrap(), sightings_path.to_str().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn loads_roster_and_resolves_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        assert_eq!(store.person("3").unwrap().first_name, "Anvar");
        assert!(store.person("99").is_none());
        assert!(store.person("junk").is_none());
        assert_eq!(store.camera_urls(), vec!["rtsp://gate-a.local/stream"]);
        assert_eq!(store.camera_by_url("rtsp://gate-a.local/stream").unwrap().id, 1);
        let encodings = store.encodings();
        assert_eq!(encodings.len(), 1);
        assert_eq!(encodings[0].0, "3");
    }

    #[tokio::test]
    async fn camera_context_resolves_public_image_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let camera = store.camera_by_url("rtsp://gate-a.local/stream").unwrap();
        let ctx = camera.to_context("http://127.0.0.1:8000/");
        assert_eq!(
            ctx.image.as_deref(),
            Some("http://127.0.0.1:8000/media/cameras/gate-a.jpg")
        );
        let bare = CameraRecord { image: String::new(), ..camera };
        assert!(bare.to_context("http://127.0.0.1:8000").image.is_none());
    }

    #[tokio::test]
    async fn fragment_lookup_matches_sanitized_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let fragment = sanitize_url("rtsp://gate-a.local/stream");
        assert_eq!(store.camera_by_fragment(&fragment).unwrap().name, "Gate A");
        assert!(store.camera_by_fragment("nothing-like-this").is_none());
        assert!(store.camera_by_fragment("").is_none());
    }

    #[tokio::test]
    async fn sightings_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;
        let row = SightingRow {
            person_id: 3,
            image: "http://x/media/a.jpg".into(),
            date_recorded: "2026-01-01T00:00:00Z".into(),
            camera_id: Some(1),
        };
        store.insert_sighting(&row);
        store.insert_sighting(&row);
        let content = std::fs::read_to_string(dir.path().join("sightings.jsonl")).unwrap();
        let rows: Vec<SightingRow> =
            content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].person_id, 3);
    }

    #[tokio::test]
    async fn unreadable_roster_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(JsonStore::load(missing.to_str().unwrap(), "unused.jsonl").await.is_err());
    }
}
