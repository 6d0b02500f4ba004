use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub roster_path: String,
    pub sightings_path: String,
    pub media_dir: String,
    pub public_base_url: String, // préfixe des chemins servis par le frontal média
    pub alert_port: u16,
    pub feed_port: u16,
    pub match_threshold: f32, // distance L2 au carré
    pub seen_gap_secs: u64,
    pub alert_gap_secs: u64,
    pub snapshot_interval_secs: u64,
    pub feed_poll_secs: u64,
    pub ping_interval_secs: u64,
    pub frame_buffer: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            roster_path: "./data/roster.json".into(),
            sightings_path: "./data/sightings.jsonl".into(),
            media_dir: "./media".into(),
            public_base_url: "http://127.0.0.1:8000".into(),
            alert_port: 5000,
            feed_port: 5678,
            match_threshold: 500.0,
            seen_gap_secs: 5,
            alert_gap_secs: 3,
            snapshot_interval_secs: 5,
            feed_poll_secs: 5,
            ping_interval_secs: 10,
            frame_buffer: 16,
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("VIGIL_KERNEL_CONFIG").unwrap_or_else(|_| "vigil.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() { return KernelConfig::default(); }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[kernel] config invalide: {e}");
            KernelConfig::default()
        })
    } else {
        eprintln!("[kernel] pas de vigil.yaml, usage config par défaut");
        KernelConfig::default()
    }
}
