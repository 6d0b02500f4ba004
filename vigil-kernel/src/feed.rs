use crate::models::Frame;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

// Une ligne de script de rejeu : délai avant la frame puis les embeddings
// des visages qu'elle contient.
#[derive(Debug, Deserialize)]
struct ScriptFrame {
    #[serde(default)]
    after_ms: u64,
    #[serde(default)]
    faces: Vec<Vec<f32>>,
}

/// Démarre le producteur de frames d'une caméra. La fermeture du canal
/// signifie que la source est terminée ou injoignable, et la boucle caméra
/// correspondante s'arrête sans toucher aux autres.
///
/// Les URLs `file:` rejouent un script JSONL, une ligne par frame. Les autres
/// schémas relèvent d'un worker de capture externe qui n'est pas embarqué ici.
pub fn spawn_feed(camera_url: &str, buffer: usize) -> mpsc::Receiver<Frame> {
    let (tx, rx) = mpsc::channel(buffer);
    let url = camera_url.to_string();
    tokio::spawn(async move {
        match url.strip_prefix("file:") {
            Some(rest) => {
                let path = rest.strip_prefix("//").unwrap_or(rest);
                replay_script(path, &url, tx).await;
            }
            None => {
                eprintln!("[feed] no capture worker for {url}, feed closed");
            }
        }
    });
    rx
}

async fn replay_script(path: &str, camera_url: &str, tx: mpsc::Sender<Frame>) {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            eprintln!("[feed] cannot read script {path}: {e}");
            return;
        }
    };

    let mut sent = 0usize;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: ScriptFrame = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("[feed] {camera_url}: bad frame at line {}: {e}", lineno + 1);
                continue;
            }
        };
        tokio::time::sleep(Duration::from_millis(parsed.after_ms)).await;
        let frame = Frame {
            // image de substitution, un vrai worker de capture fournit le JPEG
            image: format!("frame {sent} from {camera_url}").into_bytes(),
            faces: parsed.faces,
        };
        if tx.send(frame).await.is_err() {
            return; // consommateur parti
        }
        sent += 1;
    }
    println!("[feed] {camera_url}: script ended after {sent} frames");
}
