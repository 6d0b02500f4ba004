/**
 * WS ENDPOINTS - Les deux faces WebSocket du noyau
 *
 * RÔLE : Côté alertes, accueillir dashboards et mobiles : le premier message
 * de la connexion est l'inscription, ensuite la connexion ne fait que
 * recevoir. Côté flux, pousser les captures non identifiées aux opérateurs
 * au fil de leur apparition sur disque.
 *
 * FONCTIONNEMENT : Chaque session alerte tient une outbox mpsc enregistrée
 * dans le hub et une seule boucle select pompe outbox, pings et trafic
 * entrant. La session flux tient l'ensemble des chemins déjà envoyés, la
 * déduplication est donc par connexion.
 */

use crate::captures::CaptureStore;
use crate::hub::{Role, SharedHub};
use crate::models::{GeoPoint, RegisterIn, SuspendNotice};
use crate::store::SharedStore;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AlertWsState {
    pub hub: SharedHub,
    pub ping_interval: Duration,
}

#[derive(Clone)]
pub struct FeedWsState {
    pub store: SharedStore,
    pub captures: Arc<CaptureStore>,
    pub poll_interval: Duration,
}

pub fn alert_router(state: AlertWsState) -> Router {
    Router::new().route("/", get(alert_ws_handler)).with_state(state)
}

pub fn feed_router(state: FeedWsState) -> Router {
    Router::new().route("/", get(feed_ws_handler)).with_state(state)
}

async fn alert_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AlertWsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| alert_session(socket, state))
}

async fn feed_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<FeedWsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| feed_session(socket, state))
}

/// Rôle et position portés par un message d'inscription.
fn classify(reg: &RegisterIn) -> (Role, Option<GeoPoint>) {
    match reg {
        RegisterIn::Mobile { .. } => (Role::Mobile, reg.location()),
        RegisterIn::Dashboard => (Role::Dashboard, None),
    }
}

/// Premier message de données de la connexion, décodé en inscription.
/// Les trames ping/pong sont ignorées. None ferme la connexion sans inscrire.
async fn registration(socket: &mut WebSocket) -> Option<RegisterIn> {
    loop {
        let parsed: Result<RegisterIn, serde_json::Error> = match socket.recv().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str(&text),
            Some(Ok(Message::Binary(raw))) => serde_json::from_slice(&raw),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => {
                eprintln!("[ws] subscriber hung up before registering");
                return None;
            }
        };
        return match parsed {
            Ok(reg) => Some(reg),
            Err(e) => {
                eprintln!("[ws] bad registration message: {e}");
                None
            }
        };
    }
}

async fn alert_session(mut socket: WebSocket, state: AlertWsState) {
    let Some(reg) = registration(&mut socket).await else {
        return;
    };
    let (role, location) = classify(&reg);

    let id = Uuid::new_v4();
    let (tx, mut outbox) = mpsc::unbounded_channel();
    state.hub.register(id, role, location, tx);

    let mut ping = tokio::time::interval(state.ping_interval);
    ping.tick().await; // le premier tick est immédiat, on le consomme

    loop {
        tokio::select! {
            text = outbox.recv() => {
                let Some(text) = text else { break };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // après l'inscription le trafic entrant est ignoré
                }
            }
        }
    }

    state.hub.unregister(id);
}

/// Messages du flux pour les captures que cette connexion n'a pas encore vues.
fn fresh_notices(state: &FeedWsState, sent: &mut HashSet<String>) -> Vec<SuspendNotice> {
    let mut fresh = Vec::new();
    for path in state.captures.unmatched_paths() {
        if !sent.insert(path.clone()) {
            continue;
        }
        let camera_object = CaptureStore::camera_fragment(&path)
            .and_then(|fragment| state.store.camera_by_fragment(fragment))
            .map(|camera| camera.to_context(state.captures.base()));
        fresh.push(SuspendNotice { image_path: path, camera_object });
    }
    fresh
}

async fn feed_session(mut socket: WebSocket, state: FeedWsState) {
    println!("[ws] feed subscriber connected");
    let mut sent: HashSet<String> = HashSet::new();
    let mut poll = tokio::time::interval(state.poll_interval);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                for notice in fresh_notices(&state, &mut sent) {
                    let text = match serde_json::to_string(&notice) {
                        Ok(text) => text,
                        Err(e) => {
                            eprintln!("[ws] failed to encode feed notice: {e}");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        println!("[ws] feed subscriber left");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
    println!("[ws] feed subscriber left");
}
