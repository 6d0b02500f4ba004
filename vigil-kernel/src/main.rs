/**
 * VIGIL KERNEL - Point d'entrée du noyau temps réel d'alerte
 *
 * RÔLE : Orchestration de tous les modules : config, roster, index de
 * similarité, hub d'abonnés, boucles caméra et les deux endpoints WebSocket.
 * Bootstrap du système complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : Une tâche tokio par caméra + deux serveurs axum (alertes
 * sur un port, flux des captures sur l'autre) + arrêt propre sur Ctrl-C.
 * UTILITÉ : Seul binaire du noyau, point d'administration unique.
 */

mod alerts;
mod captures;
mod config;
mod feed;
mod geo;
mod hub;
mod matcher;
mod models;
mod store;
mod stream;
mod throttle;
mod ws;

use crate::alerts::AlertDispatcher;
use crate::captures::CaptureStore;
use crate::config::load_config;
use crate::hub::{SharedHub, SubscriberHub};
use crate::matcher::IdentityMatcher;
use crate::store::{JsonStore, SharedStore};
use crate::stream::{spawn_camera_tasks, StreamDeps};
use crate::throttle::AlertThrottle;
use crate::ws::{alert_router, feed_router, AlertWsState, FeedWsState};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas

    let cfg = load_config().await;

    // roster : personnes, caméras, encodages
    let store: SharedStore = match JsonStore::load(&cfg.roster_path, &cfg.sightings_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("[kernel] failed to load roster {}: {e}", cfg.roster_path);
            std::process::exit(1);
        }
    };

    // index de similarité figé au démarrage, redémarrer pour le rafraîchir
    let encodings = store.encodings();
    if encodings.is_empty() {
        eprintln!("[kernel] warning: roster has no encodings, nobody will ever match");
    }
    let matcher = Arc::new(IdentityMatcher::from_encodings(encodings, cfg.match_threshold));
    println!("[kernel] similarity index ready ({} identities)", matcher.len());

    let hub: SharedHub = Arc::new(SubscriberHub::new());
    let captures = Arc::new(CaptureStore::new(&cfg.media_dir, &cfg.public_base_url));
    let throttle = Arc::new(AlertThrottle::new(
        Duration::from_secs(cfg.seen_gap_secs),
        Duration::from_secs(cfg.alert_gap_secs),
    ));
    let dispatcher = Arc::new(AlertDispatcher::new(
        hub.clone(),
        store.clone(),
        captures.clone(),
        throttle,
    ));

    // une boucle de traitement par caméra du roster
    let cameras: Vec<_> = store
        .camera_urls()
        .iter()
        .filter_map(|url| store.camera_by_url(url))
        .collect();
    if cameras.is_empty() {
        eprintln!("[kernel] no cameras in roster, nothing to watch");
        std::process::exit(1);
    }
    println!("[kernel] watching {} cameras", cameras.len());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let deps = Arc::new(StreamDeps {
        matcher,
        dispatcher,
        captures: captures.clone(),
        snapshot_interval: Duration::from_secs(cfg.snapshot_interval_secs),
        frame_buffer: cfg.frame_buffer,
    });
    let camera_tasks = spawn_camera_tasks(cameras, deps, shutdown_rx);

    // endpoint alertes : inscriptions + diffusion
    let alert_app = alert_router(AlertWsState {
        hub: hub.clone(),
        ping_interval: Duration::from_secs(cfg.ping_interval_secs),
    });
    let alert_addr = SocketAddr::from(([0, 0, 0, 0], cfg.alert_port));
    println!("[kernel] alert endpoint on ws://{alert_addr}");
    let alert_listener = TcpListener::bind(alert_addr).await.unwrap();
    let alert_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(alert_listener, alert_app).await {
            eprintln!("[kernel] alert server stopped: {e}");
        }
    });

    // endpoint flux des captures non identifiées
    let feed_app = feed_router(FeedWsState {
        store,
        captures,
        poll_interval: Duration::from_secs(cfg.feed_poll_secs),
    });
    let feed_addr = SocketAddr::from(([0, 0, 0, 0], cfg.feed_port));
    println!("[kernel] feed endpoint on ws://{feed_addr}");
    let feed_listener = TcpListener::bind(feed_addr).await.unwrap();
    let feed_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(feed_listener, feed_app).await {
            eprintln!("[kernel] feed server stopped: {e}");
        }
    });

    // Ctrl-C : stopper les boucles caméra puis les serveurs
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("[kernel] failed to listen for ctrl-c: {e}");
    }
    println!("[kernel] shutting down");
    let _ = shutdown_tx.send(true);
    for task in camera_tasks {
        let _ = task.await;
    }
    alert_server.abort();
    feed_server.abort();
}
