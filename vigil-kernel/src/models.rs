use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

// Les clients mobiles envoient leurs coordonnées tantôt en nombre, tantôt en
// chaîne, parfois n'importe quoi. On accepte tout et on trie à l'usage.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    Num(f64),
    Text(String),
    Other(serde_json::Value),
}

impl Coordinate {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Coordinate::Num(n) => *n,
            Coordinate::Text(t) => t.trim().parse::<f64>().ok()?,
            Coordinate::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

/// Premier message d'une connexion abonné : `state` vaut "apk" pour un mobile,
/// n'importe quelle autre valeur inscrit un dashboard.
#[derive(Debug, Deserialize)]
#[serde(tag = "state")]
pub enum RegisterIn {
    #[serde(rename = "apk")]
    Mobile {
        latitude: Option<Coordinate>,
        longitude: Option<Coordinate>,
    },
    #[serde(other)]
    Dashboard,
}

impl RegisterIn {
    /// Coordonnées exploitables d'une inscription mobile, sinon None.
    pub fn location(&self) -> Option<GeoPoint> {
        match self {
            RegisterIn::Mobile { latitude: Some(lat), longitude: Some(lon) } => Some(GeoPoint {
                latitude: lat.as_f64()?,
                longitude: lon.as_f64()?,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraContext {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub longitude: f64,
    pub latitude: f64,
    pub image: Option<String>, // URL publique, null si la caméra n'a pas de photo
}

/// Payload d'alerte poussé aux dashboards et au mobile le plus proche.
#[derive(Debug, Clone, Serialize)]
pub struct AlertContext {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub age: i64,
    pub description: String,
    pub date_joined: String,
    pub url: String,
    pub camera: Option<CameraContext>,
}

/// Message du flux des captures non identifiées.
#[derive(Debug, Clone, Serialize)]
pub struct SuspendNotice {
    pub image_path: String,
    pub camera_object: Option<CameraContext>,
}

/// Une frame décodée avec les embeddings de visages extraits en amont
/// par le worker de capture.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Vec<u8>,
    pub faces: Vec<Vec<f32>>,
}
