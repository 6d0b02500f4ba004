use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture stamp failed: {0}")]
    Stamp(#[from] time::error::Format),
}

/// Réduit une URL caméra aux caractères sûrs pour un nom de fichier.
pub fn sanitize_url(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

fn stamp(now: OffsetDateTime) -> Result<String, time::error::Format> {
    let format = format_description!(
        "[year]-[month]-[day]_[hour]-[minute]-[second]-[subsecond digits:6]"
    );
    now.format(format)
}

/// Dépôt des captures sous le répertoire média, avec leurs chemins publics.
/// Le nom de fichier embarque l'URL caméra après un `|` pour pouvoir remonter
/// à la caméra depuis une capture seule.
pub struct CaptureStore {
    media_dir: PathBuf,
    public_base: String,
}

impl CaptureStore {
    pub fn new(media_dir: &str, public_base: &str) -> Self {
        Self {
            media_dir: PathBuf::from(media_dir),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    /// Base publique (sans slash final) sous laquelle le frontal sert `media/`.
    pub fn base(&self) -> &str {
        &self.public_base
    }

    /// Capture de veille, sans identité rattachée.
    pub fn save_unmatched(&self, image: &[u8], camera_url: &str) -> Result<PathBuf, CaptureError> {
        let dir = self.media_dir.join("screenshots").join("unmatched");
        fs::create_dir_all(&dir)?;
        let name = format!("{}|{}.jpg", stamp(OffsetDateTime::now_utc())?, sanitize_url(camera_url));
        let path = dir.join(name);
        fs::write(&path, image)?;
        Ok(path)
    }

    /// Capture rattachée à une identité reconnue, classée par date.
    pub fn save_identity(
        &self,
        image: &[u8],
        identity: &str,
        camera_url: &str,
    ) -> Result<PathBuf, CaptureError> {
        let now = OffsetDateTime::now_utc();
        let dir = self
            .media_dir
            .join("screenshots")
            .join("persons")
            .join(sanitize_url(identity))
            .join(now.year().to_string())
            .join(format!("{:02}", u8::from(now.month())))
            .join(format!("{:02}", now.day()));
        fs::create_dir_all(&dir)?;
        let name = format!("{}|{}.jpg", stamp(now)?, sanitize_url(camera_url));
        let path = dir.join(name);
        fs::write(&path, image)?;
        Ok(path)
    }

    /// Chemins publics des captures non identifiées, triés par nom de fichier.
    pub fn unmatched_paths(&self) -> Vec<String> {
        let dir = self.media_dir.join("screenshots").join("unmatched");
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        names
            .iter()
            .map(|n| format!("{}/media/screenshots/unmatched/{}", self.public_base, n))
            .collect()
    }

    /// Chemin public (frontal média) d'un fichier écrit sous le répertoire média.
    pub fn public_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.media_dir) {
            Ok(rel) => format!("{}/media/{}", self.public_base, rel.display()),
            Err(_) => path.display().to_string(),
        }
    }

    /// Fragment d'URL caméra embarqué dans un nom ou chemin de capture.
    pub fn camera_fragment(path_or_name: &str) -> Option<&str> {
        let name = path_or_name.rsplit('/').next().unwrap_or(path_or_name);
        let (_, tail) = name.rsplit_once('|')?;
        Some(tail.strip_suffix(".jpg").unwrap_or(tail))
    }
}
