//! Storage for photos attached to posts.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "heic", "heif"];

/// URL prefix the stored files are served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Unsupported image type.")]
    UnsupportedType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lowercased text after the last dot, empty when there is none.
pub fn extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Reduce a client supplied name to `[A-Za-z0-9_.-]`, with whitespace runs
/// collapsed to `_` and no leading or trailing dots or underscores.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reject names whose extension is not an accepted image type.
    pub fn check(filename: &str) -> Result<String, UploadError> {
        let ext = extension(filename);
        if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            Ok(ext)
        } else {
            Err(UploadError::UnsupportedType(ext))
        }
    }

    /// Write the photo as `<base>-<8 hex>.<ext>` and return its URL path.
    #[tracing::instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let ext = Self::check(filename)?;

        let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
        let mut base = secure_filename(stem);
        if base.is_empty() {
            base = "photo".to_string();
        }

        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}.{}", base, &suffix[..8], ext);

        fs::write(self.dir.join(&name), bytes).await?;
        tracing::info!(name, "Stored upload");

        Ok(format!("{}/{}", UPLOADS_ROUTE, name))
    }
}
