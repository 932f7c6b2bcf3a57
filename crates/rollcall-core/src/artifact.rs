//! Per-class storage of annotated attendance images.
//!
//! One file per class id, replaced on every run (last writer wins). Writes go
//! through a temporary file and a rename so readers only ever see complete
//! images.

use image::{ImageFormat, RgbImage};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("no annotated image for class {0}")]
    NotFound(String),
    #[error("artifact I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode annotated image: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the artifact for `class_id` lives. Depends on the class id only.
    pub fn path_for(&self, class_id: &str) -> PathBuf {
        self.dir.join(format!("attendance_{}.png", class_slug(class_id)))
    }

    /// Persist `image` as the current artifact of `class_id`.
    pub fn save(&self, class_id: &str, image: &RgbImage) -> Result<PathBuf, ArtifactError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::Io {
            path: self.dir.display().to_string(),
            source,
        })?;

        let final_path = self.path_for(class_id);
        let tmp_path = self.dir.join(format!(
            ".attendance_{}.{}.tmp",
            class_slug(class_id),
            uuid::Uuid::new_v4()
        ));

        if let Err(e) = image.save_with_format(&tmp_path, ImageFormat::Png) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        std::fs::rename(&tmp_path, &final_path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp_path);
            ArtifactError::Io {
                path: final_path.display().to_string(),
                source,
            }
        })?;

        tracing::debug!(class_id, path = %final_path.display(), "annotated image written");
        Ok(final_path)
    }

    /// Most recent artifact of `class_id`.
    pub fn locate(&self, class_id: &str) -> Result<PathBuf, ArtifactError> {
        let path = self.path_for(class_id);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ArtifactError::NotFound(class_id.to_string()))
        }
    }
}

/// Longest class id used verbatim in a file name.
const MAX_PLAIN_SLUG: usize = 100;

/// File-name-safe form of a class id.
///
/// Short ids made of `[A-Za-z0-9_-]` are used as-is. Anything else has unsafe
/// bytes replaced by `_`, is cut to [`MAX_PLAIN_SLUG`] bytes and gets a SHA-256
/// prefix appended so distinct ids stay distinct.
fn class_slug(class_id: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    if !class_id.is_empty() && class_id.len() <= MAX_PLAIN_SLUG && class_id.chars().all(safe) {
        return class_id.to_string();
    }

    // All ASCII after cleaning, so truncating by bytes stays on a char boundary.
    let mut cleaned: String = class_id
        .chars()
        .map(|c| if safe(c) { c } else { '_' })
        .collect();
    cleaned.truncate(MAX_PLAIN_SLUG);
    let digest = Sha256::digest(class_id.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("{cleaned}-{suffix}")
}
