//! Enrolled gallery: one reference embedding per identity.
//!
//! A [`Gallery`] is built once from a training corpus and never mutated while
//! shared. [`GalleryHandle`] hands out immutable snapshots and swaps in a whole
//! new gallery on reload, so in-flight requests keep the snapshot they started
//! with.

use crate::capability::CapabilityError;
use crate::photo::{self, PhotoError};
use crate::types::{DetectedFace, Embedding, Identity};
use arc_swap::ArcSwap;
use image::RgbImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum GalleryError {
    #[error("embedding for {identity} is empty")]
    EmptyEmbedding { identity: Identity },
    #[error("embedding for {identity} has dimension {actual}, gallery uses {expected}")]
    DimensionMismatch {
        identity: Identity,
        expected: usize,
        actual: usize,
    },
}

/// Identity → reference embedding, enumerated in sorted identity order.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: BTreeMap<Identity, Embedding>,
    dimension: Option<usize>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `embedding` under `identity`, returning the embedding it replaced.
    pub fn insert(
        &mut self,
        identity: Identity,
        embedding: Embedding,
    ) -> Result<Option<Embedding>, GalleryError> {
        let actual = embedding.dim();
        if actual == 0 {
            return Err(GalleryError::EmptyEmbedding { identity });
        }
        match self.dimension {
            Some(expected) if expected != actual => {
                return Err(GalleryError::DimensionMismatch {
                    identity,
                    expected,
                    actual,
                })
            }
            _ => self.dimension = Some(actual),
        }
        Ok(self.entries.insert(identity, embedding))
    }

    /// Build a gallery from pairs; later pairs replace earlier ones.
    pub fn from_entries<I>(entries: I) -> Result<Self, GalleryError>
    where
        I: IntoIterator<Item = (Identity, Embedding)>,
    {
        let mut gallery = Self::new();
        for (identity, embedding) in entries {
            gallery.insert(identity, embedding)?;
        }
        Ok(gallery)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared embedding dimension, `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&Embedding> {
        self.entries.get(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Embedding)> {
        self.entries.iter()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.entries.keys()
    }
}

/// Shared, atomically replaceable gallery.
#[derive(Clone)]
pub struct GalleryHandle {
    current: Arc<ArcSwap<Gallery>>,
}

impl GalleryHandle {
    pub fn new(gallery: Gallery) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(gallery)),
        }
    }

    /// Immutable view of the current gallery.
    pub fn snapshot(&self) -> Arc<Gallery> {
        self.current.load_full()
    }

    /// Swap in a freshly built gallery, returning the previous snapshot.
    pub fn replace(&self, gallery: Gallery) -> Arc<Gallery> {
        self.current.swap(Arc::new(gallery))
    }
}

/// Outcome counters of one corpus scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub enrolled: usize,
    pub skipped: usize,
    pub overwritten: usize,
}

/// Why a training file did not make it into the gallery.
#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("file name is not a usable identity label")]
    BadLabel,
    #[error("unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Photo(#[from] PhotoError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("no face detected")]
    NoFace,
    #[error(transparent)]
    Rejected(#[from] GalleryError),
}

/// Regular, non-hidden files of the corpus directory in sorted order.
///
/// Entries that cannot be read are skipped; only a missing or unreadable
/// directory is an error.
pub fn corpus_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %e,
                    "skipping unreadable corpus entry"
                );
                continue;
            }
        };
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if !hidden && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Identity label (lower-cased file stem) and decoded photo of one training file.
pub fn read_training_photo(path: &Path) -> Result<(Identity, RgbImage), EnrollError> {
    let identity = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(Identity::new)
        .ok_or(EnrollError::BadLabel)?;
    let bytes = std::fs::read(path)?;
    let image = photo::decode_photo(&bytes)?;
    Ok((identity, image))
}

/// Accumulates training files into a gallery, one file at a time.
///
/// Callers visit [`corpus_files`] in order, so when two files normalize to the
/// same identity the later one wins. Per-file problems are logged and counted,
/// never fatal.
#[derive(Debug, Default)]
pub struct GalleryBuilder {
    gallery: Gallery,
    report: LoadReport,
}

impl GalleryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of embedding one training file.
    ///
    /// The first face the capability returned becomes the reference embedding.
    pub fn record(
        &mut self,
        path: &Path,
        outcome: Result<(Identity, Vec<DetectedFace>), EnrollError>,
    ) {
        match outcome.and_then(|(identity, faces)| self.enroll(identity, faces)) {
            Ok(None) => {}
            Ok(Some(identity)) => {
                self.report.overwritten += 1;
                tracing::warn!(
                    %identity,
                    file = %path.display(),
                    "duplicate identity in corpus; later file replaces the earlier embedding"
                );
            }
            Err(reason) => {
                self.report.skipped += 1;
                tracing::warn!(file = %path.display(), %reason, "skipping training image");
            }
        }
    }

    /// Returns the identity when it replaced an earlier entry.
    fn enroll(
        &mut self,
        identity: Identity,
        faces: Vec<DetectedFace>,
    ) -> Result<Option<Identity>, EnrollError> {
        let face_count = faces.len();
        let first = faces.into_iter().next().ok_or(EnrollError::NoFace)?;
        if face_count > 1 {
            tracing::debug!(
                %identity,
                faces = face_count,
                "several faces in training image; using the first"
            );
        }
        let replaced = self.gallery.insert(identity.clone(), first.embedding)?;
        Ok(replaced.map(|_| identity))
    }

    pub fn finish(mut self, corpus_dir: &Path) -> (Gallery, LoadReport) {
        self.report.enrolled = self.gallery.len();
        tracing::info!(
            dir = %corpus_dir.display(),
            enrolled = self.report.enrolled,
            skipped = self.report.skipped,
            overwritten = self.report.overwritten,
            dimension = ?self.gallery.dimension(),
            "gallery loaded"
        );
        (self.gallery, self.report)
    }
}
