//! rollcall-core: photo-based attendance recognition engine.
//!
//! A classroom photo goes through an [`EmbeddingCapability`] (SCRFD detection
//! + ArcFace embeddings via ONNX Runtime by default), each face is matched
//! against the enrolled [`Gallery`] by Euclidean distance, and the matches are
//! folded into a per-student [`AttendanceRecord`] plus an annotated image.

pub mod alignment;
pub mod annotate;
pub mod artifact;
pub mod attendance;
pub mod capability;
pub mod detector;
pub mod gallery;
pub mod matcher;
pub mod photo;
pub mod recognizer;
pub mod roster;
pub mod types;

use std::path::PathBuf;

pub use artifact::{ArtifactError, ArtifactStore};
pub use attendance::{AttendanceRecord, AttendanceResponse, AttendanceSummary, Status};
pub use capability::{CapabilityError, EmbeddingCapability, OnnxCapability};
pub use gallery::{
    corpus_files, read_training_photo, EnrollError, Gallery, GalleryBuilder, GalleryHandle,
    LoadReport,
};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use photo::{decode_photo, PhotoError};
pub use roster::{ClassRosters, Roster, RosterResolver, WholeGallery};
pub use types::{BoundingBox, DetectedFace, Embedding, Identity, MatchResult};

/// SCRFD detection model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Base data directory: `$XDG_DATA_HOME/rollcall`, else `~/.local/share/rollcall`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}
