use rollcall_core::{ARCFACE_MODEL_FILE, DEFAULT_MATCH_THRESHOLD, SCRFD_MODEL_FILE};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Training corpus: one photo per enrolled student, named after them.
    pub corpus_dir: PathBuf,
    /// Where annotated attendance images are written.
    pub artifact_dir: PathBuf,
    /// Optional TOML file mapping class ids to rosters.
    pub roster_path: Option<PathBuf>,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f32,
    /// Upper bound on embedding one request photo.
    pub request_timeout_secs: u64,
    /// Most faces embedded per photo; 0 means unlimited.
    pub max_faces: usize,
    /// Register on the system bus instead of the session bus.
    pub system_bus: bool,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("XDG_DATA_HOME")
            .map(|d| PathBuf::from(d).join("rollcall"))
            .unwrap_or_else(rollcall_core::default_data_dir);

        let path = |key: &str, default: PathBuf| {
            lookup(key).map(PathBuf::from).unwrap_or(default)
        };

        let mut match_threshold =
            parse_or(&lookup, "ROLLCALL_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD);
        if !(match_threshold.is_finite() && match_threshold > 0.0) {
            tracing::warn!(
                value = match_threshold,
                default = DEFAULT_MATCH_THRESHOLD,
                "invalid ROLLCALL_MATCH_THRESHOLD; using default"
            );
            match_threshold = DEFAULT_MATCH_THRESHOLD;
        }

        let mut request_timeout_secs =
            parse_or(&lookup, "ROLLCALL_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);
        if request_timeout_secs == 0 {
            tracing::warn!(
                default = DEFAULT_REQUEST_TIMEOUT_SECS,
                "ROLLCALL_REQUEST_TIMEOUT_SECS must be positive; using default"
            );
            request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }

        Self {
            model_dir: path("ROLLCALL_MODEL_DIR", data_dir.join("models")),
            corpus_dir: path("ROLLCALL_CORPUS_DIR", data_dir.join("corpus")),
            artifact_dir: path("ROLLCALL_ARTIFACT_DIR", data_dir.join("artifacts")),
            roster_path: lookup("ROLLCALL_ROSTER_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            match_threshold,
            request_timeout_secs,
            max_faces: parse_or(&lookup, "ROLLCALL_MAX_FACES", 0),
            system_bus: lookup("ROLLCALL_SYSTEM_BUS")
                .map(|v| v != "0")
                .unwrap_or(false),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(SCRFD_MODEL_FILE)
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join(ARCFACE_MODEL_FILE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
