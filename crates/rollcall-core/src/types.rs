use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Box without landmarks, as produced by synthetic detections.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 1.0,
            landmarks: None,
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace, 128 for dlib-style encoders).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings of the same dimension.
    ///
    /// Callers are expected to check [`dim`](Self::dim) first; extra trailing
    /// components of the longer vector are ignored.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Case-normalized label naming one enrolled person.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Normalize a raw label (trim + lower-case). Returns `None` for blank labels.
    pub fn new(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::new(&value).ok_or_else(|| format!("blank identity label: {value:?}"))
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

/// One face found in a request photo. Request-scoped.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub region: BoundingBox,
    pub embedding: Embedding,
}

/// Outcome of matching one detected face against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Known { identity: Identity, distance: f32 },
    /// No accepted match. `nearest` is the closest gallery distance, `None`
    /// when nothing was compared (empty gallery, dimension mismatch).
    Unknown { nearest: Option<f32> },
}

impl MatchResult {
    pub const UNKNOWN_LABEL: &'static str = "Unknown";

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            MatchResult::Known { identity, .. } => Some(identity),
            MatchResult::Unknown { .. } => None,
        }
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            MatchResult::Known { distance, .. } => Some(*distance),
            MatchResult::Unknown { nearest } => *nearest,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, MatchResult::Known { .. })
    }

    /// Text drawn next to the face in annotated images.
    pub fn label(&self) -> &str {
        match self {
            MatchResult::Known { identity, .. } => identity.as_str(),
            MatchResult::Unknown { .. } => Self::UNKNOWN_LABEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.3, 0.4, 0.5]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_345() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert!((b.euclidean_distance(&a) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_identity_normalization() {
        assert_eq!(Identity::new("  Rahul ").unwrap().as_str(), "rahul");
        assert_eq!(Identity::new("PRIYA"), Identity::new("priya"));
        assert!(Identity::new("   ").is_none());
        assert!(Identity::new("").is_none());
    }

    #[test]
    fn test_identity_serde_normalizes() {
        let id: Identity = serde_json::from_str("\"Sneha\"").unwrap();
        assert_eq!(id.as_str(), "sneha");
        assert!(serde_json::from_str::<Identity>("\" \"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sneha\"");
    }

    #[test]
    fn test_match_result_accessors() {
        let known = MatchResult::Known {
            identity: Identity::new("amit").unwrap(),
            distance: 0.2,
        };
        assert!(known.is_known());
        assert_eq!(known.label(), "amit");
        assert_eq!(known.distance(), Some(0.2));

        let unknown = MatchResult::Unknown { nearest: None };
        assert!(!unknown.is_known());
        assert_eq!(unknown.label(), "Unknown");
        assert!(unknown.identity().is_none());
        assert!(unknown.distance().is_none());
    }
}
