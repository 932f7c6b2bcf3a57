//! Nearest-neighbour face matching against the gallery.

use crate::gallery::Gallery;
use crate::types::{DetectedFace, Embedding, Identity, MatchResult};

/// Default maximum Euclidean distance for accepting a match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Strategy for resolving a query embedding against a gallery.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &Gallery) -> MatchResult;

    /// Match every detected face, preserving input order.
    fn match_all(&self, faces: &[DetectedFace], gallery: &Gallery) -> Vec<MatchResult> {
        faces
            .iter()
            .map(|face| self.compare(&face.embedding, gallery))
            .collect()
    }
}

/// Euclidean nearest-neighbour matcher with a fixed acceptance threshold.
///
/// Scans every gallery entry (no early exit). Ties on the minimum distance go
/// to the first identity in gallery order, so results depend only on the
/// gallery snapshot and the query.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Embedding, gallery: &Gallery) -> MatchResult {
        // An empty gallery has nothing to compare against.
        let Some(dimension) = gallery.dimension() else {
            return MatchResult::Unknown { nearest: None };
        };
        if query.dim() != dimension {
            tracing::warn!(
                query = query.dim(),
                gallery = dimension,
                "query embedding dimension does not match gallery"
            );
            return MatchResult::Unknown { nearest: None };
        }

        let mut best: Option<(&Identity, f32)> = None;
        for (identity, reference) in gallery.iter() {
            let distance = query.euclidean_distance(reference);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((identity, distance)),
            }
        }

        match best {
            Some((identity, distance)) if distance < self.threshold => MatchResult::Known {
                identity: identity.clone(),
                distance,
            },
            Some((_, distance)) => MatchResult::Unknown {
                nearest: Some(distance),
            },
            None => MatchResult::Unknown { nearest: None },
        }
    }
}
