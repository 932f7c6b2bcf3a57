//! Embedding capability: photo in, detected faces with embeddings out.
//!
//! Matching never talks to a detection backend directly; it only sees the
//! [`DetectedFace`] values a capability returns, so tests can feed synthetic
//! embeddings.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::DetectedFace;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("embedding backend failed: {0}")]
    Backend(String),
}

/// Strategy for turning a decoded photo into faces and embeddings.
///
/// The returned order must be stable within one call. A photo with no faces
/// yields an empty vector, never an error.
pub trait EmbeddingCapability {
    fn embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError>;
}

impl<C: EmbeddingCapability + ?Sized> EmbeddingCapability for Box<C> {
    fn embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
        (**self).embed(image)
    }
}

/// SCRFD detection followed by ArcFace embedding of every aligned face.
pub struct OnnxCapability {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    max_faces: Option<usize>,
}

impl OnnxCapability {
    pub fn load(scrfd_path: &Path, arcface_path: &Path) -> Result<Self, CapabilityError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self {
            detector,
            recognizer,
            max_faces: None,
        })
    }

    /// Keep at most `max` faces (the most confident). `0` means unlimited.
    pub fn with_max_faces(mut self, max: usize) -> Self {
        self.max_faces = (max > 0).then_some(max);
        self
    }
}

impl EmbeddingCapability for OnnxCapability {
    fn embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
        let mut boxes = self.detector.detect(image)?;
        if let Some(max) = self.max_faces {
            boxes.truncate(max);
        }

        let mut faces = Vec::with_capacity(boxes.len());
        for region in boxes {
            if region.landmarks.is_none() {
                tracing::debug!(confidence = region.confidence, "dropping face without landmarks");
                continue;
            }
            let embedding = self.recognizer.extract(image, &region)?;
            faces.push(DetectedFace { region, embedding });
        }
        Ok(faces)
    }
}
