use crate::engine::{EngineError, EngineHandle};
use image::RgbImage;
use rollcall_core::{
    annotate, corpus_files, decode_photo, read_training_photo, ArtifactError, ArtifactStore,
    AttendanceRecord, AttendanceResponse, CapabilityError, DetectedFace, EnrollError,
    EuclideanMatcher, GalleryBuilder, GalleryHandle, Identity, LoadReport, Matcher, PhotoError,
    RosterResolver,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("invalid request: {0}")]
    InvalidInput(&'static str),
    #[error("photo rejected: {0}")]
    UndecodableImage(#[from] PhotoError),
    #[error("face embedding failed: {0}")]
    Capability(#[from] CapabilityError),
    #[error("face embedding timed out after {0:?}")]
    Timeout(Duration),
    #[error("annotated image could not be stored: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("recognition engine is not running")]
    EngineClosed,
}

impl From<EngineError> for ProcessError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Capability(e) => Self::Capability(e),
            EngineError::Spawn(_) | EngineError::ChannelClosed => Self::EngineClosed,
        }
    }
}

impl ProcessError {
    /// Whether the caller sent something unusable, as opposed to a server-side failure.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::UndecodableImage(_))
    }
}

/// Runtime knobs of [`AttendanceService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub corpus_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub match_threshold: f32,
    pub request_timeout: Duration,
}

/// Snapshot of daemon state reported over D-Bus.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub version: &'static str,
    pub gallery_size: usize,
    pub embedding_dimension: Option<usize>,
    pub match_threshold: f32,
    pub corpus_dir: PathBuf,
    pub artifact_dir: PathBuf,
}

/// Request pipeline: decode, embed, match, aggregate, annotate.
///
/// Cheap to clone; every clone shares the engine, gallery and artifact store.
#[derive(Clone)]
pub struct AttendanceService {
    engine: EngineHandle,
    gallery: GalleryHandle,
    rosters: Arc<dyn RosterResolver>,
    matcher: EuclideanMatcher,
    artifacts: ArtifactStore,
    corpus_dir: PathBuf,
    timeout: Duration,
}

impl AttendanceService {
    pub fn new(
        engine: EngineHandle,
        gallery: GalleryHandle,
        rosters: Arc<dyn RosterResolver>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            engine,
            gallery,
            rosters,
            matcher: EuclideanMatcher::new(settings.match_threshold),
            artifacts: ArtifactStore::new(settings.artifact_dir),
            corpus_dir: settings.corpus_dir,
            timeout: settings.request_timeout,
        }
    }

    /// Take attendance for `class_id` from one classroom photo.
    pub async fn process(
        &self,
        class_id: &str,
        photo: Vec<u8>,
    ) -> Result<AttendanceResponse, ProcessError> {
        let class_id = class_id.trim();
        if class_id.is_empty() {
            return Err(ProcessError::InvalidInput("class id is empty"));
        }
        if photo.is_empty() {
            return Err(ProcessError::InvalidInput("photo payload is empty"));
        }
        let photo_size = photo.len();

        let image = tokio::task::spawn_blocking(move || decode_photo(&photo)).await??;
        let image = Arc::new(image);

        let faces = tokio::time::timeout(self.timeout, self.engine.embed(Arc::clone(&image)))
            .await
            .map_err(|_| ProcessError::Timeout(self.timeout))??;

        // One snapshot per request; a concurrent reload does not affect it.
        let gallery = self.gallery.snapshot();
        let matches = self.matcher.match_all(&faces, &gallery);
        let roster = self.rosters.resolve(class_id, &gallery);

        let store = self.artifacts.clone();
        let owned_class = class_id.to_string();
        let render_matches = matches.clone();
        let render = tokio::task::spawn_blocking(move || {
            let annotated: RgbImage = annotate::render(&image, &faces, &render_matches);
            store.save(&owned_class, &annotated)
        });
        let aggregate = async { AttendanceRecord::aggregate(class_id, &roster, &matches) };
        let (saved, record) = tokio::join!(render, aggregate);
        let artifact_path = saved??;

        let response = AttendanceResponse::new(record, artifact_path, photo_size);
        tracing::info!(
            class_id,
            faces = response.faces_detected,
            recognized = response.students_recognized,
            roster = response.total_students,
            photo_size,
            "attendance processed"
        );
        Ok(response)
    }

    /// Rebuild the gallery from the corpus and swap it in.
    ///
    /// Each training photo is a separate engine request, so attendance
    /// requests arriving during a reload are served between corpus files.
    pub async fn reload_gallery(&self) -> Result<LoadReport, ProcessError> {
        let dir = self.corpus_dir.clone();
        let files = match tokio::task::spawn_blocking(move || corpus_files(&dir)).await? {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(
                    dir = %self.corpus_dir.display(),
                    error = %e,
                    "training corpus unavailable; starting with an empty gallery"
                );
                Vec::new()
            }
        };

        let mut builder = GalleryBuilder::new();
        for path in files {
            let outcome = self.embed_training_photo(path.clone()).await?;
            builder.record(&path, outcome);
        }

        let (gallery, report) = builder.finish(&self.corpus_dir);
        let previous = self.gallery.replace(gallery);
        tracing::info!(
            previous = previous.len(),
            enrolled = report.enrolled,
            "gallery swapped"
        );
        Ok(report)
    }

    /// The outer error aborts the reload; the inner one only skips this file.
    async fn embed_training_photo(
        &self,
        path: PathBuf,
    ) -> Result<Result<(Identity, Vec<DetectedFace>), EnrollError>, ProcessError> {
        let read = tokio::task::spawn_blocking(move || read_training_photo(&path)).await?;
        let (identity, image) = match read {
            Ok(read) => read,
            Err(e) => return Ok(Err(e)),
        };
        match self.engine.embed(Arc::new(image)).await {
            Ok(faces) => Ok(Ok((identity, faces))),
            Err(EngineError::Capability(e)) => Ok(Err(e.into())),
            Err(EngineError::Spawn(_) | EngineError::ChannelClosed) => {
                Err(ProcessError::EngineClosed)
            }
        }
    }

    /// Path of the latest annotated image for `class_id`.
    pub fn annotated_image(&self, class_id: &str) -> Result<PathBuf, ProcessError> {
        let class_id = class_id.trim();
        if class_id.is_empty() {
            return Err(ProcessError::InvalidInput("class id is empty"));
        }
        Ok(self.artifacts.locate(class_id)?)
    }

    /// Roster `class_id` resolves to against the current gallery.
    pub fn roster(&self, class_id: &str) -> Result<Vec<Identity>, ProcessError> {
        let class_id = class_id.trim();
        if class_id.is_empty() {
            return Err(ProcessError::InvalidInput("class id is empty"));
        }
        let gallery = self.gallery.snapshot();
        Ok(self.rosters.resolve(class_id, &gallery).iter().cloned().collect())
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.gallery.snapshot().identities().cloned().collect()
    }

    pub fn status(&self) -> ServiceStatus {
        let gallery = self.gallery.snapshot();
        ServiceStatus {
            version: env!("CARGO_PKG_VERSION"),
            gallery_size: gallery.len(),
            embedding_dimension: gallery.dimension(),
            match_threshold: self.matcher.threshold(),
            corpus_dir: self.corpus_dir.clone(),
            artifact_dir: self.artifacts.dir().to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use image::{ImageFormat, Rgb};
    use rollcall_core::{
        BoundingBox, ClassRosters, Embedding, EmbeddingCapability, Gallery, Roster, Status,
        WholeGallery,
    };
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports the same faces for every photo and counts its calls.
    struct FixedCapability {
        faces: Vec<DetectedFace>,
        calls: Arc<AtomicUsize>,
    }

    impl EmbeddingCapability for FixedCapability {
        fn embed(&mut self, _image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.faces.clone())
        }
    }

    struct FailingCapability;

    impl EmbeddingCapability for FailingCapability {
        fn embed(&mut self, _image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
            Err(CapabilityError::Backend("session crashed".into()))
        }
    }

    struct SlowCapability;

    impl EmbeddingCapability for SlowCapability {
        fn embed(&mut self, _image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(Vec::new())
        }
    }

    /// Takes a fixed time per photo and reports one face.
    struct PacedCapability(Duration);

    impl EmbeddingCapability for PacedCapability {
        fn embed(&mut self, _image: &RgbImage) -> Result<Vec<DetectedFace>, CapabilityError> {
            std::thread::sleep(self.0);
            Ok(vec![face(vec![0.0, 0.0])])
        }
    }

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            region: BoundingBox::new(4.0, 4.0, 16.0, 16.0),
            embedding: Embedding::new(values),
        }
    }

    fn photo() -> Vec<u8> {
        let img = RgbImage::from_pixel(32, 32, Rgb([90, 120, 150]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn alice_bob_gallery() -> Gallery {
        Gallery::from_entries([
            (id("alice"), Embedding::new(vec![0.0, 0.0])),
            (id("bob"), Embedding::new(vec![1.0, 0.0])),
        ])
        .unwrap()
    }

    fn class_rosters() -> Arc<dyn RosterResolver> {
        let mut rosters = ClassRosters::default();
        rosters.insert("class_123", Roster::new([id("alice"), id("bob"), id("carol")]));
        Arc::new(rosters)
    }

    struct Fixture {
        service: AttendanceService,
        artifacts: tempfile::TempDir,
    }

    fn service_with<C>(
        capability: C,
        gallery: Gallery,
        rosters: Arc<dyn RosterResolver>,
    ) -> Fixture
    where
        C: EmbeddingCapability + Send + 'static,
    {
        let artifacts = tempfile::tempdir().unwrap();
        let engine = spawn_engine(capability).unwrap();
        let settings = ServiceSettings {
            corpus_dir: artifacts.path().join("corpus"),
            artifact_dir: artifacts.path().join("out"),
            match_threshold: 0.6,
            request_timeout: Duration::from_millis(100),
        };
        let gallery = GalleryHandle::new(gallery);
        let service = AttendanceService::new(engine, gallery, rosters, settings);
        Fixture { service, artifacts }
    }

    fn fixed(faces: Vec<DetectedFace>) -> (FixedCapability, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            FixedCapability {
                faces,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    #[tokio::test]
    async fn test_one_face_marks_alice_present() {
        let (capability, _) = fixed(vec![face(vec![0.1, 0.0])]);
        let fx = service_with(capability, alice_bob_gallery(), class_rosters());

        let response = fx.service.process("class_123", photo()).await.unwrap();
        assert_eq!(
            response.attendance_details,
            vec![
                (id("alice"), Status::Present),
                (id("bob"), Status::Absent),
                (id("carol"), Status::Absent),
            ]
        );
        assert_eq!(response.recognized_students, vec![id("alice")]);
        assert_eq!(response.faces_detected, 1);
        assert_eq!(response.students_recognized, 1);
        assert_eq!(response.total_students, 3);
        assert_eq!(
            response.message,
            "Attendance processed for class class_123. 1 students recognized."
        );

        assert!(response.annotated_image.is_file());
        assert_eq!(fx.service.annotated_image("class_123").unwrap(), response.annotated_image);
        let annotated = image::open(&response.annotated_image).unwrap();
        assert_eq!((annotated.width(), annotated.height()), (32, 32));
    }

    #[tokio::test]
    async fn test_zero_faces_is_a_result() {
        let (capability, _) = fixed(Vec::new());
        let fx = service_with(capability, alice_bob_gallery(), class_rosters());

        let response = fx.service.process("class_123", photo()).await.unwrap();
        assert_eq!(response.faces_detected, 0);
        assert!(response.recognized_students.is_empty());
        assert!(response
            .attendance_details
            .iter()
            .all(|(_, status)| *status == Status::Absent));
        assert!(response.annotated_image.is_file());
    }

    #[tokio::test]
    async fn test_duplicate_detections_count_once() {
        let (capability, _) = fixed(vec![face(vec![0.0, 0.05]), face(vec![0.05, 0.0])]);
        let fx = service_with(capability, alice_bob_gallery(), Arc::new(WholeGallery));

        let response = fx.service.process("any", photo()).await.unwrap();
        assert_eq!(response.faces_detected, 2);
        assert_eq!(response.recognized_students, vec![id("alice")]);
        assert_eq!(response.total_students, 2);
    }

    #[tokio::test]
    async fn test_empty_gallery_everyone_unknown() {
        let (capability, _) = fixed(vec![face(vec![0.0, 0.0]), face(vec![5.0, 5.0])]);
        let fx = service_with(capability, Gallery::new(), Arc::new(WholeGallery));

        let response = fx.service.process("class_1", photo()).await.unwrap();
        assert_eq!(response.faces_detected, 2);
        assert!(response.recognized_students.is_empty());
        assert_eq!(response.total_students, 0);
    }

    #[tokio::test]
    async fn test_capability_failure_writes_no_artifact() {
        let fx = service_with(FailingCapability, alice_bob_gallery(), class_rosters());

        let err = fx.service.process("class_123", photo()).await.unwrap_err();
        assert!(matches!(err, ProcessError::Capability(_)));
        assert!(!err.is_input_error());
        assert!(matches!(
            fx.service.annotated_image("class_123"),
            Err(ProcessError::Artifact(ArtifactError::NotFound(_)))
        ));
        assert!(!fx.artifacts.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let fx = service_with(SlowCapability, alice_bob_gallery(), class_rosters());

        let err = fx.service.process("class_123", photo()).await.unwrap_err();
        assert!(matches!(err, ProcessError::Timeout(_)));
        assert!(fx.service.annotated_image("class_123").is_err());
    }

    #[tokio::test]
    async fn test_bad_input_never_reaches_capability() {
        let (capability, calls) = fixed(vec![face(vec![0.0, 0.0])]);
        let fx = service_with(capability, alice_bob_gallery(), class_rosters());

        let garbage = b"not an image".to_vec();
        let err = fx.service.process("class_123", garbage).await.unwrap_err();
        assert!(matches!(err, ProcessError::UndecodableImage(PhotoError::NotAnImage)));
        assert!(err.is_input_error());

        let err = fx.service.process("class_123", Vec::new()).await.unwrap_err();
        assert!(matches!(err, ProcessError::InvalidInput(_)));

        let err = fx.service.process("  ", photo()).await.unwrap_err();
        assert!(matches!(err, ProcessError::InvalidInput(_)));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reload_swaps_gallery() {
        let (capability, _) = fixed(vec![face(vec![0.3, 0.7, 0.1])]);
        let fx = service_with(capability, alice_bob_gallery(), Arc::new(WholeGallery));
        assert_eq!(fx.service.identities(), vec![id("alice"), id("bob")]);

        let corpus = fx.artifacts.path().join("corpus");
        std::fs::create_dir_all(&corpus).unwrap();
        std::fs::write(corpus.join("Dana.png"), photo()).unwrap();

        let report = fx.service.reload_gallery().await.unwrap();
        assert_eq!(report.enrolled, 1);
        assert_eq!(fx.service.identities(), vec![id("dana")]);
        assert_eq!(fx.service.roster("class_9").unwrap(), vec![id("dana")]);

        let status = fx.service.status();
        assert_eq!(status.gallery_size, 1);
        assert_eq!(status.embedding_dimension, Some(3));

        let response = fx.service.process("class_9", photo()).await.unwrap();
        assert_eq!(response.recognized_students, vec![id("dana")]);
    }

    #[tokio::test]
    async fn test_roster_keeps_unenrolled_names() {
        let (capability, _) = fixed(Vec::new());
        let fx = service_with(capability, alice_bob_gallery(), class_rosters());

        assert_eq!(
            fx.service.roster("class_123").unwrap(),
            vec![id("alice"), id("bob"), id("carol")]
        );
        assert_eq!(fx.service.roster("class_999").unwrap(), vec![id("alice"), id("bob")]);
    }

    #[tokio::test]
    async fn test_request_during_reload_is_served() {
        let mut fx = service_with(
            PacedCapability(Duration::from_millis(50)),
            Gallery::new(),
            Arc::new(WholeGallery),
        );
        fx.service.timeout = Duration::from_millis(300);

        // A full scan takes about 600ms, twice the request timeout.
        let corpus = fx.artifacts.path().join("corpus");
        std::fs::create_dir_all(&corpus).unwrap();
        for i in 0..12 {
            std::fs::write(corpus.join(format!("student_{i:02}.png")), photo()).unwrap();
        }

        let reload = fx.service.reload_gallery();
        let request = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fx.service.process("class_1", photo()).await
        };
        let (report, response) = tokio::join!(reload, request);

        assert_eq!(report.unwrap().enrolled, 12);
        assert_eq!(response.unwrap().faces_detected, 1);
        assert_eq!(fx.service.identities().len(), 12);
    }

    #[tokio::test]
    async fn test_reload_skips_bad_files_and_tolerates_missing_corpus() {
        let (capability, calls) = fixed(vec![face(vec![0.5, 0.5])]);
        let fx = service_with(capability, alice_bob_gallery(), Arc::new(WholeGallery));

        // No corpus directory at all: the gallery becomes empty.
        let report = fx.service.reload_gallery().await.unwrap();
        assert_eq!(report, LoadReport::default());
        assert!(fx.service.identities().is_empty());

        let corpus = fx.artifacts.path().join("corpus");
        std::fs::create_dir_all(&corpus).unwrap();
        std::fs::write(corpus.join("amit.png"), photo()).unwrap();
        std::fs::write(corpus.join("notes.txt"), b"not a photo").unwrap();

        let report = fx.service.reload_gallery().await.unwrap();
        assert_eq!(report.enrolled, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(fx.service.identities(), vec![id("amit")]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
