use marine_inspect::config::IdScheme;
use marine_inspect::core::db::{AdminCredential, LocalGateway};
use marine_inspect::core::gateway::{
    Authenticator, Order, PersistenceError, PersistenceGateway, Session,
};
use marine_inspect::detection::{
    annotated_path_for, DetectionError, DetectionOutput, Detector,
};
use marine_inspect::models::{
    BoundingBox, Detection, InspectionRecord, InspectionResult, InspectionStatus, ModelMetrics,
    RiskTier,
};
use marine_inspect::pipeline::{InspectionPipeline, PipelineSettings, Upload};
use marine_inspect::report::ReportBuilder;

use image::{ImageBuffer, Rgb};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use time::OffsetDateTime;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "hunter2";

/// 64x48 PNG with a dark stripe, encoded in memory.
pub fn test_png_bytes() -> Vec<u8> {
    let img = ImageBuffer::from_fn(64, 48, |x, _| {
        if (20..28).contains(&x) {
            Rgb([30u8, 30u8, 30u8])
        } else {
            Rgb([40u8, 110u8, 160u8])
        }
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes
}

pub fn test_upload() -> Upload {
    Upload::new("hull_section_3.png", test_png_bytes())
}

/// Writes the test PNG into `dir` and returns its path.
pub fn write_test_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, test_png_bytes()).expect("Failed to write test image");
    path
}

pub fn det(label: &str, confidence: f32) -> Detection {
    Detection::new(
        label,
        confidence,
        BoundingBox {
            x: 4.0,
            y: 6.0,
            width: 20.0,
            height: 12.0,
        },
    )
}

/// hull_crack 0.91 then corrosion 0.70, in model output order.
pub fn hull_detections() -> Vec<Detection> {
    vec![det("hull_crack", 0.91), det("corrosion", 0.70)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubMode {
    /// Copy the input into the annotated directory.
    Annotate,
    /// Report success but leave no annotated file behind.
    SkipAnnotated,
    Fail,
}

/// Detector returning canned detections without a model.
pub struct StubDetector {
    detections: Vec<Detection>,
    mode: StubMode,
    calls: AtomicUsize,
    last_threshold: Mutex<Option<f32>>,
}

impl StubDetector {
    pub fn new(detections: Vec<Detection>, mode: StubMode) -> Self {
        Self {
            detections,
            mode,
            calls: AtomicUsize::new(0),
            last_threshold: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_threshold(&self) -> Option<f32> {
        *self.last_threshold.lock().unwrap()
    }
}

impl Detector for StubDetector {
    fn detect(
        &self,
        image_path: &Path,
        confidence_threshold: f32,
        annotated_dir: &Path,
    ) -> Result<DetectionOutput, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_threshold.lock().unwrap() = Some(confidence_threshold);

        if self.mode == StubMode::Fail {
            return Err(DetectionError::ImageRead {
                path: image_path.to_path_buf(),
                reason: "corrupt image".into(),
            });
        }

        let annotated_image = annotated_path_for(image_path, annotated_dir);
        if self.mode == StubMode::Annotate {
            std::fs::create_dir_all(annotated_dir).unwrap();
            std::fs::copy(image_path, &annotated_image).unwrap();
        }

        Ok(DetectionOutput {
            detections: self
                .detections
                .iter()
                .filter(|d| d.confidence >= confidence_threshold)
                .cloned()
                .collect(),
            annotated_image,
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub uploads: Vec<(String, PathBuf)>,
    pub inserts: Vec<InspectionRecord>,
}

/// In-memory gateway that records every call. `fail_upload_at` fails the
/// n-th upload (0-based); `fail_insert` fails the row insert.
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    pub recorded: Arc<Mutex<Recorded>>,
    pub fail_upload_at: Option<usize>,
    pub fail_insert: bool,
}

impl RecordingGateway {
    pub fn upload_count(&self) -> usize {
        self.recorded.lock().unwrap().uploads.len()
    }

    pub fn insert_count(&self) -> usize {
        self.recorded.lock().unwrap().inserts.len()
    }

    pub fn call_count(&self) -> usize {
        self.upload_count() + self.insert_count()
    }
}

impl PersistenceGateway for RecordingGateway {
    async fn upload(&self, bucket: &str, local_file: &Path) -> Result<String, PersistenceError> {
        let mut recorded = self.recorded.lock().unwrap();
        let n = recorded.uploads.len();
        recorded
            .uploads
            .push((bucket.to_string(), local_file.to_path_buf()));
        if self.fail_upload_at == Some(n) {
            return Err(PersistenceError::Upload {
                bucket: bucket.to_string(),
                reason: "storage unavailable".into(),
            });
        }
        Ok(format!("mem://{}/{}", bucket, n))
    }

    async fn insert(
        &self,
        table: &str,
        record: &InspectionRecord,
    ) -> Result<InspectionRecord, PersistenceError> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.inserts.push(record.clone());
        if self.fail_insert {
            return Err(PersistenceError::Insert {
                table: table.to_string(),
                reason: "table unavailable".into(),
            });
        }
        let mut stored = record.clone();
        stored.id = Some(recorded.inserts.len() as i64);
        stored.created_at = Some("2025-03-01T12:00:00.000Z".into());
        Ok(stored)
    }

    async fn query(
        &self,
        _session: &Session,
        _table: &str,
        _order: Order,
    ) -> Result<Vec<InspectionRecord>, PersistenceError> {
        Ok(self.recorded.lock().unwrap().inserts.clone())
    }

    async fn delete(&self, _session: &Session, _table: &str, _id: i64) -> Result<bool, PersistenceError> {
        Ok(false)
    }
}

pub fn test_settings(dir: &Path) -> PipelineSettings {
    PipelineSettings {
        scratch_dir: dir.join("scratch"),
        annotated_dir: dir.join("scratch/annotated"),
        bucket: "image_bucket".into(),
        table: "inspections".into(),
        metrics: ModelMetrics::default(),
        id_scheme: IdScheme::Legacy,
    }
}

pub fn make_pipeline<G: PersistenceGateway>(
    detector: Arc<StubDetector>,
    gateway: G,
    dir: &Path,
) -> InspectionPipeline<StubDetector, G> {
    InspectionPipeline::new(
        detector,
        gateway,
        ReportBuilder::new(dir.join("reports")),
        test_settings(dir),
    )
}

/// Local gateway in a temp dir, with the test admin configured.
/// Returns both the gateway and the temp directory (which must be kept alive).
pub async fn create_local_gateway() -> (LocalGateway, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let gateway = LocalGateway::open(
        dir.path().join("inspect.db"),
        dir.path().join("storage"),
        "file://storage",
    )
    .await
    .expect("Failed to open local gateway")
    .with_admin(Some(AdminCredential::from_password(ADMIN_EMAIL, ADMIN_PASSWORD)));
    (gateway, dir)
}

/// Log in as the fixture admin so query and delete accept the session.
pub async fn login_admin(gateway: &LocalGateway) -> Session {
    gateway
        .authenticate(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .expect("Failed to authenticate")
        .expect("Fixture admin rejected")
}

/// Result whose annotated image lives at `image`.
pub fn make_result(inspection_id: &str, detections: Vec<Detection>, image: PathBuf) -> InspectionResult {
    let max_confidence = detections
        .iter()
        .map(|d| d.confidence)
        .fold(0.0, f32::max);
    let risk_tier = marine_inspect::risk::classify(max_confidence, !detections.is_empty());
    InspectionResult {
        inspection_id: inspection_id.into(),
        file_name: "hull.png".into(),
        source_image: image.clone(),
        annotated_image: image,
        detections,
        max_confidence,
        risk_tier,
        inference_time_seconds: 0.42,
        model_metrics: ModelMetrics::default(),
        created_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
    }
}

pub fn make_record(inspection_id: &str, risk_level: RiskTier) -> InspectionRecord {
    InspectionRecord {
        inspection_id: inspection_id.into(),
        file_name: "hull.png".into(),
        detected_classes: vec!["corrosion".into()],
        highest_confidence: 0.7,
        risk_level,
        inference_time: 0.12,
        precision: 0.886,
        recall: 0.844,
        map50: 0.882,
        map5095: 0.782,
        image_url: Some("file://storage/image_bucket/a.png".into()),
        annotated_image_url: Some("file://storage/image_bucket/b.png".into()),
        pdf_url: Some("file://storage/image_bucket/c.pdf".into()),
        status: InspectionStatus::Completed,
        created_at: None,
        id: None,
    }
}
