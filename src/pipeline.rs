//! One inspection run: `Received → Detected → Classified → Reported → Persisted`.
//!
//! A run is a single sequential flow. Failure in any state before
//! `Persisted` aborts the run; a persistence failure still hands the report
//! back to the caller together with the blobs it left behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, IdScheme};
use crate::core::gateway::{PersistenceError, PersistenceGateway};
use crate::detection::{validate_threshold, DetectionError, Detector};
use crate::models::{ArtifactUrls, InspectionRecord, InspectionResult, ModelMetrics};
use crate::report::{Report, ReportBuildError, ReportBuilder};
use crate::risk;

/// Image handed in by the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self { file_name, bytes })
    }

    fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Received,
    Detected,
    Classified,
    Reported,
    Persisted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Received => "received",
            RunState::Detected => "detected",
            RunState::Classified => "classified",
            RunState::Reported => "reported",
            RunState::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to write upload to scratch {path:?}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Detection(#[from] DetectionError),

    /// Detection and classification finished; only the report failed.
    #[error("Report generation failed for {}: {source}", .result.inspection_id)]
    Report {
        result: Box<InspectionResult>,
        #[source]
        source: ReportBuildError,
    },

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Last state the run reached before failing.
    pub fn reached(&self) -> Option<RunState> {
        match self {
            PipelineError::Scratch { .. } => None,
            PipelineError::Detection(_) | PipelineError::Task(_) => Some(RunState::Received),
            PipelineError::Report { .. } => Some(RunState::Classified),
        }
    }
}

/// How the `Persisted` step ended.
#[derive(Debug)]
pub enum Persistence {
    Stored(InspectionRecord),
    /// Uploads and the insert are independent calls; whatever was uploaded
    /// before the failure stays in the bucket with no row pointing at it.
    Failed {
        error: PersistenceError,
        orphaned_urls: Vec<String>,
    },
}

impl Persistence {
    pub fn is_stored(&self) -> bool {
        matches!(self, Persistence::Stored(_))
    }

    pub fn record(&self) -> Option<&InspectionRecord> {
        match self {
            Persistence::Stored(record) => Some(record),
            Persistence::Failed { .. } => None,
        }
    }
}

/// A run that got through reporting. The report is delivered whatever
/// happened to persistence.
#[derive(Debug)]
pub struct InspectionOutcome {
    pub result: InspectionResult,
    pub report: Report,
    pub persistence: Persistence,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub scratch_dir: PathBuf,
    pub annotated_dir: PathBuf,
    pub bucket: String,
    pub table: String,
    pub metrics: ModelMetrics,
    pub id_scheme: IdScheme,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scratch_dir: config.pipeline.scratch_dir.clone(),
            annotated_dir: config.pipeline.annotated_dir.clone(),
            bucket: config.storage.bucket.clone(),
            table: config.storage.table.clone(),
            metrics: config.metrics,
            id_scheme: config.pipeline.id_scheme,
        }
    }
}

pub struct InspectionPipeline<D, G> {
    detector: Arc<D>,
    gateway: G,
    reports: ReportBuilder,
    settings: PipelineSettings,
}

impl<D, G> InspectionPipeline<D, G>
where
    D: Detector + 'static,
    G: PersistenceGateway,
{
    pub fn new(detector: Arc<D>, gateway: G, reports: ReportBuilder, settings: PipelineSettings) -> Self {
        Self {
            detector,
            gateway,
            reports,
            settings,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one inspection. `confidence_threshold` must be in `(0, 1]`; there is
    /// no default at this level.
    pub async fn run(
        &self,
        upload: Upload,
        confidence_threshold: f32,
    ) -> Result<InspectionOutcome, PipelineError> {
        let threshold = validate_threshold(confidence_threshold)?;

        // Received
        let source_image = self.save_to_scratch(&upload).await?;
        let inspection_id = generate_inspection_id(self.settings.id_scheme);
        info!(
            %inspection_id,
            state = %RunState::Received,
            file = %upload.file_name,
            threshold,
            "upload received"
        );

        // Detected
        let detector = Arc::clone(&self.detector);
        let image = source_image.clone();
        let annotated_dir = self.settings.annotated_dir.clone();
        let (output, elapsed) = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let output = detector.detect(&image, threshold, &annotated_dir);
            (output, started.elapsed().as_secs_f64())
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?;
        let output = output?;
        let inference_time_seconds = round2(elapsed);
        info!(
            %inspection_id,
            state = %RunState::Detected,
            detector = self.detector.name(),
            detections = output.detections.len(),
            inference_time_seconds,
            "detection finished"
        );

        // Classified
        let (max_confidence, risk_tier) = risk::assess(&output.detections);
        info!(%inspection_id, state = %RunState::Classified, max_confidence, %risk_tier, "risk classified");

        let result = InspectionResult {
            inspection_id,
            file_name: upload.file_name,
            source_image,
            annotated_image: output.annotated_image,
            detections: output.detections,
            max_confidence,
            risk_tier,
            inference_time_seconds,
            model_metrics: self.settings.metrics,
            created_at: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
        };

        // Reported
        let reports = self.reports.clone();
        let snapshot = result.clone();
        let built = tokio::task::spawn_blocking(move || reports.build(&snapshot))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;
        let report = match built {
            Ok(report) => report,
            Err(source) => {
                return Err(PipelineError::Report {
                    result: Box::new(result),
                    source,
                });
            }
        };
        info!(
            inspection_id = %result.inspection_id,
            state = %RunState::Reported,
            report = ?report.path(),
            "report built"
        );

        // Persisted
        let persistence = self.persist(&result, &report).await;
        match &persistence {
            Persistence::Stored(record) => info!(
                inspection_id = %result.inspection_id,
                state = %RunState::Persisted,
                id = ?record.id,
                "inspection stored"
            ),
            Persistence::Failed {
                error,
                orphaned_urls,
            } => {
                warn!(inspection_id = %result.inspection_id, "persistence failed: {}", error);
                for url in orphaned_urls {
                    warn!(inspection_id = %result.inspection_id, %url, "orphaned blob left in storage");
                }
            }
        }

        Ok(InspectionOutcome {
            result,
            report,
            persistence,
        })
    }

    async fn save_to_scratch(&self, upload: &Upload) -> Result<PathBuf, PipelineError> {
        let file_name = match upload.extension() {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.settings.scratch_dir.join(file_name);

        tokio::fs::create_dir_all(&self.settings.scratch_dir)
            .await
            .map_err(|source| PipelineError::Scratch {
                path: self.settings.scratch_dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|source| PipelineError::Scratch {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    async fn persist(&self, result: &InspectionResult, report: &Report) -> Persistence {
        let mut uploaded = Vec::with_capacity(3);
        let stored = async {
            let image_url = self.upload_tracked(&result.source_image, &mut uploaded).await?;
            let annotated_image_url = self
                .upload_tracked(&result.annotated_image, &mut uploaded)
                .await?;
            let pdf_url = self.upload_tracked(report.path(), &mut uploaded).await?;

            let record = InspectionRecord::from_result(
                result,
                ArtifactUrls {
                    image_url,
                    annotated_image_url,
                    pdf_url,
                },
            );
            self.gateway.insert(&self.settings.table, &record).await
        }
        .await;

        match stored {
            Ok(record) => Persistence::Stored(record),
            Err(error) => Persistence::Failed {
                error,
                orphaned_urls: uploaded,
            },
        }
    }

    async fn upload_tracked(
        &self,
        path: &Path,
        uploaded: &mut Vec<String>,
    ) -> Result<String, PersistenceError> {
        let url = self.gateway.upload(&self.settings.bucket, path).await?;
        uploaded.push(url.clone());
        Ok(url)
    }
}

/// `INS-` + id. `Legacy` draws four digits from 1000..=9999, so collisions
/// are possible across runs.
pub fn generate_inspection_id(scheme: IdScheme) -> String {
    match scheme {
        IdScheme::Legacy => {
            let n = Uuid::new_v4().as_u128() % 9000 + 1000;
            format!("INS-{}", n)
        }
        IdScheme::TimeOrdered => format!("INS-{}", Uuid::now_v7()),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
