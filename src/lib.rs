pub mod admin;
pub mod cli;
pub mod config;
pub mod core;
pub mod detection;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod risk;

pub use config::Config;
pub use detection::{Detector, YoloDetector};
pub use models::{BoundingBox, Detection, InspectionRecord, InspectionResult, RiskTier};
pub use pipeline::{InspectionOutcome, InspectionPipeline, PipelineError, Upload};
pub use report::{Report, ReportBuilder};
