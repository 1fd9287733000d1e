//! Content of an inspection report, independent of the PDF backend.

use std::path::PathBuf;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use super::ReportBuildError;
use crate::models::InspectionResult;

pub const TITLE: &str = "Underwater Inspection Report";
pub const DETECTIONS_HEADER: [&str; 2] = ["Class", "Confidence"];

/// Printed size of the annotated image (5in x 4in).
pub const IMAGE_WIDTH_MM: f32 = 127.0;
pub const IMAGE_HEIGHT_MM: f32 = 101.6;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Row labels of the summary table, in print order.
pub const SUMMARY_LABELS: [&str; 8] = [
    "Inspection ID",
    "Date",
    "Risk Level",
    "Inference Time",
    "Precision",
    "Recall",
    "mAP@0.5",
    "mAP@0.5-95",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRow {
    pub class_label: String,
    /// Rounded to two decimals.
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    pub title: &'static str,
    pub summary: Vec<SummaryRow>,
    /// `None` when nothing was detected; the table is left out entirely.
    pub detections: Option<Vec<DetectionRow>>,
    pub image: PathBuf,
}

pub fn format_timestamp(ts: &OffsetDateTime) -> Result<String, time::error::Format> {
    ts.format(DATE_FORMAT)
}

/// Build the fixed-order report content for `result`.
pub fn build_layout(result: &InspectionResult) -> Result<ReportLayout, ReportBuildError> {
    let metrics = &result.model_metrics;
    let values = [
        result.inspection_id.clone(),
        format_timestamp(&result.created_at)?,
        result.risk_tier.to_string(),
        format!("{:.2} sec", result.inference_time_seconds),
        metrics.precision.to_string(),
        metrics.recall.to_string(),
        metrics.map50.to_string(),
        metrics.map50_95.to_string(),
    ];

    let summary = SUMMARY_LABELS
        .into_iter()
        .zip(values)
        .map(|(label, value)| SummaryRow { label, value })
        .collect();

    let detections = if result.detections.is_empty() {
        None
    } else {
        Some(
            result
                .detections
                .iter()
                .map(|d| DetectionRow {
                    class_label: d.class_label.clone(),
                    confidence: format!("{:.2}", d.confidence),
                })
                .collect(),
        )
    };

    Ok(ReportLayout {
        title: TITLE,
        summary,
        detections,
        image: result.annotated_image.clone(),
    })
}
