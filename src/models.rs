use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;

/// Axis-aligned box in source-image pixels: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        }
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// `[x, y, w, h]`, the shape the prediction output uses.
    pub fn as_xywh(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// One predicted object instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_label: class_label.into(),
            confidence,
            bbox,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Safe,
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Safe => "SAFE",
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SAFE" => Ok(RiskTier::Safe),
            "LOW" => Ok(RiskTier::Low),
            "MEDIUM" => Ok(RiskTier::Medium),
            "HIGH" => Ok(RiskTier::High),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

/// Quality figures of the deployed model, measured at training time.
/// Constant for a deployment; copied into every report and record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetrics {
    pub precision: f64,
    pub recall: f64,
    pub map50: f64,
    pub map50_95: f64,
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self {
            precision: 0.886,
            recall: 0.844,
            map50: 0.882,
            map50_95: 0.782,
        }
    }
}

/// Everything one pipeline run produces before persistence.
#[derive(Debug, Clone)]
pub struct InspectionResult {
    pub inspection_id: String,
    /// Name of the upload as the caller supplied it.
    pub file_name: String,
    pub source_image: PathBuf,
    pub annotated_image: PathBuf,
    pub detections: Vec<Detection>,
    pub max_confidence: f32,
    pub risk_tier: RiskTier,
    pub inference_time_seconds: f64,
    pub model_metrics: ModelMetrics,
    pub created_at: OffsetDateTime,
}

impl InspectionResult {
    /// Class labels in model output order.
    pub fn detected_classes(&self) -> Vec<String> {
        self.detections
            .iter()
            .map(|d| d.class_label.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionStatus {
    Completed,
}

impl InspectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Completed => "completed",
        }
    }
}

/// Persisted row of the `inspections` table. Field names are the column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub inspection_id: String,
    pub file_name: String,
    pub detected_classes: Vec<String>,
    pub highest_confidence: f64,
    pub risk_level: RiskTier,
    pub inference_time: f64,
    pub precision: f64,
    pub recall: f64,
    pub map50: f64,
    pub map5095: f64,
    pub image_url: Option<String>,
    pub annotated_image_url: Option<String>,
    pub pdf_url: Option<String>,
    pub status: InspectionStatus,
    /// Assigned by the store on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Assigned by the store on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

/// Public URLs of the three blobs a run uploads.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactUrls {
    pub image_url: String,
    pub annotated_image_url: String,
    pub pdf_url: String,
}

impl InspectionRecord {
    pub fn from_result(result: &InspectionResult, urls: ArtifactUrls) -> Self {
        Self {
            inspection_id: result.inspection_id.clone(),
            file_name: result.file_name.clone(),
            detected_classes: result.detected_classes(),
            highest_confidence: result.max_confidence as f64,
            risk_level: result.risk_tier,
            inference_time: result.inference_time_seconds,
            precision: result.model_metrics.precision,
            recall: result.model_metrics.recall,
            map50: result.model_metrics.map50,
            map5095: result.model_metrics.map50_95,
            image_url: Some(urls.image_url),
            annotated_image_url: Some(urls.annotated_image_url),
            pdf_url: Some(urls.pdf_url),
            status: InspectionStatus::Completed,
            created_at: None,
            id: None,
        }
    }
}
