use crate::models::{Detection, RiskTier};

const HIGH_THRESHOLD: f32 = 0.85;
const MEDIUM_THRESHOLD: f32 = 0.60;

/// Map the worst-case detection confidence to a risk tier.
///
/// Both thresholds are strict: exactly 0.85 is `Medium`, exactly 0.60 is `Low`.
/// Without detections the tier is always `Safe`, whatever `max_confidence` says.
pub fn classify(max_confidence: f32, has_detections: bool) -> RiskTier {
    if !has_detections {
        RiskTier::Safe
    } else if max_confidence > HIGH_THRESHOLD {
        RiskTier::High
    } else if max_confidence > MEDIUM_THRESHOLD {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

/// Highest confidence among `detections`, `0.0` when empty.
pub fn max_confidence(detections: &[Detection]) -> f32 {
    detections
        .iter()
        .map(|d| d.confidence)
        .fold(0.0, f32::max)
}

/// Convenience for the pipeline: `(max_confidence, tier)` in one pass.
pub fn assess(detections: &[Detection]) -> (f32, RiskTier) {
    let max = max_confidence(detections);
    (max, classify(max, !detections.is_empty()))
}
