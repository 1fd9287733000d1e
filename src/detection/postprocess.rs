use crate::models::BoundingBox;

/// One candidate box straight out of the model head, in model input space.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub class_index: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Layout of a YOLO detection head output `[1, 4 + classes, anchors]`,
/// or `[1, anchors, 4 + classes]` when the export transposed it.
#[derive(Debug, Clone, Copy)]
pub struct HeadLayout {
    pub attributes: usize,
    pub anchors: usize,
    pub transposed: bool,
}

impl HeadLayout {
    /// Layout for a head with `class_count` classes, matched against the two
    /// trailing dimensions. `None` when neither dimension is `4 + class_count`.
    /// With no known classes this falls back to [`HeadLayout::from_dims`].
    pub fn resolve(dim1: usize, dim2: usize, class_count: usize) -> Option<Self> {
        if class_count == 0 {
            return Some(Self::from_dims(dim1, dim2));
        }
        let attributes = 4 + class_count;
        if dim1 == attributes {
            Some(Self { attributes, anchors: dim2, transposed: false })
        } else if dim2 == attributes {
            Some(Self { attributes, anchors: dim1, transposed: true })
        } else {
            None
        }
    }

    /// Guess the layout from the two trailing dimensions alone, assuming
    /// anchors outnumber attributes.
    pub fn from_dims(dim1: usize, dim2: usize) -> Self {
        if dim1 <= dim2 {
            Self { attributes: dim1, anchors: dim2, transposed: false }
        } else {
            Self { attributes: dim2, anchors: dim1, transposed: true }
        }
    }

    fn value(&self, output: &[f32], attribute: usize, anchor: usize) -> f32 {
        if self.transposed {
            output[anchor * self.attributes + attribute]
        } else {
            output[attribute * self.anchors + anchor]
        }
    }
}

/// Pick the best class per anchor and keep anchors whose score is at least
/// `confidence_threshold`.
pub fn decode(output: &[f32], layout: HeadLayout, confidence_threshold: f32) -> Vec<RawPrediction> {
    if layout.attributes <= 4 || output.len() < layout.attributes * layout.anchors {
        return Vec::new();
    }

    let mut predictions = Vec::new();
    for anchor in 0..layout.anchors {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for class_index in 0..layout.attributes - 4 {
            let score = layout.value(output, 4 + class_index, anchor);
            if score > best_score {
                best_score = score;
                best_class = class_index;
            }
        }

        if best_score < confidence_threshold {
            continue;
        }

        let cx = layout.value(output, 0, anchor);
        let cy = layout.value(output, 1, anchor);
        let w = layout.value(output, 2, anchor);
        let h = layout.value(output, 3, anchor);

        predictions.push(RawPrediction {
            class_index: best_class,
            confidence: best_score,
            bbox: BoundingBox::from_center(cx, cy, w, h),
        });
    }

    predictions
}

/// Per-class greedy NMS. Output is sorted by descending confidence and
/// capped at `max_detections`.
pub fn non_max_suppression(
    mut predictions: Vec<RawPrediction>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawPrediction> {
    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawPrediction> = Vec::new();
    for candidate in predictions {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_index == candidate.class_index && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
