use ab_glyph::FontVec;
use image::ImageReader;
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;
use std::path::Path;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::detection::postprocess::{self, HeadLayout};
use crate::detection::{
    annotate, annotated_path_for, preprocessing, validate_threshold, DetectionError, DetectionOutput,
    Detector,
};
use crate::models::{BoundingBox, Detection};

/// YOLO-family detector running a converted `.rten` model.
///
/// The model is loaded once and never reloaded. `Model::run` takes `&self` and
/// `Model` is `Sync`, so one instance serves concurrent inspections without a lock.
pub struct YoloDetector {
    model: Model,
    class_names: Vec<String>,
    input_size: u32,
    iou_threshold: f32,
    max_detections: usize,
    font: Option<FontVec>,
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("class_names", &self.class_names)
            .field("input_size", &self.input_size)
            .field("iou_threshold", &self.iou_threshold)
            .field("max_detections", &self.max_detections)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl YoloDetector {
    /// Load the model named by the deployment config. Any failure here means no
    /// inspection can run, so callers treat it as fatal at startup.
    pub fn load(config: &DetectorConfig) -> Result<Self, DetectionError> {
        let model_path = &config.model_path;
        if !model_path.is_file() {
            return Err(DetectionError::ModelLoad {
                path: model_path.clone(),
                reason: "model file not found".into(),
            });
        }

        let model = Model::load_file(model_path).map_err(|e| DetectionError::ModelLoad {
            path: model_path.clone(),
            reason: e.to_string(),
        })?;

        let font = match &config.label_font {
            Some(path) => Some(load_font(path)?),
            None => None,
        };

        debug!(model = %model_path.display(), classes = config.class_names.len(), "detector loaded");

        Ok(Self {
            model,
            class_names: config.class_names.clone(),
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
            font,
        })
    }

    fn class_name(&self, index: usize) -> String {
        self.class_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", index))
    }

    fn infer(
        &self,
        img: &image::DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, DetectionError> {
        let (data, geometry) = preprocessing::letterbox(img, self.input_size);
        let side = self.input_size as usize;
        let input = NdTensor::from_data([1, 3, side, side], data);

        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let output: NdTensor<f32, 3> = output
            .try_into()
            .map_err(|e| DetectionError::Inference(format!("unexpected output tensor: {:?}", e)))?;

        let (dim1, dim2) = (output.size(1), output.size(2));
        let layout = HeadLayout::resolve(dim1, dim2, self.class_names.len()).ok_or_else(|| {
            DetectionError::Inference(format!(
                "output head [{}, {}] does not match {} configured classes",
                dim1,
                dim2,
                self.class_names.len()
            ))
        })?;
        let flat = output.to_vec();
        let candidates = postprocess::decode(&flat, layout, confidence_threshold);
        debug!(candidates = candidates.len(), "decoded detection head");

        let kept = postprocess::non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        Ok(kept
            .into_iter()
            .map(|p| {
                let (x0, y0) = geometry.to_source(p.bbox.x, p.bbox.y);
                let (x1, y1) = geometry.to_source(p.bbox.x + p.bbox.width, p.bbox.y + p.bbox.height);
                Detection::new(
                    self.class_name(p.class_index),
                    p.confidence,
                    BoundingBox { x: x0, y: y0, width: x1 - x0, height: y1 - y0 },
                )
            })
            .collect())
    }
}

impl Detector for YoloDetector {
    fn detect(
        &self,
        image_path: &Path,
        confidence_threshold: f32,
        annotated_dir: &Path,
    ) -> Result<DetectionOutput, DetectionError> {
        let confidence_threshold = validate_threshold(confidence_threshold)?;

        let img = ImageReader::open(image_path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| DetectionError::ImageRead {
                path: image_path.to_path_buf(),
                reason: e.to_string(),
            })?
            .decode()
            .map_err(|e| DetectionError::ImageRead {
                path: image_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let detections = self.infer(&img, confidence_threshold)?;

        let annotated = annotate::annotate(&img, &detections, self.font.as_ref());
        let annotated_path = annotated_path_for(image_path, annotated_dir);
        std::fs::create_dir_all(annotated_dir)
            .map_err(|e| DetectionError::Annotate {
                path: annotated_path.clone(),
                reason: e.to_string(),
            })?;
        annotated
            .save(&annotated_path)
            .map_err(|e| DetectionError::Annotate {
                path: annotated_path.clone(),
                reason: e.to_string(),
            })?;

        Ok(DetectionOutput {
            detections,
            annotated_image: annotated_path,
        })
    }

    fn name(&self) -> &str {
        "YOLO (rten)"
    }
}

fn load_font(path: &Path) -> Result<FontVec, DetectionError> {
    let bytes = std::fs::read(path).map_err(|e| DetectionError::ModelLoad {
        path: path.to_path_buf(),
        reason: format!("label font: {}", e),
    })?;
    FontVec::try_from_vec(bytes).map_err(|e| DetectionError::ModelLoad {
        path: path.to_path_buf(),
        reason: format!("label font: {}", e),
    })
}
