use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::ModelMetrics;

/// Overrides `remote.api_key` when set.
pub const REMOTE_KEY_ENV: &str = "MARINE_INSPECT_REMOTE_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub metrics: ModelMetrics,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `path` if given, else `./marine-inspect.toml` if present, else defaults.
    /// Environment overrides are applied last.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::load(p)?,
            None => {
                let default = PathBuf::from("marine-inspect.toml");
                if default.is_file() {
                    Self::load(&default)?
                } else {
                    Self::default()
                }
            }
        };
        if let Ok(key) = std::env::var(REMOTE_KEY_ENV) {
            if !key.trim().is_empty() {
                cfg.remote.api_key = Some(key);
            }
        }
        Ok(cfg)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.pipeline.default_confidence;
        if !(t > 0.0 && t <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.default_confidence must be in (0, 1], got {}",
                t
            )));
        }
        if self.detector.input_size == 0 || self.detector.input_size % 32 != 0 {
            return Err(ConfigError::Invalid(format!(
                "detector.input_size must be a positive multiple of 32, got {}",
                self.detector.input_size
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detector.iou_threshold must be in [0, 1], got {}",
                self.detector.iou_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Deployment setting, never user input.
    pub model_path: PathBuf,
    /// Index-aligned with the model's class outputs.
    pub class_names: Vec<String>,
    pub input_size: u32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// TTF/OTF used for box labels on the annotated image.
    pub label_font: Option<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "best.rten".into(),
            class_names: Vec::new(),
            input_size: 640,
            iou_threshold: 0.7,
            max_detections: 300,
            label_font: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    /// `INS-` plus four random digits.
    #[default]
    Legacy,
    /// `INS-` plus a UUID v7.
    TimeOrdered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub default_confidence: f32,
    pub scratch_dir: PathBuf,
    pub annotated_dir: PathBuf,
    pub report_dir: PathBuf,
    pub id_scheme: IdScheme,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_confidence: 0.25,
            scratch_dir: "scratch".into(),
            annotated_dir: "scratch/annotated".into(),
            report_dir: "reports".into(),
            id_scheme: IdScheme::Legacy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    pub bucket: String,
    pub table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            bucket: "image_bucket".into(),
            table: "inspections".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub database: PathBuf,
    pub blob_dir: PathBuf,
    /// Prefix for URLs handed out for stored blobs.
    pub public_base_url: String,
    pub admin_email: Option<String>,
    /// Hex SHA-256 of the admin password.
    pub admin_password_sha256: Option<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            database: "marine-inspect.db".into(),
            blob_dir: "storage".into(),
            public_base_url: "file://storage".into(),
            admin_email: None,
            admin_password_sha256: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Project URL, e.g. `https://<project>.supabase.co`.
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let cfg = Config::default();
        assert_eq!(cfg.pipeline.default_confidence, 0.25);
        assert_eq!(cfg.storage.bucket, "image_bucket");
        assert_eq!(cfg.storage.table, "inspections");
        assert_eq!(cfg.metrics.precision, 0.886);
        assert_eq!(cfg.metrics.map50_95, 0.782);
        assert_eq!(cfg.pipeline.id_scheme, IdScheme::Legacy);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let raw = r#"
            [detector]
            model_path = "models/hull.rten"
            class_names = ["hull_crack", "corrosion"]

            [pipeline]
            id_scheme = "time_ordered"

            [storage]
            backend = "remote"
        "#;
        let cfg = Config::from_toml(raw).expect("parse TOML");
        assert_eq!(cfg.detector.model_path, PathBuf::from("models/hull.rten"));
        assert_eq!(cfg.detector.class_names.len(), 2);
        assert_eq!(cfg.detector.input_size, 640);
        assert_eq!(cfg.pipeline.id_scheme, IdScheme::TimeOrdered);
        assert_eq!(cfg.storage.backend, Backend::Remote);
        assert_eq!(cfg.storage.bucket, "image_bucket");
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut cfg = Config::default();
        cfg.pipeline.default_confidence = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        cfg.pipeline.default_confidence = 1.5;
        assert!(cfg.validate().is_err());
    }
}
