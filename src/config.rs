use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Approximate kg of CO2 saved per correctly sorted item.
pub const DEFAULT_KG_CO2_PER_ITEM: f64 = 0.5;

/// Pipeline configuration. All fields have working defaults so the
/// pipeline runs without a config file present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory for the entry database and the artifact content
    /// directory.
    pub data_dir: PathBuf,
    /// ONNX model file. When absent the classifier always takes the
    /// fallback path.
    pub model_path: Option<PathBuf>,
    /// Model input edge length in pixels.
    pub crop_size: u32,
    /// Per-item constant for the environmental impact estimate.
    pub kg_co2_per_item: f64,
    /// Source directory for the directory-backed capture device.
    pub capture_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            data_dir: PathBuf::from("waste-lens-data"),
            model_path: None,
            crop_size: 224,
            kg_co2_per_item: DEFAULT_KG_CO2_PER_ITEM,
            capture_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file. A missing file yields the defaults;
    /// a malformed file is a hard error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(PipelineConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }
}
