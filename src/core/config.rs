use crate::core::capture::camera::CameraConfig;
use crate::core::capture::synthetic::SyntheticConfig;
use crate::core::error::InspectionError;
use crate::core::ml::enhancer::EnhancerConfig;
use crate::core::ml::pipeline::PipelineConfig;
use crate::scan::stats::StatsConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Service-wide settings. Missing sections fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionConfig {
    pub pipeline: PipelineConfig,
    pub camera: CameraConfig,
    pub synthetic: SyntheticConfig,
    pub enhancer: EnhancerConfig,
    pub stats: StatsConfig,
}

impl InspectionConfig {
    pub fn for_demo() -> Self {
        Self {
            synthetic: SyntheticConfig::for_demo(),
            ..Default::default()
        }
    }

    pub fn for_replay(frames_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            camera: CameraConfig::for_replay(frames_dir),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InspectionError> {
        let path = path.as_ref();
        info!("🔧 Loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let config: InspectionConfig = serde_json::from_str(&text)?;
        config.synthetic.validate()?;
        Ok(config)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), InspectionError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
