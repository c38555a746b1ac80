//! Weight loading for the classification heads
//!
//! `.onnx` artifacts run on ONNX Runtime. `.json` artifacts and the built-in
//! fallback are linear placeholder heads for demos and tests.

use crate::core::ml::defect::DEFECT_CLASSES;
use crate::core::ml::error::ModelError;
use crate::core::ml::fabric::FABRIC_CLASSES;
use crate::core::ml::model::{ClassificationModel, LinearModel, LinearWeights};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "onnx")]
use crate::core::ml::onnx::OnnxModel;

/// Input side the exported CNN heads expect.
pub const DEFAULT_INPUT_SIZE: u32 = 224;
const FALLBACK_INPUT_SIZE: u32 = 32;
const FALLBACK_SEED: u64 = 0x7e57_11e5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelHead {
    Defect,
    Fabric,
}

impl ModelHead {
    pub fn labels(&self) -> Vec<String> {
        let labels: &[&str] = match self {
            ModelHead::Defect => &DEFECT_CLASSES,
            ModelHead::Fabric => &FABRIC_CLASSES,
        };
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn fallback_name(&self) -> &'static str {
        match self {
            ModelHead::Defect => "defect-fallback",
            ModelHead::Fabric => "fabric-fallback",
        }
    }
}

static DEFECT_FALLBACK: Lazy<LinearWeights> = Lazy::new(|| fallback_weights(ModelHead::Defect));
static FABRIC_FALLBACK: Lazy<LinearWeights> = Lazy::new(|| fallback_weights(ModelHead::Fabric));

/// Small random head. The defect head leans towards "Clean".
fn fallback_weights(head: ModelHead) -> LinearWeights {
    let labels = head.labels();
    let seed = match head {
        ModelHead::Defect => FALLBACK_SEED,
        ModelHead::Fabric => FALLBACK_SEED + 1,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let input_len = 3 * (FALLBACK_INPUT_SIZE * FALLBACK_INPUT_SIZE) as usize;

    let weights = labels
        .iter()
        .map(|_| (0..input_len).map(|_| rng.gen_range(-0.002f32..0.002)).collect())
        .collect();
    let bias = (0..labels.len())
        .map(|i| match head {
            ModelHead::Defect if i == 0 => 3.0,
            _ => 0.0,
        })
        .collect();

    LinearWeights {
        name: head.fallback_name().to_string(),
        input_size: FALLBACK_INPUT_SIZE,
        labels,
        weights,
        bias,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WeightsSource {
    Artifact(PathBuf),
    Fallback,
}

pub struct LoadedModel {
    pub model: Arc<dyn ClassificationModel>,
    pub labels: Vec<String>,
    pub source: WeightsSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ArtifactFormat {
    Onnx,
    LinearJson,
}

impl ArtifactFormat {
    fn of(path: &Path) -> Result<Self, ModelError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("onnx") => Ok(Self::Onnx),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::LinearJson),
            _ => Err(ModelError::load_weights(
                path.display().to_string(),
                "unsupported artifact, expected .onnx or .json",
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelProvider {
    pub weights_path: Option<PathBuf>,
    /// Square input side for ONNX artifacts.
    pub input_size: u32,
    pub threads: usize,
}

impl Default for ModelProvider {
    fn default() -> Self {
        Self::fallback()
    }
}

impl ModelProvider {
    pub fn new(weights_path: Option<PathBuf>) -> Self {
        Self {
            weights_path,
            input_size: DEFAULT_INPUT_SIZE,
            threads: num_cpus::get().min(4),
        }
    }

    pub fn fallback() -> Self {
        Self::new(None)
    }

    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Loads the artifact when a path is configured, otherwise the built-in head.
    /// A configured path that cannot be loaded is an error.
    pub fn load(&self, head: ModelHead) -> Result<LoadedModel, ModelError> {
        match &self.weights_path {
            Some(path) => {
                info!("🔧 Loading {:?} weights from: {}", head, path.display());
                let loaded = match ArtifactFormat::of(path)? {
                    ArtifactFormat::Onnx => self.load_onnx(head, path),
                    ArtifactFormat::LinearJson => Self::load_linear(head, path),
                };
                loaded.map_err(|e| {
                    error!("❌ Failed to load {:?} weights: {}", head, e);
                    e
                })
            }
            None => {
                warn!("No {:?} weights configured, using built-in placeholder head", head);
                let weights = match head {
                    ModelHead::Defect => DEFECT_FALLBACK.clone(),
                    ModelHead::Fabric => FABRIC_FALLBACK.clone(),
                };
                let labels = weights.labels.clone();
                let model = LinearModel::new(weights)?;
                info!("✅ {:?} fallback model ready", head);
                Ok(LoadedModel {
                    model: Arc::new(model),
                    labels,
                    source: WeightsSource::Fallback,
                })
            }
        }
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, head: ModelHead, path: &Path) -> Result<LoadedModel, ModelError> {
        let labels = head.labels();
        let model = OnnxModel::load(path, self.input_size, labels.len(), self.threads)?;
        info!("✅ {:?} model '{}' loaded", head, model.name());
        Ok(LoadedModel {
            model: Arc::new(model),
            labels,
            source: WeightsSource::Artifact(path.to_path_buf()),
        })
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, _head: ModelHead, path: &Path) -> Result<LoadedModel, ModelError> {
        Err(ModelError::load_weights(
            path.display().to_string(),
            "built without the `onnx` feature",
        ))
    }

    fn load_linear(head: ModelHead, path: &Path) -> Result<LoadedModel, ModelError> {
        let weights = LinearWeights::from_json_file(path)?;
        let expected = head.labels().len();
        if weights.labels.len() != expected {
            return Err(ModelError::shape_mismatch(
                format!("{} labels", expected),
                weights.labels.len().to_string(),
            ));
        }

        let labels = weights.labels.clone();
        let model = LinearModel::new(weights)?;
        info!("✅ {:?} placeholder model '{}' loaded", head, model.name());
        Ok(LoadedModel {
            model: Arc::new(model),
            labels,
            source: WeightsSource::Artifact(path.to_path_buf()),
        })
    }
}
