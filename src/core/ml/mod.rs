pub mod defect;
pub mod enhancer;
pub mod error;
pub mod fabric;
pub mod features;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod provider;
pub mod transforms;

pub use defect::{DefectDetector, DefectPrediction, DEFECT_CLASSES};
pub use enhancer::{EnhancerConfig, HeuristicEnhancer, Severity};
pub use error::ModelError;
pub use fabric::{FabricClassifier, FabricPrediction, FABRIC_CLASSES};
pub use features::{FeatureExtractor, FeatureSet};
pub use model::{ClassificationModel, LinearModel, LinearWeights, MockModel};
pub use pipeline::{Inspection, InspectionFailure, Inspector, ModelInfo, PerformanceStats, Pipeline, PipelineConfig, SimulatedInspector};
#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;
pub use provider::{LoadedModel, ModelHead, ModelProvider, WeightsSource, DEFAULT_INPUT_SIZE};
