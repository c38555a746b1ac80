//! Dual-model inspection pipeline shared by all runs.

use crate::core::capture::frame::Frame;
use crate::core::error::InspectionError;
use crate::core::ml::defect::{DefectDetector, DefectPrediction, DEFECT_CLASSES};
use crate::core::ml::enhancer::{Enhancement, EnhancerConfig, HeuristicEnhancer};
use crate::core::ml::error::ModelError;
use crate::core::ml::fabric::{FabricClassifier, FabricPrediction, FABRIC_CLASSES};
use crate::core::ml::features::{
    FeatureExtractor, FeatureSet, DEFAULT_EDGE_THRESHOLD, DEFAULT_WEAVE_EDGE_THRESHOLD,
};
use crate::core::ml::model::ClassificationModel;
use crate::core::ml::provider::{ModelHead, ModelProvider, WeightsSource, DEFAULT_INPUT_SIZE};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub defect_weights: Option<PathBuf>,
    pub fabric_weights: Option<PathBuf>,
    /// Square input side of ONNX heads.
    pub model_input_size: u32,
    pub edge_threshold: u8,
    pub weave_edge_threshold: u8,
    /// 0 picks `num_cpus`, capped at 4.
    pub batch_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            defect_weights: None,
            fabric_weights: None,
            model_input_size: DEFAULT_INPUT_SIZE,
            edge_threshold: DEFAULT_EDGE_THRESHOLD,
            weave_edge_threshold: DEFAULT_WEAVE_EDGE_THRESHOLD,
            batch_threads: 0,
        }
    }
}

impl PipelineConfig {
    fn provider(&self, weights: &Option<PathBuf>) -> ModelProvider {
        ModelProvider::new(weights.clone())
            .with_input_size(self.model_input_size)
            .with_threads(self.batch_threads())
    }

    pub fn batch_threads(&self) -> usize {
        if self.batch_threads == 0 {
            num_cpus::get().min(4)
        } else {
            self.batch_threads
        }
    }
}

/// Everything learned about one frame.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub enhanced: Enhancement,
    pub features: FeatureSet,
    pub latency_ms: f64,
}

/// Why a frame produced no inspection.
#[derive(Debug)]
pub enum InspectionFailure {
    /// The frame itself is unusable; nothing was measured.
    Rejected(String),
    /// Inference failed after the classical features were measured.
    Degraded {
        error: InspectionError,
        features: FeatureSet,
    },
}

impl InspectionFailure {
    fn rejected(error: InspectionError) -> Self {
        match error {
            InspectionError::InvalidFrame(reason) => Self::Rejected(reason),
            other => Self::Rejected(other.to_string()),
        }
    }
}

impl From<InspectionFailure> for InspectionError {
    fn from(failure: InspectionFailure) -> Self {
        match failure {
            InspectionFailure::Rejected(reason) => InspectionError::InvalidFrame(reason),
            InspectionFailure::Degraded { error, .. } => error,
        }
    }
}

/// Turns a frame into an inspection. `threshold` is on the 0-1 scale.
pub trait Inspector: Send + Sync {
    fn inspect(&self, frame: &Frame, threshold: f32) -> Result<Inspection, InspectionFailure>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceStats {
    pub total_frames: u64,
    pub total_inference_ms: f64,
    pub average_inference_ms: f64,
    pub estimated_fps: f64,
}

impl PerformanceStats {
    fn record(&mut self, latency_ms: f64) {
        self.total_frames += 1;
        self.total_inference_ms += latency_ms;
        self.average_inference_ms = self.total_inference_ms / self.total_frames as f64;
        self.estimated_fps = if self.average_inference_ms > 0.0 {
            1000.0 / self.average_inference_ms
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub defect_model: String,
    pub defect_source: WeightsSource,
    pub defect_classes: Vec<String>,
    pub fabric_model: String,
    pub fabric_source: WeightsSource,
    pub fabric_classes: Vec<String>,
    pub feature_enhancement: bool,
}

pub struct Pipeline {
    defect: DefectDetector,
    fabric: FabricClassifier,
    features: FeatureExtractor,
    enhancer: HeuristicEnhancer,
    defect_source: WeightsSource,
    fabric_source: WeightsSource,
    batch_threads: usize,
    perf: Mutex<PerformanceStats>,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig, enhancer: EnhancerConfig) -> Result<Self, ModelError> {
        info!("🔧 Building inspection pipeline");

        let defect = config.provider(&config.defect_weights).load(ModelHead::Defect)?;
        let fabric = config.provider(&config.fabric_weights).load(ModelHead::Fabric)?;

        let pipeline = Self {
            defect: DefectDetector::with_labels(defect.model, defect.labels),
            fabric: FabricClassifier::with_labels(fabric.model, fabric.labels),
            features: FeatureExtractor::with_thresholds(
                config.edge_threshold,
                config.weave_edge_threshold,
            ),
            enhancer: HeuristicEnhancer::with_config(enhancer),
            defect_source: defect.source,
            fabric_source: fabric.source,
            batch_threads: config.batch_threads(),
            perf: Mutex::new(PerformanceStats::default()),
        };

        info!(
            "✅ Pipeline ready (defect: {:?}, fabric: {:?})",
            pipeline.defect_source, pipeline.fabric_source
        );
        Ok(pipeline)
    }

    /// Pipeline over already constructed models with the default label sets.
    pub fn from_models(
        defect: Arc<dyn ClassificationModel>,
        fabric: Arc<dyn ClassificationModel>,
        enhancer: EnhancerConfig,
    ) -> Self {
        Self {
            defect: DefectDetector::new(defect),
            fabric: FabricClassifier::new(fabric),
            features: FeatureExtractor::new(),
            enhancer: HeuristicEnhancer::with_config(enhancer),
            defect_source: WeightsSource::Fallback,
            fabric_source: WeightsSource::Fallback,
            batch_threads: PipelineConfig::default().batch_threads(),
            perf: Mutex::new(PerformanceStats::default()),
        }
    }

    pub fn inspect_frame(&self, frame: &Frame, threshold: f32) -> Result<Inspection, InspectionError> {
        self.inspect_measured(frame, threshold).map_err(InspectionError::from)
    }

    /// Like `inspect_frame`, but a model failure keeps the measured features.
    pub fn inspect_measured(
        &self,
        frame: &Frame,
        threshold: f32,
    ) -> Result<Inspection, InspectionFailure> {
        let start = Instant::now();

        let features = self
            .features
            .extract(frame)
            .map_err(InspectionFailure::rejected)?;
        let degraded = |error| InspectionFailure::Degraded { error, features };
        let defect = self.defect.detect(frame).map_err(degraded)?;
        let fabric = self.fabric.classify(frame).map_err(degraded)?;
        let enhanced = self.enhancer.apply(defect, fabric, &features, threshold);

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        if let Ok(mut perf) = self.perf.lock() {
            perf.record(latency_ms);
        }
        debug!(
            "Frame {} -> {} ({:.1}) / {} in {:.2} ms",
            frame.frame_id(),
            enhanced.defect.class_name,
            enhanced.defect.confidence,
            enhanced.fabric.class_name,
            latency_ms
        );

        Ok(Inspection {
            enhanced,
            features,
            latency_ms,
        })
    }

    /// Offline batch inspection, results in input order.
    pub fn inspect_batch(
        &self,
        frames: &[Frame],
        threshold: f32,
    ) -> Vec<Result<Inspection, InspectionError>> {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.batch_threads)
            .build()
        {
            Ok(pool) => pool.install(|| {
                frames
                    .par_iter()
                    .map(|f| self.inspect_frame(f, threshold))
                    .collect()
            }),
            Err(e) => {
                warn!("Batch pool unavailable ({}), inspecting sequentially", e);
                frames
                    .iter()
                    .map(|f| self.inspect_frame(f, threshold))
                    .collect()
            }
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            defect_model: self.defect.model_name().to_string(),
            defect_source: self.defect_source.clone(),
            defect_classes: self.defect.labels().to_vec(),
            fabric_model: self.fabric.model_name().to_string(),
            fabric_source: self.fabric_source.clone(),
            fabric_classes: self.fabric.labels().to_vec(),
            feature_enhancement: true,
        }
    }

    pub fn performance(&self) -> PerformanceStats {
        self.perf.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn reset_performance(&self) {
        if let Ok(mut perf) = self.perf.lock() {
            *perf = PerformanceStats::default();
        }
    }
}

impl Inspector for Pipeline {
    fn inspect(&self, frame: &Frame, threshold: f32) -> Result<Inspection, InspectionFailure> {
        self.inspect_measured(frame, threshold)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        info!("🗑️ Pipeline: releasing models");
    }
}

const SIMULATED_CLEAN_CONFIDENCE: f32 = 95.0;
const SIMULATED_FABRIC_CONFIDENCE: f32 = 90.0;

/// Reads the ground truth planted in synthetic frames instead of running models.
pub struct SimulatedInspector {
    features: FeatureExtractor,
    enhancer: HeuristicEnhancer,
    fabric_class: String,
}

impl SimulatedInspector {
    pub fn new(fabric_class: impl Into<String>, enhancer: EnhancerConfig) -> Self {
        Self {
            features: FeatureExtractor::new(),
            enhancer: HeuristicEnhancer::with_config(enhancer),
            fabric_class: fabric_class.into(),
        }
    }
}

impl Inspector for SimulatedInspector {
    fn inspect(&self, frame: &Frame, threshold: f32) -> Result<Inspection, InspectionFailure> {
        let start = Instant::now();
        let features = self
            .features
            .extract(frame)
            .map_err(InspectionFailure::rejected)?;
        let degraded = |error| InspectionFailure::Degraded { error, features };

        let label = frame.label.as_ref().ok_or_else(|| {
            degraded(InspectionError::Inference(format!(
                "{} carries no synthetic label",
                frame.frame_id()
            )))
        })?;

        let defect = match &label.planted {
            Some(planted) => {
                let index = DEFECT_CLASSES
                    .iter()
                    .position(|c| *c == planted.class_name)
                    .ok_or_else(|| {
                        degraded(InspectionError::Inference(format!(
                            "unknown defect {}",
                            planted.class_name
                        )))
                    })?;
                DefectPrediction::new(index, planted.class_name, planted.confidence)
            }
            None => DefectPrediction::clean(SIMULATED_CLEAN_CONFIDENCE),
        };

        let fabric = if FABRIC_CLASSES.contains(&self.fabric_class.as_str()) {
            FabricPrediction::single(&self.fabric_class, SIMULATED_FABRIC_CONFIDENCE)
        } else {
            FabricPrediction::unknown()
        };

        let enhanced = self.enhancer.apply(defect, fabric, &features, threshold);
        Ok(Inspection {
            enhanced,
            features,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capture::frame::{FrameOrigin, PlantedDefect, SyntheticLabel};
    use crate::core::ml::enhancer::Severity;
    use crate::core::ml::model::MockModel;
    use std::time::Duration;

    fn frame(sequence: u64) -> Frame {
        Frame::new(8, 8, vec![90; 8 * 8 * 3], 0, sequence)
    }

    fn mock_pipeline(defect_logits: Vec<f32>) -> Pipeline {
        Pipeline::from_models(
            Arc::new(MockModel::constant(defect_logits)),
            Arc::new(MockModel::constant(MockModel::peaked(5, 0, 80.0))),
            EnhancerConfig::default(),
        )
    }

    #[test]
    fn test_inspect_counts_performance() {
        let pipeline = mock_pipeline(MockModel::peaked(7, 1, 90.0));
        let inspection = pipeline.inspect_frame(&frame(1), 0.5).unwrap();

        assert_eq!(inspection.enhanced.defect.class_name, "Stain");
        assert_eq!(inspection.enhanced.severity, Severity::Medium);
        assert!(inspection.enhanced.reportable);
        assert_eq!(inspection.enhanced.fabric.class_name, "Cotton");

        assert_eq!(pipeline.performance().total_frames, 1);
        pipeline.reset_performance();
        assert_eq!(pipeline.performance().total_frames, 0);
    }

    #[test]
    fn test_invalid_frame_before_inference() {
        let pipeline = mock_pipeline(MockModel::peaked(7, 1, 90.0));
        let bad = Frame::new(8, 8, vec![0; 3], 0, 1);
        assert!(matches!(
            pipeline.inspect_frame(&bad, 0.5),
            Err(InspectionError::InvalidFrame(_))
        ));
        assert_eq!(pipeline.performance().total_frames, 0);
    }

    #[test]
    fn test_batch_keeps_order() {
        let pipeline = Pipeline::from_models(
            Arc::new(MockModel::failing_at(vec![3], MockModel::peaked(7, 0, 90.0))),
            Arc::new(MockModel::constant(vec![0.0; 5])),
            EnhancerConfig::default(),
        );
        let frames: Vec<Frame> = (1..=6).map(frame).collect();
        let results = pipeline.inspect_batch(&frames, 0.5);

        assert_eq!(results.len(), 6);
        for (i, result) in results.iter().enumerate() {
            if i == 2 {
                assert!(matches!(result, Err(InspectionError::Inference(_))));
            } else {
                assert!(result.is_ok());
            }
        }
    }

    #[test]
    fn test_fallback_pipeline_runs() {
        let pipeline = Pipeline::new(&PipelineConfig::default(), EnhancerConfig::default()).unwrap();
        let info = pipeline.model_info();
        assert_eq!(info.defect_source, WeightsSource::Fallback);
        assert_eq!(info.defect_classes.len(), 7);
        assert_eq!(info.fabric_classes.len(), 5);

        let inspection = pipeline.inspect_frame(&frame(1), 0.5).unwrap();
        let total: f32 = inspection.enhanced.fabric.all_class_confidences.values().sum();
        assert!((total - 100.0).abs() < 1e-2);
    }

    #[test]
    fn test_simulated_inspector_reads_label() {
        let inspector = SimulatedInspector::new("Denim", EnhancerConfig::default());
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([100, 100, 100]));
        let planted = Frame::from_rgb_image(img.clone(), Duration::ZERO, 1, FrameOrigin::Synthetic)
            .with_label(SyntheticLabel {
                planted: Some(PlantedDefect {
                    class_name: "Weaving Defect",
                    confidence: 91.0,
                }),
            });
        let inspection = inspector.inspect(&planted, 0.7).unwrap();
        assert_eq!(inspection.enhanced.defect.class_name, "Weaving Defect");
        assert_eq!(inspection.enhanced.defect.class_index, 6);
        assert!(inspection.enhanced.reportable);
        assert_eq!(inspection.enhanced.severity, Severity::Medium);
        assert_eq!(inspection.enhanced.fabric.class_name, "Denim");

        let clean = Frame::from_rgb_image(img, Duration::ZERO, 2, FrameOrigin::Synthetic)
            .with_label(SyntheticLabel::default());
        let inspection = inspector.inspect(&clean, 0.7).unwrap();
        assert!(!inspection.enhanced.defect.is_defective);
        assert!(!inspection.enhanced.reportable);
    }

    #[test]
    fn test_simulated_inspector_needs_label() {
        let inspector = SimulatedInspector::new("Cotton", EnhancerConfig::default());
        assert!(matches!(
            inspector.inspect(&frame(1), 0.5),
            Err(InspectionFailure::Degraded {
                error: InspectionError::Inference(_),
                ..
            })
        ));
    }

    #[test]
    fn test_model_failure_keeps_features() {
        let pipeline = Pipeline::from_models(
            Arc::new(MockModel::failing_at(vec![2], MockModel::peaked(7, 0, 90.0))),
            Arc::new(MockModel::constant(vec![0.0; 5])),
            EnhancerConfig::default(),
        );
        let measured = FeatureExtractor::new().extract(&frame(2)).unwrap();

        match pipeline.inspect(&frame(2), 0.5) {
            Err(InspectionFailure::Degraded { error, features }) => {
                assert!(matches!(error, InspectionError::Inference(_)));
                assert_eq!(features, measured);
                assert!((features.brightness - 90.0).abs() < 0.01);
            }
            other => panic!("expected degraded failure, got {:?}", other.map(|_| ())),
        }

        let bad = Frame::new(8, 8, vec![0; 3], 0, 3);
        assert!(matches!(
            pipeline.inspect(&bad, 0.5),
            Err(InspectionFailure::Rejected(_))
        ));
    }
}
