use crate::core::capture::frame::Frame;
use crate::core::error::InspectionError;
use crate::core::ml::model::ClassificationModel;
use crate::core::ml::transforms::{argmax, confidences};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Index 0 means no defect.
pub const DEFECT_CLASSES: [&str; 7] = [
    "Clean",
    "Stain",
    "Hole",
    "Tear",
    "Thread Break",
    "Color Mismatch",
    "Weaving Defect",
];

pub const STRUCTURAL_DEFECTS: [&str; 2] = ["Hole", "Tear"];

pub const INFERENCE_ERROR_CLASS: &str = "Inference Error";

pub fn is_structural(class_name: &str) -> bool {
    STRUCTURAL_DEFECTS.contains(&class_name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectPrediction {
    pub class_index: usize,
    pub class_name: String,
    /// 0-100
    pub confidence: f32,
    pub is_defective: bool,
    pub is_structural: bool,
}

impl DefectPrediction {
    pub fn new(class_index: usize, class_name: impl Into<String>, confidence: f32) -> Self {
        let class_name = class_name.into();
        Self {
            class_index,
            is_defective: class_index > 0,
            is_structural: is_structural(&class_name),
            class_name,
            confidence,
        }
    }

    pub fn clean(confidence: f32) -> Self {
        Self::new(0, DEFECT_CLASSES[0], confidence)
    }

    /// Placeholder for a frame whose inference failed.
    pub fn inference_error() -> Self {
        Self {
            class_index: 0,
            class_name: INFERENCE_ERROR_CLASS.to_string(),
            confidence: 0.0,
            is_defective: false,
            is_structural: false,
        }
    }
}

pub struct DefectDetector {
    model: Arc<dyn ClassificationModel>,
    labels: Vec<String>,
}

impl DefectDetector {
    pub fn new(model: Arc<dyn ClassificationModel>) -> Self {
        Self::with_labels(model, DEFECT_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_labels(model: Arc<dyn ClassificationModel>, labels: Vec<String>) -> Self {
        Self { model, labels }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn detect(&self, frame: &Frame) -> Result<DefectPrediction, InspectionError> {
        let logits = self
            .model
            .forward(frame)
            .map_err(|e| InspectionError::Inference(e.to_string()))?;

        if logits.len() != self.labels.len() {
            return Err(InspectionError::Inference(format!(
                "defect model returned {} outputs for {} classes",
                logits.len(),
                self.labels.len()
            )));
        }

        let probs = confidences(&logits);
        let (index, confidence) = argmax(&probs)
            .ok_or_else(|| InspectionError::Inference("empty defect output".to_string()))?;
        if !confidence.is_finite() {
            return Err(InspectionError::Inference("non-finite defect confidence".to_string()));
        }

        Ok(DefectPrediction::new(index, self.labels[index].clone(), confidence))
    }
}
