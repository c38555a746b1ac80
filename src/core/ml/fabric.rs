use crate::core::capture::frame::Frame;
use crate::core::error::InspectionError;
use crate::core::ml::model::ClassificationModel;
use crate::core::ml::transforms::{argmax, confidences};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const FABRIC_CLASSES: [&str; 5] = ["Cotton", "Denim", "Knit", "Woven", "Synthetic"];

pub const UNKNOWN_FABRIC: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricPrediction {
    pub class_index: usize,
    pub class_name: String,
    /// 0-100
    pub confidence: f32,
    /// Sums to 100 before enhancement.
    pub all_class_confidences: BTreeMap<String, f32>,
}

impl FabricPrediction {
    pub fn unknown() -> Self {
        Self {
            class_index: 0,
            class_name: UNKNOWN_FABRIC.to_string(),
            confidence: 0.0,
            all_class_confidences: BTreeMap::new(),
        }
    }

    /// Single-label prediction with the remaining mass spread evenly.
    pub fn single(class_name: &str, confidence: f32) -> Self {
        let index = FABRIC_CLASSES
            .iter()
            .position(|c| *c == class_name)
            .unwrap_or(0);
        let rest = (100.0 - confidence).max(0.0) / (FABRIC_CLASSES.len() - 1) as f32;
        let all_class_confidences = FABRIC_CLASSES
            .iter()
            .map(|c| {
                let value = if *c == class_name { confidence } else { rest };
                (c.to_string(), value)
            })
            .collect();
        Self {
            class_index: index,
            class_name: class_name.to_string(),
            confidence,
            all_class_confidences,
        }
    }
}

pub struct FabricClassifier {
    model: Arc<dyn ClassificationModel>,
    labels: Vec<String>,
}

impl FabricClassifier {
    pub fn new(model: Arc<dyn ClassificationModel>) -> Self {
        Self::with_labels(model, FABRIC_CLASSES.iter().map(|s| s.to_string()).collect())
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

    pub fn classify(&self, frame: &Frame) -> Result<FabricPrediction, InspectionError> {
        let logits = self
            .model
            .forward(frame)
            .map_err(|e| InspectionError::Inference(e.to_string()))?;

        if logits.len() != self.labels.len() {
            return Err(InspectionError::Inference(format!(
                "fabric model returned {} outputs for {} classes",
                logits.len(),
                self.labels.len()
            )));
        }

        let probs = confidences(&logits);
        let (index, confidence) = argmax(&probs)
            .ok_or_else(|| InspectionError::Inference("empty fabric output".to_string()))?;
        if !confidence.is_finite() {
            return Err(InspectionError::Inference("non-finite fabric confidence".to_string()));
        }

        let all_class_confidences = self
            .labels
            .iter()
            .cloned()
            .zip(probs.iter().copied())
            .collect();

        Ok(FabricPrediction {
            class_index: index,
            class_name: self.labels[index].clone(),
            confidence,
            all_class_confidences,
        })
    }
}
