//! Fixed-rule confidence adjustment on top of the model outputs.

use crate::core::ml::defect::DefectPrediction;
use crate::core::ml::fabric::FabricPrediction;
use crate::core::ml::features::FeatureSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    pub structural_edge_density: f32,
    pub structural_sharpness: f32,
    pub structural_boost: f32,
    pub denim_sharpness: f32,
    pub denim_edge_density: f32,
    pub denim_boost: f32,
    pub knit_edge_density: f32,
    pub knit_boost: f32,
    pub synthetic_color_uniformity: f32,
    pub synthetic_boost: f32,
    pub confidence_cap: f32,
    pub medium_severity_confidence: f32,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            structural_edge_density: 0.12,
            structural_sharpness: 80.0,
            structural_boost: 1.10,
            denim_sharpness: 150.0,
            denim_edge_density: 0.08,
            denim_boost: 1.05,
            knit_edge_density: 0.06,
            knit_boost: 1.03,
            synthetic_color_uniformity: 20.0,
            synthetic_boost: 1.04,
            confidence_cap: 99.0,
            medium_severity_confidence: 80.0,
        }
    }
}

/// Outcome of enhancing one frame's predictions.
#[derive(Debug, Clone)]
pub struct Enhancement {
    pub defect: DefectPrediction,
    pub texture_confirmed: bool,
    pub fabric: FabricPrediction,
    pub fabric_boosted: bool,
    pub severity: Severity,
    pub reportable: bool,
}

pub struct HeuristicEnhancer {
    config: EnhancerConfig,
}

impl HeuristicEnhancer {
    pub fn new() -> Self {
        Self::with_config(EnhancerConfig::default())
    }

    pub fn with_config(config: EnhancerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnhancerConfig {
        &self.config
    }

    pub fn apply(
        &self,
        defect: DefectPrediction,
        fabric: FabricPrediction,
        features: &FeatureSet,
        threshold: f32,
    ) -> Enhancement {
        let (defect, texture_confirmed) = self.enhance_defect(defect, features);
        let (fabric, fabric_boosted) = self.enhance_fabric(fabric, features);
        let severity = self.severity(&defect);
        let reportable = Self::is_reportable(&defect, threshold);
        Enhancement {
            defect,
            texture_confirmed,
            fabric,
            fabric_boosted,
            severity,
            reportable,
        }
    }

    /// Structural defects backed by visible texture disruption get a boost.
    pub fn enhance_defect(
        &self,
        mut prediction: DefectPrediction,
        features: &FeatureSet,
    ) -> (DefectPrediction, bool) {
        let cfg = &self.config;
        let confirmed = prediction.is_structural
            && (features.edge_density > cfg.structural_edge_density
                || features.sharpness > cfg.structural_sharpness);
        let factor = if confirmed { cfg.structural_boost } else { 1.0 };
        prediction.confidence = self.boost(prediction.confidence, factor);
        (prediction, confirmed)
    }

    /// Fabric rules read the weave edge map, not the defect one.
    pub fn enhance_fabric(
        &self,
        mut prediction: FabricPrediction,
        features: &FeatureSet,
    ) -> (FabricPrediction, bool) {
        let cfg = &self.config;
        let factor = match prediction.class_name.as_str() {
            "Denim"
                if features.sharpness > cfg.denim_sharpness
                    && features.weave_edge_density > cfg.denim_edge_density =>
            {
                Some(cfg.denim_boost)
            }
            "Knit" if features.weave_edge_density < cfg.knit_edge_density => Some(cfg.knit_boost),
            "Synthetic" if features.color_uniformity < cfg.synthetic_color_uniformity => {
                Some(cfg.synthetic_boost)
            }
            _ => None,
        };

        prediction.confidence = self.boost(prediction.confidence, factor.unwrap_or(1.0));
        (prediction, factor.is_some())
    }

    pub fn severity(&self, prediction: &DefectPrediction) -> Severity {
        if prediction.is_structural {
            Severity::High
        } else if prediction.is_defective
            && prediction.confidence > self.config.medium_severity_confidence
        {
            Severity::Medium
        } else if prediction.is_defective {
            Severity::Low
        } else {
            Severity::None
        }
    }

    /// The threshold is on the 0-1 scale.
    pub fn is_reportable(prediction: &DefectPrediction, threshold: f32) -> bool {
        prediction.is_defective && prediction.confidence / 100.0 >= threshold
    }

    /// Every enhanced confidence passes through here, boosted or not.
    fn boost(&self, confidence: f32, factor: f32) -> f32 {
        (confidence * factor).min(self.config.confidence_cap)
    }
}

impl Default for HeuristicEnhancer {
    fn default() -> Self {
        Self::new()
    }
}
