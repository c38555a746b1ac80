use crate::core::capture::frame::Frame;
use crate::core::ml::defect::DefectPrediction;
use crate::core::ml::enhancer::Severity;
use crate::core::ml::fabric::FabricPrediction;
use crate::core::ml::features::FeatureSet;
use crate::core::ml::pipeline::Inspection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final per-frame result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub timestamp: DateTime<Utc>,
    pub frame_id: String,
    pub sequence: u64,
    pub defect: DefectPrediction,
    pub severity: Severity,
    pub reportable: bool,
    pub texture_confirmed: bool,
    pub fabric: FabricPrediction,
    pub fabric_boosted: bool,
    pub inference_latency_ms: f64,
    pub feature_set: FeatureSet,
    pub degraded: bool,
}

impl InspectionRecord {
    pub fn from_inspection(frame: &Frame, inspection: Inspection) -> Self {
        let enhanced = inspection.enhanced;
        Self {
            timestamp: Utc::now(),
            frame_id: frame.frame_id(),
            sequence: frame.sequence,
            defect: enhanced.defect,
            severity: enhanced.severity,
            reportable: enhanced.reportable,
            texture_confirmed: enhanced.texture_confirmed,
            fabric: enhanced.fabric,
            fabric_boosted: enhanced.fabric_boosted,
            inference_latency_ms: inspection.latency_ms,
            feature_set: inspection.features,
            degraded: false,
        }
    }

    /// Stand-in for a frame whose inference failed. Counts as clean and keeps
    /// the features measured before the failure.
    pub fn degraded(frame: &Frame, features: FeatureSet) -> Self {
        Self {
            timestamp: Utc::now(),
            frame_id: frame.frame_id(),
            sequence: frame.sequence,
            defect: DefectPrediction::inference_error(),
            severity: Severity::None,
            reportable: false,
            texture_confirmed: false,
            fabric: FabricPrediction::unknown(),
            fabric_boosted: false,
            inference_latency_ms: 0.0,
            feature_set: features,
            degraded: true,
        }
    }
}
