use crate::core::capture::source::SourceKind;
use crate::core::error::InspectionError;
use crate::scan::orchestrator::RunConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of one scan, as sent by a consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub duration_seconds: f64,
    pub source_kind: SourceKind,
    /// 0-1 scale
    pub confidence_threshold: f32,
}

impl RunRequest {
    pub fn synthetic(duration_seconds: f64, confidence_threshold: f32) -> Self {
        Self {
            duration_seconds,
            source_kind: SourceKind::Synthetic,
            confidence_threshold,
        }
    }

    pub fn live(duration_seconds: f64, confidence_threshold: f32) -> Self {
        Self {
            duration_seconds,
            source_kind: SourceKind::Live,
            confidence_threshold,
        }
    }

    pub fn to_run_config(&self, read_timeout: Duration) -> Result<RunConfig, InspectionError> {
        let duration = Duration::try_from_secs_f64(self.duration_seconds)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                InspectionError::Config(format!(
                    "duration {} s must be positive",
                    self.duration_seconds
                ))
            })?;
        Ok(
            RunConfig::new(duration, self.confidence_threshold, self.source_kind)?
                .with_read_timeout(read_timeout),
        )
    }
}
