//! Offline scan report document

use crate::core::error::InspectionError;
use crate::scan::record::InspectionRecord;
use crate::scan::stats::RunningStats;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefect {
    pub timestamp: DateTime<Utc>,
    pub frame_id: String,
    #[serde(rename = "type")]
    pub defect_type: String,
    /// 0-1 scale
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_scanned_yards: f64,
    pub total_defects: u64,
    pub efficiency_score: u32,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub start_time: DateTime<Utc>,
    pub defects: Vec<ReportDefect>,
    pub summary: ReportSummary,
}

impl ScanReport {
    pub fn to_json(&self) -> Result<String, InspectionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), InspectionError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!("✅ Report written to {}", path.display());
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InspectionError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

pub struct ReportBuilder {
    start_time: DateTime<Utc>,
    defects: Vec<ReportDefect>,
}

impl ReportBuilder {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            defects: Vec::new(),
        }
    }

    /// Only reportable records end up in the document.
    pub fn add_record(&mut self, record: &InspectionRecord) {
        if !record.reportable {
            return;
        }
        self.defects.push(ReportDefect {
            timestamp: record.timestamp,
            frame_id: record.frame_id.clone(),
            defect_type: record.defect.class_name.clone(),
            confidence: record.defect.confidence / 100.0,
        });
    }

    pub fn defect_count(&self) -> usize {
        self.defects.len()
    }

    pub fn finish(self, stats: &RunningStats, end_time: DateTime<Utc>) -> ScanReport {
        ScanReport {
            start_time: self.start_time,
            summary: ReportSummary {
                total_scanned_yards: stats.scanned_length,
                total_defects: stats.defect_frames,
                efficiency_score: stats.efficiency_pct,
                end_time,
            },
            defects: self.defects,
        }
    }
}
