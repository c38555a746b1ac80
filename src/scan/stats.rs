use crate::scan::record::InspectionRecord;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Yards of fabric covered by one frame.
    pub length_per_frame: f64,
    pub fps_window_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            length_per_frame: 0.5,
            fps_window_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub frames_seen: u64,
    pub defect_frames: u64,
    pub scanned_length: f64,
    pub efficiency_pct: u32,
    pub fps: f32,
    pub progress_pct: f32,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            frames_seen: 0,
            defect_frames: 0,
            scanned_length: 0.0,
            efficiency_pct: 100,
            fps: 0.0,
            progress_pct: 0.0,
        }
    }
}

pub fn efficiency_pct(frames_seen: u64, defect_frames: u64) -> u32 {
    if frames_seen == 0 {
        return 100;
    }
    let clean = frames_seen.saturating_sub(defect_frames);
    (100.0 * clean as f64 / frames_seen as f64).round() as u32
}

pub struct StatsAggregator {
    config: StatsConfig,
    stats: RunningStats,
    duration: Duration,
    run_start: Option<Instant>,
    window_start: Option<Instant>,
    window_frames: u32,
}

impl StatsAggregator {
    pub fn new(config: StatsConfig, duration: Duration) -> Self {
        Self {
            config,
            stats: RunningStats::default(),
            duration,
            run_start: None,
            window_start: None,
            window_frames: 0,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.reset();
        self.run_start = Some(now);
        self.window_start = Some(now);
    }

    pub fn reset(&mut self) {
        self.stats = RunningStats::default();
        self.run_start = None;
        self.window_start = None;
        self.window_frames = 0;
    }

    pub fn update(&mut self, record: &InspectionRecord) {
        self.update_at(record, Instant::now());
    }

    pub fn update_at(&mut self, record: &InspectionRecord, now: Instant) {
        self.stats.frames_seen += 1;
        if record.reportable {
            self.stats.defect_frames += 1;
        }
        self.stats.scanned_length = self.stats.frames_seen as f64 * self.config.length_per_frame;
        self.stats.efficiency_pct = efficiency_pct(self.stats.frames_seen, self.stats.defect_frames);

        let window_start = *self.window_start.get_or_insert(now);
        self.window_frames += 1;
        let elapsed = now.saturating_duration_since(window_start);
        if elapsed >= Duration::from_millis(self.config.fps_window_ms) && !elapsed.is_zero() {
            self.stats.fps = self.window_frames as f32 / elapsed.as_secs_f32();
            self.window_start = Some(now);
            self.window_frames = 0;
        }

        if let Some(run_start) = self.run_start {
            self.stats.progress_pct = self.progress_at(run_start, now);
        }
    }

    fn progress_at(&self, run_start: Instant, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 100.0;
        }
        let elapsed = now.saturating_duration_since(run_start);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32() * 100.0).min(100.0)
    }

    pub fn snapshot(&self) -> RunningStats {
        self.stats.clone()
    }

    /// Closing snapshot of the run.
    pub fn finalize(&mut self) -> RunningStats {
        self.stats.progress_pct = 100.0;
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capture::frame::Frame;

    fn record(reportable: bool) -> InspectionRecord {
        let frame = Frame::new(1, 1, vec![0; 3], 0, 1);
        let mut record = InspectionRecord::degraded(&frame, Default::default());
        record.reportable = reportable;
        record.degraded = false;
        record
    }

    #[test]
    fn test_empty_run_is_fully_efficient() {
        let aggregator = StatsAggregator::new(StatsConfig::default(), Duration::from_secs(10));
        let stats = aggregator.snapshot();
        assert_eq!(stats.frames_seen, 0);
        assert_eq!(stats.efficiency_pct, 100);
        assert_eq!(efficiency_pct(0, 0), 100);
    }

    #[test]
    fn test_counts_and_efficiency() {
        let mut aggregator = StatsAggregator::new(StatsConfig::default(), Duration::from_secs(10));
        let now = Instant::now();
        aggregator.start(now);
        for i in 0..8 {
            aggregator.update_at(&record(i % 4 == 0), now);
        }
        let stats = aggregator.snapshot();
        assert_eq!(stats.frames_seen, 8);
        assert_eq!(stats.defect_frames, 2);
        assert_eq!(stats.scanned_length, 4.0);
        assert_eq!(stats.efficiency_pct, 75);
    }

    #[test]
    fn test_efficiency_rounding_and_bounds() {
        assert_eq!(efficiency_pct(3, 1), 67);
        assert_eq!(efficiency_pct(3, 3), 0);
        assert_eq!(efficiency_pct(7, 0), 100);
        for frames in 1..50u64 {
            for defects in 0..=frames {
                assert!(efficiency_pct(frames, defects) <= 100);
            }
        }
    }

    #[test]
    fn test_fps_window() {
        let mut aggregator = StatsAggregator::new(StatsConfig::default(), Duration::from_secs(10));
        let t0 = Instant::now();
        aggregator.start(t0);

        for i in 0..10 {
            aggregator.update_at(&record(false), t0 + Duration::from_millis(i * 100));
        }
        assert_eq!(aggregator.snapshot().fps, 0.0);

        aggregator.update_at(&record(false), t0 + Duration::from_millis(1000));
        let fps = aggregator.snapshot().fps;
        assert!((fps - 11.0).abs() < 1e-3);
    }

    #[test]
    fn test_progress() {
        let mut aggregator = StatsAggregator::new(StatsConfig::default(), Duration::from_secs(10));
        let t0 = Instant::now();
        aggregator.start(t0);

        aggregator.update_at(&record(false), t0 + Duration::from_secs(5));
        assert!((aggregator.snapshot().progress_pct - 50.0).abs() < 1e-3);

        aggregator.update_at(&record(false), t0 + Duration::from_secs(30));
        assert_eq!(aggregator.snapshot().progress_pct, 100.0);
    }

    #[test]
    fn test_finalize_forces_full_progress() {
        let mut aggregator = StatsAggregator::new(StatsConfig::default(), Duration::from_secs(10));
        aggregator.start(Instant::now());
        let stats = aggregator.finalize();
        assert_eq!(stats.progress_pct, 100.0);
        assert_eq!(stats.efficiency_pct, 100);
    }

    #[test]
    fn test_snapshot_has_no_side_effects() {
        let mut aggregator = StatsAggregator::new(StatsConfig::default(), Duration::from_secs(10));
        aggregator.update(&record(true));
        assert_eq!(aggregator.snapshot(), aggregator.snapshot());
        assert!(aggregator.snapshot().defect_frames <= aggregator.snapshot().frames_seen);
    }
}
