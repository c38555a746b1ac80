use crate::core::capture::frame::{Frame, FramePacket};
use crate::core::capture::synthetic::CalibrationConfig;
use crate::core::capture::source::{FrameSource, SourceKind};
use crate::core::error::InspectionError;
use crate::core::ml::pipeline::{InspectionFailure, Inspector};
use crate::scan::events::{EventSink, InspectionEvent};
use crate::scan::record::InspectionRecord;
use crate::scan::state_machine::{RunState, RunStateMachine, Trigger};
use crate::scan::stats::{RunningStats, StatsAggregator, StatsConfig};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Validated, immutable parameters of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub duration: Duration,
    /// 0-1 scale
    pub confidence_threshold: f32,
    pub source_kind: SourceKind,
    pub read_timeout: Duration,
    /// Warm-up run between open and the first frame.
    pub calibration: Option<CalibrationConfig>,
}

impl RunConfig {
    pub fn new(
        duration: Duration,
        confidence_threshold: f32,
        source_kind: SourceKind,
    ) -> Result<Self, InspectionError> {
        if duration.is_zero() {
            return Err(InspectionError::Config("run duration must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(InspectionError::Config(format!(
                "confidence threshold {} outside [0, 1]",
                confidence_threshold
            )));
        }
        Ok(Self {
            duration,
            confidence_threshold,
            source_kind,
            read_timeout: Duration::from_secs(1),
            calibration: None,
        })
    }

    pub fn with_calibration(mut self, calibration: Option<CalibrationConfig>) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub opened: bool,
    pub stats: RunningStats,
    /// Sequences of frames whose inference failed.
    pub degraded: Vec<u64>,
    pub rejected: u64,
    pub error: Option<String>,
    /// Every record in frame order, kept only with `with_record_log`.
    pub records: Vec<InspectionRecord>,
}

/// Drives one run: open, frame loop, close. Single writer of all run state.
pub struct InspectionOrchestrator {
    config: RunConfig,
    sink: EventSink,
    stop: Arc<AtomicBool>,
    machine: RunStateMachine,
    stats: StatsAggregator,
    keep_records: bool,
}

impl InspectionOrchestrator {
    pub fn new(
        config: RunConfig,
        stats_config: StatsConfig,
        sink: EventSink,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let stats = StatsAggregator::new(stats_config, config.duration);
        Self {
            config,
            sink,
            stop,
            machine: RunStateMachine::new(),
            stats,
            keep_records: false,
        }
    }

    /// Keeps every record, reportable or not, in `RunOutcome::records`.
    pub fn with_record_log(mut self) -> Self {
        self.keep_records = true;
        self
    }

    pub fn state(&self) -> RunState {
        self.machine.current_state()
    }

    pub fn run(&mut self, source: &mut dyn FrameSource, inspector: &dyn Inspector) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        self.fire(Trigger::Start);

        info!(
            "🔧 Opening {:?} source for a {:?} run",
            self.config.source_kind, self.config.duration
        );
        if let Err(e) = source.open() {
            error!("❌ Source open failed: {}", e);
            let message = e.to_string();
            self.sink.emit(InspectionEvent::Error(message.clone()));
            source.close();
            self.sink.emit(InspectionEvent::Opened(false));
            self.fire(Trigger::OpenFailed);
            outcome.error = Some(message);
            outcome.stats = self.stats.snapshot();
            return outcome;
        }

        outcome.opened = true;
        self.sink.emit(InspectionEvent::Opened(true));
        self.fire(Trigger::Opened);
        info!("✅ Run started");

        if let Some(calibration) = self.config.calibration.clone() {
            self.calibrate(&calibration);
        }

        let started = Instant::now();
        self.stats.start(started);

        let trigger = loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested");
                break Trigger::StopRequested;
            }
            if started.elapsed() >= self.config.duration {
                break Trigger::DurationElapsed;
            }

            match source.next(self.config.read_timeout) {
                Ok(frame) => self.process_frame(&frame, inspector, &mut outcome),
                Err(InspectionError::EndOfStream) => {
                    debug!("Source exhausted");
                    break Trigger::EndOfStream;
                }
                Err(e) => {
                    error!("❌ Frame read failed: {}", e);
                    let message = e.to_string();
                    self.sink.emit(InspectionEvent::Error(message.clone()));
                    outcome.error = Some(message);
                    break Trigger::ReadFailed;
                }
            }
        };
        self.fire(trigger);

        source.close();
        let final_stats = self.stats.finalize();
        self.sink.emit(InspectionEvent::Stats(final_stats.clone()));
        self.sink.emit(InspectionEvent::Complete);
        self.fire(Trigger::Closed);

        info!(
            "✅ Run complete: {} frames, {} defects, efficiency {}%",
            final_stats.frames_seen, final_stats.defect_frames, final_stats.efficiency_pct
        );
        outcome.stats = final_stats;
        outcome
    }

    /// Stepped warm-up; a stop request cuts it short.
    fn calibrate(&mut self, calibration: &CalibrationConfig) {
        let step = calibration.step_pct.clamp(0.1, 100.0);
        let mut progress = 0.0f32;
        while progress < 100.0 {
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            progress = (progress + step).min(100.0);
            self.sink.emit(InspectionEvent::Calibration(progress as u8));
            if progress < 100.0 {
                thread::sleep(calibration.interval());
            }
        }
        debug!("Calibration complete");
    }

    fn process_frame(&mut self, frame: &Frame, inspector: &dyn Inspector, outcome: &mut RunOutcome) {
        self.sink.emit(InspectionEvent::Frame(FramePacket::from_frame(frame)));

        let record = match inspector.inspect(frame, self.config.confidence_threshold) {
            Ok(inspection) => InspectionRecord::from_inspection(frame, inspection),
            Err(InspectionFailure::Rejected(reason)) => {
                warn!("Frame {} rejected: {}", frame.frame_id(), reason);
                outcome.rejected += 1;
                self.sink.emit(InspectionEvent::FrameRejected {
                    frame_id: frame.frame_id(),
                    reason,
                });
                return;
            }
            Err(InspectionFailure::Degraded { error, features }) => {
                warn!("Inference failed on {}: {}", frame.frame_id(), error);
                outcome.degraded.push(frame.sequence);
                self.sink.emit(InspectionEvent::InferenceFailed {
                    frame_id: frame.frame_id(),
                    message: error.to_string(),
                });
                InspectionRecord::degraded(frame, features)
            }
        };

        self.stats.update(&record);
        if self.keep_records {
            outcome.records.push(record.clone());
        }
        if record.reportable {
            info!(
                "Defect {} ({:.1}%, {:?}) in {}",
                record.defect.class_name, record.defect.confidence, record.severity, record.frame_id
            );
            self.sink.emit(InspectionEvent::Defect(record));
        }
        self.sink.emit(InspectionEvent::Stats(self.stats.snapshot()));
    }

    fn fire(&mut self, trigger: Trigger) {
        match self.machine.fire(trigger) {
            Some(state) => self.sink.emit(InspectionEvent::StateChanged(state)),
            None => warn!(
                "Ignored {:?} in state {:?}",
                trigger,
                self.machine.current_state()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capture::camera::{CameraConfig, CameraSource, Capture, CaptureDevice};
    use crate::core::capture::synthetic::{seeded_draws, SyntheticConfig, SyntheticSource};
    use crate::core::ml::enhancer::EnhancerConfig;
    use crate::core::ml::model::MockModel;
    use crate::core::ml::pipeline::{Inspection, Pipeline, SimulatedInspector};
    use crate::scan::events::event_channel;
    use image::RgbImage;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::Receiver;

    /// Endless device that counts releases.
    struct EndlessDevice {
        releases: Arc<AtomicUsize>,
        fail_after: Option<u32>,
        reads: u32,
    }

    impl CaptureDevice for EndlessDevice {
        fn name(&self) -> String {
            "endless".to_string()
        }

        fn open(&mut self) -> Result<(), InspectionError> {
            Ok(())
        }

        fn read(&mut self) -> Result<Capture, InspectionError> {
            self.reads += 1;
            if let Some(limit) = self.fail_after {
                if self.reads > limit {
                    return Err(InspectionError::Read("cable unplugged".to_string()));
                }
            }
            Ok(Capture::Frame(RgbImage::from_pixel(16, 16, image::Rgb([120, 110, 90]))))
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NoFrameDevice;

    impl CaptureDevice for NoFrameDevice {
        fn name(&self) -> String {
            "silent".to_string()
        }

        fn open(&mut self) -> Result<(), InspectionError> {
            Ok(())
        }

        fn read(&mut self) -> Result<Capture, InspectionError> {
            Ok(Capture::Pending)
        }

        fn release(&mut self) {}
    }

    /// Delegates to the pipeline and raises the stop flag after `limit` frames.
    struct StoppingInspector {
        inner: Pipeline,
        stop: Arc<AtomicBool>,
        seen: AtomicUsize,
        limit: usize,
    }

    impl Inspector for StoppingInspector {
        fn inspect(&self, frame: &Frame, threshold: f32) -> Result<Inspection, InspectionFailure> {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
                self.stop.store(true, Ordering::SeqCst);
            }
            self.inner.inspect(frame, threshold)
        }
    }

    fn camera_config() -> CameraConfig {
        CameraConfig {
            target_fps: 0.0,
            open_timeout_ms: 30,
            poll_interval_ms: 5,
            ..Default::default()
        }
    }

    fn clean_pipeline() -> Pipeline {
        Pipeline::from_models(
            Arc::new(MockModel::constant(MockModel::peaked(7, 0, 95.0))),
            Arc::new(MockModel::constant(MockModel::peaked(5, 3, 80.0))),
            EnhancerConfig::default(),
        )
    }

    fn orchestrator(
        kind: SourceKind,
        threshold: f32,
    ) -> (InspectionOrchestrator, Receiver<InspectionEvent>, Arc<AtomicBool>) {
        let (sink, rx) = event_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let config = RunConfig::new(Duration::from_secs(10), threshold, kind)
            .unwrap()
            .with_read_timeout(Duration::from_millis(20));
        (
            InspectionOrchestrator::new(config, StatsConfig::default(), sink, Arc::clone(&stop)),
            rx,
            stop,
        )
    }

    fn count(events: &[InspectionEvent], pred: impl Fn(&InspectionEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(*e)).count()
    }

    #[test]
    fn test_run_config_validation() {
        assert!(RunConfig::new(Duration::ZERO, 0.5, SourceKind::Live).is_err());
        assert!(RunConfig::new(Duration::from_secs(1), 1.2, SourceKind::Live).is_err());
        assert!(RunConfig::new(Duration::from_secs(1), -0.1, SourceKind::Synthetic).is_err());
        assert!(RunConfig::new(Duration::from_secs(1), 1.0, SourceKind::Synthetic).is_ok());
    }

    #[test]
    fn test_seeded_synthetic_run() {
        let synthetic = SyntheticConfig {
            max_frames: Some(100),
            ..SyntheticConfig::deterministic(2024)
        };
        let expected = seeded_draws(2024, &synthetic, 100)
            .iter()
            .filter(|d| d.is_some())
            .count() as u64;

        let (mut orch, rx, _stop) = orchestrator(SourceKind::Synthetic, 0.7);
        let mut source = SyntheticSource::new(synthetic).unwrap();
        let inspector = SimulatedInspector::new("Cotton", EnhancerConfig::default());
        let outcome = orch.run(&mut source, &inspector);
        drop(orch);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(outcome.stats.frames_seen, 100);
        assert_eq!(outcome.stats.defect_frames, expected);
        assert_eq!(
            count(&events, |e| matches!(e, InspectionEvent::Defect(_))) as u64,
            expected
        );
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Complete)), 1);
        assert!(outcome.stats.defect_frames <= outcome.stats.frames_seen);
        assert_eq!(outcome.stats.progress_pct, 100.0);
    }

    #[test]
    fn test_event_order() {
        let synthetic = SyntheticConfig {
            max_frames: Some(3),
            ..SyntheticConfig::deterministic(1)
        };
        let (mut orch, rx, _stop) = orchestrator(SourceKind::Synthetic, 0.5);
        let mut source = SyntheticSource::new(synthetic).unwrap();
        let inspector = SimulatedInspector::new("Cotton", EnhancerConfig::default());
        orch.run(&mut source, &inspector);
        assert_eq!(orch.state(), RunState::Idle);
        drop(orch);

        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events[0], InspectionEvent::StateChanged(RunState::Opening)));
        assert!(matches!(events[1], InspectionEvent::Opened(true)));
        assert!(matches!(events[2], InspectionEvent::StateChanged(RunState::Running)));
        assert!(matches!(events[3], InspectionEvent::Frame(_)));
        assert!(matches!(events.last(), Some(InspectionEvent::StateChanged(RunState::Idle))));
        assert!(matches!(events[events.len() - 2], InspectionEvent::Complete));
        // one per frame plus the final flush
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Stats(_))), 4);
    }

    #[test]
    fn test_calibration_precedes_frames() {
        let synthetic = SyntheticConfig {
            max_frames: Some(2),
            ..SyntheticConfig::deterministic(1)
        };
        let (sink, rx) = event_channel();
        let config = RunConfig::new(Duration::from_secs(10), 0.5, SourceKind::Synthetic)
            .unwrap()
            .with_calibration(Some(CalibrationConfig {
                step_pct: 30.0,
                interval_ms: 0,
            }));
        let mut orch = InspectionOrchestrator::new(
            config,
            StatsConfig::default(),
            sink,
            Arc::new(AtomicBool::new(false)),
        );
        let mut source = SyntheticSource::new(synthetic).unwrap();
        let inspector = SimulatedInspector::new("Cotton", EnhancerConfig::default());
        orch.run(&mut source, &inspector);
        drop(orch);

        let events: Vec<_> = rx.iter().collect();
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                InspectionEvent::Calibration(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![30, 60, 90, 100]);

        let last_calibration = events
            .iter()
            .rposition(|e| matches!(e, InspectionEvent::Calibration(_)))
            .unwrap();
        let first_frame = events
            .iter()
            .position(|e| matches!(e, InspectionEvent::Frame(_)))
            .unwrap();
        assert!(last_calibration < first_frame);
    }

    #[test]
    fn test_stop_skips_calibration() {
        let (sink, rx) = event_channel();
        let stop = Arc::new(AtomicBool::new(true));
        let config = RunConfig::new(Duration::from_secs(10), 0.5, SourceKind::Synthetic)
            .unwrap()
            .with_calibration(Some(CalibrationConfig::default()));
        let mut orch = InspectionOrchestrator::new(config, StatsConfig::default(), sink, stop);
        let mut source = SyntheticSource::new(SyntheticConfig::deterministic(2)).unwrap();
        let inspector = SimulatedInspector::new("Cotton", EnhancerConfig::default());
        orch.run(&mut source, &inspector);
        drop(orch);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Calibration(_))), 0);
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Complete)), 1);
    }

    #[test]
    fn test_inference_failure_degrades_one_frame() {
        let synthetic = SyntheticConfig {
            max_frames: Some(20),
            ..SyntheticConfig::deterministic(8)
        };
        let pipeline = Pipeline::from_models(
            Arc::new(MockModel::failing_at(vec![5], MockModel::peaked(7, 0, 95.0))),
            Arc::new(MockModel::constant(MockModel::peaked(5, 0, 80.0))),
            EnhancerConfig::default(),
        );
        let (orch, rx, _stop) = orchestrator(SourceKind::Synthetic, 0.5);
        let mut orch = orch.with_record_log();
        let mut source = SyntheticSource::new(synthetic).unwrap();
        let outcome = orch.run(&mut source, &pipeline);
        drop(orch);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(outcome.degraded, vec![5]);

        let sequences: Vec<u64> = outcome.records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());
        let (degraded, normal): (Vec<_>, Vec<_>) =
            outcome.records.iter().partition(|r| r.degraded);
        assert_eq!(degraded.len(), 1);
        assert_eq!(normal.len(), 19);

        let failed = degraded[0];
        assert_eq!(failed.sequence, 5);
        assert_eq!(failed.defect.class_name, "Inference Error");
        assert_eq!(failed.fabric.class_name, "Unknown");
        // the woven texture is measured even though the model failed
        assert!(failed.feature_set.brightness > 0.0);
        assert!(failed.feature_set.contrast > 0.0);
        assert!(normal.iter().all(|r| r.defect.class_name == "Clean" && !r.reportable));
        assert_eq!(outcome.stats.frames_seen, 20);
        assert_eq!(outcome.stats.defect_frames, 0);
        assert_eq!(outcome.stats.efficiency_pct, 100);

        let failures: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                InspectionEvent::InferenceFailed { frame_id, .. } => Some(frame_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec!["SIM-10005".to_string()]);
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Complete)), 1);
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Error(_))), 0);
    }

    #[test]
    fn test_stop_before_first_frame() {
        let (mut orch, rx, stop) = orchestrator(SourceKind::Synthetic, 0.5);
        stop.store(true, Ordering::SeqCst);
        let mut source = SyntheticSource::new(SyntheticConfig::deterministic(4)).unwrap();
        let inspector = SimulatedInspector::new("Cotton", EnhancerConfig::default());
        let outcome = orch.run(&mut source, &inspector);
        drop(orch);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(outcome.stats.frames_seen, 0);
        assert_eq!(outcome.stats.efficiency_pct, 100);
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Complete)), 1);
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Frame(_))), 0);
    }

    #[test]
    fn test_stop_mid_run_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let device = EndlessDevice {
            releases: Arc::clone(&releases),
            fail_after: None,
            reads: 0,
        };
        let mut source = CameraSource::new(device, camera_config());

        let (mut orch, rx, stop) = orchestrator(SourceKind::Live, 0.5);
        let inspector = StoppingInspector {
            inner: clean_pipeline(),
            stop,
            seen: AtomicUsize::new(0),
            limit: 3,
        };
        let outcome = orch.run(&mut source, &inspector);
        drop(source);
        drop(orch);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.stats.frames_seen, 3);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Complete)), 1);
    }

    #[test]
    fn test_open_failure_reports_error() {
        let mut source = CameraSource::new(NoFrameDevice, camera_config());
        let (mut orch, rx, _stop) = orchestrator(SourceKind::Live, 0.5);
        let outcome = orch.run(&mut source, &clean_pipeline());
        drop(orch);

        let events: Vec<_> = rx.iter().collect();
        assert!(!outcome.opened);
        assert!(outcome.error.is_some());
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Error(_))), 1);
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Opened(false))), 1);
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Complete)), 0);
        assert!(matches!(events.last(), Some(InspectionEvent::StateChanged(RunState::Idle))));
    }

    #[test]
    fn test_read_failure_stops_run() {
        let releases = Arc::new(AtomicUsize::new(0));
        let device = EndlessDevice {
            releases: Arc::clone(&releases),
            fail_after: Some(4),
            reads: 0,
        };
        let mut source = CameraSource::new(device, camera_config());
        let (mut orch, rx, _stop) = orchestrator(SourceKind::Live, 0.5);
        let outcome = orch.run(&mut source, &clean_pipeline());
        drop(orch);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(outcome.stats.frames_seen, 4);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Error(_))), 1);
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Complete)), 1);
    }

    #[test]
    fn test_sub_threshold_defect_counts_as_clean() {
        let synthetic = SyntheticConfig {
            max_frames: Some(5),
            ..SyntheticConfig::deterministic(6)
        };
        let pipeline = Pipeline::from_models(
            Arc::new(MockModel::constant(MockModel::peaked(7, 1, 55.0))),
            Arc::new(MockModel::constant(MockModel::peaked(5, 0, 80.0))),
            EnhancerConfig::default(),
        );
        let (mut orch, rx, _stop) = orchestrator(SourceKind::Synthetic, 0.6);
        let mut source = SyntheticSource::new(synthetic).unwrap();
        let outcome = orch.run(&mut source, &pipeline);
        drop(orch);

        assert_eq!(outcome.stats.frames_seen, 5);
        assert_eq!(outcome.stats.defect_frames, 0);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(count(&events, |e| matches!(e, InspectionEvent::Defect(_))), 0);
    }
}
