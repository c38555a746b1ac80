//! Fabric inspection service

use crate::api::models::run::RunRequest;
use crate::core::capture::camera::{check_device, CameraSource};
use crate::core::capture::source::{AnySource, SourceKind};
use crate::core::capture::synthetic::SyntheticSource;
use crate::core::config::InspectionConfig;
use crate::core::error::InspectionError;
use crate::core::ml::pipeline::{Inspector, ModelInfo, PerformanceStats, Pipeline, SimulatedInspector};
use crate::core::report::{ReportBuilder, ScanReport};
use crate::scan::events::{event_channel, InspectionEvent};
use crate::scan::orchestrator::{InspectionOrchestrator, RunOutcome};
use crate::scan::stats::RunningStats;
use chrono::Utc;
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Loads the models once and shares them across every run.
///
/// ```ignore
/// let service = InspectionService::create(InspectionConfig::for_demo())?;
/// let handle = service.start(RunRequest::synthetic(10.0, 0.7))?;
/// for event in handle.events().iter() { /* ... */ }
/// let outcome = handle.join()?;
/// ```
pub struct InspectionService {
    config: InspectionConfig,
    pipeline: Arc<Pipeline>,
}

impl InspectionService {
    pub fn create(config: InspectionConfig) -> Result<Self, InspectionError> {
        crate::init_logging();
        info!("🔧 InspectionService: loading models");

        let pipeline = Pipeline::new(&config.pipeline, config.enhancer.clone()).map_err(|e| {
            error!("❌ InspectionService: model loading failed: {}", e);
            e
        })?;

        info!("✅ InspectionService ready");
        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
        })
    }

    /// Service over an already built pipeline.
    pub fn with_pipeline(config: InspectionConfig, pipeline: Arc<Pipeline>) -> Self {
        Self { config, pipeline }
    }

    pub fn config(&self) -> &InspectionConfig {
        &self.config
    }

    /// Starts a run on a worker thread. Events arrive in order on `RunHandle::events`.
    pub fn start(&self, request: RunRequest) -> Result<RunHandle, InspectionError> {
        let mut run_config = request.to_run_config(self.config.camera.read_timeout())?;

        let shared: Arc<dyn Inspector> = self.pipeline.clone();
        let kind = run_config.source_kind;
        let (mut source, inspector) = match kind {
            SourceKind::Live => {
                let device = self.config.camera.build_device()?;
                let camera = CameraSource::new(device, self.config.camera.clone());
                (AnySource::live(camera), shared)
            }
            SourceKind::Synthetic => {
                let synthetic = self.config.synthetic.clone();
                run_config = run_config.with_calibration(synthetic.calibration.clone());
                let inspector = if synthetic.simulate_inspection {
                    let simulated: Arc<dyn Inspector> = Arc::new(SimulatedInspector::new(
                        synthetic.fabric_class.clone(),
                        self.config.enhancer.clone(),
                    ));
                    simulated
                } else {
                    shared
                };
                (AnySource::synthetic(SyntheticSource::new(synthetic)?), inspector)
            }
        };

        let (sink, events) = event_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let mut orchestrator = InspectionOrchestrator::new(
            run_config,
            self.config.stats.clone(),
            sink,
            Arc::clone(&stop),
        );

        let worker = thread::Builder::new()
            .name("inspection-run".to_string())
            .spawn(move || orchestrator.run(&mut source, inspector.as_ref()))?;

        info!("🎬 Run started on worker thread");
        Ok(RunHandle {
            events,
            stop,
            worker: Some(worker),
        })
    }

    /// Runs to completion on the calling thread's behalf and builds the report.
    pub fn run_offline(&self, request: RunRequest) -> Result<(ScanReport, RunOutcome), InspectionError> {
        let start_time = Utc::now();
        let handle = self.start(request)?;

        let mut builder = ReportBuilder::new(start_time);
        let mut last_stats = RunningStats::default();
        for event in handle.events().iter() {
            match event {
                InspectionEvent::Defect(record) => builder.add_record(&record),
                InspectionEvent::Stats(stats) => last_stats = stats,
                _ => {}
            }
        }

        let outcome = handle.join()?;
        if !outcome.opened {
            return Err(InspectionError::Open(
                outcome.error.unwrap_or_else(|| "source did not open".to_string()),
            ));
        }
        Ok((builder.finish(&last_stats, Utc::now()), outcome))
    }

    /// Opens the configured capture device once and releases it.
    pub fn test_camera_access(&self) -> Result<(), InspectionError> {
        let device = self.config.camera.build_device()?;
        check_device(device, &self.config.camera)
    }

    pub fn model_info(&self) -> ModelInfo {
        self.pipeline.model_info()
    }

    pub fn performance(&self) -> PerformanceStats {
        self.pipeline.performance()
    }

    pub fn reset_performance(&self) {
        self.pipeline.reset_performance()
    }
}

impl Drop for InspectionService {
    fn drop(&mut self) {
        info!("🗑️ InspectionService: released");
    }
}

/// Control over one running scan. Dropping it stops and joins the worker.
pub struct RunHandle {
    events: Receiver<InspectionEvent>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<RunOutcome>>,
}

impl RunHandle {
    pub fn events(&self) -> &Receiver<InspectionEvent> {
        &self.events
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map(|w| w.is_finished()).unwrap_or(true)
    }

    pub fn join(mut self) -> Result<RunOutcome, InspectionError> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| InspectionError::Worker("inspection worker panicked".to_string())),
            None => Err(InspectionError::Worker("run already joined".to_string())),
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.stop();
            if worker.join().is_err() {
                error!("❌ Inspection worker panicked");
            }
        }
    }
}
