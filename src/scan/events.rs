use crate::core::capture::frame::FramePacket;
use crate::scan::record::InspectionRecord;
use crate::scan::state_machine::RunState;
use crate::scan::stats::RunningStats;
use std::sync::mpsc::{self, Receiver, Sender};

/// Worker to consumer messages, in emission order.
#[derive(Debug, Clone)]
pub enum InspectionEvent {
    StateChanged(RunState),
    /// Outcome of opening the source, at most once per run.
    Opened(bool),
    /// Synthetic warm-up progress, 0-100, before the first frame.
    Calibration(u8),
    Frame(FramePacket),
    /// Reportable frames only.
    Defect(InspectionRecord),
    InferenceFailed {
        frame_id: String,
        message: String,
    },
    FrameRejected {
        frame_id: String,
        reason: String,
    },
    Stats(RunningStats),
    Error(String),
    Complete,
}

/// Sending half owned by the worker. Sends never block and a missing
/// consumer is not an error.
pub struct EventSink {
    tx: Sender<InspectionEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<InspectionEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: InspectionEvent) {
        let _ = self.tx.send(event);
    }
}

pub fn event_channel() -> (EventSink, Receiver<InspectionEvent>) {
    let (tx, rx) = mpsc::channel();
    (EventSink::new(tx), rx)
}
