use crate::core::capture::camera::{CameraSource, CaptureDevice};
use crate::core::capture::frame::Frame;
use crate::core::capture::synthetic::SyntheticSource;
use crate::core::error::InspectionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Live,
    Synthetic,
}

/// Finite, time-paced frame producer.
///
/// `open` must succeed before `next` is called. `next` returns
/// `InspectionError::EndOfStream` when the source is exhausted and
/// `InspectionError::Read` when it fails. `close` releases the underlying
/// handle and is idempotent.
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    fn open(&mut self) -> Result<(), InspectionError>;

    fn next(&mut self, timeout: Duration) -> Result<Frame, InspectionError>;

    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn kind(&self) -> SourceKind {
        (**self).kind()
    }

    fn open(&mut self) -> Result<(), InspectionError> {
        (**self).open()
    }

    fn next(&mut self, timeout: Duration) -> Result<Frame, InspectionError> {
        (**self).next(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// The source selected for a run.
pub enum AnySource {
    Live(CameraSource<Box<dyn CaptureDevice>>),
    Synthetic(SyntheticSource),
}

impl AnySource {
    pub fn live(source: CameraSource<Box<dyn CaptureDevice>>) -> Self {
        AnySource::Live(source)
    }

    pub fn synthetic(source: SyntheticSource) -> Self {
        AnySource::Synthetic(source)
    }
}

impl FrameSource for AnySource {
    fn kind(&self) -> SourceKind {
        match self {
            AnySource::Live(_) => SourceKind::Live,
            AnySource::Synthetic(_) => SourceKind::Synthetic,
        }
    }

    fn open(&mut self) -> Result<(), InspectionError> {
        match self {
            AnySource::Live(source) => source.open(),
            AnySource::Synthetic(source) => source.open(),
        }
    }

    fn next(&mut self, timeout: Duration) -> Result<Frame, InspectionError> {
        match self {
            AnySource::Live(source) => source.next(timeout),
            AnySource::Synthetic(source) => source.next(timeout),
        }
    }

    fn close(&mut self) {
        match self {
            AnySource::Live(source) => source.close(),
            AnySource::Synthetic(source) => source.close(),
        }
    }
}
