pub mod camera;
pub mod frame;
pub mod source;
pub mod synthetic;
#[cfg(feature = "camera")]
pub mod video;

pub use camera::{check_device, CameraConfig, CameraSource, Capture, CaptureDevice, ImageSequenceDevice};
pub use frame::{Frame, FrameOrigin, FramePacket, PlantedDefect, SyntheticLabel};
pub use source::{AnySource, FrameSource, SourceKind};
pub use synthetic::{CalibrationConfig, SyntheticConfig, SyntheticSource, SYNTHETIC_DEFECTS};
#[cfg(feature = "camera")]
pub use video::VideoCaptureDevice;
