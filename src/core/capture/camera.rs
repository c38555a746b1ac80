use crate::core::capture::frame::{Frame, FrameOrigin};
use crate::core::capture::source::{FrameSource, SourceKind};
use crate::core::error::InspectionError;
use image::RgbImage;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "camera")]
use crate::core::capture::video::VideoCaptureDevice;

/// Result of a single device read.
#[derive(Debug)]
pub enum Capture {
    Frame(RgbImage),
    /// Nothing available yet.
    Pending,
    /// The device has no more frames.
    Closed,
}

/// Hardware capture handle.
pub trait CaptureDevice: Send {
    fn name(&self) -> String;

    fn open(&mut self) -> Result<(), InspectionError>;

    fn read(&mut self) -> Result<Capture, InspectionError>;

    fn release(&mut self);
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for Box<D> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn open(&mut self) -> Result<(), InspectionError> {
        (**self).open()
    }

    fn read(&mut self) -> Result<Capture, InspectionError> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// System index of the physical camera.
    pub camera_index: i32,
    /// Directory replayed by `ImageSequenceDevice`. Takes precedence over the camera.
    pub frames_dir: Option<PathBuf>,
    pub loop_playback: bool,
    pub target_fps: f32,
    pub open_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            frames_dir: None,
            loop_playback: false,
            target_fps: 30.0,
            open_timeout_ms: 3000,
            poll_interval_ms: 100,
            read_timeout_ms: 1000,
        }
    }
}

impl CameraConfig {
    /// Looping replay of recorded footage.
    pub fn for_replay(frames_dir: impl Into<PathBuf>) -> Self {
        Self {
            frames_dir: Some(frames_dir.into()),
            loop_playback: true,
            ..Default::default()
        }
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    fn frame_period(&self) -> Option<Duration> {
        if self.target_fps > 0.0 {
            Some(Duration::from_secs_f32(1.0 / self.target_fps))
        } else {
            None
        }
    }

    /// Replay directory when one is set, otherwise the camera at `camera_index`.
    pub fn build_device(&self) -> Result<Box<dyn CaptureDevice>, InspectionError> {
        match &self.frames_dir {
            Some(dir) => Ok(Box::new(ImageSequenceDevice::new(dir, self.loop_playback))),
            None => self.build_camera(),
        }
    }

    #[cfg(feature = "camera")]
    fn build_camera(&self) -> Result<Box<dyn CaptureDevice>, InspectionError> {
        Ok(Box::new(VideoCaptureDevice::new(
            self.camera_index,
            self.target_fps,
        )))
    }

    #[cfg(not(feature = "camera"))]
    fn build_camera(&self) -> Result<Box<dyn CaptureDevice>, InspectionError> {
        Err(InspectionError::Open(format!(
            "camera #{} unavailable: built without the `camera` feature",
            self.camera_index
        )))
    }
}

/// Live frame source over a capture device.
///
/// `open` does not succeed until the device has produced a frame; that first
/// frame is handed out by the first `next` call.
pub struct CameraSource<D: CaptureDevice> {
    device: D,
    config: CameraConfig,
    held: bool,
    opening_frame: Option<RgbImage>,
    opened_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    sequence: u64,
}

impl<D: CaptureDevice> CameraSource<D> {
    pub fn new(device: D, config: CameraConfig) -> Self {
        Self {
            device,
            config,
            held: false,
            opening_frame: None,
            opened_at: None,
            last_frame_at: None,
            sequence: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.held
    }

    pub fn device_name(&self) -> String {
        self.device.name()
    }

    pub fn open(&mut self) -> Result<(), InspectionError> {
        if self.held {
            return Ok(());
        }

        let name = self.device.name();
        info!("🔧 Opening capture device {}", name);

        self.device.open().map_err(|e| {
            error!("❌ Capture device {} failed to open: {}", name, e);
            match e {
                InspectionError::Open(msg) => InspectionError::Open(msg),
                other => InspectionError::Open(other.to_string()),
            }
        })?;
        self.held = true;

        let timeout = self.config.open_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            match self.device.read() {
                Ok(Capture::Frame(img)) => {
                    self.opening_frame = Some(img);
                    break;
                }
                Ok(Capture::Pending) => {}
                Ok(Capture::Closed) => {
                    self.close();
                    return Err(InspectionError::Open(format!(
                        "{} opened but delivered no frames",
                        name
                    )));
                }
                Err(e) => debug!("Probe read on {} failed: {}", name, e),
            }

            let now = Instant::now();
            if now >= deadline {
                self.close();
                error!("❌ No frame from {} within {:?}", name, timeout);
                return Err(InspectionError::Open(format!(
                    "{} opened but no frame could be read within {} ms",
                    name,
                    timeout.as_millis()
                )));
            }
            thread::sleep(self.config.poll_interval().min(deadline - now));
        }

        self.opened_at = Some(Instant::now());
        self.last_frame_at = None;
        self.sequence = 0;
        info!("✅ Capture device {} ready", name);
        Ok(())
    }

    pub fn next(&mut self, timeout: Duration) -> Result<Frame, InspectionError> {
        if !self.held {
            return Err(InspectionError::Read("capture device is not open".to_string()));
        }

        if let Some(img) = self.opening_frame.take() {
            return Ok(self.stamp(img));
        }

        self.pace();

        let deadline = Instant::now() + timeout;
        loop {
            match self.device.read() {
                Ok(Capture::Frame(img)) => return Ok(self.stamp(img)),
                Ok(Capture::Closed) => return Err(InspectionError::EndOfStream),
                Ok(Capture::Pending) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!("No frame from {} within {:?}", self.device.name(), timeout);
                        return Err(InspectionError::Read(format!(
                            "no frame within {} ms",
                            timeout.as_millis()
                        )));
                    }
                    thread::sleep(self.config.poll_interval().min(deadline - now));
                }
                Err(InspectionError::Read(msg)) => return Err(InspectionError::Read(msg)),
                Err(e) => return Err(InspectionError::Read(e.to_string())),
            }
        }
    }

    /// Releases the device. Only the first call reaches the device.
    pub fn close(&mut self) {
        if !self.held {
            return;
        }
        self.device.release();
        self.held = false;
        self.opening_frame = None;
        info!("🗑️ Capture device {} released", self.device.name());
    }

    fn pace(&mut self) {
        let (Some(period), Some(last)) = (self.config.frame_period(), self.last_frame_at) else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed < period {
            thread::sleep(period - elapsed);
        }
    }

    fn stamp(&mut self, img: RgbImage) -> Frame {
        let now = Instant::now();
        let timestamp = self
            .opened_at
            .map(|t| now.duration_since(t))
            .unwrap_or_default();
        self.last_frame_at = Some(now);
        self.sequence += 1;
        Frame::from_rgb_image(img, timestamp, self.sequence, FrameOrigin::Live)
    }
}

impl<D: CaptureDevice> FrameSource for CameraSource<D> {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn open(&mut self) -> Result<(), InspectionError> {
        CameraSource::open(self)
    }

    fn next(&mut self, timeout: Duration) -> Result<Frame, InspectionError> {
        CameraSource::next(self, timeout)
    }

    fn close(&mut self) {
        CameraSource::close(self)
    }
}

impl<D: CaptureDevice> Drop for CameraSource<D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the device, waits for one frame, releases it again.
pub fn check_device<D: CaptureDevice>(device: D, config: &CameraConfig) -> Result<(), InspectionError> {
    let mut source = CameraSource::new(device, config.clone());
    source.open()?;
    source.close();
    Ok(())
}

const SEQUENCE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays the images of a directory in file name order.
pub struct ImageSequenceDevice {
    dir: PathBuf,
    loop_playback: bool,
    files: Vec<PathBuf>,
    cursor: usize,
    opened: bool,
}

impl ImageSequenceDevice {
    pub fn new(dir: impl AsRef<Path>, loop_playback: bool) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            loop_playback,
            files: Vec::new(),
            cursor: 0,
            opened: false,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }

    fn is_sequence_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                SEQUENCE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }
}

impl CaptureDevice for ImageSequenceDevice {
    fn name(&self) -> String {
        format!("image-sequence:{}", self.dir.display())
    }

    fn open(&mut self) -> Result<(), InspectionError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            InspectionError::Open(format!("{} not accessible: {}", self.dir.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && Self::is_sequence_file(path))
            .collect();
        files.sort();

        debug!("Image sequence {} holds {} frames", self.dir.display(), files.len());
        self.files = files;
        self.cursor = 0;
        self.opened = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Capture, InspectionError> {
        if !self.opened {
            return Err(InspectionError::Read("image sequence is not open".to_string()));
        }
        if self.files.is_empty() {
            return Ok(Capture::Closed);
        }
        if self.cursor >= self.files.len() {
            if !self.loop_playback {
                return Ok(Capture::Closed);
            }
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;
        let img = image::open(path)
            .map_err(|e| InspectionError::Read(format!("{}: {}", path.display(), e)))?;
        Ok(Capture::Frame(img.to_rgb8()))
    }

    fn release(&mut self) {
        self.opened = false;
        self.files.clear();
        self.cursor = 0;
    }
}
