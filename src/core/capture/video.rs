//! Physical camera capture over OpenCV videoio

use crate::core::capture::camera::{Capture, CaptureDevice};
use crate::core::error::InspectionError;
use image::RgbImage;
use log::{info, warn};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};

/// Camera addressed by its system index.
pub struct VideoCaptureDevice {
    index: i32,
    target_fps: f32,
    capture: Option<VideoCapture>,
}

impl VideoCaptureDevice {
    pub fn new(index: i32, target_fps: f32) -> Self {
        Self {
            index,
            target_fps,
            capture: None,
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }
}

/// BGR `Mat` to an owned RGB image.
fn mat_to_rgb(frame: &Mat) -> opencv::Result<Option<RgbImage>> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    let data = rgb.data_bytes()?.to_vec();
    Ok(RgbImage::from_vec(width, height, data))
}

impl CaptureDevice for VideoCaptureDevice {
    fn name(&self) -> String {
        format!("camera #{}", self.index)
    }

    fn open(&mut self) -> Result<(), InspectionError> {
        let mut cap = VideoCapture::new(self.index, videoio::CAP_ANY)
            .map_err(|e| InspectionError::Open(format!("{}: {}", self.name(), e)))?;
        let opened = cap
            .is_opened()
            .map_err(|e| InspectionError::Open(format!("{}: {}", self.name(), e)))?;
        if !opened {
            return Err(InspectionError::Open(format!(
                "{} could not be opened",
                self.name()
            )));
        }

        if self.target_fps > 0.0 {
            if let Err(e) = cap.set(videoio::CAP_PROP_FPS, self.target_fps as f64) {
                warn!("{} ignored the fps request: {}", self.name(), e);
            }
        }
        info!("📹 {} opened", self.name());
        self.capture = Some(cap);
        Ok(())
    }

    /// An empty grab is `Pending`; the source turns a run of them into a timeout.
    fn read(&mut self) -> Result<Capture, InspectionError> {
        let cap = self
            .capture
            .as_mut()
            .ok_or_else(|| InspectionError::Read("camera is not open".to_string()))?;

        let mut frame = Mat::default();
        let grabbed = cap
            .read(&mut frame)
            .map_err(|e| InspectionError::Read(e.to_string()))?;
        if !grabbed || frame.empty() {
            return Ok(Capture::Pending);
        }

        match mat_to_rgb(&frame) {
            Ok(Some(img)) => Ok(Capture::Frame(img)),
            Ok(None) => Err(InspectionError::Read(
                "camera frame has an unexpected layout".to_string(),
            )),
            Err(e) => Err(InspectionError::Read(e.to_string())),
        }
    }

    fn release(&mut self) {
        if let Some(mut cap) = self.capture.take() {
            if let Err(e) = cap.release() {
                warn!("{} release failed: {}", self.name(), e);
            }
        }
    }
}
