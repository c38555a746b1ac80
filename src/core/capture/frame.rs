use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Where a frame came from. Decides the display id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameOrigin {
    Live,
    Synthetic,
}

/// Defect planted by the synthetic generator.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantedDefect {
    pub class_name: &'static str,
    /// 0-100 scale
    pub confidence: f32,
}

/// Ground truth attached to synthetic frames.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyntheticLabel {
    pub planted: Option<PlantedDefect>,
}

/// Immutable RGB frame (3 bytes per pixel).
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    /// Offset from the moment the source was opened.
    pub timestamp: Duration,
    pub sequence: u64,
    pub origin: FrameOrigin,
    pub label: Option<SyntheticLabel>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp_ms: u64, sequence: u64) -> Self {
        Self {
            width,
            height,
            data: Arc::from(data.into_boxed_slice()),
            timestamp: Duration::from_millis(timestamp_ms),
            sequence,
            origin: FrameOrigin::Live,
            label: None,
        }
    }

    pub fn from_rgb_image(
        image: RgbImage,
        timestamp: Duration,
        sequence: u64,
        origin: FrameOrigin,
    ) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: Arc::from(image.into_raw().into_boxed_slice()),
            timestamp,
            sequence,
            origin,
            label: None,
        }
    }

    pub fn with_label(mut self, label: SyntheticLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Non-empty and the buffer length matches the dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.pixel_count() * 3
    }

    /// `CAM-00005` for live frames, `SIM-10005` for synthetic ones.
    pub fn frame_id(&self) -> String {
        match self.origin {
            FrameOrigin::Live => format!("CAM-{:05}", self.sequence),
            FrameOrigin::Synthetic => format!("SIM-{}", 10_000 + self.sequence),
        }
    }

    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if !self.is_well_formed() {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.to_vec())
    }

    pub fn resize_to(&self, target_width: u32, target_height: u32) -> Option<RgbImage> {
        let img = self.to_rgb_image()?;
        Some(image::imageops::resize(
            &img,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        ))
    }

    pub fn to_gray(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|rgb| {
                let r = rgb[0] as u32;
                let g = rgb[1] as u32;
                let b = rgb[2] as u32;
                ((r * 299 + g * 587 + b * 114) / 1000) as u8
            })
            .collect()
    }
}

/// Raw frame handed to the display sink. Shares the pixel buffer with the frame.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub frame_id: String,
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    pub data: Arc<[u8]>,
}

impl FramePacket {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            frame_id: frame.frame_id(),
            sequence: frame.sequence,
            width: frame.width,
            height: frame.height,
            timestamp_ms: frame.timestamp.as_millis() as u64,
            data: Arc::clone(&frame.data),
        }
    }
}
