use crate::core::capture::frame::{Frame, FrameOrigin, PlantedDefect, SyntheticLabel};
use crate::core::capture::source::{FrameSource, SourceKind};
use crate::core::error::InspectionError;
use image::{Rgb, RgbImage};
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

/// Defect types the generator plants.
pub const SYNTHETIC_DEFECTS: [&str; 5] = [
    "Stain",
    "Hole",
    "Weaving Defect",
    "Color Mismatch",
    "Thread Break",
];

/// Simulated warm-up before a synthetic scan, reported as 0-100 progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub step_pct: f32,
    pub interval_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            step_pct: 1.5,
            interval_ms: 20,
        }
    }
}

impl CalibrationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub interval_ms: u64,
    pub defect_probability: f64,
    pub confidence_min: f32,
    pub confidence_max: f32,
    pub seed: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub max_frames: Option<u64>,
    /// Fabric reported for synthetic frames.
    pub fabric_class: String,
    /// Read the planted ground truth instead of running the models.
    pub simulate_inspection: bool,
    /// `None` skips the warm-up.
    pub calibration: Option<CalibrationConfig>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            defect_probability: 0.15,
            confidence_min: 85.0,
            confidence_max: 99.0,
            seed: None,
            width: 160,
            height: 120,
            max_frames: None,
            fabric_class: "Cotton".to_string(),
            simulate_inspection: true,
            calibration: Some(CalibrationConfig::default()),
        }
    }
}

impl SyntheticConfig {
    pub fn for_demo() -> Self {
        Self::default()
    }

    /// Seeded, unpaced and without warm-up.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            interval_ms: 0,
            seed: Some(seed),
            calibration: None,
            ..Default::default()
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), InspectionError> {
        if !(0.0..=1.0).contains(&self.defect_probability) {
            return Err(InspectionError::Config(format!(
                "defect probability {} outside [0, 1]",
                self.defect_probability
            )));
        }
        if self.confidence_min > self.confidence_max
            || self.confidence_min < 0.0
            || self.confidence_max > 100.0
        {
            return Err(InspectionError::Config(format!(
                "confidence range [{}, {}] invalid",
                self.confidence_min, self.confidence_max
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(InspectionError::Config("synthetic frame size is zero".to_string()));
        }
        if let Some(calibration) = &self.calibration {
            if !(calibration.step_pct > 0.0 && calibration.step_pct <= 100.0) {
                return Err(InspectionError::Config(format!(
                    "calibration step {} outside (0, 100]",
                    calibration.step_pct
                )));
            }
        }
        Ok(())
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

/// One per-frame draw. Rendering never touches the RNG, so a seed fixes the
/// whole sequence of draws.
pub fn draw_defect<R: Rng>(rng: &mut R, config: &SyntheticConfig) -> Option<PlantedDefect> {
    if !rng.gen_bool(config.defect_probability) {
        return None;
    }
    let class_name = SYNTHETIC_DEFECTS[rng.gen_range(0..SYNTHETIC_DEFECTS.len())];
    let confidence = rng.gen_range(config.confidence_min..=config.confidence_max);
    Some(PlantedDefect {
        class_name,
        confidence,
    })
}

/// The first `count` draws a seeded source will make.
pub fn seeded_draws(seed: u64, config: &SyntheticConfig, count: usize) -> Vec<Option<PlantedDefect>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(|_| draw_defect(&mut rng, config)).collect()
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: ChaCha8Rng,
    open: bool,
    opened_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    sequence: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self, InspectionError> {
        config.validate()?;
        let rng = config.rng();
        Ok(Self {
            config,
            rng,
            open: false,
            opened_at: None,
            last_frame_at: None,
            sequence: 0,
        })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    pub fn open(&mut self) -> Result<(), InspectionError> {
        if !self.open {
            self.open = true;
            self.opened_at = Some(Instant::now());
            info!(
                "✅ Synthetic source ready ({}x{}, p={})",
                self.config.width, self.config.height, self.config.defect_probability
            );
        }
        Ok(())
    }

    pub fn next(&mut self, _timeout: Duration) -> Result<Frame, InspectionError> {
        if !self.open {
            return Err(InspectionError::Read("synthetic source is not open".to_string()));
        }
        if let Some(max) = self.config.max_frames {
            if self.sequence >= max {
                return Err(InspectionError::EndOfStream);
            }
        }

        if let Some(last) = self.last_frame_at {
            let interval = self.config.interval();
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }

        let planted = draw_defect(&mut self.rng, &self.config);
        self.sequence += 1;
        if let Some(defect) = &planted {
            debug!(
                "Planted {} ({:.1}) in frame {}",
                defect.class_name, defect.confidence, self.sequence
            );
        }

        let image = render_texture(
            self.config.width,
            self.config.height,
            self.sequence,
            planted.as_ref(),
        );

        let now = Instant::now();
        let timestamp = self
            .opened_at
            .map(|t| now.duration_since(t))
            .unwrap_or_default();
        self.last_frame_at = Some(now);

        Ok(
            Frame::from_rgb_image(image, timestamp, self.sequence, FrameOrigin::Synthetic)
                .with_label(SyntheticLabel { planted }),
        )
    }

    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            info!("🗑️ Synthetic source closed after {} frames", self.sequence);
        }
    }
}

impl FrameSource for SyntheticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }

    fn open(&mut self) -> Result<(), InspectionError> {
        SyntheticSource::open(self)
    }

    fn next(&mut self, timeout: Duration) -> Result<Frame, InspectionError> {
        SyntheticSource::next(self, timeout)
    }

    fn close(&mut self) {
        SyntheticSource::close(self)
    }
}

/// Plain-weave pattern; planted defects add a blotch whose position moves with
/// the sequence number.
fn render_texture(width: u32, height: u32, sequence: u64, planted: Option<&PlantedDefect>) -> RgbImage {
    let mut img = RgbImage::from_fn(width, height, |x, y| {
        let warp = (x / 3) % 2 == 0;
        let weft = (y / 3) % 2 == 0;
        let base: u8 = if warp == weft { 178 } else { 142 };
        let grain = ((x * 7 + y * 13) % 9) as u8;
        Rgb([base + grain, base - 8 + grain, base - 22 + grain])
    });

    let Some(defect) = planted else {
        return img;
    };

    let radius = (width.min(height) / 6).max(2) as i64;
    let cx = ((sequence * 37) % width as u64) as i64;
    let cy = ((sequence * 53) % height as u64) as i64;

    match defect.class_name {
        "Thread Break" => {
            let y = cy as u32;
            for x in 0..width {
                img.put_pixel(x, y, Rgb([235, 232, 225]));
            }
        }
        _ => {
            for y in (cy - radius).max(0)..(cy + radius).min(height as i64) {
                for x in (cx - radius).max(0)..(cx + radius).min(width as i64) {
                    let (dx, dy) = (x - cx, y - cy);
                    if dx * dx + dy * dy > radius * radius {
                        continue;
                    }
                    let px = img.get_pixel_mut(x as u32, y as u32);
                    *px = if defect.class_name == "Color Mismatch" {
                        Rgb([px[0] / 2, px[1], px[2].saturating_add(60)])
                    } else {
                        Rgb([px[0] / 3, px[1] / 3, px[2] / 3])
                    };
                }
            }
        }
    }
    img
}
