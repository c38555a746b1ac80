//! Classical texture statistics used to confirm model outputs.

use crate::core::capture::frame::Frame;
use crate::core::error::InspectionError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Fraction of interior pixels on an edge, 0-1
    pub edge_density: f32,
    /// Same fraction at the lower weave threshold, used by the fabric rules
    #[serde(default)]
    pub weave_edge_density: f32,
    /// Laplacian variance
    pub sharpness: f32,
    /// Mean of the per-channel standard deviations
    pub color_uniformity: f32,
    /// Mean gray level, 0-255
    pub brightness: f32,
    /// Gray standard deviation
    pub contrast: f32,
}

pub const DEFAULT_EDGE_THRESHOLD: u8 = 50;
pub const DEFAULT_WEAVE_EDGE_THRESHOLD: u8 = 30;

pub struct FeatureExtractor {
    edge_threshold: i32,
    weave_edge_threshold: i32,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_EDGE_THRESHOLD, DEFAULT_WEAVE_EDGE_THRESHOLD)
    }

    /// Gradient magnitudes for the defect edge map and the weave edge map.
    pub fn with_thresholds(edge_threshold: u8, weave_edge_threshold: u8) -> Self {
        Self {
            edge_threshold: edge_threshold as i32,
            weave_edge_threshold: weave_edge_threshold as i32,
        }
    }

    pub fn extract(&self, frame: &Frame) -> Result<FeatureSet, InspectionError> {
        if !frame.is_well_formed() {
            return Err(InspectionError::InvalidFrame(format!(
                "{}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }

        let w = frame.width as usize;
        let h = frame.height as usize;
        let gray = frame.to_gray();

        let (brightness, contrast) = Self::mean_std(&gray, w);
        let color_uniformity = Self::channel_spread(&frame.data, w);
        let (edge_density, weave_edge_density, sharpness) = self.edges_and_laplacian(&gray, w, h);

        Ok(FeatureSet {
            edge_density,
            weave_edge_density,
            sharpness,
            color_uniformity,
            brightness,
            contrast,
        })
    }

    fn mean_std(gray: &[u8], w: usize) -> (f32, f32) {
        let (sum, sum_sq) = gray
            .par_chunks(w)
            .map(|row| {
                row.iter().fold((0u64, 0u64), |(s, sq), &v| {
                    let v = v as u64;
                    (s + v, sq + v * v)
                })
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        let n = gray.len() as f64;
        let mean = sum as f64 / n;
        let variance = (sum_sq as f64 / n - mean * mean).max(0.0);
        (mean as f32, variance.sqrt() as f32)
    }

    fn channel_spread(rgb: &[u8], w: usize) -> f32 {
        let (sums, sums_sq) = rgb
            .par_chunks(w * 3)
            .map(|row| {
                let mut sums = [0u64; 3];
                let mut sums_sq = [0u64; 3];
                for px in row.chunks_exact(3) {
                    for c in 0..3 {
                        let v = px[c] as u64;
                        sums[c] += v;
                        sums_sq[c] += v * v;
                    }
                }
                (sums, sums_sq)
            })
            .reduce(
                || ([0u64; 3], [0u64; 3]),
                |mut a, b| {
                    for c in 0..3 {
                        a.0[c] += b.0[c];
                        a.1[c] += b.1[c];
                    }
                    a
                },
            );

        let n = (rgb.len() / 3) as f64;
        let total: f64 = (0..3)
            .map(|c| {
                let mean = sums[c] as f64 / n;
                (sums_sq[c] as f64 / n - mean * mean).max(0.0).sqrt()
            })
            .sum();
        (total / 3.0) as f32
    }

    /// Central-difference edge fractions at both thresholds and the
    /// 4-neighbour Laplacian variance, all over interior pixels.
    fn edges_and_laplacian(&self, gray: &[u8], w: usize, h: usize) -> (f32, f32, f32) {
        if w < 3 || h < 3 {
            return (0.0, 0.0, 0.0);
        }

        let threshold_sq = self.edge_threshold * self.edge_threshold;
        let weave_threshold_sq = self.weave_edge_threshold * self.weave_edge_threshold;
        let (edges, weave_edges, lap_sum, lap_sum_sq) = (1..h - 1)
            .into_par_iter()
            .map(|y| {
                let mut edges = 0u64;
                let mut weave_edges = 0u64;
                let mut lap_sum = 0i64;
                let mut lap_sum_sq = 0u64;
                for x in 1..w - 1 {
                    let idx = y * w + x;
                    let c = gray[idx] as i32;
                    let left = gray[idx - 1] as i32;
                    let right = gray[idx + 1] as i32;
                    let up = gray[idx - w] as i32;
                    let down = gray[idx + w] as i32;

                    let gx = right - left;
                    let gy = down - up;
                    let magnitude_sq = gx * gx + gy * gy;
                    if magnitude_sq > threshold_sq {
                        edges += 1;
                    }
                    if magnitude_sq > weave_threshold_sq {
                        weave_edges += 1;
                    }

                    let lap = (4 * c - left - right - up - down) as i64;
                    lap_sum += lap;
                    lap_sum_sq += (lap * lap) as u64;
                }
                (edges, weave_edges, lap_sum, lap_sum_sq)
            })
            .reduce(
                || (0, 0, 0, 0),
                |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2, a.3 + b.3),
            );

        let interior = ((w - 2) * (h - 2)) as f64;
        let lap_mean = lap_sum as f64 / interior;
        let lap_var = (lap_sum_sq as f64 / interior - lap_mean * lap_mean).max(0.0);
        (
            (edges as f64 / interior) as f32,
            (weave_edges as f64 / interior) as f32,
            lap_var as f32,
        )
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}
