// THEORY:
// The `BackgroundModel` is the learned "expected" scene. Rather than keeping a sliding
// window of statistics per region, it learns one depth value per pixel with an
// exponential moving average. Memory stays constant, and learning is slow enough that
// a figure standing still for a few frames does not immediately become part of the room.
//
// Key principles:
// 1.  **Lazy birth**: the model is created from the first frame it sees and is only
//     ever mutated afterwards, never rebuilt, until the owning detector is reset.
// 2.  **Missing readings never erode the baseline**: a `0` in the incoming frame means
//     "the sensor saw nothing", not "the wall moved to zero", so those pixels are
//     skipped. A baseline pixel that has never had a reading adopts the first valid
//     one it gets.
// 3.  **Noise profile**: on birth the model also estimates the sensor's spatial noise
//     from how much each pixel disagrees with its horizontal neighbours.

use crate::core_modules::frame::{DepthFrame, NO_READING};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoisePattern {
    Gaussian,
}

/// Sensor noise estimate, derived once from the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseProfile {
    /// RMS deviation of a pixel from its horizontal neighbours' mean, in millimetres.
    pub spatial: f32,
    /// Reserved; never populated.
    pub temporal: f32,
    pub pattern: NoisePattern,
}

impl NoiseProfile {
    /// Estimates spatial noise over interior pixels whose three horizontal samples are valid.
    pub fn estimate(frame: &DepthFrame) -> Self {
        let mut sum_sq = 0.0f64;
        let mut samples = 0u64;

        if frame.width >= 3 && frame.height >= 3 {
            for y in 1..frame.height - 1 {
                for x in 1..frame.width - 1 {
                    let i = frame.index(x, y);
                    let (left, center, right) = (
                        frame.depth_data[i - 1],
                        frame.depth_data[i],
                        frame.depth_data[i + 1],
                    );
                    if left == NO_READING || center == NO_READING || right == NO_READING {
                        continue;
                    }
                    let neighbour_mean = (f64::from(left) + f64::from(right)) / 2.0;
                    let deviation = f64::from(center) - neighbour_mean;
                    sum_sq += deviation * deviation;
                    samples += 1;
                }
            }
        }

        let spatial = if samples == 0 {
            0.0
        } else {
            (sum_sq / samples as f64).sqrt() as f32
        };

        Self {
            spatial,
            temporal: 0.0,
            pattern: NoisePattern::Gaussian,
        }
    }
}

/// Per-pixel adaptive depth baseline.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    depths: Vec<f32>,
    learning_rate: f32,
    noise: NoiseProfile,
    updates: u64,
}

impl BackgroundModel {
    /// Seeds the baseline from `frame` and estimates its noise profile.
    pub fn init(frame: &DepthFrame, learning_rate: f32) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            depths: frame.depth_data.iter().map(|&d| f32::from(d)).collect(),
            learning_rate: learning_rate.clamp(0.0, 1.0),
            noise: NoiseProfile::estimate(frame),
            updates: 0,
        }
    }

    /// Folds `frame` into the baseline with an exponential moving average.
    pub fn update(&mut self, frame: &DepthFrame) {
        let alpha = self.learning_rate;
        for (baseline, &reading) in self.depths.iter_mut().zip(frame.depth_data.iter()) {
            if reading == NO_READING {
                continue;
            }
            let reading = f32::from(reading);
            if *baseline <= 0.0 {
                *baseline = reading;
            } else {
                *baseline += alpha * (reading - *baseline);
            }
        }
        self.updates += 1;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn matches(&self, frame: &DepthFrame) -> bool {
        self.width == frame.width && self.height == frame.height
    }

    /// Baseline depth at `(x, y)`; 0 means no reading has ever been seen there.
    #[inline]
    pub fn depth_at(&self, x: u32, y: u32) -> f32 {
        self.depths[(y as usize) * (self.width as usize) + x as usize]
    }

    pub fn depths(&self) -> &[f32] {
        &self.depths
    }

    pub fn noise_profile(&self) -> NoiseProfile {
        self.noise
    }

    /// Number of frames folded in since initialization.
    pub fn update_count(&self) -> u64 {
        self.updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_frame_has_no_spatial_noise() {
        let frame = DepthFrame::filled(8, 8, 2000, 0.0, 0);
        assert_eq!(NoiseProfile::estimate(&frame).spatial, 0.0);
    }

    #[test]
    fn noise_is_rms_of_neighbour_deviation() {
        // Alternating 1000/1010 columns: every interior pixel is 10mm off its neighbours' mean.
        let data: Vec<u16> = (0..5 * 3).map(|i| if i % 2 == 0 { 1000 } else { 1010 }).collect();
        let frame = DepthFrame::new(data, 5, 3, 0.0, 0).unwrap();
        let noise = NoiseProfile::estimate(&frame);
        assert_relative_eq!(noise.spatial, 10.0, epsilon = 1e-4);
        assert_eq!(noise.temporal, 0.0);
    }

    #[test]
    fn noise_ignores_missing_samples() {
        let mut data = vec![1000u16; 5 * 3];
        // Middle row: a hole next to a spike would dominate if holes counted as zero.
        data[5 + 1] = 0;
        data[5 + 2] = 1500;
        let frame = DepthFrame::new(data, 5, 3, 0.0, 0).unwrap();
        let noise = NoiseProfile::estimate(&frame);
        // Only x=3 on the middle row qualifies: |1000 - (1500 + 1000)/2| = 250.
        assert_relative_eq!(noise.spatial, 250.0, epsilon = 1e-3);
    }

    #[test]
    fn update_is_exponential_moving_average() {
        let mut model = BackgroundModel::init(&DepthFrame::filled(2, 2, 2000, 0.0, 0), DEFAULT_LEARNING_RATE);
        model.update(&DepthFrame::filled(2, 2, 1000, 1.0, 1));
        assert_relative_eq!(model.depth_at(0, 0), 1990.0, epsilon = 1e-3);
        assert_eq!(model.update_count(), 1);
    }

    #[test]
    fn missing_readings_do_not_erode_baseline() {
        let mut model = BackgroundModel::init(&DepthFrame::filled(2, 2, 2000, 0.0, 0), DEFAULT_LEARNING_RATE);
        for n in 1..50 {
            model.update(&DepthFrame::filled(2, 2, 0, f64::from(n), n));
        }
        assert_relative_eq!(model.depth_at(1, 1), 2000.0);
    }

    #[test]
    fn unseen_pixel_adopts_first_reading() {
        let first = DepthFrame::new(vec![0, 2000, 2000, 2000], 2, 2, 0.0, 0).unwrap();
        let mut model = BackgroundModel::init(&first, DEFAULT_LEARNING_RATE);
        assert_eq!(model.depth_at(0, 0), 0.0);
        model.update(&DepthFrame::filled(2, 2, 1800, 1.0, 1));
        assert_relative_eq!(model.depth_at(0, 0), 1800.0);
    }
}
