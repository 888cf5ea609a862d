// THEORY:
// The `TemporalAnomalyAnalyzer` looks for things that moved and then stopped. It reads
// the last three buffered frames and, on a sparse lattice of sample pixels, asks:
// "did this reading jump between the oldest and middle frames, and then hold still
// between the middle and newest?" A jump followed by stillness is a displacement, not
// noise (noise keeps jittering) and not ongoing motion (motion keeps changing).
//
// The lattice stride trades recall for cost: with the default stride of 16 a 640x480
// frame is sampled at 1200 points instead of 307200.

use crate::core_modules::detection::{
    DetectionDetails, DetectionType, DisplacementInfo, SlsDetection,
};
use crate::core_modules::frame::DepthFrame;
use crate::core_modules::geometry::PinholeProjection;
use tracing::debug;

pub const DEFAULT_TEMPORAL_STRIDE: u32 = 16;

const RAPID_CHANGE_MM: f32 = 200.0;
const SETTLED_CHANGE_MM: f32 = 50.0;
const CONFIDENCE_FULL_SCALE_MM: f32 = 500.0;

#[derive(Debug, Clone)]
pub struct TemporalAnomalyAnalyzer {
    stride: u32,
    projection: PinholeProjection,
}

impl Default for TemporalAnomalyAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPORAL_STRIDE, PinholeProjection::default())
    }
}

impl TemporalAnomalyAnalyzer {
    pub fn new(stride: u32, projection: PinholeProjection) -> Self {
        Self {
            stride: stride.max(1),
            projection,
        }
    }

    /// `frames` is `[oldest, middle, newest]`. Frames of differing size yield nothing.
    pub fn analyze(&self, frames: [&DepthFrame; 3]) -> Vec<SlsDetection> {
        let [oldest, middle, newest] = frames;
        if !oldest.same_dimensions(middle) || !middle.same_dimensions(newest) {
            debug!(
                frame = newest.frame_number,
                "temporal analysis skipped: buffered frames differ in size"
            );
            return Vec::new();
        }

        let mut detections = Vec::new();
        for y in (0..newest.height).step_by(self.stride as usize) {
            for x in (0..newest.width).step_by(self.stride as usize) {
                let (Some(d1), Some(d2), Some(d3)) = (
                    oldest.get_valid(x, y),
                    middle.get_valid(x, y),
                    newest.get_valid(x, y),
                ) else {
                    continue;
                };

                let change12 = (f32::from(d2) - f32::from(d1)).abs();
                let change23 = (f32::from(d3) - f32::from(d2)).abs();
                if change12 <= RAPID_CHANGE_MM || change23 >= SETTLED_CHANGE_MM {
                    continue;
                }

                let position = self.projection.unproject(
                    x as f32,
                    y as f32,
                    f32::from(d3),
                    newest.width,
                    newest.height,
                );
                detections.push(SlsDetection::new(
                    DetectionType::Distortion,
                    change12 / CONFIDENCE_FULL_SCALE_MM,
                    position,
                    format!(
                        "Spatial displacement at pixel ({x}, {y}): {change12:.0}mm jump, settled within {change23:.0}mm"
                    ),
                    DetectionDetails::Distortion(DisplacementInfo {
                        pixel: (x, y),
                        initial_change: change12,
                        settled_change: change23,
                    }),
                ));
            }
        }

        debug!(
            frame = newest.frame_number,
            detections = detections.len(),
            "temporal analysis complete"
        );
        detections
    }
}
