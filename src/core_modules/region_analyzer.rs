// THEORY:
// The `RegionAnomalyAnalyzer` is the workhorse of the spatial layer. It slices every
// incoming frame into a fixed grid and walks it cell by cell. It holds no per-cell
// memory of its own: all the learned state it needs lives in the shared
// `BackgroundModel`, so every region can be judged independently and, when there are
// cores to spare, in parallel.
//
// Per region:
// 1.  **Summarise** the pixels that deviate from the background by more than the
//     change threshold (the configured minimum, raised to the sensor noise floor when
//     noise reduction is on).
// 2.  **Gate** on evidence: regions with too few deviating pixels are noise.
// 3.  **Classify**: a large, internally uneven change is a distortion; otherwise the
//     sign of the change at the region centre says whether something appeared (mass)
//     or disappeared (void).
// 4.  **Score and place**: confidence grows with mean deviation; the region is lifted
//     into 3D with the fixed-FOV pinhole approximation.

use crate::core_modules::background_model::BackgroundModel;
use crate::core_modules::depth_region::depth_region::{DepthRegion, DeviationSummary};
use crate::core_modules::detection::{
    AnomalyInfo, AnomalyKind, DetectionDetails, DetectionType, SlsDetection,
};
use crate::core_modules::frame::DepthFrame;
use crate::core_modules::geometry::{BoundingBox3D, PinholeProjection, Vector3};
use crate::core_modules::thresholds::DetectionThresholds;
use rayon::prelude::*;
use tracing::debug;

pub const DEFAULT_REGION_SIZE: u32 = 32;
pub const MIN_REGION_PIXELS: usize = 10;

const DISTORTION_MIN_DIFF: f32 = 200.0;
const DISTORTION_MIN_RANGE: f32 = 100.0;
const MASS_VOID_OFFSET: f32 = 100.0;
const CONFIDENCE_FULL_SCALE_MM: f32 = 500.0;
const NOISE_FLOOR_SIGMAS: f32 = 3.0;

#[derive(Debug, Clone)]
pub struct RegionAnomalyAnalyzer {
    region_size: u32,
    projection: PinholeProjection,
    parallel: bool,
}

impl RegionAnomalyAnalyzer {
    pub fn new(region_size: u32, projection: PinholeProjection, parallel: bool) -> Self {
        Self {
            region_size: region_size.max(1),
            projection,
            parallel,
        }
    }

    /// Per-pixel change a reading must exceed to count as deviating.
    pub fn change_threshold(thresholds: &DetectionThresholds, background: &BackgroundModel) -> f32 {
        if thresholds.noise_reduction {
            thresholds
                .min_depth_change
                .max(NOISE_FLOOR_SIGMAS * background.noise_profile().spatial)
        } else {
            thresholds.min_depth_change
        }
    }

    fn regions(&self, width: u32, height: u32) -> Vec<DepthRegion> {
        let grid_width = width.div_ceil(self.region_size);
        let grid_height = height.div_ceil(self.region_size);
        let mut regions = Vec::with_capacity((grid_width * grid_height) as usize);
        for grid_y in 0..grid_height {
            for grid_x in 0..grid_width {
                regions.push(DepthRegion::new(grid_x, grid_y, self.region_size, width, height));
            }
        }
        regions
    }

    /// Compares `frame` against `background` region by region.
    ///
    /// Output is in row-major region order whether or not the walk ran in parallel.
    pub fn analyze(
        &self,
        frame: &DepthFrame,
        background: &BackgroundModel,
        thresholds: &DetectionThresholds,
    ) -> Vec<SlsDetection> {
        let min_change = Self::change_threshold(thresholds, background);
        let regions = self.regions(frame.width, frame.height);

        let evaluate = |region: &DepthRegion| {
            let summary = region.summarize(frame, background, min_change);
            self.evaluate_region(region, &summary, frame, background, thresholds)
        };

        let detections: Vec<SlsDetection> = if self.parallel {
            regions.par_iter().filter_map(evaluate).collect()
        } else {
            regions.iter().filter_map(evaluate).collect()
        };

        debug!(
            frame = frame.frame_number,
            regions = regions.len(),
            detections = detections.len(),
            min_change,
            "region analysis complete"
        );
        detections
    }

    fn evaluate_region(
        &self,
        region: &DepthRegion,
        summary: &DeviationSummary,
        frame: &DepthFrame,
        background: &BackgroundModel,
        thresholds: &DetectionThresholds,
    ) -> Option<SlsDetection> {
        if summary.count < MIN_REGION_PIXELS {
            return None;
        }

        let avg_diff = summary.average_diff();
        let avg_depth = summary.average_depth();
        let range = summary.depth_range();
        let (cx, cy) = region.center_pixel();
        let kind = classify(avg_diff, range, avg_depth, background.depth_at(cx, cy));

        let confidence = (avg_diff / CONFIDENCE_FULL_SCALE_MM).min(1.0);
        if confidence < thresholds.anomaly_intensity {
            return None;
        }

        let (px, py) = region.center();
        let position = self
            .projection
            .unproject(px, py, avg_depth, frame.width, frame.height);
        let size = Vector3::new(region.width() as f32, region.height() as f32, range);

        let info = AnomalyInfo {
            kind,
            region: BoundingBox3D::from_center_size(position, size),
            depth_deviation: avg_diff,
            volumetric: kind == AnomalyKind::Mass,
            intensity: confidence,
        };

        Some(
            SlsDetection::new(
                DetectionType::Anomaly,
                confidence,
                position,
                format!(
                    "Depth {kind} in region ({}, {}): {avg_diff:.0}mm mean deviation over {} pixels",
                    region.grid_x, region.grid_y, summary.count
                ),
                DetectionDetails::Anomaly(info),
            )
            .with_size(size),
        )
    }
}

/// Decides what kind of anomaly a deviating region is.
///
/// `expected` is the background depth at the region centre; 0 means unknown.
pub fn classify(avg_diff: f32, depth_range: f32, avg_depth: f32, expected: f32) -> AnomalyKind {
    if avg_diff > DISTORTION_MIN_DIFF && depth_range > DISTORTION_MIN_RANGE {
        return AnomalyKind::Distortion;
    }
    if expected <= 0.0 {
        return AnomalyKind::Unknown;
    }
    if avg_depth < expected - MASS_VOID_OFFSET {
        AnomalyKind::Mass
    } else if avg_depth > expected + MASS_VOID_OFFSET {
        AnomalyKind::Void
    } else {
        AnomalyKind::Unknown
    }
}
