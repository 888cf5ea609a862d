// THEORY:
// The `ShadowFigureDetector` looks for tall, narrow, human-proportioned outlines in the
// depth image that no skeleton accounts for. It is split in two:
// 1.  **Extraction** is delegated to a `SilhouetteExtractor`. Cutting silhouettes out of
//     depth discontinuities is sensor-specific work, so the detector takes any
//     implementation and ships with `NoSilhouettes`, which finds nothing.
// 2.  **Screening** is done here: a silhouette is kept only if its height is between
//     three and eight times its width, and it is placed in 3D at its centroid with the
//     mean valid depth found under its pixels.

use crate::core_modules::detection::{
    DetectionDetails, DetectionType, SilhouetteInfo, SlsDetection,
};
use crate::core_modules::frame::DepthFrame;
use crate::core_modules::geometry::PinholeProjection;
use tracing::debug;

const MIN_ASPECT_RATIO: f32 = 3.0;
const MAX_ASPECT_RATIO: f32 = 8.0;

/// A candidate outline in pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct Silhouette {
    /// Top-left corner of the bounding box.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Centroid in pixel coordinates.
    pub centroid: (f32, f32),
    /// How sharply the outline stands out, in `[0, 1]`.
    pub strength: f32,
    /// Pixels covered by the outline.
    pub pixels: Vec<(u32, u32)>,
}

impl Silhouette {
    /// Height over width; `None` for a zero-width box.
    pub fn aspect_ratio(&self) -> Option<f32> {
        (self.width > 0).then(|| self.height as f32 / self.width as f32)
    }
}

/// Source of silhouettes for one depth frame.
pub trait SilhouetteExtractor: Send {
    fn extract(&mut self, frame: &DepthFrame) -> Vec<Silhouette>;
}

/// Extractor that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSilhouettes;

impl SilhouetteExtractor for NoSilhouettes {
    fn extract(&mut self, _frame: &DepthFrame) -> Vec<Silhouette> {
        Vec::new()
    }
}

impl<F> SilhouetteExtractor for F
where
    F: FnMut(&DepthFrame) -> Vec<Silhouette> + Send,
{
    fn extract(&mut self, frame: &DepthFrame) -> Vec<Silhouette> {
        self(frame)
    }
}

pub struct ShadowFigureDetector {
    extractor: Box<dyn SilhouetteExtractor>,
    projection: PinholeProjection,
}

impl std::fmt::Debug for ShadowFigureDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowFigureDetector")
            .field("projection", &self.projection)
            .finish_non_exhaustive()
    }
}

impl Default for ShadowFigureDetector {
    fn default() -> Self {
        Self::new(Box::new(NoSilhouettes), PinholeProjection::default())
    }
}

impl ShadowFigureDetector {
    pub fn new(extractor: Box<dyn SilhouetteExtractor>, projection: PinholeProjection) -> Self {
        Self {
            extractor,
            projection,
        }
    }

    pub fn analyze(&mut self, frame: &DepthFrame) -> Vec<SlsDetection> {
        let silhouettes = self.extractor.extract(frame);
        let detections: Vec<SlsDetection> = silhouettes
            .iter()
            .filter_map(|s| self.evaluate(s, frame))
            .collect();
        debug!(
            frame = frame.frame_number,
            silhouettes = silhouettes.len(),
            detections = detections.len(),
            "shadow analysis complete"
        );
        detections
    }

    fn evaluate(&self, silhouette: &Silhouette, frame: &DepthFrame) -> Option<SlsDetection> {
        let aspect_ratio = silhouette.aspect_ratio()?;
        if !(MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&aspect_ratio) {
            return None;
        }

        let (sum, count) = silhouette
            .pixels
            .iter()
            .filter_map(|&(x, y)| frame.get_valid(x, y))
            .fold((0u64, 0u64), |(sum, count), d| (sum + u64::from(d), count + 1));
        if count == 0 {
            return None;
        }
        let average_depth = (sum as f64 / count as f64) as f32;

        let (cx, cy) = silhouette.centroid;
        let position = self
            .projection
            .unproject(cx, cy, average_depth, frame.width, frame.height);

        Some(SlsDetection::new(
            DetectionType::Shadow,
            silhouette.strength,
            position,
            format!(
                "Shadow figure {}x{}px (aspect {aspect_ratio:.1}) at {average_depth:.0}mm",
                silhouette.width, silhouette.height
            ),
            DetectionDetails::Shadow(SilhouetteInfo {
                width_px: silhouette.width,
                height_px: silhouette.height,
                aspect_ratio,
                average_depth,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn silhouette(x: u32, y: u32, width: u32, height: u32) -> Silhouette {
        let pixels = (y..y + height)
            .flat_map(|py| (x..x + width).map(move |px| (px, py)))
            .collect();
        Silhouette {
            x,
            y,
            width,
            height,
            centroid: (x as f32 + width as f32 / 2.0, y as f32 + height as f32 / 2.0),
            strength: 0.7,
            pixels,
        }
    }

    #[test]
    fn default_detector_finds_nothing() {
        let frame = DepthFrame::filled(64, 64, 2000, 0.0, 0);
        assert!(ShadowFigureDetector::default().analyze(&frame).is_empty());
    }

    #[test]
    fn human_proportions_are_kept() {
        let mut frame = DepthFrame::filled(64, 64, 3000, 0.0, 0);
        for (x, y) in silhouette(30, 10, 8, 40).pixels {
            let i = frame.index(x, y);
            frame.depth_data[i] = 1500;
        }
        let extractor = |_: &DepthFrame| vec![silhouette(30, 10, 8, 40), silhouette(0, 0, 20, 20)];
        let mut detector = ShadowFigureDetector::new(Box::new(extractor), PinholeProjection::default());

        let detections = detector.analyze(&frame);
        assert_eq!(detections.len(), 1);
        let shadow = &detections[0];
        assert_eq!(shadow.detection_type, DetectionType::Shadow);
        assert_relative_eq!(shadow.confidence(), 0.7);
        assert_relative_eq!(shadow.position.z, 1500.0);
        match &shadow.details {
            DetectionDetails::Shadow(info) => assert_relative_eq!(info.aspect_ratio, 5.0),
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn silhouette_over_missing_depth_is_dropped() {
        let frame = DepthFrame::filled(64, 64, 0, 0.0, 0);
        let extractor = |_: &DepthFrame| vec![silhouette(30, 10, 8, 40)];
        let mut detector = ShadowFigureDetector::new(Box::new(extractor), PinholeProjection::default());
        assert!(detector.analyze(&frame).is_empty());
    }
}
