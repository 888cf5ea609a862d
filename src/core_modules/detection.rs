// THEORY:
// The `detection` module is the engine's output vocabulary. Every analyzer, whatever
// it looks at (depth regions, point clusters, skeletons, frame triples, silhouettes),
// reports its findings as `SlsDetection` records so that the filter/merge stage and
// the event layer can treat them uniformly.
//
// Analyzer-specific evidence travels in `DetectionDetails`, a tagged union with one
// variant per kind of finding. Consumers match on it exhaustively instead of probing
// an open property bag.

use crate::core_modules::frame::{JointType, Skeleton};
use crate::core_modules::geometry::{BoundingBox3D, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionType {
    Anomaly,
    Manifestation,
    Figure,
    Skeletal,
    Distortion,
    Shadow,
}

impl DetectionType {
    pub const ALL: [DetectionType; 6] = [
        DetectionType::Anomaly,
        DetectionType::Manifestation,
        DetectionType::Figure,
        DetectionType::Skeletal,
        DetectionType::Distortion,
        DetectionType::Shadow,
    ];
}

impl fmt::Display for DetectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionType::Anomaly => "anomaly",
            DetectionType::Manifestation => "manifestation",
            DetectionType::Figure => "figure",
            DetectionType::Skeletal => "skeletal",
            DetectionType::Distortion => "distortion",
            DetectionType::Shadow => "shadow",
        };
        f.write_str(name)
    }
}

/// How a depth region differs from the learned background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Something is farther away than expected.
    Void,
    /// Something is nearer than expected.
    Mass,
    /// Large, internally inconsistent change.
    Distortion,
    Unknown,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnomalyKind::Void => "void",
            AnomalyKind::Mass => "mass",
            AnomalyKind::Distortion => "distortion",
            AnomalyKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Evidence for a depth-region anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyInfo {
    pub kind: AnomalyKind,
    pub region: BoundingBox3D,
    /// Mean absolute deviation from the background, in millimetres.
    pub depth_deviation: f32,
    pub volumetric: bool,
    pub intensity: f32,
}

/// Evidence for a point-cloud cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub point_count: usize,
    pub volume_m3: f32,
    /// Points per cubic metre.
    pub density: f32,
    pub bounds: BoundingBox3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoneDefect {
    Stretched,
    Compressed,
}

/// A bone whose length is not physically plausible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneAnomaly {
    pub from: JointType,
    pub to: JointType,
    pub length_mm: f32,
    pub defect: BoneDefect,
}

impl fmt::Display for BoneAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.defect {
            BoneDefect::Stretched => "stretched limb",
            BoneDefect::Compressed => "compressed limb",
        };
        write!(f, "{:?}-{:?}: {} ({:.0}mm)", self.from, self.to, label, self.length_mm)
    }
}

/// A rapid-then-stable depth change at one sampled pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplacementInfo {
    pub pixel: (u32, u32),
    /// |middle - oldest| in millimetres.
    pub initial_change: f32,
    /// |newest - middle| in millimetres.
    pub settled_change: f32,
}

/// A humanoid silhouette cut out of depth discontinuities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilhouetteInfo {
    pub width_px: u32,
    pub height_px: u32,
    pub aspect_ratio: f32,
    pub average_depth: f32,
}

/// Analyzer-specific payload of a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectionDetails {
    Anomaly(AnomalyInfo),
    Manifestation(ClusterInfo),
    Figure {
        completeness: f32,
        skeleton: Skeleton,
    },
    Skeletal {
        bones: Vec<BoneAnomaly>,
        skeleton: Skeleton,
    },
    Distortion(DisplacementInfo),
    Shadow(SilhouetteInfo),
}

/// The universal detection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlsDetection {
    pub id: u64,
    pub detection_type: DetectionType,
    confidence: f32,
    pub timestamp: f64,
    pub frame_number: u32,
    pub position: Vector3,
    pub size: Option<Vector3>,
    pub description: String,
    pub details: DetectionDetails,
}

impl SlsDetection {
    /// Creates a detection with an unassigned id; the detector stamps ids later.
    pub fn new(
        detection_type: DetectionType,
        confidence: f32,
        position: Vector3,
        description: impl Into<String>,
        details: DetectionDetails,
    ) -> Self {
        Self {
            id: 0,
            detection_type,
            confidence: clamp_confidence(confidence),
            timestamp: 0.0,
            frame_number: 0,
            position,
            size: None,
            description: description.into(),
            details,
        }
    }

    pub fn with_size(mut self, size: Vector3) -> Self {
        self.size = Some(size);
        self
    }

    pub fn at_frame(mut self, timestamp: f64, frame_number: u32) -> Self {
        self.timestamp = timestamp;
        self.frame_number = frame_number;
        self
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = clamp_confidence(confidence);
    }

    /// Volume implied by `size` in cubic metres, if a size is present.
    pub fn volume_m3(&self) -> Option<f32> {
        self.size
            .map(|s| s.volume() / crate::core_modules::geometry::MM3_PER_M3)
    }

    pub fn anomaly(&self) -> Option<&AnomalyInfo> {
        match &self.details {
            DetectionDetails::Anomaly(info) => Some(info),
            _ => None,
        }
    }

    pub fn skeleton(&self) -> Option<&Skeleton> {
        match &self.details {
            DetectionDetails::Figure { skeleton, .. } | DetectionDetails::Skeletal { skeleton, .. } => {
                Some(skeleton)
            }
            _ => None,
        }
    }
}

/// Clamps to `[0, 1]`; NaN becomes 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Everything the detector found in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<SlsDetection>,
    /// Mean confidence across `detections`, 0 when there are none.
    pub confidence: f32,
    pub frame_number: u32,
    pub timestamp: f64,
}

impl DetectionResult {
    pub fn new(detections: Vec<SlsDetection>, frame_number: u32, timestamp: f64) -> Self {
        let confidence = if detections.is_empty() {
            0.0
        } else {
            detections.iter().map(|d| d.confidence()).sum::<f32>() / detections.len() as f32
        };
        Self {
            detections,
            confidence: clamp_confidence(confidence),
            frame_number,
            timestamp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn shadow(confidence: f32) -> SlsDetection {
        SlsDetection::new(
            DetectionType::Shadow,
            confidence,
            Vector3::ZERO,
            "test",
            DetectionDetails::Shadow(SilhouetteInfo {
                width_px: 10,
                height_px: 40,
                aspect_ratio: 4.0,
                average_depth: 1000.0,
            }),
        )
    }

    #[test]
    fn confidence_is_always_clamped() {
        assert_eq!(shadow(1.7).confidence(), 1.0);
        assert_eq!(shadow(-0.2).confidence(), 0.0);
        assert_eq!(shadow(f32::NAN).confidence(), 0.0);
        let mut d = shadow(0.5);
        d.set_confidence(3.0);
        assert_eq!(d.confidence(), 1.0);
    }

    #[test]
    fn result_confidence_is_mean() {
        let result = DetectionResult::new(vec![shadow(0.4), shadow(0.8)], 3, 100.0);
        assert_relative_eq!(result.confidence, 0.6, epsilon = 1e-6);
        assert_eq!(DetectionResult::new(Vec::new(), 0, 0.0).confidence, 0.0);
    }

    #[test]
    fn volume_uses_size_in_millimetres() {
        let d = shadow(0.5).with_size(Vector3::new(100.0, 100.0, 100.0));
        assert_relative_eq!(d.volume_m3().unwrap(), 0.001, epsilon = 1e-9);
        assert!(shadow(0.5).volume_m3().is_none());
    }

    #[test]
    fn bone_anomaly_reads_naturally() {
        let bone = BoneAnomaly {
            from: JointType::ElbowLeft,
            to: JointType::WristLeft,
            length_mm: 1234.4,
            defect: BoneDefect::Stretched,
        };
        assert_eq!(bone.to_string(), "ElbowLeft-WristLeft: stretched limb (1234mm)");
    }
}
