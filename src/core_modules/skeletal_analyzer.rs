// THEORY:
// The `SkeletalAnomalyAnalyzer` judges the bodies the sensor's pose estimator hands us.
// It does not track them; every skeleton is assessed on its own, frame by frame.
//
// Two questions are asked of each skeleton:
// 1.  **Is it only partly there?** A body whose tracked-joint ratio sits strictly
//     between 0.3 and 0.7 is reported as a partial figure. Below that band it is
//     probably a false positive from the pose estimator; above it, an ordinary person.
// 2.  **Are its bones plausible?** Every bone in the standard table is measured. A bone
//     longer than a metre or shorter than five centimetres cannot belong to a human
//     body. All implausible bones of one skeleton are reported together as a single
//     skeletal detection.

use crate::core_modules::detection::{
    BoneAnomaly, BoneDefect, DetectionDetails, DetectionType, SlsDetection,
};
use crate::core_modules::frame::{BONES, Skeleton};
use tracing::debug;

const PARTIAL_FIGURE_MIN: f32 = 0.3;
const PARTIAL_FIGURE_MAX: f32 = 0.7;
const MAX_BONE_LENGTH_MM: f32 = 1000.0;
const MIN_BONE_LENGTH_MM: f32 = 50.0;
const SKELETAL_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone, Copy, Default)]
pub struct SkeletalAnomalyAnalyzer;

impl SkeletalAnomalyAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, skeletons: &[Skeleton]) -> Vec<SlsDetection> {
        let mut detections = Vec::new();
        for skeleton in skeletons {
            let Some(anchor) = skeleton.anchor() else {
                continue;
            };

            let completeness = skeleton.completeness();
            if completeness > PARTIAL_FIGURE_MIN && completeness < PARTIAL_FIGURE_MAX {
                detections.push(SlsDetection::new(
                    DetectionType::Figure,
                    skeleton.confidence,
                    anchor,
                    format!(
                        "Partial figure: skeleton {} has {:.0}% of joints tracked",
                        skeleton.id,
                        completeness * 100.0
                    ),
                    DetectionDetails::Figure {
                        completeness,
                        skeleton: skeleton.clone(),
                    },
                ));
            }

            let bones = implausible_bones(skeleton);
            if !bones.is_empty() {
                let listing = bones
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                detections.push(SlsDetection::new(
                    DetectionType::Skeletal,
                    SKELETAL_CONFIDENCE,
                    anchor,
                    format!("Skeletal anomaly on skeleton {}: {listing}", skeleton.id),
                    DetectionDetails::Skeletal {
                        bones,
                        skeleton: skeleton.clone(),
                    },
                ));
            }
        }

        debug!(
            skeletons = skeletons.len(),
            detections = detections.len(),
            "skeletal analysis complete"
        );
        detections
    }
}

/// Bones of `skeleton` whose length falls outside the human range.
///
/// Bones with a missing or untracked end are skipped.
pub fn implausible_bones(skeleton: &Skeleton) -> Vec<BoneAnomaly> {
    BONES
        .iter()
        .filter_map(|&(from, to)| {
            let a = skeleton.joint(from).filter(|j| j.tracked)?;
            let b = skeleton.joint(to).filter(|j| j.tracked)?;
            let length_mm = a.position.distance(&b.position);
            let defect = if length_mm > MAX_BONE_LENGTH_MM {
                BoneDefect::Stretched
            } else if length_mm < MIN_BONE_LENGTH_MM {
                BoneDefect::Compressed
            } else {
                return None;
            };
            Some(BoneAnomaly {
                from,
                to,
                length_mm,
                defect,
            })
        })
        .collect()
}
