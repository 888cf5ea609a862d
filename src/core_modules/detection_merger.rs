// THEORY:
// The `DetectionFilterMerger` is the last stage before results leave the detector.
// Several analyzers, or several neighbouring regions of the same analyzer, routinely
// report the same physical event; the merger turns those into one detection.
//
// 1.  **Filter**: drop anything under the global confidence cutoff, and anything with a
//     known size whose volume is under the minimum.
// 2.  **Group**: survivors within the merge distance of each other are linked, and
//     links are transitive (single-link), as in blob region growing but over a
//     handful of 3D positions instead of a grid.
// 3.  **Collapse**: a group of one passes through untouched. A larger group becomes
//     one detection at the members' mean position with their mean confidence; the
//     first member (in analyzer order) lends it its type, payload and identity. An
//     anomaly payload is recentred on the merged position and takes the merged
//     confidence as its intensity.

use crate::core_modules::detection::{DetectionDetails, SlsDetection};
use crate::core_modules::geometry::{BoundingBox3D, Vector3};
use crate::core_modules::thresholds::DetectionThresholds;
use std::collections::VecDeque;

pub const DEFAULT_MERGE_DISTANCE_MM: f32 = 200.0;

#[derive(Debug, Clone)]
pub struct DetectionFilterMerger {
    merge_distance: f32,
}

impl Default for DetectionFilterMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_DISTANCE_MM)
    }
}

impl DetectionFilterMerger {
    pub fn new(merge_distance: f32) -> Self {
        Self {
            merge_distance: merge_distance.max(0.0),
        }
    }

    pub fn filter_and_merge(
        &self,
        detections: Vec<SlsDetection>,
        thresholds: &DetectionThresholds,
    ) -> Vec<SlsDetection> {
        let survivors: Vec<SlsDetection> = detections
            .into_iter()
            .filter(|d| passes(d, thresholds))
            .collect();
        self.merge(survivors)
    }

    /// Collapses single-link proximity groups.
    pub fn merge(&self, detections: Vec<SlsDetection>) -> Vec<SlsDetection> {
        self.groups(&detections)
            .into_iter()
            .map(|group| collapse(&detections, &group))
            .collect()
    }

    /// Index groups, each in ascending order, ordered by their first member.
    fn groups(&self, detections: &[SlsDetection]) -> Vec<Vec<usize>> {
        let limit_sq = self.merge_distance * self.merge_distance;
        let mut assigned = vec![false; detections.len()];
        let mut groups = Vec::new();
        let mut queue = VecDeque::new();

        for seed in 0..detections.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;
            queue.push_back(seed);
            let mut group = Vec::new();

            while let Some(current) = queue.pop_front() {
                group.push(current);
                let here = detections[current].position;
                for (other, candidate) in detections.iter().enumerate() {
                    if !assigned[other] && here.distance_squared(&candidate.position) <= limit_sq {
                        assigned[other] = true;
                        queue.push_back(other);
                    }
                }
            }

            group.sort_unstable();
            groups.push(group);
        }

        groups
    }
}

fn passes(detection: &SlsDetection, thresholds: &DetectionThresholds) -> bool {
    if detection.confidence() < thresholds.anomaly_intensity {
        return false;
    }
    match detection.volume_m3() {
        Some(volume) => volume >= thresholds.min_volume_size,
        None => true,
    }
}

fn collapse(detections: &[SlsDetection], group: &[usize]) -> SlsDetection {
    let first = &detections[group[0]];
    if group.len() == 1 {
        return first.clone();
    }

    let members = group.iter().map(|&i| &detections[i]);
    let position = Vector3::mean(members.clone().map(|d| &d.position)).unwrap_or(first.position);
    let confidence = members.map(|d| d.confidence()).sum::<f32>() / group.len() as f32;

    let mut merged = first.clone();
    merged.position = position;
    merged.set_confidence(confidence);
    merged.description = format!(
        "{} (merged from {} detections)",
        first.description,
        group.len()
    );
    let intensity = merged.confidence();
    if let DetectionDetails::Anomaly(info) = &mut merged.details {
        info.intensity = intensity;
        info.region = BoundingBox3D::from_center_size(position, info.region.size);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::{AnomalyInfo, AnomalyKind, DetectionType, DisplacementInfo};
    use approx::assert_relative_eq;

    fn detection(x: f32, confidence: f32) -> SlsDetection {
        SlsDetection::new(
            DetectionType::Distortion,
            confidence,
            Vector3::new(x, 0.0, 2000.0),
            "test",
            DetectionDetails::Distortion(DisplacementInfo {
                pixel: (0, 0),
                initial_change: 300.0,
                settled_change: 0.0,
            }),
        )
    }

    #[test]
    fn near_detections_merge_to_their_mean() {
        let merged = DetectionFilterMerger::default()
            .filter_and_merge(vec![detection(0.0, 0.6), detection(50.0, 0.8)], &DetectionThresholds::default());
        assert_eq!(merged.len(), 1);
        assert_relative_eq!(merged[0].position.x, 25.0);
        assert_relative_eq!(merged[0].confidence(), 0.7, epsilon = 1e-6);
        assert!(merged[0].description.contains("merged from 2 detections"));
    }

    fn mass(x: f32, confidence: f32) -> SlsDetection {
        let position = Vector3::new(x, 0.0, 1800.0);
        let size = Vector3::new(32.0, 32.0, 10.0);
        SlsDetection::new(
            DetectionType::Anomaly,
            confidence,
            position,
            "mass",
            DetectionDetails::Anomaly(AnomalyInfo {
                kind: AnomalyKind::Mass,
                region: BoundingBox3D::from_center_size(position, size),
                depth_deviation: 200.0,
                volumetric: true,
                intensity: confidence,
            }),
        )
    }

    #[test]
    fn merged_anomaly_payload_follows_the_group() {
        let merged = DetectionFilterMerger::default().merge(vec![mass(0.0, 0.4), mass(100.0, 0.8)]);
        assert_eq!(merged.len(), 1);
        let info = merged[0].anomaly().unwrap();
        assert_relative_eq!(info.intensity, merged[0].confidence());
        assert_relative_eq!(info.intensity, 0.6, epsilon = 1e-6);
        assert_relative_eq!(info.region.center.x, 50.0, epsilon = 1e-4);
        assert_relative_eq!(info.region.center.z, 1800.0, epsilon = 1e-3);
        assert_relative_eq!(info.region.size.x, 32.0, epsilon = 1e-4);
        assert_eq!(info.kind, AnomalyKind::Mass);
    }

    #[test]
    fn distant_detections_stay_apart() {
        let merged = DetectionFilterMerger::default()
            .filter_and_merge(vec![detection(0.0, 0.6), detection(500.0, 0.8)], &DetectionThresholds::default());
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].description, "test");
        assert_relative_eq!(merged[1].position.x, 500.0);
    }

    #[test]
    fn grouping_is_transitive() {
        let chain = vec![detection(0.0, 0.5), detection(150.0, 0.5), detection(300.0, 0.5)];
        let merged = DetectionFilterMerger::default().merge(chain);
        assert_eq!(merged.len(), 1);
        assert_relative_eq!(merged[0].position.x, 150.0);
    }

    #[test]
    fn weak_and_small_detections_are_filtered() {
        let thresholds = DetectionThresholds {
            min_volume_size: 0.001,
            ..DetectionThresholds::default()
        };
        let weak = detection(0.0, 0.1);
        let tiny = detection(1000.0, 0.9).with_size(Vector3::new(10.0, 10.0, 10.0));
        let large = detection(2000.0, 0.9).with_size(Vector3::new(200.0, 200.0, 200.0));
        let no_size = detection(3000.0, 0.9);

        let kept = DetectionFilterMerger::default().filter_and_merge(vec![weak, tiny, large, no_size], &thresholds);
        let xs: Vec<f32> = kept.iter().map(|d| d.position.x).collect();
        assert_eq!(xs, vec![2000.0, 3000.0]);
    }
}
