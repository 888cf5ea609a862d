// THEORY:
// The `VolumetricClusterer` finds coherent 3D masses in a point cloud and asks whether
// their point density is plausible for a solid object at that size.
//
// Algorithm:
// 1.  **Indexing**: points are bucketed into a uniform voxel grid whose cell edge is the
//     neighbour radius `eps`. Any neighbour within `eps` of a point must sit in one of
//     the 27 cells around it, so neighbour queries stay exact while avoiding the naive
//     all-pairs scan. The naive flood fill is O(n^2) per frame; with the grid the cost
//     is proportional to the points in nearby cells, which degrades back towards O(n^2)
//     only when the whole cloud collapses into a handful of cells.
// 2.  **Flood fill**: as in blob region growing, an unvisited point seeds a
//     cluster and the fill spreads to every point within `eps` of any member
//     (single-link; no minimum neighbour count).
// 3.  **Retention**: clusters with too few points are discarded as speckle.
// 4.  **Density test**: the tighter the bounding volume, the more points a real surface
//     packs into it. Densities far outside the band expected for that volume are
//     reported as manifestations.

use crate::core_modules::detection::{ClusterInfo, DetectionDetails, DetectionType, SlsDetection};
use crate::core_modules::frame::PointCloud;
use crate::core_modules::geometry::{BoundingBox3D, Vector3};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

pub const DEFAULT_CLUSTER_EPS_MM: f32 = 100.0;
pub const DEFAULT_MIN_CLUSTER_POINTS: usize = 50;

/// Points per cubic metre that maps to full confidence.
const DENSITY_FULL_SCALE: f32 = 1000.0;

/// A connected group of points.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCluster {
    pub indices: Vec<usize>,
    pub bounds: BoundingBox3D,
    pub centroid: Vector3,
}

impl PointCluster {
    pub fn point_count(&self) -> usize {
        self.indices.len()
    }

    pub fn volume_m3(&self) -> f32 {
        self.bounds.volume_m3()
    }

    /// Points per cubic metre, `None` for a flat or degenerate cluster.
    pub fn density(&self) -> Option<f32> {
        let volume = self.volume_m3();
        if volume > 0.0 && volume.is_finite() {
            Some(self.point_count() as f32 / volume)
        } else {
            None
        }
    }
}

type CellKey = (i32, i32, i32);

struct VoxelIndex {
    cell: f32,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl VoxelIndex {
    fn build(points: &[Vector3], valid: &[bool], cell: f32) -> Self {
        let mut cells: HashMap<CellKey, Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate().filter(|(i, _)| valid[*i]) {
            cells.entry(Self::key(p, cell)).or_default().push(i);
        }
        Self { cell, cells }
    }

    fn key(p: &Vector3, cell: f32) -> CellKey {
        (
            (p.x / cell).floor() as i32,
            (p.y / cell).floor() as i32,
            (p.z / cell).floor() as i32,
        )
    }

    /// Calls `visit` with every point index in the 27 cells around `p`.
    fn for_each_candidate(&self, p: &Vector3, mut visit: impl FnMut(usize)) {
        let (kx, ky, kz) = Self::key(p, self.cell);
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let neighbour = (kx.saturating_add(dx), ky.saturating_add(dy), kz.saturating_add(dz));
                    if let Some(bucket) = self.cells.get(&neighbour) {
                        bucket.iter().copied().for_each(&mut visit);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct VolumetricClusterer {
    eps: f32,
    min_points: usize,
}

impl Default for VolumetricClusterer {
    fn default() -> Self {
        Self::new(DEFAULT_CLUSTER_EPS_MM, DEFAULT_MIN_CLUSTER_POINTS)
    }
}

impl VolumetricClusterer {
    pub fn new(eps: f32, min_points: usize) -> Self {
        Self {
            eps: if eps.is_finite() && eps > 0.0 { eps } else { DEFAULT_CLUSTER_EPS_MM },
            min_points,
        }
    }

    /// Single-link flood fill. Only clusters with more than `min_points` points are kept.
    pub fn cluster(&self, cloud: &PointCloud) -> Vec<PointCluster> {
        let points: Vec<Vector3> = cloud.iter().collect();
        let valid: Vec<bool> = points
            .iter()
            .map(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
            .collect();
        let index = VoxelIndex::build(&points, &valid, self.eps);
        let eps_sq = self.eps * self.eps;

        let mut visited: Vec<bool> = valid.iter().map(|ok| !ok).collect();
        let mut clusters = Vec::new();
        let mut queue = VecDeque::new();

        for seed in 0..points.len() {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;
            queue.push_back(seed);
            let mut members = Vec::new();

            while let Some(current) = queue.pop_front() {
                members.push(current);
                let here = points[current];
                index.for_each_candidate(&here, |candidate| {
                    if !visited[candidate] && here.distance_squared(&points[candidate]) <= eps_sq {
                        visited[candidate] = true;
                        queue.push_back(candidate);
                    }
                });
            }

            if members.len() > self.min_points {
                clusters.push(Self::summarize(members, &points));
            }
        }

        clusters
    }

    fn summarize(indices: Vec<usize>, points: &[Vector3]) -> PointCluster {
        let members: Vec<Vector3> = indices.iter().map(|&i| points[i]).collect();
        // Non-empty: only called with clusters above the retention size.
        let bounds = BoundingBox3D::enclosing(&members)
            .unwrap_or_else(|| BoundingBox3D::from_center_size(Vector3::ZERO, Vector3::ZERO));
        let centroid = Vector3::mean(&members).unwrap_or(bounds.center);
        PointCluster {
            indices,
            bounds,
            centroid,
        }
    }

    /// Clusters `cloud` and reports every cluster whose density is anomalous.
    pub fn analyze(&self, cloud: &PointCloud) -> Vec<SlsDetection> {
        let clusters = self.cluster(cloud);
        let detections: Vec<SlsDetection> = clusters.iter().filter_map(evaluate_cluster).collect();
        debug!(
            points = cloud.len(),
            clusters = clusters.len(),
            detections = detections.len(),
            "volumetric clustering complete"
        );
        detections
    }
}

/// Whether `density` (points/m³) is implausible for a solid of `volume` m³.
pub fn is_anomalous_density(volume: f32, density: f32) -> bool {
    let (upper, lower) = if volume < 0.01 {
        (5000.0, 100.0)
    } else if volume < 0.1 {
        (2000.0, 50.0)
    } else {
        (1000.0, 10.0)
    };
    density > upper || density < lower
}

/// Turns one cluster into a manifestation detection if its density is anomalous.
pub fn evaluate_cluster(cluster: &PointCluster) -> Option<SlsDetection> {
    let density = cluster.density()?;
    let volume = cluster.volume_m3();
    if !is_anomalous_density(volume, density) {
        return None;
    }

    let info = ClusterInfo {
        point_count: cluster.point_count(),
        volume_m3: volume,
        density,
        bounds: cluster.bounds,
    };
    Some(
        SlsDetection::new(
            DetectionType::Manifestation,
            density / DENSITY_FULL_SCALE,
            cluster.centroid,
            format!(
                "Volumetric mass of {} points, {volume:.4} m³ at {density:.0} points/m³",
                cluster.point_count()
            ),
            DetectionDetails::Manifestation(info),
        )
        .with_size(cluster.bounds.size),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An `nx * ny * nz` lattice with `spacing` mm between points, starting at `origin`.
    fn lattice(origin: Vector3, n: (u32, u32, u32), spacing: f32) -> Vec<Vector3> {
        let mut pts = Vec::new();
        for i in 0..n.0 {
            for j in 0..n.1 {
                for k in 0..n.2 {
                    pts.push(Vector3::new(
                        origin.x + i as f32 * spacing,
                        origin.y + j as f32 * spacing,
                        origin.z + k as f32 * spacing,
                    ));
                }
            }
        }
        pts
    }

    #[test]
    fn separated_masses_form_two_clusters() {
        let mut pts = lattice(Vector3::new(0.0, 0.0, 1500.0), (5, 5, 3), 20.0);
        pts.extend(lattice(Vector3::new(800.0, 0.0, 1500.0), (5, 5, 3), 20.0));
        let cloud = PointCloud::from_points(&pts);

        let clusters = VolumetricClusterer::default().cluster(&cloud);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.point_count() == 75));

        let detections = VolumetricClusterer::default().analyze(&cloud);
        assert_eq!(detections.len(), 2);
        for d in &detections {
            assert_eq!(d.detection_type, DetectionType::Manifestation);
            assert_eq!(d.confidence(), 1.0);
        }
    }

    #[test]
    fn chains_link_transitively() {
        // 60 points in a line, 90mm apart: end points are 5.3m apart but one cluster.
        let pts: Vec<Vector3> = (0..60)
            .map(|i| Vector3::new(i as f32 * 90.0, (i % 2) as f32 * 10.0, 2000.0 + (i % 3) as f32 * 10.0))
            .collect();
        let clusters = VolumetricClusterer::default().cluster(&PointCloud::from_points(&pts));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].point_count(), 60);
    }

    #[test]
    fn small_groups_are_dropped() {
        let pts = lattice(Vector3::ZERO, (5, 5, 2), 20.0);
        assert_eq!(pts.len(), 50);
        assert!(VolumetricClusterer::default().cluster(&PointCloud::from_points(&pts)).is_empty());
    }

    #[test]
    fn flat_cluster_is_not_evaluated() {
        let pts = lattice(Vector3::ZERO, (10, 10, 1), 20.0);
        let clusters = VolumetricClusterer::default().cluster(&PointCloud::from_points(&pts));
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].density().is_none());
        assert!(evaluate_cluster(&clusters[0]).is_none());
    }

    #[test]
    fn non_finite_points_are_ignored() {
        let mut pts = lattice(Vector3::ZERO, (4, 4, 4), 20.0);
        pts.push(Vector3::new(f32::NAN, 0.0, 0.0));
        let clusters = VolumetricClusterer::default().cluster(&PointCloud::from_points(&pts));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].point_count(), 64);
    }

    #[test]
    fn density_tiers() {
        assert!(is_anomalous_density(0.005, 6000.0));
        assert!(is_anomalous_density(0.005, 50.0));
        assert!(!is_anomalous_density(0.005, 1000.0));
        assert!(is_anomalous_density(0.05, 2500.0));
        assert!(!is_anomalous_density(0.05, 60.0));
        assert!(is_anomalous_density(0.05, 40.0));
        assert!(is_anomalous_density(2.0, 1500.0));
        assert!(!is_anomalous_density(2.0, 500.0));
        assert!(is_anomalous_density(2.0, 5.0));
    }
}
