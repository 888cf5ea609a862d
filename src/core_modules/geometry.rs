// THEORY:
// The `geometry` module holds the small set of 3D primitives every analyzer speaks in.
// All coordinates are sensor-local millimetres. Nothing here knows about frames,
// clusters or skeletons; it is the shared vocabulary the higher layers use to place
// a detection in space and to measure how far apart two detections are.
//
// The `PinholeProjection` is deliberately approximate: a fixed field of view centred
// on the frame, no lens intrinsics. It is enough to put region and temporal hits into
// the same metric space as point-cloud clusters and skeleton joints so the merger can
// compare them.

use serde::{Deserialize, Serialize};

/// A point or extent in sensor-local space, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vector3) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn distance_squared(&self, other: &Vector3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn component_min(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn component_max(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Product of the three components. For a size in millimetres this is mm³.
    pub fn volume(&self) -> f32 {
        self.x * self.y * self.z
    }

    /// Arithmetic mean of a set of points, or `None` for an empty set.
    pub fn mean<'a>(points: impl IntoIterator<Item = &'a Vector3>) -> Option<Vector3> {
        let mut sum = Vector3::ZERO;
        let mut count = 0usize;
        for p in points {
            sum.x += p.x;
            sum.y += p.y;
            sum.z += p.z;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let n = count as f32;
        Some(Vector3::new(sum.x / n, sum.y / n, sum.z / n))
    }
}

/// An axis-aligned box. `min <= max` holds componentwise for every constructed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox3D {
    pub min: Vector3,
    pub max: Vector3,
    pub center: Vector3,
    pub size: Vector3,
}

impl BoundingBox3D {
    /// Builds a box from two opposite corners given in any order.
    pub fn from_corners(a: Vector3, b: Vector3) -> Self {
        let min = a.component_min(&b);
        let max = a.component_max(&b);
        Self {
            min,
            max,
            center: Vector3::new(
                (min.x + max.x) / 2.0,
                (min.y + max.y) / 2.0,
                (min.z + max.z) / 2.0,
            ),
            size: Vector3::new(max.x - min.x, max.y - min.y, max.z - min.z),
        }
    }

    /// Builds a box centred on `center` with the given extent.
    pub fn from_center_size(center: Vector3, size: Vector3) -> Self {
        let half = Vector3::new(size.x.abs() / 2.0, size.y.abs() / 2.0, size.z.abs() / 2.0);
        Self::from_corners(
            Vector3::new(center.x - half.x, center.y - half.y, center.z - half.z),
            Vector3::new(center.x + half.x, center.y + half.y, center.z + half.z),
        )
    }

    /// Tightest box around a set of points, or `None` if the set is empty.
    pub fn enclosing<'a>(points: impl IntoIterator<Item = &'a Vector3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), p| {
            (lo.component_min(p), hi.component_max(p))
        });
        Some(Self::from_corners(min, max))
    }

    /// Volume in cubic metres, assuming millimetre coordinates.
    pub fn volume_m3(&self) -> f32 {
        self.size.volume() / MM3_PER_M3
    }
}

/// Cubic millimetres in a cubic metre.
pub const MM3_PER_M3: f32 = 1.0e9;

/// Fixed-FOV pinhole approximation used to lift pixel hits into 3D.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeProjection {
    pub horizontal_fov_deg: f32,
    pub vertical_fov_deg: f32,
}

impl Default for PinholeProjection {
    fn default() -> Self {
        Self {
            horizontal_fov_deg: 60.0,
            vertical_fov_deg: 45.0,
        }
    }
}

impl PinholeProjection {
    /// Lifts pixel `(px, py)` at `depth` millimetres into sensor space.
    ///
    /// The optical axis passes through the frame centre; +x is right and +y is down,
    /// matching image row order.
    pub fn unproject(&self, px: f32, py: f32, depth: f32, width: u32, height: u32) -> Vector3 {
        let half_w = (width as f32 / 2.0).max(f32::EPSILON);
        let half_h = (height as f32 / 2.0).max(f32::EPSILON);
        let tan_h = (self.horizontal_fov_deg.to_radians() / 2.0).tan();
        let tan_v = (self.vertical_fov_deg.to_radians() / 2.0).tan();
        Vector3::new(
            (px - half_w) / half_w * tan_h * depth,
            (py - half_h) / half_h * tan_v * depth,
            depth,
        )
    }
}
