// THEORY:
// The `frame` module defines the raw inputs handed to the engine by the capture layer:
// depth frames, optional point clouds and optional tracked skeletons. These are
// "dumb" data containers. They answer questions about their own contents (is this
// reading valid, which 3D point is at index i, how many joints are tracked) but
// never compare themselves to anything else.
//
// Validation lives here too. A depth buffer whose length disagrees with its declared
// resolution, or a point buffer that is not a whole number of triples, is rejected
// up front so no analyzer ever indexes out of bounds.

use crate::core_modules::geometry::Vector3;
use crate::error::{DetectionError, Result};
use serde::{Deserialize, Serialize};

/// Depth value reserved for "no reading".
pub const NO_READING: u16 = 0;

/// A single depth image from the sensor, row-major, millimetres per pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthFrame {
    pub depth_data: Vec<u16>,
    pub width: u32,
    pub height: u32,
    /// Capture time in milliseconds.
    pub timestamp: f64,
    pub frame_number: u32,
    pub min_depth: u16,
    pub max_depth: u16,
}

impl DepthFrame {
    /// Builds a frame and checks the buffer against the declared resolution.
    pub fn new(
        depth_data: Vec<u16>,
        width: u32,
        height: u32,
        timestamp: f64,
        frame_number: u32,
    ) -> Result<Self> {
        let (min_depth, max_depth) = depth_data
            .iter()
            .filter(|&&d| d != NO_READING)
            .fold((u16::MAX, 0u16), |(lo, hi), &d| (lo.min(d), hi.max(d)));
        let frame = Self {
            depth_data,
            width,
            height,
            timestamp,
            frame_number,
            min_depth: if max_depth == 0 { 0 } else { min_depth },
            max_depth,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// A frame where every pixel reads `depth`.
    pub fn filled(width: u32, height: u32, depth: u16, timestamp: f64, frame_number: u32) -> Self {
        Self {
            depth_data: vec![depth; (width * height) as usize],
            width,
            height,
            timestamp,
            frame_number,
            min_depth: depth,
            max_depth: depth,
        }
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.depth_data.len() != self.pixel_count() {
            return Err(DetectionError::buffer_mismatch(self.pixel_count(), self.depth_data.len()));
        }
        Ok(())
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    /// Raw reading at `(x, y)`, `None` when out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.depth_data.get(self.index(x, y)).copied()
    }

    /// Reading at `(x, y)` if it is in bounds and not the no-reading sentinel.
    pub fn get_valid(&self, x: u32, y: u32) -> Option<u16> {
        self.get(x, y).filter(|&d| d != NO_READING)
    }

    pub fn same_dimensions(&self, other: &DepthFrame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Flat XYZ triples in millimetres, sensor-local.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<f32>,
}

impl PointCloud {
    pub fn new(points: Vec<f32>) -> Result<Self> {
        let cloud = Self { points };
        cloud.validate()?;
        Ok(cloud)
    }

    pub fn from_points(points: &[Vector3]) -> Self {
        Self {
            points: points.iter().flat_map(|p| [p.x, p.y, p.z]).collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.points.len() % 3 != 0 {
            return Err(DetectionError::MalformedPointCloud { len: self.points.len() });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.points.len() < 3
    }

    pub fn point(&self, i: usize) -> Vector3 {
        let base = i * 3;
        Vector3::new(self.points[base], self.points[base + 1], self.points[base + 2])
    }

    pub fn iter(&self) -> impl Iterator<Item = Vector3> + '_ {
        self.points.chunks_exact(3).map(|c| Vector3::new(c[0], c[1], c[2]))
    }
}

/// Body joints reported by the sensor's pose estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    Head,
    Neck,
    SpineShoulder,
    SpineMid,
    SpineBase,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
}

/// Pairs of joints joined by a bone. Bone-length checks walk this table.
pub const BONES: [(JointType, JointType); 20] = [
    (JointType::Head, JointType::Neck),
    (JointType::Neck, JointType::SpineShoulder),
    (JointType::SpineShoulder, JointType::SpineMid),
    (JointType::SpineMid, JointType::SpineBase),
    (JointType::SpineShoulder, JointType::ShoulderLeft),
    (JointType::ShoulderLeft, JointType::ElbowLeft),
    (JointType::ElbowLeft, JointType::WristLeft),
    (JointType::WristLeft, JointType::HandLeft),
    (JointType::SpineShoulder, JointType::ShoulderRight),
    (JointType::ShoulderRight, JointType::ElbowRight),
    (JointType::ElbowRight, JointType::WristRight),
    (JointType::WristRight, JointType::HandRight),
    (JointType::SpineBase, JointType::HipLeft),
    (JointType::HipLeft, JointType::KneeLeft),
    (JointType::KneeLeft, JointType::AnkleLeft),
    (JointType::AnkleLeft, JointType::FootLeft),
    (JointType::SpineBase, JointType::HipRight),
    (JointType::HipRight, JointType::KneeRight),
    (JointType::KneeRight, JointType::AnkleRight),
    (JointType::AnkleRight, JointType::FootRight),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub joint_type: JointType,
    pub position: Vector3,
    pub tracked: bool,
}

/// A tracked body as reported by the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub id: u32,
    pub joints: Vec<Joint>,
    pub confidence: f32,
    pub center_of_mass: Option<Vector3>,
}

impl Skeleton {
    pub fn joint(&self, joint_type: JointType) -> Option<&Joint> {
        self.joints.iter().find(|j| j.joint_type == joint_type)
    }

    pub fn tracked_joint_count(&self) -> usize {
        self.joints.iter().filter(|j| j.tracked).count()
    }

    /// Fraction of reported joints that are tracked; 0 for a skeleton with no joints.
    pub fn completeness(&self) -> f32 {
        if self.joints.is_empty() {
            return 0.0;
        }
        self.tracked_joint_count() as f32 / self.joints.len() as f32
    }

    /// Where to anchor a detection about this skeleton.
    pub fn anchor(&self) -> Option<Vector3> {
        self.center_of_mass
            .or_else(|| self.joints.first().map(|j| j.position))
    }
}
