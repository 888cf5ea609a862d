// THEORY:
// `DetectorConfig` is the one place every tunable lives: thresholds, analyzer
// constants, window capacities and the service's queue policy. Every field has a
// default, so a TOML file only needs to name what it changes and an empty file is a
// valid configuration. Thresholds read from disk pass through the same clamping as a
// runtime update. A file that cannot be read surfaces as `Io`; one that cannot be
// parsed surfaces as `Config`.

use crate::core_modules::background_model::DEFAULT_LEARNING_RATE;
use crate::core_modules::detection_merger::DEFAULT_MERGE_DISTANCE_MM;
use crate::core_modules::event_bus::DEFAULT_EVENT_CAPACITY;
use crate::core_modules::frame_store::{DEFAULT_FRAME_CAPACITY, DEFAULT_HISTORY_CAPACITY};
use crate::core_modules::geometry::PinholeProjection;
use crate::core_modules::region_analyzer::DEFAULT_REGION_SIZE;
use crate::core_modules::temporal_analyzer::DEFAULT_TEMPORAL_STRIDE;
use crate::core_modules::thresholds::DetectionThresholds;
use crate::core_modules::volumetric_clusterer::{DEFAULT_CLUSTER_EPS_MM, DEFAULT_MIN_CLUSTER_POINTS};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything needed to build an `AnomalyDetector`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub thresholds: DetectionThresholds,

    /// Edge of the square analysis regions, in pixels (default: 32)
    pub region_size: u32,

    /// Background EMA weight of each new frame (default: 0.01)
    pub learning_rate: f32,

    pub projection: PinholeProjection,

    /// Neighbour radius for point-cloud clustering, mm (default: 100)
    pub cluster_eps_mm: f32,

    /// Clusters need strictly more points than this (default: 50)
    pub min_cluster_points: usize,

    /// Sampling stride of the temporal analysis, pixels (default: 16)
    pub temporal_stride: u32,

    /// Single-link merge distance, mm (default: 200)
    pub merge_distance_mm: f32,

    /// Buffered frames (default: 30)
    pub frame_capacity: usize,

    /// Retained detections (default: 100)
    pub history_capacity: usize,

    /// Run region analysis on the rayon pool (default: true on multi-core hosts)
    pub parallel_regions: bool,

    /// Broadcast channel capacity for async event receivers (default: 256)
    pub event_capacity: usize,

    pub service: ServiceConfig,
}

/// What `DetectorService::submit` does when the queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Wait for room.
    #[default]
    Block,
    /// Fail with `DetectionError::FrameRejected`.
    Reject,
}

/// Async service settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bounded queue depth between submitters and the worker (default: 4)
    pub queue_depth: usize,
    pub backpressure: BackpressurePolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_depth: 4,
            backpressure: BackpressurePolicy::Block,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            thresholds: DetectionThresholds::default(),
            region_size: DEFAULT_REGION_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            projection: PinholeProjection::default(),
            cluster_eps_mm: DEFAULT_CLUSTER_EPS_MM,
            min_cluster_points: DEFAULT_MIN_CLUSTER_POINTS,
            temporal_stride: DEFAULT_TEMPORAL_STRIDE,
            merge_distance_mm: DEFAULT_MERGE_DISTANCE_MM,
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            parallel_regions: num_cpus::get() > 1,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            service: ServiceConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text. Thresholds are clamped into range.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: DetectorConfig = toml::from_str(content)?;
        config.thresholds = config.thresholds.sanitized();
        Ok(config)
    }
}
