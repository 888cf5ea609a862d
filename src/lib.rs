// THEORY:
// This file is the main entry point for the `sls_vision` library crate. It exposes the
// `AnomalyDetector` and its associated data structures (`DepthFrame`,
// `DetectionResult`, `SlsDetection`, `DetectionThresholds`) as the high-level interface
// of the engine, plus the optional `DetectorService` for async callers.
//
// The analyzers under `core_modules` are public so they can be tested and reused on
// their own, but a typical consumer only needs the re-exports below.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{BackpressurePolicy, DetectorConfig, ServiceConfig};
pub use core_modules::background_model::{BackgroundModel, NoiseProfile};
pub use core_modules::detection::{
    AnomalyKind, DetectionDetails, DetectionResult, DetectionType, SlsDetection,
};
pub use core_modules::event_bus::{DetectionObserver, DetectorEvent};
pub use core_modules::frame::{DepthFrame, Joint, JointType, PointCloud, Skeleton};
pub use core_modules::geometry::{BoundingBox3D, Vector3};
pub use core_modules::shadow_detector::{NoSilhouettes, Silhouette, SilhouetteExtractor};
pub use core_modules::thresholds::{DetectionThresholds, ThresholdUpdate};
pub use core_modules::utils::image_helper::image_helper;
pub use error::{DetectionError, Result};
pub use parallel_pipeline::{DetectorService, FrameInput};
pub use pipeline::{AnomalyDetector, DetectorStats};
