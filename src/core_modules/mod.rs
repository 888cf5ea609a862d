pub mod background_model;
pub mod depth_region;
pub mod detection;
pub mod detection_merger;
pub mod event_bus;
pub mod frame;
pub mod frame_store;
pub mod geometry;
pub mod region_analyzer;
pub mod shadow_detector;
pub mod skeletal_analyzer;
pub mod temporal_analyzer;
pub mod thresholds;
pub mod utils;
pub mod volumetric_clusterer;
