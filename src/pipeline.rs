// THEORY:
// The `pipeline` module is the top-level API of the detection engine. The
// `AnomalyDetector` owns every piece of per-session state (the frame store, the
// background model, the detection id sequence and the event bus) and drives the
// analyzers over each frame in a fixed order:
//
// Stage 0: Validation. Malformed buffers and resolution changes are rejected before
//          any state is touched.
// Stage 1: Spatial analysis. The first frame seeds the background; every later frame
//          is compared region by region against it, then folded into it.
// Stage 2: Auxiliary analyses. Point-cloud clustering, skeleton checks, temporal
//          displacement over the last three frames and silhouette screening, each run
//          only when its input is present.
// Stage 3: Filter and merge. Weak and tiny findings are dropped and co-located ones
//          collapsed, after which ids and timestamps are stamped.
// Stage 4: Reporting. The survivors are appended to history, strong ones are published
//          to observers, and the frame's result is returned.
//
// Thresholds are read fresh at the start of every frame, so an update made between two
// frames applies to the very next one.

use crate::config::DetectorConfig;
use crate::core_modules::background_model::{BackgroundModel, NoiseProfile};
use crate::core_modules::detection_merger::DetectionFilterMerger;
use crate::core_modules::event_bus::{DetectionObserver, DetectorEvent, EventBus};
use crate::core_modules::frame::{DepthFrame, PointCloud, Skeleton};
use crate::core_modules::frame_store::FrameStore;
use crate::core_modules::region_analyzer::RegionAnomalyAnalyzer;
use crate::core_modules::shadow_detector::{NoSilhouettes, ShadowFigureDetector, SilhouetteExtractor};
use crate::core_modules::skeletal_analyzer::SkeletalAnomalyAnalyzer;
use crate::core_modules::temporal_analyzer::TemporalAnomalyAnalyzer;
use crate::core_modules::thresholds::{DetectionThresholds, ThresholdUpdate};
use crate::core_modules::volumetric_clusterer::VolumetricClusterer;
use crate::error::{DetectionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use crate::core_modules::detection::{DetectionDetails, DetectionResult, DetectionType, SlsDetection};

/// Running counters since construction or the last reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub frames_processed: u64,
    pub detections_reported: u64,
    pub events_published: u64,
    pub by_type: HashMap<DetectionType, u64>,
}

impl DetectorStats {
    pub fn count(&self, detection_type: DetectionType) -> u64 {
        self.by_type.get(&detection_type).copied().unwrap_or(0)
    }
}

/// The main, top-level struct for the detection engine.
#[derive(Debug)]
pub struct AnomalyDetector {
    config: DetectorConfig,
    thresholds: DetectionThresholds,
    store: FrameStore,
    background: Option<BackgroundModel>,
    region_analyzer: RegionAnomalyAnalyzer,
    clusterer: VolumetricClusterer,
    skeletal: SkeletalAnomalyAnalyzer,
    temporal: TemporalAnomalyAnalyzer,
    shadows: ShadowFigureDetector,
    merger: DetectionFilterMerger,
    events: EventBus,
    next_id: u64,
    stats: DetectorStats,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_shadow_extractor(config, NoSilhouettes)
    }

    /// Builds a detector whose shadow analysis draws silhouettes from `extractor`.
    pub fn with_shadow_extractor(
        config: DetectorConfig,
        extractor: impl SilhouetteExtractor + 'static,
    ) -> Self {
        let projection = config.projection;
        Self {
            thresholds: config.thresholds.clone().sanitized(),
            store: FrameStore::new(config.frame_capacity, config.history_capacity),
            background: None,
            region_analyzer: RegionAnomalyAnalyzer::new(config.region_size, projection, config.parallel_regions),
            clusterer: VolumetricClusterer::new(config.cluster_eps_mm, config.min_cluster_points),
            skeletal: SkeletalAnomalyAnalyzer::new(),
            temporal: TemporalAnomalyAnalyzer::new(config.temporal_stride, projection),
            shadows: ShadowFigureDetector::new(Box::new(extractor), projection),
            merger: DetectionFilterMerger::new(config.merge_distance_mm),
            events: EventBus::new(config.event_capacity),
            next_id: 1,
            stats: DetectorStats::default(),
            config,
        }
    }

    /// Runs every applicable analysis over one frame.
    pub fn process_frame(
        &mut self,
        frame: &DepthFrame,
        point_cloud: Option<&PointCloud>,
        skeletons: Option<&[Skeleton]>,
    ) -> Result<DetectionResult> {
        // Stage 0: Validation
        frame.validate()?;
        if let Some(cloud) = point_cloud {
            cloud.validate()?;
        }
        if let Some(background) = &self.background {
            if !background.matches(frame) {
                warn!(
                    frame = frame.frame_number,
                    width = frame.width,
                    height = frame.height,
                    "frame resolution differs from background model; reset required"
                );
                return Err(DetectionError::DimensionMismatch {
                    expected_width: background.width(),
                    expected_height: background.height(),
                    actual_width: frame.width,
                    actual_height: frame.height,
                });
            }
        }

        let thresholds = self.thresholds.clone();
        self.store.push_frame(frame.clone());

        // Stage 1: Spatial analysis
        let mut detections = match self.background.as_mut() {
            None => {
                let model = BackgroundModel::init(frame, self.config.learning_rate);
                info!(
                    frame = frame.frame_number,
                    width = frame.width,
                    height = frame.height,
                    spatial_noise = model.noise_profile().spatial,
                    "background model initialized"
                );
                self.background = Some(model);
                Vec::new()
            }
            Some(background) => {
                let found = self.region_analyzer.analyze(frame, background, &thresholds);
                background.update(frame);
                found
            }
        };

        // Stage 2: Auxiliary analyses
        if let Some(cloud) = point_cloud {
            detections.extend(self.clusterer.analyze(cloud));
        }
        if let Some(skeletons) = skeletons {
            detections.extend(self.skeletal.analyze(skeletons));
        }
        if let Some(frames) = self.store.last_three_frames() {
            detections.extend(self.temporal.analyze(frames));
        }
        detections.extend(self.shadows.analyze(frame));

        // Stage 3: Filter and merge
        let raw = detections.len();
        let detections: Vec<SlsDetection> = self
            .merger
            .filter_and_merge(detections, &thresholds)
            .into_iter()
            .map(|detection| {
                let mut stamped = detection.at_frame(frame.timestamp, frame.frame_number);
                stamped.id = self.next_id;
                self.next_id += 1;
                stamped
            })
            .collect();
        debug!(
            frame = frame.frame_number,
            raw,
            merged = detections.len(),
            "filter and merge complete"
        );

        // Stage 4: Reporting
        self.store.record_detections(detections.iter().cloned());
        for detection in detections
            .iter()
            .filter(|d| d.confidence() > thresholds.anomaly_intensity)
        {
            self.events.publish(DetectorEvent::AnomalyDetected(detection.clone()));
            self.stats.events_published += 1;
        }

        self.stats.frames_processed += 1;
        self.stats.detections_reported += detections.len() as u64;
        for detection in &detections {
            *self.stats.by_type.entry(detection.detection_type).or_insert(0) += 1;
        }

        Ok(DetectionResult::new(detections, frame.frame_number, frame.timestamp))
    }

    /// Retained detections, oldest first.
    pub fn detection_history(&self) -> Vec<SlsDetection> {
        self.store.detection_history()
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    /// Applies a partial threshold update; takes effect from the next frame.
    pub fn update_thresholds(&mut self, update: &ThresholdUpdate) -> Result<()> {
        self.thresholds.apply(update)?;
        debug!(thresholds = ?self.thresholds, "thresholds updated");
        Ok(())
    }

    /// Forgets every frame, the background and the history. Thresholds, observers and
    /// receivers are kept.
    pub fn reset(&mut self) {
        self.store.clear();
        self.background = None;
        self.next_id = 1;
        self.stats = DetectorStats::default();
        info!("detector reset");
    }

    /// Resets and detaches every observer and receiver.
    pub fn dispose(&mut self) {
        self.reset();
        self.events.detach_all();
    }

    pub fn subscribe(&mut self, observer: impl DetectionObserver + 'static) {
        self.events.subscribe(observer);
    }

    pub fn event_receiver(&self) -> broadcast::Receiver<DetectorEvent> {
        self.events.receiver()
    }

    /// `None` until the first frame has been seen.
    pub fn noise_profile(&self) -> Option<NoiseProfile> {
        self.background.as_ref().map(BackgroundModel::noise_profile)
    }

    /// Frames currently buffered.
    pub fn frame_count(&self) -> usize {
        self.store.frame_count()
    }

    pub fn background_model(&self) -> Option<&BackgroundModel> {
        self.background.as_ref()
    }

    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}
