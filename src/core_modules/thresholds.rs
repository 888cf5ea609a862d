// THEORY:
// `DetectionThresholds` are the operator-facing knobs. They may change between any two
// frames, so the detector reads them fresh at the start of every `process_frame`.
// Updates are partial: a `ThresholdUpdate` only touches the fields it carries.
//
// Out-of-domain values are clamped rather than stored verbatim: an intensity of 1.1
// would silently reject every detection, a negative depth change would accept pure
// sensor noise. Non-finite values have no sensible clamp and are rejected.

use crate::error::{DetectionError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionThresholds {
    /// Minimum per-pixel deviation from the background, in millimetres.
    pub min_depth_change: f32,
    /// Minimum detection volume in cubic metres (only applied when a size is known).
    pub min_volume_size: f32,
    /// Metres per second. Carried for API compatibility; no analysis reads it yet.
    pub motion_threshold: f32,
    pub skeleton_confidence: f32,
    /// Global confidence cutoff in `[0, 1]`.
    pub anomaly_intensity: f32,
    /// Raise the per-pixel change threshold to the measured sensor noise floor.
    /// Off by default, leaving `min_depth_change` as the only per-pixel gate.
    pub noise_reduction: bool,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            min_depth_change: 50.0,
            min_volume_size: 0.0,
            motion_threshold: 0.5,
            skeleton_confidence: 0.5,
            anomaly_intensity: 0.3,
            noise_reduction: false,
        }
    }
}

/// A partial threshold update. `None` leaves the current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdUpdate {
    pub min_depth_change: Option<f32>,
    pub min_volume_size: Option<f32>,
    pub motion_threshold: Option<f32>,
    pub skeleton_confidence: Option<f32>,
    pub anomaly_intensity: Option<f32>,
    pub noise_reduction: Option<bool>,
}

impl ThresholdUpdate {
    pub fn anomaly_intensity(value: f32) -> Self {
        Self {
            anomaly_intensity: Some(value),
            ..Default::default()
        }
    }

    pub fn min_depth_change(value: f32) -> Self {
        Self {
            min_depth_change: Some(value),
            ..Default::default()
        }
    }
}

fn finite(name: &'static str, value: f32) -> Result<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DetectionError::InvalidThreshold { name, value })
    }
}

impl DetectionThresholds {
    /// Applies `update`, clamping each value into its domain.
    ///
    /// The update is all-or-nothing: if any field is rejected nothing changes.
    pub fn apply(&mut self, update: &ThresholdUpdate) -> Result<()> {
        let mut next = self.clone();
        if let Some(v) = update.min_depth_change {
            next.min_depth_change = finite("min_depth_change", v)?.max(0.0);
        }
        if let Some(v) = update.min_volume_size {
            next.min_volume_size = finite("min_volume_size", v)?.max(0.0);
        }
        if let Some(v) = update.motion_threshold {
            next.motion_threshold = finite("motion_threshold", v)?.max(0.0);
        }
        if let Some(v) = update.skeleton_confidence {
            next.skeleton_confidence = finite("skeleton_confidence", v)?.clamp(0.0, 1.0);
        }
        if let Some(v) = update.anomaly_intensity {
            next.anomaly_intensity = finite("anomaly_intensity", v)?.clamp(0.0, 1.0);
        }
        if let Some(v) = update.noise_reduction {
            next.noise_reduction = v;
        }
        *self = next;
        Ok(())
    }

    /// Returns a copy with every field forced into its domain.
    pub fn sanitized(mut self) -> Self {
        let clean = |v: f32, lo: f32, hi: f32| if v.is_finite() { v.clamp(lo, hi) } else { lo };
        self.min_depth_change = clean(self.min_depth_change, 0.0, f32::MAX);
        self.min_volume_size = clean(self.min_volume_size, 0.0, f32::MAX);
        self.motion_threshold = clean(self.motion_threshold, 0.0, f32::MAX);
        self.skeleton_confidence = clean(self.skeleton_confidence, 0.0, 1.0);
        self.anomaly_intensity = clean(self.anomaly_intensity, 0.0, 1.0);
        self
    }
}
