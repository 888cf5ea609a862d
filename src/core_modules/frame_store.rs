// THEORY:
// The `FrameStore` is the engine's short-term memory. It keeps the most recent depth
// frames (for temporal analysis) and the most recent merged detections (for history
// queries) in two bounded FIFO windows. When a window is full the oldest entry is
// evicted before the new one is appended, so neither window ever exceeds its
// capacity. It performs no analysis of its own.

use crate::core_modules::detection::SlsDetection;
use crate::core_modules::frame::DepthFrame;
use std::collections::VecDeque;

pub const DEFAULT_FRAME_CAPACITY: usize = 30;
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// A FIFO window that never grows past its capacity.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The newest `n` items in chronological order, or `None` if fewer are held.
    pub fn last_n(&self, n: usize) -> Option<Vec<&T>> {
        if self.items.len() < n {
            return None;
        }
        Some(self.items.iter().skip(self.items.len() - n).collect())
    }
}

/// Recent frames plus recent detections.
#[derive(Debug, Clone)]
pub struct FrameStore {
    frames: BoundedHistory<DepthFrame>,
    detections: BoundedHistory<SlsDetection>,
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CAPACITY, DEFAULT_HISTORY_CAPACITY)
    }
}

impl FrameStore {
    pub fn new(frame_capacity: usize, history_capacity: usize) -> Self {
        Self {
            frames: BoundedHistory::new(frame_capacity),
            detections: BoundedHistory::new(history_capacity),
        }
    }

    pub fn push_frame(&mut self, frame: DepthFrame) {
        self.frames.push(frame);
    }

    pub fn record_detections(&mut self, detections: impl IntoIterator<Item = SlsDetection>) {
        for detection in detections {
            self.detections.push(detection);
        }
    }

    pub fn frames(&self) -> &BoundedHistory<DepthFrame> {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// The three most recent frames, oldest first.
    pub fn last_three_frames(&self) -> Option<[&DepthFrame; 3]> {
        let frames = self.frames.last_n(3)?;
        Some([frames[0], frames[1], frames[2]])
    }

    /// Detection history, oldest first.
    pub fn detection_history(&self) -> Vec<SlsDetection> {
        self.detections.iter().cloned().collect()
    }

    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.detections.clear();
    }
}
