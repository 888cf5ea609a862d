// THEORY:
// The `EventBus` fans detections out to whoever is listening. It has two kinds of
// listener, because the detector is used from both synchronous and async code:
// 1.  **Observers** are called synchronously, on the caller's stack, during
//     `process_frame`. An observer that panics or blocks stalls the detector; that is
//     the caller's contract to keep.
// 2.  **Receivers** are `tokio::sync::broadcast` handles. Publishing never waits on
//     them. A receiver that falls behind the channel capacity sees `Lagged` and skips
//     ahead; the detector never blocks for it.
//
// `detach_all` drops every observer and replaces the broadcast sender, so existing
// receivers observe the channel closing.

use crate::core_modules::detection::SlsDetection;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectorEvent {
    AnomalyDetected(SlsDetection),
}

impl DetectorEvent {
    pub fn detection(&self) -> &SlsDetection {
        match self {
            DetectorEvent::AnomalyDetected(detection) => detection,
        }
    }
}

/// Synchronous event sink.
pub trait DetectionObserver: Send {
    fn on_event(&mut self, event: &DetectorEvent);
}

impl<F> DetectionObserver for F
where
    F: FnMut(&DetectorEvent) + Send,
{
    fn on_event(&mut self, event: &DetectorEvent) {
        self(event)
    }
}

pub struct EventBus {
    observers: Vec<Box<dyn DetectionObserver>>,
    sender: broadcast::Sender<DetectorEvent>,
    capacity: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .field("receivers", &self.sender.receiver_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            observers: Vec::new(),
            sender,
            capacity,
        }
    }

    pub fn subscribe(&mut self, observer: impl DetectionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn receiver(&self) -> broadcast::Receiver<DetectorEvent> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Delivers `event` to every observer, then to every live receiver.
    pub fn publish(&mut self, event: DetectorEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
        // An error only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn detach_all(&mut self) {
        self.observers.clear();
        let (sender, _) = broadcast::channel(self.capacity);
        self.sender = sender;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::{DetectionDetails, DetectionType, DisplacementInfo};
    use crate::core_modules::geometry::Vector3;
    use std::sync::{Arc, Mutex};

    fn event(confidence: f32) -> DetectorEvent {
        DetectorEvent::AnomalyDetected(SlsDetection::new(
            DetectionType::Distortion,
            confidence,
            Vector3::ZERO,
            "event",
            DetectionDetails::Distortion(DisplacementInfo {
                pixel: (0, 0),
                initial_change: 250.0,
                settled_change: 10.0,
            }),
        ))
    }

    #[test]
    fn observers_receive_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut bus = EventBus::default();
        bus.subscribe(move |e: &DetectorEvent| sink.lock().unwrap().push(e.detection().confidence()));

        bus.publish(event(0.4));
        bus.publish(event(0.9));
        assert_eq!(*seen.lock().unwrap(), vec![0.4, 0.9]);
    }

    #[test]
    fn receivers_get_a_copy() {
        let mut bus = EventBus::default();
        let mut rx = bus.receiver();
        bus.publish(event(0.5));
        assert_eq!(rx.try_recv().unwrap(), event(0.5));
    }

    #[test]
    fn publishing_without_listeners_is_fine() {
        let mut bus = EventBus::new(1);
        bus.publish(event(0.5));
        bus.publish(event(0.6));
    }

    #[test]
    fn detach_closes_receivers_and_drops_observers() {
        let mut bus = EventBus::default();
        bus.subscribe(|_: &DetectorEvent| {});
        let mut rx = bus.receiver();
        bus.detach_all();
        assert_eq!(bus.observer_count(), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }
}
