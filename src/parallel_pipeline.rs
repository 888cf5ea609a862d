// THEORY:
// The `parallel_pipeline` module puts an `AnomalyDetector` behind an async front door
// so capture loops and network handlers can feed it without owning it.
//
// Key architectural principles:
// 1.  **One worker, one detector**: detection is stateful and frame-sequential, so a
//     single worker owns the detector and processes commands strictly in the order
//     they were queued. Parallelism lives inside a frame (region analysis on rayon),
//     never across frames.
// 2.  **Bounded queue**: submitters and the worker are joined by a bounded `mpsc`
//     channel. When it is full, `BackpressurePolicy::Block` makes the submitter wait
//     and `BackpressurePolicy::Reject` fails the submission with `FrameRejected`.
// 3.  **Control in band**: threshold updates, resets and shutdown travel on the same
//     queue as frames, so "update, then frame" is never reordered.
// 4.  **Replies by oneshot**: every command carries its own `oneshot` sender; the
//     submitter awaits exactly its own answer.
//
// The worker runs on tokio's blocking pool because a frame is CPU-bound work.

use crate::config::{BackpressurePolicy, DetectorConfig};
use crate::core_modules::event_bus::DetectorEvent;
use crate::core_modules::frame::{DepthFrame, PointCloud, Skeleton};
use crate::core_modules::thresholds::ThresholdUpdate;
use crate::error::{DetectionError, Result};
use crate::pipeline::{AnomalyDetector, DetectionResult};
use futures::future::try_join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One frame's worth of sensor input.
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub frame: DepthFrame,
    pub point_cloud: Option<PointCloud>,
    pub skeletons: Option<Vec<Skeleton>>,
}

impl FrameInput {
    pub fn depth_only(frame: DepthFrame) -> Self {
        Self {
            frame,
            point_cloud: None,
            skeletons: None,
        }
    }
}

enum Command {
    Frame {
        input: FrameInput,
        reply: oneshot::Sender<Result<DetectionResult>>,
    },
    UpdateThresholds {
        update: ThresholdUpdate,
        reply: oneshot::Sender<Result<()>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

pub struct DetectorService {
    sender: mpsc::Sender<Command>,
    policy: BackpressurePolicy,
    events: broadcast::Receiver<DetectorEvent>,
    worker: JoinHandle<AnomalyDetector>,
}

impl DetectorService {
    /// Builds a detector from `config` and starts its worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: DetectorConfig) -> Self {
        Self::with_detector(AnomalyDetector::new(config))
    }

    /// Starts a worker around an already configured detector (custom extractors,
    /// pre-registered observers).
    pub fn with_detector(detector: AnomalyDetector) -> Self {
        let service_config = detector.config().service.clone();
        let (sender, receiver) = mpsc::channel(service_config.queue_depth.max(1));
        let events = detector.event_receiver();
        let worker = tokio::task::spawn_blocking(move || Self::run_worker(detector, receiver));
        info!(
            queue_depth = service_config.queue_depth,
            policy = ?service_config.backpressure,
            "detector service started"
        );
        Self {
            sender,
            policy: service_config.backpressure,
            events,
            worker,
        }
    }

    fn run_worker(mut detector: AnomalyDetector, mut receiver: mpsc::Receiver<Command>) -> AnomalyDetector {
        while let Some(command) = receiver.blocking_recv() {
            match command {
                Command::Frame { input, reply } => {
                    let result = detector.process_frame(
                        &input.frame,
                        input.point_cloud.as_ref(),
                        input.skeletons.as_deref(),
                    );
                    // The submitter may have given up waiting.
                    let _ = reply.send(result);
                }
                Command::UpdateThresholds { update, reply } => {
                    let _ = reply.send(detector.update_thresholds(&update));
                }
                Command::Reset { reply } => {
                    detector.reset();
                    let _ = reply.send(());
                }
                Command::Shutdown => break,
            }
        }
        debug!(frames = detector.stats().frames_processed, "detector worker stopped");
        detector
    }

    async fn enqueue(&self, command: Command) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| DetectionError::ServiceClosed)
    }

    /// Queues one frame and waits for its result.
    pub async fn submit(&self, input: FrameInput) -> Result<DetectionResult> {
        let frame_number = input.frame.frame_number;
        let (reply, answer) = oneshot::channel();
        let command = Command::Frame { input, reply };

        match self.policy {
            BackpressurePolicy::Block => self.enqueue(command).await?,
            BackpressurePolicy::Reject => match self.sender.try_send(command) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(frame = frame_number, "detector queue full; frame rejected");
                    return Err(DetectionError::FrameRejected { frame_number });
                }
                Err(TrySendError::Closed(_)) => return Err(DetectionError::ServiceClosed),
            },
        }

        answer.await.map_err(|_| DetectionError::ServiceClosed)?
    }

    /// Submits every input in order and collects the results in the same order.
    ///
    /// Fails on the first error; frames already queued are still processed.
    pub async fn submit_batch(&self, inputs: Vec<FrameInput>) -> Result<Vec<DetectionResult>> {
        try_join_all(inputs.into_iter().map(|input| self.submit(input))).await
    }

    /// Applies a threshold update after every frame queued before it.
    pub async fn update_thresholds(&self, update: ThresholdUpdate) -> Result<()> {
        let (reply, answer) = oneshot::channel();
        self.enqueue(Command::UpdateThresholds { update, reply }).await?;
        answer.await.map_err(|_| DetectionError::ServiceClosed)?
    }

    pub async fn reset(&self) -> Result<()> {
        let (reply, answer) = oneshot::channel();
        self.enqueue(Command::Reset { reply }).await?;
        answer.await.map_err(|_| DetectionError::ServiceClosed)
    }

    pub fn event_receiver(&self) -> broadcast::Receiver<DetectorEvent> {
        self.events.resubscribe()
    }

    /// Drains the queue, stops the worker and hands the detector back.
    pub async fn shutdown(self) -> Result<AnomalyDetector> {
        self.enqueue(Command::Shutdown).await?;
        let detector = self.worker.await.map_err(|_| DetectionError::ServiceClosed)?;
        info!("detector service stopped");
        Ok(detector)
    }
}
