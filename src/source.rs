//! Frame source boundary
//!
//! The replay core consumes frames as events from an abstract source; it
//! never depends on a concrete capture transport. Ingestion into the
//! replay buffer must never block the delivery channel, so every
//! insertion is dispatched as its own task; the live path is serialized
//! behind the controller lock instead.

use crate::buffer::ReplayBuffer;
use crate::controller::RecordingController;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::Mutex;

/// One captured frame as delivered by the source
#[derive(Debug, Clone)]
pub struct FrameEvent {
    /// Encoded image payload
    pub payload: Vec<u8>,

    /// Capture timestamp (unix milliseconds)
    pub timestamp_ms: u64,
}

/// A frame-producing source the replay core can subscribe to
pub trait FrameSource {
    fn subscribe(&self) -> broadcast::Receiver<FrameEvent>;
}

/// In-process frame feed for hosts that push frames directly.
///
/// The host publishes `(payload, timestamp)` notifications; the core
/// subscribes like it would to any other source.
pub struct FrameFeed {
    tx: broadcast::Sender<FrameEvent>,
}

impl FrameFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Deliver one frame to all subscribers
    pub fn publish(&self, payload: Vec<u8>, timestamp_ms: u64) {
        let _ = self.tx.send(FrameEvent {
            payload,
            timestamp_ms,
        });
    }
}

impl FrameSource for FrameFeed {
    fn subscribe(&self) -> broadcast::Receiver<FrameEvent> {
        self.tx.subscribe()
    }
}

/// Consume a frame stream into the replay buffer and, while recording,
/// the live append path.
///
/// Buffer insertions are spawned as independent tasks so a slow consumer
/// never stalls delivery; the buffer itself serializes them. Live frames
/// queue on the controller lock, which also guarantees the initial-frame
/// drain in `start_recording` finishes before the first live append.
pub fn spawn_ingestion(
    controller: Arc<Mutex<RecordingController>>,
    buffer: Arc<ReplayBuffer>,
    mut receiver: broadcast::Receiver<FrameEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let FrameEvent {
                        payload,
                        timestamp_ms,
                    } = event;

                    let insert_buffer = Arc::clone(&buffer);
                    let insert_payload = payload.clone();
                    tokio::spawn(async move {
                        insert_buffer.push(insert_payload, timestamp_ms);
                    });

                    let mut controller = controller.lock().await;
                    controller.handle_live_frame(&payload, timestamp_ms);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Frame ingestion lagged, {} frames skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Frame source closed, ingestion stopping");
                    break;
                }
            }
        }
    })
}
