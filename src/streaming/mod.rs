//! Streaming transcription sessions.
//!
//! [`RealtimeEngine`] runs local inference over a sliding window;
//! the remote realtime client (see [`crate::realtime_api`]) produces the
//! same [`StreamingSession`] surface over a cloud backend.

mod controller;

pub use controller::RealtimeEngine;

use crate::events::TranscriptionEvent;
use crate::speech_engine::FrameSource;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handle to a running session: an ordered event stream plus cooperative
/// stop control. Dropping the handle without calling [`stop`](Self::stop)
/// leaves the session running until its frame source ends.
pub struct StreamingSession {
    events: mpsc::UnboundedReceiver<TranscriptionEvent>,
    source: Box<dyn FrameSource>,
    stop_requested: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl StreamingSession {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<TranscriptionEvent>,
        source: Box<dyn FrameSource>,
        stop_requested: Arc<AtomicBool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            source,
            stop_requested,
            task,
        }
    }

    /// Next event, or None once the session has ended and all trailing
    /// events (including in-flight translations) have been delivered.
    pub async fn recv(&mut self) -> Option<TranscriptionEvent> {
        self.events.recv().await
    }

    /// Request a cooperative stop: the frame source is halted best-effort,
    /// in-flight work drains, pending text is force-committed, and the event
    /// stream closes. Idempotent.
    pub fn stop(&mut self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            debug!("Session stop requested");
        }
        self.source.stop();
    }

    /// Wait for the session task to finish. Call after draining events.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}
