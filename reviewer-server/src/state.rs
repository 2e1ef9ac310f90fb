//! Shared application state for the review server.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reviewer::core::types::StageEvent;
use reviewer::pipeline::{EventSink, ReviewPipeline};
use serde::Serialize;
use tokio::sync::broadcast;

/// A stage event tagged with the run that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub run_id: String,
    #[serde(flatten)]
    pub event: StageEvent,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReviewPipeline>,
    /// Broadcast sender for events of every run.
    pub event_tx: Arc<broadcast::Sender<RunEvent>>,
    next_run: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(pipeline: ReviewPipeline) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            pipeline: Arc::new(pipeline),
            event_tx: Arc::new(event_tx),
            next_run: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Sink that tags events with a fresh run id and broadcasts them.
    pub fn start_run(&self) -> BroadcastSink {
        let id = self.next_run.fetch_add(1, Ordering::Relaxed);
        BroadcastSink {
            run_id: format!("run-{id}"),
            tx: Arc::clone(&self.event_tx),
        }
    }
}

/// Forwards a run's events to SSE subscribers.
pub struct BroadcastSink {
    run_id: String,
    tx: Arc<broadcast::Sender<RunEvent>>,
}

impl BroadcastSink {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl EventSink for BroadcastSink {
    fn emit(&mut self, event: StageEvent) {
        // No subscribers is fine; events are also logged by the pipeline.
        let _ = self.tx.send(RunEvent {
            run_id: self.run_id.clone(),
            event,
        });
    }
}
