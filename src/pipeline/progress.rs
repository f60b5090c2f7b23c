/*!
 * Progress reporting for a single run.
 *
 * The reporter is a cheap cloneable handle over a broadcast channel plus a
 * snapshot of the last event. Emitting never blocks: slow subscribers lag and
 * lose their oldest events instead of stalling the pipeline.
 */

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::pipeline::state::PipelineStage;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Run the event belongs to
    pub run_id: String,

    /// Stage emitting the event
    pub stage: PipelineStage,

    /// Overall completion, 0 to 100
    pub percent: f64,

    /// Human-readable status line
    pub message: String,

    /// Whether this is the last event of the run
    pub terminal: bool,

    /// Redesign pass number, set once the continuity gate has sent work back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,

    /// Emission time
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Label observers should display. Design events of a revision pass read
    /// "redesigning" so the loop is distinguishable from the first pass.
    pub fn label(&self) -> &'static str {
        if self.revision.is_some() && self.stage == PipelineStage::Designing {
            "redesigning"
        } else {
            self.stage.as_str()
        }
    }

    /// Whether this terminal event reports success.
    pub fn is_success(&self) -> bool {
        self.terminal && self.stage == PipelineStage::Finalized
    }
}

#[derive(Debug)]
struct ReporterState {
    floor: f64,
    revision: Option<u32>,
    latest: Option<ProgressEvent>,
    finished: bool,
}

#[derive(Debug)]
struct Inner {
    run_id: String,
    sender: broadcast::Sender<ProgressEvent>,
    state: Mutex<ReporterState>,
}

/// Sink for the progress events of one run.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    inner: Arc<Inner>,
}

impl ProgressReporter {
    /// Create a reporter whose channel buffers up to `capacity` events per subscriber.
    pub fn new(run_id: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                run_id: run_id.into(),
                sender,
                state: Mutex::new(ReporterState {
                    floor: 0.0,
                    revision: None,
                    latest: None,
                    finished: false,
                }),
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.sender.subscribe()
    }

    /// Last event emitted, if any.
    pub fn latest(&self) -> Option<ProgressEvent> {
        self.inner.state.lock().latest.clone()
    }

    /// Whether the terminal event has been emitted.
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    /// Report progress within the current forward pass. The percent is clamped
    /// so it never falls below the last reported value.
    pub fn report(&self, stage: PipelineStage, percent: f64, message: impl Into<String>) {
        self.emit(stage, percent, message.into(), false, false);
    }

    /// Report that the continuity gate sent work back to `stage`. This is the
    /// only emission allowed to lower the percent; it starts revision pass
    /// number `revision`.
    pub fn rewind(&self, stage: PipelineStage, revision: u32, message: impl Into<String>) {
        {
            let mut state = self.inner.state.lock();
            if state.finished {
                return;
            }
            state.floor = stage.progress_range().0;
            state.revision = Some(revision);
        }
        let percent = stage.progress_range().0;
        self.emit(stage, percent, message.into(), false, false);
    }

    /// Emit the success terminal event at 100%.
    pub fn complete(&self, message: impl Into<String>) {
        self.emit(PipelineStage::Finalized, 100.0, message.into(), true, false);
    }

    /// Emit the failure terminal event. The percent stays where the run stopped.
    pub fn fail(&self, message: impl Into<String>) {
        self.emit(PipelineStage::Failed, 0.0, message.into(), true, true);
    }

    fn emit(
        &self,
        stage: PipelineStage,
        percent: f64,
        message: String,
        terminal: bool,
        keep_floor: bool,
    ) {
        let mut state = self.inner.state.lock();
        if state.finished {
            debug!("Dropping progress event after terminal event: {}", message);
            return;
        }

        let requested = percent.clamp(0.0, 100.0);
        let percent = if keep_floor { state.floor } else { requested.max(state.floor) };
        state.floor = percent;

        let event = ProgressEvent {
            run_id: self.inner.run_id.clone(),
            stage,
            percent,
            message,
            terminal,
            revision: state.revision,
            timestamp: Utc::now(),
        };

        state.latest = Some(event.clone());
        state.finished = terminal;

        // Sent while holding the lock so subscribers see events in emission order.
        if self.inner.sender.send(event).is_err() {
            if terminal {
                warn!("Run {} finished with no progress subscribers", self.inner.run_id);
            }
        }
    }
}
