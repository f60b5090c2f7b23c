/*!
 * Handle to a run executing in the background.
 */

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::errors::PipelineError;
use crate::pipeline::RunSummary;
use crate::pipeline::progress::{ProgressEvent, ProgressReporter};

/// Caller-side view of one submitted run.
#[derive(Debug)]
pub struct RunHandle {
    id: String,
    reporter: ProgressReporter,
    events: Option<broadcast::Receiver<ProgressEvent>>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<RunSummary, PipelineError>>,
}

impl RunHandle {
    pub(crate) fn new(
        id: String,
        reporter: ProgressReporter,
        events: broadcast::Receiver<ProgressEvent>,
        cancel: watch::Sender<bool>,
        task: JoinHandle<Result<RunSummary, PipelineError>>,
    ) -> Self {
        Self {
            id,
            reporter,
            events: Some(events),
            cancel,
            task,
        }
    }

    /// Stable run identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Receiver created at submission, so it sees every event of the run.
    /// Later calls fall back to a fresh subscription.
    pub fn events(&mut self) -> broadcast::Receiver<ProgressEvent> {
        self.events
            .take()
            .unwrap_or_else(|| self.reporter.subscribe())
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.reporter.subscribe()
    }

    /// Last emitted event.
    pub fn latest(&self) -> Option<ProgressEvent> {
        self.reporter.latest()
    }

    /// Ask the run to stop. Pending items are abandoned and the run fails
    /// with a cancellation reason.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end and take its result.
    pub async fn wait(self) -> Result<RunSummary, PipelineError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                let error = PipelineError::Join(e.to_string());
                self.reporter.fail(error.to_string());
                Err(error)
            }
        }
    }
}
