/*!
 * Novel-to-scenes pipeline.
 *
 * - `records`: typed records passed between stages
 * - `state`: stage tags and the run-scoped state
 * - `stages`: collaborator contracts
 * - `fallback`: deterministic substitutes for failed items
 * - `continuity`: the repair pass and the review gate
 * - `progress`: progress events and their reporter
 * - `orchestrator`: the state machine driving one run
 * - `run`: handle to a run executing in the background
 */

pub mod continuity;
pub mod fallback;
pub mod orchestrator;
pub mod progress;
pub mod records;
pub mod run;
pub mod stages;
pub mod state;

use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::app_config::Config;
use crate::errors::PipelineError;

pub use orchestrator::Orchestrator;
pub use progress::{ProgressEvent, ProgressReporter};
pub use records::{FinalChapter, FinalScene, SourceText};
pub use run::RunHandle;
pub use stages::Collaborators;
pub use state::{PipelineStage, PipelineStats};

/// Tuning knobs of the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Maximum number of redesign passes before accepting best effort
    pub max_revisions: u32,

    /// Maximum number of items of one stage in flight at once
    pub max_concurrent_items: usize,

    /// Time allowed for a single collaborator call
    pub item_timeout: Duration,

    /// Progress events buffered per subscriber
    pub progress_buffer: usize,

    /// Image reference used by the asset fallback and the repair pass
    pub placeholder_image_url: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_revisions: 2,
            max_concurrent_items: 4,
            item_timeout: Duration::from_secs(300),
            progress_buffer: 256,
            placeholder_image_url: fallback::PLACEHOLDER_IMAGE_URL.to_string(),
        }
    }
}

impl PipelineSettings {
    /// Build settings from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_revisions: config.pipeline.max_revisions,
            max_concurrent_items: config.pipeline.max_concurrent_items,
            item_timeout: Duration::from_secs(config.pipeline.item_timeout_secs),
            progress_buffer: config.pipeline.progress_buffer,
            placeholder_image_url: config.media.placeholder_image_url.clone(),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,

    /// Final chapters in source order
    pub chapters: Vec<FinalChapter>,

    /// How much of the run degraded to fallbacks
    pub stats: PipelineStats,
}

impl RunSummary {
    /// Total number of scenes across all chapters.
    pub fn scene_count(&self) -> usize {
        self.chapters.iter().map(|c| c.scenes.len()).sum()
    }
}

/// Entry point: submits runs against a fixed set of collaborators.
///
/// Every run gets its own orchestrator, state and reporter, so concurrent
/// runs never share mutable state.
#[derive(Debug, Clone)]
pub struct Pipeline {
    collaborators: Collaborators,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Start a run in the background and return its handle.
    pub fn submit(&self, source: SourceText) -> RunHandle {
        let run_id = Uuid::new_v4().to_string();
        let reporter = ProgressReporter::new(run_id.clone(), self.settings.progress_buffer);
        let events = reporter.subscribe();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        info!("Submitting run {} for '{}'", run_id, source.name);
        let orchestrator = Orchestrator::new(
            self.collaborators.clone(),
            self.settings.clone(),
            reporter.clone(),
            cancel_rx,
        );
        let task = tokio::spawn(orchestrator.run(source));

        RunHandle::new(run_id, reporter, events, cancel_tx, task)
    }

    /// Run to completion on the current task.
    pub async fn run(&self, source: SourceText) -> Result<RunSummary, PipelineError> {
        self.submit(source).wait().await
    }
}
