/*!
 * Run-scoped pipeline state.
 *
 * `PipelineState` is owned by exactly one orchestrator task and threaded by
 * mutable reference through every stage. It holds the stage tag, the
 * accumulated records and the single revision feedback slot.
 */

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::pipeline::records::{
    AssetBundle, Chapter, RevisionFeedback, SceneDesign, SceneSpec, ScriptRecord, SourceText,
};

/// Stage tag of a run.
///
/// Variants are declared in execution order so the derived `Ord` matches the
/// forward direction of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Segmenting,
    Scripting,
    Designing,
    GeneratingAssets,
    ValidatingContinuity,
    Finalizing,
    Finalized,
    Failed,
}

impl PipelineStage {
    /// Stage name as shown to observers.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Segmenting => "segmenting",
            PipelineStage::Scripting => "scripting",
            PipelineStage::Designing => "designing",
            PipelineStage::GeneratingAssets => "generating_assets",
            PipelineStage::ValidatingContinuity => "validating_continuity",
            PipelineStage::Finalizing => "finalizing",
            PipelineStage::Finalized => "finalized",
            PipelineStage::Failed => "failed",
        }
    }

    /// Slice of the 0-100 progress scale owned by this stage, as `(base, span)`.
    pub fn progress_range(&self) -> (f64, f64) {
        match self {
            PipelineStage::Idle => (0.0, 0.0),
            PipelineStage::Segmenting => (0.0, 10.0),
            PipelineStage::Scripting => (10.0, 20.0),
            PipelineStage::Designing => (30.0, 20.0),
            PipelineStage::GeneratingAssets => (50.0, 30.0),
            PipelineStage::ValidatingContinuity => (80.0, 15.0),
            PipelineStage::Finalizing => (95.0, 5.0),
            PipelineStage::Finalized => (100.0, 0.0),
            PipelineStage::Failed => (0.0, 0.0),
        }
    }

    /// Percent for `done` of `total` items finished inside this stage.
    pub fn item_percent(&self, done: usize, total: usize) -> f64 {
        let (base, span) = self.progress_range();
        if total == 0 {
            return base + span;
        }
        base + (done.min(total) as f64 / total as f64) * span
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Finalized | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters describing how much of a run degraded to fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Chapters whose script came from the fallback
    pub script_fallbacks: usize,

    /// Scene designs that came from the fallback
    pub design_fallbacks: usize,

    /// Asset bundles that came from the fallback
    pub asset_fallbacks: usize,

    /// Bundles rewritten by the continuity repair pass
    pub repaired_bundles: usize,

    /// Redesign passes triggered by the continuity gate
    pub revision_passes: u32,

    /// Failed redesigns that kept the scene's previous design
    pub kept_designs: usize,

    /// Whether the gate was still failing when the revision bound was hit
    pub accepted_best_effort: bool,

    /// Scenes left out of the final output for lack of assets
    pub dropped_scenes: usize,
}

/// The mutable record threaded through every stage of one run.
#[derive(Debug)]
pub struct PipelineState {
    run_id: String,
    stage: PipelineStage,

    /// Source text submitted for this run
    pub source: SourceText,

    /// Chapters, in index order
    pub chapters: Vec<Chapter>,

    /// Scripts, one per chapter, in chapter order
    pub scripts: Vec<ScriptRecord>,

    /// Scene designs keyed by scene id
    pub designs: HashMap<String, SceneDesign>,

    /// Asset bundles keyed by scene id
    pub assets: HashMap<String, AssetBundle>,

    /// Fallback and revision counters
    pub stats: PipelineStats,

    feedback: Option<RevisionFeedback>,
    revisions: u32,
    error: Option<String>,
}

impl PipelineState {
    /// Create an idle state for a fresh run.
    pub fn new(run_id: impl Into<String>, source: SourceText) -> Self {
        Self {
            run_id: run_id.into(),
            stage: PipelineStage::Idle,
            source,
            chapters: Vec::new(),
            scripts: Vec::new(),
            designs: HashMap::new(),
            assets: HashMap::new(),
            stats: PipelineStats::default(),
            feedback: None,
            revisions: 0,
            error: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Number of redesign passes performed so far.
    pub fn revisions(&self) -> u32 {
        self.revisions
    }

    /// Error description once the run has failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Move to `next`.
    ///
    /// Forward moves are always allowed from a non-terminal stage. The only
    /// backward move accepted is `ValidatingContinuity -> Designing`, which
    /// also bumps the revision counter.
    pub fn advance(&mut self, next: PipelineStage) -> Result<(), PipelineError> {
        let from = self.stage;
        let redesign =
            from == PipelineStage::ValidatingContinuity && next == PipelineStage::Designing;
        let allowed = !from.is_terminal()
            && next != PipelineStage::Failed
            && next != PipelineStage::Idle
            && (next > from || redesign);

        if !allowed {
            return Err(PipelineError::InvalidTransition { from, to: next });
        }

        if redesign {
            self.revisions += 1;
        }
        self.stage = next;
        Ok(())
    }

    /// Move to the absorbing `Failed` stage, recording why.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.stage = PipelineStage::Failed;
        self.error = Some(reason.into());
    }

    /// Store the gate's correction payload. Any unconsumed payload is replaced,
    /// so at most one is ever pending.
    pub fn set_feedback(&mut self, feedback: RevisionFeedback) {
        self.feedback = Some(feedback);
    }

    /// Consume the pending correction payload, if any.
    pub fn take_feedback(&mut self) -> Option<RevisionFeedback> {
        self.feedback.take()
    }

    pub fn has_pending_feedback(&self) -> bool {
        self.feedback.is_some()
    }

    /// All scene specs across every script, in chapter then scene order,
    /// paired with the title of the chapter they belong to.
    pub fn flat_scenes(&self) -> Vec<(String, SceneSpec)> {
        self.scripts
            .iter()
            .flat_map(|script| {
                script
                    .scenes
                    .iter()
                    .map(move |scene| (script.title.clone(), scene.clone()))
            })
            .collect()
    }

    /// Total number of planned scenes.
    pub fn scene_count(&self) -> usize {
        self.scripts.iter().map(|s| s.scenes.len()).sum()
    }
}
