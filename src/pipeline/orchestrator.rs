/*!
 * The pipeline state machine.
 *
 * One `Orchestrator` drives one run: it owns the run's `PipelineState`,
 * calls the collaborators stage by stage with bounded concurrent fan-out,
 * swaps failed items for their fallbacks, runs the bounded
 * redesign loop and reports progress.
 */

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::{PipelineError, StageError};
use crate::pipeline::continuity::{self, ContinuitySummary, GateOutcome};
use crate::pipeline::fallback;
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::records::{
    Chapter, FinalChapter, FinalScene, RevisionFeedback, SceneSpec, ScriptRecord, SourceText,
};
use crate::pipeline::state::{PipelineStage, PipelineState};
use crate::pipeline::stages::Collaborators;
use crate::pipeline::{PipelineSettings, RunSummary};

/// Drives a single run from segmentation to the final records.
pub struct Orchestrator {
    collaborators: Collaborators,
    settings: PipelineSettings,
    reporter: ProgressReporter,
    cancel: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        settings: PipelineSettings,
        reporter: ProgressReporter,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            collaborators,
            settings,
            reporter,
            cancel,
        }
    }

    /// Execute the run. Exactly one terminal progress event is emitted,
    /// whichever way it ends.
    pub async fn run(self, source: SourceText) -> Result<RunSummary, PipelineError> {
        let run_id = self.reporter.run_id().to_string();
        let mut state = PipelineState::new(run_id.clone(), source);
        info!("Run {} started for '{}'", run_id, state.source.name);

        match self.drive(&mut state).await {
            Ok(chapters) => {
                let scenes: usize = chapters.iter().map(|c| c.scenes.len()).sum();
                info!(
                    "Run {} finished: {} chapter(s), {} scene(s), {} revision pass(es)",
                    run_id,
                    chapters.len(),
                    scenes,
                    state.revisions()
                );
                self.reporter.complete(format!(
                    "Finished {} chapter(s) with {} scene(s)",
                    chapters.len(),
                    scenes
                ));
                Ok(RunSummary {
                    run_id,
                    chapters,
                    stats: state.stats.clone(),
                })
            }
            Err(e) => {
                let stage = e.stage().unwrap_or(state.stage());
                error!("Run {} failed during {}: {}", run_id, stage, e);
                state.fail(e.to_string());
                self.reporter.fail(format!("Run failed during {}: {}", stage, e));
                Err(e)
            }
        }
    }

    async fn drive(&self, state: &mut PipelineState) -> Result<Vec<FinalChapter>, PipelineError> {
        self.segment(state).await?;
        self.script(state).await?;

        let all: Vec<usize> = (0..state.scene_count()).collect();
        let designed = self.design(state, &all, None).await?;
        self.produce_assets(state, &designed).await?;

        loop {
            let outcome = self.validate(state).await?;
            if outcome.passed {
                break;
            }

            if state.revisions() >= self.settings.max_revisions {
                warn!(
                    "Continuity still failing after {} revision pass(es), accepting best effort",
                    state.revisions()
                );
                state.stats.accepted_best_effort = true;
                break;
            }

            let feedback = outcome.feedback.unwrap_or_default();
            let targets = feedback.target_indices();
            state.set_feedback(feedback);
            state.advance(PipelineStage::Designing)?;
            state.stats.revision_passes = state.revisions();

            self.reporter.rewind(
                PipelineStage::Designing,
                state.revisions(),
                format!(
                    "Continuity check failed, redesigning {} scene(s) (revision {}/{})",
                    targets.len(),
                    state.revisions(),
                    self.settings.max_revisions
                ),
            );

            let feedback = state.take_feedback();
            let redesigned = self.design(state, &targets, feedback).await?;
            self.produce_assets(state, &redesigned).await?;
        }

        self.finalize(state)
    }

    async fn segment(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let stage = PipelineStage::Segmenting;
        state.advance(stage)?;
        self.reporter.report(stage, 0.0, "Splitting text into chapters");

        if state.source.is_blank() {
            return Err(PipelineError::Segmentation("source text is empty".to_string()));
        }

        let segmenter = Arc::clone(&self.collaborators.segmenter);
        let chapters = self
            .until_cancelled(stage, segmenter.segment(&state.source))
            .await?
            .map_err(|e| PipelineError::Segmentation(e.to_string()))?;

        if chapters.is_empty() {
            return Err(PipelineError::Segmentation("no chapters found".to_string()));
        }

        // Positions are the chapter identity; whatever the segmenter numbered is ignored.
        state.chapters = chapters
            .into_iter()
            .enumerate()
            .map(|(index, chapter)| Chapter::new(index, chapter.text))
            .collect();

        self.reporter.report(
            stage,
            stage.item_percent(1, 1),
            format!("Split text into {} chapter(s)", state.chapters.len()),
        );
        Ok(())
    }

    async fn script(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let stage = PipelineStage::Scripting;
        state.advance(stage)?;
        self.reporter
            .report(stage, stage.item_percent(0, 1), "Writing chapter scripts");

        let scripter = Arc::clone(&self.collaborators.scripter);
        let results = self
            .run_items(stage, state.chapters.clone(), |chapter: Chapter| {
                let scripter = Arc::clone(&scripter);
                async move { scripter.write_script(&chapter).await }
            })
            .await?;
        ensure_reachable(stage, &results)?;

        let mut scripts = Vec::with_capacity(state.chapters.len());
        for (chapter, result) in state.chapters.iter().zip(results) {
            let script = match result {
                Ok(script) if !script.scenes.is_empty() => ScriptRecord {
                    chapter_index: chapter.index,
                    ..script
                },
                Ok(_) => {
                    warn!("Script for chapter {} has no scenes, using fallback", chapter.index);
                    state.stats.script_fallbacks += 1;
                    fallback::script(chapter)
                }
                Err(e) => {
                    warn!("Scripting chapter {} failed: {}. Using fallback", chapter.index, e);
                    state.stats.script_fallbacks += 1;
                    fallback::script(chapter)
                }
            };
            scripts.push(script);
        }

        normalize_scene_ids(&mut scripts);
        state.scripts = scripts;
        Ok(())
    }

    /// Design the scenes at the given flat indices and return the indices
    /// whose design changed. Designs already present for those scenes are
    /// replaced.
    ///
    /// During a revision pass a failed redesign keeps the scene's previous
    /// design (and bundle) instead of failing the run.
    async fn design(
        &self,
        state: &mut PipelineState,
        targets: &[usize],
        feedback: Option<RevisionFeedback>,
    ) -> Result<Vec<usize>, PipelineError> {
        let stage = PipelineStage::Designing;
        if state.stage() != stage {
            state.advance(stage)?;
        }
        self.reporter.report(
            stage,
            stage.item_percent(0, 1),
            format!("Designing {} scene(s)", targets.len()),
        );

        let revising = state.revisions() > 0;
        let flat = state.flat_scenes();
        let items: Vec<(usize, String, SceneSpec, Option<RevisionFeedback>)> = targets
            .iter()
            .filter_map(|&index| {
                let (chapter_title, scene) = flat.get(index)?.clone();
                let scoped = feedback.as_ref().and_then(|f| scoped_feedback(f, index));
                Some((index, chapter_title, scene, scoped))
            })
            .collect();
        let specs: Vec<(usize, SceneSpec)> = items
            .iter()
            .map(|(index, _, scene, _)| (*index, scene.clone()))
            .collect();

        let designer = Arc::clone(&self.collaborators.designer);
        let results = self
            .run_items(stage, items, |(_, chapter_title, scene, scoped)| {
                let designer = Arc::clone(&designer);
                async move { designer.design(&scene, &chapter_title, scoped.as_ref()).await }
            })
            .await?;
        if !revising {
            ensure_reachable(stage, &results)?;
        }

        let mut designed = Vec::with_capacity(specs.len());
        for ((index, scene), result) in specs.iter().zip(results) {
            let design = match result {
                Ok(mut design) => {
                    design.scene_id = scene.id.clone();
                    design
                }
                Err(e) if revising && state.designs.contains_key(&scene.id) => {
                    warn!("Redesigning scene {} failed: {}. Keeping the previous design", scene.id, e);
                    state.stats.kept_designs += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Designing scene {} failed: {}. Using fallback", scene.id, e);
                    state.stats.design_fallbacks += 1;
                    fallback::design(scene)
                }
            };
            state.designs.insert(scene.id.clone(), design);
            designed.push(*index);
        }
        Ok(designed)
    }

    /// Produce assets for the scenes at the given flat indices. During a
    /// revision pass every failure degrades to the fallback bundle.
    async fn produce_assets(
        &self,
        state: &mut PipelineState,
        targets: &[usize],
    ) -> Result<(), PipelineError> {
        let stage = PipelineStage::GeneratingAssets;
        let revising = state.revisions() > 0;
        state.advance(stage)?;
        self.reporter.report(
            stage,
            stage.item_percent(0, 1),
            format!("Generating assets for {} scene(s)", targets.len()),
        );

        let flat = state.flat_scenes();
        let designs: Vec<_> = targets
            .iter()
            .filter_map(|&index| flat.get(index))
            .filter_map(|(_, scene)| state.designs.get(&scene.id).cloned())
            .collect();

        let producer = Arc::clone(&self.collaborators.producer);
        let results = self
            .run_items(stage, designs.clone(), |design| {
                let producer = Arc::clone(&producer);
                async move { producer.produce(&design).await }
            })
            .await?;
        if !revising {
            ensure_reachable(stage, &results)?;
        }

        for (design, result) in designs.iter().zip(results) {
            let bundle = match result {
                Ok(mut bundle) => {
                    bundle.scene_id = design.scene_id.clone();
                    bundle
                }
                Err(e) => {
                    warn!("Assets for scene {} failed: {}. Using fallback", design.scene_id, e);
                    state.stats.asset_fallbacks += 1;
                    fallback::assets(design, &self.settings.placeholder_image_url)
                }
            };
            state.assets.insert(design.scene_id.clone(), bundle);
        }
        Ok(())
    }

    /// Run the continuity gate: local repair, then the holistic review.
    async fn validate(&self, state: &mut PipelineState) -> Result<GateOutcome, PipelineError> {
        let stage = PipelineStage::ValidatingContinuity;
        state.advance(stage)?;
        self.reporter
            .report(stage, stage.item_percent(0, 1), "Checking continuity");

        let repaired = continuity::repair_all(&mut state.assets, &self.settings.placeholder_image_url);
        if repaired > 0 {
            debug!("Continuity repair rewrote {} bundle(s)", repaired);
        }
        state.stats.repaired_bundles += repaired;
        self.reporter
            .report(stage, stage.item_percent(1, 2), "Reviewing scene continuity");

        let summary = ContinuitySummary::build(&state.scripts, &state.assets);
        let validator = Arc::clone(&self.collaborators.validator);
        let timeout = self.settings.item_timeout;
        let review = async {
            match tokio::time::timeout(timeout, validator.review(&summary)).await {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout(timeout.as_secs())),
            }
        };

        let outcome = match self.until_cancelled(stage, review).await? {
            Ok(verdict) => {
                let order: Vec<String> = state.flat_scenes().into_iter().map(|(_, s)| s.id).collect();
                continuity::apply_verdict(&verdict, &order, &mut state.assets)
            }
            Err(e) => {
                warn!("Continuity review failed: {}. Keeping local repairs only", e);
                GateOutcome {
                    passed: true,
                    ..Default::default()
                }
            }
        };

        let message = if outcome.passed {
            "Continuity check passed".to_string()
        } else {
            format!(
                "Continuity check requested {} redesign(s)",
                outcome.feedback.as_ref().map_or(0, |f| f.items.len())
            )
        };
        self.reporter.report(stage, stage.item_percent(1, 1), message);
        Ok(outcome)
    }

    /// Assemble the terminal records. Scenes without assets are dropped.
    fn finalize(&self, state: &mut PipelineState) -> Result<Vec<FinalChapter>, PipelineError> {
        let stage = PipelineStage::Finalizing;
        state.advance(stage)?;
        self.reporter
            .report(stage, stage.item_percent(0, 1), "Assembling chapters");

        if state.scripts.len() != state.chapters.len() {
            return Err(PipelineError::Finalization(format!(
                "{} script(s) for {} chapter(s)",
                state.scripts.len(),
                state.chapters.len()
            )));
        }

        let known: HashSet<&str> = state
            .scripts
            .iter()
            .flat_map(|s| s.scenes.iter().map(|scene| scene.id.as_str()))
            .collect();
        if let Some(orphan) = state
            .designs
            .keys()
            .chain(state.assets.keys())
            .find(|id| !known.contains(id.as_str()))
        {
            return Err(PipelineError::Finalization(format!(
                "record keyed by unknown scene id '{}'",
                orphan
            )));
        }

        let mut dropped = 0;
        let chapters: Vec<FinalChapter> = state
            .scripts
            .iter()
            .map(|script| {
                let mut scenes = Vec::with_capacity(script.scenes.len());
                for scene in &script.scenes {
                    let Some(bundle) = state.assets.get(&scene.id) else {
                        warn!("Scene {} has no assets, leaving it out", scene.id);
                        dropped += 1;
                        continue;
                    };
                    scenes.push(FinalScene {
                        id: scene.id.clone(),
                        chapter_index: script.chapter_index,
                        scene_index: scenes.len(),
                        title: scene.title.clone(),
                        description: scene.description.clone(),
                        image_url: bundle.image_url.clone(),
                        audio_url: bundle.audio_url.clone(),
                        audio_script: bundle.narration.clone(),
                        animation_code: bundle.animation_markup.clone(),
                        duration: bundle.display_duration(),
                    });
                }
                FinalChapter {
                    id: Uuid::new_v4().to_string(),
                    title: script.title.clone(),
                    scenes,
                }
            })
            .collect();

        state.stats.dropped_scenes = dropped;
        state.advance(PipelineStage::Finalized)?;
        Ok(chapters)
    }

    /// Run `f` over `items` with bounded concurrency and a per-item timeout.
    ///
    /// Results come back in input order. Each finished item advances the
    /// stage's progress sub-range.
    async fn run_items<T, R, F, Fut>(
        &self,
        stage: PipelineStage,
        items: Vec<T>,
        f: F,
    ) -> Result<Vec<Result<R, StageError>>, PipelineError>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, StageError>>,
    {
        let total = items.len();
        let done = Arc::new(AtomicUsize::new(0));
        let timeout = self.settings.item_timeout;
        let reporter = self.reporter.clone();

        let work = stream::iter(items.into_iter().enumerate())
            .map(move |(index, item)| {
                let call = f(item);
                let done = Arc::clone(&done);
                let reporter = reporter.clone();
                async move {
                    let result = match tokio::time::timeout(timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(StageError::Timeout(timeout.as_secs())),
                    };
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    reporter.report(
                        stage,
                        stage.item_percent(finished, total),
                        format!("{}: {}/{} done", stage, finished, total),
                    );
                    (index, result)
                }
            })
            .buffer_unordered(self.settings.max_concurrent_items.max(1))
            .collect::<Vec<_>>();

        let mut results = self.until_cancelled(stage, work).await?;
        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, result)| result).collect())
    }

    /// Await `fut` unless the run is cancelled first.
    async fn until_cancelled<F: Future>(
        &self,
        stage: PipelineStage,
        fut: F,
    ) -> Result<F::Output, PipelineError> {
        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            let closed = cancel.wait_for(|cancelled| *cancelled).await.is_err();
            if closed {
                // Handle dropped without cancelling: never fires.
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => {
                info!("Run cancelled during {}", stage);
                Err(PipelineError::Cancelled(stage))
            }
            output = fut => Ok(output),
        }
    }
}

/// A stage whose every item failed because its collaborator is unreachable
/// is a structural failure.
fn ensure_reachable<R>(
    stage: PipelineStage,
    results: &[Result<R, StageError>],
) -> Result<(), PipelineError> {
    let all_unreachable = !results.is_empty()
        && results
            .iter()
            .all(|r| matches!(r, Err(e) if e.is_unreachable()));

    if all_unreachable {
        let reason = results
            .iter()
            .rev()
            .find_map(|r| r.as_ref().err())
            .map(|e| e.to_string())
            .unwrap_or_default();
        return Err(PipelineError::Unreachable { stage, reason });
    }
    Ok(())
}

/// Corrections of `feedback` that target flat scene `index`.
fn scoped_feedback(feedback: &RevisionFeedback, index: usize) -> Option<RevisionFeedback> {
    let items: Vec<_> = feedback
        .items
        .iter()
        .filter(|item| item.scene_index == index)
        .cloned()
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(RevisionFeedback::new(items))
    }
}

/// Make scene ids unique across the run. Empty or repeated ids are replaced
/// by the positional id, suffixed if that is taken too.
fn normalize_scene_ids(scripts: &mut [ScriptRecord]) {
    let mut seen = HashSet::new();
    for script in scripts.iter_mut() {
        let chapter = script.chapter_index;
        for (position, scene) in script.scenes.iter_mut().enumerate() {
            let id = scene.id.trim();
            if !id.is_empty() && seen.insert(id.to_string()) {
                scene.id = id.to_string();
                continue;
            }

            let base = fallback::scene_id(chapter, position);
            let mut candidate = base.clone();
            let mut suffix = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            debug!("Renamed scene id '{}' to '{}'", scene.id, candidate);
            scene.id = candidate;
        }
    }
}
