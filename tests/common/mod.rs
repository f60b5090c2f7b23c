/*!
 * Common test utilities for the scenecraft test suite
 *
 * Scripted in-memory collaborators: each one answers deterministically,
 * records how it was called and can be told to fail for chosen items.
 */

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::broadcast;

use scenecraft::errors::StageError;
use scenecraft::pipeline::continuity::{ContinuityFix, ContinuitySummary, ContinuityVerdict};
use scenecraft::pipeline::records::{
    AssetBundle, Chapter, RevisionFeedback, SceneDesign, SceneSpec, ScriptRecord, SourceText,
};
use scenecraft::pipeline::stages::{
    AssetProducer, Collaborators, ContinuityValidator, SceneDesigner, Scripter, Segmenter,
};
use scenecraft::pipeline::{PipelineSettings, ProgressEvent};
use scenecraft::segmenter::ChapterSegmenter;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &PathBuf, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Route library logs to the test output
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Settings with short timeouts for tests
pub fn test_settings(max_revisions: u32) -> PipelineSettings {
    PipelineSettings {
        max_revisions,
        max_concurrent_items: 2,
        item_timeout: Duration::from_secs(5),
        ..PipelineSettings::default()
    }
}

/// A novel with `chapters` English chapter headings
pub fn novel(chapters: usize) -> SourceText {
    let content = (1..=chapters)
        .map(|i| format!("Chapter {}\nThe tide came in over the harbor for the {} time.", i, i))
        .collect::<Vec<_>>()
        .join("\n\n");
    SourceText::new("harbor.txt", content)
}

/// Scene id the scripted scripter gives scene `scene` of chapter `chapter`
pub fn scene_id(chapter: usize, scene: usize) -> String {
    format!("ch{}_sc{}", chapter, scene)
}

/// Verdict asking for a redesign of the given flat scene indices
pub fn redesign_verdict(indices: &[usize]) -> ContinuityVerdict {
    ContinuityVerdict {
        issues: vec!["The lighting jumps between scenes".to_string()],
        fixes: indices
            .iter()
            .map(|&scene_index| ContinuityFix {
                scene_index,
                fix_type: "redesign".to_string(),
                description: "Keep the dusk lighting".to_string(),
            })
            .collect(),
        ..ContinuityVerdict::default()
    }
}

/// Read events until the terminal one (inclusive)
pub async fn collect_events(mut events: broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut collected = Vec::new();
    loop {
        match events.recv().await {
            Ok(event) => {
                let terminal = event.terminal;
                collected.push(event);
                if terminal {
                    return collected;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return collected,
        }
    }
}

/// Segmenter that always fails
#[derive(Debug, Default)]
pub struct FailingSegmenter;

#[async_trait]
impl Segmenter for FailingSegmenter {
    async fn segment(&self, _source: &SourceText) -> Result<Vec<Chapter>, StageError> {
        Err(StageError::Malformed("no chapter structure".to_string()))
    }
}

/// Scripter writing `scenes_per_chapter` scenes for every chapter
#[derive(Debug)]
pub struct ScriptedScripter {
    pub scenes_per_chapter: usize,
    pub failing_chapters: HashSet<usize>,
    pub unreachable: bool,
    pub calls: AtomicUsize,
}

impl ScriptedScripter {
    pub fn new(scenes_per_chapter: usize) -> Self {
        Self {
            scenes_per_chapter,
            failing_chapters: HashSet::new(),
            unreachable: false,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Scripter for ScriptedScripter {
    async fn write_script(&self, chapter: &Chapter) -> Result<ScriptRecord, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(StageError::Unavailable("script model is down".to_string()));
        }
        if self.failing_chapters.contains(&chapter.index) {
            return Err(StageError::Malformed("missing scenes".to_string()));
        }

        let scenes = (0..self.scenes_per_chapter)
            .map(|i| SceneSpec {
                id: scene_id(chapter.index, i),
                title: format!("Scene {}", i + 1),
                description: format!("Chapter {} scene {}", chapter.index + 1, i + 1),
                dialogue: format!("Line {} of chapter {}", i + 1, chapter.index + 1),
                emotion: "peaceful".to_string(),
                setting: "harbor".to_string(),
                duration: 30.0,
            })
            .collect();

        Ok(ScriptRecord {
            chapter_index: chapter.index,
            title: format!("Chapter {}", chapter.index + 1),
            summary: "The tide comes in".to_string(),
            scenes,
        })
    }
}

/// One call to the scripted designer
#[derive(Debug, Clone)]
pub struct DesignCall {
    pub scene_id: String,
    pub feedback: Option<RevisionFeedback>,
}

/// Designer returning a complete design for every scene. The animation
/// keyframes are named `pan_<scene id>_<pass>`, where `pass` counts earlier
/// designs of the same scene.
#[derive(Debug, Default)]
pub struct ScriptedDesigner {
    pub unreachable: bool,
    /// Become unreachable once this many calls have been made
    pub unreachable_after: Option<usize>,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<DesignCall>>,
}

impl ScriptedDesigner {
    pub fn calls(&self) -> Vec<DesignCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SceneDesigner for ScriptedDesigner {
    async fn design(
        &self,
        scene: &SceneSpec,
        _chapter_title: &str,
        feedback: Option<&RevisionFeedback>,
    ) -> Result<SceneDesign, StageError> {
        let (pass, earlier_calls) = {
            let mut calls = self.calls.lock();
            let pass = calls.iter().filter(|c| c.scene_id == scene.id).count();
            let earlier_calls = calls.len();
            calls.push(DesignCall {
                scene_id: scene.id.clone(),
                feedback: feedback.cloned(),
            });
            (pass, earlier_calls)
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let exhausted = self.unreachable_after.is_some_and(|limit| earlier_calls >= limit);
        if self.unreachable || exhausted {
            return Err(StageError::Unavailable("design model is down".to_string()));
        }

        Ok(SceneDesign {
            scene_id: scene.id.clone(),
            visual_description: scene.description.clone(),
            image_prompt: format!("A harbor at dusk, {}", scene.title),
            narration: scene.dialogue.clone(),
            animation_effects: "slow pan".to_string(),
            animation_markup: format!(
                "@keyframes pan_{id}_{pass} {{ from {{ transform: translateX(0); }} to {{ transform: translateX(-5%); }} }}",
                id = scene.id
            ),
            camera_angle: "wide shot".to_string(),
            mood: "calm".to_string(),
            color_palette: vec!["#1E3A5F".to_string(), "#F4A261".to_string()],
            duration: scene.duration,
        })
    }
}

/// Producer returning complete bundles, failing for chosen scene ids
#[derive(Debug, Default)]
pub struct ScriptedProducer {
    pub failing_scenes: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedProducer {
    pub fn failing(scene_ids: &[&str]) -> Self {
        Self {
            failing_scenes: scene_ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls_for(&self, scene_id: &str) -> usize {
        self.calls.lock().iter().filter(|id| id.as_str() == scene_id).count()
    }
}

#[async_trait]
impl AssetProducer for ScriptedProducer {
    async fn produce(&self, design: &SceneDesign) -> Result<AssetBundle, StageError> {
        self.calls.lock().push(design.scene_id.clone());
        if self.failing_scenes.contains(&design.scene_id) {
            return Err(StageError::Io(std::io::Error::other("image generator crashed")));
        }

        Ok(AssetBundle {
            scene_id: design.scene_id.clone(),
            image_url: format!("/assets/images/{}.png", design.scene_id),
            audio_url: format!("/assets/audios/{}.mp3", design.scene_id),
            audio_duration: 21.5,
            narration: design.narration.clone(),
            animation_markup: design.animation_markup.clone(),
            duration: design.duration,
            complete: true,
        })
    }
}

/// Validator answering from a queue of verdicts, then with `fallback_verdict`
#[derive(Debug, Default)]
pub struct ScriptedValidator {
    pub verdicts: Mutex<VecDeque<ContinuityVerdict>>,
    pub fallback_verdict: ContinuityVerdict,
    pub failing: bool,
    pub calls: AtomicUsize,
}

impl ScriptedValidator {
    /// Answer with `verdicts` in order, then pass
    pub fn sequence(verdicts: Vec<ContinuityVerdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            ..Self::default()
        }
    }

    /// Answer `verdict` every time
    pub fn always(verdict: ContinuityVerdict) -> Self {
        Self {
            fallback_verdict: verdict,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContinuityValidator for ScriptedValidator {
    async fn review(&self, _summary: &ContinuitySummary) -> Result<ContinuityVerdict, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(StageError::Malformed("verdict was not JSON".to_string()));
        }
        let next = self.verdicts.lock().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback_verdict.clone()))
    }
}

/// A full set of scripted collaborators, kept typed so tests can inspect calls
pub struct Scripted {
    pub segmenter: Arc<dyn Segmenter>,
    pub scripter: Arc<ScriptedScripter>,
    pub designer: Arc<ScriptedDesigner>,
    pub producer: Arc<ScriptedProducer>,
    pub validator: Arc<ScriptedValidator>,
}

impl Scripted {
    /// Collaborators that succeed at everything
    pub fn new(scenes_per_chapter: usize) -> Self {
        Self {
            segmenter: Arc::new(ChapterSegmenter::new()),
            scripter: Arc::new(ScriptedScripter::new(scenes_per_chapter)),
            designer: Arc::new(ScriptedDesigner::default()),
            producer: Arc::new(ScriptedProducer::default()),
            validator: Arc::new(ScriptedValidator::default()),
        }
    }

    pub fn with_segmenter(mut self, segmenter: impl Segmenter + 'static) -> Self {
        self.segmenter = Arc::new(segmenter);
        self
    }

    pub fn with_scripter(mut self, scripter: ScriptedScripter) -> Self {
        self.scripter = Arc::new(scripter);
        self
    }

    pub fn with_designer(mut self, designer: ScriptedDesigner) -> Self {
        self.designer = Arc::new(designer);
        self
    }

    pub fn with_producer(mut self, producer: ScriptedProducer) -> Self {
        self.producer = Arc::new(producer);
        self
    }

    pub fn with_validator(mut self, validator: ScriptedValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            segmenter: self.segmenter.clone(),
            scripter: self.scripter.clone(),
            designer: self.designer.clone(),
            producer: self.producer.clone(),
            validator: self.validator.clone(),
        }
    }
}
