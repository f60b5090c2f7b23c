/*!
 * Contracts of the stage collaborators.
 *
 * Each collaborator is a narrow async service: typed input in, typed record
 * out, or a `StageError`. The orchestrator holds them as trait objects so the
 * LLM-backed agents, the media tools and the in-memory test doubles are
 * interchangeable.
 */

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::StageError;
use crate::pipeline::continuity::{ContinuitySummary, ContinuityVerdict};
use crate::pipeline::records::{
    AssetBundle, Chapter, RevisionFeedback, SceneDesign, SceneSpec, ScriptRecord, SourceText,
};

/// Splits the source text into chapters.
#[async_trait]
pub trait Segmenter: Send + Sync + Debug {
    async fn segment(&self, source: &SourceText) -> Result<Vec<Chapter>, StageError>;
}

/// Writes the script of one chapter.
#[async_trait]
pub trait Scripter: Send + Sync + Debug {
    async fn write_script(&self, chapter: &Chapter) -> Result<ScriptRecord, StageError>;
}

/// Designs one scene.
///
/// `feedback` holds only the corrections that target this scene, and is
/// `None` on the first pass.
#[async_trait]
pub trait SceneDesigner: Send + Sync + Debug {
    async fn design(
        &self,
        scene: &SceneSpec,
        chapter_title: &str,
        feedback: Option<&RevisionFeedback>,
    ) -> Result<SceneDesign, StageError>;
}

/// Produces the image, audio and animation of one scene.
#[async_trait]
pub trait AssetProducer: Send + Sync + Debug {
    async fn produce(&self, design: &SceneDesign) -> Result<AssetBundle, StageError>;
}

/// Reviews the whole run for continuity problems.
#[async_trait]
pub trait ContinuityValidator: Send + Sync + Debug {
    async fn review(&self, summary: &ContinuitySummary) -> Result<ContinuityVerdict, StageError>;
}

/// The full set of collaborators a pipeline drives.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub segmenter: Arc<dyn Segmenter>,
    pub scripter: Arc<dyn Scripter>,
    pub designer: Arc<dyn SceneDesigner>,
    pub producer: Arc<dyn AssetProducer>,
    pub validator: Arc<dyn ContinuityValidator>,
}
