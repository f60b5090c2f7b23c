/*!
 * Continuity review agent.
 */

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::agents::json::extract_json;
use crate::agents::{AgentModel, ask};
use crate::errors::StageError;
use crate::pipeline::continuity::{ContinuitySummary, ContinuityVerdict};
use crate::pipeline::stages::ContinuityValidator;
use crate::providers::Provider;

const SYSTEM_PROMPT: &str = "You are a film editor checking a storyboard for continuity. \
Answer with JSON only.";

/// Reviews the run summary and proposes point fixes.
#[derive(Debug)]
pub struct EditorAgent {
    provider: Arc<dyn Provider>,
    model: AgentModel,
}

impl EditorAgent {
    pub fn new(provider: Arc<dyn Provider>, model: AgentModel) -> Self {
        Self { provider, model }
    }

    fn build_prompt(summary: &ContinuitySummary) -> Result<String, StageError> {
        let chapters = serde_json::to_string_pretty(&summary.chapters)
            .map_err(|e| StageError::Malformed(e.to_string()))?;
        let assets = serde_json::to_string_pretty(&summary.assets)
            .map_err(|e| StageError::Malformed(e.to_string()))?;

        Ok(format!(
            "Check the continuity and completeness of this storyboard.\n\n\
             Chapters:\n{chapters}\n\nScenes (scene_index is global):\n{assets}\n\n\
             Reply with this JSON structure:\n\
             {{\n  \"issues\": [\"problems found\"],\n  \"suggestions\": [\"improvements\"],\n  \
             \"missing_scenes\": [\"scenes that should exist\"],\n  \
             \"fixes\": [{{\"scene_index\": 0, \"fix_type\": \"add_transition|fix_timing|redesign\", \"description\": \"what to change\"}}]\n}}\n\n\
             Use \"redesign\" only when a scene must be designed again; leave \"fixes\" empty when everything is fine."
        ))
    }
}

#[async_trait]
impl ContinuityValidator for EditorAgent {
    async fn review(&self, summary: &ContinuitySummary) -> Result<ContinuityVerdict, StageError> {
        debug!(
            "Reviewing continuity of {} chapter(s), {} scene(s)",
            summary.chapters.len(),
            summary.assets.len()
        );
        let reply = ask(&self.provider, &self.model, SYSTEM_PROMPT, Self::build_prompt(summary)?, true).await?;
        extract_json(&reply)
    }
}
