/*!
 * LLM-backed stage collaborators.
 *
 * - `ScriptAgent`: chapter to script
 * - `DirectorAgent`: scene to visual/audio design
 * - `EditorAgent`: whole-run continuity review
 * - `AnimationAgent`: design to CSS animation
 *
 * All of them talk to a `Provider` and convert its loosely-typed JSON into
 * the pipeline's typed records.
 */

pub mod animator;
pub mod director;
pub mod editor;
pub mod json;
pub mod script;

use std::sync::Arc;

use log::trace;

use crate::errors::StageError;
use crate::providers::{CompletionRequest, Provider};

pub use animator::AnimationAgent;
pub use director::DirectorAgent;
pub use editor::EditorAgent;
pub use script::ScriptAgent;

/// Model selection for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentModel {
    /// Model name as known to the provider
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
}

impl AgentModel {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

/// Send one prompt and return the reply text.
///
/// An empty reply counts as malformed output.
pub(crate) async fn ask(
    provider: &Arc<dyn Provider>,
    model: &AgentModel,
    system: &str,
    prompt: String,
    json: bool,
) -> Result<String, StageError> {
    let mut request = CompletionRequest::new(model.model.clone(), prompt)
        .system(system)
        .temperature(model.temperature);
    if json {
        request = request.json();
    }

    let response = provider.complete(request).await?;
    trace!(
        "{} replied with {} chars (tokens: {:?}/{:?})",
        model.model,
        response.text.len(),
        response.prompt_tokens,
        response.completion_tokens
    );

    if response.text.trim().is_empty() {
        return Err(StageError::Malformed(format!("{} returned an empty reply", model.model)));
    }
    Ok(response.text)
}
