/*!
 * CSS animation agent.
 */

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::agents::json::extract_css;
use crate::agents::{AgentModel, ask};
use crate::errors::StageError;
use crate::media::AnimationComposer;
use crate::pipeline::fallback::{self, css_ident};
use crate::pipeline::records::SceneDesign;
use crate::providers::Provider;

const SYSTEM_PROMPT: &str = "You are a front-end developer writing CSS animations. \
Answer with CSS only.";

/// Writes CSS animation markup for a scene design.
#[derive(Debug)]
pub struct AnimationAgent {
    provider: Arc<dyn Provider>,
    model: AgentModel,
}

impl AnimationAgent {
    pub fn new(provider: Arc<dyn Provider>, model: AgentModel) -> Self {
        Self { provider, model }
    }

    fn build_prompt(design: &SceneDesign) -> String {
        format!(
            "Write a CSS animation for this scene.\n\n\
             Keyframes name suffix: {ident}\n\
             Effect: {effects}\nMood: {mood}\nColours: {palette}\nDuration: {duration}s\n\n\
             Include an @keyframes block and a .scene-animation class that uses it. \
             Keep it smooth and simple.",
            ident = css_ident(&design.scene_id),
            effects = if design.animation_effects.is_empty() { "gentle fade" } else { design.animation_effects.as_str() },
            mood = design.mood,
            palette = design.color_palette.join(", "),
            duration = design.duration
        )
    }
}

#[async_trait]
impl AnimationComposer for AnimationAgent {
    async fn compose(&self, design: &SceneDesign) -> Result<String, StageError> {
        debug!("Composing animation for {}", design.scene_id);
        let reply = ask(&self.provider, &self.model, SYSTEM_PROMPT, Self::build_prompt(design), false).await?;
        let css = extract_css(&reply);

        if !fallback::is_valid_animation(&css) {
            return Err(StageError::Malformed(format!("animation for {} is not valid CSS", design.scene_id)));
        }
        Ok(css)
    }
}
