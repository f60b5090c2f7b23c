/*!
 * Scene design agent.
 */

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::agents::json::extract_json;
use crate::agents::{AgentModel, ask};
use crate::errors::StageError;
use crate::pipeline::records::{Emotion, RevisionFeedback, SceneDesign, SceneSpec};
use crate::pipeline::stages::SceneDesigner;
use crate::providers::Provider;

const SYSTEM_PROMPT: &str = "You are a film director designing the look, sound and motion of a scene. \
Answer with JSON only.";

#[derive(Debug, Deserialize)]
struct RawDesign {
    #[serde(default)]
    visual_description: Option<String>,
    #[serde(default)]
    image_prompt: Option<String>,
    #[serde(default, alias = "dialogue_text")]
    narration: Option<String>,
    #[serde(default)]
    animation_effects: Option<String>,
    #[serde(default, alias = "css_animation")]
    animation_markup: Option<String>,
    #[serde(default)]
    camera_angle: Option<String>,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    color_palette: Option<Value>,
    #[serde(default)]
    duration: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Palettes arrive either as a list or as a comma separated string.
fn palette(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split([',', '，', ';'])
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Convert a raw reply into a design for `scene`. A design without an image
/// prompt is malformed; other missing fields are taken from the scene.
fn into_design(raw: RawDesign, scene: &SceneSpec) -> Result<SceneDesign, StageError> {
    let image_prompt = non_empty(raw.image_prompt)
        .ok_or_else(|| StageError::Malformed(format!("design for {} has no image prompt", scene.id)))?;

    let mut color_palette = palette(raw.color_palette);
    if color_palette.is_empty() {
        color_palette = Emotion::from_tag(&scene.emotion)
            .palette()
            .iter()
            .map(|c| c.to_string())
            .collect();
    }

    Ok(SceneDesign {
        scene_id: scene.id.clone(),
        visual_description: non_empty(raw.visual_description).unwrap_or_else(|| scene.description.clone()),
        image_prompt,
        narration: non_empty(raw.narration).unwrap_or_else(|| scene.dialogue.clone()),
        animation_effects: non_empty(raw.animation_effects).unwrap_or_default(),
        animation_markup: non_empty(raw.animation_markup).unwrap_or_default(),
        camera_angle: non_empty(raw.camera_angle).unwrap_or_else(|| "medium shot".to_string()),
        mood: non_empty(raw.mood).unwrap_or_else(|| scene.emotion.clone()),
        color_palette,
        duration: raw
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(scene.duration),
    })
}

/// Designs the visual and audio presentation of one scene.
#[derive(Debug)]
pub struct DirectorAgent {
    provider: Arc<dyn Provider>,
    model: AgentModel,
}

impl DirectorAgent {
    pub fn new(provider: Arc<dyn Provider>, model: AgentModel) -> Self {
        Self { provider, model }
    }

    fn build_prompt(scene: &SceneSpec, chapter_title: &str, feedback: Option<&RevisionFeedback>) -> String {
        let revision = match feedback {
            Some(feedback) if !feedback.is_empty() => {
                let notes: Vec<String> = feedback
                    .items
                    .iter()
                    .map(|item| format!("- [{}] {}", item.kind, item.description))
                    .collect();
                format!(
                    "\nA previous design of this scene was rejected. Follow these corrections first:\n{}\n",
                    notes.join("\n")
                )
            }
            _ => String::new(),
        };

        format!(
            "Design the visuals, narration and animation for this scene.{revision}\n\
             Chapter: {chapter_title}\n\
             Scene:\n- title: {title}\n- description: {description}\n- dialogue: {dialogue}\n\
             - emotion: {emotion}\n- setting: {setting}\n\n\
             Reply with this JSON structure:\n\
             {{\n  \"scene_id\": \"{id}\",\n  \"visual_description\": \"environment, light, colour, composition\",\n  \
             \"image_prompt\": \"English prompt for an image model\",\n  \
             \"narration\": \"narration text, in the language of the dialogue\",\n  \
             \"animation_effects\": \"description of the motion\",\n  \"css_animation\": \"CSS with @keyframes\",\n  \
             \"camera_angle\": \"camera angle\",\n  \"mood\": \"mood\",\n  \"color_palette\": [\"#RRGGBB\"],\n  \
             \"duration\": {duration}\n}}",
            revision = revision,
            chapter_title = chapter_title,
            title = scene.title,
            description = scene.description,
            dialogue = scene.dialogue,
            emotion = scene.emotion,
            setting = scene.setting,
            id = scene.id,
            duration = scene.duration
        )
    }
}

#[async_trait]
impl SceneDesigner for DirectorAgent {
    async fn design(
        &self,
        scene: &SceneSpec,
        chapter_title: &str,
        feedback: Option<&RevisionFeedback>,
    ) -> Result<SceneDesign, StageError> {
        debug!(
            "Designing scene {}{}",
            scene.id,
            if feedback.is_some() { " with revision feedback" } else { "" }
        );
        let prompt = Self::build_prompt(scene, chapter_title, feedback);
        let reply = ask(&self.provider, &self.model, SYSTEM_PROMPT, prompt, true).await?;
        let raw: RawDesign = extract_json(&reply)?;
        into_design(raw, scene)
    }
}
