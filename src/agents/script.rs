/*!
 * Chapter scripting agent.
 */

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use crate::agents::json::extract_json;
use crate::agents::{AgentModel, ask};
use crate::errors::StageError;
use crate::pipeline::fallback;
use crate::pipeline::records::{Chapter, SceneSpec, ScriptRecord};
use crate::pipeline::stages::Scripter;
use crate::providers::Provider;

const SYSTEM_PROMPT: &str = "You are a screenwriter adapting novels into short illustrated scenes. \
Answer with JSON only.";

#[derive(Debug, Deserialize)]
struct RawScript {
    #[serde(default, alias = "chapter_title")]
    title: Option<String>,
    #[serde(default, alias = "chapter_summary")]
    summary: Option<String>,
    #[serde(default)]
    scenes: Vec<RawScene>,
}

#[derive(Debug, Deserialize)]
struct RawScene {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dialogue: Option<String>,
    #[serde(default)]
    emotion: Option<String>,
    #[serde(default)]
    setting: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Convert a raw reply into a script. A reply without scenes, or with a
/// scene lacking a description, is malformed.
fn into_record(raw: RawScript, chapter: &Chapter) -> Result<ScriptRecord, StageError> {
    if raw.scenes.is_empty() {
        return Err(StageError::Malformed("script has no scenes".to_string()));
    }

    let scenes = raw
        .scenes
        .into_iter()
        .enumerate()
        .map(|(i, scene)| {
            let description = non_empty(scene.description).ok_or_else(|| {
                StageError::Malformed(format!("scene {} of chapter {} has no description", i, chapter.index))
            })?;
            Ok(SceneSpec {
                id: non_empty(scene.id).unwrap_or_else(|| fallback::scene_id(chapter.index, i)),
                title: non_empty(scene.title).unwrap_or_else(|| format!("Scene {}", i + 1)),
                dialogue: non_empty(scene.dialogue).unwrap_or_default(),
                emotion: non_empty(scene.emotion).unwrap_or_else(|| "neutral".to_string()),
                setting: non_empty(scene.setting).unwrap_or_else(|| "unspecified".to_string()),
                duration: scene
                    .duration
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .unwrap_or(fallback::FALLBACK_SCENE_DURATION),
                description,
            })
        })
        .collect::<Result<Vec<_>, StageError>>()?;

    Ok(ScriptRecord {
        chapter_index: chapter.index,
        title: non_empty(raw.title).unwrap_or_else(|| fallback::chapter_title(chapter)),
        summary: non_empty(raw.summary).unwrap_or_default(),
        scenes,
    })
}

/// Writes a scene-by-scene script for one chapter.
#[derive(Debug)]
pub struct ScriptAgent {
    provider: Arc<dyn Provider>,
    model: AgentModel,
}

impl ScriptAgent {
    pub fn new(provider: Arc<dyn Provider>, model: AgentModel) -> Self {
        Self { provider, model }
    }

    fn build_prompt(chapter: &Chapter) -> String {
        format!(
            "Analyse the following novel chapter and write a script for it.\n\n\
             Chapter {number}:\n{text}\n\n\
             Reply with this JSON structure:\n\
             {{\n  \"chapter_title\": \"chapter title\",\n  \"chapter_summary\": \"short summary\",\n  \
             \"scenes\": [\n    {{\n      \"id\": \"unique scene id\",\n      \"title\": \"scene title\",\n      \
             \"description\": \"what happens, visually\",\n      \"dialogue\": \"key dialogue or narration\",\n      \
             \"emotion\": \"happy|sad|angry|peaceful|mysterious|neutral\",\n      \"setting\": \"where it happens\",\n      \
             \"duration\": 30\n    }}\n  ]\n}}\n\n\
             Rules:\n\
             1. Roughly one scene per 200-300 characters, 3 to 8 scenes per chapter.\n\
             2. Keep dialogue short and in the language of the chapter.\n\
             3. Scene durations between 15 and 60 seconds.\n\
             4. Scenes must follow on from each other.",
            number = chapter.index + 1,
            text = chapter.text
        )
    }
}

#[async_trait]
impl Scripter for ScriptAgent {
    async fn write_script(&self, chapter: &Chapter) -> Result<ScriptRecord, StageError> {
        debug!("Scripting chapter {} ({} chars)", chapter.index, chapter.text.chars().count());
        let reply = ask(&self.provider, &self.model, SYSTEM_PROMPT, Self::build_prompt(chapter), true).await?;
        let raw: RawScript = extract_json(&reply)?;
        into_record(raw, chapter)
    }
}
