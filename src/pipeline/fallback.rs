/*!
 * Deterministic fallbacks for every generative stage.
 *
 * These producers never call a collaborator and never fail. Given the same
 * input they always return the same output, so a degraded run is
 * reproducible.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::pipeline::records::{
    AssetBundle, Chapter, Emotion, SceneDesign, SceneSpec, ScriptRecord,
};

/// Lines shorter than this many characters may serve as a chapter title.
pub const TITLE_MAX_CHARS: usize = 50;

/// Number of placeholder scenes a fallback script splits a chapter into.
pub const FALLBACK_SCENE_COUNT: usize = 3;

/// Planned duration of a fallback scene, in seconds.
pub const FALLBACK_SCENE_DURATION: f64 = 30.0;

/// Default placeholder image reference.
pub const PLACEHOLDER_IMAGE_URL: &str =
    "https://via.placeholder.com/800x600/4A90E2/FFFFFF?text=Scene+Image";

const DESCRIPTION_MAX_CHARS: usize = 200;
const DIALOGUE_MAX_CHARS: usize = 100;

static NON_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// Deterministic scene id for scene `scene` of chapter `chapter`.
pub fn scene_id(chapter: usize, scene: usize) -> String {
    format!("scene_{:03}_{:02}", chapter, scene)
}

/// Make a scene id usable as a CSS identifier.
pub fn css_ident(scene_id: &str) -> String {
    let ident = NON_IDENT.replace_all(scene_id, "_").to_string();
    if ident.is_empty() {
        "scene".to_string()
    } else {
        ident
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Title for a chapter: the first short non-empty line, or a positional default.
pub fn chapter_title(chapter: &Chapter) -> String {
    chapter
        .text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|line| line.chars().count() < TITLE_MAX_CHARS)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Chapter {}", chapter.index + 1))
}

/// Split `text` into at most `parts` roughly equal chunks of whitespace-separated words.
fn split_words(text: &str, parts: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || parts == 0 {
        return Vec::new();
    }
    let chunk = words.len().div_ceil(parts);
    words.chunks(chunk).map(|c| c.join(" ")).collect()
}

fn placeholder_scene(chapter_index: usize, scene_index: usize, text: &str) -> SceneSpec {
    SceneSpec {
        id: scene_id(chapter_index, scene_index),
        title: format!("Scene {}", scene_index + 1),
        description: truncate_chars(text, DESCRIPTION_MAX_CHARS),
        dialogue: truncate_chars(text, DIALOGUE_MAX_CHARS),
        emotion: Emotion::Neutral.as_str().to_string(),
        setting: "unspecified".to_string(),
        duration: FALLBACK_SCENE_DURATION,
    }
}

/// Minimal script for a chapter whose scripting failed.
pub fn script(chapter: &Chapter) -> ScriptRecord {
    let title = chapter_title(chapter);
    let chunks = split_words(&chapter.text, FALLBACK_SCENE_COUNT);

    let scenes = if chunks.is_empty() {
        vec![placeholder_scene(chapter.index, 0, &title)]
    } else {
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| placeholder_scene(chapter.index, i, chunk))
            .collect()
    };

    ScriptRecord {
        chapter_index: chapter.index,
        summary: truncate_chars(chapter.text.trim(), DESCRIPTION_MAX_CHARS),
        title,
        scenes,
    }
}

/// Looping fade-in keyed by the scene id.
pub fn looping_fade(scene_id: &str) -> String {
    let ident = css_ident(scene_id);
    format!(
        "@keyframes fade_{ident} {{ 0% {{ opacity: 0; }} 50% {{ opacity: 1; }} 100% {{ opacity: 0.85; }} }}\n\
         .scene-animation {{ animation: fade_{ident} 4s ease-in-out infinite alternate; }}"
    )
}

/// One-shot fade used when an asset bundle has no usable markup.
pub fn minimal_fade(scene_id: &str) -> String {
    let ident = css_ident(scene_id);
    format!(
        "@keyframes fallback_{ident} {{ 0% {{ opacity: 0; }} 100% {{ opacity: 1; }} }}\n\
         .scene-animation {{ animation: fallback_{ident} 2s ease-in-out; }}"
    )
}

/// Default design for a scene whose design failed.
pub fn design(scene: &SceneSpec) -> SceneDesign {
    let emotion = Emotion::from_tag(&scene.emotion);
    let setting = if scene.setting.trim().is_empty() {
        "unspecified"
    } else {
        scene.setting.trim()
    };

    SceneDesign {
        scene_id: scene.id.clone(),
        visual_description: scene.description.clone(),
        image_prompt: format!(
            "A cinematic scene in {}, {} atmosphere, beautiful lighting, high quality",
            setting,
            emotion.as_str()
        ),
        narration: scene.dialogue.clone(),
        animation_effects: "fade in".to_string(),
        animation_markup: looping_fade(&scene.id),
        camera_angle: "medium shot".to_string(),
        mood: emotion.as_str().to_string(),
        color_palette: emotion.palette().iter().map(|c| c.to_string()).collect(),
        duration: scene.duration,
    }
}

/// Placeholder assets for a scene whose production failed outright.
pub fn assets(design: &SceneDesign, placeholder_image: &str) -> AssetBundle {
    AssetBundle {
        scene_id: design.scene_id.clone(),
        image_url: placeholder_image.to_string(),
        audio_url: String::new(),
        audio_duration: 0.0,
        narration: design.narration.clone(),
        animation_markup: minimal_fade(&design.scene_id),
        duration: design.duration,
        complete: false,
    }
}

/// Structural check on animation markup: non-empty, carries an animation
/// block marker, and has balanced braces.
pub fn is_valid_animation(markup: &str) -> bool {
    if markup.trim().is_empty() || !markup.contains("@keyframes") {
        return false;
    }

    let mut depth: i64 = 0;
    for c in markup.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
