/*!
 * Typed records carried between pipeline stages.
 *
 * Each stage consumes and produces one of these explicit records. The
 * generative collaborators speak loosely-typed JSON; the agents convert
 * that into these types and reject answers missing required fields.
 */

use serde::{Deserialize, Serialize};

/// The raw text submitted for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceText {
    /// Display name, usually the uploaded file name
    pub name: String,

    /// Full text content
    pub content: String,
}

impl SourceText {
    /// Create a source text handle.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Whether the text holds anything besides whitespace.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// An immutable text segment produced by segmentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    /// 0-based position in the run's chapter sequence
    pub index: usize,

    /// Chapter body
    pub text: String,
}

impl Chapter {
    /// Create a chapter at the given position.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// Script produced from one chapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptRecord {
    /// Index of the chapter this script was written for
    pub chapter_index: usize,

    /// Chapter title
    pub title: String,

    /// Short chapter summary
    pub summary: String,

    /// Planned scenes in narrative order
    pub scenes: Vec<SceneSpec>,
}

/// One planned scene inside a script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneSpec {
    /// Identifier unique across the whole run
    pub id: String,

    /// Scene title
    pub title: String,

    /// What happens in the scene
    pub description: String,

    /// Dialogue or narration text
    pub dialogue: String,

    /// Emotion tag (free-form; see [`Emotion`] for the closed fallback set)
    pub emotion: String,

    /// Setting tag
    pub setting: String,

    /// Target duration in seconds (advisory)
    pub duration: f64,
}

/// Visual and audio design for one scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneDesign {
    /// Scene this design belongs to
    pub scene_id: String,

    /// Visual description of the shot
    pub visual_description: String,

    /// Prompt for the image synthesizer
    pub image_prompt: String,

    /// Narration text to be spoken
    pub narration: String,

    /// Description of the animation effect
    pub animation_effects: String,

    /// CSS animation markup (may be empty; the producer composes one then)
    pub animation_markup: String,

    /// Camera angle tag
    pub camera_angle: String,

    /// Mood tag
    pub mood: String,

    /// Color palette
    pub color_palette: Vec<String>,

    /// Duration in seconds
    pub duration: f64,
}

/// Generated assets for one scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetBundle {
    /// Scene these assets belong to
    pub scene_id: String,

    /// Image reference (URI)
    pub image_url: String,

    /// Audio reference (URI), empty when there is no narration audio
    pub audio_url: String,

    /// Audio duration in seconds
    pub audio_duration: f64,

    /// Narration text echoed for display
    pub narration: String,

    /// CSS animation markup
    pub animation_markup: String,

    /// Scene duration in seconds
    pub duration: f64,

    /// Whether every sub-artifact came from its collaborator
    pub complete: bool,
}

impl AssetBundle {
    /// Duration to present the scene for: the narration length when there is
    /// audio, otherwise the planned duration.
    pub fn display_duration(&self) -> f64 {
        if self.audio_duration > 0.0 {
            self.audio_duration
        } else {
            self.duration
        }
    }
}

/// One correction requested by the continuity gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevisionItem {
    /// Run-wide (flat) index of the scene to revise
    pub scene_index: usize,

    /// Kind of issue
    pub kind: String,

    /// What to change
    pub description: String,
}

/// Correction payload carried from a failed gate back into scene design.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RevisionFeedback {
    /// Requested corrections
    pub items: Vec<RevisionItem>,
}

impl RevisionFeedback {
    /// Create feedback from a list of corrections.
    pub fn new(items: Vec<RevisionItem>) -> Self {
        Self { items }
    }

    /// Whether there is nothing to correct.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Distinct scene indices targeted by this feedback, in ascending order.
    pub fn target_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.items.iter().map(|i| i.scene_index).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Terminal output for one scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalScene {
    pub id: String,
    pub chapter_index: usize,
    pub scene_index: usize,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub audio_url: String,
    pub audio_script: String,
    pub animation_code: String,
    pub duration: f64,
}

/// Terminal output for one chapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalChapter {
    pub id: String,
    pub title: String,
    pub scenes: Vec<FinalScene>,
}

/// Closed set of emotions the fallback designer knows a palette for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Peaceful,
    Mysterious,
    Neutral,
}

impl Emotion {
    /// Map a free-form emotion tag onto the closed set; unknown tags are neutral.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "angry" => Self::Angry,
            "peaceful" => Self::Peaceful,
            "mysterious" => Self::Mysterious,
            _ => Self::Neutral,
        }
    }

    /// Tag name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Peaceful => "peaceful",
            Self::Mysterious => "mysterious",
            Self::Neutral => "neutral",
        }
    }

    /// Fixed color triad for this emotion.
    pub fn palette(&self) -> [&'static str; 3] {
        match self {
            Self::Happy => ["#FFD700", "#FFA500", "#FF6B6B"],
            Self::Sad => ["#4A90E2", "#6C7B7F", "#B0BEC5"],
            Self::Angry => ["#FF4444", "#CC0000", "#8B0000"],
            Self::Peaceful => ["#81C784", "#66BB6A", "#4CAF50"],
            Self::Mysterious => ["#7B68EE", "#6A5ACD", "#483D8B"],
            Self::Neutral => ["#90A4AE", "#78909C", "#607D8B"],
        }
    }
}
