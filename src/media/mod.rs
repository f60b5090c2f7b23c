/*!
 * Asset production for designed scenes.
 *
 * `SceneProducer` fans each scene design out to three independent
 * sub-collaborators (image, speech, animation), awaits all of them together
 * and degrades each sub-artifact on its own when its collaborator fails.
 */

pub mod command;
pub mod image;
pub mod speech;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::errors::StageError;
use crate::pipeline::fallback;
use crate::pipeline::records::{AssetBundle, SceneDesign};
use crate::pipeline::stages::AssetProducer;

pub use image::CommandImageSynthesizer;
pub use speech::CommandSpeechSynthesizer;

/// A synthesized narration clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    /// Reference to the audio file, empty when there is no audio
    pub url: String,
    /// Length in seconds
    pub duration: f64,
}

impl AudioClip {
    /// The clip used when there is nothing to say.
    pub fn empty() -> Self {
        Self {
            url: String::new(),
            duration: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
    }
}

/// Renders a still image for a scene and returns its reference.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync + Debug {
    async fn synthesize(&self, scene_id: &str, prompt: &str) -> Result<String, StageError>;
}

/// Speaks narration text and returns the resulting clip.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + Debug {
    async fn speak(&self, scene_id: &str, text: &str) -> Result<AudioClip, StageError>;
}

/// Writes CSS animation markup for a scene design.
#[async_trait]
pub trait AnimationComposer: Send + Sync + Debug {
    async fn compose(&self, design: &SceneDesign) -> Result<String, StageError>;
}

/// Produces the asset bundle of one scene.
#[derive(Debug, Clone)]
pub struct SceneProducer {
    image: Arc<dyn ImageSynthesizer>,
    speech: Arc<dyn SpeechSynthesizer>,
    animator: Arc<dyn AnimationComposer>,
    placeholder_image_url: String,
}

impl SceneProducer {
    pub fn new(
        image: Arc<dyn ImageSynthesizer>,
        speech: Arc<dyn SpeechSynthesizer>,
        animator: Arc<dyn AnimationComposer>,
        placeholder_image_url: impl Into<String>,
    ) -> Self {
        Self {
            image,
            speech,
            animator,
            placeholder_image_url: placeholder_image_url.into(),
        }
    }

    /// Text to narrate: the design's narration, or its visual description.
    fn narration_of(design: &SceneDesign) -> String {
        if design.narration.trim().is_empty() {
            design.visual_description.trim().to_string()
        } else {
            design.narration.trim().to_string()
        }
    }

    async fn animation(&self, design: &SceneDesign) -> Result<String, StageError> {
        if fallback::is_valid_animation(&design.animation_markup) {
            return Ok(design.animation_markup.clone());
        }
        let markup = self.animator.compose(design).await?;
        if fallback::is_valid_animation(&markup) {
            Ok(markup)
        } else {
            Err(StageError::Malformed("composed animation failed the structural check".to_string()))
        }
    }

    async fn audio(&self, design: &SceneDesign, narration: &str) -> Result<AudioClip, StageError> {
        if narration.is_empty() {
            return Ok(AudioClip::empty());
        }
        self.speech.speak(&design.scene_id, narration).await
    }
}

#[async_trait]
impl AssetProducer for SceneProducer {
    /// Fails only when all three sub-artifacts failed; otherwise every failed
    /// part is replaced by its fallback and the bundle is marked incomplete.
    async fn produce(&self, design: &SceneDesign) -> Result<AssetBundle, StageError> {
        let narration = Self::narration_of(design);

        let (image, audio, animation) = tokio::join!(
            self.image.synthesize(&design.scene_id, &design.image_prompt),
            self.audio(design, &narration),
            self.animation(design),
        );

        if let (Err(audio_err), Err(animation_err)) = (&audio, &animation) {
            debug!(
                "Audio and animation of {} failed ({}; {})",
                design.scene_id, audio_err, animation_err
            );
            if let Err(e) = image {
                return Err(e);
            }
        }

        let complete = image.is_ok() && audio.is_ok() && animation.is_ok();

        let image_url = image.unwrap_or_else(|e| {
            warn!("Image for {} failed: {}. Using placeholder", design.scene_id, e);
            self.placeholder_image_url.clone()
        });
        let audio = audio.unwrap_or_else(|e| {
            warn!("Narration for {} failed: {}. Continuing without audio", design.scene_id, e);
            AudioClip::empty()
        });
        let animation_markup = animation.unwrap_or_else(|e| {
            warn!("Animation for {} failed: {}. Using fallback fade", design.scene_id, e);
            fallback::minimal_fade(&design.scene_id)
        });

        Ok(AssetBundle {
            scene_id: design.scene_id.clone(),
            image_url,
            audio_url: audio.url,
            audio_duration: audio.duration,
            narration,
            animation_markup,
            duration: design.duration,
            complete,
        })
    }
}
