/*!
 * Image synthesis through an external generator command.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use log::info;

use crate::errors::StageError;
use crate::media::ImageSynthesizer;
use crate::media::command::{CommandTemplate, run_tool};
use crate::pipeline::fallback::css_ident;

/// Public URL prefix of generated images.
pub const IMAGES_URL_PREFIX: &str = "/assets/images";

/// Runs a configured command (`{prompt}` and `{output}` placeholders) that
/// renders a PNG, and serves it from the assets directory.
#[derive(Debug, Clone)]
pub struct CommandImageSynthesizer {
    template: Option<CommandTemplate>,
    images_dir: PathBuf,
    timeout: Duration,
}

impl CommandImageSynthesizer {
    pub fn new(command: &str, assets_dir: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            template: CommandTemplate::parse(command),
            images_dir: assets_dir.as_ref().join("images"),
            timeout,
        }
    }

    /// File name for a scene's image.
    pub fn file_name(scene_id: &str) -> String {
        format!("scene_{}_{}.png", css_ident(scene_id), Local::now().format("%Y%m%d_%H%M%S"))
    }
}

#[async_trait]
impl ImageSynthesizer for CommandImageSynthesizer {
    async fn synthesize(&self, scene_id: &str, prompt: &str) -> Result<String, StageError> {
        let template = self
            .template
            .as_ref()
            .ok_or_else(|| StageError::Unavailable("no image command configured".to_string()))?;

        if prompt.trim().is_empty() {
            return Err(StageError::Malformed(format!("empty image prompt for {}", scene_id)));
        }

        tokio::fs::create_dir_all(&self.images_dir).await?;
        let file_name = Self::file_name(scene_id);
        let output_path = self.images_dir.join(&file_name);
        let output = output_path.to_string_lossy().to_string();

        let args = template.render(&[("prompt", prompt), ("output", &output)]);
        run_tool(template.program(), &args, self.timeout).await?;

        let size = tokio::fs::metadata(&output_path).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(StageError::Malformed(format!("{} produced no image", template.program())));
        }

        info!("Rendered image for {} ({} bytes)", scene_id, size);
        Ok(format!("{}/{}", IMAGES_URL_PREFIX, file_name))
    }
}
