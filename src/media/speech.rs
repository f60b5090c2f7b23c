/*!
 * Narration through an external TTS engine, transcoded with ffmpeg.
 *
 * The TTS command writes a WAV file, ffmpeg turns it into an MP3 with
 * libmp3lame and ffprobe measures the clip. The intermediate WAV is removed.
 */

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use log::{info, warn};

use crate::errors::StageError;
use crate::media::command::{CommandTemplate, run_tool};
use crate::media::{AudioClip, SpeechSynthesizer};
use crate::pipeline::fallback::css_ident;

/// Public URL prefix of generated audio.
pub const AUDIOS_URL_PREFIX: &str = "/assets/audios";

/// Parse ffprobe's duration output, rounded to two decimals.
pub fn parse_duration(stdout: &str) -> Option<f64> {
    let seconds: f64 = stdout.trim().lines().next()?.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some((seconds * 100.0).round() / 100.0)
    } else {
        None
    }
}

/// Speech synthesizer driven by external commands.
#[derive(Debug, Clone)]
pub struct CommandSpeechSynthesizer {
    template: Option<CommandTemplate>,
    ffmpeg: String,
    ffprobe: String,
    audios_dir: PathBuf,
    timeout: Duration,
}

impl CommandSpeechSynthesizer {
    /// `command` is a template with `{text}` and `{output}` placeholders that
    /// writes a WAV file to `{output}`.
    pub fn new(
        command: &str,
        ffmpeg: impl Into<String>,
        ffprobe: impl Into<String>,
        assets_dir: impl AsRef<Path>,
        timeout: Duration,
    ) -> Self {
        Self {
            template: CommandTemplate::parse(command),
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            audios_dir: assets_dir.as_ref().join("audios"),
            timeout,
        }
    }

    async fn transcode(&self, wav: &Path, mp3: &Path) -> Result<(), StageError> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            wav.to_string_lossy().to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            mp3.to_string_lossy().to_string(),
        ];
        run_tool(&self.ffmpeg, &args, self.timeout).await?;
        Ok(())
    }

    async fn probe_duration(&self, mp3: &Path) -> Result<f64, StageError> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            mp3.to_string_lossy().to_string(),
        ];
        let output = run_tool(&self.ffprobe, &args, self.timeout).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_duration(&stdout)
            .ok_or_else(|| StageError::Malformed(format!("unreadable duration '{}'", stdout.trim())))
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSpeechSynthesizer {
    async fn speak(&self, scene_id: &str, text: &str) -> Result<AudioClip, StageError> {
        if text.trim().is_empty() {
            return Ok(AudioClip::empty());
        }

        let template = self
            .template
            .as_ref()
            .ok_or_else(|| StageError::Unavailable("no speech command configured".to_string()))?;

        tokio::fs::create_dir_all(&self.audios_dir).await?;
        let ident = css_ident(scene_id);
        let wav = self.audios_dir.join(format!("audio_{}.wav", ident));
        let file_name = format!("audio_{}_{}.mp3", ident, Local::now().format("%Y%m%d_%H%M%S"));
        let mp3 = self.audios_dir.join(&file_name);

        let wav_arg = wav.to_string_lossy().to_string();
        let args = template.render(&[("text", text), ("output", &wav_arg)]);
        run_tool(template.program(), &args, self.timeout).await?;

        let transcoded = self.transcode(&wav, &mp3).await;
        if let Err(e) = tokio::fs::remove_file(&wav).await {
            warn!("Could not remove {}: {}", wav.display(), e);
        }
        transcoded?;

        let duration = self.probe_duration(&mp3).await?;
        info!("Narration for {} ready ({}s)", scene_id, duration);

        Ok(AudioClip {
            url: format!("{}/{}", AUDIOS_URL_PREFIX, file_name),
            duration,
        })
    }
}
