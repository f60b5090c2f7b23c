use anyhow::{anyhow, Context, Result};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::Path;
use url::Url;

use crate::file_utils::FileManager;
use crate::pipeline::fallback::PLACEHOLDER_IMAGE_URL;

/// Application configuration module
/// This module handles loading, validating and saving the JSON configuration:
/// the model provider, pipeline limits and media tooling.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// LLM provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Orchestration limits
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Asset generation and output locations
    #[serde(default)]
    pub media: MediaConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Ollama provider configuration, with one model per agent
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Service URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    // @field: Model used to write scripts
    #[serde(default = "default_model")]
    pub script_model: String,

    // @field: Model used to design scenes
    #[serde(default = "default_model")]
    pub director_model: String,

    // @field: Model used for the continuity review
    #[serde(default = "default_model")]
    pub editor_model: String,

    // @field: Model used to write CSS animations
    #[serde(default = "default_model")]
    pub animator_model: String,

    /// Temperature parameter for text generation (0.0 to 2.0)
    /// Lower values make output more deterministic, higher values more creative
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Requests per minute; None or 0 disables client-side limiting
    #[serde(default)]
    pub rate_limit: Option<u32>,

    // @field: Timeout seconds per HTTP request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            script_model: default_model(),
            director_model: default_model(),
            editor_model: default_model(),
            animator_model: default_model(),
            temperature: default_temperature(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            rate_limit: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// Split the endpoint into `scheme://host` and port.
    pub fn host_and_port(&self) -> Result<(String, u16)> {
        let url = Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid provider endpoint: {}", self.endpoint))?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("Provider endpoint has no host: {}", self.endpoint))?;
        let port = url.port_or_known_default().unwrap_or(11434);

        Ok((format!("{}://{}", url.scheme(), host), port))
    }
}

/// Pipeline orchestration limits
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Redesign passes allowed after a failed continuity check
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,

    /// Chapters or scenes processed at once within a stage
    #[serde(default = "default_max_concurrent_items")]
    pub max_concurrent_items: usize,

    /// Seconds a single collaborator call may take
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,

    /// Progress events buffered per subscriber
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
            max_concurrent_items: default_max_concurrent_items(),
            item_timeout_secs: default_item_timeout_secs(),
            progress_buffer: default_progress_buffer(),
        }
    }
}

/// Media tooling and output directories
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MediaConfig {
    /// Directory generated images and audio are written to
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// Directory finished books are saved to
    #[serde(default = "default_books_dir")]
    pub books_dir: String,

    /// Image generator command with `{prompt}` and `{output}` placeholders; empty disables images
    #[serde(default)]
    pub image_command: String,

    /// TTS command with `{text}` and `{output}` placeholders writing a WAV; empty disables narration
    #[serde(default)]
    pub speech_command: String,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// Image used when a scene has none
    #[serde(default = "default_placeholder_image_url")]
    pub placeholder_image_url: String,

    /// Seconds an external media tool may run
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            books_dir: default_books_dir(),
            image_command: String::new(),
            speech_command: String::new(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            placeholder_image_url: default_placeholder_image_url(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // doubled on each retry
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_revisions() -> u32 {
    2
}

fn default_max_concurrent_items() -> usize {
    4
}

fn default_item_timeout_secs() -> u64 {
    300
}

fn default_progress_buffer() -> usize {
    256
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

fn default_books_dir() -> String {
    "books".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_placeholder_image_url() -> String {
    PLACEHOLDER_IMAGE_URL.to_string()
}

fn default_tool_timeout_secs() -> u64 {
    300
}

impl Config {
    /// Load the configuration at `path`, writing a default one first if the file is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if FileManager::file_exists(path) {
            let content = FileManager::read_to_string(path)?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path));
        }

        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        FileManager::write_to_file(path, &json)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        self.provider.host_and_port()?;

        let models = [
            ("script_model", &self.provider.script_model),
            ("director_model", &self.provider.director_model),
            ("editor_model", &self.provider.editor_model),
            ("animator_model", &self.provider.animator_model),
        ];
        if let Some((name, _)) = models.iter().find(|(_, model)| model.trim().is_empty()) {
            return Err(anyhow!("provider.{} must not be empty", name));
        }

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(anyhow!("provider.temperature must be between 0.0 and 2.0, got {}", self.provider.temperature));
        }
        if self.provider.timeout_secs == 0 {
            return Err(anyhow!("provider.timeout_secs must be greater than 0"));
        }
        if self.pipeline.max_concurrent_items == 0 {
            return Err(anyhow!("pipeline.max_concurrent_items must be greater than 0"));
        }
        if self.pipeline.item_timeout_secs == 0 {
            return Err(anyhow!("pipeline.item_timeout_secs must be greater than 0"));
        }
        if self.pipeline.progress_buffer == 0 {
            return Err(anyhow!("pipeline.progress_buffer must be greater than 0"));
        }
        if self.media.assets_dir.trim().is_empty() || self.media.books_dir.trim().is_empty() {
            return Err(anyhow!("media.assets_dir and media.books_dir must not be empty"));
        }

        Ok(())
    }
}
