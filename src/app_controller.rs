use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::agents::{AgentModel, AnimationAgent, DirectorAgent, EditorAgent, ScriptAgent};
use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::library::{BookEntry, BookStore};
use crate::media::SceneProducer;
use crate::media::image::CommandImageSynthesizer;
use crate::media::speech::CommandSpeechSynthesizer;
use crate::pipeline::{Collaborators, Pipeline, PipelineSettings, ProgressEvent, RunSummary, SourceText};
use crate::providers::Provider;
use crate::providers::ollama::Ollama;
use crate::segmenter::{self, ChapterSegmenter};

// @module: Application controller for novel-to-scene runs

/// Main application controller: builds the pipeline from configuration,
/// drives one run with a progress bar and saves the result as a book.
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Shared LLM provider
    provider: Arc<dyn Provider>,

    pipeline: Pipeline,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let provider = Self::build_provider(&config)?;
        let collaborators = Self::build_collaborators(&config, provider.clone());
        let pipeline = Pipeline::new(collaborators, PipelineSettings::from_config(&config));

        Ok(Self {
            config,
            provider,
            pipeline,
        })
    }

    /// Create a controller around custom collaborators, bypassing the provider wiring
    pub fn with_collaborators(config: Config, provider: Arc<dyn Provider>, collaborators: Collaborators) -> Self {
        let pipeline = Pipeline::new(collaborators, PipelineSettings::from_config(&config));
        Self {
            config,
            provider,
            pipeline,
        }
    }

    fn build_provider(config: &Config) -> Result<Arc<dyn Provider>> {
        let (host, port) = config.provider.host_and_port()?;
        Ok(Arc::new(Ollama::new(
            host,
            port,
            config.provider.timeout_secs,
            config.provider.retry_count,
            config.provider.retry_backoff_ms,
            config.provider.rate_limit,
        )))
    }

    /// Wire the agents and media tools named in the configuration
    pub fn build_collaborators(config: &Config, provider: Arc<dyn Provider>) -> Collaborators {
        let temperature = config.provider.temperature;
        let tool_timeout = Duration::from_secs(config.media.tool_timeout_secs);
        let media = &config.media;

        let animator = Arc::new(AnimationAgent::new(
            provider.clone(),
            AgentModel::new(&config.provider.animator_model, temperature),
        ));
        let image = Arc::new(CommandImageSynthesizer::new(&media.image_command, &media.assets_dir, tool_timeout));
        let speech = Arc::new(CommandSpeechSynthesizer::new(
            &media.speech_command,
            media.ffmpeg_path.clone(),
            media.ffprobe_path.clone(),
            &media.assets_dir,
            tool_timeout,
        ));

        if media.image_command.trim().is_empty() {
            warn!("No image command configured, scenes will use the placeholder image");
        }
        if media.speech_command.trim().is_empty() {
            warn!("No speech command configured, scenes will have no narration audio");
        }

        Collaborators {
            segmenter: Arc::new(ChapterSegmenter::new()),
            scripter: Arc::new(ScriptAgent::new(
                provider.clone(),
                AgentModel::new(&config.provider.script_model, temperature),
            )),
            designer: Arc::new(DirectorAgent::new(
                provider.clone(),
                AgentModel::new(&config.provider.director_model, temperature),
            )),
            producer: Arc::new(SceneProducer::new(image, speech, animator, media.placeholder_image_url.clone())),
            validator: Arc::new(EditorAgent::new(
                provider,
                AgentModel::new(&config.provider.editor_model, temperature),
            )),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn book_store(&self) -> BookStore {
        BookStore::new(&self.config.media.books_dir)
    }

    /// Turn a novel file into a saved book.
    ///
    /// Ctrl-C cancels the run; the partial result is discarded.
    pub async fn run(&self, input_file: &Path) -> Result<BookEntry> {
        if !FileManager::file_exists(input_file) {
            return Err(anyhow!("Input file does not exist: {:?}", input_file));
        }

        let content = FileManager::read_to_string(input_file)?;
        let file_stem = input_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());
        let title = Some(segmenter::extract_book_title(&content))
            .filter(|t| !t.is_empty())
            .unwrap_or(file_stem);
        let author = segmenter::extract_author(&content);

        if let Err(e) = self.provider.test_connection().await {
            warn!("Provider check failed: {}. Continuing; unreachable stages will fail the run.", e);
        }

        info!("Processing '{}'{}", title, if author.is_empty() { String::new() } else { format!(" by {}", author) });

        let mut handle = self.pipeline.submit(SourceText::new(title.clone(), content));
        let mut events = handle.events();
        let progress_bar = Self::progress_bar();

        let render = render_progress(&progress_bar, &mut events);
        tokio::pin!(render);
        tokio::select! {
            _ = &mut render => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling run {}", handle.id());
                handle.cancel();
                (&mut render).await;
            }
        }

        let summary = match handle.wait().await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Run failed: {}", e);
                return Err(e.into());
            }
        };

        Self::log_summary(&summary);
        self.book_store().save(&title, &author, &summary.chapters)
    }

    /// Books saved so far
    pub fn list_books(&self) -> Result<Vec<BookEntry>> {
        self.book_store().list_books()
    }

    fn progress_bar() -> ProgressBar {
        let progress_bar = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}% {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar.enable_steady_tick(Duration::from_millis(120));
        progress_bar
    }

    fn log_summary(summary: &RunSummary) {
        let stats = &summary.stats;
        info!(
            "Run {} finished: {} chapter(s), {} scene(s)",
            summary.run_id,
            summary.chapters.len(),
            summary.scene_count()
        );
        debug!(
            "Fallbacks: {} script, {} design, {} asset; {} repaired bundle(s), {} revision pass(es), {} dropped scene(s)",
            stats.script_fallbacks,
            stats.design_fallbacks,
            stats.asset_fallbacks,
            stats.repaired_bundles,
            stats.revision_passes,
            stats.dropped_scenes
        );
        if stats.accepted_best_effort {
            warn!("Continuity issues remained after the last revision pass");
        }
    }
}

/// Mirror progress events on the bar until the terminal event arrives.
async fn render_progress(progress_bar: &ProgressBar, events: &mut broadcast::Receiver<ProgressEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                progress_bar.set_position(event.percent.round() as u64);
                progress_bar.set_message(format!("{}: {}", event.label(), event.message));

                if event.terminal {
                    if event.is_success() {
                        progress_bar.finish_with_message(event.message);
                    } else {
                        progress_bar.abandon_with_message(event.message);
                    }
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!("Progress display skipped {} event(s)", skipped);
            }
            Err(RecvError::Closed) => {
                progress_bar.finish_and_clear();
                return;
            }
        }
    }
}
