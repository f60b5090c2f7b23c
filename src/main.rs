// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info};
use std::io::Write;
use std::path::PathBuf;

use scenecraft::app_config::{self, Config};
use scenecraft::app_controller::Controller;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// Options shared by every command that reads the configuration
#[derive(Args, Debug)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Directory books are saved to (overrides media.books_dir)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Turn a novel into an illustrated, narrated scene book
    Run {
        /// Novel text file
        #[arg(value_name = "NOVEL")]
        input_file: PathBuf,

        /// Redesign passes allowed after a failed continuity check
        #[arg(long)]
        max_revisions: Option<u32>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// List saved books
    Books {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate shell completions for scenecraft
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// scenecraft - turn novels into animated scene books
#[derive(Parser, Debug)]
#[command(name = "scenecraft")]
#[command(version)]
#[command(about = "Turn a novel into illustrated, narrated scenes with local LLMs")]
#[command(long_about = "scenecraft splits a novel into chapters, scripts each chapter into scenes,
designs every scene, generates its image, narration and animation, checks
continuity across the book and saves the result as JSON.

EXAMPLES:
    scenecraft run novel.txt                       # Use conf.json in the current directory
    scenecraft run novel.txt -o public/books       # Save the book somewhere else
    scenecraft run novel.txt --max-revisions 0     # Accept the first continuity verdict
    scenecraft run -l debug novel.txt              # Verbose logging
    scenecraft books                               # List saved books
    scenecraft completions bash > scenecraft.bash  # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {:<5} {}\x1B[0m", color, now, record.level(), record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Load the config and apply the command line overrides
fn load_config(common: &CommonArgs) -> Result<Config> {
    let mut config = Config::load_or_create(&common.config_path)?;

    if let Some(log_level) = &common.log_level {
        config.log_level = log_level.clone().into();
    }
    if let Some(output_dir) = &common.output_dir {
        config.media.books_dir = output_dir.to_string_lossy().to_string();
    }

    log::set_max_level(config.log_level.to_level_filter());
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // The level is updated after loading the config
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "scenecraft", &mut std::io::stdout());
        }
        Commands::Run {
            input_file,
            max_revisions,
            common,
        } => {
            let mut config = load_config(&common)?;
            if let Some(max_revisions) = max_revisions {
                config.pipeline.max_revisions = max_revisions;
            }
            config.validate().context("Configuration validation failed")?;

            let controller = Controller::with_config(config)?;
            let book = controller.run(&input_file).await?;
            info!("Saved {} ({} chapters)", book.path, book.chapters);
        }
        Commands::Books { common } => {
            let config = load_config(&common)?;
            let controller = Controller::with_config(config)?;
            let books = controller.list_books()?;

            if books.is_empty() {
                info!("No books saved yet");
            }
            for book in books {
                let author = if book.author.is_empty() { "unknown author" } else { book.author.as_str() };
                println!("{}\t{}\t{} chapter(s)\t{}", book.name, author, book.chapters, book.path);
            }
        }
    }

    Ok(())
}
