/*!
 * Running external media tools (image generators, TTS engines, ffmpeg).
 */

use std::io::ErrorKind;
use std::process::Output;
use std::time::Duration;

use log::{debug, error};
use tokio::process::Command;

use crate::errors::StageError;

/// A command line template such as `sd-cli --prompt {prompt} --out {output}`.
///
/// The template is split on whitespace once; placeholders are substituted per
/// argument, so values containing spaces stay a single argument.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Parse a template. Returns `None` for a blank template.
    pub fn parse(template: &str) -> Option<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with every `{key}` replaced by its value.
    pub fn render(&self, values: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                values.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                })
            })
            .collect()
    }
}

/// Strip ffmpeg's banner, build configuration and stream metadata from stderr.
pub fn filter_tool_stderr(stderr: &str) -> String {
    let noise_prefixes = [
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Stream #",
        "Output #",
        "Stream mapping:",
        "Press [q]",
        "size=",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !noise_prefixes.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        "unknown error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}

/// Run `program` with `args`, killing it after `timeout`.
///
/// A missing executable means the tool is unavailable; a non-zero exit is an
/// I/O failure carrying the filtered stderr.
pub async fn run_tool(program: &str, args: &[String], timeout: Duration) -> Result<Output, StageError> {
    debug!("Running {} {}", program, args.join(" "));

    let child = Command::new(program).args(args).kill_on_drop(true).output();

    let output = tokio::select! {
        result = child => result.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StageError::Unavailable(format!("{} is not installed", program)),
            _ => StageError::Io(e),
        })?,
        _ = tokio::time::sleep(timeout) => {
            return Err(StageError::Timeout(timeout.as_secs()));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let filtered = filter_tool_stderr(&stderr);
        error!("{} failed: {}", program, filtered);
        return Err(StageError::Io(std::io::Error::other(format!("{} failed: {}", program, filtered))));
    }

    Ok(output)
}
