/*!
 * Pull structured data out of free-form model replies.
 *
 * Models wrap JSON in prose, markdown fences or reasoning blocks. This module
 * strips those layers and hands back the first parseable JSON value.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::errors::StageError;

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").unwrap());

static CSS_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:css|CSS)?\s*\n?(.*?)```").unwrap());

/// Remove `<think>...</think>` reasoning blocks.
pub fn strip_reasoning(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

/// Candidate JSON snippets, most specific first.
fn candidates(text: &str) -> Vec<String> {
    let cleaned = strip_reasoning(text);
    let mut found = vec![cleaned.clone()];

    found.extend(
        FENCED_BLOCK
            .captures_iter(&cleaned)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string()),
    );

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            found.push(cleaned[start..=end].to_string());
        }
    }
    found
}

/// Deserialize the first JSON object found in `text` into `T`.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T, StageError> {
    if text.trim().is_empty() {
        return Err(StageError::Malformed("empty reply".to_string()));
    }

    let mut last_error = None;
    for candidate in candidates(text) {
        match serde_json::from_str::<T>(&candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    Err(StageError::Malformed(match last_error {
        Some(e) => format!("no usable JSON in reply: {}", e),
        None => "no JSON in reply".to_string(),
    }))
}

/// Extract CSS from a reply, dropping markdown fences and reasoning blocks.
pub fn extract_css(text: &str) -> String {
    let cleaned = strip_reasoning(text);
    match CSS_FENCE.captures(&cleaned).and_then(|c| c.get(1)) {
        Some(block) => block.as_str().trim().to_string(),
        None => cleaned,
    }
}
