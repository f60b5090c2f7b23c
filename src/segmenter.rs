/*!
 * Splitting a novel into chapters, plus book metadata extraction.
 *
 * Headings such as `第十二章`, `第3回` or `Chapter 7` at the start of a line
 * delimit chapters. Text without headings is grouped by paragraphs instead.
 */

use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::StageError;
use crate::pipeline::records::{Chapter, SourceText};
use crate::pipeline::stages::Segmenter;

/// Paragraphs merged into one chapter when the text has no headings.
pub const PARAGRAPHS_PER_CHAPTER: usize = 4;

/// Below this many blank-line separated paragraphs, single lines count as paragraphs.
const MIN_PARAGRAPHS: usize = 3;

static CHAPTER_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t\u{3000}]*(?:第[零一二三四五六七八九十百千万两〇\d]+[章回]|(?i:chapter)\s+\d+)").unwrap()
});

static AUTHOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:作者|author)\s*[:：]\s*([^\n]+)").unwrap());

static TITLE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"书名\s*[:：]\s*([^\n]+)").unwrap());

static TITLE_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"《([^》]+)》").unwrap());

static TITLE_ENGLISH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^\s*title\s*:\s*([^\n]+)").unwrap());

/// Split on chapter headings. Text before the first heading (title page,
/// author line) is not part of any chapter.
fn split_by_headings(content: &str) -> Vec<String> {
    let starts: Vec<usize> = CHAPTER_HEADING.find_iter(content).map(|m| m.start()).collect();
    if starts.is_empty() {
        return Vec::new();
    }

    if starts[0] > 0 {
        debug!("Skipping {} bytes before the first chapter heading", starts[0]);
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(content.len());
            content[start..end].trim().to_string()
        })
        .filter(|chapter| !chapter.is_empty())
        .collect()
}

/// Group paragraphs into chapters of `PARAGRAPHS_PER_CHAPTER`.
fn split_by_paragraphs(content: &str) -> Vec<String> {
    let mut paragraphs: Vec<&str> = content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.len() < MIN_PARAGRAPHS {
        paragraphs = content.lines().map(str::trim).filter(|p| !p.is_empty()).collect();
    }

    paragraphs
        .chunks(PARAGRAPHS_PER_CHAPTER)
        .map(|group| group.join("\n\n"))
        .collect()
}

/// Split `content` into chapter texts. Never empty for non-blank input.
pub fn split_chapters(content: &str) -> Vec<String> {
    let content = content.replace("\r\n", "\n");
    let chapters = split_by_headings(&content);
    if !chapters.is_empty() {
        return chapters;
    }

    let chapters = split_by_paragraphs(&content);
    if chapters.is_empty() && !content.trim().is_empty() {
        return vec![content.trim().to_string()];
    }
    chapters
}

/// Author named on an `作者：` / `Author:` line, or empty.
pub fn extract_author(content: &str) -> String {
    AUTHOR
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Book title from a `书名：` line, a `《...》` mention or a `Title:` line, or empty.
pub fn extract_book_title(content: &str) -> String {
    [&*TITLE_LABEL, &*TITLE_BRACKETS, &*TITLE_ENGLISH]
        .iter()
        .find_map(|re| re.captures(content).and_then(|c| c.get(1)))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Heading/paragraph based segmenter.
#[derive(Debug, Default, Clone)]
pub struct ChapterSegmenter;

impl ChapterSegmenter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Segmenter for ChapterSegmenter {
    async fn segment(&self, source: &SourceText) -> Result<Vec<Chapter>, StageError> {
        if source.is_blank() {
            return Err(StageError::Malformed(format!("'{}' is empty", source.name)));
        }

        let chapters: Vec<Chapter> = split_chapters(&source.content)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chapter::new(index, text))
            .collect();

        debug!("Split '{}' into {} chapter(s)", source.name, chapters.len());
        Ok(chapters)
    }
}
