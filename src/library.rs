/*!
 * Persisting finished runs as books.
 *
 * Each book is one pretty-printed JSON file holding its chapters. The
 * directory also keeps an `all.json` index that lists every saved book with
 * its author, chapter count and cover image.
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::file_utils::FileManager;
use crate::pipeline::records::FinalChapter;

/// Name of the index file inside the books directory.
pub const INDEX_FILE: &str = "all.json";

/// URL prefix under which book files are served.
pub const BOOKS_URL_PREFIX: &str = "/books";

/// One entry of the books index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookEntry {
    /// Public path of the book file, e.g. `/books/name.json`
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub author: String,
    /// Number of chapters
    #[serde(default)]
    pub chapters: usize,
    /// Image of the first scene, or empty
    #[serde(default)]
    pub cover: String,
}

impl BookEntry {
    fn describe(name: &str, author: &str, chapters: &[FinalChapter]) -> Self {
        let cover = chapters
            .iter()
            .flat_map(|c| c.scenes.iter())
            .next()
            .map(|s| s.image_url.clone())
            .unwrap_or_default();

        Self {
            path: format!("{}/{}.json", BOOKS_URL_PREFIX, FileManager::safe_file_stem(name)),
            name: name.to_string(),
            author: author.to_string(),
            chapters: chapters.len(),
            cover,
        }
    }
}

/// Directory of saved books.
#[derive(Debug, Clone)]
pub struct BookStore {
    dir: PathBuf,
}

impl BookStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the JSON file a book called `name` is saved to.
    pub fn book_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", FileManager::safe_file_stem(name)))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Save `chapters` as book `name` and record it in the index.
    ///
    /// Saving a name twice overwrites the book file and appends a second
    /// index entry.
    pub fn save(&self, name: &str, author: &str, chapters: &[FinalChapter]) -> Result<BookEntry> {
        FileManager::ensure_dir(&self.dir)?;

        let path = self.book_path(name);
        let json = serde_json::to_string_pretty(chapters).context("Failed to serialize chapters")?;
        FileManager::write_to_file(&path, &json)?;

        let entry = BookEntry::describe(name, author, chapters);
        let mut index = self.load_index()?;
        index.push(entry.clone());
        let json = serde_json::to_string_pretty(&index).context("Failed to serialize book index")?;
        FileManager::write_to_file(self.index_path(), &json)?;

        info!("Saved '{}' ({} chapters) to {}", name, chapters.len(), path.display());
        Ok(entry)
    }

    /// Entries of the books index; empty if nothing has been saved yet.
    pub fn load_index(&self) -> Result<Vec<BookEntry>> {
        let path = self.index_path();
        if !FileManager::file_exists(&path) {
            return Ok(Vec::new());
        }

        let content = FileManager::read_to_string(&path)?;
        serde_json::from_str(&content).with_context(|| format!("Invalid book index: {:?}", path))
    }

    /// Load the chapters of a saved book.
    pub fn load(&self, name: &str) -> Result<Vec<FinalChapter>> {
        let path = self.book_path(name);
        let content = FileManager::read_to_string(&path)?;
        serde_json::from_str(&content).with_context(|| format!("Invalid book file: {:?}", path))
    }

    /// Every book file in the directory.
    ///
    /// Files recorded in the index use the indexed metadata; files that are
    /// missing from it (copied in by hand) are described from their content.
    pub fn list_books(&self) -> Result<Vec<BookEntry>> {
        if !FileManager::dir_exists(&self.dir) {
            return Ok(Vec::new());
        }

        let index = self.load_index()?;
        let mut books = Vec::new();

        for file in FileManager::find_files(&self.dir, "json")? {
            let Some(stem) = file.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            if file.file_name().is_some_and(|n| n == INDEX_FILE) {
                continue;
            }

            let public_path = format!("{}/{}.json", BOOKS_URL_PREFIX, stem);
            if let Some(entry) = index.iter().rev().find(|e| e.path == public_path) {
                books.push(entry.clone());
                continue;
            }

            match FileManager::read_to_string(&file)
                .and_then(|c| serde_json::from_str::<Vec<FinalChapter>>(&c).map_err(Into::into))
            {
                Ok(chapters) => books.push(BookEntry::describe(&stem, "", &chapters)),
                Err(e) => warn!("Skipping {}: {}", file.display(), e),
            }
        }

        debug!("Found {} book(s) in {}", books.len(), self.dir.display());
        Ok(books)
    }
}
