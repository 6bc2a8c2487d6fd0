//! Corpus files and text chunking.
//!
//! A corpus is a set of short snippets, usually community posts for one
//! stance. Supported inputs:
//! - `.txt`: one snippet per non-empty line
//! - `.json`: an array of strings, or an array of objects with a `text` field
//! - a directory: every `.txt` and `.json` file below it, in path order

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Errors that can occur while reading a corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid corpus file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported corpus file: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, CorpusError>;

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Entry {
    Text(String),
    Record { text: String },
}

/// Reads snippets from a file or directory.
pub fn load_snippets(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    if !path.is_dir() {
        return load_file(path);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && is_corpus_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    let mut snippets = Vec::new();
    for file in files {
        snippets.extend(load_file(&file)?);
    }
    debug!(path = %path.display(), snippets = snippets.len(), "Loaded corpus directory");
    Ok(snippets)
}

fn is_corpus_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("txt") | Some("json")
    )
}

fn load_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("txt") => Ok(parse_lines(&content)),
        Some("json") => parse_json(&content).map_err(|source| CorpusError::Json {
            path: path.to_path_buf(),
            source,
        }),
        _ => Err(CorpusError::Unsupported(path.to_path_buf())),
    }
}

fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_json(content: &str) -> std::result::Result<Vec<String>, serde_json::Error> {
    let entries: Vec<Entry> = serde_json::from_str(content)?;
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            Entry::Text(text) | Entry::Record { text } => text,
        })
        .filter(|text| !text.trim().is_empty())
        .collect())
}

/// Splits text into overlapping chunks of at most `chunk_size` bytes.
///
/// Chunk boundaries are moved to the nearest UTF-8 character boundary, so
/// Hangul and other multi-byte text is never split mid-character.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    if chunk_size == 0 || text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + chunk_size).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        // chunk_size smaller than one character
        if end == start {
            end = start + 1;
            while end < text.len() && !text.is_char_boundary(end) {
                end += 1;
            }
        }

        chunks.push(text[start..end].to_string());
        if end == text.len() {
            break;
        }

        let step = chunk_size.saturating_sub(overlap).max(1);
        let next = (start + step).min(end);
        start = if next > start { next } else { end };
        while start < text.len() && !text.is_char_boundary(start) {
            start += 1;
        }
    }

    chunks
}

/// Chunks every snippet longer than `chunk_size`; short snippets pass through.
pub fn chunk_snippets(snippets: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    if overlap >= chunk_size && chunk_size > 0 {
        warn!(chunk_size, overlap, "Chunk overlap is not smaller than chunk size");
    }
    snippets
        .into_iter()
        .flat_map(|snippet| {
            if snippet.len() <= chunk_size {
                vec![snippet]
            } else {
                chunk_text(&snippet, chunk_size, overlap)
            }
        })
        .collect()
}
