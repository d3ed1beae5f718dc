//! File ingestion: extract text, chunk, and bulk-insert into a store.
//!
//! Accepts individual files or directories (walked recursively). PDF files
//! go through `pdf-extract`; everything else is read as UTF-8 text with
//! lossy conversion. Every chunk becomes one [`Document`] carrying
//! `source`, `path`, and `chunk_index` metadata — the fields evaluation
//! later uses to resolve a stable document identifier.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;
use walkdir::WalkDir;

use crate::chunk::split_text;
use crate::config::ChunkingConfig;
use crate::error::{MedragError, Result};
use crate::models::Document;
use crate::store::VectorStore;

/// Summary of one ingestion run.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    /// File names (not full paths) that were ingested.
    pub ingested_files: Vec<String>,
    /// Total chunks inserted across all files.
    pub total_chunks: usize,
}

/// Ingest files into the store.
///
/// Directories are expanded recursively; discovered files are processed in
/// sorted order for deterministic chunk indices. All chunks across all
/// files are inserted with a single bulk `add_documents` call.
///
/// # Arguments
///
/// * `source_name` — overrides the per-file `source` metadata (defaults to
///   the file name).
pub async fn ingest_files(
    store: &mut VectorStore,
    chunking: &ChunkingConfig,
    paths: &[PathBuf],
    source_name: Option<&str>,
) -> Result<IngestReport> {
    let files = discover_files(paths)?;

    let mut all_docs = Vec::new();
    let mut ingested_files = Vec::with_capacity(files.len());

    for path in &files {
        let text = load_text(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let source = source_name.unwrap_or(&file_name);

        let chunks = split_text(&text, chunking.chunk_size, chunking.chunk_overlap);
        for (i, chunk) in chunks.into_iter().enumerate() {
            all_docs.push(Document::new(
                chunk,
                [
                    ("source".to_string(), source.to_string()),
                    ("path".to_string(), path.display().to_string()),
                    ("chunk_index".to_string(), i.to_string()),
                ],
            ));
        }
        ingested_files.push(file_name);
    }

    let total_chunks = all_docs.len();
    if !all_docs.is_empty() {
        store.add_documents(&all_docs).await?;
    }

    info!(
        files = ingested_files.len(),
        chunks = total_chunks,
        "ingestion complete"
    );

    Ok(IngestReport {
        ingested_files,
        total_chunks,
    })
}

/// Expand directories and sort for deterministic processing order.
fn discover_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path) {
                let entry = entry.map_err(|e| MedragError::Extract {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    Ok(files)
}

/// Extract the full text of a file.
fn load_text(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        pdf_extract::extract_text(path).map_err(|e| MedragError::Extract {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    } else {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).to_string())
    }
}
