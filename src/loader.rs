//! Document loading: extract → chunk → replace in store.
//!
//! Every kind goes through the same pipeline. Reloading a source first
//! deletes all of its chunks, so the store never holds two versions of the
//! same file. Inserts are batched; a failed batch is logged and skipped while
//! the remaining batches still go in, and the report counts only what was
//! actually stored.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use sportello_core::chunk::{chunk_document, filter_min_len, make_chunks};
use sportello_core::models::DocumentKind;
use sportello_core::store::Store;

use crate::config::{ChunkingConfig, Config};
use crate::extract::{self, Extracted};
use crate::sqlite_store::open_store;

/// What a load did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub source_id: String,
    pub kind: DocumentKind,
    /// Chunks produced after filtering.
    pub attempted: usize,
    /// Chunks actually written.
    pub stored: usize,
    pub failed_batches: usize,
    /// Chunks of the previous version removed before inserting.
    pub replaced: u64,
}

/// Load one document's raw bytes under `source_id`.
pub async fn load(
    store: &dyn Store,
    source_id: &str,
    raw_content: &[u8],
    kind: DocumentKind,
    chunking: &ChunkingConfig,
) -> Result<LoadReport> {
    let settings = chunking.for_kind(kind);

    let texts = match extract::extract(kind, raw_content)
        .with_context(|| format!("Failed to extract {}", source_id))?
    {
        Extracted::Text(text) => chunk_document(&text, &settings.params())?,
        Extracted::Rows(rows) => filter_min_len(rows, settings.min_chars),
    };
    let chunks = make_chunks(source_id, kind, texts);

    let replaced = store.delete_source(source_id).await?;

    let mut stored = 0usize;
    let mut failed_batches = 0usize;
    for (batch_no, batch) in chunks.chunks(settings.batch_size.max(1)).enumerate() {
        match store.add(batch).await {
            Ok(()) => stored += batch.len(),
            Err(e) => {
                failed_batches += 1;
                warn!(
                    source_id,
                    batch = batch_no,
                    size = batch.len(),
                    error = %e,
                    "batch insert failed, skipping"
                );
            }
        }
    }

    info!(
        source_id,
        kind = %kind,
        chunks = stored,
        replaced,
        failed_batches,
        "document loaded"
    );

    Ok(LoadReport {
        source_id: source_id.to_string(),
        kind,
        attempted: chunks.len(),
        stored,
        failed_batches,
        replaced,
    })
}

/// Read and load a file. The file name is the source id; the kind comes
/// from `kind` or, when absent, the extension.
pub async fn load_path(
    store: &dyn Store,
    path: &Path,
    kind: Option<DocumentKind>,
    chunking: &ChunkingConfig,
) -> Result<LoadReport> {
    let kind = match kind {
        Some(k) => k,
        None => extract::kind_for_path(path)?,
    };
    let source_id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path.display()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    load(store, &source_id, &bytes, kind, chunking).await
}

/// `sportello load`: load one file into the configured store and print a
/// summary.
pub async fn run_load(config: &Config, path: &Path, kind: Option<DocumentKind>) -> Result<()> {
    let store = open_store(config).await?;
    let report = load_path(&store, path, kind, &config.chunking).await?;

    println!("load {}", report.source_id);
    println!("  kind: {}", report.kind);
    println!("  chunks stored: {}", report.stored);
    println!("  chunks replaced: {}", report.replaced);
    if report.failed_batches > 0 {
        println!(
            "  failed batches: {} ({} chunks skipped)",
            report.failed_batches,
            report.attempted - report.stored
        );
    }
    println!("ok");

    Ok(())
}

/// Load `documents.default_path` when the store holds nothing yet.
///
/// Returns `None` when the store is already populated or the file is
/// missing.
pub async fn autoload_if_empty(store: &dyn Store, config: &Config) -> Result<Option<LoadReport>> {
    let existing = store.count().await?;
    if existing > 0 {
        info!(chunks = existing, "store already populated, skipping autoload");
        return Ok(None);
    }

    let path = &config.documents.default_path;
    if !path.exists() {
        warn!(path = %path.display(), "store is empty and default document not found");
        return Ok(None);
    }

    let report = load_path(store, path, None, &config.chunking).await?;
    Ok(Some(report))
}
