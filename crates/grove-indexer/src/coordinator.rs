//! Scan -> parse -> build -> assemble

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use grove_core::{
    FileCapsule, Graph, GroveConfig, SourceFile, assemble, build_capsule, compute_content_hash, load_snapshot,
    save_snapshot, stale_files,
};
use rayon::prelude::*;
use tree_sitter::Parser;

use crate::languages::parse_source;
use crate::scanner::Scanner;

/// Index a workspace into an assembled graph.
pub fn index_workspace(root: &Path, config: &GroveConfig) -> Result<Graph> {
    let started = Instant::now();
    let root = canonical_root(root)?;

    let scan = Scanner::new(&root, &config.scan)?.scan();
    let file_count = scan.files.len();
    let capsules = build_capsules(scan.files, config.scan.preview_lines);

    let graph = assemble(&root, capsules, &config.resolver);
    tracing::info!(
        "Indexed {} ({} of {} files) in {:.2?}",
        root.display(),
        graph.file_count(),
        file_count,
        started.elapsed()
    );
    Ok(graph)
}

/// Where a graph came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphSource {
    Snapshot,
    Scan,
}

/// Reuse the persisted snapshot when it is still valid, otherwise scan and
/// persist a fresh one.
///
/// With `cache.validate_on_load` off, any readable snapshot is reused as is.
pub fn load_or_index(root: &Path, config: &GroveConfig) -> Result<(Graph, GraphSource)> {
    let root = canonical_root(root)?;
    match load_snapshot(&root) {
        Ok(Some(snapshot)) => {
            let stale = if config.cache.validate_on_load { stale_files(&snapshot) } else { Vec::new() };
            if stale.is_empty() {
                tracing::info!("Loaded snapshot with {} files", snapshot.files.len());
                return Ok((Graph::from_snapshot(snapshot), GraphSource::Snapshot));
            }
            tracing::info!("Snapshot is stale ({} changed files), re-indexing", stale.len());
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Ignoring unreadable snapshot: {}", e),
    }

    let graph = index_workspace(&root, config)?;
    save_snapshot(&graph, &root).context("failed to write snapshot")?;
    Ok((graph, GraphSource::Scan))
}

pub fn canonical_root(root: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(root).with_context(|| format!("cannot open workspace {}", root.display()))
}

/// Read and parse files in parallel, one tree-sitter parser per worker.
pub fn build_capsules(files: Vec<SourceFile>, preview_lines: usize) -> Vec<FileCapsule> {
    files
        .into_par_iter()
        .map_init(Parser::new, |parser, file| build_one(parser, file, preview_lines))
        .flatten()
        .collect()
}

fn build_one(parser: &mut Parser, mut file: SourceFile, preview_lines: usize) -> Option<FileCapsule> {
    let content = match std::fs::read_to_string(&file.path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("Skipping {}: {}", file.path.display(), e);
            return None;
        }
    };
    file.content_hash = Some(compute_content_hash(&content));
    file.line_count = Some(content.lines().count() as u32);

    let parsed = if file.language.is_ecmascript() {
        parse_source(parser, &file.path, &content, preview_lines)
    } else {
        None
    };
    Some(build_capsule(file, parsed))
}
