//! Gitignore-aware file discovery

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use grove_core::{Language, ScanConfig, SourceFile};
use ignore::WalkBuilder;

/// Outcome of one walk over the workspace.
#[derive(Debug, Default)]
pub struct ScanOutput {
    /// Discovered files, sorted by path.
    pub files: Vec<SourceFile>,
    pub skipped: usize,
    pub errors: usize,
}

pub struct Scanner {
    root: PathBuf,
    config: ScanConfig,
    excludes: GlobSet,
}

impl Scanner {
    pub fn new(root: &Path, config: &ScanConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            let glob = Glob::new(pattern).with_context(|| format!("invalid exclude pattern `{pattern}`"))?;
            builder.add(glob);
        }

        Ok(Self {
            root: root.to_path_buf(),
            config: config.clone(),
            excludes: builder.build().context("failed to compile exclude patterns")?,
        })
    }

    /// Walk the tree. Entries that cannot be read are logged and skipped.
    pub fn scan(&self) -> ScanOutput {
        let root = self.root.clone();
        let excludes = self.excludes.clone();

        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .git_global(false)
            .require_git(false)
            .filter_entry(move |entry| {
                let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                relative.as_os_str().is_empty() || !excludes.is_match(relative)
            })
            .build();

        let mut output = ScanOutput::default();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    output.errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.path();
            let language = Language::from_path(path);
            if language == Language::Other {
                output.skipped += 1;
                continue;
            }

            match entry.metadata() {
                Ok(meta) if meta.len() > self.config.max_file_bytes => {
                    tracing::debug!("Skipping {} ({} bytes)", path.display(), meta.len());
                    output.skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", path.display(), e);
                    output.errors += 1;
                    continue;
                }
            }

            output.files.push(self.source_file(path, language));
        }

        output.files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(
            "Scanned {}: {} files, {} skipped, {} errors",
            self.root.display(),
            output.files.len(),
            output.skipped,
            output.errors
        );
        output
    }

    fn source_file(&self, path: &Path, language: Language) -> SourceFile {
        SourceFile {
            path: path.to_path_buf(),
            relative_path: grove_core::graph::relative_to(&self.root, path),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            language,
            content_hash: None,
            line_count: None,
        }
    }
}
