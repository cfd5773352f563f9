//! Snapshot persistence under `.grove/`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assembler::{fill_usage, link_imports};
use crate::capsule::compute_content_hash;
use crate::error::{GroveError, Result};
use crate::graph::Graph;
use crate::model::{DirectoryCapsule, FileCapsule};
use crate::query::{GraphStats, QueryEngine};

/// Cache directory: .grove/
pub const CACHE_DIR: &str = ".grove";

/// Snapshot file inside the cache directory
pub const SNAPSHOT_FILE: &str = "capsules.json";

/// Bumped whenever the capsule layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 2;

/// Serialized graph: stats plus capsules keyed by root-relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub root: PathBuf,
    pub stats: GraphStats,
    pub files: BTreeMap<String, FileCapsule>,
    pub directories: BTreeMap<String, DirectoryCapsule>,
}

impl Snapshot {
    pub fn from_graph(graph: &Graph) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            root: graph.root().to_path_buf(),
            stats: QueryEngine::new(graph).stats(),
            files: graph
                .files()
                .map(|c| (c.relative_path.clone(), c.clone()))
                .collect(),
            directories: graph
                .directories()
                .map(|d| (d.relative_path.clone(), d.clone()))
                .collect(),
        }
    }
}

impl Graph {
    /// Rebuild a graph from a snapshot: edges come from the capsules'
    /// resolved local imports, the symbol index is rebuilt from scratch.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let Snapshot { root, stats, files, directories, .. } = snapshot;
        let mut graph = Graph::new(root);
        for capsule in files.into_values() {
            graph.add_file(capsule);
        }
        for directory in directories.into_values() {
            graph.insert_directory(directory);
        }
        link_imports(&mut graph);
        fill_usage(&mut graph);
        graph.rebuild_symbol_index();
        graph.set_overview(stats.overview);
        graph
    }
}

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Get snapshot file path
pub fn snapshot_path(root: &Path) -> PathBuf {
    cache_dir(root).join(SNAPSHOT_FILE)
}

/// Ensure cache directory exists
pub fn ensure_cache_dir(root: &Path) -> Result<()> {
    std::fs::create_dir_all(cache_dir(root))?;
    Ok(())
}

/// Write the snapshot through a temp file so readers never see a partial write.
pub fn save_snapshot(graph: &Graph, root: &Path) -> Result<PathBuf> {
    ensure_cache_dir(root)?;
    let path = snapshot_path(root);
    let tmp = path.with_extension("json.tmp");

    let json = serde_json::to_string_pretty(&Snapshot::from_graph(graph))?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;

    tracing::debug!("Snapshot saved: {}", path.display());
    Ok(path)
}

/// Load the snapshot if one exists.
pub fn load_snapshot(root: &Path) -> Result<Option<Snapshot>> {
    let path = snapshot_path(root);
    if !path.is_file() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(&path)?;
    let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| GroveError::Snapshot {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    tracing::debug!("Snapshot loaded from {} ({} files)", path.display(), snapshot.files.len());
    Ok(Some(snapshot))
}

/// Files whose on-disk state no longer matches the snapshot. A version
/// mismatch marks every file stale. Files added since the snapshot are not
/// detected here; that needs a fresh scan.
pub fn stale_files(snapshot: &Snapshot) -> Vec<PathBuf> {
    if snapshot.version != SNAPSHOT_VERSION {
        return snapshot.files.values().map(|c| c.path.clone()).collect();
    }

    snapshot
        .files
        .values()
        .filter(|capsule| match std::fs::read_to_string(&capsule.path) {
            Ok(content) => capsule
                .content_hash
                .as_ref()
                .is_some_and(|hash| *hash != compute_content_hash(&content)),
            Err(_) => !capsule.path.is_file(),
        })
        .map(|c| c.path.clone())
        .collect()
}

/// Clear cache directory
pub fn clear_cache(root: &Path) -> Result<()> {
    let cache = cache_dir(root);
    if cache.exists() {
        std::fs::remove_dir_all(&cache)?;
    }
    Ok(())
}
