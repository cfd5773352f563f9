//! Capsule graph: file nodes, directory groupings, and import edges

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use tokio::sync::RwLock;

use crate::model::*;
use crate::symbols::SymbolIndex;

/// Graph shared between the query surface and the enrichment scheduler.
pub type SharedGraph = Arc<RwLock<Graph>>;

/// Owns the node map, the directory map, and the edge list. Edge topology is
/// mirrored into a petgraph so neighborhood walks don't scan the edge list.
pub struct Graph {
    root: PathBuf,
    files: BTreeMap<PathBuf, FileCapsule>,
    directories: BTreeMap<PathBuf, DirectoryCapsule>,
    edges: Vec<GraphEdge>,
    topology: StableDiGraph<PathBuf, usize>,
    indices: HashMap<PathBuf, NodeIndex>,
    symbols: SymbolIndex,
    overview: Option<String>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("root", &self.root)
            .field("file_count", &self.files.len())
            .field("directory_count", &self.directories.len())
            .field("edge_count", &self.edges.len())
            .finish()
    }
}

impl Graph {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Graph {
            root: root.into(),
            files: BTreeMap::new(),
            directories: BTreeMap::new(),
            edges: Vec::new(),
            topology: StableDiGraph::new(),
            indices: HashMap::new(),
            symbols: SymbolIndex::new(),
            overview: None,
        }
    }

    pub fn into_shared(self) -> SharedGraph {
        Arc::new(RwLock::new(self))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    // ── Files ───────────────────────────────────────────────

    /// Insert or replace a file capsule.
    pub fn add_file(&mut self, capsule: FileCapsule) {
        if !self.indices.contains_key(&capsule.path) {
            let idx = self.topology.add_node(capsule.path.clone());
            self.indices.insert(capsule.path.clone(), idx);
        }
        self.files.insert(capsule.path.clone(), capsule);
    }

    pub fn file(&self, path: &Path) -> Option<&FileCapsule> {
        self.files.get(path)
    }

    pub fn file_mut(&mut self, path: &Path) -> Option<&mut FileCapsule> {
        self.files.get_mut(path)
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Files in path order.
    pub fn files(&self) -> impl Iterator<Item = &FileCapsule> {
        self.files.values()
    }

    pub fn files_mut(&mut self) -> impl Iterator<Item = &mut FileCapsule> {
        self.files.values_mut()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    // ── Directories ─────────────────────────────────────────

    pub fn directory(&self, path: &Path) -> Option<&DirectoryCapsule> {
        self.directories.get(path)
    }

    pub fn directory_mut(&mut self, path: &Path) -> Option<&mut DirectoryCapsule> {
        self.directories.get_mut(path)
    }

    pub fn directories(&self) -> impl Iterator<Item = &DirectoryCapsule> {
        self.directories.values()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    /// Restore a directory capsule as persisted, without re-deriving links.
    pub fn insert_directory(&mut self, directory: DirectoryCapsule) {
        self.directories.insert(directory.path.clone(), directory);
    }

    /// Create `dir` and any missing ancestors up to the root, parent before
    /// child. Existing capsules are left alone, so repeated calls never
    /// duplicate a capsule or its link from the parent.
    pub fn ensure_directory(&mut self, dir: &Path) {
        if self.directories.contains_key(dir) {
            return;
        }

        let chain: Vec<PathBuf> = if dir.starts_with(&self.root) {
            let mut chain: Vec<PathBuf> = dir
                .ancestors()
                .take_while(|a| a.starts_with(&self.root))
                .map(Path::to_path_buf)
                .collect();
            chain.reverse();
            chain
        } else {
            vec![dir.to_path_buf()]
        };

        let mut parent: Option<PathBuf> = None;
        for path in chain {
            if !self.directories.contains_key(&path) {
                let capsule = DirectoryCapsule {
                    relative_path: relative_to(&self.root, &path),
                    name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.to_string_lossy().into_owned()),
                    path: path.clone(),
                    files: Vec::new(),
                    subdirectories: Vec::new(),
                    file_count: 0,
                    subdirectory_count: 0,
                    summary: None,
                };
                self.directories.insert(path.clone(), capsule);

                if let Some(parent_dir) = parent.as_ref().and_then(|p| self.directories.get_mut(p)) {
                    parent_dir.subdirectories.push(path.clone());
                    parent_dir.subdirectory_count += 1;
                }
            }
            parent = Some(path);
        }
    }

    /// Group a file under its directory capsule.
    pub fn link_file(&mut self, file: &Path) {
        let Some(dir) = file.parent() else {
            return;
        };
        self.ensure_directory(dir);
        if let Some(directory) = self.directories.get_mut(dir) {
            if !directory.files.iter().any(|f| f == file) {
                directory.files.push(file.to_path_buf());
                directory.file_count += 1;
            }
        }
    }

    // ── Edges ───────────────────────────────────────────────

    /// Append an edge between two known files. Returns false when either
    /// endpoint is not a node.
    pub fn add_edge(&mut self, edge: GraphEdge) -> bool {
        let (Some(&from), Some(&to)) = (self.indices.get(&edge.from), self.indices.get(&edge.to)) else {
            return false;
        };
        let position = self.edges.len();
        self.topology.add_edge(from, to, position);
        self.edges.push(edge);
        true
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge_between(&self, from: &Path, to: &Path, kind: EdgeKind) -> bool {
        self.edges_from(from).any(|e| e.to == to && e.kind == kind)
    }

    pub fn edges_from(&self, from: &Path) -> impl Iterator<Item = &GraphEdge> {
        self.edges_directed(from, Direction::Outgoing)
    }

    pub fn edges_to(&self, to: &Path) -> impl Iterator<Item = &GraphEdge> {
        self.edges_directed(to, Direction::Incoming)
    }

    fn edges_directed(&self, path: &Path, direction: Direction) -> impl Iterator<Item = &GraphEdge> {
        self.indices
            .get(path)
            .into_iter()
            .flat_map(move |&idx| self.topology.edges_directed(idx, direction))
            .filter_map(|edge_ref| {
                use petgraph::visit::EdgeRef;
                self.edges.get(*edge_ref.weight())
            })
    }

    /// Files `path` imports (`Outgoing`) or files importing `path` (`Incoming`).
    pub fn neighbors(&self, path: &Path, direction: Direction) -> Vec<&Path> {
        use petgraph::visit::EdgeRef;

        let Some(&idx) = self.indices.get(path) else {
            return Vec::new();
        };
        let mut adjacent: Vec<(usize, NodeIndex)> = self
            .topology
            .edges_directed(idx, direction)
            .map(|e| {
                let other = if direction == Direction::Outgoing { e.target() } else { e.source() };
                (*e.weight(), other)
            })
            .collect();
        // Edge-list order, not petgraph's adjacency order.
        adjacent.sort_unstable_by_key(|(position, _)| *position);

        let mut seen = HashSet::new();
        adjacent
            .into_iter()
            .filter(|(_, n)| seen.insert(*n))
            .filter_map(|(_, n)| self.topology.node_weight(n))
            .map(PathBuf::as_path)
            .collect()
    }

    pub fn incoming_count(&self, path: &Path) -> usize {
        self.indices
            .get(path)
            .map_or(0, |&idx| self.topology.edges_directed(idx, Direction::Incoming).count())
    }

    // ── Derived views ───────────────────────────────────────

    pub fn symbols(&self) -> &SymbolIndex {
        &self.symbols
    }

    pub fn rebuild_symbol_index(&mut self) {
        self.symbols = SymbolIndex::build(self.files.values());
    }

    pub fn overview(&self) -> Option<&str> {
        self.overview.as_deref()
    }

    pub fn set_overview(&mut self, overview: Option<String>) {
        self.overview = overview;
    }

    pub fn relative_path(&self, path: &Path) -> String {
        relative_to(&self.root, path)
    }
}

/// Root-relative path with forward slashes; the root itself is `""`.
pub fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
