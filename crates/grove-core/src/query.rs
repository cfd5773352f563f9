//! Read-side queries over an assembled graph

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::model::{FileCapsule, ImportKind};
use crate::resolver::package_name;
use crate::symbols::SymbolHit;

/// Entry points reported by `stats()`.
pub const ENTRY_POINT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodQuery {
    pub path: String,
    pub radius: usize,
    pub cap: usize,
    pub include_dependents: bool,
    pub include_dependencies: bool,
}

impl NeighborhoodQuery {
    pub fn new(path: impl Into<String>, radius: usize, cap: usize) -> Self {
        Self {
            path: path.into(),
            radius,
            cap,
            include_dependents: true,
            include_dependencies: true,
        }
    }
}

/// How a neighbor was first reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    /// Reached by following imports outward.
    Dependency,
    /// Reached by following importers inward.
    Dependent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    pub path: PathBuf,
    pub relative_path: String,
    pub distance: usize,
    pub relation: Relation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub file_count: usize,
    pub directory_count: usize,
    pub edge_count: usize,
    pub external_dependencies: Vec<String>,
    pub entry_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
}

pub struct QueryEngine<'g> {
    graph: &'g Graph,
}

impl<'g> QueryEngine<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Exact identity, then exact relative path, then a path-suffix match.
    pub fn get_capsule(&self, query: &str) -> Option<&'g FileCapsule> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        self.resolve(query).and_then(|path| self.graph.file(&path))
    }

    fn resolve(&self, query: &str) -> Option<PathBuf> {
        let as_path = Path::new(query);
        if self.graph.contains_file(as_path) {
            return Some(as_path.to_path_buf());
        }

        let trimmed = query.trim_start_matches("./").trim_end_matches('/');
        if let Some(capsule) = self.graph.files().find(|c| c.relative_path == trimmed) {
            return Some(capsule.path.clone());
        }

        self.graph
            .files()
            .find(|c| is_segment_suffix(&c.relative_path, trimmed))
            .map(|c| c.path.clone())
    }

    /// Case-insensitive substring match over symbol names.
    pub fn search(&self, term: &str) -> Vec<&'g SymbolHit> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.graph.symbols().matching(&needle).collect()
    }

    /// Breadth-first walk out to `radius` hops, excluding the start node and
    /// stopping once `cap` neighbors are collected.
    pub fn neighborhood(&self, query: &NeighborhoodQuery) -> Vec<Neighbor> {
        if query.radius == 0 || query.cap == 0 {
            return Vec::new();
        }
        let Some(start) = self.resolve(query.path.trim()) else {
            return Vec::new();
        };

        let mut directions = Vec::with_capacity(2);
        if query.include_dependencies {
            directions.push((Direction::Outgoing, Relation::Dependency));
        }
        if query.include_dependents {
            directions.push((Direction::Incoming, Relation::Dependent));
        }

        let mut visited: HashSet<PathBuf> = HashSet::from([start.clone()]);
        let mut frontier: Vec<PathBuf> = vec![start];
        let mut out = Vec::new();

        for distance in 1..=query.radius {
            let mut next = Vec::new();
            for node in &frontier {
                for &(direction, relation) in &directions {
                    for neighbor in self.graph.neighbors(node, direction) {
                        if !visited.insert(neighbor.to_path_buf()) {
                            continue;
                        }
                        out.push(Neighbor {
                            path: neighbor.to_path_buf(),
                            relative_path: self.graph.relative_path(neighbor),
                            distance,
                            relation,
                        });
                        if out.len() >= query.cap {
                            return out;
                        }
                        next.push(neighbor.to_path_buf());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }

    pub fn stats(&self) -> GraphStats {
        let external_dependencies: BTreeSet<String> = self
            .graph
            .files()
            .flat_map(|c| c.imports.iter())
            .filter(|i| i.kind == ImportKind::External)
            .map(|i| package_name(&i.specifier))
            .collect();

        let mut entry_points: Vec<String> = self
            .graph
            .files()
            .filter(|c| c.language.is_source() && self.graph.incoming_count(&c.path) == 0)
            .map(|c| c.relative_path.clone())
            .collect();
        entry_points.sort();
        entry_points.truncate(ENTRY_POINT_LIMIT);

        GraphStats {
            file_count: self.graph.file_count(),
            directory_count: self.graph.directory_count(),
            edge_count: self.graph.edge_count(),
            external_dependencies: external_dependencies.into_iter().collect(),
            entry_points,
            overview: self.graph.overview().map(str::to_string),
        }
    }
}

/// `a/b/c.ts` ends with `b/c.ts` and `c.ts`, not with `/c.ts` or `b/c`.
fn is_segment_suffix(path: &str, suffix: &str) -> bool {
    if suffix.is_empty() || !path.ends_with(suffix) {
        return false;
    }
    let cut = path.len() - suffix.len();
    cut == 0 || path[..cut].ends_with('/')
}
