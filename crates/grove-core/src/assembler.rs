//! Graph assembly: capsules in, nodes + directories + import edges out

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::ResolverConfig;
use crate::graph::Graph;
use crate::model::*;
use crate::resolver::{ImportResolver, Resolution};

/// Build a graph from the complete capsule set of one scan.
///
/// Every import is classified and, when local, pointed at its target. Only
/// local imports produce edges; everything else stays on the capsule.
pub fn assemble(root: &Path, capsules: Vec<FileCapsule>, resolver_config: &ResolverConfig) -> Graph {
    let known: HashSet<PathBuf> = capsules.iter().map(|c| c.path.clone()).collect();
    let resolver = ImportResolver::new(&known, resolver_config);

    let mut capsules = capsules;
    for capsule in &mut capsules {
        let importer = capsule.path.clone();
        for import in &mut capsule.imports {
            apply_resolution(import, resolver.resolve(&import.specifier, &importer));
        }
    }

    let mut graph = Graph::new(root);
    graph.ensure_directory(root);
    for capsule in capsules {
        let path = capsule.path.clone();
        graph.add_file(capsule);
        graph.link_file(&path);
    }

    link_imports(&mut graph);
    fill_usage(&mut graph);
    graph.rebuild_symbol_index();

    tracing::info!(
        "Assembled graph: {} files, {} directories, {} edges",
        graph.file_count(),
        graph.directory_count(),
        graph.edge_count()
    );
    graph
}

fn apply_resolution(import: &mut ImportEntry, resolution: Resolution) {
    match resolution {
        Resolution::Local(target) => {
            import.kind = ImportKind::Local;
            import.resolved = Some(target);
        }
        Resolution::External(_) => {
            import.kind = ImportKind::External;
            import.resolved = None;
        }
        Resolution::Builtin => {
            import.kind = ImportKind::Builtin;
            import.resolved = None;
        }
        Resolution::Unresolved => {
            import.kind = ImportKind::Unresolved;
            import.resolved = None;
        }
    }
}

/// Append one edge per resolved local import. Self-imports are dropped.
pub(crate) fn link_imports(graph: &mut Graph) {
    let pending: Vec<GraphEdge> = graph
        .files()
        .flat_map(|capsule| {
            capsule.imports.iter().filter(|i| i.is_local()).filter_map(move |import| {
                let to = import.resolved.clone()?;
                if to == capsule.path {
                    return None;
                }
                Some(GraphEdge {
                    from: capsule.path.clone(),
                    to,
                    kind: if import.reexport { EdgeKind::ExportsTo } else { EdgeKind::Imports },
                    symbols: import.names.clone(),
                })
            })
        })
        .collect();

    for edge in pending {
        if !graph.add_edge(edge) {
            tracing::debug!("Dropped edge to a file outside the graph");
        }
    }
}

/// Fill each capsule's `used_by` / `depends_on` from the edge list.
pub(crate) fn fill_usage(graph: &mut Graph) {
    let mut depends_on: HashMap<PathBuf, BTreeSet<String>> = HashMap::new();
    let mut used_by: HashMap<PathBuf, BTreeSet<String>> = HashMap::new();

    for edge in graph.edges() {
        depends_on
            .entry(edge.from.clone())
            .or_default()
            .insert(graph.relative_path(&edge.to));
        used_by
            .entry(edge.to.clone())
            .or_default()
            .insert(graph.relative_path(&edge.from));
    }

    for capsule in graph.files_mut() {
        let Some(context) = capsule.summary_context.as_mut() else {
            continue;
        };
        context.depends_on = depends_on.remove(&capsule.path).map(Vec::from_iter).unwrap_or_default();
        context.used_by = used_by.remove(&capsule.path).map(Vec::from_iter).unwrap_or_default();
    }
}
