//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::Context;
use grove_ai::create_analyzer;
use grove_core::{Graph, GroveConfig, NeighborhoodQuery, QueryEngine};
use grove_enrich::Scheduler;
use grove_indexer::{canonical_root, index_workspace, load_or_index};
use grove_server::{GroveServer, ServerConfig};
use serde::Serialize;

fn load_config(root: &Path) -> anyhow::Result<GroveConfig> {
    GroveConfig::load(root).with_context(|| format!("failed to load config for {}", root.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Load the graph and hand it to a scheduler built from the same config.
fn open_scheduler(root: &Path) -> anyhow::Result<Scheduler> {
    let config = load_config(root)?;
    let (graph, source) = load_or_index(root, &config)?;
    tracing::info!(
        "Graph ready from {:?}: {} files, {} edges",
        source,
        graph.file_count(),
        graph.edge_count()
    );

    let analyzer = create_analyzer(&config.ai).context("failed to configure analyzer")?;
    tracing::info!("Using {} analyzer", analyzer.name());
    Ok(Scheduler::new(graph.into_shared(), analyzer, config.enrich))
}

pub fn index(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Indexing repository: {}", root.display());

    let config = load_config(&root)?;
    let graph = index_workspace(&root, &config)?;
    let path = grove_core::save_snapshot(&graph, graph.root())?;

    tracing::info!("Indexed {} files, {} edges", graph.file_count(), graph.edge_count());
    tracing::info!("Snapshot written to {}", path.display());
    print_json(&QueryEngine::new(&graph).stats())
}

pub async fn enrich(root: PathBuf) -> anyhow::Result<()> {
    let scheduler = open_scheduler(&root)?;
    let report = scheduler.run_to_completion().await;
    print_json(&report)
}

pub async fn serve(root: PathBuf, host: String, port: u16, enrich: bool) -> anyhow::Result<()> {
    tracing::info!("Starting Grove server on {}:{}", host, port);

    let scheduler = open_scheduler(&root)?;
    if enrich {
        scheduler.start();
    }

    let server = GroveServer::new(scheduler, ServerConfig { host, port });
    server.start().await
}

fn load_graph(root: &Path) -> anyhow::Result<Graph> {
    let config = load_config(root)?;
    Ok(load_or_index(root, &config)?.0)
}

pub fn query_capsule(root: PathBuf, path: &str) -> anyhow::Result<()> {
    let graph = load_graph(&root)?;
    let capsule = QueryEngine::new(&graph)
        .get_capsule(path)
        .with_context(|| format!("no file matches `{path}`"))?;
    print_json(capsule)
}

pub fn query_search(root: PathBuf, term: &str) -> anyhow::Result<()> {
    let graph = load_graph(&root)?;
    print_json(&QueryEngine::new(&graph).search(term))
}

pub fn query_neighbors(root: PathBuf, query: &NeighborhoodQuery) -> anyhow::Result<()> {
    let graph = load_graph(&root)?;
    let engine = QueryEngine::new(&graph);
    if engine.get_capsule(&query.path).is_none() {
        anyhow::bail!("no file matches `{}`", query.path);
    }
    print_json(&engine.neighborhood(query))
}

pub fn query_stats(root: PathBuf) -> anyhow::Result<()> {
    let graph = load_graph(&root)?;
    print_json(&QueryEngine::new(&graph).stats())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Clearing cache for: {}", root.display());

    let root = canonical_root(&root)?;
    grove_core::clear_cache(&root)?;

    tracing::info!("Cache cleared");
    Ok(())
}
