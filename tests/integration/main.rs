//! Integration tests for Grove
//!
//! These tests verify that indexing, querying, enrichment and the CLI work together.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use grove_ai::LocalAnalyzer;
use grove_core::{EdgeKind, GroveConfig, NeighborhoodQuery, QueryEngine, RiskLevel};
use grove_enrich::Scheduler;
use grove_indexer::{GraphSource, index_workspace, load_or_index};
use tempfile::TempDir;

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

/// A small app: an entry point, a component, a hook, and a helper with a risky call.
fn sample_app() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "package.json", r#"{ "name": "sample" }"#);
    write(
        root,
        "src/index.ts",
        "import { App } from '@/components/App';\nimport { render } from 'react-dom';\n\nrender(App());\n",
    );
    write(
        root,
        "src/components/App.tsx",
        "/** Root component. */\nimport { useCounter } from '../hooks/useCounter';\nimport { format } from '../lib/format';\n\n\
         export function App() {\n  const count = useCounter();\n  return format(count);\n}\n\n\
         export const Title = 'Sample';\n\n// padding\n// padding\n",
    );
    write(
        root,
        "src/hooks/useCounter.ts",
        "export function useCounter() {\n  let count = 0;\n  count += 1;\n  return count;\n}\n\n\
         // padding\n// padding\n// padding\n// padding\n// padding\n",
    );
    write(
        root,
        "src/lib/format.ts",
        "export function format(value: number) {\n  return eval('`' + value + '`');\n}\n\n\
         export function unused() {\n  try {\n    format(1);\n  } catch (e) {}\n}\n\n// padding\n",
    );
    write(root, "src/lib/index.ts", "export { format } from './format';\n");
    dir
}

fn local_scheduler(graph: grove_core::Graph, persist: bool) -> (Scheduler, Arc<LocalAnalyzer>) {
    let analyzer = Arc::new(LocalAnalyzer::new());
    let config = grove_core::EnrichConfig { persist_snapshots: persist, ..Default::default() };
    (Scheduler::new(graph.into_shared(), analyzer.clone(), config), analyzer)
}

#[test]
fn test_index_and_query() {
    let dir = sample_app();
    let graph = index_workspace(dir.path(), &GroveConfig::default()).unwrap();
    let engine = QueryEngine::new(&graph);

    let stats = engine.stats();
    assert_eq!(stats.file_count, 6);
    assert_eq!(stats.external_dependencies, ["react-dom"]);
    // Nothing imports the barrel file either.
    assert_eq!(stats.entry_points, ["src/index.ts", "src/lib/index.ts"]);

    let app = engine.get_capsule("components/App.tsx").unwrap();
    assert!(app.imports.iter().all(|i| i.is_local()));
    assert_eq!(app.summary_context.as_ref().unwrap().used_by, ["src/index.ts"]);

    let hits = engine.search("usecounter");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].relative_path, "src/hooks/useCounter.ts");

    let reexport = graph
        .edges()
        .iter()
        .find(|e| e.kind == EdgeKind::ExportsTo)
        .unwrap();
    assert_eq!(graph.relative_path(&reexport.from), "src/lib/index.ts");
    assert_eq!(graph.relative_path(&reexport.to), "src/lib/format.ts");

    let two_hops = engine.neighborhood(&NeighborhoodQuery {
        include_dependents: false,
        ..NeighborhoodQuery::new("src/index.ts", 2, 10)
    });
    let reached: Vec<(&str, usize)> = two_hops.iter().map(|n| (n.relative_path.as_str(), n.distance)).collect();
    assert_eq!(
        reached,
        [
            ("src/components/App.tsx", 1),
            ("src/hooks/useCounter.ts", 2),
            ("src/lib/format.ts", 2)
        ]
    );
    assert!(engine.neighborhood(&NeighborhoodQuery::new("src/index.ts", 0, 10)).is_empty());
}

#[tokio::test]
async fn test_end_to_end_enrichment_with_local_analyzer() {
    let dir = sample_app();
    let graph = index_workspace(dir.path(), &GroveConfig::default()).unwrap();
    let (scheduler, _) = local_scheduler(graph, true);

    let report = scheduler.run_to_completion().await;
    // package.json has no summary context.
    assert_eq!(report.summaries, 5);
    assert!(report.overview);
    assert_eq!(report.fallbacks, 0);
    // App.tsx, useCounter.ts, and format.ts are long enough for structure analysis.
    assert_eq!(report.structures, 3);

    {
        let graph = scheduler.graph().read().await;
        let app = graph.files().find(|c| c.name == "App.tsx").unwrap();
        assert_eq!(app.summary.as_deref(), Some("Root component."));

        let format = graph.files().find(|c| c.name == "format.ts").unwrap();
        let structure = format.structure.as_ref().unwrap();
        let names: Vec<&str> = structure.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["format", "unused"]);
        assert_eq!(structure.blocks[0].called_by, ["unused"]);
        assert_eq!(format.risks["format"].level, RiskLevel::High);
        assert_eq!(format.risks["unused"].level, RiskLevel::Medium);

        assert!(graph.directories().all(|d| d.summary.is_some()));
        assert!(graph.overview().is_some());
    }

    // The persisted snapshot carries the enrichment into the next session.
    let (restored, source) = load_or_index(dir.path(), &GroveConfig::default()).unwrap();
    assert_eq!(source, GraphSource::Snapshot);
    assert!(restored.files().filter(|c| c.language.is_source()).all(|c| c.summary.is_some()));
    assert!(restored.overview().is_some());

    let (rerun, _) = local_scheduler(restored, false);
    assert_eq!(rerun.run_to_completion().await, grove_enrich::EnrichReport::default());
}

#[tokio::test]
async fn test_edit_between_sessions_triggers_rescan() {
    let dir = sample_app();
    let config = GroveConfig::default();
    let (graph, _) = load_or_index(dir.path(), &config).unwrap();
    let (scheduler, _) = local_scheduler(graph, true);
    scheduler.run_summary_pipeline().await;

    write(dir.path(), "src/lib/format.ts", "export function format(value: number) {\n  return String(value);\n}\n");

    let (graph, source) = load_or_index(dir.path(), &config).unwrap();
    assert_eq!(source, GraphSource::Scan);
    assert!(graph.files().all(|c| c.summary.is_none()));
}

fn grove(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_grove"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("GROVE_AI_PROVIDER", "local")
        .output()
        .expect("failed to run grove")
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_grove")).arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("grove"));
    assert!(stdout.contains("enriched in the background"));
}

#[test]
fn test_cli_index_query_clear() {
    let dir = sample_app();

    let output = grove(dir.path(), &["index"]);
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["fileCount"], 6);
    assert!(dir.path().join(".grove/capsules.json").is_file());

    let output = grove(dir.path(), &["query", "search", "format"]);
    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);

    let output = grove(dir.path(), &["query", "neighbors", "src/lib/format.ts", "--dependents"]);
    let neighbors: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let dependents: Vec<&str> = neighbors
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["relativePath"].as_str().unwrap())
        .collect();
    assert_eq!(dependents, ["src/components/App.tsx", "src/lib/index.ts"]);

    let output = grove(dir.path(), &["query", "capsule", "src/missing.ts"]);
    assert!(!output.status.success());

    let output = grove(dir.path(), &["clear"]);
    assert!(output.status.success());
    assert!(!dir.path().join(".grove").exists());
}

#[test]
fn test_cli_enrich_reports_work() {
    let dir = sample_app();
    let output = grove(dir.path(), &["enrich"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summaries"], 5);
    assert_eq!(report["overview"], true);
}
