//! Scheduler tests against a scripted analyzer

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::result::Result;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use grove_ai::{AnalysisError, Analyzer, RiskRequest, StructureRequest, SummaryRequest};
use grove_core::*;
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::*;

/// Counts calls and the peak number of calls in flight.
#[derive(Default)]
struct ScriptedAnalyzer {
    summary_calls: AtomicUsize,
    structure_calls: AtomicUsize,
    risk_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    malformed_structure: bool,
    structure_order: StdMutex<Vec<String>>,
    /// Hold the first structure call until `release` fires.
    gate_first_structure: bool,
    /// Hold the first risk call until `release` fires.
    gate_first_risk: bool,
    risk_order: StdMutex<Vec<String>>,
    started: Notify,
    release: Notify,
    /// Requests that fail the first time they are seen: a file path, `dir:<path>`,
    /// `overview`, or `risk:<path>#<function>`.
    fail_once: StdMutex<HashSet<String>>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedAnalyzer {
    fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        InFlight(&self.in_flight)
    }

    fn failing_once(keys: &[&str]) -> Self {
        let fail_once = keys.iter().map(|k| k.to_string()).collect();
        Self { fail_once: StdMutex::new(fail_once), ..Self::default() }
    }

    fn should_fail(&self, key: &str) -> bool {
        self.fail_once.lock().unwrap().remove(key)
    }

    fn total_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
            + self.structure_calls.load(Ordering::SeqCst)
            + self.risk_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, AnalysisError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        let _flight = self.enter().await;
        let key = match request {
            SummaryRequest::File { path, .. } => path.clone(),
            SummaryRequest::Directory { path, .. } => format!("dir:{path}"),
            SummaryRequest::Project { .. } => "overview".to_string(),
        };
        if self.should_fail(&key) {
            return Err(AnalysisError::malformed("empty reply"));
        }
        Ok(match request {
            SummaryRequest::File { path, .. } => format!("Summary of {path}"),
            SummaryRequest::Directory { path, .. } => format!("Directory {path}"),
            SummaryRequest::Project { file_summaries } => format!("Overview of {} files", file_summaries.len()),
        })
    }

    async fn analyze_structure(&self, request: &StructureRequest) -> Result<StructureAnalysis, AnalysisError> {
        self.structure_calls.fetch_add(1, Ordering::SeqCst);
        let is_first = {
            let mut order = self.structure_order.lock().unwrap();
            order.push(request.path.clone());
            order.len() == 1
        };
        if self.gate_first_structure && is_first {
            self.started.notify_one();
            self.release.notified().await;
        }
        let _flight = self.enter().await;

        if self.malformed_structure {
            return Err(AnalysisError::malformed("not JSON"));
        }
        Ok(StructureAnalysis {
            summary: format!("Structure of {}", request.path),
            blocks: vec![CodeBlock {
                name: "main".to_string(),
                kind: BlockKind::Function,
                line_start: 1,
                line_end: 3,
                summary: "entry".to_string(),
                calls: Vec::new(),
                called_by: Vec::new(),
            }],
            failed: false,
        })
    }

    async fn analyze_risk(&self, request: &RiskRequest) -> Result<RiskRecord, AnalysisError> {
        self.risk_calls.fetch_add(1, Ordering::SeqCst);
        let is_first = {
            let mut order = self.risk_order.lock().unwrap();
            order.push(request.path.clone());
            order.len() == 1
        };
        if self.gate_first_risk && is_first {
            self.started.notify_one();
            self.release.notified().await;
        }
        let _flight = self.enter().await;

        if self.should_fail(&format!("risk:{}#{}", request.path, request.function)) {
            return Err(AnalysisError::malformed("no level"));
        }
        Ok(RiskRecord {
            level: RiskLevel::Low,
            categories: vec![RiskCategory::Maintainability],
            issues: vec![format!("{} looks fine", request.function)],
            recommendation: None,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn source(n: usize) -> String {
    let mut text = format!("export function main{n}() {{\n  return {n};\n}}\n");
    for i in 0..9 {
        text.push_str(&format!("// line {i}\n"));
    }
    text
}

/// A repo of `count` twelve-line TypeScript files under `src/`.
fn repo(names: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    for (i, name) in names.iter().enumerate() {
        fs::write(dir.path().join("src").join(name), source(i)).unwrap();
    }
    dir
}

fn numbered_repo(count: usize) -> TempDir {
    let names: Vec<String> = (0..count).map(|i| format!("f{i}.ts")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    repo(&refs)
}

fn enrich_config() -> EnrichConfig {
    EnrichConfig { persist_snapshots: false, ..EnrichConfig::default() }
}

fn scheduler(dir: &Path, analyzer: Arc<ScriptedAnalyzer>, config: EnrichConfig) -> Scheduler {
    let graph = grove_indexer::index_workspace(dir, &GroveConfig::default()).unwrap();
    Scheduler::new(graph.into_shared(), analyzer, config)
}

#[tokio::test]
async fn test_summary_calls_respect_concurrency_cap() {
    let dir = numbered_repo(10);
    let analyzer = Arc::new(ScriptedAnalyzer::with_delay(Duration::from_millis(20)));
    let config = EnrichConfig { summary_concurrency: 3, ..enrich_config() };
    let scheduler = scheduler(dir.path(), analyzer.clone(), config);

    let report = scheduler.run_summary_pipeline().await;

    assert_eq!(report.summaries, 10);
    assert_eq!(analyzer.max_in_flight.load(Ordering::SeqCst), 3);
    // 10 files, `src` then the root, then the overview.
    assert_eq!(analyzer.summary_calls.load(Ordering::SeqCst), 13);
    assert_eq!(report.directories, 2);
    assert!(report.overview);
}

#[tokio::test]
async fn test_directories_are_summarized_deepest_first() {
    let dir = repo(&["a.ts"]);
    fs::create_dir_all(dir.path().join("src/deep/er")).unwrap();
    fs::write(dir.path().join("src/deep/er/b.ts"), source(1)).unwrap();

    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let scheduler = scheduler(dir.path(), analyzer, enrich_config());
    let mut events = scheduler.subscribe();

    scheduler.run_summary_pipeline().await;

    let mut order = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let GraphEvent::DirectorySummaryUpdated { summary, .. } = event {
            order.push(summary);
        }
    }
    assert_eq!(order, ["Directory src/deep/er", "Directory src/deep", "Directory src", "Directory "]);

    let graph = scheduler.graph().read().await;
    assert_eq!(graph.overview(), Some("Overview of 2 files"));
}

#[tokio::test]
async fn test_rerun_over_enriched_graph_makes_no_calls() {
    let dir = numbered_repo(4);
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let scheduler = scheduler(dir.path(), analyzer.clone(), enrich_config());

    let first = scheduler.run_to_completion().await;
    assert_eq!(first.summaries, 4);
    assert_eq!(first.structures, 4);
    assert_eq!(first.risks, 4);
    let calls = analyzer.total_calls();
    assert!(calls > 0);

    let second = scheduler.run_to_completion().await;
    assert_eq!(second, EnrichReport::default());
    assert_eq!(analyzer.total_calls(), calls);

    let graph = scheduler.graph().read().await;
    for capsule in graph.files() {
        assert!(capsule.summary.is_some());
        assert_eq!(capsule.structure.as_ref().unwrap().blocks.len(), 1);
        assert_eq!(capsule.risks["main"].level, RiskLevel::Low);
    }
}

#[tokio::test]
async fn test_fresh_scheduler_over_loaded_snapshot_makes_no_calls() {
    let dir = numbered_repo(2);
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let config = EnrichConfig { persist_snapshots: true, ..EnrichConfig::default() };
    scheduler(dir.path(), analyzer.clone(), config.clone()).run_to_completion().await;

    let root = fs::canonicalize(dir.path()).unwrap();
    let snapshot = load_snapshot(&root).unwrap().expect("snapshot written after phases");
    let restored = Graph::from_snapshot(snapshot);
    assert!(restored.files().all(|c| c.summary.is_some() && !c.risks.is_empty()));

    let fresh = Arc::new(ScriptedAnalyzer::default());
    let rerun = Scheduler::new(restored.into_shared(), fresh.clone(), config);
    rerun.run_to_completion().await;
    assert_eq!(fresh.total_calls(), 0);
}

#[tokio::test]
async fn test_malformed_structure_falls_back_after_three_attempts() {
    let dir = repo(&["only.ts"]);
    let analyzer = Arc::new(ScriptedAnalyzer { malformed_structure: true, ..ScriptedAnalyzer::default() });
    let scheduler = scheduler(dir.path(), analyzer.clone(), enrich_config());

    let report = scheduler.run_structure_pipeline().await;
    assert_eq!(report.fallbacks, 1);
    assert_eq!(analyzer.structure_calls.load(Ordering::SeqCst), 3);
    assert_eq!(analyzer.risk_calls.load(Ordering::SeqCst), 0);

    {
        let graph = scheduler.graph().read().await;
        let capsule = graph.files().next().unwrap();
        assert_eq!(capsule.structure, Some(StructureAnalysis::fallback()));
    }

    // Not retried automatically.
    scheduler.run_to_completion().await;
    assert_eq!(analyzer.structure_calls.load(Ordering::SeqCst), 3);

    // An explicit request clears the fallback.
    scheduler.request_analysis("src/only.ts", false).await.unwrap();
    scheduler.wait_idle().await;
    assert_eq!(analyzer.structure_calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_priority_request_jumps_the_backlog() {
    let dir = repo(&["a.ts", "b.ts", "c.ts", "d.ts", "e.ts"]);
    let analyzer = Arc::new(ScriptedAnalyzer { gate_first_structure: true, ..ScriptedAnalyzer::default() });
    let config = EnrichConfig { structure_concurrency: 1, ..enrich_config() };
    let scheduler = scheduler(dir.path(), analyzer.clone(), config);
    let mut events = scheduler.subscribe();

    let background = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_structure_pipeline().await })
    };
    analyzer.started.notified().await;

    let requested = scheduler.request_analysis("src/e.ts", false).await.unwrap();
    assert!(requested.ends_with("src/e.ts"));
    analyzer.release.notify_one();

    let report = background.await.unwrap();
    scheduler.wait_idle().await;
    assert_eq!(report.structures, 5);

    let order = analyzer.structure_order.lock().unwrap().clone();
    assert_eq!(order, ["src/a.ts", "src/e.ts", "src/b.ts", "src/c.ts", "src/d.ts"]);

    let focus = std::iter::from_fn(|| events.try_recv().ok())
        .find(|e| matches!(e, GraphEvent::FileFocusChanged { .. }));
    assert_eq!(focus, Some(GraphEvent::FileFocusChanged { path: requested }));
}

#[tokio::test]
async fn test_forced_request_reanalyzes_file() {
    let dir = repo(&["a.ts", "b.ts"]);
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let scheduler = scheduler(dir.path(), analyzer.clone(), enrich_config());
    scheduler.run_structure_pipeline().await;
    assert_eq!(analyzer.structure_calls.load(Ordering::SeqCst), 2);
    assert_eq!(analyzer.risk_calls.load(Ordering::SeqCst), 2);

    scheduler.request_analysis("src/a.ts", false).await.unwrap();
    scheduler.wait_idle().await;
    assert_eq!(analyzer.structure_calls.load(Ordering::SeqCst), 2);

    scheduler.request_analysis("src/a.ts", true).await.unwrap();
    scheduler.wait_idle().await;
    assert_eq!(analyzer.structure_calls.load(Ordering::SeqCst), 3);
    assert_eq!(analyzer.risk_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unknown_file_request_is_an_error() {
    let dir = repo(&["a.ts"]);
    let scheduler = scheduler(dir.path(), Arc::new(ScriptedAnalyzer::default()), enrich_config());
    let err = scheduler.request_analysis("src/missing.ts", false).await.unwrap_err();
    assert_eq!(err, EnrichError::UnknownFile("src/missing.ts".to_string()));
}

#[tokio::test]
async fn test_duplicate_trigger_is_a_no_op() {
    let dir = numbered_repo(3);
    let analyzer = Arc::new(ScriptedAnalyzer::with_delay(Duration::from_millis(10)));
    let scheduler = scheduler(dir.path(), analyzer.clone(), enrich_config());

    let (first, second) = tokio::join!(scheduler.run_to_completion(), scheduler.run_to_completion());

    assert_eq!(first.summaries, 3);
    assert_eq!(second, EnrichReport::default());
    // 3 files, `src`, the root, and the overview.
    assert_eq!(analyzer.summary_calls.load(Ordering::SeqCst), 6);
    assert_eq!(analyzer.structure_calls.load(Ordering::SeqCst), 3);
    assert_eq!(analyzer.risk_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_events_carry_single_capsule_deltas() {
    let dir = repo(&["a.ts", "b.ts"]);
    let scheduler = scheduler(dir.path(), Arc::new(ScriptedAnalyzer::default()), enrich_config());
    let mut events = scheduler.subscribe();

    scheduler.run_to_completion().await;

    let received: Vec<GraphEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    let summaries: Vec<&GraphEvent> = received
        .iter()
        .filter(|e| matches!(e, GraphEvent::SummaryUpdated { .. }))
        .collect();
    assert_eq!(summaries.len(), 2);
    assert!(received.iter().any(|e| matches!(e, GraphEvent::OverviewUpdated { .. })));
    assert!(received.iter().any(|e| matches!(
        e,
        GraphEvent::RiskUpdated { function, .. } if function == "main"
    )));
    assert!(received.contains(&GraphEvent::PhaseCompleted { phase: Phase::Summaries, processed: 2 }));

    let structure = received
        .iter()
        .find_map(|e| match e {
            GraphEvent::StructureUpdated { blocks, .. } => Some(blocks.len()),
            _ => None,
        })
        .unwrap();
    assert_eq!(structure, 1);
}

#[tokio::test]
async fn test_files_without_context_are_not_summarized() {
    let dir = repo(&["a.ts"]);
    fs::write(dir.path().join("notes.md"), "# Notes\n").unwrap();

    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let scheduler = scheduler(dir.path(), analyzer.clone(), enrich_config());
    let report = scheduler.run_summary_pipeline().await;

    assert_eq!(report.summaries, 1);
    let graph = scheduler.graph().read().await;
    let notes = graph.files().find(|c| c.name == "notes.md").unwrap();
    assert!(notes.summary.is_none());
}

#[tokio::test]
async fn test_non_ecmascript_sources_get_structure_and_risk() {
    let dir = repo(&["a.ts"]);
    let script: String = (0..12).map(|i| format!("x{i} = {i}\n")).collect();
    fs::write(dir.path().join("tool.py"), script).unwrap();

    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let scheduler = scheduler(dir.path(), analyzer.clone(), enrich_config());
    let report = scheduler.run_structure_pipeline().await;

    assert_eq!(report.structures, 2);
    assert_eq!(report.risks, 2);
    assert!(analyzer.structure_order.lock().unwrap().contains(&"tool.py".to_string()));

    let graph = scheduler.graph().read().await;
    let tool = graph.files().find(|c| c.name == "tool.py").unwrap();
    assert_eq!(tool.language, Language::Python);
    assert_eq!(tool.structure.as_ref().unwrap().blocks[0].name, "main");
    assert_eq!(tool.risks["main"].level, RiskLevel::Low);
}

#[tokio::test]
async fn test_failed_items_are_retried_on_the_next_pass() {
    let dir = repo(&["a.ts", "b.ts"]);
    let analyzer = Arc::new(ScriptedAnalyzer::failing_once(&[
        "src/a.ts",
        "dir:src",
        "overview",
        "risk:src/b.ts#main",
    ]));
    let scheduler = scheduler(dir.path(), analyzer.clone(), enrich_config());

    let first = scheduler.run_to_completion().await;
    assert_eq!(first.summaries, 1);
    // `src` failed and the root has nothing summarized below it yet.
    assert_eq!(first.directories, 0);
    assert!(!first.overview);
    assert_eq!(first.structures, 2);
    assert_eq!(first.risks, 1);
    {
        let graph = scheduler.graph().read().await;
        let a = graph.files().find(|c| c.name == "a.ts").unwrap();
        let b = graph.files().find(|c| c.name == "b.ts").unwrap();
        assert!(a.summary.is_none());
        assert_eq!(b.summary.as_deref(), Some("Summary of src/b.ts"));
        assert!(graph.directories().all(|d| d.summary.is_none()));
        assert!(graph.overview().is_none());
        assert!(a.risks.contains_key("main"));
        assert!(b.risks.is_empty());
    }
    assert_eq!(analyzer.summary_calls.load(Ordering::SeqCst), 4);
    assert_eq!(analyzer.risk_calls.load(Ordering::SeqCst), 2);

    let second = scheduler.run_to_completion().await;
    assert_eq!(second.summaries, 1);
    assert_eq!(second.directories, 2);
    assert!(second.overview);
    assert_eq!(second.structures, 0);
    assert_eq!(second.risks, 1);
    // a.ts, `src`, the root, and the overview; then b.ts#main.
    assert_eq!(analyzer.summary_calls.load(Ordering::SeqCst), 8);
    assert_eq!(analyzer.risk_calls.load(Ordering::SeqCst), 3);

    let graph = scheduler.graph().read().await;
    assert!(graph.files().all(|c| c.summary.is_some() && c.risks.contains_key("main")));
    assert!(graph.directories().all(|d| d.summary.is_some()));
    assert_eq!(graph.overview(), Some("Overview of 2 files"));
}

#[tokio::test]
async fn test_focused_file_risk_goes_ahead_of_backlog() {
    let dir = repo(&["a.ts", "b.ts", "c.ts", "d.ts", "e.ts"]);
    let analyzer = Arc::new(ScriptedAnalyzer { gate_first_risk: true, ..ScriptedAnalyzer::default() });
    let config = EnrichConfig { risk_concurrency: 1, ..enrich_config() };
    let scheduler = scheduler(dir.path(), analyzer.clone(), config);

    let background = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_structure_pipeline().await })
    };
    // Every structure has landed once the risk loop starts.
    analyzer.started.notified().await;
    let mut events = scheduler.subscribe();

    let focused = scheduler.request_analysis("src/e.ts", true).await.unwrap();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv()).await.unwrap().unwrap();
        if matches!(&event, GraphEvent::StructureUpdated { path, .. } if *path == focused) {
            break;
        }
    }
    analyzer.release.notify_one();

    background.await.unwrap();
    scheduler.wait_idle().await;

    assert_eq!(analyzer.structure_calls.load(Ordering::SeqCst), 6);
    let order = analyzer.risk_order.lock().unwrap().clone();
    assert_eq!(order, ["src/a.ts", "src/e.ts", "src/b.ts", "src/c.ts", "src/d.ts"]);
}

#[tokio::test]
async fn test_loading_started_opens_a_run() {
    let dir = repo(&["a.ts"]);
    let scheduler = scheduler(dir.path(), Arc::new(ScriptedAnalyzer::default()), enrich_config());
    let mut events = scheduler.subscribe();

    scheduler.start().await.unwrap();

    assert_eq!(events.try_recv().unwrap(), GraphEvent::LoadingStarted);
}

#[tokio::test]
async fn test_snapshot_write_failure_is_published() {
    let dir = repo(&["a.ts"]);
    let config = EnrichConfig { persist_snapshots: true, ..EnrichConfig::default() };
    let scheduler = scheduler(dir.path(), Arc::new(ScriptedAnalyzer::default()), config);
    // A plain file where the cache directory should go.
    fs::write(dir.path().join(".grove"), "").unwrap();
    let mut events = scheduler.subscribe();

    let report = scheduler.run_summary_pipeline().await;
    assert_eq!(report.summaries, 1);

    let received: Vec<GraphEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    let errors: Vec<&str> = received
        .iter()
        .filter_map(|e| match e {
            GraphEvent::Error { message } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|m| m.starts_with("failed to write snapshot")));
}
