//! Phased enrichment pipeline
//!
//! Two independently guarded pipelines share one graph:
//!
//! - summaries: files, then directories deepest-first, then the project overview
//! - structure: a draining loop over non-trivial source files, followed by risk
//!   analysis of every block it produced
//!
//! Each phase dispatches bounded batches and waits for the whole batch before
//! forming the next one. Completed items are published individually.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures_util::future::join_all;
use grove_ai::{Analyzer, NamedSummary, RiskRequest, StructureRequest, SummaryRequest};
use grove_core::{
    EnrichConfig, Graph, GraphEvent, Phase, QueryEngine, RiskRecord, SharedGraph, StructureAnalysis, save_snapshot,
};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::EnrichError;
use crate::queue::{EnrichKey, ItemState, WorkQueue};

/// Buffered events per subscriber before slow receivers start lagging.
pub const EVENT_CAPACITY: usize = 1024;

/// Work completed by one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichReport {
    pub summaries: usize,
    pub directories: usize,
    pub overview: bool,
    pub structures: usize,
    /// Files whose structure analysis ran out of attempts.
    pub fallbacks: usize,
    pub risks: usize,
}

impl EnrichReport {
    pub fn merge(self, other: Self) -> Self {
        Self {
            summaries: self.summaries + other.summaries,
            directories: self.directories + other.directories,
            overview: self.overview || other.overview,
            structures: self.structures + other.structures,
            fallbacks: self.fallbacks + other.fallbacks,
            risks: self.risks + other.risks,
        }
    }
}

/// Holds a pipeline's running flag; clears it and wakes idle waiters on drop.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
    idle: &'a Notify,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool, idle: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { flag, idle })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

struct Inner {
    graph: SharedGraph,
    analyzer: Arc<dyn Analyzer>,
    config: EnrichConfig,
    events: broadcast::Sender<GraphEvent>,
    summary_running: AtomicBool,
    structure_running: AtomicBool,
    risk_running: AtomicBool,
    /// Spawned loops that have not finished yet.
    spawned: AtomicUsize,
    idle: Notify,
    /// Both pipelines persist; writes go through one at a time.
    persist_lock: Mutex<()>,
    structure_queue: Mutex<WorkQueue>,
    risk_queue: Mutex<WorkQueue>,
}

/// One scheduler per workspace session. Clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(graph: SharedGraph, analyzer: Arc<dyn Analyzer>, config: EnrichConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::with_events(graph, analyzer, config, events)
    }

    /// Publish on an existing channel, e.g. one the server already hands to clients.
    pub fn with_events(
        graph: SharedGraph,
        analyzer: Arc<dyn Analyzer>,
        config: EnrichConfig,
        events: broadcast::Sender<GraphEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                graph,
                analyzer,
                config,
                events,
                summary_running: AtomicBool::new(false),
                structure_running: AtomicBool::new(false),
                risk_running: AtomicBool::new(false),
                spawned: AtomicUsize::new(0),
                idle: Notify::new(),
                persist_lock: Mutex::new(()),
                structure_queue: Mutex::new(WorkQueue::new()),
                risk_queue: Mutex::new(WorkQueue::new()),
            }),
        }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.inner.graph
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.inner.analyzer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> broadcast::Sender<GraphEvent> {
        self.inner.events.clone()
    }

    pub fn publish(&self, event: GraphEvent) {
        debug!("Publishing {}", event.name());
        // No receivers just means no client is connected.
        let _ = self.inner.events.send(event);
    }

    pub fn is_running(&self) -> bool {
        self.inner.spawned.load(Ordering::Acquire) > 0
            || [&self.inner.summary_running, &self.inner.structure_running, &self.inner.risk_running]
                .iter()
                .any(|flag| flag.load(Ordering::Acquire))
    }

    /// Wait until no pipeline or loop is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    /// Run everything in the background.
    pub fn start(&self) -> JoinHandle<EnrichReport> {
        let scheduler = self.clone();
        // Counted before the task runs so `wait_idle` cannot slip in ahead of the pipelines.
        self.inner.spawned.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            let report = scheduler.run_pipelines().await;
            scheduler.spawn_finished();
            scheduler.finish(report).await
        })
    }

    /// Run both pipelines and wait for all enrichment work to settle.
    pub async fn run_to_completion(&self) -> EnrichReport {
        let report = self.run_pipelines().await;
        self.finish(report).await
    }

    async fn run_pipelines(&self) -> EnrichReport {
        self.publish(GraphEvent::LoadingStarted);
        let (summaries, structure) = tokio::join!(self.run_summary_pipeline(), self.run_structure_pipeline());
        summaries.merge(structure)
    }

    async fn finish(&self, report: EnrichReport) -> EnrichReport {
        self.wait_idle().await;
        info!(
            "Enrichment finished: {} summaries, {} directories, {} structures ({} fallbacks), {} risks",
            report.summaries, report.directories, report.structures, report.fallbacks, report.risks
        );
        report
    }

    /// Phases 1 to 3. A no-op while another summary run is in progress.
    pub async fn run_summary_pipeline(&self) -> EnrichReport {
        let Some(_guard) = RunGuard::acquire(&self.inner.summary_running, &self.inner.idle) else {
            debug!("Summary pipeline already running");
            return EnrichReport::default();
        };
        info!("Summary pipeline started");

        let summaries = self.summarize_files().await;
        self.phase_completed(Phase::Summaries, summaries).await;

        let directories = self.summarize_directories().await;
        self.phase_completed(Phase::DirectorySummaries, directories).await;

        let overview = self.write_overview().await;
        self.phase_completed(Phase::Overview, usize::from(overview)).await;

        EnrichReport { summaries, directories, overview, ..EnrichReport::default() }
    }

    /// Phases 4 and 5. Newly found candidates join a loop that is already running.
    pub async fn run_structure_pipeline(&self) -> EnrichReport {
        let structures = self.queue_structure_candidates().await;
        let risks = self.queue_risk_candidates().await;
        debug!("Queued {} files for structure and {} blocks for risk", structures, risks);
        self.drive_structure().await
    }

    /// "Analyze this file now."
    ///
    /// Publishes `file-focus-changed`, optionally discards the file's structure
    /// and risk results, and puts the file in the structure priority slot. A
    /// fallback structure is always discarded, since this is the only way to retry it.
    pub async fn request_analysis(&self, query: &str, force: bool) -> Result<PathBuf, EnrichError> {
        let (path, needs_structure, missing_risk) = {
            let mut graph = self.inner.graph.write().await;
            let path = QueryEngine::new(&graph)
                .get_capsule(query)
                .map(|capsule| capsule.path.clone())
                .ok_or_else(|| EnrichError::UnknownFile(query.to_string()))?;
            let capsule = graph
                .file_mut(&path)
                .ok_or_else(|| EnrichError::UnknownFile(query.to_string()))?;

            if force || capsule.structure.as_ref().is_some_and(|s| s.failed) {
                capsule.structure = None;
                capsule.risks.clear();
            }
            let missing: Vec<String> = capsule.blocks_missing_risk().map(|b| b.name.clone()).collect();
            (path, capsule.structure.is_none(), missing)
        };

        info!("Analysis requested for {}", path.display());
        self.publish(GraphEvent::FileFocusChanged { path: path.clone() });

        if needs_structure {
            self.inner.risk_queue.lock().await.invalidate_file(&path);
            {
                let key = EnrichKey::File(path.clone());
                let mut queue = self.inner.structure_queue.lock().await;
                // An in-flight analysis of this file lands on its own.
                if queue.state(&key) != Some(ItemState::InProgress) {
                    queue.invalidate(&key);
                    queue.promote(key);
                }
            }
            self.spawn_structure();
        } else if !missing_risk.is_empty() {
            {
                let mut queue = self.inner.risk_queue.lock().await;
                for block in missing_risk.into_iter().rev() {
                    queue.enqueue_front(EnrichKey::block(&path, block));
                }
            }
            self.spawn_risk();
        }
        Ok(path)
    }

    fn spawn_structure(&self) {
        let scheduler = self.clone();
        self.inner.spawned.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            scheduler.drive_structure().await;
            scheduler.spawn_finished();
        });
    }

    fn spawn_risk(&self) {
        let scheduler = self.clone();
        self.inner.spawned.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            scheduler.drive_risk().await;
            scheduler.spawn_finished();
        });
    }

    fn spawn_finished(&self) {
        self.inner.spawned.fetch_sub(1, Ordering::AcqRel);
        self.inner.idle.notify_waiters();
    }

    async fn phase_completed(&self, phase: Phase, processed: usize) {
        info!("Phase {} completed: {} items", phase.as_str(), processed);
        self.publish(GraphEvent::PhaseCompleted { phase, processed });
        if processed > 0 && self.inner.config.persist_snapshots {
            self.persist().await;
        }
    }

    async fn persist(&self) {
        let _writing = self.inner.persist_lock.lock().await;
        let graph = self.inner.graph.read().await;
        match save_snapshot(&graph, graph.root()) {
            Ok(path) => debug!("Snapshot written to {}", path.display()),
            Err(e) => {
                error!("Failed to write snapshot: {}", e);
                self.publish(GraphEvent::Error { message: format!("failed to write snapshot: {e}") });
            }
        }
    }

    // ── Phase 1: file summaries ─────────────────────────────

    async fn summarize_files(&self) -> usize {
        let work: Vec<(PathBuf, SummaryRequest)> = {
            let graph = self.inner.graph.read().await;
            graph
                .files()
                .filter(|capsule| capsule.summary.is_none())
                .filter_map(|capsule| {
                    let context = capsule.summary_context.clone()?;
                    let request = SummaryRequest::File {
                        path: capsule.relative_path.clone(),
                        language: capsule.language,
                        context,
                    };
                    Some((capsule.path.clone(), request))
                })
                .collect()
        };
        if work.is_empty() {
            return 0;
        }

        info!("Summarizing {} files", work.len());
        self.dispatch_summaries(&work, self.inner.config.summary_concurrency, |graph, path, summary| {
            let capsule = graph.file_mut(path)?;
            capsule.summary = Some(summary.clone());
            Some(GraphEvent::SummaryUpdated { path: path.to_path_buf(), summary })
        })
        .await
    }

    /// Bounded batches of summary calls. `store` writes one result and
    /// returns the event announcing it.
    async fn dispatch_summaries<F>(&self, work: &[(PathBuf, SummaryRequest)], concurrency: usize, store: F) -> usize
    where
        F: Fn(&mut Graph, &Path, String) -> Option<GraphEvent>,
    {
        let mut processed = 0;
        for batch in work.chunks(concurrency.max(1)) {
            let results = join_all(batch.iter().map(|(_, request)| self.inner.analyzer.summarize(request))).await;

            for ((path, _), result) in batch.iter().zip(results) {
                match result {
                    Ok(summary) => {
                        let event = {
                            let mut graph = self.inner.graph.write().await;
                            store(&mut *graph, path, summary)
                        };
                        if let Some(event) = event {
                            self.publish(event);
                            processed += 1;
                        }
                    }
                    Err(e) => warn!("Summary of {} failed: {}", path.display(), e),
                }
            }
        }
        processed
    }

    // ── Phase 2: directory summaries ────────────────────────

    async fn summarize_directories(&self) -> usize {
        let levels: BTreeMap<usize, Vec<PathBuf>> = {
            let graph = self.inner.graph.read().await;
            let mut levels: BTreeMap<usize, Vec<PathBuf>> = BTreeMap::new();
            for directory in graph.directories().filter(|d| d.summary.is_none()) {
                let depth = directory.relative_path.split('/').filter(|s| !s.is_empty()).count();
                levels.entry(depth).or_default().push(directory.path.clone());
            }
            levels
        };

        let mut processed = 0;
        // A level only starts once the level below it has landed.
        for (_, directories) in levels.into_iter().rev() {
            let work: Vec<(PathBuf, SummaryRequest)> = {
                let graph = self.inner.graph.read().await;
                directories
                    .iter()
                    .filter_map(|dir| directory_request(&graph, dir).map(|request| (dir.clone(), request)))
                    .collect()
            };

            processed += self
                .dispatch_summaries(&work, self.inner.config.directory_concurrency, |graph, path, summary| {
                    let directory = graph.directory_mut(path)?;
                    directory.summary = Some(summary.clone());
                    Some(GraphEvent::DirectorySummaryUpdated { path: path.to_path_buf(), summary })
                })
                .await;
        }
        processed
    }

    // ── Phase 3: project overview ───────────────────────────

    async fn write_overview(&self) -> bool {
        let file_summaries: Vec<NamedSummary> = {
            let graph = self.inner.graph.read().await;
            if graph.overview().is_some() {
                return false;
            }
            graph
                .files()
                .filter_map(|c| Some(NamedSummary::new(c.relative_path.clone(), c.summary.clone()?)))
                .collect()
        };
        if file_summaries.is_empty() {
            return false;
        }

        match self.inner.analyzer.summarize(&SummaryRequest::Project { file_summaries }).await {
            Ok(overview) => {
                self.inner.graph.write().await.set_overview(Some(overview.clone()));
                self.publish(GraphEvent::OverviewUpdated { overview });
                true
            }
            Err(e) => {
                warn!("Project overview failed: {}", e);
                false
            }
        }
    }

    // ── Phase 4: structure ──────────────────────────────────

    async fn queue_structure_candidates(&self) -> usize {
        let min_lines = self.inner.config.min_structure_lines;
        let candidates: Vec<PathBuf> = {
            let graph = self.inner.graph.read().await;
            graph
                .files()
                .filter(|c| c.structure.is_none() && c.language.is_source() && c.lines() >= min_lines)
                .map(|c| c.path.clone())
                .collect()
        };

        let mut queue = self.inner.structure_queue.lock().await;
        candidates
            .into_iter()
            .filter(|path| queue.enqueue(EnrichKey::File(path.clone())))
            .count()
    }

    async fn drive_structure(&self) -> EnrichReport {
        let mut report = EnrichReport::default();
        loop {
            let Some(guard) = RunGuard::acquire(&self.inner.structure_running, &self.inner.idle) else {
                return report;
            };
            report = report.merge(self.structure_loop().await);
            drop(guard);

            // Keys queued between the last empty batch and the release.
            if self.inner.structure_queue.lock().await.is_drained() {
                break;
            }
        }

        self.phase_completed(Phase::Structure, report.structures + report.fallbacks).await;
        report.merge(self.drive_risk().await)
    }

    async fn structure_loop(&self) -> EnrichReport {
        let size = self.inner.config.structure_concurrency;
        let mut report = EnrichReport::default();

        loop {
            let batch = self.inner.structure_queue.lock().await.next_batch(size);
            if batch.is_empty() {
                break;
            }
            if batch.prioritized {
                info!("Dispatching priority file {}", batch.keys[0]);
            }

            let results = join_all(batch.keys.iter().map(|key| self.analyze_structure(key))).await;
            for (key, outcome) in batch.keys.iter().zip(results) {
                match outcome {
                    Some(analysis) => {
                        if analysis.failed {
                            report.fallbacks += 1;
                        } else {
                            report.structures += 1;
                        }
                        self.store_structure(key, analysis, batch.prioritized).await;
                        self.inner.structure_queue.lock().await.complete(key);
                    }
                    None => self.inner.structure_queue.lock().await.release(key),
                }
            }

            if batch.prioritized {
                self.spawn_risk();
            }
        }
        report
    }

    /// Retries in place; after the last attempt the fallback record stands in.
    /// `None` means the file could not be read and the key should be parked.
    async fn analyze_structure(&self, key: &EnrichKey) -> Option<StructureAnalysis> {
        let path = key.file();
        let (relative_path, language) = {
            let graph = self.inner.graph.read().await;
            let capsule = graph.file(path)?;
            (capsule.relative_path.clone(), capsule.language)
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read {} for structure analysis: {}", path.display(), e);
                return None;
            }
        };
        let request = StructureRequest { path: relative_path, language, content };

        let attempts = self.inner.config.structure_attempts.max(1);
        for attempt in 1..=attempts {
            match self.inner.analyzer.analyze_structure(&request).await {
                Ok(analysis) => return Some(analysis),
                Err(e) => warn!(
                    "Structure analysis of {} failed (attempt {}/{}): {}",
                    request.path, attempt, attempts, e
                ),
            }
        }

        warn!("Giving up on structure of {} after {} attempts", request.path, attempts);
        Some(StructureAnalysis::fallback())
    }

    /// A prioritized file's blocks go ahead of the risk backlog.
    async fn store_structure(&self, key: &EnrichKey, analysis: StructureAnalysis, prioritized: bool) {
        let path = key.file().to_path_buf();
        let missing_risk: Vec<String> = {
            let mut graph = self.inner.graph.write().await;
            let Some(capsule) = graph.file_mut(&path) else {
                return;
            };
            capsule
                .risks
                .retain(|name, _| analysis.blocks.iter().any(|b| &b.name == name));
            capsule.structure = Some(analysis.clone());
            capsule.blocks_missing_risk().map(|b| b.name.clone()).collect()
        };

        {
            let mut queue = self.inner.risk_queue.lock().await;
            if prioritized {
                for block in missing_risk.into_iter().rev() {
                    queue.enqueue_front(EnrichKey::block(&path, block));
                }
            } else {
                for block in missing_risk {
                    queue.enqueue(EnrichKey::block(&path, block));
                }
            }
        }

        self.publish(GraphEvent::StructureUpdated {
            path,
            blocks: analysis.blocks,
            summary: analysis.summary,
        });
    }

    // ── Phase 5: risk ───────────────────────────────────────

    async fn queue_risk_candidates(&self) -> usize {
        let candidates: Vec<EnrichKey> = {
            let graph = self.inner.graph.read().await;
            graph
                .files()
                .flat_map(|c| c.blocks_missing_risk().map(|b| EnrichKey::block(&c.path, b.name.clone())))
                .collect()
        };

        let mut queue = self.inner.risk_queue.lock().await;
        candidates.into_iter().filter(|key| queue.enqueue(key.clone())).count()
    }

    async fn drive_risk(&self) -> EnrichReport {
        let mut risks = 0;
        loop {
            let Some(guard) = RunGuard::acquire(&self.inner.risk_running, &self.inner.idle) else {
                return EnrichReport::default();
            };
            risks += self.risk_loop().await;
            drop(guard);

            if self.inner.risk_queue.lock().await.is_drained() {
                break;
            }
        }

        self.phase_completed(Phase::Risk, risks).await;
        EnrichReport { risks, ..EnrichReport::default() }
    }

    async fn risk_loop(&self) -> usize {
        let size = self.inner.config.risk_concurrency;
        let mut processed = 0;

        loop {
            let batch = self.inner.risk_queue.lock().await.next_batch(size);
            if batch.is_empty() {
                break;
            }

            let results = join_all(batch.keys.iter().map(|key| self.analyze_risk(key))).await;
            for (key, outcome) in batch.keys.iter().zip(results) {
                match outcome {
                    Some(record) => {
                        if self.store_risk(key, record).await {
                            processed += 1;
                        }
                        self.inner.risk_queue.lock().await.complete(key);
                    }
                    None => self.inner.risk_queue.lock().await.release(key),
                }
            }
        }
        processed
    }

    async fn analyze_risk(&self, key: &EnrichKey) -> Option<RiskRecord> {
        let EnrichKey::Block { file, block } = key else {
            return None;
        };
        let (relative_path, code_block) = {
            let graph = self.inner.graph.read().await;
            let capsule = graph.file(file)?;
            let code_block = capsule.structure.as_ref()?.blocks.iter().find(|b| &b.name == block)?.clone();
            (capsule.relative_path.clone(), code_block)
        };

        let content = match tokio::fs::read_to_string(file).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read {} for risk analysis: {}", file.display(), e);
                return None;
            }
        };
        let start = code_block.line_start.max(1) as usize;
        let len = (code_block.line_end as usize + 1).saturating_sub(start);
        let code = content.lines().skip(start - 1).take(len).collect::<Vec<_>>().join("\n");

        let request = RiskRequest {
            path: relative_path,
            function: code_block.name,
            kind: code_block.kind,
            line_start: code_block.line_start,
            code,
        };
        match self.inner.analyzer.analyze_risk(&request).await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Risk analysis of {}#{} failed: {}", request.path, request.function, e);
                None
            }
        }
    }

    async fn store_risk(&self, key: &EnrichKey, record: RiskRecord) -> bool {
        let EnrichKey::Block { file, block } = key else {
            return false;
        };
        {
            let mut graph = self.inner.graph.write().await;
            let Some(capsule) = graph.file_mut(file) else {
                return false;
            };
            let known = capsule.structure.as_ref().is_some_and(|s| s.blocks.iter().any(|b| &b.name == block));
            if !known {
                return false;
            }
            capsule.risks.insert(block.clone(), record.clone());
        }

        self.publish(GraphEvent::RiskUpdated {
            path: file.clone(),
            function: block.clone(),
            risk: record,
        });
        true
    }
}

fn directory_request(graph: &Graph, dir: &Path) -> Option<SummaryRequest> {
    let directory = graph.directory(dir)?;
    let file_summaries: Vec<NamedSummary> = directory
        .files
        .iter()
        .filter_map(|f| graph.file(f))
        .filter_map(|c| Some(NamedSummary::new(c.relative_path.clone(), c.summary.clone()?)))
        .collect();
    let subdirectory_summaries: Vec<NamedSummary> = directory
        .subdirectories
        .iter()
        .filter_map(|d| graph.directory(d))
        .filter_map(|d| Some(NamedSummary::new(d.relative_path.clone(), d.summary.clone()?)))
        .collect();

    if file_summaries.is_empty() && subdirectory_summaries.is_empty() {
        return None;
    }
    Some(SummaryRequest::Directory {
        path: directory.relative_path.clone(),
        file_summaries,
        subdirectory_summaries,
    })
}
