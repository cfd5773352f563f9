//! Push notifications from the enrichment pipeline to subscribers

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::Snapshot;
use crate::model::{CodeBlock, RiskRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Summaries,
    DirectorySummaries,
    Overview,
    Structure,
    Risk,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Summaries => "summaries",
            Phase::DirectorySummaries => "directory-summaries",
            Phase::Overview => "overview",
            Phase::Structure => "structure",
            Phase::Risk => "risk",
        }
    }
}

/// Every mutation event carries one capsule's new field, never the whole graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GraphEvent {
    LoadingStarted,
    Error {
        message: String,
    },
    FullSnapshot {
        snapshot: Box<Snapshot>,
    },
    SummaryUpdated {
        path: PathBuf,
        summary: String,
    },
    DirectorySummaryUpdated {
        path: PathBuf,
        summary: String,
    },
    OverviewUpdated {
        overview: String,
    },
    StructureUpdated {
        path: PathBuf,
        blocks: Vec<CodeBlock>,
        summary: String,
    },
    RiskUpdated {
        path: PathBuf,
        function: String,
        risk: RiskRecord,
    },
    /// Informational; nothing changed in the graph.
    FileFocusChanged {
        path: PathBuf,
    },
    PhaseCompleted {
        phase: Phase,
        processed: usize,
    },
}

impl GraphEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GraphEvent::LoadingStarted => "loading-started",
            GraphEvent::Error { .. } => "error",
            GraphEvent::FullSnapshot { .. } => "full-snapshot",
            GraphEvent::SummaryUpdated { .. } => "summary-updated",
            GraphEvent::DirectorySummaryUpdated { .. } => "directory-summary-updated",
            GraphEvent::OverviewUpdated { .. } => "overview-updated",
            GraphEvent::StructureUpdated { .. } => "structure-updated",
            GraphEvent::RiskUpdated { .. } => "risk-updated",
            GraphEvent::FileFocusChanged { .. } => "file-focus-changed",
            GraphEvent::PhaseCompleted { .. } => "phase-completed",
        }
    }
}
