//! Inverted symbol index, rebuilt with each graph snapshot

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{FileCapsule, SymbolKind};

/// One occurrence of a symbol name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolHit {
    pub path: PathBuf,
    pub relative_path: String,
    pub name: String,
    pub kind: SymbolKind,
    pub exported: bool,
    pub line: u32,
}

/// Lowercase symbol name -> occurrences. Keys keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    keys: Vec<String>,
    entries: HashMap<String, Vec<SymbolHit>>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<'a>(capsules: impl IntoIterator<Item = &'a FileCapsule>) -> Self {
        let mut index = SymbolIndex::new();
        for capsule in capsules {
            for symbol in &capsule.top_symbols {
                index.insert(SymbolHit {
                    path: capsule.path.clone(),
                    relative_path: capsule.relative_path.clone(),
                    name: symbol.name.clone(),
                    kind: symbol.kind,
                    exported: symbol.exported,
                    line: symbol.line_start,
                });
            }
        }
        index
    }

    fn insert(&mut self, hit: SymbolHit) {
        let key = hit.name.to_lowercase();
        match self.entries.get_mut(&key) {
            Some(hits) => hits.push(hit),
            None => {
                self.keys.push(key.clone());
                self.entries.insert(key, vec![hit]);
            }
        }
    }

    /// Exact (case-insensitive) lookup.
    pub fn get(&self, name: &str) -> &[SymbolHit] {
        self.entries
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// All hits whose key contains `needle` (already lowercased).
    pub fn matching(&self, needle: &str) -> impl Iterator<Item = &SymbolHit> {
        self.keys
            .iter()
            .filter(move |k| k.contains(needle))
            .filter_map(|k| self.entries.get(k))
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
