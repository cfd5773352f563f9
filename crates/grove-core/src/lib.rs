//! Grove Core: capsule model, graph assembly, queries, and snapshot persistence

pub mod assembler;
pub mod cache;
pub mod capsule;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod model;
pub mod query;
pub mod resolver;
pub mod symbols;


#[cfg(test)]
pub mod test_utils;

pub use assembler::assemble;
pub use cache::{
    CACHE_DIR, SNAPSHOT_FILE, SNAPSHOT_VERSION, Snapshot, cache_dir, clear_cache, ensure_cache_dir, load_snapshot,
    save_snapshot, snapshot_path, stale_files,
};
pub use capsule::{ParsedSource, RawExport, RawImport, RawSymbol, SourceFile, build_capsule, compute_content_hash};
pub use config::{AiConfig, AliasRule, CacheConfig, EnrichConfig, GroveConfig, ResolverConfig, ScanConfig};
pub use error::{GroveError, Result};
pub use events::{GraphEvent, Phase};
pub use graph::{Graph, SharedGraph};
pub use model::*;
pub use query::{GraphStats, Neighbor, NeighborhoodQuery, QueryEngine, Relation};
pub use resolver::{ImportResolver, Resolution, normalize_path};
pub use symbols::{SymbolHit, SymbolIndex};
