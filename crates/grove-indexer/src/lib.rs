//! File discovery and TypeScript/JavaScript metadata extraction

pub mod coordinator;
pub mod languages;
pub mod scanner;


pub use coordinator::{GraphSource, build_capsules, canonical_root, index_workspace, load_or_index};
pub use languages::{Grammar, parse_source};
pub use scanner::{ScanOutput, Scanner};
