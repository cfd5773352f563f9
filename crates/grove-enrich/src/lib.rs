//! Background enrichment for the Grove graph
//!
//! Layers file summaries, directory summaries, a project overview, structure
//! breakdowns, and per-block risk findings onto an assembled graph while the
//! graph stays queryable.

pub mod error;
pub mod queue;
pub mod scheduler;

#[cfg(test)]
pub mod tests;

pub use error::EnrichError;
pub use queue::{Batch, EnrichKey, ItemState, WorkQueue};
pub use scheduler::{EVENT_CAPACITY, EnrichReport, Scheduler};
