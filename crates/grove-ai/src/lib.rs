//! Analysis client for Grove
//!
//! Turns capsule material into prompts, sends them to an LLM provider, and
//! validates what comes back into summaries, structure breakdowns, and risk
//! records. An offline heuristic analyzer covers demos and tests.

pub mod bridge;
pub mod parse;
pub mod prompt;
pub mod providers;


pub use bridge::*;
pub use providers::{CompletionRequest, LlmProvider, create_analyzer};
pub use providers::local::LocalAnalyzer;
