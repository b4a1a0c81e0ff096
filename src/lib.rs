//! Summa: Adaptive Batch Summarization
//!
//! Turns many short texts into one-sentence summaries by packing them into
//! size-bounded batches, sending each batch to a text-generation backend in
//! a single call, and retrying only the items whose summaries came back
//! missing or unusable.

pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod planner;
pub mod processor;
pub mod prompt;
pub mod provider;
pub mod summary;
pub mod types;

pub use error::{ApiError, ConfigError, ParseError};
pub use gate::{summarize_pending, GatePolicy, MemoryStore, ProgressTracker, QualityGate, SummaryStore};
pub use pipeline::{BatchStream, SummaryPipeline};
pub use planner::{Batch, BatchPlanner};
pub use types::{BatchResult, FailureReason, Item, ItemId, Outcome};
