//! CLI domain: parse, route, input, output and presentation only.
//! Orchestration lives in the pipeline and gate modules.

mod input;
mod output;
mod parse;
mod presentation;
mod route;

pub use input::{load_items, write_outcomes};
pub use output::map_error;
pub use parse::{Cli, Commands, ProviderCommands};
pub use presentation::{format_provider_status_table, format_run_summary, RunSummary};
pub use route::RunContext;
