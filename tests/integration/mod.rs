//! Integration tests for the summarization pipeline

mod cli_run;
mod gate_integration;
mod model_providers;
mod test_utils;
