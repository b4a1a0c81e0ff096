//! Batch Processor
//!
//! Runs one batch to completion against a backend: prompt, dispatch, parse,
//! positional correlation, quality check and a bounded retry loop over the
//! failed subset. Never fails; every original id ends with exactly one outcome.

use crate::config::PipelineSettings;
use crate::planner::Batch;
use crate::prompt::render_batch_prompt;
use crate::provider::ModelProviderClient;
use crate::types::BatchResult;
use std::sync::Arc;
use tracing::{debug, info};

mod state;

pub use state::{BatchMachine, BatchState, RetryRules};

/// Drives [`BatchMachine`] with a shared backend client.
#[derive(Clone)]
pub struct BatchProcessor {
    client: Arc<dyn ModelProviderClient>,
    rules: RetryRules,
}

impl BatchProcessor {
    pub fn new(client: Arc<dyn ModelProviderClient>, rules: RetryRules) -> Self {
        Self { client, rules }
    }

    pub fn from_settings(client: Arc<dyn ModelProviderClient>, settings: &PipelineSettings) -> Self {
        Self::new(client, RetryRules::from_settings(settings))
    }

    pub fn rules(&self) -> &RetryRules {
        &self.rules
    }

    pub fn client(&self) -> &Arc<dyn ModelProviderClient> {
        &self.client
    }

    pub async fn process(&self, batch: &Batch) -> BatchResult {
        info!(
            batch_index = batch.index(),
            batch_size = batch.len(),
            provider = self.client.provider_name(),
            model = self.client.model_name(),
            "Processing batch"
        );

        let mut machine = BatchMachine::new(batch);
        loop {
            let (prompt, backoff) = match machine.state() {
                BatchState::Pending {
                    remaining,
                    attempt,
                    backoff,
                } => {
                    debug!(
                        batch_index = batch.index(),
                        attempt = attempt + 1,
                        remaining = remaining.len(),
                        "Dispatching attempt"
                    );
                    (render_batch_prompt(remaining), *backoff)
                }
                BatchState::Resolved | BatchState::Exhausted => break,
            };

            if let Some(delay) = backoff {
                debug!(batch_index = batch.index(), delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
            }

            let response = self.client.generate(&prompt).await;
            machine = machine.step(response, &self.rules);
        }

        let resolved = matches!(machine.state(), BatchState::Resolved);
        let result = machine.into_result();
        info!(
            batch_index = result.batch_index,
            resolved,
            successes = result.success_count(),
            failures = result.failure_count(),
            ratio = result.success_ratio(),
            "Batch finished"
        );
        result
    }
}
