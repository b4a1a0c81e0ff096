//! Per-batch retry state machine.
//!
//! `Pending(remaining, attempt) -> Resolved | Exhausted`. [`BatchMachine::step`]
//! consumes one backend response and is free of I/O; the async driver in
//! [`super::BatchProcessor`] supplies responses and sleeps for backoff.

use crate::config::PipelineSettings;
use crate::error::ApiError;
use crate::parser::parse_entries;
use crate::planner::Batch;
use crate::summary::SummaryPolicy;
use crate::types::{BatchResult, FailureReason, Item, Outcome};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Limits and acceptance rules for one batch's attempt loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryRules {
    pub max_attempts: u32,
    pub success_threshold: f64,
    pub backoff_base: Duration,
    pub summary: SummaryPolicy,
}

impl RetryRules {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            success_threshold: settings.success_threshold,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            summary: SummaryPolicy::from_settings(settings),
        }
    }

    /// Delay before retrying after failed attempt `attempt` (0-based): base * 2^attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryRules {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchState {
    /// Items still to be summarized on attempt `attempt` (0-based).
    Pending {
        remaining: Vec<Item>,
        attempt: u32,
        /// Wait before issuing this attempt.
        backoff: Option<Duration>,
    },
    /// Success ratio met the threshold.
    Resolved,
    /// Attempts ran out below the threshold.
    Exhausted,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchState::Pending { .. })
    }
}

/// A batch's outcome map plus its retry state.
#[derive(Debug, Clone)]
pub struct BatchMachine {
    result: BatchResult,
    state: BatchState,
}

impl BatchMachine {
    pub fn new(batch: &Batch) -> Self {
        let result = BatchResult::seeded(batch.index(), batch.ids().cloned());
        let state = if batch.is_empty() {
            BatchState::Resolved
        } else {
            BatchState::Pending {
                remaining: batch.items().to_vec(),
                attempt: 0,
                backoff: None,
            }
        };
        Self { result, state }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn result(&self) -> &BatchResult {
        &self.result
    }

    pub fn into_result(self) -> BatchResult {
        self.result
    }

    /// Apply one backend response to the pending state. Terminal states are returned unchanged.
    pub fn step(mut self, response: Result<String, ApiError>, rules: &RetryRules) -> Self {
        let (remaining, attempt) = match std::mem::replace(&mut self.state, BatchState::Exhausted) {
            BatchState::Pending {
                remaining, attempt, ..
            } => (remaining, attempt),
            terminal => {
                self.state = terminal;
                return self;
            }
        };

        let entries = response.and_then(|raw| parse_entries(&raw).map_err(ApiError::from));
        self.state = match entries {
            Ok(entries) => self.apply_entries(remaining, attempt, entries, rules),
            Err(err) => self.apply_failure(remaining, attempt, err, rules),
        };
        self
    }

    fn apply_entries(
        &mut self,
        remaining: Vec<Item>,
        attempt: u32,
        entries: Vec<crate::parser::RawEntry>,
        rules: &RetryRules,
    ) -> BatchState {
        let batch_index = self.result.batch_index;
        let requested = remaining.len();
        if entries.len() != requested {
            debug!(
                batch_index,
                requested,
                returned = entries.len(),
                "Entry count mismatch"
            );
        }

        let mut entries = entries.into_iter();
        let mut failed = Vec::new();
        let mut successes = 0usize;

        // Entry i belongs to remaining[i]; echoed ids are never trusted.
        for item in remaining {
            let outcome = match entries.next() {
                Some(entry) => {
                    if let Some(echoed) = entry.echoed_id() {
                        if echoed != item.id.as_str() {
                            debug!(batch_index, expected = %item.id, echoed, "Echoed id differs");
                        }
                    }
                    match rules.summary.accept(&entry.summary_text()) {
                        Some(summary) => Outcome::success(summary),
                        None => Outcome::failure(FailureReason::InvalidSummary),
                    }
                }
                None => Outcome::failure(FailureReason::NoSummary),
            };

            let succeeded = outcome.is_success();
            if succeeded {
                successes += 1;
            }
            self.result.record(&item.id, outcome);
            if !succeeded {
                failed.push(item);
            }
        }

        let ratio = successes as f64 / requested as f64;
        info!(
            batch_index,
            attempt = attempt + 1,
            successes,
            requested,
            ratio,
            "Attempt finished"
        );

        if ratio >= rules.success_threshold {
            BatchState::Resolved
        } else if attempt + 1 >= rules.max_attempts {
            warn!(
                batch_index,
                unresolved = failed.len(),
                "Attempts exhausted below success threshold"
            );
            BatchState::Exhausted
        } else {
            debug!(batch_index, retrying = failed.len(), "Retrying failed subset");
            BatchState::Pending {
                remaining: failed,
                attempt: attempt + 1,
                backoff: None,
            }
        }
    }

    fn apply_failure(
        &mut self,
        remaining: Vec<Item>,
        attempt: u32,
        err: ApiError,
        rules: &RetryRules,
    ) -> BatchState {
        let batch_index = self.result.batch_index;
        warn!(
            batch_index,
            attempt = attempt + 1,
            transient = err.is_transient(),
            error = %err,
            "Attempt failed"
        );

        if attempt + 1 >= rules.max_attempts {
            let reason = format!("Failed after {} attempts: {}", rules.max_attempts, err);
            for item in &remaining {
                self.result
                    .record(&item.id, Outcome::failure(FailureReason::Backend(reason.clone())));
            }
            return BatchState::Exhausted;
        }

        BatchState::Pending {
            remaining,
            attempt: attempt + 1,
            backoff: Some(rules.backoff_for(attempt)),
        }
    }
}
