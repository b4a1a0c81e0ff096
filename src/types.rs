//! Core data types shared by the planner, processor and pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque item identifier supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single text to summarize. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub text: String,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Character length of the text (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Why an item has no accepted summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Seeded before the first attempt; survives only if no attempt touched the item.
    NotAttempted,
    /// The backend returned an entry but it failed the quality check.
    InvalidSummary,
    /// The backend returned fewer entries than requested.
    NoSummary,
    /// The final attempt failed at the transport or parse layer.
    Backend(String),
}

impl FailureReason {
    const NOT_ATTEMPTED: &'static str = "Failed after all retry attempts";
    const INVALID_SUMMARY: &'static str = "Empty or invalid summary";
    const NO_SUMMARY: &'static str = "No summary generated";

    pub fn from_message(message: &str) -> Self {
        match message {
            Self::NOT_ATTEMPTED => FailureReason::NotAttempted,
            Self::INVALID_SUMMARY => FailureReason::InvalidSummary,
            Self::NO_SUMMARY => FailureReason::NoSummary,
            other => FailureReason::Backend(other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotAttempted => f.write_str(Self::NOT_ATTEMPTED),
            FailureReason::InvalidSummary => f.write_str(Self::INVALID_SUMMARY),
            FailureReason::NoSummary => f.write_str(Self::NO_SUMMARY),
            FailureReason::Backend(message) => f.write_str(message),
        }
    }
}

/// Per-item result of summarization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "OutcomeRecord", from = "OutcomeRecord")]
pub enum Outcome {
    Success { summary: String },
    Failure { reason: FailureReason },
}

impl Outcome {
    pub fn success(summary: impl Into<String>) -> Self {
        Outcome::Success {
            summary: summary.into(),
        }
    }

    pub fn failure(reason: FailureReason) -> Self {
        Outcome::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn summary(&self) -> Option<&str> {
        match self {
            Outcome::Success { summary } => Some(summary),
            Outcome::Failure { .. } => None,
        }
    }
}

/// Wire shape: `{"ok": true, "summary": ...}` or `{"ok": false, "error": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Outcome> for OutcomeRecord {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success { summary } => OutcomeRecord {
                ok: true,
                summary: Some(summary),
                error: None,
            },
            Outcome::Failure { reason } => OutcomeRecord {
                ok: false,
                summary: None,
                error: Some(reason.to_string()),
            },
        }
    }
}

impl From<OutcomeRecord> for Outcome {
    fn from(record: OutcomeRecord) -> Self {
        match (record.ok, record.summary) {
            (true, Some(summary)) => Outcome::Success { summary },
            _ => Outcome::Failure {
                reason: record
                    .error
                    .as_deref()
                    .map(FailureReason::from_message)
                    .unwrap_or(FailureReason::NotAttempted),
            },
        }
    }
}

/// Outcomes for one planned batch, keyed by the original batch's item ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub batch_index: usize,
    order: Vec<ItemId>,
    outcomes: HashMap<ItemId, Outcome>,
}

impl BatchResult {
    /// Seed every id as `NotAttempted`.
    pub fn seeded(batch_index: usize, ids: impl IntoIterator<Item = ItemId>) -> Self {
        let order: Vec<ItemId> = ids.into_iter().collect();
        let outcomes = order
            .iter()
            .map(|id| (id.clone(), Outcome::failure(FailureReason::NotAttempted)))
            .collect();
        Self {
            batch_index,
            order,
            outcomes,
        }
    }

    /// Overwrite the outcome for an id that belongs to this batch.
    /// Returns false (and records nothing) for foreign ids.
    pub fn record(&mut self, id: &ItemId, outcome: Outcome) -> bool {
        match self.outcomes.get_mut(id) {
            Some(slot) => {
                *slot = outcome;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ItemId) -> Option<&Outcome> {
        self.outcomes.get(id)
    }

    /// Item ids in submission order.
    pub fn item_ids(&self) -> &[ItemId] {
        &self.order
    }

    /// Outcomes in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &Outcome)> {
        self.order
            .iter()
            .filter_map(move |id| self.outcomes.get(id).map(|outcome| (id, outcome)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    pub fn success_ratio(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.success_count() as f64 / self.len() as f64
        }
    }

    pub fn into_outcomes(self) -> HashMap<ItemId, Outcome> {
        self.outcomes
    }
}
