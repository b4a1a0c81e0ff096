//! Caller-side quality gate and storage contract.
//!
//! A completed batch is written back to the store only when its success
//! ratio meets the gate threshold. Items of withheld batches are marked
//! failed at the end of the pass so a later [`SummaryStore::reset_failed`]
//! can queue them again.

use crate::config::PipelineSettings;
use crate::error::ApiError;
use crate::pipeline::{BatchStream, SummaryPipeline};
use crate::types::{BatchResult, Item, ItemId, Outcome};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Reason recorded for items whose batch never met the threshold.
pub const WITHHELD_REASON: &str = "Batch below success threshold";

/// Narrow persistence contract used by [`summarize_pending`].
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Items still waiting for a summary, in stable order.
    async fn pending_items(&self) -> Result<Vec<Item>, ApiError>;

    async fn persist_summary(&self, id: &ItemId, summary: &str) -> Result<(), ApiError>;

    async fn mark_failed(&self, id: &ItemId, reason: &str) -> Result<(), ApiError>;

    /// Move every failed item back to pending. Returns how many moved.
    async fn reset_failed(&self) -> Result<usize, ApiError>;
}

/// Stored state of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Summarized { summary: String },
    Failed { reason: String },
}

/// In-process [`SummaryStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<(Item, ItemStatus)>>,
}

impl MemoryStore {
    pub fn new(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            records: RwLock::new(
                items
                    .into_iter()
                    .map(|item| (item, ItemStatus::Pending))
                    .collect(),
            ),
        }
    }

    pub fn status(&self, id: &ItemId) -> Option<ItemStatus> {
        self.records
            .read()
            .iter()
            .find(|(item, _)| &item.id == id)
            .map(|(_, status)| status.clone())
    }

    /// Every item with its current status, in insertion order.
    pub fn snapshot(&self) -> Vec<(ItemId, ItemStatus)> {
        self.records
            .read()
            .iter()
            .map(|(item, status)| (item.id.clone(), status.clone()))
            .collect()
    }

    fn set_status(&self, id: &ItemId, status: ItemStatus) -> Result<(), ApiError> {
        let mut records = self.records.write();
        let slot = records
            .iter_mut()
            .find(|(item, _)| &item.id == id)
            .ok_or_else(|| ApiError::Storage(format!("unknown item {}", id)))?;
        slot.1 = status;
        Ok(())
    }
}

#[async_trait]
impl SummaryStore for MemoryStore {
    async fn pending_items(&self) -> Result<Vec<Item>, ApiError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(_, status)| *status == ItemStatus::Pending)
            .map(|(item, _)| item.clone())
            .collect())
    }

    async fn persist_summary(&self, id: &ItemId, summary: &str) -> Result<(), ApiError> {
        self.set_status(
            id,
            ItemStatus::Summarized {
                summary: summary.to_string(),
            },
        )
    }

    async fn mark_failed(&self, id: &ItemId, reason: &str) -> Result<(), ApiError> {
        self.set_status(
            id,
            ItemStatus::Failed {
                reason: reason.to_string(),
            },
        )
    }

    async fn reset_failed(&self) -> Result<usize, ApiError> {
        let mut records = self.records.write();
        let mut reset = 0usize;
        for (_, status) in records.iter_mut() {
            if matches!(status, ItemStatus::Failed { .. }) {
                *status = ItemStatus::Pending;
                reset += 1;
            }
        }
        Ok(reset)
    }
}

/// What to do with a batch whose success ratio is below the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Persist nothing from the batch on this pass.
    #[default]
    WithholdBatch,
    /// Persist the batch's successes; leave its failures for a later pass.
    PersistSuccesses,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    pub threshold: f64,
    pub policy: GatePolicy,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            threshold: PipelineSettings::DEFAULT_SUCCESS_THRESHOLD,
            policy: GatePolicy::default(),
        }
    }
}

impl QualityGate {
    pub fn new(threshold: f64, policy: GatePolicy) -> Self {
        Self { threshold, policy }
    }

    pub fn accepts(&self, result: &BatchResult) -> bool {
        !result.is_empty() && result.success_ratio() >= self.threshold
    }
}

/// Completed-item counter with an integer-floor percentage.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: AtomicUsize,
    completed: AtomicUsize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total: AtomicUsize::new(total),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn reset(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
    }

    /// Record `count` more completed items; returns the new percentage.
    pub fn advance(&self, count: usize) -> u8 {
        self.completed.fetch_add(count, Ordering::SeqCst);
        self.percent()
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// floor(completed * 100 / total), capped at 100. An empty run is complete.
    pub fn percent(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 100;
        }
        let completed = self.completed().min(total);
        (completed * 100 / total) as u8
    }
}

/// Totals for one [`summarize_pending`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub total: usize,
    pub persisted: usize,
    pub failed: usize,
    pub withheld_batches: usize,
    pub withheld_items: usize,
}

/// Summarize every pending item in `store`, persisting batches the gate accepts.
pub async fn summarize_pending(
    pipeline: &SummaryPipeline,
    store: &dyn SummaryStore,
    gate: &QualityGate,
    progress: &ProgressTracker,
) -> Result<GateReport, ApiError> {
    let items = store.pending_items().await?;
    progress.reset(items.len());
    let mut report = GateReport {
        total: items.len(),
        ..GateReport::default()
    };
    if items.is_empty() {
        return Ok(report);
    }

    let mut withheld: Vec<ItemId> = Vec::new();
    let mut stream = pipeline.run_streaming(&items)?;
    let drained = drain_results(&mut stream, store, gate, progress, &mut report, &mut withheld).await;

    report.withheld_items = withheld.len();
    if let Err(err) = drained {
        // Withheld items must not stay pending after an aborted pass.
        for id in &withheld {
            if let Err(mark_err) = store.mark_failed(id, WITHHELD_REASON).await {
                warn!(item_id = %id, error = %mark_err, "Failed to mark withheld item");
            }
        }
        return Err(err);
    }

    for id in &withheld {
        store.mark_failed(id, WITHHELD_REASON).await?;
    }
    // Withheld items are settled for this pass.
    progress.advance(withheld.len());

    info!(
        total = report.total,
        persisted = report.persisted,
        failed = report.failed,
        withheld_items = report.withheld_items,
        percent = progress.percent(),
        "Summarization pass finished"
    );
    Ok(report)
}

/// Write back every completed batch, collecting ids the gate withholds.
async fn drain_results(
    stream: &mut BatchStream,
    store: &dyn SummaryStore,
    gate: &QualityGate,
    progress: &ProgressTracker,
    report: &mut GateReport,
    withheld: &mut Vec<ItemId>,
) -> Result<(), ApiError> {
    while let Some(result) = stream.next().await {
        if gate.accepts(&result) {
            for (id, outcome) in result.iter() {
                match outcome {
                    Outcome::Success { summary } => {
                        store.persist_summary(id, summary).await?;
                        report.persisted += 1;
                    }
                    Outcome::Failure { reason } => {
                        store.mark_failed(id, &reason.to_string()).await?;
                        report.failed += 1;
                    }
                }
            }
            let percent = progress.advance(result.len());
            info!(
                batch_index = result.batch_index,
                ratio = result.success_ratio(),
                percent,
                "Batch accepted"
            );
            continue;
        }

        report.withheld_batches += 1;
        warn!(
            batch_index = result.batch_index,
            ratio = result.success_ratio(),
            threshold = gate.threshold,
            policy = ?gate.policy,
            "Batch below threshold"
        );

        for (id, outcome) in result.iter() {
            match (gate.policy, outcome) {
                (GatePolicy::PersistSuccesses, Outcome::Success { summary }) => {
                    store.persist_summary(id, summary).await?;
                    report.persisted += 1;
                    progress.advance(1);
                }
                _ => withheld.push(id.clone()),
            }
        }
    }
    Ok(())
}
