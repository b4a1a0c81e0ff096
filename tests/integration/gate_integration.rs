//! Integration tests for the quality gate over a store

use crate::integration::test_utils::{numbered_items, StubClient};
use async_trait::async_trait;
use std::sync::Arc;
use summa::error::ApiError;
use summa::config::PipelineSettings;
use summa::gate::{
    summarize_pending, GatePolicy, ItemStatus, MemoryStore, ProgressTracker, QualityGate,
    SummaryStore, WITHHELD_REASON,
};
use summa::pipeline::SummaryPipeline;
use summa::types::{Item, ItemId};

fn pipeline(client: Arc<StubClient>) -> SummaryPipeline {
    let settings = PipelineSettings {
        backoff_base_ms: 1,
        ..PipelineSettings::default()
    };
    SummaryPipeline::new(client, &settings)
}

#[tokio::test]
async fn test_accepted_batches_are_persisted() {
    let store = MemoryStore::new(numbered_items(25));
    let progress = ProgressTracker::default();
    let client = Arc::new(StubClient::with_bad(&["c4"]));

    let report = summarize_pending(&pipeline(client), &store, &QualityGate::default(), &progress)
        .await
        .unwrap();

    assert_eq!(report.total, 25);
    assert_eq!(report.persisted, 24);
    assert_eq!(report.failed, 1);
    assert_eq!(report.withheld_batches, 0);
    assert_eq!(progress.percent(), 100);
    assert!(matches!(
        store.status(&ItemId::from("c4")),
        Some(ItemStatus::Failed { .. })
    ));
    assert_eq!(
        store.status(&ItemId::from("c0")),
        Some(ItemStatus::Summarized {
            summary: "Summary of item c0.".to_string()
        })
    );
}

#[tokio::test]
async fn test_withheld_batch_persists_nothing_then_recovers() {
    // Three bad items in the first batch of ten keep it below 0.9.
    let items = numbered_items(10);
    let store = MemoryStore::new(items);
    let progress = ProgressTracker::default();
    let gate = QualityGate::default();

    let failing = Arc::new(StubClient::with_bad(&["c1", "c2", "c3"]));
    let report = summarize_pending(&pipeline(failing), &store, &gate, &progress)
        .await
        .unwrap();

    assert_eq!(report.withheld_batches, 1);
    assert_eq!(report.withheld_items, 10);
    assert_eq!(report.persisted, 0);
    assert_eq!(progress.percent(), 100);
    assert_eq!(
        store.status(&ItemId::from("c0")),
        Some(ItemStatus::Failed {
            reason: WITHHELD_REASON.to_string()
        })
    );

    assert_eq!(store.reset_failed().await.unwrap(), 10);
    let healthy = Arc::new(StubClient::default());
    let report = summarize_pending(&pipeline(healthy), &store, &gate, &progress)
        .await
        .unwrap();

    assert_eq!(report.persisted, 10);
    assert!(store.pending_items().await.unwrap().is_empty());
    assert!(store
        .snapshot()
        .iter()
        .all(|(_, status)| matches!(status, ItemStatus::Summarized { .. })));
}

#[tokio::test]
async fn test_persist_successes_policy_keeps_good_summaries() {
    let store = MemoryStore::new(numbered_items(10));
    let gate = QualityGate::new(0.9, GatePolicy::PersistSuccesses);
    let client = Arc::new(StubClient::with_bad(&["c1", "c2", "c3"]));

    let report = summarize_pending(&pipeline(client), &store, &gate, &ProgressTracker::default())
        .await
        .unwrap();

    assert_eq!(report.withheld_batches, 1);
    assert_eq!(report.persisted, 7);
    assert_eq!(report.withheld_items, 3);
    assert!(matches!(
        store.status(&ItemId::from("c0")),
        Some(ItemStatus::Summarized { .. })
    ));
    assert_eq!(
        store.status(&ItemId::from("c2")),
        Some(ItemStatus::Failed {
            reason: WITHHELD_REASON.to_string()
        })
    );
}

#[tokio::test]
async fn test_empty_store_is_complete() {
    let store = MemoryStore::default();
    let progress = ProgressTracker::new(5);
    let client = Arc::new(StubClient::default());

    let report = summarize_pending(&pipeline(client.clone()), &store, &QualityGate::default(), &progress)
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert_eq!(progress.percent(), 100);
    assert!(client.calls().is_empty());
}

/// Store whose `persist_summary` fails for one id.
struct FailingStore {
    inner: MemoryStore,
    broken: ItemId,
}

#[async_trait]
impl SummaryStore for FailingStore {
    async fn pending_items(&self) -> Result<Vec<Item>, ApiError> {
        self.inner.pending_items().await
    }

    async fn persist_summary(&self, id: &ItemId, summary: &str) -> Result<(), ApiError> {
        if *id == self.broken {
            return Err(ApiError::Storage(format!("write failed for {}", id)));
        }
        self.inner.persist_summary(id, summary).await
    }

    async fn mark_failed(&self, id: &ItemId, reason: &str) -> Result<(), ApiError> {
        self.inner.mark_failed(id, reason).await
    }

    async fn reset_failed(&self) -> Result<usize, ApiError> {
        self.inner.reset_failed().await
    }
}

#[tokio::test]
async fn test_store_error_still_marks_withheld_items() {
    // One worker: the withheld first batch arrives before the failing write in the second.
    let settings = PipelineSettings {
        backoff_base_ms: 1,
        concurrency: 1,
        ..PipelineSettings::default()
    };
    let client = Arc::new(StubClient::with_bad(&["c1", "c2", "c3"]));
    let pipeline = SummaryPipeline::new(client, &settings);
    let store = FailingStore {
        inner: MemoryStore::new(numbered_items(25)),
        broken: ItemId::from("c12"),
    };

    let err = summarize_pending(&pipeline, &store, &QualityGate::default(), &ProgressTracker::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Storage(_)));
    for i in 0..10 {
        assert_eq!(
            store.inner.status(&ItemId::from(format!("c{i}"))),
            Some(ItemStatus::Failed {
                reason: WITHHELD_REASON.to_string()
            }),
            "item c{i}"
        );
    }
    assert_eq!(
        store.inner.status(&ItemId::from("c12")),
        Some(ItemStatus::Pending)
    );
}
