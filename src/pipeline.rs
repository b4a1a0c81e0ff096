//! Pipeline Orchestrator
//!
//! Plans batches and fans them out across a bounded pool of workers sharing
//! one backend client. Results are available either collected into a single
//! mapping ([`SummaryPipeline::run_all`]) or as a stream of per-batch results
//! in completion order ([`SummaryPipeline::run_streaming`]).

use crate::config::PipelineSettings;
use crate::error::ApiError;
use crate::planner::{Batch, BatchPlanner};
use crate::processor::{BatchProcessor, RetryRules};
use crate::provider::ModelProviderClient;
use crate::types::{BatchResult, Item, ItemId, Outcome};
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info};

pub struct SummaryPipeline {
    planner: BatchPlanner,
    processor: BatchProcessor,
    concurrency: usize,
}

impl SummaryPipeline {
    pub fn new(client: Arc<dyn ModelProviderClient>, settings: &PipelineSettings) -> Self {
        Self {
            planner: BatchPlanner::from_settings(settings),
            processor: BatchProcessor::from_settings(client, settings),
            concurrency: settings.concurrency.max(1),
        }
    }

    pub fn with_planner(mut self, planner: BatchPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_rules(mut self, rules: RetryRules) -> Self {
        self.processor = BatchProcessor::new(Arc::clone(self.processor.client()), rules);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn planner(&self) -> &BatchPlanner {
        &self.planner
    }

    pub fn processor(&self) -> &BatchProcessor {
        &self.processor
    }

    /// Summarize every item and return one outcome per id.
    ///
    /// Fails only on duplicate input ids or if batch results overlap or fall
    /// short of the input set, which would mean a planning bug.
    pub async fn run_all(&self, items: &[Item]) -> Result<HashMap<ItemId, Outcome>, ApiError> {
        let mut stream = self.run_streaming(items)?;
        let mut merged: HashMap<ItemId, Outcome> = HashMap::with_capacity(items.len());

        while let Some(result) = stream.next().await {
            for (id, outcome) in result.into_outcomes() {
                if merged.insert(id.clone(), outcome).is_some() {
                    return Err(ApiError::InvariantViolation(format!(
                        "item {} reported by more than one batch",
                        id
                    )));
                }
            }
        }

        if merged.len() != items.len() {
            return Err(ApiError::InvariantViolation(format!(
                "expected {} outcomes, collected {}",
                items.len(),
                merged.len()
            )));
        }
        Ok(merged)
    }

    /// Start processing and yield each batch result as it completes.
    ///
    /// Must be called within a tokio runtime. Dropping the stream early does
    /// not stop workers; batches already queued still run to completion.
    pub fn run_streaming(&self, items: &[Item]) -> Result<BatchStream, ApiError> {
        ensure_unique_ids(items)?;
        let batches = self.planner.plan(items);
        let batch_count = batches.len();
        let workers = self.concurrency.min(batch_count);
        info!(
            items = items.len(),
            batches = batch_count,
            workers,
            "Starting summarization run"
        );

        let (tx, rx) = mpsc::unbounded();
        let queue: Arc<Mutex<VecDeque<Batch>>> = Arc::new(Mutex::new(batches.into()));

        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let processor = self.processor.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    let next = queue.lock().pop_front();
                    let Some(batch) = next else { break };
                    let result = processor.process(&batch).await;
                    if tx.unbounded_send(result).is_err() {
                        debug!(worker, batch_index = batch.index(), "Result dropped: stream closed");
                    }
                }
                debug!(worker, "Worker finished");
            });
        }

        Ok(BatchStream {
            receiver: rx,
            total_items: items.len(),
            total_batches: batch_count,
            completed_items: 0,
            completed_batches: 0,
        })
    }
}

fn ensure_unique_ids(items: &[Item]) -> Result<(), ApiError> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(&item.id) {
            return Err(ApiError::DuplicateItem(item.id.clone()));
        }
    }
    Ok(())
}

/// Finite, single-pass stream of batch results in completion order.
pub struct BatchStream {
    receiver: UnboundedReceiver<BatchResult>,
    total_items: usize,
    total_batches: usize,
    completed_items: usize,
    completed_batches: usize,
}

impl BatchStream {
    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    pub fn completed_items(&self) -> usize {
        self.completed_items
    }

    pub fn completed_batches(&self) -> usize {
        self.completed_batches
    }
}

impl Stream for BatchStream {
    type Item = BatchResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.receiver.poll_next_unpin(cx);
        if let Poll::Ready(Some(result)) = &polled {
            let size = result.len();
            self.completed_items += size;
            self.completed_batches += 1;
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total_batches - self.completed_batches;
        (0, Some(left))
    }
}
