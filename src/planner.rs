//! Batch planning: splits ordered items into size-bounded batches.
//!
//! Batch sizes ramp up from a small first batch so that backend or prompt
//! problems surface before large token budgets are committed. Every batch
//! respects both an item-count cap and a character budget, except a single
//! oversized item, which always forms a batch of its own.

use crate::config::PipelineSettings;
use crate::types::{Item, ItemId};
use serde::{Deserialize, Serialize};

/// How target batch sizes grow from one batch to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RampGrowth {
    /// next = floor(previous * factor)
    Geometric { factor: f64 },
    /// next = previous + step
    Linear { step: usize },
}

impl RampGrowth {
    fn next(&self, previous: usize) -> usize {
        match *self {
            RampGrowth::Geometric { factor } => (previous as f64 * factor).floor() as usize,
            RampGrowth::Linear { step } => previous.saturating_add(step),
        }
    }
}

/// Ramp-up sizing policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RampPolicy {
    #[serde(default = "default_ramp_initial")]
    pub initial: usize,
    #[serde(default = "default_ramp_growth")]
    pub growth: RampGrowth,
}

fn default_ramp_initial() -> usize {
    10
}

fn default_ramp_growth() -> RampGrowth {
    RampGrowth::Geometric { factor: 1.5 }
}

impl Default for RampPolicy {
    fn default() -> Self {
        Self {
            initial: default_ramp_initial(),
            growth: default_ramp_growth(),
        }
    }
}

impl RampPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.initial == 0 {
            return Err("ramp.initial must be at least 1".to_string());
        }
        match self.growth {
            RampGrowth::Geometric { factor } if !(factor.is_finite() && factor >= 1.0) => Err(
                format!("ramp growth factor must be >= 1.0, got {}", factor),
            ),
            _ => Ok(()),
        }
    }
}

/// An ordered, non-empty group of items sent to the backend in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    index: usize,
    items: Vec<Item>,
}

impl Batch {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items.iter().map(|item| &item.id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of text length plus per-item overhead.
    pub fn char_weight(&self, item_overhead: usize) -> usize {
        self.items
            .iter()
            .map(|item| item.char_len() + item_overhead)
            .sum()
    }
}

/// Splits items into batches under dual count/character constraints.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    max_items: usize,
    max_chars: usize,
    item_overhead: usize,
    ramp: RampPolicy,
}

impl BatchPlanner {
    pub fn new(max_items: usize, max_chars: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            max_chars,
            item_overhead: PipelineSettings::DEFAULT_ITEM_OVERHEAD_CHARS,
            ramp: RampPolicy::default(),
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.max_items_per_batch, settings.max_batch_chars)
            .with_item_overhead(settings.item_overhead_chars)
            .with_ramp(settings.ramp)
    }

    pub fn with_item_overhead(mut self, item_overhead: usize) -> Self {
        self.item_overhead = item_overhead;
        self
    }

    pub fn with_ramp(mut self, ramp: RampPolicy) -> Self {
        self.ramp = ramp;
        self
    }

    pub fn item_overhead(&self) -> usize {
        self.item_overhead
    }

    /// Target sizes for `total` items; the last target is clamped to the remainder.
    pub fn target_sizes(&self, total: usize) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut covered = 0usize;
        let mut next = self.ramp.initial.clamp(1, self.max_items);

        while covered < total {
            let size = next.min(total - covered);
            sizes.push(size);
            covered += size;

            next = self.ramp.growth.next(next).clamp(1, self.max_items);
            if covered < total && covered + next > total {
                sizes.push(total - covered);
                covered = total;
            }
        }
        sizes
    }

    /// Plan batches over `items`, preserving order within and across batches.
    pub fn plan(&self, items: &[Item]) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut cursor = 0usize;

        for target in self.target_sizes(items.len()) {
            let taken = self.pack(items, cursor, target.min(self.max_items));
            if taken > 0 {
                self.push_batch(&mut batches, &items[cursor..cursor + taken]);
                cursor += taken;
            }
        }

        // Items left behind by early character-budget closes.
        while cursor < items.len() {
            let taken = self.pack(items, cursor, self.max_items);
            self.push_batch(&mut batches, &items[cursor..cursor + taken]);
            cursor += taken;
        }

        batches
    }

    /// Number of batches [`plan`](Self::plan) would produce, without copying items.
    pub fn batch_count(&self, items: &[Item]) -> usize {
        let mut count = 0usize;
        let mut cursor = 0usize;
        for target in self.target_sizes(items.len()) {
            let taken = self.pack(items, cursor, target.min(self.max_items));
            if taken > 0 {
                count += 1;
                cursor += taken;
            }
        }
        while cursor < items.len() {
            cursor += self.pack(items, cursor, self.max_items);
            count += 1;
        }
        count
    }

    /// Number of items from `start` that fit into one batch of at most `limit` items.
    /// Always takes at least one item when any remain.
    fn pack(&self, items: &[Item], start: usize, limit: usize) -> usize {
        let mut count = 0usize;
        let mut chars = 0usize;
        for item in items.iter().skip(start) {
            if count >= limit {
                break;
            }
            let weight = item.char_len() + self.item_overhead;
            if count > 0 && chars + weight > self.max_chars {
                break;
            }
            chars += weight;
            count += 1;
        }
        count
    }

    fn push_batch(&self, batches: &mut Vec<Batch>, items: &[Item]) {
        batches.push(Batch {
            index: batches.len(),
            items: items.to_vec(),
        });
    }
}

impl Default for BatchPlanner {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
    }
}
