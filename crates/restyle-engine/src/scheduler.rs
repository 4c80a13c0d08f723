//! Adaptive Batch Scheduler
//!
//! Partitions the target list into batches whose size reacts to observed
//! outcomes: any failure drops straight to the minimum size, and a streak of
//! clean batches grows it again one step at a time.
//!
//! Items of a batch are driven together on the current task (fan-out equal to
//! the batch size); the batch settles completely before the size adapts and
//! the next batch starts.

use crate::cancel::CancellationFlag;
use futures::future::join_all;
use futures::stream::{self, Stream};
use restyle_core::{BatchConfig, BatchOutcome, FailureRecord, NodeId};
use std::future::Future;
use tokio::time::Instant;

/// Result of running the operation on one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    /// Item migrated
    Succeeded,
    /// Item failed after retries
    Failed(FailureRecord),
    /// Cancellation observed before the item started
    Skipped,
}

/// A unit of work handed to the operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based batch number
    pub number: usize,
    /// Items in submission order
    pub items: Vec<NodeId>,
    /// Number of items
    pub size: usize,
}

/// Batch size adaptation rule
#[derive(Debug, Clone)]
pub struct BatchSizer {
    config: BatchConfig,
    current: usize,
    consecutive_successes: u32,
}

impl BatchSizer {
    /// Start at the configured initial size
    #[must_use]
    pub fn new(config: BatchConfig) -> Self {
        Self {
            current: config.initial_size.clamp(config.min_size, config.max_size),
            consecutive_successes: 0,
            config,
        }
    }

    /// Size of the next batch
    #[inline]
    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Clean batches since the last failure or growth step
    #[inline]
    #[must_use]
    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    /// Feed back the outcome of a batch
    pub fn record(&mut self, had_failures: bool) {
        if had_failures {
            self.current = self.config.min_size;
            self.consecutive_successes = 0;
            return;
        }

        self.consecutive_successes += 1;
        if self.consecutive_successes >= self.config.growth_threshold {
            self.current = (self.current + self.config.growth_step).min(self.config.max_size);
            self.consecutive_successes = 0;
        }
    }
}

struct RunState<F> {
    items: Vec<NodeId>,
    cursor: usize,
    batch_number: usize,
    sizer: BatchSizer,
    cancel: CancellationFlag,
    operation: F,
}

/// Adaptive batch scheduler
#[derive(Debug, Clone, Default)]
pub struct AdaptiveBatchScheduler {
    config: BatchConfig,
}

impl AdaptiveBatchScheduler {
    /// Create scheduler
    #[inline]
    #[must_use]
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Batch configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Drive `operation` over `items`, one batch per stream element
    ///
    /// The stream is lazy: nothing runs until it is polled, and each call
    /// starts from a fresh size state. It ends when every item was handed out
    /// or when cancellation is observed at a batch boundary. Items not started
    /// because of cancellation are reported as `skipped`.
    pub fn process_batches<'a, F, Fut>(
        &'a self,
        items: Vec<NodeId>,
        cancel: CancellationFlag,
        operation: F,
    ) -> impl Stream<Item = BatchOutcome> + 'a
    where
        F: Fn(NodeId) -> Fut + 'a,
        Fut: Future<Output = ItemResult> + 'a,
    {
        let state = RunState {
            items,
            cursor: 0,
            batch_number: 0,
            sizer: BatchSizer::new(self.config),
            cancel,
            operation,
        };

        stream::unfold(state, |mut st| async move {
            if st.cursor >= st.items.len() || st.cancel.is_cancelled() {
                return None;
            }
            if st.batch_number > 0 {
                tokio::task::yield_now().await;
            }

            let end = (st.cursor + st.sizer.current()).min(st.items.len());
            st.batch_number += 1;
            let batch = Batch {
                number: st.batch_number,
                items: st.items[st.cursor..end].to_vec(),
                size: end - st.cursor,
            };
            st.cursor = end;

            let outcome = run_batch(&st, batch).await;
            st.sizer.record(outcome.failed > 0);

            let next = st.sizer.current();
            let remaining = st.items.len() - st.cursor;
            let outcome = BatchOutcome {
                next_batch_size: next,
                estimated_total_batches: st.batch_number + remaining.div_ceil(next),
                ..outcome
            };
            tracing::debug!(
                batch = outcome.batch_number,
                size = outcome.size,
                failed = outcome.failed,
                skipped = outcome.skipped,
                next_size = next,
                "batch settled"
            );
            Some((outcome, st))
        })
    }
}

async fn run_batch<F, Fut>(st: &RunState<F>, batch: Batch) -> BatchOutcome
where
    F: Fn(NodeId) -> Fut,
    Fut: Future<Output = ItemResult>,
{
    let started = Instant::now();
    let operation = &st.operation;
    let cancel = &st.cancel;

    let results = join_all(batch.items.iter().map(|id| async move {
        if cancel.is_cancelled() {
            ItemResult::Skipped
        } else {
            operation(id.clone()).await
        }
    }))
    .await;

    let mut outcome = BatchOutcome {
        batch_number: batch.number,
        size: batch.size,
        succeeded: 0,
        failed: 0,
        skipped: 0,
        failures: Vec::new(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        next_batch_size: 0,
        estimated_total_batches: 0,
    };
    for result in results {
        match result {
            ItemResult::Succeeded => outcome.succeeded += 1,
            ItemResult::Failed(record) => {
                outcome.failed += 1;
                outcome.failures.push(record);
            }
            ItemResult::Skipped => outcome.skipped += 1,
        }
    }
    outcome
}
