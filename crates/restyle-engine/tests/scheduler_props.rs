use futures::StreamExt;
use restyle_core::{BatchConfig, ErrorKind, FailureRecord, NodeId};
use restyle_engine::scheduler::{AdaptiveBatchScheduler, BatchSizer, ItemResult};
use restyle_engine::CancellationFlag;
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    #[test]
    fn prop_size_stays_within_bounds(outcomes in proptest::collection::vec(any::<bool>(), 0..200)) {
        let config = BatchConfig::default();
        let mut sizer = BatchSizer::new(config);
        for had_failures in outcomes {
            sizer.record(had_failures);
            prop_assert!(sizer.current() >= config.min_size);
            prop_assert!(sizer.current() <= config.max_size);
        }
    }

    #[test]
    fn prop_failure_resets_to_minimum(warmup in proptest::collection::vec(any::<bool>(), 0..50)) {
        let mut sizer = BatchSizer::new(BatchConfig::default());
        for had_failures in warmup {
            sizer.record(had_failures);
        }
        sizer.record(true);
        prop_assert_eq!(sizer.current(), 25);
        prop_assert_eq!(sizer.consecutive_successes(), 0);
    }

    #[test]
    fn prop_growth_needs_full_streak(streak in 0u32..5) {
        let mut sizer = BatchSizer::new(BatchConfig::default());
        sizer.record(true);
        for _ in 0..streak {
            sizer.record(false);
        }
        prop_assert_eq!(sizer.current(), 25);
        prop_assert_eq!(sizer.consecutive_successes(), streak);
    }

    #[test]
    fn prop_every_item_reported_once(
        total in 0usize..400,
        failing in proptest::collection::hash_set(0usize..400, 0..20),
    ) {
        let items: Vec<NodeId> = (0..total).map(|i| NodeId::new(format!("n{i}"))).collect();
        let bad: HashSet<NodeId> = failing.iter().map(|i| NodeId::new(format!("n{i}"))).collect();
        let scheduler = AdaptiveBatchScheduler::default();

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let outcomes: Vec<_> = runtime.block_on(
            scheduler
                .process_batches(items, CancellationFlag::new(), |id| {
                    let failed = bad.contains(&id);
                    async move {
                        if failed {
                            ItemResult::Failed(FailureRecord {
                                node_label: id.to_string(),
                                node_id: id,
                                error_kind: ErrorKind::Partial,
                                message: "locked".to_string(),
                                retry_count: 0,
                            })
                        } else {
                            ItemResult::Succeeded
                        }
                    }
                })
                .collect(),
        );

        let processed: usize = outcomes.iter().map(|o| o.processed()).sum();
        prop_assert_eq!(processed, total);
        for pair in outcomes.windows(2) {
            prop_assert_eq!(pair[1].size.min(pair[0].next_batch_size), pair[1].size);
            if pair[0].failed > 0 {
                prop_assert!(pair[1].size <= 25);
            }
        }
    }
}
