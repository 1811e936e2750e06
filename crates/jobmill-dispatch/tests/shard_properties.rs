//! Property tests for shard planning and requeue selection

mod common;

use common::units;
use jobmill_common::types::JobStatus;
use jobmill_dispatch::dispatch::requeue::{select_eligible, RequeuePolicy};
use jobmill_dispatch::dispatch::shard::plan_shards;
use jobmill_dispatch::dispatch::MemorySink;
use jobmill_dispatch::store::{JobStore, MemoryJobStore, RetryPolicy};
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    #[test]
    fn shards_cover_every_job_once(count in 0usize..60, workers in 1usize..12) {
        let all = units(count);
        let shards = plan_shards(all.clone(), workers).unwrap();

        prop_assert_eq!(shards.len(), workers.min(count));
        prop_assert!(shards.iter().all(|shard| !shard.is_empty()));
        // Contiguous slices in list order
        prop_assert_eq!(shards.concat(), all);
    }

    #[test]
    fn shard_sizes_differ_by_at_most_one(count in 1usize..200, workers in 1usize..32) {
        let shards = plan_shards(units(count), workers).unwrap();
        let sizes: Vec<usize> = shards.iter().map(Vec::len).collect();

        let max = sizes.iter().copied().max().unwrap();
        let min = sizes.iter().copied().min().unwrap();
        prop_assert!(max - min <= 1);
        // Larger shards come first
        prop_assert!(sizes.windows(2).all(|pair| pair[0] >= pair[1]));
    }
}

fn status_strategy() -> impl Strategy<Value = JobStatus> {
    prop_oneof![
        Just(JobStatus::Pending),
        Just(JobStatus::Running),
        Just(JobStatus::Done),
        Just(JobStatus::Failed),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn requeue_selects_exactly_the_eligible_statuses(
        statuses in prop::collection::vec(status_strategy(), 0..40),
        retry_failed in any::<bool>(),
        retry_running in any::<bool>(),
        page_size in 1usize..8,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let jobs = units(statuses.len());
            let store = MemoryJobStore::new();
            store.insert_many(&jobs).await.unwrap();
            for (job, status) in jobs.iter().zip(&statuses) {
                store.set_status(&job.job_hash, *status);
            }

            let policy = RequeuePolicy { retry_failed, retry_running };
            let selection = select_eligible(&store, policy, page_size, &RetryPolicy::none(), &MemorySink::new())
                .await
                .unwrap();

            let eligible: HashSet<JobStatus> = policy.eligible_statuses().into_iter().collect();
            let expected: Vec<String> = jobs
                .iter()
                .zip(&statuses)
                .filter(|(_, status)| eligible.contains(*status))
                .map(|(job, _)| job.job_hash.clone())
                .collect();
            let selected: Vec<String> = selection.units.iter().map(|u| u.job_hash.clone()).collect();
            assert_eq!(selected, expected);

            for (job, before) in jobs.iter().zip(&statuses) {
                let after = store.get(&job.job_hash).unwrap().status;
                let reset = (*before == JobStatus::Failed && retry_failed)
                    || (*before == JobStatus::Running && retry_running);
                if reset {
                    assert_eq!(after, JobStatus::Pending);
                } else {
                    assert_eq!(after, *before);
                }
            }
        });
    }
}
