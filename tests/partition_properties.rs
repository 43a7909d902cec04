mod common;

use common::strategies::*;
use proptest::prelude::*;
use std::time::Duration;
use tasker_batch::models::ChunkSpec;
use tasker_batch::{partition, partition_records, BackoffPolicy};

proptest! {
    /// Property: chunks cover [0, N) exactly once, in order, and only the last may be short
    #[test]
    fn range_partitions_are_complete_and_disjoint(
        total in total_records_strategy(),
        chunk_size in chunk_size_strategy(),
    ) {
        let (manifest, jobs) = partition(total, chunk_size).unwrap();

        prop_assert_eq!(manifest.job_count, total.div_ceil(chunk_size));
        prop_assert_eq!(jobs.len() as u64, manifest.job_count);

        let mut expected_start = 0;
        for (index, job) in jobs.iter().enumerate() {
            prop_assert_eq!(job.sequence, index as u64);
            prop_assert_eq!(job.batch_id, manifest.batch_id);
            prop_assert_eq!(job.attempt, 0);
            let range = job.chunk.range();
            prop_assert_eq!(range.start, expected_start);
            prop_assert!(!range.is_empty());
            prop_assert!(range.end - range.start <= chunk_size);
            if index + 1 < jobs.len() {
                prop_assert_eq!(range.end - range.start, chunk_size);
            }
            expected_start = range.end;
        }
        prop_assert_eq!(expected_start, total);
    }

    /// Property: every record id lands in exactly one chunk, preserving order
    #[test]
    fn record_partitions_preserve_every_id(
        ids in record_ids_strategy(),
        chunk_size in prop_oneof![1u64..50, 100_000u64..u64::MAX],
    ) {
        let (manifest, jobs) = partition_records(ids.clone(), chunk_size).unwrap();
        prop_assert_eq!(manifest.total_records, ids.len() as u64);

        let mut flattened = Vec::with_capacity(ids.len());
        for job in &jobs {
            match &job.chunk {
                ChunkSpec::Records { offset, ids: chunk_ids } => {
                    prop_assert_eq!(*offset, flattened.len() as u64);
                    prop_assert!(chunk_ids.len() as u64 <= chunk_size);
                    flattened.extend(chunk_ids.iter().cloned());
                }
                other => prop_assert!(false, "unexpected chunk {:?}", other),
            }
        }
        prop_assert_eq!(flattened, ids);
    }

    /// Property: job ids are unique within a batch
    #[test]
    fn job_ids_are_unique(total in 1u64..5_000, chunk_size in 1u64..100) {
        let (_, jobs) = partition(total, chunk_size).unwrap();
        let unique: std::collections::HashSet<_> = jobs.iter().map(|job| job.job_id).collect();
        prop_assert_eq!(unique.len(), jobs.len());
    }

    /// Property: backoff delays never decrease and never exceed the cap
    #[test]
    fn backoff_is_monotonic_and_capped(
        base_ms in 0u64..5_000,
        extra_cap_ms in 0u64..600_000,
        multiplier in 1.0f64..4.0,
        attempts in 1u32..40,
    ) {
        let cap = Duration::from_millis(base_ms + extra_cap_ms);
        let policy = BackoffPolicy::new(Duration::from_millis(base_ms), cap, multiplier);
        let schedule = policy.schedule(attempts);

        prop_assert_eq!(schedule.len(), attempts as usize);
        prop_assert_eq!(schedule[0], Duration::from_millis(base_ms));
        for pair in schedule.windows(2) {
            prop_assert!(pair[0] <= pair[1], "{:?} > {:?}", pair[0], pair[1]);
        }
        prop_assert!(schedule.iter().all(|delay| *delay <= cap));
    }
}

#[test]
fn zero_chunk_size_is_rejected() {
    let err = partition(100, 0).unwrap_err();
    assert!(matches!(err, tasker_batch::BatchError::InvalidConfig { .. }));
}
