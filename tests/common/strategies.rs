use proptest::prelude::*;

/// Record counts from empty to a few hundred thousand
pub fn total_records_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0u64), 1u64..1_000, 1_000u64..500_000]
}

/// Any positive chunk size, including sizes larger than the whole batch
pub fn chunk_size_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        Just(1u64),
        1u64..100,
        100u64..10_000,
        100_000u64..10_000_000,
        Just(u64::MAX),
    ]
}

/// Unique record identifiers
pub fn record_ids_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-z0-9]{4,12}", 0..300)
        .prop_map(|ids| ids.into_iter().collect())
}
