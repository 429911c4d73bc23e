//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check key bucketing, glob matching, fallback capacity and
//! statistics accuracy over generated inputs.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{
    bucket, escape_glob, glob_match, CacheFacade, CacheKey, CacheStats, KeyBuilder, KeyValueStore,
    MemoryStore, TtlPolicy, SCORE_BUCKET_MS, SELECTION_BUCKET_MS,
};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 16;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// == Strategies ==
fn symbol_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z]{1,5}"
}

fn algorithm_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9-]{1,12}"
}

/// Generates a sequence of facade operations
#[derive(Debug, Clone)]
enum CacheOp {
    Set { symbol: String, value: u32 },
    Get { symbol: String },
    Invalidate { symbol: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        ("[A-D]", any::<u32>()).prop_map(|(symbol, value)| CacheOp::Set { symbol, value }),
        "[A-D]".prop_map(|symbol| CacheOp::Get { symbol }),
        "[A-D]".prop_map(|symbol| CacheOp::Invalidate { symbol }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Timestamps inside one bucket render the same key.
    #[test]
    fn prop_score_keys_stable_within_bucket(
        algorithm in algorithm_strategy(),
        symbol in symbol_strategy(),
        base in 0u64..4_000_000_000_000,
        a in 0u64..SCORE_BUCKET_MS,
        b in 0u64..SCORE_BUCKET_MS,
    ) {
        let start = bucket(base, SCORE_BUCKET_MS) * SCORE_BUCKET_MS;
        let builder = KeyBuilder::new("algo:");
        let first = builder.key(&CacheKey::stock_score(algorithm.clone(), &symbol, start + a));
        let second = builder.key(&CacheKey::stock_score(algorithm, &symbol, start + b));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_selection_keys_stable_within_bucket(
        algorithm in algorithm_strategy(),
        base in 0u64..4_000_000_000_000,
        a in 0u64..SELECTION_BUCKET_MS,
        b in 0u64..SELECTION_BUCKET_MS,
    ) {
        let start = bucket(base, SELECTION_BUCKET_MS) * SELECTION_BUCKET_MS;
        let builder = KeyBuilder::new("algo:");
        prop_assert_eq!(
            builder.key(&CacheKey::selection_results(algorithm.clone(), start + a)),
            builder.key(&CacheKey::selection_results(algorithm, start + b))
        );
    }

    // An escaped literal matches itself and nothing longer.
    #[test]
    fn prop_escaped_text_matches_only_itself(text in "[ -~]{0,24}", suffix in "[a-z]{1,3}") {
        let pattern = escape_glob(&text);
        prop_assert!(glob_match(&pattern, &text));
        let longer = format!("{}{}", text, suffix);
        prop_assert!(!glob_match(&pattern, &longer));
    }

    #[test]
    fn prop_prefix_star_matches_extensions(prefix in "[a-z:]{0,12}", rest in "[ -~]{0,12}") {
        let pattern = format!("{}*", escape_glob(&prefix));
        let text = format!("{}{}", prefix, rest);
        prop_assert!(glob_match(&pattern, &text));
    }

    // The fallback store never grows past its capacity.
    #[test]
    fn prop_memory_store_respects_capacity(keys in prop::collection::vec("[a-z]{1,6}", 1..80)) {
        let distinct: HashSet<&String> = keys.iter().collect();
        let (len, evictions) = block_on(async {
            let store = MemoryStore::new(TEST_MAX_ENTRIES);
            for key in &keys {
                store.set_with_expiry(key, "v", Duration::from_secs(60)).await.unwrap();
            }
            (store.len().await, store.evictions().await)
        });

        prop_assert!(len <= TEST_MAX_ENTRIES);
        prop_assert_eq!(len, distinct.len().min(TEST_MAX_ENTRIES));
        prop_assert!(evictions as usize >= distinct.len().saturating_sub(TEST_MAX_ENTRIES));
    }

    // Statistics match the hits and misses callers observed.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let (stats, expected_hits, expected_misses) = block_on(async {
            let facade = CacheFacade::new(
                Arc::new(MemoryStore::new(100)),
                Arc::new(MemoryStore::new(100)),
                TtlPolicy::default(),
                "prop:",
            )
            .unwrap();
            let mut hits = 0u64;
            let mut misses = 0u64;

            for op in ops {
                match op {
                    CacheOp::Set { symbol, value } => {
                        facade.set(&CacheKey::factors(&symbol), &value).await;
                    }
                    CacheOp::Get { symbol } => {
                        match facade.get::<u32>(&CacheKey::factors(&symbol)).await {
                            Some(_) => hits += 1,
                            None => misses += 1,
                        }
                    }
                    CacheOp::Invalidate { symbol } => {
                        facade.invalidate_symbol(&symbol).await.unwrap();
                    }
                }
            }
            (facade.statistics().await, hits, misses)
        });

        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.total_operations, expected_hits + expected_misses);
        prop_assert_eq!(stats.hit_rate, CacheStats::compute_hit_rate(expected_hits, expected_misses));
    }

    #[test]
    fn prop_hit_rate_bounded(hits in 0u64..10_000, misses in 0u64..10_000) {
        let rate = CacheStats::compute_hit_rate(hits, misses);
        prop_assert!((0.0..=1.0).contains(&rate));
        prop_assert_eq!((rate * 100.0).round() / 100.0, rate);
    }
}

// The latest value written under a key is the one read back.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_last_write_wins(values in prop::collection::vec(any::<i64>(), 1..10)) {
        let read = block_on(async {
            let store = MemoryStore::new(TEST_MAX_ENTRIES);
            for value in &values {
                store
                    .set_with_expiry("k", &value.to_string(), Duration::from_secs(5))
                    .await
                    .unwrap();
            }
            store.get("k").await.unwrap()
        });
        prop_assert_eq!(read, values.last().map(|v| v.to_string()));
    }
}
