//! Property tests for cache-key folding.

use ember_cache::CacheKey;
use ember_common::types::Value;
use proptest::prelude::*;

fn contribution() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i32>().prop_map(Value::Int),
        any::<i64>().prop_map(Value::BigInt),
        "[a-zA-Z0-9 =?*]{0,40}".prop_map(Value::String),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

proptest! {
    #[test]
    fn equal_sequences_fold_to_equal_keys(parts in proptest::collection::vec(contribution(), 0..12)) {
        let a = CacheKey::from_parts(parts.clone());
        let b = CacheKey::from_parts(parts);
        prop_assert_eq!(a.hash_code(), b.hash_code());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn extra_contribution_changes_key(
        parts in proptest::collection::vec(contribution(), 0..8),
        extra in contribution(),
    ) {
        let base = CacheKey::from_parts(parts.clone());
        let mut longer = CacheKey::from_parts(parts);
        longer.update(extra);
        prop_assert_ne!(base, longer);
    }

    #[test]
    fn offset_or_limit_alone_changes_key(
        offset in 0i32..10_000,
        limit in 1i32..10_000,
        delta in 1i32..100,
    ) {
        let build = |offset: i32, limit: i32| {
            CacheKey::from_parts([
                Value::from("selectUsers"),
                Value::from(offset),
                Value::from(limit),
                Value::from("SELECT * FROM users"),
            ])
        };
        let base = build(offset, limit);
        prop_assert_ne!(&base, &build(offset + delta, limit));
        prop_assert_ne!(&base, &build(offset, limit + delta));
    }

    #[test]
    fn swapping_distinct_neighbours_changes_key(a in any::<i32>(), b in any::<i32>()) {
        prop_assume!(a != b);
        prop_assert_ne!(CacheKey::from_parts([a, b]), CacheKey::from_parts([b, a]));
    }
}
