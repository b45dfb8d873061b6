//! Cache keys built from the same inputs are equal; any differing input
//! yields a different key.

use proptest::prelude::*;
use sqlmapper_cache::CacheKey;
use sqlmapper_core::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::Int),
        any::<i64>().prop_map(Value::BigInt),
        any::<f64>().prop_map(Value::Double),
        "[a-z0-9 %_]{0,12}".prop_map(Value::Text),
        proptest::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
    ]
}

fn build(id: &str, sql: &str, params: &[Value], offset: i64, limit: i64) -> CacheKey {
    let mut key = CacheKey::new();
    key.update(id);
    key.update(offset);
    key.update(limit);
    key.update(sql);
    key.update_all(params.iter().cloned());
    key
}

fn hash_of(key: &CacheKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

proptest! {
    #[test]
    fn identical_inputs_give_equal_keys(
        id in "[a-z]{1,8}\\.[a-z]{1,8}",
        params in proptest::collection::vec(value_strategy(), 0..6),
        offset in 0i64..100,
        limit in 1i64..1000,
    ) {
        let sql = "SELECT * FROM t WHERE a = ?";
        let a = build(&id, sql, &params, offset, limit);
        let b = build(&id, sql, &params, offset, limit);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(hash_of(&a), hash_of(&b));
        prop_assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn a_differing_parameter_changes_the_key(
        params in proptest::collection::vec(value_strategy(), 1..6),
        replacement in value_strategy(),
        position in any::<prop::sample::Index>(),
    ) {
        let i = position.index(params.len());
        prop_assume!(!params[i].equivalent(&replacement));
        let mut changed = params.clone();
        changed[i] = replacement;
        let a = build("ns.find", "SELECT 1", &params, 0, i64::from(i32::MAX));
        let b = build("ns.find", "SELECT 1", &changed, 0, i64::from(i32::MAX));
        prop_assert_ne!(a, b);
    }

    #[test]
    fn differing_ids_or_bounds_change_the_key(
        params in proptest::collection::vec(value_strategy(), 0..4),
        offset in 0i64..100,
    ) {
        let base = build("ns.a", "SELECT 1", &params, offset, 10);
        prop_assert_ne!(&base, &build("ns.b", "SELECT 1", &params, offset, 10));
        prop_assert_ne!(&base, &build("ns.a", "SELECT 1", &params, offset + 1, 10));
        prop_assert_ne!(&base, &build("ns.a", "SELECT 1", &params, offset, 11));
    }
}

#[test]
fn extra_trailing_value_changes_the_key() {
    let a = build("ns.find", "SELECT 1", &[Value::Int(1)], 0, 10);
    let b = build("ns.find", "SELECT 1", &[Value::Int(1), Value::Null], 0, 10);
    assert_ne!(a, b);
}
