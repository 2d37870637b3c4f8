//! Canonicalization and content digest for plan creation payloads (spec
//! §4.2). Two callers submitting the same plan body — same `id`, same spec
//! list, field order and whitespace notwithstanding — must land on the same
//! digest so ingestion (`scheduler-core::ingest`) can tell a retried POST
//! from a genuine collision on `id`.
//!
//! The canonical form is the `serde_json::Value` tree re-emitted with object
//! keys in lexicographic byte order, array order preserved, and no
//! insignificant whitespace. Numbers round-trip through `serde_json`'s own
//! formatter, which is already shortest-representation and stable across
//! equal values regardless of how they were originally written (`1.50` and
//! `1.5` canonicalize identically because both parse to the same `f64`/
//! `Number`).

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Re-emit `value` with object keys sorted, producing deterministic bytes.
///
/// `serde_json::Value`'s `Object` variant is itself a `BTreeMap` equivalent
/// (the crate's `preserve_order` feature is not enabled here), so `to_vec`
/// already walks keys in sorted order; this function exists as the one
/// place that claim is pinned down and tested, so a future `preserve_order`
/// feature flip elsewhere in the dependency tree can't silently break
/// idempotency.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&sort_value(value)).expect("canonical Value always serializes")
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = Default::default();
            for (k, v) in map {
                sorted.insert(k.clone(), sort_value(v));
            }
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// SHA-256 digest of the canonical bytes of `value`.
pub fn digest(value: &Value) -> [u8; 32] {
    let bytes = canonicalize(value);
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hasher.finalize().into()
}

/// Digest rendered as lowercase hex, for storage/logging.
pub fn digest_hex(value: &Value) -> String {
    hex::encode(digest(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_bytes() {
        let a = json!({"id": "p1", "specs": [{"purpose": "x", "vision": "y"}]});
        let b = json!({"specs": [{"vision": "y", "purpose": "x"}], "id": "p1"});
        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn array_order_is_significant() {
        let a = json!({"specs": ["first", "second"]});
        let b = json!({"specs": ["second", "first"]});
        assert_ne!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn nested_objects_are_sorted_recursively() {
        let a = json!({"outer": {"z": 1, "a": 2}});
        let b = json!({"outer": {"a": 2, "z": 1}});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn canonicalize_is_idempotent_under_reparse() {
        let value = json!({"b": [1, 2, {"y": true, "x": null}], "a": "s"});
        let once = canonicalize(&value);
        let reparsed: Value = serde_json::from_slice(&once).unwrap();
        let twice = canonicalize(&reparsed);
        assert_eq!(once, twice);
    }

    #[test]
    fn digest_hex_is_lowercase_64_chars() {
        let h = digest_hex(&json!({"a": 1}));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    proptest::proptest! {
        #[test]
        fn key_permutation_invariance(
            purpose in "[a-z]{1,10}",
            vision in "[a-z]{1,10}",
            id in "[a-z0-9]{1,10}",
        ) {
            let a = json!({"id": id.clone(), "specs": [{"purpose": purpose.clone(), "vision": vision.clone()}]});
            let b = json!({"specs": [{"vision": vision, "purpose": purpose}], "id": id});
            assert_eq!(canonicalize(&a), canonicalize(&b));
        }

        #[test]
        fn digest_is_stable_across_double_canonicalization(
            a in "[a-z]{1,10}", b in "[a-z]{1,10}",
        ) {
            let value = json!({"a": a, "b": b});
            let once = canonicalize(&value);
            let reparsed: Value = serde_json::from_slice(&once).unwrap();
            assert_eq!(digest(&value), digest(&reparsed));
        }
    }
}
