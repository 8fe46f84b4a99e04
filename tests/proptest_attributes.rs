//! Property-based tests using proptest
//!
//! These tests verify the attribute store invariants (sanitizing, path
//! deletion and lookups) using randomized documents.

use driftscan::resource::attributes::is_default;
use driftscan::resource::Attributes;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Generate arbitrary JSON-like values, zero values included
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-3i64..3).prop_map(Value::from),
        prop_oneof![Just(String::new()), "[a-z]{1,4}"].prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]{1,2}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn arb_attributes() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map("[a-d]{1,3}", arb_value(), 0..6)
        .prop_map(|m| Attributes::from(m.into_iter().collect::<Map<_, _>>()))
}

/// True when no zero scalar or empty collection remains at any depth
fn has_no_defaults(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.values().all(|v| !is_default(v) && has_no_defaults(v)),
        Value::Array(items) => items.iter().all(|v| !is_default(v) && has_no_defaults(v)),
        _ => true,
    }
}

/// Arbitrary dotted paths over the generated key alphabet and list indices
fn arb_path() -> impl Strategy<Value = String> {
    let segment = prop_oneof!["[a-d]{1,3}", (0usize..4).prop_map(|i| i.to_string())];
    ("[a-d]{1,3}", prop::collection::vec(segment, 0..3)).prop_map(|(first, rest)| {
        std::iter::once(first)
            .chain(rest)
            .collect::<Vec<_>>()
            .join(".")
    })
}

proptest! {
    /// Sanitizing twice is the same as sanitizing once
    #[test]
    fn sanitize_is_idempotent(attrs in arb_attributes()) {
        let once = attrs.sanitize_defaults();
        let twice = once.sanitize_defaults();
        prop_assert_eq!(once, twice);
    }

    /// No zero value or empty collection survives sanitizing
    #[test]
    fn sanitize_leaves_no_defaults(attrs in arb_attributes()) {
        let sanitized = attrs.sanitize_defaults().into_value();
        prop_assert!(has_no_defaults(&sanitized));
    }

    /// Sanitizing never adds leaves
    #[test]
    fn sanitize_never_grows(attrs in arb_attributes()) {
        prop_assert!(attrs.sanitize_defaults().flatten().len() <= attrs.flatten().len());
    }

    /// Deleting a path is idempotent and leaves nothing at that path
    #[test]
    fn delete_is_idempotent(attrs in arb_attributes(), path in arb_path()) {
        let mut once = attrs.clone();
        once.delete(&path);
        let mut twice = once.clone();
        twice.delete(&path);

        prop_assert_eq!(&once, &twice);
        prop_assert!(once.get(&path).map_or(true, Value::is_null));
    }

    /// A value set at a fresh object path can be read back
    #[test]
    fn set_then_get(path in prop::collection::vec("[e-h]{1,3}", 1..4), value in "[a-z]{1,8}") {
        let path = path.join(".");
        let mut attrs = Attributes::new();
        attrs.set(&path, value.clone()).unwrap();
        prop_assert_eq!(attrs.get_str(&path), Some(value.as_str()));
    }
}
