//! Property tests for the canonical value ordering and text round-trips.

use std::cmp::Ordering;

use proptest::prelude::*;

use datalift_types::{parse_value, DataType, Value};

fn scalar_values() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(Value::Int64),
        any::<u64>().prop_map(Value::UInt64),
        any::<f64>().prop_map(Value::Float64),
        "[a-z]{0,10}".prop_map(Value::String),
    ]
}

proptest! {
    /// compare is a total order: antisymmetric and consistent on reversal.
    #[test]
    fn compare_is_antisymmetric(a in scalar_values(), b in scalar_values()) {
        let forward = a.compare(&b);
        let backward = b.compare(&a);
        prop_assert_eq!(forward, backward.reverse());
    }

    #[test]
    fn compare_is_reflexive(a in scalar_values()) {
        prop_assert_eq!(a.compare(&a), Ordering::Equal);
    }

    /// Large integers compare exactly, not through f64.
    #[test]
    fn int64_comparison_is_exact(a in any::<i64>(), b in any::<i64>()) {
        prop_assert_eq!(
            Value::Int64(a).compare(&Value::Int64(b)),
            a.cmp(&b)
        );
    }

    /// Rendering to text and parsing back restores the canonical value.
    #[test]
    fn int64_survives_display_roundtrip(n in any::<i64>()) {
        let text = Value::Int64(n).to_display_string();
        let parsed = parse_value(DataType::Int64, 0, &Value::String(text))
            .expect("parse");
        prop_assert_eq!(parsed, Value::Int64(n));
    }

    #[test]
    fn boolean_survives_display_roundtrip(b in any::<bool>()) {
        let text = Value::Boolean(b).to_display_string();
        let parsed = parse_value(DataType::Boolean, 0, &Value::String(text))
            .expect("parse");
        prop_assert_eq!(parsed, Value::Boolean(b));
    }

    #[test]
    fn int_arrays_survive_display_roundtrip(items in proptest::collection::vec(any::<i32>(), 0..12)) {
        let array = Value::Array(items.into_iter().map(Value::Int32).collect());
        let text = array.to_display_string();
        let parsed = parse_value(DataType::Int32, 1, &Value::String(text))
            .expect("parse");
        prop_assert_eq!(parsed, array);
    }
}
