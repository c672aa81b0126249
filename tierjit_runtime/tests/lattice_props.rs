//! Property tests for the value-representation lattice.
//!
//! The type inferer's termination argument relies on `join` being a
//! semilattice operation with `Unknown` as bottom and `BoxedRef` as top.

use proptest::prelude::*;
use tierjit_runtime::{Value, ValueType};

fn any_type() -> impl Strategy<Value = ValueType> {
    (0u8..12).prop_map(|tag| ValueType::from_u8(tag).unwrap_or(ValueType::BoxedRef))
}

fn any_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Undefined),
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i32>().prop_map(Value::Int32),
        any::<f64>().prop_map(Value::Double),
        "[a-z]{0,4}".prop_map(|s| Value::string(&s)),
    ]
}

proptest! {
    #[test]
    fn join_is_commutative(a in any_type(), b in any_type()) {
        prop_assert_eq!(a.join(b), b.join(a));
    }

    #[test]
    fn join_is_idempotent(a in any_type()) {
        prop_assert_eq!(a.join(a), a);
    }

    #[test]
    fn join_is_associative(a in any_type(), b in any_type(), c in any_type()) {
        prop_assert_eq!(a.join(b).join(c), a.join(b.join(c)));
    }

    #[test]
    fn unknown_is_bottom_and_boxed_ref_is_top(a in any_type()) {
        prop_assert_eq!(ValueType::Unknown.join(a), a);
        prop_assert_eq!(ValueType::BoxedRef.join(a), ValueType::BoxedRef);
    }

    #[test]
    fn join_admits_both_inputs(a in any_value(), b in any_value()) {
        let joined = a.value_type().join(b.value_type());
        prop_assert!(joined.admits(a.value_type()));
        prop_assert!(joined.admits(b.value_type()));
    }
}
