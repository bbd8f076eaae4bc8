//! Numeric comparator property tests using proptest
//!
//! Antisymmetry across all type pairings, agreement between ordering
//! and equality, and the NaN and saturation boundary rules.

use std::cmp::Ordering;

use cel_core::numeric::{
    compare_double_int, compare_double_uint, compare_int_double, compare_int_uint,
    compare_uint_double, compare_uint_int, equals_double_double, equals_double_int,
    equals_double_uint, equals_int_uint,
};
use proptest::prelude::*;

fn any_double() -> impl Strategy<Value = f64> {
    prop_oneof![
        any::<f64>(),
        Just(0.0),
        Just(-0.0),
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        Just(9_223_372_036_854_775_808.0),
        Just(-9_223_372_036_854_775_808.0),
        Just(18_446_744_073_709_551_616.0),
    ]
}

fn any_int() -> impl Strategy<Value = i64> {
    prop_oneof![any::<i64>(), Just(0), Just(i64::MIN), Just(i64::MAX)]
}

fn any_uint() -> impl Strategy<Value = u64> {
    prop_oneof![
        any::<u64>(),
        Just(0),
        Just(u64::MAX),
        Just(i64::MAX as u64)
    ]
}

proptest! {
    #[test]
    fn prop_double_int_antisymmetry(d in any_double(), i in any_int()) {
        prop_assert_eq!(compare_double_int(d, i), compare_int_double(i, d).reverse());
    }

    #[test]
    fn prop_double_uint_antisymmetry(d in any_double(), u in any_uint()) {
        prop_assert_eq!(compare_double_uint(d, u), compare_uint_double(u, d).reverse());
    }

    #[test]
    fn prop_int_uint_antisymmetry(i in any_int(), u in any_uint()) {
        prop_assert_eq!(compare_int_uint(i, u), compare_uint_int(u, i).reverse());
    }

    #[test]
    fn prop_equality_iff_equal_ordering_int_uint(i in any_int(), u in any_uint()) {
        prop_assert_eq!(
            equals_int_uint(i, u),
            compare_int_uint(i, u) == Ordering::Equal
        );
    }

    #[test]
    fn prop_nan_never_equal(i in any_int(), u in any_uint()) {
        prop_assert!(!equals_double_int(f64::NAN, i));
        prop_assert!(!equals_double_uint(f64::NAN, u));
    }

    #[test]
    fn prop_equality_implies_equal_ordering_double_int(d in any_double(), i in any_int()) {
        if equals_double_int(d, i) {
            prop_assert_eq!(compare_double_int(d, i), Ordering::Equal);
        }
        if d.is_nan() {
            prop_assert!(!equals_double_int(d, i));
        }
    }

    #[test]
    fn prop_int_uint_transitivity_through_double(i in -1000i64..1000, u in 0u64..1000) {
        // In the small range every value is exactly representable, so
        // the three pairwise comparisons must agree.
        let d = i as f64;
        let via_double = compare_double_uint(d, u);
        prop_assert_eq!(compare_int_uint(i, u), via_double);
    }
}

#[test]
fn test_boundary_table() {
    // i64::MAX is not exactly representable; 2^63 sorts above it.
    assert_eq!(
        compare_double_int(9_223_372_036_854_775_808.0, i64::MAX),
        Ordering::Greater
    );
    // i64::MIN is exactly -2^63.
    assert_eq!(
        compare_double_int(-9_223_372_036_854_775_808.0, i64::MIN),
        Ordering::Equal
    );
    // 2^64 sorts above u64::MAX.
    assert_eq!(
        compare_double_uint(18_446_744_073_709_551_616.0, u64::MAX),
        Ordering::Greater
    );
    // Negative doubles sort below every uint.
    assert_eq!(compare_double_uint(-1e-9, 0), Ordering::Less);
    // Negative ints sort below every uint.
    assert_eq!(compare_int_uint(-1, u64::MAX), Ordering::Less);
    assert_eq!(compare_int_uint(-1, 0), Ordering::Less);
    // The shared maximum is equal across int and uint.
    assert_eq!(
        compare_int_uint(i64::MAX, i64::MAX as u64),
        Ordering::Equal
    );
    assert!(equals_int_uint(i64::MAX, i64::MAX as u64));
}

#[test]
fn test_zero_and_nan_rules() {
    // IEEE equality for doubles: signed zeroes are equal...
    assert!(equals_double_double(0.0, -0.0));
    // ...but the total order distinguishes them.
    assert_eq!(compare_double_int(-0.0, 0), Ordering::Less);
    // NaN compares greater than everything, equal to nothing.
    assert_eq!(compare_double_int(f64::NAN, i64::MAX), Ordering::Greater);
    assert_eq!(compare_uint_double(u64::MAX, f64::NAN), Ordering::Less);
    assert!(!equals_double_double(f64::NAN, f64::NAN));
}

#[test]
fn test_infinities_saturate() {
    assert_eq!(
        compare_double_int(f64::INFINITY, i64::MAX),
        Ordering::Greater
    );
    assert_eq!(
        compare_double_int(f64::NEG_INFINITY, i64::MIN),
        Ordering::Less
    );
    assert_eq!(
        compare_double_uint(f64::INFINITY, u64::MAX),
        Ordering::Greater
    );
    assert_eq!(compare_double_uint(f64::NEG_INFINITY, 0), Ordering::Less);
}
