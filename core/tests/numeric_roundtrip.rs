//! Integration coverage for the numeric round-trip laws: for every
//! representable `i64`/`f64`, `parse(format(x)) == x` bit-for-bit, in every
//! base the formatter supports.

use asteria_core::numeric::{format_integer, format_real, parse_integer, parse_real, Base};

fn integer_samples() -> Vec<i64> {
    let mut v = vec![0, 1, -1, 2, -2, 10, -10, 100, -100, i64::MAX, i64::MIN, i64::MAX - 1, i64::MIN + 1];
    let mut x: i64 = 1;
    for _ in 0..40 {
        v.push(x);
        v.push(-x);
        x = x.wrapping_mul(7).wrapping_add(3);
    }
    v
}

fn real_samples() -> Vec<f64> {
    vec![
        0.0,
        -0.0,
        1.0,
        -1.0,
        0.5,
        -0.5,
        3.14159265358979,
        2.718281828459045,
        1e300,
        1e-300,
        f64::MIN_POSITIVE,
        f64::EPSILON,
        123456789.123456,
        -987654321.987654,
        1e20,
        1e-20,
        9007199254740993.0,
        0.1,
        0.3,
    ]
}

#[test]
fn integer_round_trips_across_every_base() {
    for base in [Base::Binary, Base::Hexadecimal, Base::Decimal] {
        for v in integer_samples() {
            let text = format_integer(v, base, None);
            assert_eq!(parse_integer(&text, base), Some(v), "base {base:?} value {v} rendered as {text:?}");
        }
    }
}

#[test]
fn real_round_trips_decimal_bit_identically() {
    for v in real_samples() {
        let text = format_real(v, Base::Decimal);
        let parsed = parse_real(&text).expect("formatter output must be parseable");
        assert_eq!(parsed.to_bits(), v.to_bits(), "value {v} rendered as {text:?} parsed back as {parsed}");
    }
}

#[test]
fn specials_round_trip() {
    for v in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
        let text = format_real(v, Base::Decimal);
        let parsed = parse_real(&text).unwrap();
        if v.is_nan() {
            assert!(parsed.is_nan());
        } else {
            assert_eq!(parsed, v);
        }
    }
}

#[test]
fn integer_min_and_max_do_not_overflow_in_any_base() {
    for base in [Base::Binary, Base::Hexadecimal, Base::Decimal] {
        let max_text = format_integer(i64::MAX, base, None);
        let min_text = format_integer(i64::MIN, base, None);
        assert_eq!(parse_integer(&max_text, base), Some(i64::MAX));
        assert_eq!(parse_integer(&min_text, base), Some(i64::MIN));
    }
}
