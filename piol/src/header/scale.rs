//! Coordinate scalars: SEG-Y stores scaled fields as an `i32` mantissa and an `i16` scalar.
//!
//! A positive scalar multiplies the mantissa, a negative one divides by its magnitude and zero
//! means one. Only powers of ten up to 10000 are produced on encode.

use piol_error::{PiolResult, piol_bail};

const MAX_DECIMALS: u32 = 4;

/// The value stored as `mantissa` under `scale`.
pub fn apply_scale(mantissa: i32, scale: i16) -> f64 {
    let mantissa = f64::from(mantissa);
    match scale {
        s if s > 0 => mantissa * f64::from(s),
        s if s < 0 => mantissa / -f64::from(s),
        _ => mantissa,
    }
}

/// The mantissa storing `value` under `scale`, rounded to nearest, if it fits an `i32`.
pub fn mantissa(value: f64, scale: i16) -> Option<i32> {
    let raw = match scale {
        s if s > 0 => value / f64::from(s),
        s if s < 0 => value * -f64::from(s),
        _ => value,
    }
    .round();
    if !raw.is_finite() || raw < f64::from(i32::MIN) || raw > f64::from(i32::MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(raw as i32)
}

/// Whether `value` survives encoding under `scale` bit for bit.
pub fn is_exact(value: f64, scale: i16) -> bool {
    mantissa(value, scale).is_some_and(|m| apply_scale(m, scale) == value)
}

/// The scalar that best represents `value` on its own.
///
/// Fractional values get the negative power of ten matching their decimals (at most four),
/// falling back to coarser scalars when the mantissa would not fit. Values too large for an
/// `i32` get the smallest positive power of ten that brings them in range. `None` when no
/// scalar within ±10000 can hold the value.
pub fn de_scale(value: f64) -> Option<i16> {
    if !value.is_finite() {
        return None;
    }

    let integral = value.trunc();
    if integral.abs() > f64::from(i32::MAX) {
        return [10, 100, 1000, 10000]
            .into_iter()
            .find(|&scale| mantissa(value, scale).is_some());
    }

    #[allow(clippy::cast_possible_truncation)]
    let mut fraction = ((value - integral).abs() * 10_000.0).round() as u32;
    if fraction == 10_000 {
        fraction = 0;
    }
    let mut decimals = if fraction == 0 { 0 } else { MAX_DECIMALS };
    while decimals > 0 && fraction % 10 == 0 {
        fraction /= 10;
        decimals -= 1;
    }

    (0..=decimals).rev().map(decimal_scale).find(|&scale| mantissa(value, scale).is_some())
}

fn decimal_scale(decimals: u32) -> i16 {
    match decimals {
        0 => 1,
        1 => -10,
        2 => -100,
        3 => -1000,
        _ => -10000,
    }
}

/// Combine the scalars wanted by two values sharing one scalar field.
///
/// When either needs a positive scalar the larger wins, keeping the integral digits.
/// Otherwise the most negative wins, keeping the most decimals.
pub fn reconcile_scale(a: i16, b: i16) -> i16 {
    if a > 1 || b > 1 { a.max(b) } else { a.min(b) }
}

/// Choose the scalar for a group of values sharing one scalar field.
///
/// `previous` (typically the scalar the row was decoded with) is kept when every value is
/// exact under it.
pub fn choose_scale(values: &[f64], previous: Option<i16>) -> PiolResult<i16> {
    if let Some(previous) = previous {
        if values.iter().all(|&v| is_exact(v, previous)) {
            return Ok(previous);
        }
    }

    let mut scale = 1;
    for &value in values {
        let Some(wanted) = de_scale(value) else {
            piol_bail!(NumericOverflow: "no scalar within 10000 can store {value}");
        };
        scale = reconcile_scale(scale, wanted);
    }

    if let Some(value) = values.iter().find(|&&v| mantissa(v, scale).is_none()) {
        piol_bail!(NumericOverflow: "{value} does not fit a 32-bit mantissa under scalar {scale}");
    }
    Ok(scale)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(123456, -100, 1234.56)]
    #[case(1234, 100, 123400.0)]
    #[case(1234, 0, 1234.0)]
    #[case(1234, 1, 1234.0)]
    #[case(-5, -10, -0.5)]
    fn scaled_values(#[case] raw: i32, #[case] scale: i16, #[case] expected: f64) {
        assert_eq!(apply_scale(raw, scale), expected);
    }

    #[rstest]
    #[case(0.0, Some(1))]
    #[case(5.0, Some(1))]
    #[case(1.5, Some(-10))]
    #[case(-2.25, Some(-100))]
    #[case(1234.56, Some(-100))]
    #[case(0.0001, Some(-10000))]
    #[case(0.00001, Some(1))]
    #[case(300_000.125, Some(-1000))]
    #[case(1e10, Some(10))]
    #[case(1e15, None)]
    #[case(f64::NAN, None)]
    fn de_scale_picks_decimals(#[case] value: f64, #[case] expected: Option<i16>) {
        assert_eq!(de_scale(value), expected);
    }

    #[test]
    fn de_scale_falls_back_to_coarser_scalar() {
        // four decimals would overflow the mantissa
        assert_eq!(de_scale(3_000_000.0001), Some(-100));
    }

    #[rstest]
    #[case(1, -100, -100)]
    #[case(-10, -1000, -1000)]
    #[case(10, -100, 10)]
    #[case(100, 10, 100)]
    #[case(1, 1, 1)]
    fn reconcile(#[case] a: i16, #[case] b: i16, #[case] expected: i16) {
        assert_eq!(reconcile_scale(a, b), expected);
        assert_eq!(reconcile_scale(b, a), expected);
    }

    #[test]
    fn previous_scale_reused_when_exact() {
        assert_eq!(choose_scale(&[1234.56, 10.0], Some(-100)).unwrap(), -100);
        assert_eq!(choose_scale(&[123400.0], Some(100)).unwrap(), 100);
        assert_eq!(choose_scale(&[7.0], Some(0)).unwrap(), 0);
        // 0.125 needs three decimals
        assert_eq!(choose_scale(&[1234.56, 0.125], Some(-100)).unwrap(), -1000);
    }

    #[test]
    fn unrepresentable_values_overflow() {
        assert!(choose_scale(&[1e15], None).is_err());
        assert!(choose_scale(&[f64::INFINITY], Some(-100)).is_err());
        // the positive scalar wins and the small value loses its decimals
        assert_eq!(choose_scale(&[1e10, 0.5], None).unwrap(), 10);
    }
}
