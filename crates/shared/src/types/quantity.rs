//! Fixed-point physical quantity.
//!
//! CRITICAL: Never use floating-point for stock arithmetic.
//! A `Quantity` is a signed integer count of ten-thousandths of a unit, so
//! every add/negate/compare is exact integer arithmetic.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fractional digits carried by a [`Quantity`].
pub const FRACTION_DIGITS: u32 = 4;

/// Scale factor between a whole unit and the stored integer.
pub const SCALE: i64 = 10_000;

/// Errors produced when building a [`Quantity`] from external input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    /// Input string was empty.
    #[error("Quantity is empty")]
    Empty,

    /// Input string is not a decimal number.
    #[error("Invalid quantity format: {0}")]
    InvalidFormat(String),

    /// Value does not fit into the scaled 64-bit representation.
    #[error("Quantity out of range: {0}")]
    OutOfRange(String),

    /// Floating-point input was NaN or infinite.
    #[error("Quantity must be a finite number")]
    NotFinite,
}

/// A signed quantity with exactly four fractional digits.
///
/// Stored as `value × 10_000` in an `i64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity(i64);

impl Quantity {
    /// Zero quantity.
    pub const ZERO: Self = Self(0);

    /// One whole unit.
    pub const ONE: Self = Self(SCALE);

    /// Builds a quantity from its scaled integer representation.
    #[must_use]
    pub const fn from_scaled(scaled: i64) -> Self {
        Self(scaled)
    }

    /// Returns the scaled integer representation (value × 10 000).
    #[must_use]
    pub const fn scaled(self) -> i64 {
        self.0
    }

    /// Builds a quantity from a whole number of units.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::OutOfRange`] if the scaled value overflows.
    pub fn from_units(units: i64) -> Result<Self, QuantityError> {
        units
            .checked_mul(SCALE)
            .map(Self)
            .ok_or_else(|| QuantityError::OutOfRange(units.to_string()))
    }

    /// Builds a quantity from a decimal, rounding to the nearest 1/10 000
    /// (midpoint away from zero).
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::OutOfRange`] if the value does not fit.
    pub fn from_decimal(value: Decimal) -> Result<Self, QuantityError> {
        let rounded = value.round_dp_with_strategy(FRACTION_DIGITS, RoundingStrategy::MidpointAwayFromZero);
        rounded
            .checked_mul(Decimal::from(SCALE))
            .and_then(|scaled| scaled.to_i64())
            .map(Self)
            .ok_or_else(|| QuantityError::OutOfRange(value.to_string()))
    }

    /// Builds a quantity from a float, rounding to the nearest 1/10 000.
    ///
    /// The float is converted through `Decimal`; no float arithmetic happens.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::NotFinite`] for NaN/infinity and
    /// [`QuantityError::OutOfRange`] when the value does not fit.
    pub fn from_f64(value: f64) -> Result<Self, QuantityError> {
        if !value.is_finite() {
            return Err(QuantityError::NotFinite);
        }
        let decimal =
            Decimal::try_from(value).map_err(|_| QuantityError::OutOfRange(value.to_string()))?;
        Self::from_decimal(decimal)
    }

    /// Parses a plain decimal string.
    ///
    /// Accepts an optional sign, an integer part and up to any number of
    /// fractional digits: digits past the fourth are truncated, missing ones
    /// are zero-padded. Exponent notation is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty, malformed or out of range.
    pub fn parse_strict(input: &str) -> Result<Self, QuantityError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, body) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (body, ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part) {
            return Err(QuantityError::InvalidFormat(input.to_string()));
        }

        let out_of_range = || QuantityError::OutOfRange(input.to_string());

        // Unsigned: the magnitude of i64::MIN does not fit in an i64
        let mut magnitude: u64 = 0;
        for digit in int_part.bytes() {
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit - b'0')))
                .ok_or_else(out_of_range)?;
        }
        magnitude = magnitude.checked_mul(SCALE.unsigned_abs()).ok_or_else(out_of_range)?;

        let mut fraction: u64 = 0;
        let mut taken = 0;
        for digit in frac_part.bytes().take(FRACTION_DIGITS as usize) {
            fraction = fraction * 10 + u64::from(digit - b'0');
            taken += 1;
        }
        for _ in taken..FRACTION_DIGITS {
            fraction *= 10;
        }

        magnitude = magnitude.checked_add(fraction).ok_or_else(out_of_range)?;
        let scaled = if negative {
            0_i64.checked_sub_unsigned(magnitude)
        } else {
            i64::try_from(magnitude).ok()
        };
        scaled.map(Self).ok_or_else(out_of_range)
    }

    /// Converts to a `Decimal` with scale 4. Exact.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, FRACTION_DIGITS)
    }

    /// Absolute value.
    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Returns true if the quantity is exactly zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the quantity is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns true if the quantity is strictly negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Quantity {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Quantity> for Quantity {
    fn sum<I: Iterator<Item = &'a Quantity>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let scale = SCALE.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:04}",
            magnitude / scale,
            magnitude % scale
        )
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    /// Strict parsing, with a float fallback for exponent notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(['e', 'E']) {
            let value: f64 = s
                .trim()
                .parse()
                .map_err(|_| QuantityError::InvalidFormat(s.to_string()))?;
            return Self::from_f64(value);
        }
        Self::parse_strict(s)
    }
}

impl TryFrom<String> for Quantity {
    type Error = QuantityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantity> for String {
    fn from(value: Quantity) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case("10", 100_000)]
    #[case("10.0000", 100_000)]
    #[case("4.5", 45_000)]
    #[case("-4.5", -45_000)]
    #[case("+0.0001", 1)]
    #[case(".25", 2_500)]
    #[case("7.", 70_000)]
    #[case("1.23456789", 12_345)]
    #[case("-0.00009", 0)]
    #[case("  3.1  ", 31_000)]
    fn test_parse_strict(#[case] input: &str, #[case] scaled: i64) {
        assert_eq!(Quantity::parse_strict(input).unwrap().scaled(), scaled);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("-")]
    #[case(".")]
    #[case("1.2.3")]
    #[case("12a")]
    #[case("1e3")]
    #[case("--1")]
    fn test_parse_strict_rejects(#[case] input: &str) {
        assert!(Quantity::parse_strict(input).is_err());
    }

    #[test]
    fn test_parse_overflow() {
        assert!(matches!(
            Quantity::parse_strict("99999999999999999999"),
            Err(QuantityError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_from_str_exponent_falls_back_to_float() {
        let q: Quantity = "1.5e3".parse().unwrap();
        assert_eq!(q, Quantity::from_units(1500).unwrap());

        let q: Quantity = "2.5E-2".parse().unwrap();
        assert_eq!(q.scaled(), 250);
    }

    #[test]
    fn test_from_f64_rounds_to_nearest() {
        assert_eq!(Quantity::from_f64(0.1).unwrap().scaled(), 1_000);
        assert_eq!(Quantity::from_f64(1.000_06).unwrap().scaled(), 10_001);
        assert_eq!(Quantity::from_f64(-2.345_67).unwrap().scaled(), -23_457);
        assert_eq!(Quantity::from_f64(f64::NAN), Err(QuantityError::NotFinite));
        assert_eq!(Quantity::from_f64(f64::INFINITY), Err(QuantityError::NotFinite));
    }

    #[test]
    fn test_from_decimal() {
        assert_eq!(Quantity::from_decimal(dec!(5.5)).unwrap().to_string(), "5.5000");
        assert_eq!(Quantity::from_decimal(dec!(0.00005)).unwrap().scaled(), 1);
        assert_eq!(Quantity::from_decimal(dec!(-0.00005)).unwrap().scaled(), -1);
    }

    #[test]
    fn test_display_always_four_digits() {
        assert_eq!(Quantity::from_scaled(100_000).to_string(), "10.0000");
        assert_eq!(Quantity::from_scaled(-45_000).to_string(), "-4.5000");
        assert_eq!(Quantity::from_scaled(-1).to_string(), "-0.0001");
        assert_eq!(Quantity::ZERO.to_string(), "0.0000");
        assert_eq!(Quantity::from_scaled(i64::MIN).to_string(), "-922337203685477.5808");
    }

    #[test]
    fn test_parse_range_limits() {
        for scaled in [i64::MIN, i64::MIN + 1, i64::MAX] {
            let q = Quantity::from_scaled(scaled);
            assert_eq!(Quantity::parse_strict(&q.to_string()), Ok(q));
        }
        assert_eq!(
            Quantity::parse_strict("922337203685477.5807").unwrap().scaled(),
            i64::MAX
        );
        assert!(matches!(
            Quantity::parse_strict("922337203685477.5808"),
            Err(QuantityError::OutOfRange(_))
        ));
        assert!(matches!(
            Quantity::parse_strict("-922337203685477.5809"),
            Err(QuantityError::OutOfRange(_))
        ));
        assert!(matches!(
            Quantity::parse_strict("99999999999999999999"),
            Err(QuantityError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_sign_predicates_and_ops() {
        let q = Quantity::from_scaled(-55_000);
        assert!(q.is_negative());
        assert!(!q.is_positive());
        assert_eq!(q.abs(), Quantity::from_scaled(55_000));
        assert_eq!(-q, Quantity::from_scaled(55_000));

        let ten = Quantity::from_units(10).unwrap();
        let issue = Quantity::parse_strict("4.5").unwrap();
        assert_eq!((ten - issue).to_string(), "5.5000");
        assert!(issue < ten);
        assert_eq!(Quantity::from_scaled(i64::MAX).checked_add(Quantity::ONE), None);
    }

    #[test]
    fn test_serde_as_string() {
        let q = Quantity::parse_strict("3.5").unwrap();
        let json = serde_json::to_string(&q).unwrap();
        assert_eq!(json, "\"3.5000\"");
        let back: Quantity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Formatting then strictly parsing any quantity yields the same value.
        #[test]
        fn prop_format_parse_round_trip(scaled in i64::MIN..=i64::MAX) {
            let q = Quantity::from_scaled(scaled);
            prop_assert_eq!(Quantity::parse_strict(&q.to_string()).unwrap(), q);
        }

        /// Strings with at most four fractional digits parse to exactly their value.
        #[test]
        fn prop_parse_short_fraction(int in -1_000_000_000i64..1_000_000_000i64, frac in 0u32..10_000u32, digits in 1usize..=4usize) {
            let frac_str = format!("{frac:04}")[..digits].to_string();
            let input = format!("{int}.{frac_str}");
            let q = Quantity::parse_strict(&input).unwrap();
            let expected = Decimal::from_str(&input).unwrap();
            prop_assert_eq!(q.to_decimal(), expected);
        }

        /// Sum is order independent.
        #[test]
        fn prop_sum_commutes(values in prop::collection::vec(-1_000_000_000i64..1_000_000_000i64, 0..50)) {
            let forward: Quantity = values.iter().map(|v| Quantity::from_scaled(*v)).sum();
            let backward: Quantity = values.iter().rev().map(|v| Quantity::from_scaled(*v)).sum();
            prop_assert_eq!(forward, backward);
        }
    }
}
