//! Exact rational arithmetic for musical time.
//!
//! Every value is kept reduced with a positive denominator. Components are
//! bounded by [`SAFE_LIMIT`] so that products of two fractions never
//! overflow `i64` before the range check runs.

use crate::errors::ArithmeticError;
use num_rational::Ratio;
use num_traits::{CheckedAdd, CheckedDiv, CheckedMul, CheckedSub, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Destination tick resolution: a quarter note is 480 ticks.
pub const TICKS_PER_WHOLE: i64 = 1920;

/// Largest magnitude allowed for a numerator or denominator.
pub const SAFE_LIMIT: i64 = 1 << 48;

/// A reduced, range-checked rational number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "FractionRepr", into = "FractionRepr")]
pub struct Fraction(Ratio<i64>);

/// Serialized shape of a [`Fraction`]
#[derive(Serialize, Deserialize)]
struct FractionRepr {
    numerator: i64,
    denominator: i64,
}

impl Fraction {
    pub const ZERO: Fraction = Fraction(Ratio::new_raw(0, 1));
    pub const ONE: Fraction = Fraction(Ratio::new_raw(1, 1));

    /// Build a reduced fraction, rejecting zero denominators and
    /// out-of-range components.
    pub fn new(numerator: i64, denominator: i64) -> Result<Self, ArithmeticError> {
        if denominator == 0 {
            return Err(ArithmeticError::ZeroDenominator);
        }
        if numerator == i64::MIN || denominator == i64::MIN {
            return Err(ArithmeticError::Overflow);
        }
        Self::checked(Ratio::new(numerator, denominator))
    }

    pub fn from_integer(value: i64) -> Result<Self, ArithmeticError> {
        Self::new(value, 1)
    }

    /// Fraction of a whole note from a tick count.
    pub fn from_ticks(ticks: i64, ticks_per_whole: i64) -> Result<Self, ArithmeticError> {
        Self::new(ticks, ticks_per_whole)
    }

    fn checked(ratio: Ratio<i64>) -> Result<Self, ArithmeticError> {
        let in_range = |v: &i64| v.checked_abs().map_or(false, |a| a <= SAFE_LIMIT);
        if in_range(ratio.numer()) && in_range(ratio.denom()) {
            Ok(Fraction(ratio))
        } else {
            Err(ArithmeticError::Overflow)
        }
    }

    fn guard(result: Option<Ratio<i64>>) -> Result<Self, ArithmeticError> {
        result.ok_or(ArithmeticError::Overflow).and_then(Self::checked)
    }

    pub fn numerator(self) -> i64 {
        *self.0.numer()
    }

    pub fn denominator(self) -> i64 {
        *self.0.denom()
    }

    /// Values are always stored reduced; kept for callers that normalise
    /// explicitly.
    pub fn reduce(self) -> Self {
        Fraction(self.0.reduced())
    }

    pub fn checked_add(self, other: Fraction) -> Result<Self, ArithmeticError> {
        Self::guard(self.0.checked_add(&other.0))
    }

    pub fn checked_sub(self, other: Fraction) -> Result<Self, ArithmeticError> {
        Self::guard(self.0.checked_sub(&other.0))
    }

    pub fn checked_mul(self, other: Fraction) -> Result<Self, ArithmeticError> {
        Self::guard(self.0.checked_mul(&other.0))
    }

    pub fn checked_mul_int(self, factor: i64) -> Result<Self, ArithmeticError> {
        Self::guard(self.0.checked_mul(&Ratio::from_integer(factor)))
    }

    pub fn checked_div(self, other: Fraction) -> Result<Self, ArithmeticError> {
        if other.is_zero() {
            return Err(ArithmeticError::ZeroDenominator);
        }
        Self::guard(self.0.checked_div(&other.0))
    }

    pub fn reciprocal(self) -> Result<Self, ArithmeticError> {
        if self.is_zero() {
            return Err(ArithmeticError::ZeroDenominator);
        }
        Self::checked(self.0.recip())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_negative()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_positive()
    }

    /// Tick count at the given resolution, rounded half up.
    pub fn to_ticks(self, ticks_per_whole: i64) -> Result<i64, ArithmeticError> {
        let n = i128::from(self.numerator());
        let d = i128::from(self.denominator());
        let ticks = (n * i128::from(ticks_per_whole) + d / 2) / d;
        i64::try_from(ticks).map_err(|_| ArithmeticError::Overflow)
    }

    /// Tick count when the value lands exactly on a tick boundary.
    pub fn exact_ticks(self, ticks_per_whole: i64) -> Option<i64> {
        let scaled = self.0.checked_mul(&Ratio::from_integer(ticks_per_whole))?;
        scaled.is_integer().then(|| scaled.to_integer())
    }

    pub fn to_f64(self) -> f64 {
        self.numerator() as f64 / self.denominator() as f64
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Fraction::ZERO
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator(), self.denominator())
    }
}

impl From<Fraction> for FractionRepr {
    fn from(value: Fraction) -> Self {
        FractionRepr {
            numerator: value.numerator(),
            denominator: value.denominator(),
        }
    }
}

impl TryFrom<FractionRepr> for Fraction {
    type Error = ArithmeticError;

    fn try_from(repr: FractionRepr) -> Result<Self, Self::Error> {
        Fraction::new(repr.numerator, repr.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frac(n: i64, d: i64) -> Fraction {
        Fraction::new(n, d).unwrap()
    }

    #[test]
    fn test_new_reduces_and_normalises_sign() {
        let f = frac(6, -8);
        assert_eq!(f.numerator(), -3);
        assert_eq!(f.denominator(), 4);
        assert!(f.is_negative());
    }

    #[test]
    fn test_zero_denominator_rejected() {
        assert_eq!(Fraction::new(1, 0), Err(ArithmeticError::ZeroDenominator));
        assert_eq!(frac(0, 1).reciprocal(), Err(ArithmeticError::ZeroDenominator));
    }

    #[test]
    fn test_overflow_rejected() {
        assert_eq!(Fraction::new(SAFE_LIMIT + 1, 1), Err(ArithmeticError::Overflow));
        assert_eq!(Fraction::new(i64::MIN, 3), Err(ArithmeticError::Overflow));
        let big = frac(SAFE_LIMIT, 1);
        assert_eq!(big.checked_mul_int(2), Err(ArithmeticError::Overflow));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(frac(1, 4).checked_add(frac(1, 12)).unwrap(), frac(1, 3));
        assert_eq!(frac(1, 4).checked_sub(frac(1, 2)).unwrap(), frac(-1, 4));
        assert_eq!(frac(1, 8).checked_mul(frac(3, 2)).unwrap(), frac(3, 16));
        assert_eq!(frac(1, 4).checked_div(frac(3, 2)).unwrap(), frac(1, 6));
        assert_eq!(frac(3, 2).reciprocal().unwrap(), frac(2, 3));
    }

    #[test]
    fn test_ordering() {
        let mut values = vec![frac(1, 2), frac(-1, 3), frac(1, 3), Fraction::ZERO];
        values.sort();
        assert_eq!(values, vec![frac(-1, 3), Fraction::ZERO, frac(1, 3), frac(1, 2)]);
    }

    #[test]
    fn test_ticks_round_trip() {
        for (n, d) in [(1, 4), (3, 8), (1, 12), (5, 6), (7, 16), (1, 1920)] {
            let f = frac(n, d);
            let ticks = f.to_ticks(TICKS_PER_WHOLE).unwrap();
            assert_eq!(Fraction::from_ticks(ticks, TICKS_PER_WHOLE).unwrap(), f);
        }
    }

    #[test]
    fn test_exact_ticks() {
        assert_eq!(frac(1, 4).exact_ticks(TICKS_PER_WHOLE), Some(480));
        assert_eq!(frac(1, 7).exact_ticks(TICKS_PER_WHOLE), None);
        assert_eq!(frac(1, 7).to_ticks(TICKS_PER_WHOLE).unwrap(), 274);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&frac(3, 6)).unwrap();
        assert_eq!(json, r#"{"numerator":1,"denominator":2}"#);
        let bad: Result<Fraction, _> = serde_json::from_str(r#"{"numerator":1,"denominator":0}"#);
        assert!(bad.is_err());
    }
}
