//! High-precision decimal scalar for ground-truth accumulation.
//!
//! [`HighPrecision`] keeps its decimal value behind a single owning `Box`, so
//! a running accumulator costs one pointer in the caller's frame no matter how
//! many digits the value carries. Cloning deep-copies the backing value and the
//! default value is an explicit zero.
//!
//! Construction from `f64` is exact: every finite double is a dyadic rational
//! and therefore has a terminating decimal expansion. Arithmetic results are
//! rounded to [`SIGNIFICANT_DIGITS`] significant digits. Converting back to
//! `f64` is explicit and lossy.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Significant decimal digits kept after every arithmetic operation.
pub const SIGNIFICANT_DIGITS: u64 = 50;

/// Returned when converting NaN or an infinity.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("{0} has no exact decimal value")]
pub struct NonFiniteValue(pub f64);

/// Returned by [`HighPrecision::checked_div`] for a zero divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("division by zero")]
pub struct DivisionByZero;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HighPrecision {
    value: Box<BigDecimal>,
}

impl HighPrecision {
    pub fn zero() -> Self {
        Self::from_decimal(BigDecimal::zero())
    }

    pub fn one() -> Self {
        Self::from_decimal(BigDecimal::from(1i64))
    }

    fn from_decimal(value: BigDecimal) -> Self {
        Self {
            value: Box::new(value),
        }
    }

    fn rounded(value: BigDecimal) -> Self {
        if value.digits() > SIGNIFICANT_DIGITS {
            Self::from_decimal(value.with_prec(SIGNIFICANT_DIGITS))
        } else {
            Self::from_decimal(value)
        }
    }

    /// Exact decimal expansion of a finite `f64`.
    pub fn from_f64(x: f64) -> Result<Self, NonFiniteValue> {
        if !x.is_finite() {
            return Err(NonFiniteValue(x));
        }
        if x == 0.0 {
            return Ok(Self::zero());
        }

        let bits = x.to_bits();
        let negative = bits >> 63 == 1;
        let biased_exp = ((bits >> 52) & 0x7ff) as i64;
        let fraction = bits & ((1u64 << 52) - 1);

        // value = mantissa * 2^exp
        let (mantissa, exp) = if biased_exp == 0 {
            (fraction, -1074)
        } else {
            (fraction | (1u64 << 52), biased_exp - 1075)
        };

        let mut digits = BigInt::from(mantissa);
        if negative {
            digits = -digits;
        }

        let decimal = if exp >= 0 {
            BigDecimal::new(digits << (exp as usize), 0)
        } else {
            // m * 2^-k == m * 5^k / 10^k
            let k = (-exp) as u32;
            BigDecimal::new(digits * BigInt::from(5u32).pow(k), i64::from(k))
        };

        Ok(Self::from_decimal(decimal))
    }

    /// Nearest `f64`. Precision loss is the caller's responsibility.
    ///
    /// Values beyond the `f64` range saturate to the signed infinity.
    pub fn to_f64(&self) -> f64 {
        // std's decimal parser is correctly rounded for any digit count and
        // saturates out-of-range exponents to infinity.
        let (digits, scale) = self.value.as_bigint_and_exponent();
        format!("{digits}e{}", -scale)
            .parse::<f64>()
            .unwrap_or(f64::NAN)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.value.as_ref() < &BigDecimal::zero()
    }

    pub fn abs(&self) -> Self {
        Self::from_decimal(self.value.abs())
    }

    pub fn checked_div(&self, rhs: &Self) -> Result<Self, DivisionByZero> {
        if rhs.is_zero() {
            return Err(DivisionByZero);
        }
        Ok(Self::rounded(self.value.as_ref() / rhs.value.as_ref()))
    }
}

impl Default for HighPrecision {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for HighPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HighPrecision({})", self.value)
    }
}

impl fmt::Display for HighPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl TryFrom<f64> for HighPrecision {
    type Error = NonFiniteValue;

    fn try_from(x: f64) -> Result<Self, Self::Error> {
        Self::from_f64(x)
    }
}

impl From<i64> for HighPrecision {
    fn from(x: i64) -> Self {
        Self::from_decimal(BigDecimal::from(x))
    }
}

impl PartialEq<f64> for HighPrecision {
    fn eq(&self, other: &f64) -> bool {
        Self::from_f64(*other).is_ok_and(|o| o == *self)
    }
}

impl PartialOrd<f64> for HighPrecision {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        Self::from_f64(*other).ok().map(|o| self.cmp(&o))
    }
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<&HighPrecision> for &HighPrecision {
            type Output = HighPrecision;

            fn $method(self, rhs: &HighPrecision) -> HighPrecision {
                HighPrecision::rounded(self.value.as_ref() $op rhs.value.as_ref())
            }
        }

        impl $trait for HighPrecision {
            type Output = HighPrecision;

            fn $method(self, rhs: HighPrecision) -> HighPrecision {
                &self $op &rhs
            }
        }

        impl $trait<&HighPrecision> for HighPrecision {
            type Output = HighPrecision;

            fn $method(self, rhs: &HighPrecision) -> HighPrecision {
                &self $op rhs
            }
        }
    };
}

binary_op!(Add, add, +);
binary_op!(Sub, sub, -);
binary_op!(Mul, mul, *);

/// # Panics
///
/// Panics if `rhs` is zero, like integer division. Use
/// [`HighPrecision::checked_div`] when the divisor is not known to be non-zero.
impl Div<&HighPrecision> for &HighPrecision {
    type Output = HighPrecision;

    fn div(self, rhs: &HighPrecision) -> HighPrecision {
        match self.checked_div(rhs) {
            Ok(q) => q,
            Err(e) => panic!("{e}"),
        }
    }
}

impl Div for HighPrecision {
    type Output = HighPrecision;

    fn div(self, rhs: HighPrecision) -> HighPrecision {
        &self / &rhs
    }
}

impl Neg for &HighPrecision {
    type Output = HighPrecision;

    fn neg(self) -> HighPrecision {
        HighPrecision::from_decimal(-self.value.as_ref().clone())
    }
}

impl Neg for HighPrecision {
    type Output = HighPrecision;

    fn neg(self) -> HighPrecision {
        -&self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn hp(x: f64) -> HighPrecision {
        HighPrecision::from_f64(x).unwrap()
    }

    #[test]
    fn default_is_explicit_zero() {
        let z = HighPrecision::default();
        assert!(z.is_zero());
        assert_eq!(z.to_f64(), 0.0);
    }

    #[test]
    fn construction_from_double_is_exact() {
        // 0.1 is not 1/10 in binary; the exact expansion must show it.
        let tenth = hp(0.1);
        assert_eq!(
            tenth.to_string(),
            "0.1000000000000000055511151231257827021181583404541015625"
        );
        assert_eq!(hp(-2.5).to_string(), "-2.5");
        assert_eq!(hp(1e16), 1e16);
    }

    #[test]
    fn subnormals_are_representable() {
        let tiny = hp(f64::from_bits(1));
        assert!(!tiny.is_zero());
        assert_eq!(tiny.to_f64(), f64::from_bits(1));
    }

    #[test]
    fn non_finite_is_rejected() {
        assert!(HighPrecision::from_f64(f64::NAN).unwrap_err().0.is_nan());
        assert!(HighPrecision::try_from(f64::INFINITY).is_err());
    }

    #[test]
    fn cancellation_does_not_lose_small_terms() {
        let sum = [1e16, 1.0, -1e16, 1.0]
            .iter()
            .fold(HighPrecision::zero(), |acc, &x| acc + hp(x));
        assert_eq!(sum.to_f64(), 2.0);
    }

    #[test]
    fn clone_is_independent() {
        let a = hp(3.0);
        let mut b = a.clone();
        b = b + hp(1.0);
        assert_eq!(a.to_f64(), 3.0);
        assert_eq!(b.to_f64(), 4.0);
    }

    #[test]
    fn arithmetic_operators() {
        let a = hp(6.0);
        let b = hp(4.0);
        assert_eq!((&a - &b).to_f64(), 2.0);
        assert_eq!((&a * &b).to_f64(), 24.0);
        assert_eq!((&a / &b).to_f64(), 1.5);
        assert_eq!((-&a).to_f64(), -6.0);
        assert!((-a).is_negative());
    }

    #[test]
    fn division_keeps_fifty_digits() {
        let third = HighPrecision::one().checked_div(&hp(3.0)).unwrap();
        let s = third.to_string();
        let digits = s.trim_start_matches("0.").len();
        assert_eq!(digits as u64, SIGNIFICANT_DIGITS);
        assert_relative_eq!(third.to_f64(), 1.0 / 3.0);
    }

    #[test]
    fn checked_div_by_zero() {
        assert_eq!(
            HighPrecision::one().checked_div(&HighPrecision::zero()),
            Err(DivisionByZero)
        );
    }

    #[test]
    #[should_panic(expected = "division by zero")]
    fn div_operator_panics_on_zero() {
        let _ = HighPrecision::one() / HighPrecision::zero();
    }

    #[test]
    fn overflowing_product_saturates_on_narrowing() {
        let big = hp(1e300);
        let product = &big * &big;
        assert_eq!(product.to_f64(), f64::INFINITY);
        assert_eq!((-product).to_f64(), f64::NEG_INFINITY);
    }

    proptest! {
        #[test]
        fn round_trip_is_identity(x in prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO) {
            prop_assert_eq!(hp(x).to_f64(), x);
        }

        #[test]
        fn dyadic_sums_narrow_like_ieee(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            // Short dyadic fractions are exact in both representations.
            let (x, y) = (a as f64 / 1024.0, b as f64 / 1024.0);
            prop_assert_eq!((hp(x) + hp(y)).to_f64(), x + y);
        }

        #[test]
        fn ordering_matches_f64(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            prop_assert_eq!(hp(a).cmp(&hp(b)), a.partial_cmp(&b).unwrap());
        }
    }
}
