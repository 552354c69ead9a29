//! Scalar element types
//!
//! Integer addition, subtraction and multiplication wrap on overflow on the
//! host and in device kernels alike. Integer division and remainder by zero
//! panic, exactly as the primitive operators do. Transcendental functions on integers round-trip through
//! `f64` and truncate.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};
use tessera_backends::DType;

/// Element type of a tensor
pub trait Element:
    bytemuck::Pod
    + Copy
    + Default
    + PartialEq
    + PartialOrd
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Rem<Output = Self>
    + Neg<Output = Self>
{
    /// Precision tag used for device kernels
    const DTYPE: DType;

    fn zero() -> Self;
    fn one() -> Self;

    /// Smallest finite value
    fn lowest() -> Self;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn from_usize(value: usize) -> Self;

    /// Two's-complement `+` for integers, plain `+` for floats
    fn add_wrapping(self, rhs: Self) -> Self;
    fn sub_wrapping(self, rhs: Self) -> Self;
    fn mul_wrapping(self, rhs: Self) -> Self;

    fn abs(self) -> Self;
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;

    /// `ln(1 + exp(x))`
    fn softplus(self) -> Self {
        Self::from_f64(self.to_f64().exp().ln_1p())
    }

    fn max_of(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }

    fn min_of(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }
}

macro_rules! float_element {
    ($t:ident, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            fn zero() -> Self {
                0.0
            }
            fn one() -> Self {
                1.0
            }
            fn lowest() -> Self {
                $t::MIN
            }
            fn from_f64(value: f64) -> Self {
                value as $t
            }
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_usize(value: usize) -> Self {
                value as $t
            }
            fn add_wrapping(self, rhs: Self) -> Self {
                self + rhs
            }
            fn sub_wrapping(self, rhs: Self) -> Self {
                self - rhs
            }
            fn mul_wrapping(self, rhs: Self) -> Self {
                self * rhs
            }
            fn abs(self) -> Self {
                $t::abs(self)
            }
            fn sqrt(self) -> Self {
                $t::sqrt(self)
            }
            fn exp(self) -> Self {
                $t::exp(self)
            }
            fn ln(self) -> Self {
                $t::ln(self)
            }
            fn softplus(self) -> Self {
                $t::ln_1p($t::exp(self))
            }
        }
    };
}

macro_rules! int_element {
    ($t:ident, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            fn zero() -> Self {
                0
            }
            fn one() -> Self {
                1
            }
            fn lowest() -> Self {
                $t::MIN
            }
            fn from_f64(value: f64) -> Self {
                value as $t
            }
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_usize(value: usize) -> Self {
                value as $t
            }
            fn add_wrapping(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }
            fn sub_wrapping(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }
            fn mul_wrapping(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
            fn abs(self) -> Self {
                self.wrapping_abs()
            }
            fn sqrt(self) -> Self {
                (self as f64).sqrt() as $t
            }
            fn exp(self) -> Self {
                (self as f64).exp() as $t
            }
            fn ln(self) -> Self {
                (self as f64).ln() as $t
            }
        }
    };
}

float_element!(f32, DType::F32);
float_element!(f64, DType::F64);
int_element!(i32, DType::I32);
int_element!(i64, DType::I64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_tags() {
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(f64::DTYPE, DType::F64);
        assert_eq!(i32::DTYPE, DType::I32);
        assert_eq!(i64::DTYPE, DType::I64);
    }

    #[test]
    fn test_lowest_is_below_everything() {
        assert!(f32::lowest() < -1.0e30);
        assert_eq!(i64::lowest(), i64::MIN);
        assert_eq!(3.0f64.max_of(f64::lowest()), 3.0);
    }

    #[test]
    fn test_softplus() {
        assert!((0.0f64.softplus() - std::f64::consts::LN_2).abs() < 1e-12);
        assert!((Element::softplus(0.0f32) - std::f32::consts::LN_2).abs() < 1e-6);
        assert_eq!(Element::softplus(10i32), 10);
    }

    #[test]
    fn test_integer_math_truncates() {
        assert_eq!(Element::sqrt(17i32), 4);
        assert_eq!(Element::abs(-5i64), 5);
        assert_eq!(Element::exp(1i32), 2);
    }

    #[test]
    fn test_integer_overflow_wraps() {
        assert_eq!(i32::MAX.add_wrapping(1), i32::MIN);
        assert_eq!(i64::MIN.sub_wrapping(1), i64::MAX);
        assert_eq!((1i32 << 30).mul_wrapping(4), 0);
        assert_eq!(1.5f64.add_wrapping(2.0), 3.5);
    }
}
