//! Utilities to approximate equality of floating point values.
//!
//! Distances are counted in units in the last place (ULPs): the number of
//! representable values between two numbers of the same type. Results of the
//! same computation on two execution paths are expected to be bit-identical;
//! results compared against another library are expected within a few ULPs.

use half::f16;
use num_complex::Complex;

/// Largest distance, in ULPs, still rated [`ApproxEquality::Partial`].
pub const PARTIAL_MAX_ULPS: u64 = 4;

/// Largest distance, in ULPs, still rated [`ApproxEquality::Relative`].
pub const RELATIVE_MAX_ULPS: u64 = 256;

/// Distance in ULPs between two values of the same floating type.
pub trait Ulps: Copy {
    /// Number of representable values from `self` to `other`, or `None` if
    /// exactly one of them is NaN. `+0` and `-0` are zero ULPs apart.
    fn ulps(self, other: Self) -> Option<u64>;

    /// Same bit pattern, or both NaN.
    fn bit_eq(self, other: Self) -> bool;
}

/// Maps the bit pattern of a float (as a signed integer whose smallest value
/// is `min`) onto a line where adjacent floats are adjacent integers.
fn ordered(bits: i64, min: i64) -> i128 {
    if bits < 0 {
        i128::from(min) - i128::from(bits)
    } else {
        i128::from(bits)
    }
}

macro_rules! impl_ulps {
    ($ty:ty, $signed:ty) => {
        impl Ulps for $ty {
            fn ulps(self, other: Self) -> Option<u64> {
                match (self.is_nan(), other.is_nan()) {
                    (true, true) => Some(0),
                    (false, false) => {
                        let min = i64::from(<$signed>::MIN);
                        let a = ordered(i64::from(self.to_bits() as $signed), min);
                        let b = ordered(i64::from(other.to_bits() as $signed), min);
                        Some(u64::try_from((a - b).unsigned_abs()).unwrap_or(u64::MAX))
                    }
                    _ => None,
                }
            }

            fn bit_eq(self, other: Self) -> bool {
                (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
            }
        }

        impl RelativeEq<$ty> for $ty {
            fn approx_eq(&self, rhs: &$ty) -> ApproxEquality {
                rate(*self, *rhs)
            }
        }
    };
}

impl_ulps!(f16, i16);
impl_ulps!(f32, i32);
impl_ulps!(f64, i64);

/// Checks the distance between two values in ULPs.
pub trait RelativeEq<Rhs: ?Sized> {
    /// Enumerates the equality of `self`
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

fn rate<T: Ulps>(a: T, b: T) -> ApproxEquality {
    if a.bit_eq(b) {
        return ApproxEquality::Precise;
    }
    match a.ulps(b) {
        Some(d) if d <= PARTIAL_MAX_ULPS => ApproxEquality::Partial,
        Some(d) if d <= RELATIVE_MAX_ULPS => ApproxEquality::Relative,
        _ => ApproxEquality::Scarce,
    }
}

impl<T: Ulps> RelativeEq<Complex<T>> for Complex<T> {
    fn approx_eq(&self, rhs: &Complex<T>) -> ApproxEquality {
        rate(self.re, rhs.re).max(rate(self.im, rhs.im))
    }
}

impl<T: RelativeEq<U>, U> RelativeEq<[U]> for [T] {
    fn approx_eq(&self, rhs: &[U]) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        self.iter()
            .zip(rhs)
            .map(|(t, u)| t.approx_eq(u))
            .max()
            .unwrap_or(ApproxEquality::Precise)
    }
}

/// The approximated equality enumerated, from best to worst.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Identical bits (NaNs of any payload count as identical).
    Precise = 0,

    /// Within [`PARTIAL_MAX_ULPS`].
    Partial = 1,

    /// Within [`RELATIVE_MAX_ULPS`]
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

/// Whether `a` and `b` are within [`PARTIAL_MAX_ULPS`] of each other.
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) <= ApproxEquality::Partial
}

/// Whether `a` and `b` are bit-identical, element by element.
pub fn bit_identical<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) == ApproxEquality::Precise
}
