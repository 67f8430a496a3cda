//! Complex inverse tangents with IEEE special-value handling.
//!
//! `atanh` is the primitive; `atan` is derived from it through the identity
//! `atan(z) = -i * atanh(i * z)`, which amounts to evaluating `atanh` at the
//! swapped components and swapping the result back.
//!
//! Finite arguments of moderate size go through [`num_complex`]. Two cases
//! are settled before that:
//!
//! - a NaN component, where the sign and infinity of the other component
//!   decide whether a part of the result is still exact;
//! - a component beyond the reciprocal of the machine epsilon, where
//!   `atanh(z) ~ 1/z` underflows the real part to zero and the imaginary
//!   part saturates to `pi/2` with the sign of `Im z`. Infinities land here.

use num_complex::Complex;
use num_traits::Float;

/// `pi/2` in the precision of `T`.
#[inline]
fn half_pi<T: Float>() -> T {
    T::one().atan() * (T::one() + T::one())
}

/// Real and imaginary parts of `atanh(x + iy)`.
#[must_use]
pub fn atanh_parts<T: Float>(x: T, y: T) -> (T, T) {
    if x.is_nan() {
        if y.is_infinite() {
            return (T::zero().copysign(x), half_pi::<T>().copysign(y));
        }
        return (T::nan(), T::nan());
    }
    if y.is_nan() {
        if x.is_infinite() {
            return (T::zero().copysign(x), T::nan());
        }
        if x.is_zero() {
            return (x, T::nan());
        }
        return (T::nan(), T::nan());
    }

    let recip_epsilon = T::epsilon().recip();
    if x.abs() > recip_epsilon || y.abs() > recip_epsilon {
        return (T::zero(), half_pi::<T>().copysign(y));
    }

    let w = Complex::new(x, y).atanh();
    (w.re, w.im)
}

/// Inverse hyperbolic tangent.
#[must_use]
pub fn atanh<T: Float>(z: Complex<T>) -> Complex<T> {
    let (re, im) = atanh_parts(z.re, z.im);
    Complex::new(re, im)
}

/// Inverse tangent.
#[must_use]
pub fn atan<T: Float>(z: Complex<T>) -> Complex<T> {
    let (re, im) = atanh_parts(z.im, z.re);
    Complex::new(im, re)
}
