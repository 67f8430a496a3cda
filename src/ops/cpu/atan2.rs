//! Elementwise two-argument inverse tangent, `atan2(y, x)`.

use crate::ops::common::{binary_kernels, BinaryFunctor, BinaryKernels};
use crate::types::{BinaryTypeMap, ElementType};
use half::f16;
use num_traits::Float;

/// Angle of the point `(x, y)`, taking `y` first.
///
/// For `x = +inf` and finite `y` the result is a zero carrying the sign of
/// `y`, whatever the platform `atan2` does.
#[inline]
fn atan2<T: Float>(y: T, x: T) -> T {
    if x.is_infinite() && x.is_sign_positive() && y.is_finite() {
        return T::zero().copysign(y);
    }
    y.atan2(x)
}

/// `atan2(y, x)` of one pair of elements.
#[derive(Debug, Default, Clone, Copy)]
pub struct Atan2Functor;

macro_rules! impl_real {
    ($($ty:ty),*) => {$(
        impl BinaryFunctor<$ty, $ty> for Atan2Functor {
            type Output = $ty;
            const NAME: &'static str = "atan2";
            const SUPPORTS_SG_LOADSTORE: bool = true;

            #[inline]
            fn call(&self, y: $ty, x: $ty) -> $ty {
                atan2(y, x)
            }
        }
    )*};
}

impl_real!(f16, f32, f64);

/// Output type of `atan2` per pair of input types. Only matching real
/// floating pairs are defined; callers promote mixed pairs beforehand.
pub const ATAN2_OUTPUT_TYPES: BinaryTypeMap = BinaryTypeMap::new(&[
    ((ElementType::Float16, ElementType::Float16), ElementType::Float16),
    ((ElementType::Float32, ElementType::Float32), ElementType::Float32),
    ((ElementType::Float64, ElementType::Float64), ElementType::Float64),
]);

/// Kernels for `(lhs, rhs)`, or `None` where `atan2` is undefined.
#[must_use]
pub fn kernels(lhs: ElementType, rhs: ElementType) -> Option<BinaryKernels> {
    Some(match (lhs, rhs) {
        (ElementType::Float16, ElementType::Float16) => binary_kernels!(Atan2Functor, f16, f16),
        (ElementType::Float32, ElementType::Float32) => binary_kernels!(Atan2Functor, f32, f32),
        (ElementType::Float64, ElementType::Float64) => binary_kernels!(Atan2Functor, f64, f64),
        _ => return None,
    })
}
