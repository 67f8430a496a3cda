//! Elementwise inverse hyperbolic tangent.

use super::complex;
use crate::ops::common::{unary_kernels, UnaryFunctor, UnaryKernels};
use crate::types::{ElementType, UnaryTypeMap};
use half::f16;
use num_complex::Complex;
use num_traits::Float;

/// `atanh(x)` of one element.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtanhFunctor;

macro_rules! impl_real {
    ($($ty:ty),*) => {$(
        impl UnaryFunctor<$ty> for AtanhFunctor {
            type Output = $ty;
            const NAME: &'static str = "atanh";
            const SUPPORTS_SG_LOADSTORE: bool = true;

            #[inline]
            fn call(&self, x: $ty) -> $ty {
                Float::atanh(x)
            }
        }
    )*};
}

macro_rules! impl_complex {
    ($($ty:ty),*) => {$(
        impl UnaryFunctor<Complex<$ty>> for AtanhFunctor {
            type Output = Complex<$ty>;
            const NAME: &'static str = "atanh";
            const SUPPORTS_SG_LOADSTORE: bool = false;

            #[inline]
            fn call(&self, z: Complex<$ty>) -> Complex<$ty> {
                complex::atanh(z)
            }
        }
    )*};
}

impl_real!(f16, f32, f64);
impl_complex!(f32, f64);

/// Output type of `atanh` per input type.
pub const ATANH_OUTPUT_TYPES: UnaryTypeMap = UnaryTypeMap::new(&[
    (ElementType::Float16, ElementType::Float16),
    (ElementType::Float32, ElementType::Float32),
    (ElementType::Float64, ElementType::Float64),
    (ElementType::Complex64, ElementType::Complex64),
    (ElementType::Complex128, ElementType::Complex128),
]);

/// Kernels for `input`, or `None` where `atanh` is undefined.
#[must_use]
pub fn kernels(input: ElementType) -> Option<UnaryKernels> {
    Some(match input {
        ElementType::Float16 => unary_kernels!(AtanhFunctor, f16),
        ElementType::Float32 => unary_kernels!(AtanhFunctor, f32),
        ElementType::Float64 => unary_kernels!(AtanhFunctor, f64),
        ElementType::Complex64 => unary_kernels!(AtanhFunctor, Complex<f32>),
        ElementType::Complex128 => unary_kernels!(AtanhFunctor, Complex<f64>),
        _ => return None,
    })
}
