//! Host kernels of the elementwise inverse tangents.
//!
//! Each submodule provides, for one function:
//!
//! - a zero-sized functor implementing [`UnaryFunctor`](super::common::UnaryFunctor)
//!   or [`BinaryFunctor`](super::common::BinaryFunctor) for every supported
//!   element type,
//! - the output type map,
//! - a kernel factory returning the contiguous and strided entry points for
//!   one input type (or pair), or `None` where the function is undefined.
//!
//! The real functors work on `half::f16`, `f32` and `f64` through
//! [`num_traits::Float`]; `f16` is evaluated in single precision and rounded
//! back. The complex functors share [`complex`].

pub mod atan;
pub mod atan2;
pub mod atanh;
pub mod complex;
