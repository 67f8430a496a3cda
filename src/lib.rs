//! # `arcwise`
//!
//! Elementwise inverse tangent kernels over N-dimensional buffers.
//!
//! The crate evaluates `atan`, `atan2` and `atanh` over dense or strided views
//! of typed [`SharedBuffer`]s. Work is submitted to a [`Queue`] (a pool of
//! worker lanes acting as the accelerator) and returns an [`Event`] at once;
//! events chain as prerequisites of later submissions and can be waited on or
//! awaited.
//!
//! ## Features
//!
//! - **Types**: `f16`, `f32`, `f64` and complex `f32`/`f64` for the unary
//!   functions, matching real pairs for `atan2`
//! - **Layouts**: a vectorised contiguous path and a general strided path
//!   (transposes, reversed axes, broadcasts) with bit-identical results
//! - **Special values**: complex results follow the IEEE conventions for
//!   infinities, NaNs and signed zeros
//! - **Safety**: operands are validated before enqueue, and buffer accesses
//!   are ordered so concurrent submissions never race
//!
//! ## Modules
//!
//! - [`types`]: element type tags and output type maps
//! - [`memory`]: shared buffers
//! - [`device`]: queues and completion events
//! - [`backend`]: the default execution backend
//! - [`ops`]: functors, kernels, dispatch tables and the submission facade
//! - [`approx`]: ULP comparisons
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```rust
//! use arcwise::{ElementType, ElementwiseFunction, Operand, Queue, SharedBuffer};
//! use num_complex::Complex;
//!
//! let queue = Queue::default_queue().unwrap();
//! let z = SharedBuffer::from_slice(&[Complex::new(1.0f64, 64_387_093.0)]);
//! let w = SharedBuffer::zeroed(ElementType::Complex128, 1);
//!
//! let done = ElementwiseFunction::Atan
//!     .unary_contig(queue, 1, Operand::new(&z), Operand::new(&w), &[])
//!     .unwrap();
//! done.wait().unwrap();
//!
//! let out: Vec<Complex<f64>> = w.to_vec().unwrap();
//! assert!((out[0].re - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::module_name_repetitions
)]
#![forbid(unused_must_use)]
#![warn(missing_docs)]

pub mod approx;
pub mod backend;
pub mod device;
pub mod error;
pub mod memory;
pub mod ops;
pub mod types;

pub use device::{Event, Queue, QueueConfig};
pub use error::{DeviceError, ElementwiseError};
pub use memory::SharedBuffer;
pub use ops::{ElementwiseFunction, Operand};
pub use types::{Element, ElementType};
