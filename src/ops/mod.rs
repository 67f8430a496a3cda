//! # Elementwise Operation Layer
//!
//! This module exposes the inverse tangent family over
//! [`SharedBuffer`](crate::memory::SharedBuffer)s and
//! routes each call to the concrete kernel for the operand types.
//!
//! ## Submodules
//!
//! - [`common`]: functor traits, block geometry and the contiguous/strided drivers
//! - [`indexer`]: strided index translation and layout checks
//! - [`cpu`]: the `atan`, `atan2` and `atanh` functors, type maps and factories
//! - [`dispatch`]: per-function tables of concrete kernels
//!
//! ## Submission
//!
//! [`ElementwiseFunction`] is the entry point. It resolves the output type,
//! rejects undefined input types and mismatched output buffers before anything
//! is enqueued, then hands the operands to the kernel, which returns an
//! [`Event`] straight away.
//!
//! Example:
//! ```rust
//! use arcwise::device::Queue;
//! use arcwise::memory::SharedBuffer;
//! use arcwise::ops::{ElementwiseFunction, Operand};
//! use arcwise::types::ElementType;
//!
//! let queue = Queue::default_queue().unwrap();
//! let x = SharedBuffer::from_slice(&[0.0f64, 1.0, f64::INFINITY]);
//! let y = SharedBuffer::zeroed(ElementType::Float64, 3);
//! ElementwiseFunction::Atan
//!     .unary_contig(queue, 3, Operand::new(&x), Operand::new(&y), &[])
//!     .unwrap()
//!     .wait()
//!     .unwrap();
//! let out: Vec<f64> = y.to_vec().unwrap();
//! assert_eq!(out[2], std::f64::consts::FRAC_PI_2);
//! ```

pub mod common;
pub mod cpu;
pub mod dispatch;
pub mod indexer;

pub use common::{Operand, VectorizationHyperparameters};

use crate::device::{Event, Queue};
use crate::error::{ElementwiseError, Result};
use crate::types::ElementType;
use dispatch::{BinaryDispatchTable, UnaryDispatchTable, ATAN2_DISPATCH, ATANH_DISPATCH, ATAN_DISPATCH};

/// The elementwise functions this crate provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementwiseFunction {
    /// Inverse tangent, real and complex.
    Atan,
    /// Two-argument inverse tangent `atan2(y, x)`, real.
    Atan2,
    /// Inverse hyperbolic tangent, real and complex.
    Atanh,
}

impl ElementwiseFunction {
    /// Every function.
    pub const ALL: [Self; 3] = [Self::Atan, Self::Atan2, Self::Atanh];

    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Atanh => "atanh",
        }
    }

    /// Number of input operands.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Atan | Self::Atanh => 1,
            Self::Atan2 => 2,
        }
    }

    fn unary_table(self) -> Result<&'static UnaryDispatchTable> {
        match self {
            Self::Atan => Ok(&*ATAN_DISPATCH),
            Self::Atanh => Ok(&*ATANH_DISPATCH),
            Self::Atan2 => Err(self.arity_mismatch(1)),
        }
    }

    fn binary_table(self) -> Result<&'static BinaryDispatchTable> {
        match self {
            Self::Atan2 => Ok(&*ATAN2_DISPATCH),
            Self::Atan | Self::Atanh => Err(self.arity_mismatch(2)),
        }
    }

    fn arity_mismatch(self, given: usize) -> ElementwiseError {
        ElementwiseError::ArityMismatch {
            function: self.name(),
            expected: self.arity(),
            given,
        }
    }

    /// Output type for the given input types.
    ///
    /// # Errors
    ///
    /// - [`ElementwiseError::ArityMismatch`] if `inputs.len()` is not the arity.
    /// - [`ElementwiseError::UnsupportedType`] if the function is undefined for
    ///   the inputs.
    pub fn result_type(self, inputs: &[ElementType]) -> Result<ElementType> {
        match *inputs {
            [arg] => self.unary_table()?.output_type(arg),
            [lhs, rhs] => self.binary_table()?.output_type(lhs, rhs),
            _ => Err(self.arity_mismatch(inputs.len())),
        }
    }

    fn check_output(self, expected: ElementType, res: &Operand<'_>) -> Result<()> {
        let found = res.element_type();
        if found != expected {
            return Err(ElementwiseError::OutputTypeMismatch {
                function: self.name(),
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Enqueues the function over `nelems` dense elements of `arg`, writing `res`.
    ///
    /// # Errors
    ///
    /// Undefined input type, mismatched output type, or operand validation
    /// failures. Nothing is enqueued in those cases.
    pub fn unary_contig(
        self,
        queue: &Queue,
        nelems: usize,
        arg: Operand<'_>,
        res: Operand<'_>,
        depends: &[Event],
    ) -> Result<Event> {
        let table = self.unary_table()?;
        let ty = arg.element_type();
        let kernel = table.contig(ty)?;
        self.check_output(table.output_type(ty)?, &res)?;
        log::trace!("{}: contiguous {ty}, {nelems} elements, {} deps", self.name(), depends.len());
        kernel(queue, nelems, arg, res, depends)
    }

    /// Enqueues the function over every multi-index of `shape`.
    ///
    /// # Errors
    ///
    /// Undefined input type, mismatched output type, or operand validation
    /// failures. Nothing is enqueued in those cases.
    #[allow(clippy::too_many_arguments)]
    pub fn unary_strided(
        self,
        queue: &Queue,
        nelems: usize,
        shape: &[usize],
        arg: Operand<'_>,
        res: Operand<'_>,
        depends: &[Event],
        additional_depends: &[Event],
    ) -> Result<Event> {
        let table = self.unary_table()?;
        let ty = arg.element_type();
        let kernel = table.strided(ty)?;
        self.check_output(table.output_type(ty)?, &res)?;
        log::trace!(
            "{}: strided {ty}, shape {shape:?}, {} + {} deps",
            self.name(),
            depends.len(),
            additional_depends.len()
        );
        kernel(queue, nelems, shape, arg, res, depends, additional_depends)
    }

    /// Enqueues the function over `nelems` dense element pairs.
    ///
    /// # Errors
    ///
    /// Undefined input types, mismatched output type, or operand validation
    /// failures. Nothing is enqueued in those cases.
    pub fn binary_contig(
        self,
        queue: &Queue,
        nelems: usize,
        arg1: Operand<'_>,
        arg2: Operand<'_>,
        res: Operand<'_>,
        depends: &[Event],
    ) -> Result<Event> {
        let table = self.binary_table()?;
        let (lhs, rhs) = (arg1.element_type(), arg2.element_type());
        let kernel = table.contig(lhs, rhs)?;
        self.check_output(table.output_type(lhs, rhs)?, &res)?;
        log::trace!(
            "{}: contiguous ({lhs}, {rhs}), {nelems} elements, {} deps",
            self.name(),
            depends.len()
        );
        kernel(queue, nelems, arg1, arg2, res, depends)
    }

    /// Enqueues the function over every multi-index of `shape`.
    ///
    /// # Errors
    ///
    /// Undefined input types, mismatched output type, or operand validation
    /// failures. Nothing is enqueued in those cases.
    #[allow(clippy::too_many_arguments)]
    pub fn binary_strided(
        self,
        queue: &Queue,
        nelems: usize,
        shape: &[usize],
        arg1: Operand<'_>,
        arg2: Operand<'_>,
        res: Operand<'_>,
        depends: &[Event],
        additional_depends: &[Event],
    ) -> Result<Event> {
        let table = self.binary_table()?;
        let (lhs, rhs) = (arg1.element_type(), arg2.element_type());
        let kernel = table.strided(lhs, rhs)?;
        self.check_output(table.output_type(lhs, rhs)?, &res)?;
        log::trace!(
            "{}: strided ({lhs}, {rhs}), shape {shape:?}, {} + {} deps",
            self.name(),
            depends.len(),
            additional_depends.len()
        );
        kernel(queue, nelems, shape, arg1, arg2, res, depends, additional_depends)
    }
}

impl core::fmt::Display for ElementwiseFunction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
