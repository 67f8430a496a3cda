//! Error types.
//!
//! Two layers of failure exist. [`DeviceError`] describes a unit of work that
//! failed while running (or could not run) on a queue; it is cloneable because
//! every holder of the corresponding [`Event`](crate::device::Event) observes
//! the same failure. [`ElementwiseError`] is what the public entry points
//! return and covers everything detected synchronously at submission time.

use crate::types::ElementType;
use thiserror::Error;

/// Failure of a unit of work on a [`Queue`](crate::device::Queue).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The execution resources backing a queue could not be created.
    #[error("device unavailable: {0}")]
    Unavailable(String),
    /// A launch needed more work-items than the queue allows.
    #[error("out of resources: {requested} work-items requested, limit is {limit}")]
    OutOfResources {
        /// Work-items the launch needed.
        requested: usize,
        /// Work-items the queue allows.
        limit: usize,
    },
    /// The kernel body panicked.
    #[error("kernel `{label}` panicked: {message}")]
    KernelPanicked {
        /// Label of the submission.
        label: &'static str,
        /// Panic payload, if it was a string.
        message: String,
    },
    /// A prerequisite failed, so this unit of work never ran. Holds the
    /// failure that started the chain, however many links back it was.
    #[error("dependency failed: {0}")]
    DependencyFailed(Box<DeviceError>),
}

/// Errors returned by the elementwise entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementwiseError {
    /// The function has no kernel for the input type(s).
    #[error("{function} is not defined for input types {inputs:?}")]
    UnsupportedType {
        /// Function name.
        function: &'static str,
        /// Input element types, in operand order.
        inputs: Vec<ElementType>,
    },
    /// The output buffer does not hold the resolved output type.
    #[error("{function} produces {expected}, but the output buffer holds {found}")]
    OutputTypeMismatch {
        /// Function name.
        function: &'static str,
        /// Resolved output type.
        expected: ElementType,
        /// Element type of the output buffer.
        found: ElementType,
    },
    /// The function was called with the wrong number of inputs.
    #[error("{function} takes {expected} input(s), {given} given")]
    ArityMismatch {
        /// Function name.
        function: &'static str,
        /// Inputs the function takes.
        expected: usize,
        /// Inputs supplied.
        given: usize,
    },
    /// A kernel was handed a buffer of a type it was not built for.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// Element count and shape disagree, or strides have the wrong rank.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// An operand reaches outside its buffer.
    #[error("operand {operand} reaches element {index}, but the buffer holds {len} elements")]
    OutOfBounds {
        /// Operand position (inputs first, output last).
        operand: usize,
        /// First offending element offset.
        index: isize,
        /// Buffer length in elements.
        len: usize,
    },
    /// Output memory overlaps itself or partially overlaps an input.
    #[error("overlapping operands: {0}")]
    OverlappingOperands(String),
    /// Device-side failure, observed on a host access or while waiting.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Result alias used across the crate.
pub type Result<T, E = ElementwiseError> = core::result::Result<T, E>;
