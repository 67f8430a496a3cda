//! Dispatch tables.
//!
//! A dispatch table maps each element type (or ordered pair of element types)
//! to the concrete kernels of one function. Tables are built once per process
//! from a function's output type map and kernel factory, then looked up on
//! every submission.
//!
//! Building checks that the factory and the type map agree: an input type has
//! kernels exactly when the map resolves it, and the kernels write the type
//! the map names. A disagreement is a programming error and panics during
//! the build.
//!
//! # Example
//! ```rust
//! use arcwise::ops::dispatch::{ATAN2_DISPATCH, ATAN_DISPATCH};
//! use arcwise::types::ElementType;
//!
//! assert_eq!(
//!     ATAN_DISPATCH.output_type(ElementType::Complex64).unwrap(),
//!     ElementType::Complex64
//! );
//! assert!(ATAN2_DISPATCH.entry(ElementType::Float32, ElementType::Float64).contig.is_none());
//! ```

use super::common::{
    BinaryContigFn, BinaryKernels, BinaryStridedFn, UnaryContigFn, UnaryKernels,
    UnaryStridedFn, VectorizationHyperparameters,
};
use super::cpu::{atan, atan2, atanh};
use crate::error::{ElementwiseError, Result};
use crate::types::{BinaryTypeMap, ElementType, UnaryTypeMap};

/// Kernel factory of a one-argument function.
pub type UnaryFactory = fn(ElementType) -> Option<UnaryKernels>;

/// Kernel factory of a two-argument function.
pub type BinaryFactory = fn(ElementType, ElementType) -> Option<BinaryKernels>;

/// Table slot of one input type. All fields are `None` where the function is
/// undefined.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnaryDispatchEntry {
    /// Dense entry point.
    pub contig: Option<UnaryContigFn>,
    /// Strided entry point.
    pub strided: Option<UnaryStridedFn>,
    /// Output element type.
    pub output_type: Option<ElementType>,
    /// Block geometry of the dense entry point.
    pub hyperparameters: Option<VectorizationHyperparameters>,
}

/// Table slot of one pair of input types.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryDispatchEntry {
    /// Dense entry point.
    pub contig: Option<BinaryContigFn>,
    /// Strided entry point.
    pub strided: Option<BinaryStridedFn>,
    /// Output element type.
    pub output_type: Option<ElementType>,
    /// Block geometry of the dense entry point.
    pub hyperparameters: Option<VectorizationHyperparameters>,
}

/// Kernels of a one-argument function, indexed by input type.
#[derive(Debug)]
pub struct UnaryDispatchTable {
    function: &'static str,
    entries: [UnaryDispatchEntry; ElementType::COUNT],
}

impl UnaryDispatchTable {
    /// Builds the table of `function` from its type map and factory.
    ///
    /// # Panics
    ///
    /// If the factory and the type map disagree for any input type.
    #[must_use]
    pub fn build(function: &'static str, types: &UnaryTypeMap, factory: UnaryFactory) -> Self {
        let mut entries = [UnaryDispatchEntry::default(); ElementType::COUNT];
        for ty in ElementType::ALL {
            entries[ty.index()] = match (types.resolve(ty), factory(ty)) {
                (None, None) => UnaryDispatchEntry::default(),
                (Some(out), Some(k)) => {
                    assert_eq!(
                        out, k.output_type,
                        "{function}({ty}): kernel writes {}, type map says {out}",
                        k.output_type
                    );
                    UnaryDispatchEntry {
                        contig: Some(k.contig),
                        strided: Some(k.strided),
                        output_type: Some(out),
                        hyperparameters: Some(k.hyperparameters),
                    }
                }
                (Some(out), None) => panic!("{function}({ty}) -> {out} has no kernel"),
                (None, Some(_)) => panic!("{function}({ty}) has a kernel but no output type"),
            };
        }

        let table = Self { function, entries };
        log::debug!(
            "{function}: dispatch table built, defined for {:?}",
            table.supported_types().collect::<Vec<_>>()
        );
        table
    }

    /// Name of the function.
    #[must_use]
    pub fn function(&self) -> &'static str {
        self.function
    }

    /// Slot of `input`.
    #[must_use]
    pub fn entry(&self, input: ElementType) -> &UnaryDispatchEntry {
        &self.entries[input.index()]
    }

    /// Input types the function is defined for.
    pub fn supported_types(&self) -> impl Iterator<Item = ElementType> + '_ {
        ElementType::ALL
            .into_iter()
            .filter(|ty| self.entry(*ty).output_type.is_some())
    }

    fn unsupported(&self, input: ElementType) -> ElementwiseError {
        ElementwiseError::UnsupportedType {
            function: self.function,
            inputs: vec![input],
        }
    }

    /// Output type for `input`.
    ///
    /// # Errors
    ///
    /// [`ElementwiseError::UnsupportedType`] where the function is undefined.
    pub fn output_type(&self, input: ElementType) -> Result<ElementType> {
        self.entry(input)
            .output_type
            .ok_or_else(|| self.unsupported(input))
    }

    /// Dense entry point for `input`.
    ///
    /// # Errors
    ///
    /// [`ElementwiseError::UnsupportedType`] where the function is undefined.
    pub fn contig(&self, input: ElementType) -> Result<UnaryContigFn> {
        self.entry(input).contig.ok_or_else(|| self.unsupported(input))
    }

    /// Strided entry point for `input`.
    ///
    /// # Errors
    ///
    /// [`ElementwiseError::UnsupportedType`] where the function is undefined.
    pub fn strided(&self, input: ElementType) -> Result<UnaryStridedFn> {
        self.entry(input).strided.ok_or_else(|| self.unsupported(input))
    }
}

/// Kernels of a two-argument function, indexed by input type pair.
#[derive(Debug)]
pub struct BinaryDispatchTable {
    function: &'static str,
    entries: [[BinaryDispatchEntry; ElementType::COUNT]; ElementType::COUNT],
}

impl BinaryDispatchTable {
    /// Builds the table of `function` from its type map and factory.
    ///
    /// # Panics
    ///
    /// If the factory and the type map disagree for any input pair.
    #[must_use]
    pub fn build(function: &'static str, types: &BinaryTypeMap, factory: BinaryFactory) -> Self {
        let mut entries =
            [[BinaryDispatchEntry::default(); ElementType::COUNT]; ElementType::COUNT];
        for lhs in ElementType::ALL {
            for rhs in ElementType::ALL {
                entries[lhs.index()][rhs.index()] =
                    match (types.resolve(lhs, rhs), factory(lhs, rhs)) {
                        (None, None) => BinaryDispatchEntry::default(),
                        (Some(out), Some(k)) => {
                            assert_eq!(
                                out, k.output_type,
                                "{function}({lhs}, {rhs}): kernel writes {}, type map says {out}",
                                k.output_type
                            );
                            BinaryDispatchEntry {
                                contig: Some(k.contig),
                                strided: Some(k.strided),
                                output_type: Some(out),
                                hyperparameters: Some(k.hyperparameters),
                            }
                        }
                        (Some(out), None) => {
                            panic!("{function}({lhs}, {rhs}) -> {out} has no kernel")
                        }
                        (None, Some(_)) => {
                            panic!("{function}({lhs}, {rhs}) has a kernel but no output type")
                        }
                    };
            }
        }

        let table = Self { function, entries };
        log::debug!(
            "{function}: dispatch table built, defined for {:?}",
            table.supported_types().collect::<Vec<_>>()
        );
        table
    }

    /// Name of the function.
    #[must_use]
    pub fn function(&self) -> &'static str {
        self.function
    }

    /// Slot of `(lhs, rhs)`.
    #[must_use]
    pub fn entry(&self, lhs: ElementType, rhs: ElementType) -> &BinaryDispatchEntry {
        &self.entries[lhs.index()][rhs.index()]
    }

    /// Input pairs the function is defined for.
    pub fn supported_types(&self) -> impl Iterator<Item = (ElementType, ElementType)> + '_ {
        ElementType::ALL
            .into_iter()
            .flat_map(|lhs| ElementType::ALL.into_iter().map(move |rhs| (lhs, rhs)))
            .filter(|&(lhs, rhs)| self.entry(lhs, rhs).output_type.is_some())
    }

    fn unsupported(&self, lhs: ElementType, rhs: ElementType) -> ElementwiseError {
        ElementwiseError::UnsupportedType {
            function: self.function,
            inputs: vec![lhs, rhs],
        }
    }

    /// Output type for `(lhs, rhs)`.
    ///
    /// # Errors
    ///
    /// [`ElementwiseError::UnsupportedType`] where the function is undefined.
    pub fn output_type(&self, lhs: ElementType, rhs: ElementType) -> Result<ElementType> {
        self.entry(lhs, rhs)
            .output_type
            .ok_or_else(|| self.unsupported(lhs, rhs))
    }

    /// Dense entry point for `(lhs, rhs)`.
    ///
    /// # Errors
    ///
    /// [`ElementwiseError::UnsupportedType`] where the function is undefined.
    pub fn contig(&self, lhs: ElementType, rhs: ElementType) -> Result<BinaryContigFn> {
        self.entry(lhs, rhs)
            .contig
            .ok_or_else(|| self.unsupported(lhs, rhs))
    }

    /// Strided entry point for `(lhs, rhs)`.
    ///
    /// # Errors
    ///
    /// [`ElementwiseError::UnsupportedType`] where the function is undefined.
    pub fn strided(&self, lhs: ElementType, rhs: ElementType) -> Result<BinaryStridedFn> {
        self.entry(lhs, rhs)
            .strided
            .ok_or_else(|| self.unsupported(lhs, rhs))
    }
}

lazy_static::lazy_static! {
    /// Process-wide kernels of `atan`.
    pub static ref ATAN_DISPATCH: UnaryDispatchTable =
        UnaryDispatchTable::build("atan", &atan::ATAN_OUTPUT_TYPES, atan::kernels);

    /// Process-wide kernels of `atanh`.
    pub static ref ATANH_DISPATCH: UnaryDispatchTable =
        UnaryDispatchTable::build("atanh", &atanh::ATANH_OUTPUT_TYPES, atanh::kernels);

    /// Process-wide kernels of `atan2`.
    pub static ref ATAN2_DISPATCH: BinaryDispatchTable =
        BinaryDispatchTable::build("atan2", &atan2::ATAN2_OUTPUT_TYPES, atan2::kernels);
}
