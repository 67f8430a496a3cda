//! Element types and type resolution.
//!
//! Every kernel in this crate is specialized for one concrete element type
//! (or one pair of types for binary functions). This module names those
//! types with the closed [`ElementType`] enumeration, ties them to their host
//! representations through the [`Element`] trait, and provides the ordered
//! type maps each function uses to decide its output type.
//!
//! # Type maps
//!
//! A type map is an ordered list of rules; the first rule whose input matches
//! wins and yields the output type. No match means the combination is
//! undefined for that function, and the dispatch layer refuses it before any
//! work is enqueued.
//!
//! ```rust
//! use arcwise::types::{ElementType, UnaryTypeMap};
//!
//! const MAP: UnaryTypeMap = UnaryTypeMap::new(&[
//!     (ElementType::Float32, ElementType::Float32),
//!     (ElementType::Float64, ElementType::Float64),
//! ]);
//! assert_eq!(MAP.resolve(ElementType::Float64), Some(ElementType::Float64));
//! assert_eq!(MAP.resolve(ElementType::Int32), None);
//! ```

use core::convert::TryFrom;
use core::fmt;
use half::f16;
use num_complex::Complex;

/// Closed enumeration of element types a buffer may hold.
///
/// Complex names follow the total width: `Complex64` holds two `f32`s,
/// `Complex128` holds two `f64`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ElementType {
    /// `bool`
    Bool = 0,
    /// `i8`
    Int8,
    /// `u8`
    UInt8,
    /// `i16`
    Int16,
    /// `u16`
    UInt16,
    /// `i32`
    Int32,
    /// `u32`
    UInt32,
    /// `i64`
    Int64,
    /// `u64`
    UInt64,
    /// IEEE-754 binary16, [`half::f16`]
    Float16,
    /// `f32`
    Float32,
    /// `f64`
    Float64,
    /// `Complex<f32>`
    Complex64,
    /// `Complex<f64>`
    Complex128,
}

impl ElementType {
    /// Number of element types.
    pub const COUNT: usize = 14;

    /// All element types, ordered by their dense index.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Bool,
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Float16,
        Self::Float32,
        Self::Float64,
        Self::Complex64,
        Self::Complex128,
    ];

    /// Dense index in `0..COUNT`, used to address dispatch tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Complex64 => 8,
            Self::Complex128 => 16,
        }
    }

    /// Whether the type is a complex floating type.
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// Whether the type is a real floating type.
    #[must_use]
    pub const fn is_real_floating(self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    /// Short lowercase name, as used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for ElementType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(usize::from(value)).copied().ok_or(())
    }
}

/// A host type that can live in a [`SharedBuffer`](crate::memory::SharedBuffer).
///
/// # Safety
///
/// Buffers are reinterpreted as slices of the implementing type, so an
/// implementor must:
///
/// - have `size_of::<Self>() == Self::TYPE.size_of()`
/// - have an alignment of at most 16 bytes
/// - be plain data, valid for every bit pattern an element of `Self::TYPE`
///   can hold, the all-zero pattern included
///
/// Safe code cannot claim a tag for an arbitrary type:
///
/// ```rust,compile_fail
/// use arcwise::types::{Element, ElementType};
///
/// #[derive(Clone, Copy)]
/// struct Wide([u8; 64]);
///
/// impl Element for Wide {
///     const TYPE: ElementType = ElementType::Float64;
/// }
/// ```
pub unsafe trait Element: Copy + Send + Sync + 'static {
    /// The tag describing this type.
    const TYPE: ElementType;
}

macro_rules! impl_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            // SAFETY: primitive or `repr(C)` pair of primitives matching the tag.
            unsafe impl Element for $ty {
                const TYPE: ElementType = ElementType::$tag;
            }

            const _: () = assert!(
                core::mem::size_of::<$ty>() == ElementType::$tag.size_of()
                    && core::mem::align_of::<$ty>() <= 16
            );
        )*
    };
}

impl_element! {
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f16 => Float16,
    f32 => Float32,
    f64 => Float64,
    Complex<f32> => Complex64,
    Complex<f64> => Complex128,
}

/// Ordered (input → output) rules for a unary function.
#[derive(Debug, Clone, Copy)]
pub struct UnaryTypeMap {
    rules: &'static [(ElementType, ElementType)],
}

impl UnaryTypeMap {
    /// Creates a type map from ordered rules.
    #[must_use]
    pub const fn new(rules: &'static [(ElementType, ElementType)]) -> Self {
        Self { rules }
    }

    /// Output type for `input`, or `None` if the function is undefined for it.
    #[must_use]
    pub fn resolve(&self, input: ElementType) -> Option<ElementType> {
        self.rules
            .iter()
            .find(|(arg, _)| *arg == input)
            .map(|&(_, out)| out)
    }

    /// The rules, in match order.
    #[must_use]
    pub const fn rules(&self) -> &'static [(ElementType, ElementType)] {
        self.rules
    }
}

/// Ordered ((lhs, rhs) → output) rules for a binary function.
#[derive(Debug, Clone, Copy)]
pub struct BinaryTypeMap {
    rules: &'static [((ElementType, ElementType), ElementType)],
}

impl BinaryTypeMap {
    /// Creates a type map from ordered rules.
    #[must_use]
    pub const fn new(rules: &'static [((ElementType, ElementType), ElementType)]) -> Self {
        Self { rules }
    }

    /// Output type for the pair, or `None` if the function is undefined for it.
    #[must_use]
    pub fn resolve(&self, lhs: ElementType, rhs: ElementType) -> Option<ElementType> {
        self.rules
            .iter()
            .find(|((a, b), _)| *a == lhs && *b == rhs)
            .map(|&(_, out)| out)
    }

    /// The rules, in match order.
    #[must_use]
    pub const fn rules(&self) -> &'static [((ElementType, ElementType), ElementType)] {
        self.rules
    }
}
