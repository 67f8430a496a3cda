//! Shared elementwise kernel machinery.
//!
//! Every elementwise function is a *functor*: a zero-sized value that maps one
//! element (or a pair of elements) to a result. The drivers in this module
//! turn a functor into two entry points per input type:
//!
//! - a **contiguous** kernel, where all operands are dense runs starting at
//!   an element offset. Each work-item processes `N_VECS` blocks of `VEC_SZ`
//!   consecutive elements, loading and storing whole blocks at a time when the
//!   functor allows it, and falls back to a scalar loop on the tail.
//! - a **strided** kernel, where operands share a shape but carry their own
//!   strides. One work-item per logical position, located via
//!   [`StridedIndexer`].
//!
//! Both validate operands before anything is enqueued and return an [`Event`]
//! without waiting for the work.

use super::indexer::{is_non_overlapping, StridedIndexer};
use crate::device::{Event, Queue};
use crate::error::{ElementwiseError, Result};
use crate::memory::{BufferAccess, DevicePtr, SharedBuffer};
use crate::types::{Element, ElementType};
use rayon::prelude::*;

/// Lower bound on work-items a lane takes at once.
const MIN_WORK_ITEMS_PER_LANE: usize = 64;

/// Elementwise function of one argument of type `A`.
pub trait UnaryFunctor<A: Element>: Copy + Default + Send + Sync + 'static {
    /// Result element type.
    type Output: Element;

    /// Name used in logs and panic labels.
    const NAME: &'static str;

    /// The result does not depend on the argument.
    const IS_CONSTANT: bool = false;

    /// [`call_vec`](Self::call_vec) is a specialised block implementation.
    const SUPPORTS_VEC: bool = false;

    /// Whole blocks may be loaded and stored in one transaction.
    const SUPPORTS_SG_LOADSTORE: bool;

    /// Evaluates one element.
    fn call(&self, x: A) -> Self::Output;

    /// The value every element maps to when [`IS_CONSTANT`](Self::IS_CONSTANT).
    #[inline]
    fn constant_value(&self) -> Option<Self::Output> {
        None
    }

    /// Evaluates a block of `N` elements.
    #[inline]
    fn call_vec<const N: usize>(&self, x: [A; N]) -> [Self::Output; N] {
        x.map(|v| self.call(v))
    }
}

/// Elementwise function of two arguments of types `A` and `B`.
pub trait BinaryFunctor<A: Element, B: Element>: Copy + Default + Send + Sync + 'static {
    /// Result element type.
    type Output: Element;

    /// Name used in logs and panic labels.
    const NAME: &'static str;

    /// The result does not depend on the arguments.
    const IS_CONSTANT: bool = false;

    /// [`call_vec`](Self::call_vec) is a specialised block implementation.
    const SUPPORTS_VEC: bool = false;

    /// Whole blocks may be loaded and stored in one transaction.
    const SUPPORTS_SG_LOADSTORE: bool;

    /// Evaluates one pair of elements.
    fn call(&self, a: A, b: B) -> Self::Output;

    /// The value every pair maps to when [`IS_CONSTANT`](Self::IS_CONSTANT).
    #[inline]
    fn constant_value(&self) -> Option<Self::Output> {
        None
    }

    /// Evaluates a block of `N` pairs.
    #[inline]
    fn call_vec<const N: usize>(&self, a: [A; N], b: [B; N]) -> [Self::Output; N] {
        core::array::from_fn(|i| self.call(a[i], b[i]))
    }
}

/// Block geometry of a contiguous kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorizationHyperparameters {
    /// Elements per block.
    pub vec_sz: usize,
    /// Blocks per work-item.
    pub n_vecs: usize,
}

impl VectorizationHyperparameters {
    /// Four-element blocks, two per work-item.
    pub const DEFAULT: Self = Self::new(4, 2);

    /// Creates a block geometry.
    #[must_use]
    pub const fn new(vec_sz: usize, n_vecs: usize) -> Self {
        Self { vec_sz, n_vecs }
    }

    /// Elements each work-item covers.
    #[must_use]
    pub const fn elems_per_work_item(self) -> usize {
        self.vec_sz * self.n_vecs
    }

    /// Work-items needed for `nelems` elements.
    #[must_use]
    pub const fn work_items(self, nelems: usize) -> usize {
        nelems.div_ceil(self.elems_per_work_item())
    }
}

impl Default for VectorizationHyperparameters {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A buffer viewed as an operand: base element offset plus, for strided
/// kernels, one stride per dimension (in elements, possibly negative or zero).
#[derive(Debug, Clone, Copy)]
pub struct Operand<'a> {
    /// Backing buffer.
    pub buffer: &'a SharedBuffer,
    /// Element offset of logical position zero.
    pub offset: isize,
    /// Element strides; ignored by contiguous kernels.
    pub strides: &'a [isize],
}

impl<'a> Operand<'a> {
    /// The whole buffer from its first element, without strides.
    #[must_use]
    pub const fn new(buffer: &'a SharedBuffer) -> Self {
        Self {
            buffer,
            offset: 0,
            strides: &[],
        }
    }

    /// Sets the base element offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: isize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the strides.
    #[must_use]
    pub const fn with_strides(mut self, strides: &'a [isize]) -> Self {
        self.strides = strides;
        self
    }

    /// Element type of the backing buffer.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.buffer.element_type()
    }
}

/// Contiguous entry point of a one-argument function:
/// `(queue, nelems, arg, res, depends)`.
pub type UnaryContigFn =
    fn(&Queue, usize, Operand<'_>, Operand<'_>, &[Event]) -> Result<Event>;

/// Strided entry point of a one-argument function:
/// `(queue, nelems, shape, arg, res, depends, additional_depends)`.
pub type UnaryStridedFn =
    fn(&Queue, usize, &[usize], Operand<'_>, Operand<'_>, &[Event], &[Event]) -> Result<Event>;

/// Contiguous entry point of a two-argument function:
/// `(queue, nelems, arg1, arg2, res, depends)`.
pub type BinaryContigFn =
    fn(&Queue, usize, Operand<'_>, Operand<'_>, Operand<'_>, &[Event]) -> Result<Event>;

/// Strided entry point of a two-argument function:
/// `(queue, nelems, shape, arg1, arg2, res, depends, additional_depends)`.
pub type BinaryStridedFn = fn(
    &Queue,
    usize,
    &[usize],
    Operand<'_>,
    Operand<'_>,
    Operand<'_>,
    &[Event],
    &[Event],
) -> Result<Event>;

/// Kernels a factory produces for one input type.
#[derive(Debug, Clone, Copy)]
pub struct UnaryKernels {
    /// Dense entry point.
    pub contig: UnaryContigFn,
    /// Strided entry point.
    pub strided: UnaryStridedFn,
    /// Element type the functor writes.
    pub output_type: ElementType,
    /// Block geometry of `contig`.
    pub hyperparameters: VectorizationHyperparameters,
}

/// Kernels a factory produces for one pair of input types.
#[derive(Debug, Clone, Copy)]
pub struct BinaryKernels {
    /// Dense entry point.
    pub contig: BinaryContigFn,
    /// Strided entry point.
    pub strided: BinaryStridedFn,
    /// Element type the functor writes.
    pub output_type: ElementType,
    /// Block geometry of `contig`.
    pub hyperparameters: VectorizationHyperparameters,
}

/// Builds [`UnaryKernels`] for a functor and argument type, with an optional
/// block geometry (defaults to four-element blocks, two per work-item).
macro_rules! unary_kernels {
    ($functor:ty, $arg:ty) => {
        unary_kernels!($functor, $arg, 4, 2)
    };
    ($functor:ty, $arg:ty, $vec_sz:literal, $n_vecs:literal) => {
        $crate::ops::common::UnaryKernels {
            contig: $crate::ops::common::unary_contig_impl::<$arg, $functor, $vec_sz, $n_vecs>,
            strided: $crate::ops::common::unary_strided_impl::<$arg, $functor>,
            output_type: <<$functor as $crate::ops::common::UnaryFunctor<$arg>>::Output
                as $crate::types::Element>::TYPE,
            hyperparameters: $crate::ops::common::VectorizationHyperparameters::new(
                $vec_sz, $n_vecs,
            ),
        }
    };
}
pub(crate) use unary_kernels;

/// Builds [`BinaryKernels`] for a functor and argument types.
macro_rules! binary_kernels {
    ($functor:ty, $lhs:ty, $rhs:ty) => {
        binary_kernels!($functor, $lhs, $rhs, 4, 2)
    };
    ($functor:ty, $lhs:ty, $rhs:ty, $vec_sz:literal, $n_vecs:literal) => {
        $crate::ops::common::BinaryKernels {
            contig: $crate::ops::common::binary_contig_impl::<
                $lhs,
                $rhs,
                $functor,
                $vec_sz,
                $n_vecs,
            >,
            strided: $crate::ops::common::binary_strided_impl::<$lhs, $rhs, $functor>,
            output_type: <<$functor as $crate::ops::common::BinaryFunctor<$lhs, $rhs>>::Output
                as $crate::types::Element>::TYPE,
            hyperparameters: $crate::ops::common::VectorizationHyperparameters::new(
                $vec_sz, $n_vecs,
            ),
        }
    };
}
pub(crate) use binary_kernels;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn check_shape(nelems: usize, shape: &[usize]) -> Result<()> {
    let product = shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| ElementwiseError::ShapeMismatch(format!("shape {shape:?} overflows")))?;
    if product != nelems {
        return Err(ElementwiseError::ShapeMismatch(format!(
            "nelems is {nelems}, but shape {shape:?} has {product} elements"
        )));
    }
    Ok(())
}

fn out_of_bounds(operand: usize, index: i128, len: usize) -> ElementwiseError {
    ElementwiseError::OutOfBounds {
        operand,
        index: isize::try_from(index).unwrap_or(if index < 0 { isize::MIN } else { isize::MAX }),
        len,
    }
}

/// `[lo, hi]` must lie within `0..len`.
fn check_span(operand: usize, lo: i128, hi: i128, len: usize) -> Result<()> {
    if lo < 0 {
        return Err(out_of_bounds(operand, lo, len));
    }
    if hi >= len as i128 {
        return Err(out_of_bounds(operand, hi, len));
    }
    Ok(())
}

fn contig_span(op: &Operand<'_>, nelems: usize) -> (i128, i128) {
    let lo = op.offset as i128;
    (lo, lo + nelems as i128 - 1)
}

fn spans_intersect(a: (i128, i128), b: (i128, i128)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

/// A dense input may share memory with the output only when it is the very
/// same run (an in-place update).
fn check_contig_aliasing(
    input: usize,
    arg: &Operand<'_>,
    res: &Operand<'_>,
    nelems: usize,
) -> Result<()> {
    if !arg.buffer.same_allocation(res.buffer) || arg.offset == res.offset {
        return Ok(());
    }
    if spans_intersect(contig_span(arg, nelems), contig_span(res, nelems)) {
        return Err(ElementwiseError::OverlappingOperands(format!(
            "input {input} at offset {} partially overlaps the output at offset {}",
            arg.offset, res.offset
        )));
    }
    Ok(())
}

fn validate_contig(nelems: usize, inputs: &[Operand<'_>], res: &Operand<'_>) -> Result<()> {
    if nelems == 0 {
        return Ok(());
    }
    for (k, op) in inputs.iter().chain(core::iter::once(res)).enumerate() {
        let (lo, hi) = contig_span(op, nelems);
        check_span(k, lo, hi, op.buffer.len())?;
    }
    for (k, arg) in inputs.iter().enumerate() {
        check_contig_aliasing(k, arg, res, nelems)?;
    }
    Ok(())
}

/// Checks bounds of every operand, that the output never writes one element
/// twice, and that each input either has exactly the output's layout or does
/// not touch the output's memory at all.
fn validate_strided<const K: usize>(
    indexer: &StridedIndexer<K>,
    shape: &[usize],
    operands: [&Operand<'_>; K],
) -> Result<()> {
    let res = operands[K - 1];
    for (k, op) in operands.iter().enumerate() {
        if let Some((lo, hi)) = indexer.extent(k) {
            check_span(k, lo, hi, op.buffer.len())?;
        }
    }
    if indexer.nelems() == 0 {
        return Ok(());
    }
    if !is_non_overlapping(shape, res.strides) {
        return Err(ElementwiseError::OverlappingOperands(format!(
            "output strides {:?} write some elements of shape {shape:?} more than once",
            res.strides
        )));
    }
    for (k, arg) in operands[..K - 1].iter().enumerate() {
        if !arg.buffer.same_allocation(res.buffer) {
            continue;
        }
        let identical = arg.offset == res.offset
            && shape
                .iter()
                .zip(arg.strides.iter().zip(res.strides))
                .all(|(&n, (a, r))| n <= 1 || a == r);
        if identical {
            continue;
        }
        if let (Some(a), Some(r)) = (indexer.extent(k), indexer.extent(K - 1)) {
            if spans_intersect(a, r) {
                return Err(ElementwiseError::OverlappingOperands(format!(
                    "input {k} shares memory with the output under a different layout"
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

/// Stores `value` at `dst_offset + i` for every `i` in `range`.
fn fill<T: Element>(dst: DevicePtr<T>, dst_offset: isize, range: core::ops::Range<usize>, value: T) {
    for i in range {
        // SAFETY: the range lies in `0..nelems`, validated against the output,
        // and belongs to one work-item.
        unsafe { dst.write(dst_offset + i as isize, value) };
    }
}

fn unary_contig_kernel<A, F, const VEC_SZ: usize, const N_VECS: usize>(
    functor: F,
    nelems: usize,
    src: DevicePtr<A>,
    src_offset: isize,
    dst: DevicePtr<F::Output>,
    dst_offset: isize,
) where
    A: Element,
    F: UnaryFunctor<A>,
{
    let elems_per_wi = VEC_SZ * N_VECS;
    let constant = if F::IS_CONSTANT { functor.constant_value() } else { None };
    (0..nelems.div_ceil(elems_per_wi))
        .into_par_iter()
        .with_min_len(MIN_WORK_ITEMS_PER_LANE)
        .for_each(|wi| {
            let start = wi * elems_per_wi;
            let end = (start + elems_per_wi).min(nelems);
            if let Some(value) = constant {
                fill(dst, dst_offset, start..end, value);
            } else if F::SUPPORTS_SG_LOADSTORE && end - start == elems_per_wi {
                for v in 0..N_VECS {
                    let at = (start + v * VEC_SZ) as isize;
                    // SAFETY: the block lies in `0..nelems`, validated against
                    // both buffers; work-items own disjoint blocks, and an input
                    // aliasing the output is the identical run.
                    unsafe {
                        let x = src.read_block::<VEC_SZ>(src_offset + at);
                        let y = if F::SUPPORTS_VEC {
                            functor.call_vec(x)
                        } else {
                            x.map(|e| functor.call(e))
                        };
                        dst.write_block(dst_offset + at, y);
                    }
                }
            } else {
                for i in start..end {
                    let i = i as isize;
                    // SAFETY: as above, element-wise.
                    unsafe { dst.write(dst_offset + i, functor.call(src.read(src_offset + i))) };
                }
            }
        });
}

fn binary_contig_kernel<A, B, F, const VEC_SZ: usize, const N_VECS: usize>(
    functor: F,
    nelems: usize,
    (lhs, lhs_offset): (DevicePtr<A>, isize),
    (rhs, rhs_offset): (DevicePtr<B>, isize),
    (dst, dst_offset): (DevicePtr<F::Output>, isize),
) where
    A: Element,
    B: Element,
    F: BinaryFunctor<A, B>,
{
    let elems_per_wi = VEC_SZ * N_VECS;
    let constant = if F::IS_CONSTANT { functor.constant_value() } else { None };
    (0..nelems.div_ceil(elems_per_wi))
        .into_par_iter()
        .with_min_len(MIN_WORK_ITEMS_PER_LANE)
        .for_each(|wi| {
            let start = wi * elems_per_wi;
            let end = (start + elems_per_wi).min(nelems);
            if let Some(value) = constant {
                fill(dst, dst_offset, start..end, value);
            } else if F::SUPPORTS_SG_LOADSTORE && end - start == elems_per_wi {
                for v in 0..N_VECS {
                    let at = (start + v * VEC_SZ) as isize;
                    // SAFETY: see `unary_contig_kernel`.
                    unsafe {
                        let a = lhs.read_block::<VEC_SZ>(lhs_offset + at);
                        let b = rhs.read_block::<VEC_SZ>(rhs_offset + at);
                        let y = if F::SUPPORTS_VEC {
                            functor.call_vec(a, b)
                        } else {
                            core::array::from_fn(|j| functor.call(a[j], b[j]))
                        };
                        dst.write_block(dst_offset + at, y);
                    }
                }
            } else {
                for i in start..end {
                    let i = i as isize;
                    // SAFETY: see `unary_contig_kernel`.
                    unsafe {
                        let y = functor.call(lhs.read(lhs_offset + i), rhs.read(rhs_offset + i));
                        dst.write(dst_offset + i, y);
                    }
                }
            }
        });
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Enqueues `res[i] = F(arg[i])` over `nelems` dense elements.
///
/// # Errors
///
/// Synchronous validation failures. Launch failures are reported through the
/// returned event.
pub fn unary_contig_impl<A, F, const VEC_SZ: usize, const N_VECS: usize>(
    queue: &Queue,
    nelems: usize,
    arg: Operand<'_>,
    res: Operand<'_>,
    depends: &[Event],
) -> Result<Event>
where
    A: Element,
    F: UnaryFunctor<A>,
{
    let src = arg.buffer.device_ptr::<A>()?;
    let dst = res.buffer.device_ptr::<F::Output>()?;
    validate_contig(nelems, &[arg], &res)?;

    let launch = queue.check_launch(nelems.div_ceil(VEC_SZ * N_VECS));
    let buffers = [arg.buffer.clone(), res.buffer.clone()];
    let (src_offset, dst_offset) = (arg.offset, res.offset);
    let accesses = [BufferAccess::read(arg.buffer), BufferAccess::write(res.buffer)];

    Ok(queue.submit_with_access(F::NAME, depends, &accesses, move || {
        launch?;
        unary_contig_kernel::<A, F, VEC_SZ, N_VECS>(
            F::default(),
            nelems,
            src,
            src_offset,
            dst,
            dst_offset,
        );
        drop(buffers);
        Ok(())
    }))
}

/// Enqueues `res[idx] = F(arg[idx])` for every multi-index of `shape`.
///
/// `depends` and `additional_depends` are both waited for; the second list
/// typically carries the events that produced packed shape metadata.
///
/// # Errors
///
/// Synchronous validation failures. Launch failures are reported through the
/// returned event.
pub fn unary_strided_impl<A, F>(
    queue: &Queue,
    nelems: usize,
    shape: &[usize],
    arg: Operand<'_>,
    res: Operand<'_>,
    depends: &[Event],
    additional_depends: &[Event],
) -> Result<Event>
where
    A: Element,
    F: UnaryFunctor<A>,
{
    let src = arg.buffer.device_ptr::<A>()?;
    let dst = res.buffer.device_ptr::<F::Output>()?;
    check_shape(nelems, shape)?;
    let indexer = StridedIndexer::new(shape, [arg.strides, res.strides], [arg.offset, res.offset])?;
    validate_strided(&indexer, shape, [&arg, &res])?;

    let launch = queue.check_launch(nelems);
    let buffers = [arg.buffer.clone(), res.buffer.clone()];
    let accesses = [BufferAccess::read(arg.buffer), BufferAccess::write(res.buffer)];
    let all_depends: Vec<Event> = depends.iter().chain(additional_depends).cloned().collect();

    Ok(queue.submit_with_access(F::NAME, &all_depends, &accesses, move || {
        launch?;
        let functor = F::default();
        (0..nelems)
            .into_par_iter()
            .with_min_len(MIN_WORK_ITEMS_PER_LANE)
            .for_each(|i| {
                let [a, r] = indexer.offsets(i);
                // SAFETY: extents were validated against both buffers and the
                // output layout never maps two positions to one element.
                unsafe { dst.write(r, functor.call(src.read(a))) };
            });
        drop(buffers);
        Ok(())
    }))
}

/// Enqueues `res[i] = F(arg1[i], arg2[i])` over `nelems` dense elements.
///
/// # Errors
///
/// Synchronous validation failures. Launch failures are reported through the
/// returned event.
pub fn binary_contig_impl<A, B, F, const VEC_SZ: usize, const N_VECS: usize>(
    queue: &Queue,
    nelems: usize,
    arg1: Operand<'_>,
    arg2: Operand<'_>,
    res: Operand<'_>,
    depends: &[Event],
) -> Result<Event>
where
    A: Element,
    B: Element,
    F: BinaryFunctor<A, B>,
{
    let lhs = arg1.buffer.device_ptr::<A>()?;
    let rhs = arg2.buffer.device_ptr::<B>()?;
    let dst = res.buffer.device_ptr::<F::Output>()?;
    validate_contig(nelems, &[arg1, arg2], &res)?;

    let launch = queue.check_launch(nelems.div_ceil(VEC_SZ * N_VECS));
    let buffers = [arg1.buffer.clone(), arg2.buffer.clone(), res.buffer.clone()];
    let (lhs_offset, rhs_offset, dst_offset) = (arg1.offset, arg2.offset, res.offset);
    let accesses = [
        BufferAccess::read(arg1.buffer),
        BufferAccess::read(arg2.buffer),
        BufferAccess::write(res.buffer),
    ];

    Ok(queue.submit_with_access(F::NAME, depends, &accesses, move || {
        launch?;
        binary_contig_kernel::<A, B, F, VEC_SZ, N_VECS>(
            F::default(),
            nelems,
            (lhs, lhs_offset),
            (rhs, rhs_offset),
            (dst, dst_offset),
        );
        drop(buffers);
        Ok(())
    }))
}

/// Enqueues `res[idx] = F(arg1[idx], arg2[idx])` for every multi-index of
/// `shape`.
///
/// # Errors
///
/// Synchronous validation failures. Launch failures are reported through the
/// returned event.
#[allow(clippy::too_many_arguments)]
pub fn binary_strided_impl<A, B, F>(
    queue: &Queue,
    nelems: usize,
    shape: &[usize],
    arg1: Operand<'_>,
    arg2: Operand<'_>,
    res: Operand<'_>,
    depends: &[Event],
    additional_depends: &[Event],
) -> Result<Event>
where
    A: Element,
    B: Element,
    F: BinaryFunctor<A, B>,
{
    let lhs = arg1.buffer.device_ptr::<A>()?;
    let rhs = arg2.buffer.device_ptr::<B>()?;
    let dst = res.buffer.device_ptr::<F::Output>()?;
    check_shape(nelems, shape)?;
    let indexer = StridedIndexer::new(
        shape,
        [arg1.strides, arg2.strides, res.strides],
        [arg1.offset, arg2.offset, res.offset],
    )?;
    validate_strided(&indexer, shape, [&arg1, &arg2, &res])?;

    let launch = queue.check_launch(nelems);
    let buffers = [arg1.buffer.clone(), arg2.buffer.clone(), res.buffer.clone()];
    let accesses = [
        BufferAccess::read(arg1.buffer),
        BufferAccess::read(arg2.buffer),
        BufferAccess::write(res.buffer),
    ];
    let all_depends: Vec<Event> = depends.iter().chain(additional_depends).cloned().collect();

    Ok(queue.submit_with_access(F::NAME, &all_depends, &accesses, move || {
        launch?;
        let functor = F::default();
        (0..nelems)
            .into_par_iter()
            .with_min_len(MIN_WORK_ITEMS_PER_LANE)
            .for_each(|i| {
                let [a, b, r] = indexer.offsets(i);
                // SAFETY: see `unary_strided_impl`.
                unsafe { dst.write(r, functor.call(lhs.read(a), rhs.read(b))) };
            });
        drop(buffers);
        Ok(())
    }))
}
