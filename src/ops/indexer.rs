//! Strided index translation.
//!
//! The strided execution path sees the iteration space as `nelems` logical
//! positions in row-major (C) order over a shape shared by all operands.
//! [`StridedIndexer`] turns a logical position into one memory offset per
//! operand, using each operand's own strides and base offset. It is built
//! once per submission and then shared read-only by every lane.

use crate::error::{ElementwiseError, Result};

/// Maps logical positions to per-operand element offsets for `K` operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StridedIndexer<const K: usize> {
    shape: Box<[usize]>,
    strides: Box<[[isize; K]]>,
    offsets: [isize; K],
}

/// Indexer for one input and one output.
pub type TwoOffsetsIndexer = StridedIndexer<2>;

/// Indexer for two inputs and one output.
pub type ThreeOffsetsIndexer = StridedIndexer<3>;

impl<const K: usize> StridedIndexer<K> {
    /// Builds an indexer over `shape` from each operand's strides and offset.
    ///
    /// # Errors
    ///
    /// [`ElementwiseError::ShapeMismatch`] if an operand's stride count differs
    /// from the number of dimensions.
    pub fn new(shape: &[usize], strides: [&[isize]; K], offsets: [isize; K]) -> Result<Self> {
        for (operand, s) in strides.iter().enumerate() {
            if s.len() != shape.len() {
                return Err(ElementwiseError::ShapeMismatch(format!(
                    "operand {operand} has {} strides for {} dimensions",
                    s.len(),
                    shape.len()
                )));
            }
        }
        let per_dim = (0..shape.len())
            .map(|d| core::array::from_fn(|k| strides[k][d]))
            .collect();
        Ok(Self {
            shape: shape.into(),
            strides: per_dim,
            offsets,
        })
    }

    /// Number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of logical positions.
    #[must_use]
    pub fn nelems(&self) -> usize {
        self.shape.iter().product()
    }

    /// Element offsets of logical position `linear`, one per operand.
    ///
    /// `linear` must be below [`nelems`](Self::nelems).
    #[inline]
    #[must_use]
    pub fn offsets(&self, linear: usize) -> [isize; K] {
        let mut out = self.offsets;
        let mut rem = linear;
        for (dim, strides) in self.shape.iter().zip(self.strides.iter()).rev() {
            let idx = rem % dim;
            rem /= dim;
            // an in-bounds view never exceeds isize
            let idx = idx as isize;
            for (o, s) in out.iter_mut().zip(strides) {
                *o += idx * s;
            }
        }
        out
    }

    /// Smallest and largest offset operand `k` reaches, or `None` when the
    /// iteration space is empty. Computed without overflow.
    #[must_use]
    pub fn extent(&self, k: usize) -> Option<(i128, i128)> {
        if self.shape.contains(&0) {
            return None;
        }
        let base = i128::from(self.offsets[k] as i64);
        let (lo, hi) = self.shape.iter().zip(self.strides.iter()).fold(
            (base, base),
            |(lo, hi), (&n, strides)| {
                let span = (n as i128 - 1) * strides[k] as i128;
                if span < 0 { (lo + span, hi) } else { (lo, hi + span) }
            },
        );
        Some((lo, hi))
    }
}

/// Whether a layout maps distinct logical positions to distinct elements.
///
/// Conservative: dimensions sorted by stride magnitude must each step past
/// the full extent of the smaller ones. Interleaved layouts that happen not
/// to collide are reported as overlapping.
#[must_use]
pub fn is_non_overlapping(shape: &[usize], strides: &[isize]) -> bool {
    let mut dims: Vec<(usize, usize)> = shape
        .iter()
        .zip(strides)
        .filter(|&(&n, _)| n > 1)
        .map(|(&n, &s)| (s.unsigned_abs(), n))
        .collect();
    dims.sort_unstable();

    let mut extent = 1usize;
    for (stride, n) in dims {
        if stride < extent {
            return false;
        }
        extent = stride.saturating_mul(n);
    }
    true
}

/// Row-major strides of a dense array of `shape`.
#[must_use]
pub fn c_contiguous_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut step = 1isize;
    for (s, &n) in strides.iter_mut().zip(shape).rev() {
        *s = step;
        step *= n.max(1) as isize;
    }
    strides
}
