//! Shared host/device memory.
//!
//! A [`SharedBuffer`] is a reference-counted, zero-initialised allocation of
//! elements of one [`ElementType`]. It plays the role of unified shared
//! memory: the host reads and writes it through [`SharedBuffer::to_vec`] and
//! [`SharedBuffer::copy_from_slice`], kernels read and write it from the queue
//! lanes.
//!
//! Every access (device or host) is recorded on the buffer. A reader is
//! ordered after the last writer; a writer is ordered after the last writer
//! and every reader since. A reader fails if the writer it reads from failed;
//! a writer replaces the contents and runs regardless of how earlier accesses
//! ended. The queue merges these implicit dependencies with
//! the explicit ones a caller passes, so concurrent submissions touching the
//! same buffer never race, while submissions on disjoint buffers still run
//! concurrently.
//!
//! ## Safety
//!
//! Kernels touch memory only through [`DevicePtr`], whose accessors are
//! `unsafe`. The drivers in `ops::common` hand one out only after checking
//! that every offset a launch reaches is in bounds and that no two work-items
//! write the same element.

use crate::device::Event;
use crate::error::{ElementwiseError, Result};
use crate::types::{Element, ElementType};
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

/// Alignment of every allocation; enough for all [`Element`] types.
const ALIGN: usize = 16;

/// Serializes hazard lookup and access registration across all buffers.
static TRACKING_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// How an operation touches a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Elements are only read.
    Read,
    /// Elements may be written.
    Write,
}

/// One buffer access of a submission.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferAccess<'a> {
    pub(crate) buffer: &'a SharedBuffer,
    pub(crate) mode: AccessMode,
}

impl<'a> BufferAccess<'a> {
    pub(crate) const fn read(buffer: &'a SharedBuffer) -> Self {
        Self {
            buffer,
            mode: AccessMode::Read,
        }
    }

    pub(crate) const fn write(buffer: &'a SharedBuffer) -> Self {
        Self {
            buffer,
            mode: AccessMode::Write,
        }
    }
}

#[derive(Default)]
struct AccessState {
    last_write: Option<Event>,
    reads: Vec<Event>,
}

struct BufferInner {
    ptr: NonNull<u8>,
    layout: Layout,
    len: usize,
    element_type: ElementType,
    access: Mutex<AccessState>,
}

// SAFETY: the allocation is plain data owned by this struct; concurrent
// element access is coordinated through the access tracking above.
unsafe impl Send for BufferInner {}
// SAFETY: see `Send`.
unsafe impl Sync for BufferInner {}

impl Drop for BufferInner {
    fn drop(&mut self) {
        // SAFETY: allocated in `SharedBuffer::zeroed` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Reference-counted typed allocation shared between host and queues.
///
/// Cloning is cheap and yields another handle to the same memory.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<BufferInner>,
}

impl core::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("element_type", &self.inner.element_type)
            .field("len", &self.inner.len)
            .field("ptr", &self.inner.ptr)
            .finish()
    }
}

impl SharedBuffer {
    /// Allocates `len` zeroed elements of `element_type`.
    ///
    /// # Panics
    ///
    /// Panics if the byte size overflows `isize`, like `Vec` does.
    #[must_use]
    pub fn zeroed(element_type: ElementType, len: usize) -> Self {
        let size = element_type
            .size_of()
            .checked_mul(len)
            .filter(|&bytes| bytes <= isize::MAX as usize - ALIGN)
            .unwrap_or_else(|| panic!("capacity overflow: {len} x {element_type}"));
        let layout = match Layout::from_size_align(size.max(ALIGN), ALIGN) {
            Ok(layout) => layout,
            Err(e) => panic!("invalid buffer layout: {e}"),
        };
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));

        Self {
            inner: Arc::new(BufferInner {
                ptr,
                layout,
                len,
                element_type,
                access: Mutex::new(AccessState::default()),
            }),
        }
    }

    /// Allocates a buffer holding a copy of `data`.
    #[must_use]
    pub fn from_slice<T: Element>(data: &[T]) -> Self {
        let buffer = Self::zeroed(T::TYPE, data.len());
        // SAFETY: fresh allocation of `data.len()` elements of `T` (the
        // `Element` contract ties its size to `T::TYPE`), aligned to
        // `ALIGN >= align_of::<T>()`, not yet shared with anyone.
        unsafe {
            core::ptr::copy_nonoverlapping(
                data.as_ptr(),
                buffer.inner.ptr.as_ptr().cast::<T>(),
                data.len(),
            );
        }
        buffer
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Whether the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Element type of the buffer.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.inner.element_type
    }

    /// Whether both handles refer to the same allocation.
    #[must_use]
    pub fn same_allocation(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copies the contents to the host.
    ///
    /// Blocks until the last device write to this buffer has completed.
    ///
    /// # Errors
    ///
    /// - [`ElementwiseError::InvariantViolation`] if `T` is not the buffer's type.
    /// - [`ElementwiseError::Device`] if the last writer failed; its output is
    ///   not meaningful.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let ptr = self.device_ptr::<T>()?;
        let host = Event::pending();
        let hazards = track_accesses(&[BufferAccess::read(self)], &host);

        let waited = Event::wait_all(&hazards.inherit);
        let out = waited.map(|()| {
            // SAFETY: every writer registered before us has completed and any
            // later writer is ordered after `host`, which is still pending.
            unsafe { core::slice::from_raw_parts(ptr.ptr.cast_const(), self.len()).to_vec() }
        });
        host.complete(Ok(()));
        Ok(out?)
    }

    /// Overwrites the contents from the host.
    ///
    /// Blocks until every earlier device access to this buffer has completed.
    /// Failures of earlier writers are ignored, since their output is replaced.
    ///
    /// # Errors
    ///
    /// - [`ElementwiseError::InvariantViolation`] if `T` is not the buffer's type.
    /// - [`ElementwiseError::ShapeMismatch`] if `data.len()` differs from `len()`.
    pub fn copy_from_slice<T: Element>(&self, data: &[T]) -> Result<()> {
        let ptr = self.device_ptr::<T>()?;
        if data.len() != self.len() {
            return Err(ElementwiseError::ShapeMismatch(format!(
                "cannot copy {} elements into a buffer of {}",
                data.len(),
                self.len()
            )));
        }
        let host = Event::pending();
        let hazards = track_accesses(&[BufferAccess::write(self)], &host);
        for event in &hazards.order {
            let _ = event.wait();
        }
        // SAFETY: all earlier accesses completed; later ones wait for `host`.
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), ptr.ptr, data.len());
        }
        host.complete(Ok(()));
        Ok(())
    }

    /// Typed device pointer to the first element.
    ///
    /// # Errors
    ///
    /// [`ElementwiseError::InvariantViolation`] if `T` is not the buffer's type.
    pub(crate) fn device_ptr<T: Element>(&self) -> Result<DevicePtr<T>> {
        if T::TYPE != self.inner.element_type {
            return Err(ElementwiseError::InvariantViolation(format!(
                "buffer of {} accessed as {}",
                self.inner.element_type,
                T::TYPE
            )));
        }
        debug_assert_eq!(core::mem::size_of::<T>(), T::TYPE.size_of());
        Ok(DevicePtr {
            ptr: self.inner.ptr.as_ptr().cast::<T>(),
            len: self.inner.len,
        })
    }

    /// Events the given access must be ordered after. A reader inherits the
    /// outcome of the last writer; a writer replaces the contents, so it only
    /// waits for the last writer and the readers since. Completed reads are
    /// pruned; the last writer is kept even when complete so its failure
    /// reaches later readers.
    fn hazards(&self, mode: AccessMode, into: &mut Hazards) {
        let mut state = self.inner.access.lock();
        state.reads.retain(|event| !event.is_complete());
        match mode {
            AccessMode::Read => into.inherit.extend(state.last_write.iter().cloned()),
            AccessMode::Write => {
                into.order.extend(state.last_write.iter().cloned());
                into.order.extend(state.reads.iter().cloned());
            }
        }
    }

    fn record(&self, mode: AccessMode, event: &Event) {
        let mut state = self.inner.access.lock();
        match mode {
            AccessMode::Read => state.reads.push(event.clone()),
            AccessMode::Write => {
                state.reads.clear();
                state.last_write = Some(event.clone());
            }
        }
    }
}

/// Earlier accesses a new access conflicts with.
#[derive(Debug, Default)]
pub(crate) struct Hazards {
    /// Writers whose output is read; their failure fails the access.
    pub(crate) inherit: Vec<Event>,
    /// Accesses that must finish first, whatever their outcome.
    pub(crate) order: Vec<Event>,
}

/// Registers `event` as performing `accesses` and returns the events it must
/// be ordered after. Atomic with respect to every other registration.
pub(crate) fn track_accesses(accesses: &[BufferAccess<'_>], event: &Event) -> Hazards {
    let _guard = TRACKING_LOCK.lock();
    let mut hazards = Hazards::default();
    for access in accesses {
        access.buffer.hazards(access.mode, &mut hazards);
    }
    for access in accesses {
        access.buffer.record(access.mode, event);
    }
    hazards
}

/// Raw typed pointer into a [`SharedBuffer`], handed to kernels.
///
/// Carries no lifetime; the submission keeps the owning buffer alive until
/// the kernel finishes.
#[derive(Debug)]
pub(crate) struct DevicePtr<T> {
    ptr: *mut T,
    len: usize,
}

impl<T> Clone for DevicePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DevicePtr<T> {}

// SAFETY: `T: Element` is plain `Send + Sync` data; disjointness of writes is
// established by the submission layer.
unsafe impl<T: Element> Send for DevicePtr<T> {}
// SAFETY: see `Send`.
unsafe impl<T: Element> Sync for DevicePtr<T> {}

impl<T: Element> DevicePtr<T> {
    /// Reads the element at `offset`.
    ///
    /// # Safety
    ///
    /// `0 <= offset < len` and no other lane writes that element concurrently.
    #[inline]
    pub(crate) unsafe fn read(self, offset: isize) -> T {
        debug_assert!(offset >= 0 && (offset as usize) < self.len);
        // SAFETY: upheld by the caller.
        unsafe { self.ptr.offset(offset).read() }
    }

    /// Writes the element at `offset`.
    ///
    /// # Safety
    ///
    /// `0 <= offset < len` and no other lane touches that element concurrently.
    #[inline]
    pub(crate) unsafe fn write(self, offset: isize, value: T) {
        debug_assert!(offset >= 0 && (offset as usize) < self.len);
        // SAFETY: upheld by the caller.
        unsafe { self.ptr.offset(offset).write(value) }
    }

    /// Reads `N` consecutive elements starting at `offset` in one transaction.
    ///
    /// # Safety
    ///
    /// `offset..offset + N` is in bounds and not written concurrently.
    #[inline]
    pub(crate) unsafe fn read_block<const N: usize>(self, offset: isize) -> [T; N] {
        debug_assert!(offset >= 0 && offset as usize + N <= self.len);
        // SAFETY: upheld by the caller; `[T; N]` has the alignment of `T`.
        unsafe { self.ptr.offset(offset).cast::<[T; N]>().read() }
    }

    /// Writes `N` consecutive elements starting at `offset` in one transaction.
    ///
    /// # Safety
    ///
    /// `offset..offset + N` is in bounds and not touched concurrently.
    #[inline]
    pub(crate) unsafe fn write_block<const N: usize>(self, offset: isize, values: [T; N]) {
        debug_assert!(offset >= 0 && offset as usize + N <= self.len);
        // SAFETY: upheld by the caller.
        unsafe { self.ptr.offset(offset).cast::<[T; N]>().write(values) }
    }
}
