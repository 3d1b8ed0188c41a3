//! Bump allocator over a caller-owned buffer
//!
//! The simplest strategy: a single head offset that only ever moves
//! forward. Individual regions are never reclaimed; the whole buffer is
//! recovered at once with [`BumpAllocator::reset`] or by dropping the
//! allocator and reusing the buffer.

use core::marker::PhantomData;
use core::ptr::NonNull;

use super::{ALIGNMENT, Allocator, MemoryUsage};
use crate::error::{AllocError, AllocResult};
use crate::utils::{checked_align_up, is_aligned};

/// Monotonic bump allocator
///
/// # Memory Layout
/// ```text
/// [base]----[alloc1]----[alloc2]----[head]----[free]----[base + capacity]
///           <------ allocated ----->         <-- available -->
/// ```
#[derive(Debug)]
pub struct BumpAllocator<'buf> {
    base: NonNull<u8>,
    capacity: usize,
    /// Next free byte, as an offset from `base`. Monotonically
    /// non-decreasing between resets.
    head: usize,
    _buffer: PhantomData<&'buf mut [u8]>,
}

impl<'buf> BumpAllocator<'buf> {
    /// Binds a bump allocator to `buffer`
    ///
    /// The buffer base must be aligned to [`ALIGNMENT`] so that every
    /// returned address is too.
    pub fn new(buffer: &'buf mut [u8]) -> AllocResult<Self> {
        let capacity = buffer.len();
        let base = NonNull::from(&mut *buffer).cast::<u8>();
        if !is_aligned(base.as_ptr() as usize, ALIGNMENT) {
            return Err(AllocError::MisalignedBuffer {
                required: ALIGNMENT,
            });
        }

        tracing::trace!(capacity, "bump allocator bound");

        Ok(Self {
            base,
            capacity,
            head: 0,
            _buffer: PhantomData,
        })
    }

    /// Total capacity of the managed buffer in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed so far
    #[inline]
    pub fn used(&self) -> usize {
        self.head
    }

    /// Bytes still available
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity - self.head
    }

    /// Checks if a pointer lies inside the managed buffer
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let base = self.base.as_ptr() as usize;
        addr >= base && addr < base + self.capacity
    }

    /// Rewinds the head to the buffer start
    ///
    /// # Safety
    /// All previously returned addresses become invalid; the caller must
    /// ensure no live references into the buffer remain.
    pub unsafe fn reset(&mut self) {
        self.head = 0;
    }
}

unsafe impl Allocator for BumpAllocator<'_> {
    fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        let need =
            checked_align_up(size, ALIGNMENT).ok_or(AllocError::out_of_memory(size))?;

        let new_head = self
            .head
            .checked_add(need)
            .filter(|&h| h <= self.capacity)
            .ok_or(AllocError::out_of_memory(size))?;

        // SAFETY: head <= capacity, so the offset stays inside the buffer
        // allocation (or one past its end for a zero-capacity tail).
        let ptr = unsafe { self.base.add(self.head) };
        self.head = new_head;
        Ok(ptr)
    }

    unsafe fn deallocate(&mut self, _ptr: NonNull<u8>) {
        // Individual chunks are never reclaimed.
    }
}

impl MemoryUsage for BumpAllocator<'_> {
    fn used_memory(&self) -> usize {
        self.used()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.available())
    }
}
