//! General-purpose best-fit heap over a caller-owned buffer
//!
//! The buffer is partitioned into a gapless sequence of blocks carrying
//! in-band boundary tags (`block` module), and free blocks are indexed by
//! usable size in a red-black tree threaded through their payloads (`tree`
//! module). Allocation best-fit searches the tree, splitting off the tail
//! of an oversized block when the leftover can stand on its own;
//! deallocation eagerly coalesces with both physical neighbors, so two
//! adjacent blocks are never both free.
//!
//! A zero-size allocated sentinel header at the high end of the buffer
//! stops forward coalescing; backward coalescing stops at the first block,
//! whose back distance is zero.

use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;

use super::{ALIGNMENT, Allocator, MemoryUsage};
use crate::error::{AllocError, AllocResult};
use crate::utils::{align_down, checked_align_up, is_aligned};

mod block;
mod tree;

use block::{BlockHeader, FreeBlock, HEADER_BYTES, MIN_BLOCK, NODE_SPACE, SPLIT_THRESHOLD};
use tree::FreeTree;

/// Best-fit heap allocator with boundary-tag coalescing
///
/// All metadata lives inside the managed buffer: allocated blocks cost one
/// header each, free blocks additionally carry their tree node in the
/// payload area. Requests are padded to tree-node capacity
/// so every block can always return to the free tree.
pub struct HeapAllocator<'buf> {
    base: NonNull<u8>,
    capacity: usize,
    /// Bytes covered by real blocks: the buffer minus trailing slack and
    /// the sentinel header. Zero when the buffer was too small to host a
    /// single block, in which case every allocation fails.
    managed: usize,
    tree: FreeTree,
    _buffer: PhantomData<&'buf mut [u8]>,
}

impl<'buf> HeapAllocator<'buf> {
    /// Binds a heap allocator to `buffer`
    ///
    /// The buffer base must be aligned to [`ALIGNMENT`]. A buffer too
    /// small to host one header plus one tree-capable free block yields a
    /// heap that is valid but permanently exhausted.
    pub fn new(buffer: &'buf mut [u8]) -> AllocResult<Self> {
        let capacity = buffer.len();
        let base = NonNull::from(&mut *buffer).cast::<u8>();
        if !is_aligned(base.as_ptr() as usize, ALIGNMENT) {
            return Err(AllocError::MisalignedBuffer {
                required: ALIGNMENT,
            });
        }

        let mut heap = Self {
            base,
            capacity,
            managed: 0,
            tree: FreeTree::empty(),
            _buffer: PhantomData,
        };

        if align_down(capacity, ALIGNMENT) < MIN_BLOCK + HEADER_BYTES {
            tracing::debug!(
                capacity,
                minimum = MIN_BLOCK + HEADER_BYTES,
                "buffer below minimum heap size, heap starts exhausted"
            );
            return Ok(heap);
        }

        // One free block spanning everything up to the sentinel header.
        let managed = align_down(capacity - mem::size_of::<BlockHeader>(), ALIGNMENT);
        // SAFETY: managed + header fits in the buffer by the size check
        // above, and base is ALIGNMENT-aligned.
        unsafe {
            let first = heap.base.as_ptr().cast::<FreeBlock>();
            (*first).header.set_prev_dist(0);
            (*first).header.set_block_size(managed);
            heap.tree.insert(first);

            let sentinel = heap.base.as_ptr().add(managed).cast::<BlockHeader>();
            BlockHeader::write_sentinel(sentinel, managed);
        }
        heap.managed = managed;

        tracing::trace!(capacity, managed, "heap allocator bound");
        Ok(heap)
    }

    /// Total capacity of the managed buffer in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Checks if a pointer lies inside the managed buffer
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let base = self.base.as_ptr() as usize;
        addr >= base && addr < base + self.capacity
    }

    /// Re-initializes the heap to a single spanning free block
    ///
    /// # Safety
    /// All previously returned addresses become invalid; the caller must
    /// ensure no live references into the buffer remain.
    pub unsafe fn reset(&mut self) {
        if self.managed == 0 {
            return;
        }
        self.tree = FreeTree::empty();
        // SAFETY: same layout that `new` validated.
        unsafe {
            let first = self.base.as_ptr().cast::<FreeBlock>();
            (*first).header.set_prev_dist(0);
            (*first).header.set_block_size(self.managed);
            self.tree.insert(first);

            let sentinel = self.base.as_ptr().add(self.managed).cast::<BlockHeader>();
            BlockHeader::write_sentinel(sentinel, self.managed);
        }
    }

    /// Sums block sizes (headers included) selected by `want_allocated`
    /// with a front-to-back boundary-tag walk.
    fn walk_block_bytes(&self, want_allocated: bool) -> usize {
        let mut bytes = 0;
        let mut off = 0;
        while off < self.managed {
            // SAFETY: boundary tags partition [0, managed); every header
            // read stays inside the buffer.
            unsafe {
                let h = self.base.as_ptr().add(off).cast::<BlockHeader>();
                let size = (*h).block_size();
                if (*h).is_allocated() == want_allocated {
                    bytes += size;
                }
                off += size;
            }
        }
        bytes
    }
}

unsafe impl Allocator for HeapAllocator<'_> {
    /// Best-fit allocation with split
    ///
    /// The request is rounded up to [`ALIGNMENT`] and padded to tree-node
    /// capacity; the smallest free block that fits is pulled from the
    /// tree. When the leftover strictly exceeds the minimum viable block,
    /// the tail is split off, linked into the boundary-tag list and
    /// reinserted into the tree; otherwise the whole block is handed out
    /// and the slack rides along until the block is freed again.
    fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        let rounded =
            checked_align_up(size, ALIGNMENT).ok_or(AllocError::out_of_memory(size))?;
        let need = rounded.max(NODE_SPACE);

        // SAFETY: every pointer below is derived from `base` and stays
        // inside the block structure that `new` established and previous
        // operations kept consistent.
        unsafe {
            let best = self.tree.best_fit(need);
            if best.is_null() {
                return Err(AllocError::out_of_memory(size));
            }
            self.tree.remove(best);

            let head = best.cast::<BlockHeader>();
            let res = head.cast::<u8>().add(HEADER_BYTES);
            let space = (*head).usable_size();

            if space - need > SPLIT_THRESHOLD {
                let tail = res.add(need).cast::<FreeBlock>();
                (*tail).header.set_prev_dist(need + HEADER_BYTES);
                (*tail)
                    .header
                    .set_block_size((*head).block_size() - need - HEADER_BYTES);

                // The successor's back distance shrinks onto the tail
                // block; read it before rewriting the head's size.
                let succ = BlockHeader::next_header(head);
                (*succ).shift_prev_dist(-((need + HEADER_BYTES) as isize));

                (*head).set_block_size(need + HEADER_BYTES);
                self.tree.insert(tail);
            }

            (*head).set_allocated(true);
            Ok(NonNull::new_unchecked(res))
        }
    }

    /// Eagerly coalescing free
    ///
    /// Folds the freed block into its physical successor and predecessor
    /// whenever they are free, removing them from the tree first, then
    /// inserts the resulting block. The freed block therefore never stays
    /// adjacent to another free block.
    ///
    /// # Safety
    /// `ptr` must have been returned by [`allocate`] on this heap and not
    /// freed since.
    ///
    /// [`allocate`]: Allocator::allocate
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        debug_assert!(self.contains(ptr.as_ptr()));
        debug_assert!(is_aligned(ptr.as_ptr() as usize, ALIGNMENT));

        // SAFETY: ptr sits HEADER_BYTES past its block header; neighbor
        // headers are reachable through the boundary tags.
        unsafe {
            let head = ptr.as_ptr().sub(HEADER_BYTES).cast::<BlockHeader>();
            debug_assert!((*head).is_allocated(), "double or foreign free");
            (*head).set_allocated(false);

            let mut merged = head.cast::<FreeBlock>();

            // Coalesce right: bridge over a free successor.
            let next = BlockHeader::next_header(head);
            if !(*next).is_allocated() {
                self.tree.remove(next.cast::<FreeBlock>());
                let after = BlockHeader::next_header(next);
                (*head).grow_block((*next).block_size());
                (*after).shift_prev_dist((*next).prev_dist() as isize);
            }

            // Coalesce left: fold this block into a free predecessor.
            let prev_dist = (*head).prev_dist();
            if prev_dist != 0 {
                let prev = BlockHeader::prev_header(head);
                if !(*prev).is_allocated() {
                    self.tree.remove(prev.cast::<FreeBlock>());
                    let after = BlockHeader::next_header(head);
                    (*prev).grow_block((*head).block_size());
                    (*after).shift_prev_dist(prev_dist as isize);
                    merged = prev.cast::<FreeBlock>();
                }
            }

            self.tree.insert(merged);
        }
    }
}

impl MemoryUsage for HeapAllocator<'_> {
    /// Bytes held by allocated blocks, headers included.
    fn used_memory(&self) -> usize {
        self.walk_block_bytes(true)
    }

    /// Bytes held by free blocks, headers included.
    fn available_memory(&self) -> Option<usize> {
        Some(self.managed - self.used_memory())
    }
}
