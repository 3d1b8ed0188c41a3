//! Boundary-tag block layout for the heap allocator
//!
//! The heap buffer is a gapless sequence of blocks. Every block starts
//! with a two-word [`BlockHeader`] whose size fields double as bit
//! carriers: the low bit of `prev_size` records whether *this* block is
//! allocated, the low bit of `next_size` records the red/black color of a
//! free block's tree node. Sizes are always multiples of [`ALIGNMENT`], so
//! the stolen bits never collide with real size data.
//!
//! A free block's payload area holds its tree node fields ([`FreeBlock`]),
//! which is why blocks can never shrink below [`MIN_BLOCK`] bytes.

use core::mem;
use core::ptr;

use super::super::ALIGNMENT;
use crate::utils::align_up;

/// Low bit of `prev_size`: set when this block is allocated.
const ALLOCATED_BIT: usize = 1;
/// Low bit of `next_size`: set when this free block's tree node is red.
const RED_BIT: usize = 1;
/// Masks either stolen bit off a size field.
const SIZE_MASK: usize = !1;

/// Bytes separating a block header from its payload.
pub(super) const HEADER_BYTES: usize = align_up(mem::size_of::<BlockHeader>(), ALIGNMENT);

/// Smallest payload a block may carry: enough for the tree node fields of
/// [`FreeBlock`], so any block can be reinserted into the free tree.
pub(super) const NODE_SPACE: usize =
    align_up(mem::size_of::<FreeBlock>() - mem::size_of::<BlockHeader>(), ALIGNMENT);

/// Smallest whole block: header plus tree-node-capable payload.
pub(super) const MIN_BLOCK: usize = HEADER_BYTES + NODE_SPACE;

/// Splitting leaves a tail block only when the leftover strictly exceeds
/// this many bytes.
pub(super) const SPLIT_THRESHOLD: usize = align_up(mem::size_of::<FreeBlock>(), ALIGNMENT);

/// In-band header carried by every block, including the terminal sentinel
#[repr(C)]
pub(super) struct BlockHeader {
    /// Distance in bytes back to the previous block's header (0 for the
    /// first block). Low bit: this block is allocated.
    prev_size: usize,
    /// Distance in bytes forward to the next block's header, i.e. the
    /// whole block size including this header. Low bit: tree node color.
    next_size: usize,
}

impl BlockHeader {
    /// Whole block size in bytes, header included.
    #[inline]
    pub(super) fn block_size(&self) -> usize {
        self.next_size & SIZE_MASK
    }

    /// Payload bytes available behind the header; the key under which free
    /// blocks are indexed in the tree.
    #[inline]
    pub(super) fn usable_size(&self) -> usize {
        self.block_size() - HEADER_BYTES
    }

    /// Distance back to the previous block's header; 0 for the first block.
    #[inline]
    pub(super) fn prev_dist(&self) -> usize {
        self.prev_size & SIZE_MASK
    }

    #[inline]
    pub(super) fn is_allocated(&self) -> bool {
        self.prev_size & ALLOCATED_BIT != 0
    }

    #[inline]
    pub(super) fn set_allocated(&mut self, allocated: bool) {
        if allocated {
            self.prev_size |= ALLOCATED_BIT;
        } else {
            self.prev_size &= SIZE_MASK;
        }
    }

    /// Rewrites the whole-block size, clearing the color bit.
    #[inline]
    pub(super) fn set_block_size(&mut self, size: usize) {
        debug_assert!(size & !SIZE_MASK == 0);
        self.next_size = size;
    }

    /// Extends the block over `bytes` more bytes, preserving the color bit.
    #[inline]
    pub(super) fn grow_block(&mut self, bytes: usize) {
        debug_assert!(bytes & !SIZE_MASK == 0);
        self.next_size += bytes;
    }

    /// Rewrites the back distance, clearing the allocated bit.
    #[inline]
    pub(super) fn set_prev_dist(&mut self, dist: usize) {
        debug_assert!(dist & !SIZE_MASK == 0);
        self.prev_size = dist;
    }

    /// Adjusts the back distance, preserving the allocated bit.
    #[inline]
    pub(super) fn shift_prev_dist(&mut self, delta: isize) {
        debug_assert!(delta & 1 == 0);
        self.prev_size = self.prev_size.wrapping_add_signed(delta);
    }

    /// Writes a terminal sentinel: zero forward size, allocated, `dist`
    /// bytes back to the last real block.
    ///
    /// # Safety
    /// `at` must be in-bounds and writable for two words.
    #[inline]
    pub(super) unsafe fn write_sentinel(at: *mut BlockHeader, dist: usize) {
        unsafe {
            (*at).prev_size = dist | ALLOCATED_BIT;
            (*at).next_size = 0;
        }
    }

    /// Header of the physically following block.
    #[inline]
    pub(super) unsafe fn next_header(this: *mut BlockHeader) -> *mut BlockHeader {
        unsafe { this.byte_add((*this).block_size()) }
    }

    /// Header of the physically preceding block; the caller checks
    /// `prev_dist() != 0` first.
    #[inline]
    pub(super) unsafe fn prev_header(this: *mut BlockHeader) -> *mut BlockHeader {
        unsafe { this.byte_sub((*this).prev_dist()) }
    }
}

/// Tree node stored in the payload of every free block
///
/// The two child slots are indexed by rotation direction; duplicate-chain
/// members reuse them as prev/next links (see the `tree` module for the
/// chain encoding).
#[repr(C)]
pub(super) struct FreeBlock {
    pub(super) header: BlockHeader,
    pub(super) children: [*mut FreeBlock; 2],
    pub(super) parent: *mut FreeBlock,
    /// Tree node: null or head of this size's duplicate chain.
    /// Chain member: points to itself as a membership tag.
    pub(super) duplist: *mut FreeBlock,
}

impl FreeBlock {
    /// Usable payload size; the tree key.
    #[inline]
    pub(super) fn space(&self) -> usize {
        self.header.usable_size()
    }

    #[inline]
    pub(super) fn is_red(&self) -> bool {
        self.header.next_size & RED_BIT != 0
    }

    #[inline]
    pub(super) fn set_red(&mut self) {
        self.header.next_size |= RED_BIT;
    }

    #[inline]
    pub(super) fn set_black(&mut self) {
        self.header.next_size &= SIZE_MASK;
    }

    /// Copies another node's color onto this one.
    #[inline]
    pub(super) fn set_color_of(&mut self, other: &FreeBlock) {
        self.header.next_size =
            (self.header.next_size & SIZE_MASK) | (other.header.next_size & RED_BIT);
    }

    /// Detached all-null node used as the double-black placeholder during
    /// deletion rebalancing.
    pub(super) fn placeholder() -> Self {
        FreeBlock {
            header: BlockHeader {
                prev_size: 0,
                next_size: 0,
            },
            children: [ptr::null_mut(); 2],
            parent: ptr::null_mut(),
            duplist: ptr::null_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stolen_bits_do_not_leak_into_sizes() {
        let mut h = BlockHeader {
            prev_size: 0,
            next_size: 0,
        };
        h.set_block_size(64);
        h.set_prev_dist(32);
        h.set_allocated(true);

        assert_eq!(h.block_size(), 64);
        assert_eq!(h.usable_size(), 64 - HEADER_BYTES);
        assert_eq!(h.prev_dist(), 32);
        assert!(h.is_allocated());

        h.shift_prev_dist(-16);
        assert_eq!(h.prev_dist(), 16);
        assert!(h.is_allocated(), "shift keeps the allocated bit");

        h.grow_block(16);
        assert_eq!(h.block_size(), 80);
    }

    #[test]
    fn color_bit_rides_next_size() {
        let mut f = FreeBlock::placeholder();
        f.header.set_block_size(48);
        assert!(!f.is_red());

        f.set_red();
        assert!(f.is_red());
        assert_eq!(f.header.block_size(), 48, "color does not disturb size");

        f.set_black();
        assert!(!f.is_red());
    }

    #[test]
    fn layout_constants_are_aligned() {
        assert_eq!(HEADER_BYTES % ALIGNMENT, 0);
        assert_eq!(NODE_SPACE % ALIGNMENT, 0);
        assert_eq!(MIN_BLOCK, HEADER_BYTES + NODE_SPACE);
        assert!(SPLIT_THRESHOLD >= MIN_BLOCK);
    }
}
