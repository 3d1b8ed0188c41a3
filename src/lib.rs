//! # bufalloc
//!
//! Memory allocators that operate entirely inside a caller-owned byte
//! buffer. No allocator here ever calls the operating system or another
//! allocator: all bookkeeping is stored in-band, and the caller keeps
//! ownership of both the buffer and the allocator state.
//!
//! Four strategies share one [`Allocator`] interface:
//!
//! | Strategy | Reclamation | Cost |
//! |----------|-------------|------|
//! | [`BumpAllocator`] | none (reset only) | O(1) |
//! | [`StackAllocator`] | LIFO, by rewinding | O(1) |
//! | [`PoolAllocator`] | any order, fixed-size chunks | O(1) |
//! | [`HeapAllocator`] | any order, any size | O(log n) |
//!
//! The heap is the interesting one: a best-fit allocator over a
//! boundary-tag block list, indexed by a red-black tree that lives inside
//! the free blocks themselves.
//!
//! ```
//! use bufalloc::{Allocator, HeapAllocator};
//!
//! #[repr(align(16))]
//! struct Buffer([u8; 1024]);
//!
//! let mut buffer = Buffer([0; 1024]);
//! let mut heap = HeapAllocator::new(&mut buffer.0).unwrap();
//!
//! let a = heap.allocate(100).unwrap();
//! let b = heap.allocate(200).unwrap();
//! unsafe {
//!     heap.deallocate(a);
//!     heap.deallocate(b);
//! }
//! ```
//!
//! All allocators are strictly single-threaded; see the [`allocator`]
//! module docs for the shared contract.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod allocator;
pub mod error;
pub mod utils;

// Re-export main types
pub use allocator::{
    ALIGNMENT, Allocator, BumpAllocator, HeapAllocator, MemoryUsage, PoolAllocator,
    StackAllocator,
};
pub use error::{AllocError, AllocResult};
