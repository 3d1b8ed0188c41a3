//! Integration tests for the heap allocator
//!
//! The structural invariants (boundary tags, red-black shape, duplicate
//! chains) are exercised by the unit tests next to the implementation;
//! these tests drive the public surface only.

use bufalloc::{ALIGNMENT, Allocator, HeapAllocator, MemoryUsage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[repr(align(16))]
struct Aligned<const N: usize>([u8; N]);

#[test]
fn split_then_merge_returns_all_space() {
    let mut buffer = Aligned([0u8; 256]);
    let base = buffer.0.as_ptr() as usize;
    let mut heap = HeapAllocator::new(&mut buffer.0).unwrap();

    let a = heap.allocate(32).unwrap();
    assert_eq!(a.as_ptr() as usize - base, 16);
    let b = heap.allocate(32).unwrap();
    assert_eq!(b.as_ptr() as usize - base, 64);

    unsafe {
        heap.deallocate(a);
        heap.deallocate(b);
    }

    // A request sized for the whole buffer succeeds again.
    let all = heap.allocate(224).unwrap();
    assert_eq!(all.as_ptr() as usize - base, 16);
    assert!(heap.allocate(16).is_err());
}

#[test]
fn alignment_and_containment() {
    let mut buffer = Aligned([0u8; 2048]);
    let base = buffer.0.as_ptr() as usize;
    let mut heap = HeapAllocator::new(&mut buffer.0).unwrap();

    for size in [1usize, 15, 16, 17, 100, 333] {
        let ptr = heap.allocate(size).unwrap();
        let addr = ptr.as_ptr() as usize;
        assert_eq!(addr % ALIGNMENT, 0);
        assert!(addr > base && addr + size < base + 2048);
        assert!(heap.contains(ptr.as_ptr()));
    }
}

#[test]
fn payloads_survive_arbitrary_free_order() {
    let mut buffer = Aligned([0u8; 1024]);
    let mut heap = HeapAllocator::new(&mut buffer.0).unwrap();

    let mut live = Vec::new();
    for (i, size) in [48usize, 96, 32, 160, 64].into_iter().enumerate() {
        let ptr = heap.allocate(size).unwrap();
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), i as u8 + 1, size) };
        live.push((ptr, size, i as u8 + 1));
    }

    for &index in &[1usize, 4, 0] {
        let (ptr, _, _) = live[index];
        unsafe { heap.deallocate(ptr) };
        live.retain(|&(p, _, _)| p != ptr);

        for &(p, size, pattern) in &live {
            for off in 0..size {
                unsafe { assert_eq!(p.as_ptr().add(off).read(), pattern) };
            }
        }
    }
}

#[test]
fn exhaustion_is_an_error_not_a_panic() {
    let mut buffer = Aligned([0u8; 256]);
    let mut heap = HeapAllocator::new(&mut buffer.0).unwrap();

    assert!(heap.allocate(4096).unwrap_err().is_out_of_memory());
    assert!(heap.allocate(usize::MAX).unwrap_err().is_out_of_memory());

    // Failed requests leave the heap usable.
    assert!(heap.allocate(64).is_ok());
}

#[test]
fn seeded_churn_settles_back_to_empty() {
    let mut buffer = Aligned([0u8; 4096]);
    let mut heap = HeapAllocator::new(&mut buffer.0).unwrap();
    let mut rng = StdRng::seed_from_u64(0x0B5E55ED);

    let mut live: Vec<(std::ptr::NonNull<u8>, usize, u8)> = Vec::new();
    for _ in 0..2000 {
        if rng.random_bool(0.4) && !live.is_empty() {
            let index = rng.random_range(0..live.len());
            let (ptr, size, pattern) = live.swap_remove(index);
            for off in 0..size {
                unsafe { assert_eq!(ptr.as_ptr().add(off).read(), pattern) };
            }
            unsafe { heap.deallocate(ptr) };
        } else {
            let size = rng.random_range(1..400);
            if let Ok(ptr) = heap.allocate(size) {
                let pattern = rng.random_range(1..=u8::MAX);
                unsafe { std::ptr::write_bytes(ptr.as_ptr(), pattern, size) };
                live.push((ptr, size, pattern));
            }
        }
    }

    for (ptr, _, _) in live.drain(..) {
        unsafe { heap.deallocate(ptr) };
    }
    assert_eq!(heap.used_memory(), 0);

    // One spanning region is allocatable again.
    let managed = heap.available_memory().unwrap();
    assert!(heap.allocate(managed - 16).is_ok());
}

#[test]
fn memory_usage_accounting() {
    let mut buffer = Aligned([0u8; 512]);
    let mut heap = HeapAllocator::new(&mut buffer.0).unwrap();
    let total = heap.total_memory().unwrap();

    let a = heap.allocate(64).unwrap();
    assert_eq!(heap.used_memory(), 64 + 16);
    assert_eq!(heap.total_memory(), Some(total));

    unsafe { heap.deallocate(a) };
    assert_eq!(heap.used_memory(), 0);
}

#[test]
fn all_strategies_share_the_handle_shape() {
    use bufalloc::{BumpAllocator, PoolAllocator, StackAllocator};

    let mut b1 = Aligned([0u8; 256]);
    let mut b2 = Aligned([0u8; 256]);
    let mut b3 = Aligned([0u8; 256]);
    let mut b4 = Aligned([0u8; 256]);

    let mut bump = BumpAllocator::new(&mut b1.0).unwrap();
    let mut stack = StackAllocator::new(&mut b2.0).unwrap();
    let mut pool = PoolAllocator::new(&mut b3.0, 32).unwrap();
    let mut heap = HeapAllocator::new(&mut b4.0).unwrap();

    let handles: [&mut dyn Allocator; 4] = [&mut bump, &mut stack, &mut pool, &mut heap];
    for handle in handles {
        let ptr = handle.allocate(32).unwrap();
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0x7F, 32);
            handle.deallocate(ptr);
        }
    }
}
