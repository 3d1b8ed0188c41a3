//! Integration tests for the stack allocator

use bufalloc::{Allocator, MemoryUsage, StackAllocator};

#[repr(align(16))]
struct Aligned<const N: usize>([u8; N]);

#[test]
fn lifo_free_reclaims_space() {
    let mut buffer = Aligned([0u8; 64]);
    let base = buffer.0.as_ptr() as usize;
    let mut stack = StackAllocator::new(&mut buffer.0).unwrap();

    let a = stack.allocate(10).unwrap();
    assert_eq!(a.as_ptr() as usize - base, 0);
    let b = stack.allocate(20).unwrap();
    assert_eq!(b.as_ptr() as usize - base, 16);

    unsafe { stack.deallocate(b) };

    let c = stack.allocate(30).unwrap();
    assert_eq!(c.as_ptr() as usize - base, 16);

    // 30 rounded to 32 filled the hole; nothing left for another 32.
    assert!(stack.allocate(32).is_err());
}

#[test]
fn interior_free_discards_later_allocations() {
    let mut buffer = Aligned([0u8; 128]);
    let mut stack = StackAllocator::new(&mut buffer.0).unwrap();

    let a = stack.allocate(16).unwrap();
    stack.allocate(16).unwrap();
    stack.allocate(16).unwrap();
    assert_eq!(stack.used(), 48);

    // Rewinding to the first allocation frees everything after it too.
    unsafe { stack.deallocate(a) };
    assert_eq!(stack.used(), 0);
    assert_eq!(stack.available_memory(), Some(128));
}

#[test]
fn alternating_push_pop_reuses_the_same_region() {
    let mut buffer = Aligned([0u8; 64]);
    let mut stack = StackAllocator::new(&mut buffer.0).unwrap();

    for round in 0..8u8 {
        let p = stack.allocate(48).unwrap();
        unsafe {
            std::ptr::write_bytes(p.as_ptr(), round, 48);
            assert_eq!(p.as_ptr().add(47).read(), round);
            stack.deallocate(p);
        }
        assert_eq!(stack.used(), 0);
    }
}

#[test]
fn nested_scopes_unwind_in_order() {
    let mut buffer = Aligned([0u8; 256]);
    let mut stack = StackAllocator::new(&mut buffer.0).unwrap();

    let outer = stack.allocate(32).unwrap();
    let inner = stack.allocate(64).unwrap();
    let innermost = stack.allocate(16).unwrap();

    unsafe {
        stack.deallocate(innermost);
        stack.deallocate(inner);
    }
    assert_eq!(stack.used(), 32);

    unsafe { stack.deallocate(outer) };
    assert_eq!(stack.used(), 0);
}
