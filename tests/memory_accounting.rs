//! The admission-control invariant: the shared `MemoryCounter` tracks
//! exactly the aggregate capacity of buffers currently alive, across
//! however many connections hold a clone of it.

extern crate evhttp;

use std::io::Write;

use evhttp::buffer::Buffer;
use evhttp::memory::MemoryCounter;

#[test]
fn counter_reflects_multiple_live_buffers_and_settles_to_zero() {
    let mem = MemoryCounter::new();
    assert_eq!(mem.get(), 0);

    let mut a = Buffer::with_capacity(256, mem.clone());
    let total_after_a = mem.get();
    assert!(total_after_a >= 256);

    {
        let mut b = Buffer::with_capacity(512, mem.clone());
        b.write_all(&vec![0u8; 1024]).unwrap();
        assert!(mem.get() > total_after_a);
    }
    // `b` is dropped: its capacity must be fully reclaimed, leaving
    // exactly what `a` still accounts for.
    assert_eq!(mem.get(), total_after_a);

    a.write_all(b"anything").unwrap();
    drop(a);
    assert_eq!(mem.get(), 0);
}

#[test]
fn would_exceed_gates_admission_without_mutating_the_total() {
    let mem = MemoryCounter::new();
    mem.add(1000);
    assert!(mem.would_exceed(1, 1000));
    assert!(!mem.would_exceed(0, 1000));
    // Checking must not itself have side effects.
    assert_eq!(mem.get(), 1000);
}
