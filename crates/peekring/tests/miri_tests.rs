//! Miri-compatible tests for the unsafe slot-storage paths.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! Exercises the paths where undefined behavior could hide:
//! - `MaybeUninit` slot writes and `assume_init_*` reads
//! - wrap-around reuse of retired slots
//! - drop-in-place on batched advance and on ring drop

use peekring::{ring, RingConfig};

#[test]
fn miri_push_peek_advance() {
    let (mut tx, mut rx) = ring::<u64>(RingConfig::new(2, false)); // 4 slots

    tx.try_push(100).unwrap();
    tx.try_push(200).unwrap();

    let base = rx.pos();
    assert_eq!(rx.peek(base), Some(&100));
    assert_eq!(rx.peek(base + 1), Some(&200));
    rx.advance(2);
    assert!(rx.is_empty());
}

#[test]
fn miri_wrap_around_reuse() {
    let (mut tx, mut rx) = ring::<u32>(RingConfig::new(1, false)); // 2 slots

    for round in 0..4 {
        assert!(tx.try_push(round * 2).is_ok());
        assert!(tx.try_push(round * 2 + 1).is_ok());
        assert_eq!(rx.pop(), Some(round * 2));
        assert_eq!(rx.pop(), Some(round * 2 + 1));
    }
}

#[test]
fn miri_heap_payload_drop() {
    let (mut tx, mut rx) = ring::<String>(RingConfig::new(2, false));

    tx.try_push(String::from("alpha")).unwrap();
    tx.try_push(String::from("beta")).unwrap();
    tx.try_push(String::from("gamma")).unwrap();

    assert_eq!(rx.peek(rx.pos()).map(String::as_str), Some("alpha"));

    // One moved out, one dropped by advance, one dropped with the ring.
    let owned = rx.pop().unwrap();
    assert_eq!(owned, "alpha");
    rx.advance(1);
}

#[test]
fn miri_threaded_smoke() {
    let (mut tx, mut rx) = ring::<u64>(RingConfig::new(3, false));

    let producer = std::thread::spawn(move || {
        for i in 0..64 {
            tx.push_blocking(i).unwrap();
        }
    });

    let mut expected = 0u64;
    while expected < 64 {
        if let Some(v) = rx.pop() {
            assert_eq!(v, expected);
            expected += 1;
        } else {
            std::hint::spin_loop();
        }
    }

    producer.join().unwrap();
}
