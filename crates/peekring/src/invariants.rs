//! Debug assertion macros for the ring's cursor invariants.
//!
//! Active only in debug builds, so there is zero overhead in release builds.
//! `head` is the producer cursor, `tail` the consumer cursor; both are
//! monotonic u64 sequence numbers.

/// Assert that the occupied slot count does not exceed capacity.
///
/// **Invariant**: `0 ≤ (head - tail) ≤ capacity`
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "occupancy {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that a cursor only moves forward.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} cursor moved backwards: {} -> {}",
            $name,
            $old,
            $new
        )
    };
}

/// Assert that the consumer does not retire slots past the published range.
///
/// **Invariant**: `tail ≤ head` (after advance)
macro_rules! debug_assert_tail_not_past_head {
    ($new_tail:expr, $head:expr) => {
        debug_assert!(
            $new_tail <= $head,
            "advancing tail {} beyond head {}",
            $new_tail,
            $head
        )
    };
}

/// Assert that a peek position has not already been retired.
///
/// **Invariant**: a peeked slot lies in `[tail, head)`; positions below the
/// tail point at storage the producer may be rewriting.
macro_rules! debug_assert_peek_not_retired {
    ($pos:expr, $tail:expr) => {
        debug_assert!(
            $pos >= $tail,
            "peeking retired slot {} (tail is {})",
            $pos,
            $tail
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_peek_not_retired;
pub(crate) use debug_assert_tail_not_past_head;
