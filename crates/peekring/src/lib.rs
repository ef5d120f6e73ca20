//! Lock-free single-producer single-consumer ring buffer with consumer-side
//! peeking.
//!
//! Unlike a plain pop-only queue, the consumer may inspect any published slot
//! in the window `[pos(), pos() + n)` without consuming it, process a whole
//! batch in place, and then retire the batch with a single cursor update.
//! This is the access pattern needed by batching request servers that decide
//! what to do with a slot (or a group of slots) before releasing any of them.
//!
//! # Example
//!
//! ```
//! use peekring::{ring, RingConfig};
//!
//! let (mut tx, mut rx) = ring::<u64>(RingConfig::default());
//!
//! tx.try_push(7).unwrap();
//! tx.try_push(9).unwrap();
//!
//! // Peek both slots, then retire them together.
//! let base = rx.pos();
//! assert_eq!(rx.peek(base), Some(&7));
//! assert_eq!(rx.peek(base + 1), Some(&9));
//! rx.advance(2);
//! assert!(rx.is_empty());
//! ```

mod config;
mod invariants;
mod metrics;
mod ring;

pub use config::{RingConfig, DEEP_RING, SHALLOW_RING};
pub use metrics::RingMetrics;
pub use ring::{ring, PushError, RingConsumer, RingProducer};
