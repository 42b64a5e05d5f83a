//! atomq - Bounded Lock-Free MPMC Queue
//!
//! Arsitektur:
//! - Caller-Owned Memory: Queue tidak alokasi, buffer dari slice atau mmap
//! - Lock-Free: Claim slot dengan satu fetch_add pada packed writer state
//! - Batched Publish: Visible tail dimajukan oleh writer terakhir yang selesai
//! - Single-Use Session: Capacity habis -> `end_enqueue()` -> `reset()`
//!
//! # Loom Testing
//!
//! ```text
//! cargo test --features loom --release --lib
//! ```

pub mod core;
pub(crate) mod sync;

pub use crate::core::{
    AtomicQueue, Backoff, MmapRegion, QueueError, TailPublisher, WriterState, MAX_ENQUEUE_AHEAD,
    SPINS_PER_SLEEP, WRITER_COUNT_BITS,
};

#[cfg(all(test, feature = "loom"))]
mod loom_tests;
