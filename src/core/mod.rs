//! Core module: Lock-Free Bounded MPMC Queue dengan backing memory eksternal
//!
//! Prinsip desain:
//! - No-Allocation: Queue hanya memakai memory yang diberikan caller
//! - Lock-Free: Hanya atomic operations di data path, spinlock kecil hanya
//!   untuk race saat publish tail
//! - Batched Visibility: Writer terakhir dari satu batch mempublish semuanya

mod atomic_queue;
mod backoff;
mod error;
mod mmap_region;
mod tail_publisher;
mod writer_state;

pub use atomic_queue::{AtomicQueue, MAX_ENQUEUE_AHEAD};
pub use backoff::{Backoff, SPINS_PER_SLEEP};
pub use error::QueueError;
pub use mmap_region::{MmapRegion, PAGE_ALIGN};
pub use tail_publisher::{PublishGuard, TailPublisher};
pub use writer_state::{WriterState, WRITER_COUNT_BITS};
