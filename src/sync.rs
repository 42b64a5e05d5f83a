//! Shim atomics: std secara default, loom saat feature `loom` aktif.

#[cfg(not(feature = "loom"))]
pub use std::hint::spin_loop;
#[cfg(feature = "loom")]
pub use loom::hint::spin_loop;

#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

#[cfg(feature = "loom")]
pub use loom::thread;
#[cfg(not(feature = "loom"))]
#[allow(unused_imports)]
pub use std::thread;
