//! Spinlock minimal untuk publish visible tail
//!
//! Hanya dipakai di slow path: writer terakhir dari satu batch harus
//! memajukan `tail`, tapi writer lain mungkin sudah memajukannya lebih jauh
//! di antara decrement count dan store. Cek-lalu-store harus dilakukan di
//! bawah lock karena nilai lama `tail` untuk CAS tidak diketahui.
//!
//! Bukan lock general-purpose. Satu-satunya invariant yang dijaga:
//! `tail` tidak pernah mundur.

use super::backoff::{nano_sleep, SPINS_PER_SLEEP};
use crate::sync::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug)]
pub struct TailPublisher {
    locked: AtomicBool,
}

/// RAII guard, lock dilepas saat drop
#[must_use = "lock dilepas segera kalau guard tidak disimpan"]
pub struct PublishGuard<'a> {
    lock: &'a AtomicBool,
}

impl TailPublisher {
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Ambil lock. Test-and-set sampai `SPINS_PER_SLEEP` kali per ronde,
    /// lalu tidur sebentar sebelum ronde berikutnya.
    #[inline]
    pub fn acquire(&self) -> PublishGuard<'_> {
        while self.locked.swap(true, Ordering::Acquire) {
            for _ in 1..SPINS_PER_SLEEP {
                if !self.locked.swap(true, Ordering::Acquire) {
                    return PublishGuard { lock: &self.locked };
                }
            }
            nano_sleep();
        }
        PublishGuard { lock: &self.locked }
    }

    /// Majukan `tail` ke `new_tail` kalau belum ada writer lain yang
    /// memajukannya lebih jauh.
    ///
    /// Store memakai `Release`: semua slot yang ditulis sebelum publish
    /// visible untuk consumer yang membaca `tail` dengan `Acquire`.
    /// Returns `true` jika tail benar-benar bergerak.
    #[inline]
    pub fn advance(&self, tail: &AtomicUsize, new_tail: usize) -> bool {
        let _guard = self.acquire();
        if tail.load(Ordering::Relaxed) < new_tail {
            tail.store(new_tail, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for TailPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishGuard<'_> {
    /// Lepas lock secara eksplisit (sama dengan drop).
    #[inline]
    pub fn release(self) {}
}

impl Drop for PublishGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.store(false, Ordering::Release);
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_releases_on_drop() {
        let publisher = TailPublisher::new();
        {
            let _guard = publisher.acquire();
            assert!(publisher.is_locked());
        }
        assert!(!publisher.is_locked());

        let guard = publisher.acquire();
        guard.release();
        assert!(!publisher.is_locked());
    }

    #[test]
    fn test_advance_never_moves_backward() {
        let publisher = TailPublisher::new();
        let tail = AtomicUsize::new(0);

        assert!(publisher.advance(&tail, 10));
        assert!(!publisher.advance(&tail, 4));
        assert!(!publisher.advance(&tail, 10));
        assert_eq!(tail.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_concurrent_advance_keeps_max() {
        let publisher = Arc::new(TailPublisher::new());
        let tail = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let publisher = Arc::clone(&publisher);
                let tail = Arc::clone(&tail);
                thread::spawn(move || {
                    for i in 0..1000 {
                        publisher.advance(&tail, i * 8 + t);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tail.load(Ordering::Relaxed), 999 * 8 + 7);
        assert!(!publisher.is_locked());
    }
}
