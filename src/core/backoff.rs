//! Hybrid spin/sleep backoff
//!
//! Dipakai oleh semua wait loop di queue: backpressure producer, rollback
//! consumer, dan spinlock `TailPublisher`. Tidak ada condition variable,
//! thread hanya spin lalu tidur sangat singkat.

use crate::sync::spin_loop;

/// Jumlah percobaan spin sebelum thread tidur sekali.
pub const SPINS_PER_SLEEP: u32 = 8;

/// Backoff lokal per wait loop
///
/// Setiap `snooze()` memberi hint spin ke CPU. Setiap `SPINS_PER_SLEEP`
/// panggilan, thread tidur 1 ns (`nanosleep`), yang praktis berarti
/// menyerahkan sisa time slice ke scheduler.
#[derive(Debug, Default)]
pub struct Backoff {
    spins: u32,
}

impl Backoff {
    pub const fn new() -> Self {
        Self { spins: 0 }
    }

    /// Tunggu sebentar. Eskalasi ke sleep setiap `SPINS_PER_SLEEP` panggilan.
    #[inline]
    pub fn snooze(&mut self) {
        self.spins += 1;
        if self.spins == SPINS_PER_SLEEP {
            self.spins = 0;
            nano_sleep();
        } else {
            spin_loop();
        }
    }

    /// Jumlah spin sejak sleep terakhir
    #[inline]
    pub fn spins(&self) -> u32 {
        self.spins
    }
}

#[cfg(all(unix, not(feature = "loom")))]
#[inline(never)]
pub(crate) fn nano_sleep() {
    let req = libc::timespec {
        tv_sec: 0,
        tv_nsec: 1,
    };
    // SAFETY: `req` valid selama panggilan, remainder boleh null
    unsafe {
        libc::nanosleep(&req, std::ptr::null_mut());
    }
}

#[cfg(all(not(unix), not(feature = "loom")))]
#[inline(never)]
pub(crate) fn nano_sleep() {
    crate::sync::thread::sleep(std::time::Duration::from_nanos(1));
}

// Loom tidak memodelkan waktu, cukup yield supaya scheduler eksplorasi jalan.
#[cfg(feature = "loom")]
pub(crate) fn nano_sleep() {
    crate::sync::thread::yield_now();
}
