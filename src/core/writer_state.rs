//! Packed writer state: claimed tail + jumlah writer in-flight
//!
//! Dua counter yang berkorelasi dikemas dalam satu `u64` supaya producer bisa
//! klaim slot DAN mendaftar sebagai writer aktif dengan satu `fetch_add`.
//!
//! Layout (bit tinggi ke rendah):
//!
//! ```text
//! | claimed tail (64 - WRITER_COUNT_BITS) | in-flight count (WRITER_COUNT_BITS) |
//! ```
//!
//! Count ada di bit rendah karena dia yang di-decrement: count selalu >= 1
//! saat decrement, jadi tidak pernah ada borrow ke field tail.
//!
//! Pembagian bit menentukan batas queue. Setengah atas field tail dicadangkan
//! untuk overshoot: setiap producer yang lolos cek "belum penuh" bersamaan
//! bisa mendorong claim satu slot melewati capacity, jadi
//! `MAX_CAPACITY = MAX_TAIL >> 1` memberi ruang 2^(tail bits - 1) producer
//! sebelum field tail bisa carry keluar dari word.
//!
//! | WRITER_COUNT_BITS | max producer bersamaan | max capacity (`MAX_CAPACITY`) |
//! |-------------------|------------------------|-------------------------------|
//! | 16                | 65 535                 | 2^47 - 1                      |
//! | 24                | 16 M                   | 2^39 - 1                      |
//! | 32                | 2 G (headroom overshoot) | 2^31 - 1                    |

/// Lebar field in-flight count.
pub const WRITER_COUNT_BITS: u32 = 32;

const COUNT_MASK: u64 = (1 << WRITER_COUNT_BITS) - 1;

/// Snapshot hasil unpack dari word atomik
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterState {
    /// Claimed tail: index slot bebas berikutnya (sudah diklaim, belum tentu visible)
    pub tail: u64,
    /// Producer yang sudah klaim slot tapi belum selesai menulis
    pub count: u64,
}

impl WriterState {
    /// Nilai maksimum field tail
    pub const MAX_TAIL: u64 = u64::MAX >> WRITER_COUNT_BITS;

    /// Capacity maksimum queue. Sisa `MAX_TAIL - MAX_CAPACITY` slot adalah
    /// headroom untuk claim yang overshoot.
    pub const MAX_CAPACITY: u64 = Self::MAX_TAIL >> 1;

    #[inline(always)]
    pub const fn unpack(word: u64) -> Self {
        Self {
            tail: word >> WRITER_COUNT_BITS,
            count: word & COUNT_MASK,
        }
    }

    #[inline(always)]
    pub const fn pack(self) -> u64 {
        (self.tail << WRITER_COUNT_BITS) | (self.count & COUNT_MASK)
    }

    /// Increment untuk `fetch_add`: klaim `slots` slot dan daftar satu writer.
    #[inline(always)]
    pub const fn claim(slots: u64) -> u64 {
        (slots << WRITER_COUNT_BITS) | 1
    }

    /// Decrement untuk `fetch_sub`: satu writer selesai.
    #[inline(always)]
    pub const fn release() -> u64 {
        1
    }

    /// Increment untuk `fetch_add`: majukan tail tanpa mendaftar writer.
    #[inline(always)]
    pub const fn advance(slots: u64) -> u64 {
        slots << WRITER_COUNT_BITS
    }

    /// State setelah `fetch_add(inc)` yang mengembalikan `prev`.
    #[inline(always)]
    pub const fn after_add(prev: u64, inc: u64) -> Self {
        Self::unpack(prev.wrapping_add(inc))
    }

    /// State setelah `fetch_sub(dec)` yang mengembalikan `prev`.
    #[inline(always)]
    pub const fn after_sub(prev: u64, dec: u64) -> Self {
        Self::unpack(prev.wrapping_sub(dec))
    }

    /// Claimed tail sebagai index, dibatasi ke `capacity`.
    #[inline(always)]
    pub fn tail_within(self, capacity: usize) -> usize {
        usize::try_from(self.tail).map_or(capacity, |tail| tail.min(capacity))
    }
}
