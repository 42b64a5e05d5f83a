//! Lock-Free Bounded Multi-Producer Multi-Consumer (MPMC) Queue
//!
//! Queue berukuran tetap di atas memory milik caller. Tidak ada alokasi,
//! tidak ada Mutex di data path.
//!
//! Capacity adalah batas jumlah entry yang bisa di-enqueue selama satu
//! session (walaupun entry langsung di-dequeue). Setelah capacity habis,
//! queue harus di-`reset()` sebelum dipakai lagi.
//!
//! Mekanisme inti:
//! - Claim: producer klaim slot DAN daftar sebagai writer in-flight dengan
//!   satu `fetch_add` pada `WriterState`
//! - Last writer publishes: writer terakhir yang selesai dari satu batch
//!   memajukan visible tail untuk semua writer di batch itu
//! - Optimistic dequeue: consumer `fetch_add` head lalu rollback via CAS
//!   kalau ternyata mendahului producer
//!
//! Contoh:
//! ```
//! use std::mem::MaybeUninit;
//! use atomq::AtomicQueue;
//!
//! let mut memory = [MaybeUninit::<u64>::uninit(); 16];
//! let queue = AtomicQueue::new(&mut memory);
//!
//! assert!(queue.enqueue(100));
//! assert!(queue.enqueue(200));
//! queue.end_enqueue();
//!
//! assert_eq!(queue.dequeue(), 100);
//! assert_eq!(queue.dequeue(), 200);
//! assert_eq!(queue.dequeue(), 0); // empty value
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr::{self, NonNull};

use tracing::{debug, trace};

use super::backoff::Backoff;
use super::error::QueueError;
use super::tail_publisher::TailPublisher;
use super::writer_state::WriterState;
use crate::sync::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Jarak maksimum claimed tail di depan visible tail sebelum producer di-stall.
///
/// Entry baru tidak visible selama masih ada writer lain di batch yang sama.
/// Tanpa batas ini, producer yang cepat bisa membuat consumer kelaparan.
pub const MAX_ENQUEUE_AHEAD: usize = 32;

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
struct CacheLinePadded<T> {
    value: T,
}

impl<T> CacheLinePadded<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

/// Lock-Free Bounded MPMC Queue
///
/// `tail`, `writer_state`, dan `head` masing-masing di cache line sendiri
/// untuk menghindari false sharing antara producer dan consumer.
#[repr(C)]
pub struct AtomicQueue<'a, T> {
    // Visible tail: consumer boleh membaca slot di bawah index ini
    tail: CacheLinePadded<AtomicUsize>,
    // Claimed tail + jumlah writer in-flight, lihat `WriterState`
    writer_state: CacheLinePadded<AtomicU64>,
    head: CacheLinePadded<AtomicUsize>,
    finalized: CacheLinePadded<AtomicBool>,
    publisher: TailPublisher,
    #[cfg(debug_assertions)]
    fast_writer: AtomicBool,
    buffer: NonNull<MaybeUninit<T>>,
    capacity: usize,
    empty_value: T,
    _memory: PhantomData<&'a mut [MaybeUninit<T>]>,
}

// SAFETY: AtomicQueue aman untuk Send/Sync karena:
// - Setiap slot ditulis tepat oleh satu producer (slot diklaim atomik)
// - Setiap slot dibaca tepat oleh satu consumer (head diklaim atomik)
// - Release/Acquire pada `tail` menjamin slot sudah ditulis sebelum dibaca
// - Element hanya berpindah by value antar thread, tidak pernah ada `&T`
//   yang dibagi, jadi `T: Send` cukup untuk Sync
unsafe impl<T: Send> Send for AtomicQueue<'_, T> {}
unsafe impl<T: Send> Sync for AtomicQueue<'_, T> {}

impl<'a, T: Copy + PartialEq + Default> AtomicQueue<'a, T> {
    /// Membuat queue kosong di atas `buffer`, empty value = `T::default()`.
    ///
    /// # Panics
    /// Panic jika `T` zero-sized atau `buffer.len()` melebihi `WriterState::MAX_CAPACITY`
    pub fn new(buffer: &'a mut [MaybeUninit<T>]) -> Self {
        Self::with_empty_value(buffer, T::default())
    }
}

impl<'a, T: Copy + PartialEq> AtomicQueue<'a, T> {
    /// Membuat queue kosong dengan empty value custom.
    ///
    /// # Panics
    /// Panic jika `T` zero-sized atau `buffer.len()` melebihi `WriterState::MAX_CAPACITY`
    pub fn with_empty_value(buffer: &'a mut [MaybeUninit<T>], empty_value: T) -> Self {
        assert!(mem::size_of::<T>() != 0, "zero-sized element type");
        assert!(
            buffer.len() as u64 <= WriterState::MAX_CAPACITY,
            "capacity exceeds writer state tail width"
        );

        let capacity = buffer.len();
        let memory = NonNull::from(buffer).cast::<MaybeUninit<T>>();
        Self::from_parts(memory, capacity, empty_value)
    }

    /// Membuat queue di atas range memory mentah sebesar `bytes`.
    ///
    /// Capacity = `bytes / size_of::<T>()`.
    ///
    /// # Safety
    /// `memory` harus valid untuk read dan write sebesar `bytes` selama `'a`,
    /// dan tidak boleh diakses lewat jalur lain selama queue hidup. Caller
    /// tetap pemilik memory dan yang membebaskannya setelah queue di-drop.
    pub unsafe fn from_raw_parts(
        memory: NonNull<u8>,
        bytes: usize,
        empty_value: T,
    ) -> Result<Self, QueueError> {
        let size = mem::size_of::<T>();
        if size == 0 {
            return Err(QueueError::ZeroSizedElement);
        }

        let align = mem::align_of::<T>();
        let addr = memory.as_ptr() as usize;
        if addr % align != 0 {
            return Err(QueueError::Misaligned { addr, align });
        }

        let capacity = bytes / size;
        if capacity as u64 > WriterState::MAX_CAPACITY {
            return Err(QueueError::CapacityTooLarge {
                capacity,
                max: WriterState::MAX_CAPACITY,
            });
        }

        Ok(Self::from_parts(memory.cast(), capacity, empty_value))
    }

    fn from_parts(buffer: NonNull<MaybeUninit<T>>, capacity: usize, empty_value: T) -> Self {
        Self {
            tail: CacheLinePadded::new(AtomicUsize::new(0)),
            writer_state: CacheLinePadded::new(AtomicU64::new(0)),
            head: CacheLinePadded::new(AtomicUsize::new(0)),
            finalized: CacheLinePadded::new(AtomicBool::new(false)),
            publisher: TailPublisher::new(),
            #[cfg(debug_assertions)]
            fast_writer: AtomicBool::new(false),
            buffer,
            capacity,
            empty_value,
            _memory: PhantomData,
        }
    }

    /// Tambah entry di tail (general multi-producer path).
    ///
    /// Returns `false` jika queue penuh untuk session ini atau `value` sama
    /// dengan empty value. Lock-free kecuali saat publish tail yang race.
    pub fn enqueue(&self, value: T) -> bool {
        debug_assert!(
            !self.finalized.value.load(Ordering::Relaxed),
            "enqueue called after end_enqueue"
        );

        // Empty value tidak boleh masuk: saat di-dequeue queue akan terlihat kosong
        if value == self.empty_value {
            return false;
        }

        if !self.wait_for_room() {
            trace!(capacity = self.capacity, "enqueue rejected, queue full");
            return false;
        }

        // Klaim slot di tail dan daftar sebagai writer in-flight. Consumer
        // belum bisa membaca slot ini karena visible tail belum maju.
        let inc = WriterState::claim(1);
        let claimed =
            WriterState::after_add(self.writer_state.value.fetch_add(inc, Ordering::AcqRel), inc);

        if claimed.tail > self.capacity as u64 {
            // Overshoot: slot sebelum capacity semua milik writer lain. Kalau
            // kita writer terakhir, tidak ada yang tersisa untuk publish.
            if self.finish_write().count == 0 {
                self.publisher.advance(&self.tail.value, self.capacity);
            }
            trace!(capacity = self.capacity, "enqueue rejected, queue full");
            return false;
        }

        let slot = (claimed.tail - 1) as usize;
        // SAFETY: slot < capacity dan diklaim eksklusif oleh writer ini
        unsafe { self.write_slot(slot, value) };

        self.publish_if_last();
        true
    }

    /// Tambah beberapa entry sekaligus sebagai satu unit.
    ///
    /// Lebih efisien daripada `enqueue` berulang. Semua atau tidak sama
    /// sekali: jika satu entry sama dengan empty value, atau range tidak muat
    /// di sisa capacity, tidak ada slot yang diklaim dan hasilnya `false`.
    /// Range kosong selalu berhasil.
    pub fn enqueue_range(&self, values: &[T]) -> bool {
        debug_assert!(
            !self.finalized.value.load(Ordering::Relaxed),
            "enqueue called after end_enqueue"
        );

        if values.is_empty() {
            return true;
        }
        if values.iter().any(|value| *value == self.empty_value) {
            return false;
        }

        if !self.wait_for_room() {
            trace!(capacity = self.capacity, "enqueue_range rejected, queue full");
            return false;
        }

        // CAS loop, bukan fetch_add: claim tidak boleh overshoot supaya
        // range yang gagal tidak meninggalkan slot kosong di bawah capacity.
        let count = values.len() as u64;
        let inc = WriterState::claim(count);
        let mut current = self.writer_state.value.load(Ordering::Relaxed);
        let end = loop {
            let state = WriterState::unpack(current);
            let end = match state.tail.checked_add(count) {
                Some(end) if end <= self.capacity as u64 => end,
                _ => {
                    trace!(
                        capacity = self.capacity,
                        requested = values.len(),
                        "enqueue_range rejected, range does not fit"
                    );
                    return false;
                }
            };

            match self.writer_state.value.compare_exchange_weak(
                current,
                current.wrapping_add(inc),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break end,
                Err(actual) => current = actual,
            }
        };

        let first = (end - count) as usize;
        // SAFETY: [first, first + len) < capacity dan diklaim eksklusif.
        // MaybeUninit<T> punya layout yang sama dengan T.
        unsafe {
            ptr::copy_nonoverlapping(
                values.as_ptr(),
                self.buffer.as_ptr().add(first).cast::<T>(),
                values.len(),
            );
        }

        self.publish_if_last();
        true
    }

    /// Versi cepat `enqueue` untuk satu producer.
    ///
    /// Tidak ada pemisahan claim/publish: visible tail langsung dipakai
    /// sebagai titik claim lalu dimajukan dengan satu store. Consumer boleh
    /// jalan bersamaan.
    ///
    /// Returns `false` jika queue penuh atau `value` sama dengan empty value.
    ///
    /// # Safety
    /// Hanya satu thread yang boleh berada di `fast_enqueue` pada satu waktu,
    /// dan tidak boleh ada `enqueue`/`enqueue_range` dari thread lain yang
    /// berjalan bersamaan. Melanggar ini membuat dua writer menulis slot yang
    /// sama.
    pub unsafe fn fast_enqueue(&self, value: T) -> bool {
        debug_assert!(
            !self.finalized.value.load(Ordering::Relaxed),
            "fast_enqueue called after end_enqueue"
        );

        if value == self.empty_value {
            return false;
        }

        #[cfg(debug_assertions)]
        let _writer = FastWriterGuard::enter(&self.fast_writer);

        // Satu-satunya writer ke tail
        let tail = self.tail.value.load(Ordering::Relaxed);
        if tail >= self.capacity {
            return false;
        }

        // SAFETY: tail < capacity, dan caller menjamin tidak ada writer lain
        unsafe { self.write_slot(tail, value) };

        // `enqueue` berikutnya memakai writer_state, jadi harus tetap sinkron
        self.writer_state
            .value
            .fetch_add(WriterState::advance(1), Ordering::AcqRel);

        // Release: tulisan slot visible sebelum tail baru terlihat
        self.tail.value.store(tail + 1, Ordering::Release);
        true
    }

    /// Tandai bahwa tidak ada entry baru sampai `reset()`.
    ///
    /// `dequeue` pada queue kosong yang sudah finalized langsung return
    /// empty value tanpa menunggu.
    pub fn end_enqueue(&self) {
        self.finalized.value.store(true, Ordering::Release);
        debug!(len = self.len(), capacity = self.capacity, "enqueue finalized");
    }

    /// Ambil entry pertama, atau empty value jika queue kosong.
    pub fn dequeue(&self) -> T {
        // Increment head secara optimis. Bisa prematur kalau head melewati
        // tail dan mengklaim slot yang belum ada.
        let head = self.head.value.fetch_add(1, Ordering::AcqRel);
        let mut backoff = Backoff::new();

        loop {
            // Baca finalized SEBELUM tail: kalau finalized, tail sudah final
            let finalized = self.finalized.value.load(Ordering::Acquire);

            // Acquire berpasangan dengan Release pada publish tail
            if head < self.tail.value.load(Ordering::Acquire) {
                // SAFETY: slot di bawah visible tail sudah ditulis, dan hanya
                // consumer ini yang memegang index `head`
                return unsafe { self.read_slot(head) };
            }

            if finalized {
                return self.empty_value;
            }

            // Queue kosong: rollback increment milik sendiri. Consumer lain
            // bisa dalam kondisi yang sama, jadi masing-masing hanya boleh
            // membatalkan increment-nya sendiri. Kalau CAS gagal, slot kita
            // mungkin sudah valid, cek ulang.
            match self.head.value.compare_exchange(
                head.wrapping_add(1),
                head,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return self.empty_value,
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// Kembalikan queue ke state awal untuk session baru.
    ///
    /// `&mut self` menjamin tidak ada thread lain yang memakai queue.
    ///
    /// # Panics
    /// Panic jika `end_enqueue()` belum dipanggil di session ini
    pub fn reset(&mut self) {
        assert!(
            self.finalized.value.load(Ordering::Relaxed),
            "reset called without end_enqueue"
        );

        self.head.value.store(0, Ordering::Relaxed);
        self.tail.value.store(0, Ordering::Relaxed);
        self.writer_state.value.store(0, Ordering::Relaxed);
        self.finalized.value.store(false, Ordering::Relaxed);
        debug!(capacity = self.capacity, "queue reset");
    }

    /// Cek apakah queue kosong (snapshot, bisa basi sebelum return)
    #[inline]
    pub fn is_empty(&self) -> bool {
        let tail = self.tail.value.load(Ordering::Relaxed);
        let head = self.head.value.load(Ordering::Acquire);
        head >= tail
    }

    /// Perkiraan jumlah entry di queue
    ///
    /// Head dan tail tidak dibaca atomik sebagai pasangan. Head bisa
    /// overshoot tail di queue kosong, dalam kasus itu hasilnya 0.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.value.load(Ordering::Relaxed);
        let head = self.head.value.load(Ordering::Acquire);
        tail.saturating_sub(head)
    }

    /// Jumlah slot yang sudah diklaim di session ini (termasuk yang belum visible)
    #[inline]
    pub fn claimed_len(&self) -> usize {
        WriterState::unpack(self.writer_state.value.load(Ordering::Relaxed))
            .tail_within(self.capacity)
    }

    /// Cek apakah `end_enqueue()` sudah dipanggil
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finalized.value.load(Ordering::Acquire)
    }

    /// Kapasitas queue per session
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn empty_value(&self) -> T {
        self.empty_value
    }

    /// Stall producer selama terlalu banyak slot diklaim tapi belum visible.
    ///
    /// Returns `false` jika semua slot session sudah diklaim.
    #[inline]
    fn wait_for_room(&self) -> bool {
        let mut backoff = Backoff::new();
        loop {
            let claimed = WriterState::unpack(self.writer_state.value.load(Ordering::Relaxed)).tail;
            if claimed >= self.capacity as u64 {
                return false;
            }
            let visible = self.tail.value.load(Ordering::Relaxed) as u64;
            if claimed <= visible + MAX_ENQUEUE_AHEAD as u64 {
                return true;
            }
            backoff.snooze();
        }
    }

    /// Keluar dari set writer in-flight, return state sesudahnya.
    #[inline]
    fn finish_write(&self) -> WriterState {
        let dec = WriterState::release();
        WriterState::after_sub(self.writer_state.value.fetch_sub(dec, Ordering::AcqRel), dec)
    }

    /// Writer terakhir dari batch mempublish semua slot yang sudah diklaim.
    ///
    /// Count 0 berarti setiap claim yang tercakup di tail sudah selesai
    /// ditulis, dan AcqRel pada decrement membuat semua tulisan itu visible
    /// untuk thread ini sebelum Release store di publisher.
    #[inline]
    fn publish_if_last(&self) {
        let state = self.finish_write();
        if state.count == 0 {
            self.publisher
                .advance(&self.tail.value, state.tail_within(self.capacity));
        }
    }

    /// # Safety
    /// `index < capacity` dan slot diklaim eksklusif oleh pemanggil
    #[inline(always)]
    unsafe fn write_slot(&self, index: usize, value: T) {
        debug_assert!(index < self.capacity);
        unsafe { (*self.buffer.as_ptr().add(index)).write(value) };
    }

    /// # Safety
    /// `index` di bawah visible tail dan hanya dibaca oleh pemanggil
    #[inline(always)]
    unsafe fn read_slot(&self, index: usize) -> T {
        debug_assert!(index < self.capacity);
        unsafe { (*self.buffer.as_ptr().add(index)).assume_init_read() }
    }
}

impl<T: Copy + PartialEq + fmt::Debug> fmt::Debug for AtomicQueue<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("claimed", &self.claimed_len())
            .field("finalized", &self.is_finalized())
            .field("empty_value", &self.empty_value)
            .finish()
    }
}

/// Deteksi `fast_enqueue` yang dipanggil bersamaan dari dua thread (debug build)
#[cfg(debug_assertions)]
struct FastWriterGuard<'q> {
    flag: &'q AtomicBool,
}

#[cfg(debug_assertions)]
impl<'q> FastWriterGuard<'q> {
    fn enter(flag: &'q AtomicBool) -> Self {
        assert!(
            !flag.swap(true, Ordering::Acquire),
            "fast_enqueue called concurrently with itself"
        );
        Self { flag }
    }
}

#[cfg(debug_assertions)]
impl Drop for FastWriterGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
