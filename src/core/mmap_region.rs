//! Memory-Mapped Region sebagai backing memory queue
//!
//! Queue tidak pernah alokasi sendiri. Region ini menyediakan memory yang:
//! - Page-aligned: aman untuk tipe elemen apa pun dengan alignment <= 4096
//! - Lazy: halaman baru benar-benar dialokasi kernel saat pertama disentuh
//! - Opsional file-backed: queue besar bisa spill ke page cache

use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io;
use std::mem::{self, MaybeUninit};
use std::path::Path;
use tracing::debug;

/// Alignment minimum yang dijamin mmap (ukuran page terkecil yang umum)
pub const PAGE_ALIGN: usize = 4096;

/// Region memory hasil mmap, owner dari backing buffer queue
pub struct MmapRegion {
    mmap: MmapMut,
}

impl MmapRegion {
    /// Mapping anonymous private sebesar `bytes`
    pub fn anonymous(bytes: usize) -> io::Result<Self> {
        let mmap = MmapOptions::new().len(bytes).map_anon()?;
        debug!(bytes, "mapped anonymous queue region");
        Ok(Self { mmap })
    }

    /// Mapping file-backed. File dibuat jika belum ada dan di-resize ke `bytes`.
    ///
    /// # Arguments
    /// * `path` - Path ke file backing
    /// * `bytes` - Ukuran region dalam bytes
    pub fn open<P: AsRef<Path>>(path: P, bytes: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.set_len(bytes as u64)?;

        // SAFETY: File dibuka read/write dan dimiliki proses ini selama mapping hidup
        let mmap = unsafe { MmapOptions::new().len(bytes).map_mut(&file)? };
        debug!(bytes, path = %path.display(), "mapped file-backed queue region");

        Ok(Self { mmap })
    }

    /// Ukuran region dalam bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    /// Lihat region sebagai slot `T` yang belum diinisialisasi
    ///
    /// Jumlah slot = `len() / size_of::<T>()`, sisa bytes diabaikan.
    ///
    /// # Panics
    /// Panic jika `T` zero-sized atau alignment `T` melebihi `PAGE_ALIGN`
    pub fn as_uninit_slice<T>(&mut self) -> &mut [MaybeUninit<T>] {
        assert!(mem::size_of::<T>() != 0, "zero-sized element type");
        assert!(
            mem::align_of::<T>() <= PAGE_ALIGN,
            "element alignment exceeds page alignment"
        );

        let slots = self.mmap.len() / mem::size_of::<T>();

        // SAFETY: mmap page-aligned, `slots * size_of::<T>() <= len`, dan
        // MaybeUninit<T> valid untuk bit pattern apa pun. Borrow &mut self
        // menjamin tidak ada view lain yang hidup bersamaan.
        unsafe { std::slice::from_raw_parts_mut(self.mmap.as_mut_ptr().cast(), slots) }
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("atomq_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_anonymous_region_slots() {
        let mut region = MmapRegion::anonymous(4096).unwrap();
        assert_eq!(region.len(), 4096);
        assert_eq!(region.as_ptr() as usize % PAGE_ALIGN, 0);

        let slots = region.as_uninit_slice::<u64>();
        assert_eq!(slots.len(), 512);

        slots[0].write(42);
        slots[511].write(7);
        // SAFETY: baru saja ditulis
        unsafe {
            assert_eq!(slots[0].assume_init(), 42);
            assert_eq!(slots[511].assume_init(), 7);
        }
    }

    #[test]
    fn test_leftover_bytes_ignored() {
        let mut region = MmapRegion::anonymous(100).unwrap();
        assert_eq!(region.as_uninit_slice::<[u8; 24]>().len(), 4);
    }

    #[test]
    fn test_file_backed_region() {
        let path = temp_path("region.dat");

        {
            let mut region = MmapRegion::open(&path, 8192).unwrap();
            assert_eq!(region.len(), 8192);
            assert_eq!(region.as_uninit_slice::<u32>().len(), 2048);
        }

        assert_eq!(fs::metadata(&path).unwrap().len(), 8192);
        fs::remove_file(&path).ok();
    }
}
