//! Error konstruksi queue dari raw memory

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Alamat memory tidak memenuhi alignment tipe elemen
    #[error("memory at {addr:#x} is not aligned to {align} bytes")]
    Misaligned { addr: usize, align: usize },

    #[error("zero-sized element types cannot be queued")]
    ZeroSizedElement,

    /// Capacity melebihi lebar field tail di writer state
    #[error("capacity {capacity} exceeds the maximum of {max} slots")]
    CapacityTooLarge { capacity: usize, max: u64 },
}
