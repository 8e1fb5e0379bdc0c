//! Profile sample storage
//!
//! [`AmpStorage`] chooses where profile samples live: the process heap or a
//! shared [`SwapArena`]. [`AmpBuffer`] is the resulting buffer; callers see a
//! plain `[f32]` either way.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use psrstore_core::Result;
use tracing::warn;

use crate::swap::{SwapArena, SwapBuffer};

/// Where profile samples are allocated
#[derive(Clone, Default)]
pub enum AmpStorage {
    /// Plain `Vec<f32>` on the heap
    #[default]
    Heap,
    /// Blocks of a shared swap arena
    Swap(Arc<SwapArena>),
}

impl AmpStorage {
    /// Allocate a zero-filled buffer of `len` samples
    pub fn zeroed(&self, len: usize) -> Result<AmpBuffer> {
        match self {
            AmpStorage::Heap => Ok(AmpBuffer::Heap(vec![0.0; len])),
            AmpStorage::Swap(arena) => Ok(AmpBuffer::Swap(arena.alloc_f32(len)?)),
        }
    }

    /// Allocate a buffer holding a copy of `samples`
    pub fn from_slice(&self, samples: &[f32]) -> Result<AmpBuffer> {
        match self {
            AmpStorage::Heap => Ok(AmpBuffer::Heap(samples.to_vec())),
            AmpStorage::Swap(arena) => {
                let mut buffer = arena.alloc_f32(samples.len())?;
                buffer.copy_from_slice(samples);
                Ok(AmpBuffer::Swap(buffer))
            }
        }
    }

    /// True for swap-backed storage
    pub fn is_swap(&self) -> bool {
        matches!(self, AmpStorage::Swap(_))
    }
}

impl fmt::Debug for AmpStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmpStorage::Heap => write!(f, "Heap"),
            AmpStorage::Swap(arena) => write!(f, "Swap({:?})", arena.stats()),
        }
    }
}

/// A buffer of profile samples
pub enum AmpBuffer {
    /// Heap-backed samples
    Heap(Vec<f32>),
    /// Swap-backed samples
    Swap(SwapBuffer),
}

impl AmpBuffer {
    /// Storage policy this buffer was allocated under
    pub fn storage(&self) -> AmpStorage {
        match self {
            AmpBuffer::Heap(_) => AmpStorage::Heap,
            AmpBuffer::Swap(buffer) => AmpStorage::Swap(Arc::clone(buffer.arena())),
        }
    }

    /// Resize to `len` samples, keeping the common prefix and zero-filling
    ///
    /// Swap buffers are reallocated from the same arena.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        match self {
            AmpBuffer::Heap(samples) => {
                samples.resize(len, 0.0);
                Ok(())
            }
            AmpBuffer::Swap(buffer) => {
                if buffer.len() == len {
                    return Ok(());
                }
                let mut resized = buffer.arena().alloc_f32(len)?;
                let keep = len.min(buffer.len());
                resized[..keep].copy_from_slice(&buffer[..keep]);
                *buffer = resized;
                Ok(())
            }
        }
    }
}

impl Deref for AmpBuffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        match self {
            AmpBuffer::Heap(samples) => samples,
            AmpBuffer::Swap(buffer) => buffer,
        }
    }
}

impl DerefMut for AmpBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        match self {
            AmpBuffer::Heap(samples) => samples,
            AmpBuffer::Swap(buffer) => buffer,
        }
    }
}

impl Clone for AmpBuffer {
    fn clone(&self) -> Self {
        match self {
            AmpBuffer::Heap(samples) => AmpBuffer::Heap(samples.clone()),
            AmpBuffer::Swap(buffer) => match buffer.try_clone() {
                Ok(copy) => AmpBuffer::Swap(copy),
                Err(e) => {
                    warn!(target: "psrstore::swap", error = %e, "Swap clone failed, copying to heap");
                    AmpBuffer::Heap(buffer.to_vec())
                }
            },
        }
    }
}

impl PartialEq for AmpBuffer {
    fn eq(&self, other: &Self) -> bool {
        self[..] == other[..]
    }
}

impl fmt::Debug for AmpBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            AmpBuffer::Heap(_) => "Heap",
            AmpBuffer::Swap(_) => "Swap",
        };
        f.debug_struct("AmpBuffer")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap() -> AmpStorage {
        AmpStorage::Swap(Arc::new(SwapArena::new().unwrap()))
    }

    #[test]
    fn test_heap_and_swap_compare_by_content() {
        let heap = AmpStorage::Heap.from_slice(&[1.0, 2.0]).unwrap();
        let swapped = swap().from_slice(&[1.0, 2.0]).unwrap();
        assert_eq!(heap, swapped);
        assert!(matches!(swapped, AmpBuffer::Swap(_)));
    }

    #[test]
    fn test_resize_keeps_prefix() {
        for storage in [AmpStorage::Heap, swap()] {
            let mut buffer = storage.from_slice(&[1.0, 2.0, 3.0]).unwrap();
            buffer.resize(5).unwrap();
            assert_eq!(&buffer[..], &[1.0, 2.0, 3.0, 0.0, 0.0]);
            buffer.resize(2).unwrap();
            assert_eq!(&buffer[..], &[1.0, 2.0]);
            assert_eq!(buffer.storage().is_swap(), storage.is_swap());
        }
    }

    #[test]
    fn test_clone_is_independent() {
        let storage = swap();
        let mut original = storage.from_slice(&[4.0; 8]).unwrap();
        let copy = original.clone();
        original[0] = -1.0;
        assert_eq!(copy[0], 4.0);
        if let AmpStorage::Swap(arena) = storage {
            assert_eq!(arena.stats().allocated_blocks, 2);
        }
    }
}
