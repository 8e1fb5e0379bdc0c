//! Paged swap allocator
//!
//! A [`SwapArena`] services allocations from a single unlinked temporary
//! file mapped into memory, so large transient sample buffers live in the
//! page cache instead of the process heap.
//!
//! # Layout
//!
//! Blocks are addressed by byte offset into the backing file. Two
//! offset-ordered maps track them:
//!
//! - `allocated`: offset → size of every live block
//! - `free`: offset → size of every available block, always coalesced with
//!   its free neighbours
//!
//! Allocation is first-fit with splitting. When nothing fits, the file is
//! doubled (minimum one page) until the trailing free space can hold the
//! request, extended with a seek to the new last byte plus a single-byte
//! write, and mapped again as a whole. The previous mapping stays alive for
//! as long as a [`SwapBuffer`] still points into it, so growth never moves
//! an address that has already been handed out. The file never shrinks.
//!
//! # Thread Safety
//!
//! `allocate`, `deallocate` and growth run under one mutex. Buffers are
//! disjoint regions and may be used from any thread.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

use memmap2::MmapMut;
use parking_lot::Mutex;
use psrstore_core::{Error, Result};
use tracing::{debug, warn};

/// Block alignment in bytes
pub const BLOCK_ALIGN: usize = 16;

/// OS page size, falling back to 4 KiB if it cannot be queried
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// Smallest `page * 2^k` that is at least `bytes`
pub fn mapped_size_for(bytes: usize, page: usize) -> usize {
    let mut size = page;
    while size < bytes {
        size *= 2;
    }
    size
}

fn round_up(size: usize) -> Option<usize> {
    let size = size.max(1);
    size.checked_add(BLOCK_ALIGN - 1)
        .map(|s| s & !(BLOCK_ALIGN - 1))
}

/// One mapping of the backing file.
struct Mapping {
    base: *mut u8,
    len: usize,
    _map: MmapMut,
}

// SAFETY: the mapping is shared file memory; the raw base pointer is only
// dereferenced through SwapBuffers, which own disjoint byte ranges.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

struct ArenaInner {
    file: File,
    total: usize,
    mapping: Option<Arc<Mapping>>,
    free: BTreeMap<usize, usize>,
    allocated: BTreeMap<usize, usize>,
    growths: u64,
}

/// Snapshot of arena bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Size of the backing file (and of the newest mapping)
    pub mapped_bytes: usize,
    /// Bytes held by live blocks
    pub allocated_bytes: usize,
    /// Number of live blocks
    pub allocated_blocks: usize,
    /// Bytes in the free map
    pub free_bytes: usize,
    /// Entries in the free map
    pub free_blocks: usize,
    /// Number of times the backing file was grown
    pub growths: u64,
}

/// File-backed first-fit allocator
pub struct SwapArena {
    inner: Mutex<ArenaInner>,
    page: usize,
}

impl SwapArena {
    /// Create an arena backed by an unlinked file in the system temp dir
    pub fn new() -> Result<Self> {
        let file = tempfile::tempfile()
            .map_err(|e| Error::io("create swap file", std::env::temp_dir(), e))?;
        Ok(Self::with_file(file))
    }

    /// Create an arena backed by an unlinked file in `dir`
    pub fn in_dir(dir: &Path) -> Result<Self> {
        let file = tempfile::tempfile_in(dir).map_err(|e| Error::io("create swap file", dir, e))?;
        Ok(Self::with_file(file))
    }

    fn with_file(file: File) -> Self {
        SwapArena {
            inner: Mutex::new(ArenaInner {
                file,
                total: 0,
                mapping: None,
                free: BTreeMap::new(),
                allocated: BTreeMap::new(),
                growths: 0,
            }),
            page: page_size(),
        }
    }

    /// Page size used as the minimum growth step
    pub fn page(&self) -> usize {
        self.page
    }

    /// Reserve `size` bytes, returning the block offset
    ///
    /// Sizes are rounded up to [`BLOCK_ALIGN`]; a zero-byte request still
    /// reserves one aligned unit.
    pub fn allocate(&self, size: usize) -> Result<usize> {
        let mut inner = self.inner.lock();
        self.allocate_locked(&mut inner, size)
    }

    /// Return the block starting at `offset` to the free map
    pub fn deallocate(&self, offset: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::deallocate_locked(&mut inner, offset)
    }

    /// Allocate a zero-filled buffer of `len` samples
    pub fn alloc_f32(self: &Arc<Self>, len: usize) -> Result<SwapBuffer> {
        let bytes = len
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| Error::Allocation(format!("{} samples overflow", len)))?;
        let (offset, mapping) = {
            let mut inner = self.inner.lock();
            let offset = self.allocate_locked(&mut inner, bytes)?;
            let mapping = inner
                .mapping
                .clone()
                .ok_or_else(|| Error::Allocation("arena has no mapping".to_string()))?;
            (offset, mapping)
        };
        debug_assert!(offset + bytes <= mapping.len);
        let mut buffer = SwapBuffer {
            arena: Arc::clone(self),
            mapping,
            offset,
            len,
        };
        buffer.fill(0.0);
        Ok(buffer)
    }

    /// Current bookkeeping counters
    pub fn stats(&self) -> ArenaStats {
        let inner = self.inner.lock();
        ArenaStats {
            mapped_bytes: inner.total,
            allocated_bytes: inner.allocated.values().sum(),
            allocated_blocks: inner.allocated.len(),
            free_bytes: inner.free.values().sum(),
            free_blocks: inner.free.len(),
            growths: inner.growths,
        }
    }

    fn allocate_locked(&self, inner: &mut ArenaInner, size: usize) -> Result<usize> {
        let rounded = round_up(size)
            .ok_or_else(|| Error::Allocation(format!("request of {} bytes overflows", size)))?;

        let fit = Self::first_fit(inner, rounded);
        let (offset, len) = match fit {
            Some(block) => block,
            None => {
                self.grow(inner, rounded)?;
                Self::first_fit(inner, rounded).ok_or_else(|| {
                    Error::Allocation(format!("no block of {} bytes after growth", rounded))
                })?
            }
        };

        inner.free.remove(&offset);
        if len > rounded {
            inner.free.insert(offset + rounded, len - rounded);
        }
        inner.allocated.insert(offset, rounded);
        Ok(offset)
    }

    fn first_fit(inner: &ArenaInner, size: usize) -> Option<(usize, usize)> {
        inner
            .free
            .iter()
            .find(|(_, &len)| len >= size)
            .map(|(&offset, &len)| (offset, len))
    }

    fn deallocate_locked(inner: &mut ArenaInner, offset: usize) -> Result<()> {
        let mut len = inner.allocated.remove(&offset).ok_or_else(|| {
            Error::invalid_param(format!("offset {} is not an allocated block", offset))
        })?;
        let mut start = offset;

        if let Some(next) = inner.free.remove(&(start + len)) {
            len += next;
        }
        let previous = inner
            .free
            .range(..start)
            .next_back()
            .map(|(&o, &l)| (o, l));
        if let Some((prev_offset, prev_len)) = previous {
            if prev_offset + prev_len == start {
                inner.free.remove(&prev_offset);
                start = prev_offset;
                len += prev_len;
            }
        }

        inner.free.insert(start, len);
        Ok(())
    }

    fn grow(&self, inner: &mut ArenaInner, needed: usize) -> Result<()> {
        let old_total = inner.total;
        let trailing = inner
            .free
            .iter()
            .next_back()
            .filter(|(&o, &l)| o + l == old_total)
            .map(|(_, &l)| l)
            .unwrap_or(0);

        let mut new_total = old_total;
        loop {
            new_total = if new_total == 0 {
                self.page
            } else {
                new_total
                    .checked_mul(2)
                    .ok_or_else(|| Error::Allocation("swap file size overflow".to_string()))?
            };
            if new_total - old_total + trailing >= needed {
                break;
            }
        }

        let swap_path = Path::new("<swap>");
        inner
            .file
            .seek(SeekFrom::Start(new_total as u64 - 1))
            .map_err(|e| Error::io("seek", swap_path, e))?;
        inner
            .file
            .write_all(&[0])
            .map_err(|e| Error::io("extend", swap_path, e))?;

        // SAFETY: the file is private to this arena (unlinked on creation)
        // and is never truncated while mapped.
        let mut map =
            unsafe { MmapMut::map_mut(&inner.file) }.map_err(|e| Error::io("mmap", swap_path, e))?;
        let base = map.as_mut_ptr();
        inner.mapping = Some(Arc::new(Mapping {
            base,
            len: new_total,
            _map: map,
        }));

        inner.total = new_total;
        inner.growths += 1;
        let added = new_total - old_total;
        match inner.free.iter().next_back().map(|(&o, &l)| (o, l)) {
            Some((offset, len)) if offset + len == old_total => {
                inner.free.insert(offset, len + added);
            }
            _ => {
                inner.free.insert(old_total, added);
            }
        }

        debug!(
            target: "psrstore::swap",
            old_bytes = old_total,
            new_bytes = new_total,
            needed,
            "Grew swap arena"
        );
        Ok(())
    }
}

impl fmt::Debug for SwapArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapArena")
            .field("page", &self.page)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A sample buffer carved out of a [`SwapArena`]
///
/// Dereferences to `[f32]` and returns its block to the arena on drop.
pub struct SwapBuffer {
    arena: Arc<SwapArena>,
    mapping: Arc<Mapping>,
    offset: usize,
    len: usize,
}

impl SwapBuffer {
    /// Byte offset of this buffer within the backing file
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Arena this buffer was allocated from
    pub fn arena(&self) -> &Arc<SwapArena> {
        &self.arena
    }

    /// Copy into a fresh block of the same arena
    pub fn try_clone(&self) -> Result<SwapBuffer> {
        let mut copy = self.arena.alloc_f32(self.len)?;
        copy.copy_from_slice(self);
        Ok(copy)
    }
}

impl Deref for SwapBuffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        // SAFETY: [offset, offset + len*4) lies inside `mapping`, is
        // 16-byte aligned, and is owned exclusively by this buffer until
        // drop. The mapping is kept alive by the Arc.
        unsafe {
            std::slice::from_raw_parts(self.mapping.base.add(self.offset) as *const f32, self.len)
        }
    }
}

impl DerefMut for SwapBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        // SAFETY: as in `deref`; `&mut self` guarantees unique access.
        unsafe {
            std::slice::from_raw_parts_mut(self.mapping.base.add(self.offset) as *mut f32, self.len)
        }
    }
}

impl Drop for SwapBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.arena.deallocate(self.offset) {
            warn!(target: "psrstore::swap", offset = self.offset, error = %e, "Failed to release swap block");
        }
    }
}

impl fmt::Debug for SwapBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapBuffer")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_allocation_maps_one_page() {
        let arena = SwapArena::new().unwrap();
        let offset = arena.allocate(100).unwrap();
        assert_eq!(offset, 0);

        let stats = arena.stats();
        assert_eq!(stats.mapped_bytes, arena.page());
        assert_eq!(stats.allocated_bytes, 112);
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.growths, 1);
    }

    #[test]
    fn test_growth_doubles_until_request_fits() {
        let arena = SwapArena::new().unwrap();
        let page = arena.page();
        arena.allocate(page + 1).unwrap();
        assert_eq!(arena.stats().mapped_bytes, 2 * page);

        // Trailing free space is reused before doubling again
        arena.allocate(page - 64).unwrap();
        assert_eq!(arena.stats().mapped_bytes, 2 * page);

        arena.allocate(3 * page).unwrap();
        assert_eq!(arena.stats().mapped_bytes, 8 * page);
    }

    #[test]
    fn test_first_fit_reuses_lowest_hole() {
        let arena = SwapArena::new().unwrap();
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(64).unwrap();
        let _c = arena.allocate(64).unwrap();
        arena.deallocate(a).unwrap();
        arena.deallocate(b).unwrap();

        // a and b coalesced into one 128-byte hole at offset 0
        assert_eq!(arena.allocate(96).unwrap(), a);
        assert_eq!(arena.allocate(32).unwrap(), 96);
    }

    #[test]
    fn test_coalesce_forward_and_backward() {
        let arena = SwapArena::new().unwrap();
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(64).unwrap();
        let c = arena.allocate(64).unwrap();

        arena.deallocate(b).unwrap();
        // hole at b plus trailing space after c
        assert_eq!(arena.stats().free_blocks, 2);

        arena.deallocate(a).unwrap();
        assert_eq!(arena.stats().free_blocks, 2);

        arena.deallocate(c).unwrap();
        let stats = arena.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_bytes, stats.mapped_bytes);
    }

    #[test]
    fn test_deallocate_unknown_offset_fails() {
        let arena = SwapArena::new().unwrap();
        let a = arena.allocate(64).unwrap();
        assert!(matches!(arena.deallocate(a + 16), Err(Error::InvalidParam(_))));
        arena.deallocate(a).unwrap();
        assert!(arena.deallocate(a).is_err());
    }

    #[test]
    fn test_buffer_survives_growth() {
        let arena = Arc::new(SwapArena::new().unwrap());
        let mut first = arena.alloc_f32(16).unwrap();
        for (i, v) in first.iter_mut().enumerate() {
            *v = i as f32;
        }

        let big = arena.alloc_f32(arena.page()).unwrap();
        assert!(arena.stats().growths >= 2);
        assert!(big.iter().all(|&v| v == 0.0));

        let expected: Vec<f32> = (0..16).map(|i| i as f32).collect();
        assert_eq!(&first[..], &expected[..]);
    }

    #[test]
    fn test_buffer_drop_returns_block() {
        let arena = Arc::new(SwapArena::new().unwrap());
        {
            let _a = arena.alloc_f32(10).unwrap();
            let _b = arena.alloc_f32(10).unwrap();
            assert_eq!(arena.stats().allocated_blocks, 2);
        }
        let stats = arena.stats();
        assert_eq!(stats.allocated_blocks, 0);
        assert_eq!(stats.free_blocks, 1);
    }

    #[test]
    fn test_try_clone_copies_into_new_block() {
        let arena = Arc::new(SwapArena::new().unwrap());
        let mut original = arena.alloc_f32(4).unwrap();
        original.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);

        let mut copy = original.try_clone().unwrap();
        assert_ne!(copy.offset(), original.offset());
        copy[0] = 9.0;
        assert_eq!(original[0], 1.0);
        assert_eq!(&copy[1..], &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mapped_size_for() {
        assert_eq!(mapped_size_for(1, 4096), 4096);
        assert_eq!(mapped_size_for(4096, 4096), 4096);
        assert_eq!(mapped_size_for(4097, 4096), 8192);
        assert_eq!(mapped_size_for(20_000, 4096), 32_768);
    }
}
