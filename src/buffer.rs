//! Append-only byte arena.
//!
//! A [`Buffer`] is the substrate every object is allocated into. Space is
//! only ever added at the tail; bytes below `len` are not moved by growth
//! because all addressing is by offset, never by native pointer.
//!
//! Buffers come in two modes: read-write (owns and reallocates its memory)
//! and read-only (foreign bytes that must not be mutated).

use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;

use crate::error::{Error, Result};
use crate::header::WORD;
use crate::FastHashMap;

/// Process-unique identity of a buffer, used to tag pending pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A pointer slot whose target lives in another (side) buffer.
///
/// Recorded while the target's final position is unknown and resolved by
/// [`Buffer::merge_external`](crate::obj).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingRef {
    pub(crate) buffer: BufferId,
    /// Byte offset of the target's header inside the side buffer.
    pub(crate) header_offset: u32,
}

enum Storage {
    /// `Vec::len()` is the capacity; everything beyond `Buffer::len` is zero.
    Writable(Vec<u8>),
    ReadOnly(Vec<u8>),
    #[cfg(feature = "mmap")]
    Mapped(memmap2::Mmap),
}

/// Growable byte arena holding encoded objects.
pub struct Buffer {
    storage: Storage,
    len: usize,
    id: BufferId,
    /// Slot byte offset -> pending target. Empty outside of incremental construction.
    pending: FastHashMap<u32, PendingRef>,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("writable", &self.is_writable())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Buffer {
    /// Creates an empty read-write buffer.
    pub fn new() -> Self {
        Self {
            storage: Storage::Writable(Vec::new()),
            len: 0,
            id: BufferId::next(),
            pending: FastHashMap::default(),
        }
    }

    /// Creates an empty read-write buffer with `cap` bytes preallocated.
    pub fn with_capacity(cap: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(cap.max(1))
            .map_err(|_| Error::OutOfMemory)?;
        data.resize(cap.max(1), 0);
        Ok(Self {
            storage: Storage::Writable(data),
            ..Self::new()
        })
    }

    /// Wraps foreign bytes as a read-only buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            len: bytes.len(),
            storage: Storage::ReadOnly(bytes),
            ..Self::new()
        }
    }

    /// Wraps a memory-mapped file as a read-only buffer.
    #[cfg(feature = "mmap")]
    pub fn from_mmap(map: memmap2::Mmap) -> Self {
        Self {
            len: map.len(),
            storage: Storage::Mapped(map),
            ..Self::new()
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Number of bytes in use.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes reserved; 0 for read-only buffers.
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Writable(v) => v.len(),
            _ => 0,
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.storage, Storage::Writable(_))
    }

    /// The used part of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Writable(v) | Storage::ReadOnly(v) => &v[..self.len],
            #[cfg(feature = "mmap")]
            Storage::Mapped(m) => &m[..self.len],
        }
    }

    /// Consumes the buffer and returns the used bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        let len = self.len;
        match self.storage {
            Storage::Writable(mut v) | Storage::ReadOnly(mut v) => {
                v.truncate(len);
                v
            }
            #[cfg(feature = "mmap")]
            Storage::Mapped(m) => m[..len].to_vec(),
        }
    }

    fn data_mut(&mut self) -> Result<&mut Vec<u8>> {
        match &mut self.storage {
            Storage::Writable(v) => Ok(v),
            _ => Err(Error::ReadOnlyBuffer),
        }
    }

    /// Grows the capacity by 1.5x steps until `newlen` fits.
    fn reserve_for(&mut self, newlen: usize) -> Result<()> {
        let data = self.data_mut()?;
        let mut newcap = data.len().max(WORD);
        while newcap < newlen {
            newcap = newcap.checked_add(newcap / 2).ok_or(Error::OutOfMemory)?;
        }
        if newcap > data.len() {
            let old = data.len();
            data.try_reserve_exact(newcap - old)
                .map_err(|_| Error::OutOfMemory)?;
            data.resize(newcap, 0);
            trace!("buffer grown from {old} to {newcap} bytes");
        }
        Ok(())
    }

    /// Allocates `size` zeroed bytes at the tail. Returns their offset.
    pub fn alloc(&mut self, size: usize) -> Result<usize> {
        let newlen = self.len.checked_add(size).ok_or(Error::OutOfMemory)?;
        if newlen > u32::MAX as usize {
            return Err(Error::OutOfMemory);
        }
        if newlen > self.capacity() || !self.is_writable() {
            self.reserve_for(newlen)?;
        }
        let offset = self.len;
        self.len = newlen;
        Ok(offset)
    }

    /// Allocates `size` bytes starting at a multiple of `align` (a power of two).
    ///
    /// Padding bytes are zero. Returns the aligned offset.
    pub fn alloc_aligned(&mut self, size: usize, align: usize) -> Result<usize> {
        debug_assert!(align.is_power_of_two());
        let pad = (align - (self.len & (align - 1))) & (align - 1);
        let offset = self.alloc(size + pad)?;
        Ok(offset + pad)
    }

    /// Appends `bytes` to the tail and returns their offset.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<usize> {
        let offset = self.alloc(bytes.len())?;
        self.data_mut()?[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(offset)
    }

    /// Appends a single byte.
    pub fn push(&mut self, byte: u8) -> Result<usize> {
        self.extend_from_slice(&[byte])
    }

    /// Shrinks the used length to `len`, discarding everything after it.
    ///
    /// Used to roll back a failed construction. Discarded bytes are zeroed
    /// so later allocations start from clean memory. On a read-only buffer
    /// only the visible length shrinks.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let old = self.len;
        if let Storage::Writable(v) = &mut self.storage {
            v[len..old].fill(0);
        }
        self.len = len;
        self.pending.retain(|&slot, _| (slot as usize) < len);
    }

    /// Releases all memory; the buffer becomes empty and writable.
    pub fn clear(&mut self) {
        self.storage = Storage::Writable(Vec::new());
        self.len = 0;
        self.pending.clear();
    }

    /// Overwrites `bytes.len()` bytes at `offset` inside the used region.
    pub(crate) fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let len = self.len;
        let data = self.data_mut()?;
        let end = offset.checked_add(bytes.len()).ok_or(Error::OutOfMemory)?;
        debug_assert!(end <= len, "write past buffer length");
        if end > len {
            return Err(Error::OutOfMemory);
        }
        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn set_pending(&mut self, slot: u32, target: PendingRef) {
        self.pending.insert(slot, target);
    }

    pub(crate) fn pending(&self, slot: u32) -> Option<PendingRef> {
        self.pending.get(&slot).copied()
    }

    pub(crate) fn take_pending(&mut self, slot: u32) -> Option<PendingRef> {
        self.pending.remove(&slot)
    }

    /// True while some pointer slot still refers into a side buffer.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
