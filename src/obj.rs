//! Raw object model over a [`Buffer`].
//!
//! An object consists of a pointer region (`psize` words) followed by a
//! scalar region (`ssize` bytes). Its offset is the byte offset of the first
//! pointer slot, or of the scalar region if there are no pointers.
//!
//! An object may be:
//! - a single message (preceded by an object header),
//! - one element of an array (the whole run shares one array header),
//! - a string or byte array (compact 4-byte header, SS=1, PS=0).
//!
//! Repeated scalars are arrays of one-field objects, repeated strings are
//! arrays of one-pointer objects each pointing to a string.
//!
//! Reading never goes past the end of the byte slice: a bad header or a
//! region that does not fit yields an empty [`ObjArray`].

use log::trace;

use crate::buffer::{Buffer, BufferId, PendingRef};
use crate::error::{Error, Result};
use crate::header::{read_word, Header, BLEN_MASK, HDR_MASK, MAX_PSIZE, MAX_SSIZE, WORD};

/// Ephemeral, non-owning handle to an object inside some byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Obj {
    offset: u32,
    ssize: u16,
    psize: u16,
}

/// A run of `len` consecutive objects of equal shape.
///
/// `len == 0` means "absent": null pointer or malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjArray {
    first: Obj,
    len: u32,
}

/// Decoded content of a pointer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    Null,
    /// Word distance from the slot to the target header.
    Resolved(u32),
    /// Target lives in a side buffer and is fixed up by a merge.
    Pending { buffer: BufferId, offset: u32 },
}

impl Obj {
    /// Handle that refers to nothing.
    pub const NULL: Obj = Obj {
        offset: 0,
        ssize: 0,
        psize: 0,
    };

    pub(crate) fn new(offset: u32, ssize: u16, psize: u16) -> Self {
        Self {
            offset,
            ssize,
            psize,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    pub fn ssize(&self) -> usize {
        self.ssize as usize
    }

    pub fn psize(&self) -> usize {
        self.psize as usize
    }

    /// Allocation size of a single element.
    pub fn size(&self) -> usize {
        self.psize as usize * WORD + self.ssize as usize
    }

    /// The `n`-th object after this one in the same array.
    ///
    /// The caller must stay within the array it got this object from.
    /// Offsets beyond the 32-bit range are `LengthOverflow`.
    pub fn advance(&self, n: usize) -> Result<Obj> {
        let offset = self
            .size()
            .checked_mul(n)
            .and_then(|d| d.checked_add(self.offset as usize))
            .and_then(|o| u32::try_from(o).ok())
            .ok_or(Error::LengthOverflow(n as u64))?;
        Ok(Obj { offset, ..*self })
    }

    /// Equivalent to `advance(1)`.
    pub fn next(&self) -> Result<Obj> {
        self.advance(1)
    }

    /// Loads the object (or array) whose header starts at `offset`.
    ///
    /// Validates the marker bit and that the declared region fits into
    /// `bytes`. On failure returns an empty array.
    pub fn get(bytes: &[u8], offset: usize) -> ObjArray {
        Self::try_get(bytes, offset).unwrap_or_default()
    }

    fn try_get(bytes: &[u8], offset: usize) -> Option<ObjArray> {
        let hdr = Header::decode(read_word(bytes, offset)?)?;
        let mut pos = offset + WORD;
        let len = match hdr {
            Header::Bytes { len } => len,
            Header::Array { .. } => {
                let len = read_word(bytes, pos)?;
                pos += WORD;
                len
            }
            Header::Object { .. } => 1,
        };
        let (ssize, psize) = hdr.sizes();
        let first = Obj::new(u32::try_from(pos).ok()?, ssize, psize);
        let end = pos as u64 + u64::from(len) * first.size() as u64;
        if end > bytes.len() as u64 {
            return None;
        }
        Some(ObjArray { first, len })
    }

    /// Byte offset of the header of this object.
    ///
    /// The object must be a single message or the first element of an array.
    pub fn header_offset(&self, bytes: &[u8]) -> Option<usize> {
        let at = self.offset as usize;
        let before = read_word(bytes, at.checked_sub(WORD)?)?;
        if before & HDR_MASK != 0 {
            Some(at - WORD)
        } else {
            at.checked_sub(2 * WORD)
        }
    }

    /// Returns the bytes of a scalar field, or `None` if `byte_offset + size`
    /// overruns the scalar region.
    pub fn scalar<'a>(&self, bytes: &'a [u8], byte_offset: usize, size: usize) -> Option<&'a [u8]> {
        if byte_offset + size > self.ssize as usize {
            return None;
        }
        let at = self.offset as usize + self.psize as usize * WORD + byte_offset;
        bytes.get(at..at + size)
    }

    /// Absolute offset of pointer slot `slot`, if it exists.
    fn slot_offset(&self, slot: usize) -> Option<usize> {
        (slot < self.psize as usize).then(|| self.offset as usize + slot * WORD)
    }

    /// Follows pointer slot `slot`. Null or malformed pointers yield an empty array.
    pub fn ptr(&self, bytes: &[u8], slot: usize) -> ObjArray {
        let Some(at) = self.slot_offset(slot) else {
            return ObjArray::default();
        };
        match read_word(bytes, at) {
            Some(0) | None => ObjArray::default(),
            Some(rel) => Obj::get(bytes, at + rel as usize * WORD),
        }
    }
}

macro_rules! scalar_getters {
    ($($name:ident: $ty:ty),* $(,)?) => {
        impl Obj {
            $(
                /// Reads a little-endian scalar; 0 if outside the scalar region.
                pub fn $name(&self, bytes: &[u8], byte_offset: usize) -> $ty {
                    const N: usize = core::mem::size_of::<$ty>();
                    match self.scalar(bytes, byte_offset, N) {
                        Some(b) => {
                            let mut raw = [0u8; N];
                            raw.copy_from_slice(b);
                            <$ty>::from_le_bytes(raw)
                        }
                        None => <$ty>::default(),
                    }
                }
            )*
        }
    };
}

scalar_getters! {
    get_u8: u8, get_u16: u16, get_u32: u32, get_u64: u64,
    get_i8: i8, get_i16: i16, get_i32: i32, get_i64: i64,
    get_f32: f32, get_f64: f64,
}

impl Obj {
    pub fn get_bool(&self, bytes: &[u8], byte_offset: usize) -> bool {
        self.get_u8(bytes, byte_offset) != 0
    }
}

impl ObjArray {
    pub(crate) fn new(first: Obj, len: u32) -> Self {
        Self { first, len }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The first element, `None` when absent.
    pub fn first(&self) -> Option<Obj> {
        (self.len > 0).then_some(self.first)
    }

    pub fn get(&self, i: usize) -> Option<Obj> {
        if i < self.len as usize {
            self.first.advance(i).ok()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Obj> + '_ {
        let first = self.first;
        (0..self.len as usize).map_while(move |i| first.advance(i).ok())
    }

    /// String content without the trailing NUL; empty when absent.
    pub fn str_bytes<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        if self.len == 0 {
            return &[];
        }
        let at = self.first.offset as usize;
        bytes.get(at..at + self.len as usize - 1).unwrap_or(&[])
    }

    /// String content as UTF-8, `None` if not valid UTF-8.
    pub fn as_str<'a>(&self, bytes: &'a [u8]) -> Option<&'a str> {
        std::str::from_utf8(self.str_bytes(bytes)).ok()
    }
}

macro_rules! scalar_setters {
    ($($name:ident: $ty:ty),* $(,)?) => {
        impl Buffer {
            $(
                /// Writes a little-endian scalar into `obj`'s scalar region.
                pub fn $name(&mut self, obj: Obj, byte_offset: usize, v: $ty) -> Result<()> {
                    self.set_scalar(obj, byte_offset, &v.to_le_bytes())
                }
            )*
        }
    };
}

scalar_setters! {
    set_u8: u8, set_u16: u16, set_u32: u32, set_u64: u64,
    set_i8: i8, set_i16: i16, set_i32: i32, set_i64: i64,
    set_f32: f32, set_f64: f64,
}

impl Buffer {
    /// Allocates a single object with header. Returns the handle.
    pub fn alloc_obj(&mut self, ssize: usize, psize: usize) -> Result<Obj> {
        let (ss, ps) = check_sizes(ssize, psize)?;
        let obj = Obj::new(0, ss, ps);
        let at = self.alloc_aligned(WORD + obj.size(), WORD)?;
        self.write_at(at, &Header::Object { ssize: ss, psize: ps }.encode().to_le_bytes())?;
        Ok(Obj::new(to_u32(at + WORD)?, ss, ps))
    }

    /// Allocates `len` contiguous objects with an array header.
    ///
    /// Byte arrays (SS=1, PS=0) get the 4-byte compact header, all others
    /// an 8-byte header with a separate length word.
    pub fn alloc_arr(&mut self, ssize: usize, psize: usize, len: usize) -> Result<Obj> {
        let (ss, ps) = check_sizes(ssize, psize)?;
        let byte_arr = ss == 1 && ps == 0;
        let len32 = checked_len(len, byte_arr)?;
        let elem = Obj::new(0, ss, ps).size();
        let body = elem.checked_mul(len).ok_or(Error::OutOfMemory)?;
        let hdr = if byte_arr {
            Header::Bytes { len: len32 }
        } else {
            Header::Array { ssize: ss, psize: ps }
        };
        let at = self.alloc_aligned(hdr.byte_len() + body, WORD)?;
        self.write_at(at, &hdr.encode().to_le_bytes())?;
        if !byte_arr {
            self.write_at(at + WORD, &len32.to_le_bytes())?;
        }
        Ok(Obj::new(to_u32(at + hdr.byte_len())?, ss, ps))
    }

    /// Allocates a string: `s` followed by a NUL that is part of the stored length.
    pub fn alloc_str(&mut self, s: &[u8]) -> Result<ObjArray> {
        let obj = self.alloc_arr(1, 0, s.len() + 1)?;
        self.write_at(obj.offset(), s)?;
        Ok(ObjArray::new(obj, to_u32(s.len() + 1)?))
    }

    /// Writes raw bytes into the scalar region of `obj`.
    pub fn set_scalar(&mut self, obj: Obj, byte_offset: usize, v: &[u8]) -> Result<()> {
        if byte_offset + v.len() > obj.ssize() {
            return Err(Error::ScalarOutOfRange {
                offset: byte_offset,
                size: v.len(),
                ssize: obj.ssize(),
            });
        }
        self.write_at(obj.offset() + obj.psize() * WORD + byte_offset, v)
    }

    pub fn set_bool(&mut self, obj: Obj, byte_offset: usize, v: bool) -> Result<()> {
        self.set_u8(obj, byte_offset, u8::from(v))
    }

    fn slot(&self, obj: Obj, slot: usize) -> Result<u32> {
        let at = obj.slot_offset(slot).ok_or(Error::NoSuchSlot {
            slot,
            psize: obj.psize(),
        })?;
        to_u32(at)
    }

    /// Points slot `slot` of `obj` at `target`, both inside this buffer.
    ///
    /// Pointers are forward-only: the target must follow the slot.
    pub fn set_ptr(&mut self, obj: Obj, slot: usize, target: Obj) -> Result<()> {
        let at = self.slot(obj, slot)?;
        let hdr = target
            .header_offset(self.as_bytes())
            .ok_or(Error::BackwardPointer)?;
        if hdr <= at as usize {
            return Err(Error::BackwardPointer);
        }
        debug_assert_eq!((hdr - at as usize) % WORD, 0);
        let rel = to_u32((hdr - at as usize) / WORD)?;
        self.take_pending(at);
        self.write_at(at as usize, &rel.to_le_bytes())
    }

    /// Points slot `slot` of `obj` at `target` living in the side buffer `side`.
    ///
    /// The pointer stays pending until [`merge_external`](Self::merge_external)
    /// appends `side` and rewrites it into an in-buffer distance.
    pub fn set_external_ptr(
        &mut self,
        obj: Obj,
        slot: usize,
        side: &Buffer,
        target: Obj,
    ) -> Result<()> {
        let at = self.slot(obj, slot)?;
        let hdr = target
            .header_offset(side.as_bytes())
            .ok_or(Error::ForeignPointer)?;
        let header_offset = to_u32(hdr)?;
        self.write_at(at as usize, &0u32.to_le_bytes())?;
        self.set_pending(
            at,
            PendingRef {
                buffer: side.id(),
                header_offset,
            },
        );
        Ok(())
    }

    /// Resets slot `slot` of `obj` to null.
    pub fn clear_ptr(&mut self, obj: Obj, slot: usize) -> Result<()> {
        let at = self.slot(obj, slot)?;
        self.take_pending(at);
        self.write_at(at as usize, &0u32.to_le_bytes())
    }

    /// Reports the current content of a pointer slot, including pending ones.
    pub fn pointer(&self, obj: Obj, slot: usize) -> Result<Pointer> {
        let at = self.slot(obj, slot)?;
        if let Some(p) = self.pending(at) {
            return Ok(Pointer::Pending {
                buffer: p.buffer,
                offset: p.header_offset,
            });
        }
        Ok(match read_word(self.as_bytes(), at as usize) {
            Some(0) | None => Pointer::Null,
            Some(rel) => Pointer::Resolved(rel),
        })
    }

    /// Follows slot `slot` of `obj` inside this buffer.
    pub fn get_ptr(&self, obj: Obj, slot: usize) -> ObjArray {
        obj.ptr(self.as_bytes(), slot)
    }

    /// Rewrites the length of the array starting at `arr`.
    ///
    /// Only legal when the array, at its new length, ends exactly at the
    /// buffer tail. This is how arrays of unknown cardinality are built:
    /// allocate length 1, append elements at the tail, resize once counted.
    pub fn resize_arr(&mut self, arr: Obj, len: usize) -> Result<()> {
        let end = arr.offset() as u64 + arr.size() as u64 * len as u64;
        if end != self.len() as u64 {
            return Err(Error::NotTailArray);
        }
        let hdr_at = arr.header_offset(self.as_bytes()).ok_or(Error::NotTailArray)?;
        let word = read_word(self.as_bytes(), hdr_at).ok_or(Error::NotTailArray)?;
        match Header::decode(word) {
            Some(Header::Bytes { .. }) => {
                let len32 = checked_len(len, true)?;
                self.write_at(hdr_at, &Header::Bytes { len: len32 }.encode().to_le_bytes())
            }
            Some(Header::Array { .. }) => {
                let len32 = checked_len(len, false)?;
                self.write_at(hdr_at + WORD, &len32.to_le_bytes())
            }
            _ => Err(Error::NotTailArray),
        }
    }

    /// Appends `side` to this buffer and resolves the pending pointers of
    /// the `len` elements starting at `arr`.
    pub fn merge_external(&mut self, arr: Obj, len: usize, side: &Buffer) -> Result<()> {
        debug_assert!(!side.has_pending(), "side buffer has unresolved pointers");
        let base = if side.is_empty() {
            self.len()
        } else {
            let base = self.alloc_aligned(side.len(), WORD)?;
            self.write_at(base, side.as_bytes())?;
            base
        };
        let mut fixed = 0usize;
        for i in 0..len {
            let elem = arr.advance(i)?;
            for slot in 0..elem.psize() {
                let at = to_u32(elem.offset() + slot * WORD)?;
                let Some(p) = self.take_pending(at) else {
                    continue;
                };
                if p.buffer != side.id() {
                    return Err(Error::ForeignPointer);
                }
                let target = base + p.header_offset as usize;
                let rel = to_u32((target - at as usize) / WORD)?;
                self.write_at(at as usize, &rel.to_le_bytes())?;
                fixed += 1;
            }
        }
        trace!(
            "merged {} side bytes at {base}, fixed {fixed} pointers in {len} elements",
            side.len()
        );
        Ok(())
    }
}

/// Buffer offsets and lengths are stored as 32-bit words.
fn to_u32(v: usize) -> Result<u32> {
    u32::try_from(v).map_err(|_| Error::LengthOverflow(v as u64))
}

fn check_sizes(ssize: usize, psize: usize) -> Result<(u16, u16)> {
    if ssize > MAX_SSIZE || psize > MAX_PSIZE {
        return Err(Error::LengthOverflow(ssize.max(psize) as u64));
    }
    Ok((ssize as u16, psize as u16))
}

fn checked_len(len: usize, byte_arr: bool) -> Result<u32> {
    let max = if byte_arr { BLEN_MASK } else { !HDR_MASK };
    match u32::try_from(len) {
        Ok(l) if l <= max => Ok(l),
        _ => Err(Error::LengthOverflow(len as u64)),
    }
}
