//! Header word layout and little-endian word helpers.
//!
//! Every allocated object or array starts with a 32-bit header word:
//!
//! ```text
//!  31  30  29  28 ........... 14  13 ............ 0
//! [ M | B | A |      SS          |       PS        ]
//! ```
//!
//! - `M` validity marker, always 1.
//! - `B` compact byte array: bits 29..0 carry the length, SS=1 and PS=0 implied.
//! - `A` array of structs: a separate 32-bit length word follows the header.

/// Word size in bytes. Pointers count in words, all regions are word aligned.
pub const WORD: usize = 4;

pub const HDR_MASK: u32 = 0x8000_0000;
pub const BARR_MASK: u32 = 0x4000_0000;
pub const BLEN_MASK: u32 = 0x3fff_ffff;
pub const ARR_MASK: u32 = 0x2000_0000;
pub const SSIZE_LSB: u32 = 14;
pub const SSIZE_MSB: u32 = 28;
pub const PSIZE_LSB: u32 = 0;
pub const PSIZE_MSB: u32 = 13;

/// Largest scalar region a header can describe.
pub const MAX_SSIZE: usize = (1 << (SSIZE_MSB - SSIZE_LSB + 1)) - 1;
/// Largest pointer count a header can describe.
pub const MAX_PSIZE: usize = (1 << (PSIZE_MSB - PSIZE_LSB + 1)) - 1;

#[inline]
const fn bitfield(x: u32, msb: u32, lsb: u32) -> u32 {
    (x >> lsb) & ((2u32 << (msb - lsb)) - 1)
}

/// Rounds `size` up to a multiple of [`WORD`].
#[inline]
pub const fn align_word(size: usize) -> usize {
    (size + WORD - 1) & !(WORD - 1)
}

/// Decoded form of a header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// Single object.
    Object { ssize: u16, psize: u16 },
    /// Array of structs; the length lives in the following word.
    Array { ssize: u16, psize: u16 },
    /// Compact byte array with inline length.
    Bytes { len: u32 },
}

impl Header {
    /// Decodes a raw header word. Returns `None` without the marker bit.
    pub fn decode(word: u32) -> Option<Self> {
        if word & HDR_MASK == 0 {
            return None;
        }
        if word & BARR_MASK != 0 {
            return Some(Self::Bytes {
                len: word & BLEN_MASK,
            });
        }
        let ssize = bitfield(word, SSIZE_MSB, SSIZE_LSB) as u16;
        let psize = bitfield(word, PSIZE_MSB, PSIZE_LSB) as u16;
        if word & ARR_MASK != 0 {
            Some(Self::Array { ssize, psize })
        } else {
            Some(Self::Object { ssize, psize })
        }
    }

    /// Encodes into a raw header word.
    pub fn encode(self) -> u32 {
        match self {
            Self::Object { ssize, psize } => sizes_word(ssize, psize),
            Self::Array { ssize, psize } => sizes_word(ssize, psize) | ARR_MASK,
            Self::Bytes { len } => HDR_MASK | BARR_MASK | (len & BLEN_MASK),
        }
    }

    /// Number of header bytes including a separate length word.
    pub fn byte_len(self) -> usize {
        match self {
            Self::Array { .. } => 2 * WORD,
            _ => WORD,
        }
    }

    /// Returns `(ssize, psize)` of the elements described by this header.
    pub fn sizes(self) -> (u16, u16) {
        match self {
            Self::Object { ssize, psize } | Self::Array { ssize, psize } => (ssize, psize),
            Self::Bytes { .. } => (1, 0),
        }
    }
}

#[inline]
fn sizes_word(ssize: u16, psize: u16) -> u32 {
    HDR_MASK
        | ((u32::from(ssize) & MAX_SSIZE as u32) << SSIZE_LSB)
        | ((u32::from(psize) & MAX_PSIZE as u32) << PSIZE_LSB)
}

/// Reads a little-endian word at `offset`. Returns `None` past the end.
#[inline]
pub fn read_word(bytes: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(WORD)?;
    let b = bytes.get(offset..end)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
