//! Schema-less structural dump of a buffer.
//!
//! Walks the buffer header by header from offset 0 and prints every
//! object's header, its pointer slots with their absolute targets and a
//! hexdump of its scalar bytes. Useful for inspecting buffers whose
//! schema is unknown or damaged.

use std::io::Write;

use crate::error::{Error, Result};
use crate::header::{align_word, read_word, Header, HDR_MASK, WORD};

const LINE: usize = 16;

fn truncated(offset: usize) -> Error {
    Error::MalformedObject {
        offset,
        what: "truncated input",
    }
}

/// Writes the dump of `bytes` to `out`.
///
/// Stops with an error at the first word that is not a header or when an
/// object runs past the end of the input.
pub fn dump<W: Write + ?Sized>(out: &mut W, bytes: &[u8]) -> Result<()> {
    let mut pos = 0usize;
    while let Some(word) = read_word(bytes, pos) {
        write!(out, "*{pos:08x}: hdr={word:08x}")?;
        let hdr_at = pos;
        pos += WORD;
        let Some(hdr) = Header::decode(word) else {
            writeln!(out, " BAD")?;
            return Err(Error::MalformedObject {
                offset: hdr_at,
                what: "missing header marker",
            });
        };
        let (ssize, psize) = hdr.sizes();
        let len = match hdr {
            Header::Object { .. } => 1,
            Header::Array { .. } => {
                let len = read_word(bytes, pos).ok_or_else(|| truncated(pos))?;
                if len & HDR_MASK != 0 {
                    return Err(Error::MalformedObject {
                        offset: pos,
                        what: "array length has the header bit set",
                    });
                }
                pos += WORD;
                write!(out, " len: 0x{len:x}")?;
                len as usize
            }
            Header::Bytes { len } => {
                write!(out, " len: 0x{len:x}")?;
                len as usize
            }
        };
        writeln!(out, " p: 0x{psize:x}, s: 0x{ssize:x}")?;

        if let Header::Bytes { .. } = hdr {
            hexdump(out, bytes, pos, len)?;
            pos += len;
        } else {
            let elem = psize as u64 * WORD as u64 + u64::from(ssize);
            if elem * len as u64 > (bytes.len() - pos) as u64 {
                return Err(truncated(pos));
            }
            for _ in 0..len {
                for j in 0..psize {
                    let ptr = read_word(bytes, pos).ok_or_else(|| truncated(pos))?;
                    write!(out, " {pos:08x}: [{j}] -> ")?;
                    if ptr == 0 {
                        writeln!(out, "null")?;
                    } else {
                        let target = pos as u64 + u64::from(ptr) * WORD as u64;
                        writeln!(out, "{target:08x} [+{ptr}]")?;
                    }
                    pos += WORD;
                }
                hexdump(out, bytes, pos, ssize as usize)?;
                pos += ssize as usize;
            }
        }
        pos = align_word(pos);
    }
    Ok(())
}

/// Classic 16-bytes-per-line hexdump of `bytes[offset..offset + len]`.
fn hexdump<W: Write + ?Sized>(out: &mut W, bytes: &[u8], offset: usize, len: usize) -> Result<()> {
    let data = offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| truncated(offset))?;
    for (n, chunk) in data.chunks(LINE).enumerate() {
        write!(out, " {:08x}:", offset + n * LINE)?;
        for b in chunk {
            write!(out, " {b:02x}")?;
        }
        let ascii: String = chunk
            .iter()
            .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
            .collect();
        writeln!(out, "{:pad$}  {ascii}", "", pad = (LINE - chunk.len()) * 3)?;
    }
    Ok(())
}
