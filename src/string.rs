//! String literal escaping for the text formats.
//!
//! Strings are byte sequences; neither direction assumes UTF-8. Escapes
//! understood on input: `\a \b \f \n \r \t \v`, `\xHH` (exactly two hex
//! digits), `\o`, `\oo`, `\ooo` (octal), and `\c` for any other byte `c`.

use std::io::{self, Write};

use memchr::memchr;

/// Appends the unescaped form of `src` (the literal without its quotes) to `out`.
pub fn unescape(src: &[u8], out: &mut Vec<u8>) {
    let mut s = src;
    while !s.is_empty() {
        let Some(bs) = memchr(b'\\', s) else {
            out.extend_from_slice(s);
            return;
        };
        out.extend_from_slice(&s[..bs]);
        s = &s[bs + 1..];
        let Some(&c) = s.first() else {
            // lone trailing backslash
            out.push(b'\\');
            return;
        };
        if c == b'x' && s.len() >= 3 && s[1].is_ascii_hexdigit() && s[2].is_ascii_hexdigit() {
            out.push((hex_val(s[1]) << 4) | hex_val(s[2]));
            s = &s[3..];
            continue;
        }
        let n = s.iter().take(3).take_while(|c| (b'0'..=b'7').contains(*c)).count();
        if n > 0 {
            let v = s[..n].iter().fold(0u32, |v, d| v * 8 + u32::from(d - b'0'));
            out.push(v as u8);
            s = &s[n..];
            continue;
        }
        out.push(match c {
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            other => other,
        });
        s = &s[1..];
    }
}

#[inline]
fn hex_val(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => c - b'A' + 10,
    }
}

/// Writes `s` as a double-quoted literal.
///
/// With `loose` set, bytes >= 0x80 pass through unescaped. A non-zero
/// `wrap_column` closes and reopens the literal on a new line before a
/// character could run past that column.
pub fn write_escaped<W: Write + ?Sized>(
    w: &mut W,
    s: &[u8],
    loose: bool,
    wrap_column: usize,
) -> io::Result<()> {
    w.write_all(b"\"")?;
    let mut col = 0usize;
    for (i, &ch) in s.iter().enumerate() {
        if wrap_column > 0 && col + 6 > wrap_column {
            w.write_all(b"\"\n\"")?;
            col = 0;
        }
        let esc = match ch {
            0x07 => Some(b'a'),
            0x08 => Some(b'b'),
            0x0c => Some(b'f'),
            b'\n' => Some(b'n'),
            b'\r' => Some(b'r'),
            b'\t' => Some(b't'),
            0x0b => Some(b'v'),
            b'"' | b'\\' => Some(ch),
            _ => None,
        };
        if let Some(e) = esc {
            w.write_all(&[b'\\', e])?;
            col += 2;
        } else if (0x20..0x7f).contains(&ch) || (loose && ch >= 0x80) {
            w.write_all(&[ch])?;
            col += 1;
        } else {
            // pad to three digits when a digit follows, so it is not absorbed
            let next_is_digit = s.get(i + 1).is_some_and(|c| c.is_ascii_digit());
            let oct = if next_is_digit {
                format!("\\{ch:03o}")
            } else {
                format!("\\{ch:o}")
            };
            w.write_all(oct.as_bytes())?;
            col += oct.len();
        }
    }
    w.write_all(b"\"")
}
