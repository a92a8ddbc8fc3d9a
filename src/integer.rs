//! Integer literal conversion.
//!
//! Literals are `-?` followed by `0x` hex digits, `0` octal digits, or
//! decimal digits. Conversion stops at the first byte that is not a digit
//! of the detected base. Values saturate on overflow; callers truncate to
//! the target field width.

/// Parsed literal: sign, magnitude and whether the magnitude overflowed u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Literal {
    negative: bool,
    magnitude: u64,
    overflow: bool,
}

fn scan(text: &[u8]) -> Literal {
    let (negative, mut s) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, text),
    };
    let radix = match s {
        [b'0', b'x' | b'X', rest @ ..] if rest.first().is_some_and(|c| c.is_ascii_hexdigit()) => {
            s = rest;
            16
        }
        [b'0', ..] => 8,
        _ => 10,
    };
    let mut magnitude = 0u64;
    let mut overflow = false;
    for &c in s {
        let Some(d) = (c as char).to_digit(radix) else {
            break;
        };
        match magnitude
            .checked_mul(u64::from(radix))
            .and_then(|m| m.checked_add(u64::from(d)))
        {
            Some(m) => magnitude = m,
            None => overflow = true,
        }
    }
    Literal {
        negative,
        magnitude,
        overflow,
    }
}

/// Unsigned conversion: negative literals wrap, overflow saturates to `u64::MAX`.
pub fn parse_u64(text: &[u8]) -> u64 {
    let lit = scan(text);
    if lit.overflow {
        u64::MAX
    } else if lit.negative {
        lit.magnitude.wrapping_neg()
    } else {
        lit.magnitude
    }
}

/// Signed conversion saturating to `i64::MIN`/`i64::MAX`.
pub fn parse_i64(text: &[u8]) -> i64 {
    let lit = scan(text);
    const MIN_MAGNITUDE: u64 = 1 << 63;
    if lit.negative {
        if lit.overflow || lit.magnitude > MIN_MAGNITUDE {
            i64::MIN
        } else {
            (lit.magnitude as i64).wrapping_neg()
        }
    } else if lit.overflow || lit.magnitude > i64::MAX as u64 {
        i64::MAX
    } else {
        lit.magnitude as i64
    }
}
