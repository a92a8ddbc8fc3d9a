//! Floating point text conversion.
//!
//! Output follows C's `%.Ng`: `N` significant digits, fixed notation when
//! the decimal exponent is in `-4..N`, scientific otherwise, trailing zeros
//! removed. Fields print with the smallest `N` whose text reads back as the
//! identical value, at most 9 digits for `float` and 17 for `double`.
//! Non-finite values print as `nan`, `inf` and `-inf`.

/// Digits that always suffice to read a `float` back exactly.
pub const F32_DIGITS: usize = 9;
/// Digits that always suffice to read a `double` back exactly.
pub const F64_DIGITS: usize = 17;

/// Shortest `%g` text of `v` that [`parse_f32`] maps back to `v`.
pub fn format_f32(v: f32) -> String {
    shortest(f64::from(v), F32_DIGITS, |s| parse_f32(s.as_bytes()) == Some(v))
}

/// Shortest `%g` text of `v` that [`parse_f64`] maps back to `v`.
pub fn format_f64(v: f64) -> String {
    shortest(v, F64_DIGITS, |s| parse_f64(s.as_bytes()) == Some(v))
}

fn shortest(v: f64, max_digits: usize, exact: impl Fn(&str) -> bool) -> String {
    if !v.is_finite() {
        return format_g(v, 1);
    }
    (1..max_digits)
        .map(|p| format_g(v, p))
        .find(|s| exact(s))
        .unwrap_or_else(|| format_g(v, max_digits))
}

/// Formats `v` like C's `printf("%.*g", precision, v)`.
pub fn format_g(v: f64, precision: usize) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    let sign = if v.is_sign_negative() { "-" } else { "" };
    if v.is_infinite() {
        return format!("{sign}inf");
    }
    if v == 0.0 {
        return format!("{sign}0");
    }
    let p = precision.max(1);
    let sci = format!("{:.*e}", p - 1, v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if exp < -4 || exp >= p as i32 {
        let mantissa = strip_zeros(mantissa);
        let esign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{esign}{:02}", exp.unsigned_abs())
    } else {
        let fixed = format!("{:.*}", (p as i32 - 1 - exp) as usize, v);
        strip_zeros(&fixed).to_string()
    }
}

fn strip_zeros(s: &str) -> &str {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.')
}

/// Value of the words `nan`, `inf` and `infinity`, in any letter case.
pub fn special_value(word: &[u8]) -> Option<f64> {
    if word.eq_ignore_ascii_case(b"nan") {
        Some(f64::NAN)
    } else if word.eq_ignore_ascii_case(b"inf") || word.eq_ignore_ascii_case(b"infinity") {
        Some(f64::INFINITY)
    } else {
        None
    }
}

/// Parses a float or integer literal. Hex integers use their
/// integer value, everything else is read as decimal.
pub fn parse_f64(text: &[u8]) -> Option<f64> {
    if is_radix_int(text) {
        return Some(crate::integer::parse_i64(text) as f64);
    }
    std::str::from_utf8(text).ok()?.parse().ok()
}

/// Like [`parse_f64`] but rounds directly to single precision.
pub fn parse_f32(text: &[u8]) -> Option<f32> {
    if is_radix_int(text) {
        return Some(crate::integer::parse_i64(text) as f32);
    }
    std::str::from_utf8(text).ok()?.parse().ok()
}

fn is_radix_int(text: &[u8]) -> bool {
    let digits = text.strip_prefix(b"-").unwrap_or(text);
    matches!(digits, [b'0', b'x' | b'X', ..])
}
