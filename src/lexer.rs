//! Tokenizer shared by the schema language and the message text format.
//!
//! Token set: identifiers, integers (decimal, octal, hex, optional leading
//! `-`), floats (decimal with `.` and/or exponent), double-quoted strings
//! with backslash escapes, and single punctuation bytes. `//`, `/* */` and
//! `#`-to-end-of-line comments are skipped.

use core::fmt;

use memchr::{memchr, memchr3, memmem};

use crate::error::{Error, Result};

/// Kind of the current token. Its text is available via [`Lexer::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Eof,
    Ident,
    Int,
    Float,
    Str,
    /// Any other single byte (`{`, `;`, `=`, ...).
    Punct(u8),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => f.write_str("<end of input>"),
            Self::Ident => f.write_str("identifier"),
            Self::Int => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("string"),
            Self::Punct(c) if is_print(*c) => write!(f, "'{}'", *c as char),
            Self::Punct(c) => write!(f, "'\\{c:03o}'"),
        }
    }
}

#[inline]
fn is_print(c: u8) -> bool {
    (0x20..0x7f).contains(&c)
}

#[inline]
fn is_odigit(c: u8) -> bool {
    (b'0'..=b'7').contains(&c)
}

/// Byte-oriented lexer over a complete input.
pub struct Lexer<'a> {
    filename: &'a str,
    input: &'a [u8],
    pos: usize,
    start: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(filename: &'a str, input: &'a [u8]) -> Self {
        Self {
            filename,
            input,
            pos: 0,
            start: 0,
            line: 1,
        }
    }

    pub fn filename(&self) -> &'a str {
        self.filename
    }

    /// Current line number, starting at 1.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Raw text of the current token. Strings include their quotes.
    pub fn text(&self) -> &'a [u8] {
        &self.input[self.start..self.pos]
    }

    /// Builds a positional error at the current line.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::syntax(self.filename, self.line, message)
    }

    /// "missing X, got Y" diagnostic.
    pub fn syntax(&self, expected: Token, seen: Token) -> Error {
        let seen = if seen == Token::Ident {
            let t = self.text();
            if t.len() <= 13 {
                format!("'{}'", String::from_utf8_lossy(t))
            } else {
                format!("'{}...'", String::from_utf8_lossy(&t[..10]))
            }
        } else {
            seen.to_string()
        };
        self.error(format!("missing {expected}, got {seen}"))
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, n: usize) -> Option<u8> {
        self.input.get(self.pos + n).copied()
    }

    fn skip_spaces(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_ascii_whitespace() && c != 0x0b {
                break;
            }
            if c == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
    }

    /// Skips to (not past) the next newline.
    fn skip_line(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += memchr(b'\n', rest).unwrap_or(rest.len());
    }

    /// Skips past the closing `*/` of a block comment.
    fn skip_block(&mut self) -> Result<()> {
        let rest = &self.input[self.pos..];
        let Some(end) = memmem::find(rest, b"*/") else {
            self.line += memchr::memchr_iter(b'\n', rest).count() as u32;
            self.pos = self.input.len();
            return Err(self.error("comment is not closed at end of input"));
        };
        self.line += memchr::memchr_iter(b'\n', &rest[..end]).count() as u32;
        self.pos += end + 2;
        Ok(())
    }

    /// Advances to the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        loop {
            self.skip_spaces();
            self.start = self.pos;
            let Some(c) = self.peek() else {
                return Ok(Token::Eof);
            };
            match c {
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    self.skip_block()?;
                }
                b'/' if self.peek_at(1) == Some(b'/') => self.skip_line(),
                b'#' => self.skip_line(),
                b'"' => return self.scan_str(),
                b'-' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                    self.pos += 1;
                    return self.scan_num();
                }
                b'0'..=b'9' => return self.scan_num(),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    self.pos += 1;
                    while self
                        .peek()
                        .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
                    {
                        self.pos += 1;
                    }
                    return Ok(Token::Ident);
                }
                _ => {
                    self.pos += 1;
                    return Ok(Token::Punct(c));
                }
            }
        }
    }

    fn skip_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
    }

    /// Integer or float starting at a digit (any leading `-` already consumed).
    fn scan_num(&mut self) -> Result<Token> {
        let mut token = Token::Int;
        let mut decimal = true;
        if self.peek() == Some(b'0') {
            self.pos += 1;
            match self.peek() {
                Some(b'x' | b'X') => {
                    self.pos += 1;
                    self.skip_while(|c| c.is_ascii_hexdigit());
                    decimal = false;
                }
                Some(c) if is_odigit(c) => {
                    self.skip_while(is_odigit);
                    decimal = false;
                }
                _ => {}
            }
        } else {
            self.skip_while(|c| c.is_ascii_digit());
        }
        if decimal {
            if self.peek() == Some(b'.') {
                token = Token::Float;
                self.pos += 1;
                self.skip_while(|c| c.is_ascii_digit());
            }
            if matches!(self.peek(), Some(b'e' | b'E')) {
                token = Token::Float;
                self.pos += 1;
                if matches!(self.peek(), Some(b'+' | b'-')) {
                    self.pos += 1;
                }
                self.skip_while(|c| c.is_ascii_digit());
            }
        }
        if self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.pos += 1;
            return Err(self.error(format!(
                "malformed number: {}",
                String::from_utf8_lossy(self.text())
            )));
        }
        Ok(token)
    }

    /// Double-quoted string. Escapes are kept verbatim, see [`crate::string::unescape`].
    fn scan_str(&mut self) -> Result<Token> {
        self.pos += 1;
        loop {
            let rest = &self.input[self.pos..];
            let Some(i) = memchr3(b'"', b'\\', b'\n', rest) else {
                self.pos = self.input.len();
                return Err(self.error("string is not closed at end of input"));
            };
            self.pos += i + 1;
            match rest[i] {
                b'"' => return Ok(Token::Str),
                b'\\' => {
                    if self.pos >= self.input.len() {
                        return Err(self.error("string is not closed at end of input"));
                    }
                    if self.input[self.pos] == b'\n' {
                        self.line += 1;
                    }
                    self.pos += 1;
                }
                _ => return Err(self.error("newline within string literal")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<(Token, String)> {
        let mut l = Lexer::new("t", src.as_bytes());
        let mut out = Vec::new();
        loop {
            let t = l.next_token().unwrap();
            if t == Token::Eof {
                return out;
            }
            out.push((t, String::from_utf8_lossy(l.text()).into_owned()));
        }
    }

    #[test]
    fn basic_tokens() {
        let toks = tokens("message Foo { uint8[] x; }");
        let kinds: Vec<Token> = toks.iter().map(|t| t.0).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Ident,
                Token::Ident,
                Token::Punct(b'{'),
                Token::Ident,
                Token::Punct(b'['),
                Token::Punct(b']'),
                Token::Ident,
                Token::Punct(b';'),
                Token::Punct(b'}'),
            ]
        );
        assert_eq!(toks[3].1, "uint8");
    }

    #[test]
    fn numbers() {
        let toks = tokens("0 -12 0x1F 0777 1.5 -3e+16 2.");
        let kinds: Vec<Token> = toks.iter().map(|t| t.0).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Int,
                Token::Int,
                Token::Int,
                Token::Int,
                Token::Float,
                Token::Float,
                Token::Float
            ]
        );
        assert_eq!(toks[1].1, "-12");
        assert_eq!(toks[5].1, "-3e+16");
    }

    #[test]
    fn minus_without_digit_is_punct() {
        let toks = tokens("- x");
        assert_eq!(toks[0].0, Token::Punct(b'-'));
    }

    #[test]
    fn malformed_number() {
        let mut l = Lexer::new("in", b"c:1d:2");
        assert_eq!(l.next_token().unwrap(), Token::Ident);
        assert_eq!(l.next_token().unwrap(), Token::Punct(b':'));
        let err = l.next_token().unwrap_err();
        assert_eq!(err.to_string(), "in:1: malformed number: 1d");
    }

    #[test]
    fn comments_are_skipped_and_lines_counted() {
        let src = "/** long \n comment **/\na # hash\n// slash\nb";
        let mut l = Lexer::new("f", src.as_bytes());
        assert_eq!(l.next_token().unwrap(), Token::Ident);
        assert_eq!(l.line(), 3);
        assert_eq!(l.next_token().unwrap(), Token::Ident);
        assert_eq!(l.text(), b"b");
        assert_eq!(l.line(), 5);
        assert_eq!(l.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn lone_slash_is_punct() {
        assert_eq!(tokens("a / b")[1].0, Token::Punct(b'/'));
    }

    #[test]
    fn strings_keep_escapes() {
        let toks = tokens(r#""a\"b" "c""#);
        assert_eq!(toks[0], (Token::Str, r#""a\"b""#.to_string()));
        assert_eq!(toks[1].1, "\"c\"");
    }

    #[test]
    fn unterminated_string() {
        let mut l = Lexer::new("x", b"m: \"bad string...");
        l.next_token().unwrap();
        l.next_token().unwrap();
        let err = l.next_token().unwrap_err();
        assert!(err.to_string().contains("not closed"), "{err}");
    }

    #[test]
    fn newline_in_string() {
        let mut l = Lexer::new("x", b"\"ab\ncd\"");
        let err = l.next_token().unwrap_err();
        assert!(err.to_string().contains("newline"), "{err}");
    }

    #[test]
    fn unterminated_comment() {
        let mut l = Lexer::new("x", b"m: /*bad comment...");
        l.next_token().unwrap();
        l.next_token().unwrap();
        assert!(l.next_token().is_err());
    }

    #[test]
    fn syntax_message() {
        let mut l = Lexer::new("s.pbs", b"averyveryverylongname");
        let t = l.next_token().unwrap();
        let err = l.syntax(Token::Punct(b';'), t);
        assert_eq!(err.to_string(), "s.pbs:1: missing ';', got 'averyveryv...'");

        let mut l = Lexer::new("s.pbs", b"foo");
        let t = l.next_token().unwrap();
        assert_eq!(
            l.syntax(Token::Str, t).to_string(),
            "s.pbs:1: missing string, got 'foo'"
        );
        assert_eq!(Token::Punct(1).to_string(), "'\\001'");
        assert_eq!(Token::Eof.to_string(), "<end of input>");
    }
}
