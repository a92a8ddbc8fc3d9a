//! Text → message.
//!
//! ```text
//! msg   = { field }
//! field = ident ":" value [ ";" ] | ident "{" msg "}"
//! value = int | float | string { string } | ident
//! ```
//!
//! Repeated fields are written as consecutive occurrences of the same name.
//! Their elements are appended at the tail of the current buffer, so while
//! an array is open anything its elements point to is built in a side
//! buffer and merged behind the array once the last element is parsed.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::float::{parse_f32, parse_f64, special_value};
use crate::integer::{parse_i64, parse_u64};
use crate::lexer::{Lexer, Token};
use crate::obj::{Obj, Pointer};
use crate::reflect::{alloc_msg, TypeKind};
use crate::schema::{FieldDef, MsgDef};
use crate::string::unescape;

use super::{depth_limit, ParseOptions};

/// Index of the caller's buffer; side buffers follow from 1.
const OUT: usize = 0;

/// Parses `input` as a message of type `mdef` into `out` and returns the
/// root object.
///
/// On error `out` is truncated back to its previous length.
pub fn parse(
    opts: &ParseOptions,
    out: &mut Buffer,
    input: &[u8],
    mdef: &MsgDef<'_>,
) -> Result<Obj> {
    let mark = out.len();
    let mut p = Parser {
        lex: Lexer::new(&opts.filename, input),
        tok: Token::Eof,
        out,
        sides: Vec::new(),
        depth: 0,
        max_depth: depth_limit(opts.max_depth),
    };
    let result = p.root(mdef);
    if result.is_err() {
        p.out.truncate(mark);
    }
    result
}

struct Parser<'a, 'o> {
    lex: Lexer<'a>,
    tok: Token,
    out: &'o mut Buffer,
    /// Stack of side buffers for the currently open arrays.
    sides: Vec<Buffer>,
    depth: usize,
    max_depth: usize,
}

impl Parser<'_, '_> {
    fn advance(&mut self) -> Result<()> {
        self.tok = self.lex.next_token()?;
        Ok(())
    }

    fn expect(&self, tok: Token) -> Result<()> {
        if self.tok == tok {
            Ok(())
        } else {
            Err(self.lex.syntax(tok, self.tok))
        }
    }

    /// Checks for `c` and moves past it.
    fn eat(&mut self, c: u8) -> Result<()> {
        self.expect(Token::Punct(c))?;
        self.advance()
    }

    fn skip_semicolon(&mut self) -> Result<()> {
        if self.tok == Token::Punct(b';') {
            self.advance()?;
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(Error::DepthLimitExceeded(self.max_depth));
        }
        Ok(())
    }

    fn buf(&mut self, i: usize) -> &mut Buffer {
        match i {
            OUT => &mut *self.out,
            i => &mut self.sides[i - 1],
        }
    }

    /// Mutable `dst` and shared `src`; the two must differ.
    fn pair(&mut self, dst: usize, src: usize) -> (&mut Buffer, &Buffer) {
        debug_assert_ne!(dst, src);
        if dst == OUT {
            (&mut *self.out, &self.sides[src - 1])
        } else if src == OUT {
            (&mut self.sides[dst - 1], &*self.out)
        } else if dst < src {
            let (lo, hi) = self.sides.split_at_mut(src - 1);
            (&mut lo[dst - 1], &hi[0])
        } else {
            let (lo, hi) = self.sides.split_at_mut(dst - 1);
            (&mut hi[0], &lo[src - 1])
        }
    }

    /// Stores a pointer from `obj` (in buffer `obj_buf`) to `target` (in
    /// buffer `target_buf`).
    fn link(
        &mut self,
        obj: Obj,
        obj_buf: usize,
        slot: usize,
        target_buf: usize,
        target: Obj,
    ) -> Result<()> {
        if obj_buf == target_buf {
            self.buf(obj_buf).set_ptr(obj, slot, target)
        } else {
            let (dst, src) = self.pair(obj_buf, target_buf);
            dst.set_external_ptr(obj, slot, src, target)
        }
    }

    fn root(&mut self, mdef: &MsgDef<'_>) -> Result<Obj> {
        self.advance()?;
        let obj = self.message(OUT, mdef)?;
        self.expect(Token::Eof)?;
        Ok(obj)
    }

    /// Allocates a message in buffer `cur` and parses its fields.
    fn message(&mut self, cur: usize, mdef: &MsgDef<'_>) -> Result<Obj> {
        self.enter()?;
        let obj = alloc_msg(self.buf(cur), mdef)?;
        self.fields(obj, cur, cur, mdef)?;
        self.depth -= 1;
        Ok(obj)
    }

    /// Parses fields of `obj`, which lives in `obj_buf`; new objects go to `cur`.
    fn fields(&mut self, obj: Obj, obj_buf: usize, cur: usize, mdef: &MsgDef<'_>) -> Result<()> {
        while self.tok == Token::Ident {
            let text = self.lex.text();
            let Some(fdef) = mdef.lookup_field(text) else {
                return Err(Error::UnknownField {
                    file: self.lex.filename().to_string(),
                    line: self.lex.line(),
                    name: String::from_utf8_lossy(text).into_owned(),
                });
            };
            let Some(ft) = fdef.field_type() else {
                return Err(self
                    .lex
                    .error(format!("cannot determine type for field '{}'", fdef.name())));
            };
            self.advance()?;
            if ft.repeated {
                self.repeated(obj, obj_buf, cur, &fdef, &ft.kind)?;
            } else {
                self.single(obj, obj_buf, cur, &fdef, &ft.kind)?;
            }
        }
        Ok(())
    }

    fn single(
        &mut self,
        obj: Obj,
        obj_buf: usize,
        cur: usize,
        fdef: &FieldDef<'_>,
        kind: &TypeKind<'_>,
    ) -> Result<()> {
        let offset = fdef.offset();
        match kind {
            TypeKind::Message(sub) => {
                self.eat(b'{')?;
                let child = self.message(cur, sub)?;
                self.eat(b'}')?;
                self.link(obj, obj_buf, offset, cur, child)?;
            }
            TypeKind::String => {
                self.eat(b':')?;
                let s = self.string_literal()?;
                if !s.is_empty() {
                    let target = self.alloc_str(cur, &s)?;
                    self.link(obj, obj_buf, offset, cur, target)?;
                }
            }
            scalar => {
                self.eat(b':')?;
                let (v, size) = self.scalar_value(scalar)?;
                self.buf(obj_buf).set_scalar(obj, offset, &v[..size])?;
            }
        }
        self.skip_semicolon()
    }

    fn repeated(
        &mut self,
        obj: Obj,
        obj_buf: usize,
        cur: usize,
        fdef: &FieldDef<'_>,
        kind: &TypeKind<'_>,
    ) -> Result<()> {
        let offset = fdef.offset();
        if self.buf(obj_buf).pointer(obj, offset)? != Pointer::Null {
            return Err(Error::ScatteredField {
                file: self.lex.filename().to_string(),
                line: self.lex.line(),
                name: fdef.name().to_string(),
            });
        }
        let (ssize, psize) = kind.element_sizes();
        let first = self.buf(cur).alloc_arr(ssize, psize, 1)?;
        let elem_cur = if psize > 0 {
            self.sides.push(Buffer::new());
            self.sides.len()
        } else {
            cur
        };
        let count = self.elements(first, cur, elem_cur, fdef.name(), kind)?;
        self.buf(cur).resize_arr(first, count)?;
        if psize > 0 {
            if let Some(side) = self.sides.pop() {
                self.buf(cur).merge_external(first, count, &side)?;
            }
        }
        self.link(obj, obj_buf, offset, cur, first)
    }

    /// Parses consecutive occurrences of field `name`, growing the array
    /// at `first` (in `arr_buf`) one element at a time. Returns the count.
    fn elements(
        &mut self,
        first: Obj,
        arr_buf: usize,
        cur: usize,
        name: &str,
        kind: &TypeKind<'_>,
    ) -> Result<usize> {
        let mut elem = first;
        let mut count = 0;
        loop {
            count += 1;
            match kind {
                TypeKind::Message(sub) => {
                    self.eat(b'{')?;
                    self.enter()?;
                    self.fields(elem, arr_buf, cur, sub)?;
                    self.depth -= 1;
                    self.eat(b'}')?;
                }
                TypeKind::String => {
                    self.eat(b':')?;
                    let s = self.string_literal()?;
                    if !s.is_empty() {
                        let target = self.alloc_str(cur, &s)?;
                        self.link(elem, arr_buf, 0, cur, target)?;
                    }
                }
                scalar => {
                    self.eat(b':')?;
                    let (v, size) = self.scalar_value(scalar)?;
                    self.buf(arr_buf).set_scalar(elem, 0, &v[..size])?;
                }
            }
            self.skip_semicolon()?;
            if self.tok != Token::Ident || self.lex.text() != name.as_bytes() {
                return Ok(count);
            }
            self.advance()?;
            // nothing else may have been allocated behind the array
            let at = self.buf(arr_buf).alloc(elem.size())?;
            debug_assert_eq!(at, elem.offset() + elem.size());
            elem = elem.next()?;
        }
    }

    fn alloc_str(&mut self, cur: usize, s: &[u8]) -> Result<Obj> {
        self.buf(cur).alloc_str(s)?.first().ok_or(Error::OutOfMemory)
    }

    /// One or more adjacent string literals, unescaped and concatenated.
    fn string_literal(&mut self) -> Result<Vec<u8>> {
        self.expect(Token::Str)?;
        let mut s = Vec::new();
        while self.tok == Token::Str {
            let text = self.lex.text();
            unescape(&text[1..text.len() - 1], &mut s);
            self.advance()?;
        }
        Ok(s)
    }

    /// Parses the current token as a scalar of `kind`. Returns its
    /// little-endian bytes and byte size; wider values are truncated.
    fn scalar_value(&mut self, kind: &TypeKind<'_>) -> Result<([u8; 8], usize)> {
        let text = self.lex.text();
        let v: u64 = match kind {
            TypeKind::Bool => match (self.tok, text) {
                (Token::Ident, b"true") => 1,
                (Token::Ident, b"false") => 0,
                _ => return Err(self.lex.error("missing 'true' or 'false'")),
            },
            TypeKind::Uint(_) => {
                self.expect(Token::Int)?;
                parse_u64(text)
            }
            TypeKind::Sint(_) => {
                self.expect(Token::Int)?;
                parse_i64(text) as u64
            }
            TypeKind::Float(size) => self.float_value(*size == 4)?,
            TypeKind::Enum(edef) => {
                if self.tok == Token::Int {
                    parse_i64(text) as u64
                } else {
                    self.expect(Token::Ident)?;
                    let value = edef.value_of(text).ok_or_else(|| {
                        self.lex
                            .error(format!("bad enum value '{}'", String::from_utf8_lossy(text)))
                    })?;
                    value as u64
                }
            }
            TypeKind::Message(_) | TypeKind::String => {
                return Err(self.lex.error("internal error: bad scalar type"));
            }
        };
        let size = kind.scalar_size().unwrap_or(0);
        self.advance()?;
        Ok((v.to_le_bytes(), size))
    }

    /// Bit pattern of a float literal, an integer, or one of `nan`, `inf`
    /// and `-inf` in any letter case. Leaves the last token current.
    fn float_value(&mut self, single: bool) -> Result<u64> {
        let bits = |v: f64| if single { u64::from((v as f32).to_bits()) } else { v.to_bits() };
        if self.tok == Token::Punct(b'-') {
            self.advance()?;
            return match special_value(self.lex.text()) {
                Some(v) if self.tok == Token::Ident => Ok(bits(-v)),
                _ => Err(self.lex.syntax(Token::Float, self.tok)),
            };
        }
        let text = self.lex.text();
        match self.tok {
            Token::Ident => special_value(text)
                .map(bits)
                .ok_or_else(|| self.lex.syntax(Token::Float, self.tok)),
            Token::Int | Token::Float => {
                let bad = || {
                    let text = String::from_utf8_lossy(text);
                    self.lex.error(format!("bad float value '{text}'"))
                };
                if single {
                    Ok(u64::from(parse_f32(text).ok_or_else(bad)?.to_bits()))
                } else {
                    Ok(parse_f64(text).ok_or_else(bad)?.to_bits())
                }
            }
            _ => Err(self.lex.syntax(Token::Float, self.tok)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileSession;
    use crate::text::{print_to_vec, PrintOptions};

    const SRC: &str = "package t; enum Color { RED, GREEN = 7 }
        message Leaf { Color c; string s; }
        message Tree { uint16 n; Leaf leaf; Tree[] kids; string[] tags; }";

    fn round_trip(input: &str) -> Result<String> {
        let set = CompileSession::isolated().compile_str(SRC, "t.pbs").unwrap();
        let tree = set.lookup_message("Tree").unwrap();
        let mut buf = Buffer::new();
        let obj = parse(&ParseOptions::default(), &mut buf, input.as_bytes(), &tree)?;
        assert!(!buf.has_pending());
        let opts = PrintOptions::default().with_indent(-1);
        let out = print_to_vec(&opts, buf.as_bytes(), obj, &tree)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn nested_and_repeated() {
        let out = round_trip(
            "n: 3; leaf { c: GREEN s: \"a\" \"b\" } \
             kids { n: 1 tags: \"x\" tags: \"y\" } kids { leaf { s: \"deep\" } } tags: \"top\"",
        )
        .unwrap();
        assert_eq!(
            out,
            "n: 3 leaf { c: GREEN s: \"ab\" } \
             kids { n: 1 tags: \"x\" tags: \"y\" } \
             kids { n: 0 leaf { c: RED s: \"deep\" } } tags: \"top\" "
        );
    }

    #[test]
    fn enum_accepts_integers() {
        let out = round_trip("leaf { c: 7 } kids { leaf { c: -2 } }").unwrap();
        assert_eq!(out, "n: 0 leaf { c: GREEN s: \"\" } kids { n: 0 leaf { c: -2 s: \"\" } } ");
    }

    #[test]
    fn empty_string_stays_null() {
        let set = CompileSession::isolated().compile_str(SRC, "t.pbs").unwrap();
        let leaf = set.lookup_message("Leaf").unwrap();
        let mut buf = Buffer::new();
        let obj = parse(&ParseOptions::default(), &mut buf, b"s: \"\"", &leaf).unwrap();
        assert_eq!(buf.pointer(obj, 0).unwrap(), Pointer::Null);
    }

    #[test]
    fn failure_restores_buffer() {
        let set = CompileSession::isolated().compile_str(SRC, "t.pbs").unwrap();
        let tree = set.lookup_message("Tree").unwrap();
        let mut buf = Buffer::new();
        buf.extend_from_slice(b"keep").unwrap();
        let err = parse(
            &ParseOptions::default().with_filename("in.txt"),
            &mut buf,
            b"kids { tags: \"a\" }\nbogus: 1",
            &tree,
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::UnknownField {
                file: "in.txt".into(),
                line: 2,
                name: "bogus".into()
            }
        );
        assert_eq!(buf.as_bytes(), b"keep");
        assert!(!buf.has_pending());
    }

    #[test]
    fn scattered_repeated_field() {
        let err = round_trip("tags: \"a\" n: 1 tags: \"b\"").unwrap_err();
        assert!(matches!(err, Error::ScatteredField { name, .. } if name == "tags"));
    }

    #[test]
    fn depth_counts_root() {
        let set = CompileSession::isolated().compile_str(SRC, "t.pbs").unwrap();
        let tree = set.lookup_message("Tree").unwrap();
        let mut buf = Buffer::new();
        let input = b"kids { kids { } }";
        let opts = ParseOptions::default().with_max_depth(2);
        assert_eq!(
            parse(&opts, &mut buf, input, &tree).unwrap_err(),
            Error::DepthLimitExceeded(2)
        );
        let opts = ParseOptions::default().with_max_depth(3);
        assert!(parse(&opts, &mut buf, input, &tree).is_ok());
    }
}
