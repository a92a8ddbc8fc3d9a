//! Message → text.

use std::io::{self, Write};

use crate::error::Result;
use crate::float::{format_f32, format_f64};
use crate::obj::Obj;
use crate::reflect::{FieldType, TypeKind};
use crate::schema::{EnumDef, FieldDef, MsgDef};
use crate::string::write_escaped;

use super::{depth_limit, PrintOptions};

/// Prints `obj`, a message of type `mdef` stored in `bytes`, to `w`.
///
/// Absent pointers and scalars outside an older, smaller scalar region
/// are tolerated; nothing in `bytes` is trusted.
pub fn print<W: Write + ?Sized>(
    opts: &PrintOptions,
    w: &mut W,
    bytes: &[u8],
    obj: Obj,
    mdef: &MsgDef<'_>,
) -> Result<()> {
    if opts.msg_type_header {
        writeln!(w, "# {}", mdef.full_name())?;
    }
    let mut p = Printer {
        w,
        bytes,
        indent: opts.indent.max(0) as usize,
        curr_indent: 0,
        nl: if opts.indent < 0 { b' ' } else { b'\n' },
        depth: 0,
        max_depth: depth_limit(opts.max_depth),
        loose: opts.loose_escape,
        wrap_column: opts.wrap_column,
    };
    p.message(obj, mdef)?;
    Ok(())
}

/// [`print`] into a fresh `Vec`.
pub fn print_to_vec(
    opts: &PrintOptions,
    bytes: &[u8],
    obj: Obj,
    mdef: &MsgDef<'_>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    print(opts, &mut out, bytes, obj, mdef)?;
    Ok(out)
}

struct Printer<'w, 'b, W: Write + ?Sized> {
    w: &'w mut W,
    bytes: &'b [u8],
    indent: usize,
    curr_indent: usize,
    nl: u8,
    depth: usize,
    max_depth: usize,
    loose: bool,
    wrap_column: usize,
}

impl<W: Write + ?Sized> Printer<'_, '_, W> {
    fn pad(&mut self) -> io::Result<()> {
        write!(self.w, "{:1$}", "", self.curr_indent)
    }

    fn newline(&mut self) -> io::Result<()> {
        self.w.write_all(&[self.nl])
    }

    fn message(&mut self, obj: Obj, mdef: &MsgDef<'_>) -> io::Result<()> {
        if self.depth >= self.max_depth {
            self.pad()?;
            write!(self.w, "/* print depth limit ({}) exceeded */", self.max_depth)?;
            return self.newline();
        }
        self.depth += 1;
        for fdef in mdef.fields() {
            self.field(obj, &fdef)?;
        }
        self.depth -= 1;
        Ok(())
    }

    fn field(&mut self, obj: Obj, fdef: &FieldDef<'_>) -> io::Result<()> {
        let name = fdef.name();
        let offset = fdef.offset();
        let Some(FieldType { kind, repeated }) = fdef.field_type() else {
            self.pad()?;
            write!(self.w, "{name}: /* bad field */")?;
            return self.newline();
        };
        match kind {
            TypeKind::Message(sub) => {
                for child in obj.ptr(self.bytes, offset).iter() {
                    self.pad()?;
                    write!(self.w, "{name} {{")?;
                    self.newline()?;
                    self.curr_indent += self.indent;
                    self.message(child, &sub)?;
                    self.curr_indent -= self.indent;
                    self.pad()?;
                    self.w.write_all(b"}")?;
                    self.newline()?;
                }
            }
            TypeKind::String if repeated => {
                for elem in obj.ptr(self.bytes, offset).iter() {
                    let s = elem.ptr(self.bytes, 0).str_bytes(self.bytes);
                    self.string(name, s)?;
                }
            }
            TypeKind::String => {
                let s = obj.ptr(self.bytes, offset).str_bytes(self.bytes);
                self.string(name, s)?;
            }
            scalar if repeated => {
                for elem in obj.ptr(self.bytes, offset).iter() {
                    self.scalar(name, elem, 0, &scalar)?;
                }
            }
            scalar => {
                let size = scalar.scalar_size().unwrap_or(0);
                if obj.scalar(self.bytes, offset, size).is_some() {
                    self.scalar(name, obj, offset, &scalar)?;
                }
            }
        }
        Ok(())
    }

    fn string(&mut self, name: &str, s: &[u8]) -> io::Result<()> {
        self.pad()?;
        write!(self.w, "{name}: ")?;
        write_escaped(&mut *self.w, s, self.loose, self.wrap_column)?;
        self.newline()
    }

    fn scalar(
        &mut self,
        name: &str,
        obj: Obj,
        offset: usize,
        kind: &TypeKind<'_>,
    ) -> io::Result<()> {
        let b = self.bytes;
        self.pad()?;
        write!(self.w, "{name}: ")?;
        match kind {
            TypeKind::Bool => {
                let v = if obj.get_bool(b, offset) { "true" } else { "false" };
                self.w.write_all(v.as_bytes())?;
            }
            TypeKind::Uint(1) => write!(self.w, "{}", obj.get_u8(b, offset))?,
            TypeKind::Uint(2) => write!(self.w, "{}", obj.get_u16(b, offset))?,
            TypeKind::Uint(4) => write!(self.w, "{}", obj.get_u32(b, offset))?,
            TypeKind::Uint(_) => write!(self.w, "{}", obj.get_u64(b, offset))?,
            TypeKind::Sint(1) => write!(self.w, "{}", obj.get_i8(b, offset))?,
            TypeKind::Sint(2) => write!(self.w, "{}", obj.get_i16(b, offset))?,
            TypeKind::Sint(4) => write!(self.w, "{}", obj.get_i32(b, offset))?,
            TypeKind::Sint(_) => write!(self.w, "{}", obj.get_i64(b, offset))?,
            TypeKind::Float(4) => {
                self.w.write_all(format_f32(obj.get_f32(b, offset)).as_bytes())?;
            }
            TypeKind::Float(_) => {
                self.w.write_all(format_f64(obj.get_f64(b, offset)).as_bytes())?;
            }
            TypeKind::Enum(edef) => self.enum_value(edef, obj.get_i16(b, offset))?,
            TypeKind::Message(_) | TypeKind::String => self.w.write_all(b"/* bad scalar */")?,
        }
        self.newline()
    }

    fn enum_value(&mut self, edef: &EnumDef<'_>, v: i16) -> io::Result<()> {
        match edef.symbol_of(v) {
            Some(sym) => self.w.write_all(sym.as_bytes()),
            None => write!(self.w, "{v}"),
        }
    }
}
