//! Compiled schemas and typed views over them.
//!
//! A compiled schema is itself a message buffer: its root object is a
//! `Schema` message laid out by the meta-schema (see [`crate::meta`]).
//! [`SchemaSet`] pairs that buffer with the schema sets it imports, and the
//! view types ([`Schema`], [`MsgDef`], [`FieldDef`], [`EnumDef`],
//! [`EnumVal`]) read it without copying.
//!
//! All accessors are fail-soft: a malformed or truncated schema buffer reads
//! as empty names, zero counts and absent definitions.

use std::sync::Arc;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::obj::{Obj, ObjArray};

// ============================================================================
// Field kinds
// ============================================================================

/// Base kind of a field as stored in `FieldDef.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Kind {
    Void = 0,
    Bool = 1,
    Uint = 2,
    Sint = 3,
    Float = 4,
    Enum = 5,
    Str = 6,
    Msg = 7,
}

/// Modifier bit for repeated fields, or'ed into the stored kind.
pub const KIND_ARR: u16 = 16;

impl Kind {
    pub fn from_raw(raw: u16) -> Option<Kind> {
        Some(match raw & !KIND_ARR {
            0 => Kind::Void,
            1 => Kind::Bool,
            2 => Kind::Uint,
            3 => Kind::Sint,
            4 => Kind::Float,
            5 => Kind::Enum,
            6 => Kind::Str,
            7 => Kind::Msg,
            _ => return None,
        })
    }

    /// Stored representation including the repeated bit.
    pub fn raw(self, repeated: bool) -> u16 {
        self as u16 | if repeated { KIND_ARR } else { 0 }
    }

    /// True for kinds that occupy a pointer slot when not repeated.
    pub fn is_pointer(self) -> bool {
        matches!(self, Kind::Str | Kind::Msg)
    }
}

/// `import_id` marking a type name still awaiting resolution.
pub(crate) const UNRESOLVED_IMPORT_ID: u16 = 65535;

// ============================================================================
// Meta-schema layout
// ============================================================================

/// Slot and offset assignments of the meta-schema messages.
///
/// These are the offsets [`crate::meta::META_SCHEMA`] compiles to.
pub(crate) mod layout {
    pub mod schema {
        pub const SSIZE: usize = 0;
        pub const PSIZE: usize = 4;
        pub const PKG_NAME: usize = 0;
        pub const SRC_NAME: usize = 1;
        pub const ENUMS: usize = 2;
        pub const MESSAGES: usize = 3;
    }
    pub mod enum_def {
        pub const SSIZE: usize = 0;
        pub const PSIZE: usize = 2;
        pub const NAME: usize = 0;
        pub const VALUES: usize = 1;
    }
    pub mod enum_val {
        pub const SSIZE: usize = 4;
        pub const PSIZE: usize = 1;
        pub const SYMBOL: usize = 0;
        pub const VALUE: usize = 0;
    }
    pub mod msg_def {
        pub const SSIZE: usize = 4;
        pub const PSIZE: usize = 2;
        pub const NAME: usize = 0;
        pub const FIELDS: usize = 1;
        pub const SSIZE_AT: usize = 0;
        pub const PSIZE_AT: usize = 2;
    }
    pub mod field_def {
        pub const SSIZE: usize = 12;
        pub const PSIZE: usize = 1;
        pub const NAME: usize = 0;
        pub const KIND: usize = 0;
        pub const TYPE_ID: usize = 2;
        pub const IMPORT_ID: usize = 4;
        pub const OFFSET: usize = 8;
    }
}

use layout::{enum_def, enum_val, field_def, msg_def, schema as schema_l};

// ============================================================================
// SchemaSet
// ============================================================================

/// A compiled schema plus the compiled schemas it imports.
///
/// `import_id` 0 in a [`FieldDef`] refers to this set, `i > 0` to
/// `imports()[i - 1]`.
#[derive(Debug)]
pub struct SchemaSet {
    buf: Buffer,
    imports: Vec<Arc<SchemaSet>>,
}

impl SchemaSet {
    /// Wraps a schema buffer. Its root object must start at offset 0.
    pub fn new(buf: Buffer, imports: Vec<Arc<SchemaSet>>) -> Result<Self> {
        let root = Obj::get(buf.as_bytes(), 0);
        match root.first() {
            Some(o) if root.len() == 1 && o.psize() >= schema_l::PSIZE => Ok(Self { buf, imports }),
            Some(_) => Err(Error::MalformedSchema("root object is not a Schema")),
            None => Err(Error::MalformedSchema("no root object")),
        }
    }

    /// Wraps a stand-alone compiled schema, e.g. loaded from a file.
    ///
    /// Enum and message fields referring to imports read as unresolved.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::new(Buffer::from_bytes(bytes), Vec::new())
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buf
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    pub fn imports(&self) -> &[Arc<SchemaSet>] {
        &self.imports
    }

    /// The set addressed by `import_id` from a field of this set.
    pub fn import(&self, import_id: u16) -> Option<&SchemaSet> {
        match import_id {
            0 => Some(self),
            i => self.imports.get(i as usize - 1).map(|s| s.as_ref()),
        }
    }

    /// The root `Schema` object.
    pub fn schema(&self) -> Schema<'_> {
        Schema {
            set: self,
            obj: Obj::get(self.bytes(), 0).first().unwrap_or(Obj::NULL),
        }
    }
}

// ============================================================================
// Views
// ============================================================================

fn str_at<'a>(set: &'a SchemaSet, obj: Obj, slot: usize) -> &'a str {
    obj.ptr(set.bytes(), slot).as_str(set.bytes()).unwrap_or("")
}

/// Iterator over an array of schema objects, yielding views.
pub struct Defs<'a, T> {
    set: &'a SchemaSet,
    arr: ObjArray,
    next: usize,
    wrap: fn(&'a SchemaSet, Obj, usize) -> T,
}

impl<'a, T> Iterator for Defs<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let obj = self.arr.get(self.next)?;
        let item = (self.wrap)(self.set, obj, self.next);
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.arr.len() - self.next;
        (n, Some(n))
    }
}

impl<T> ExactSizeIterator for Defs<'_, T> {}

/// Root of a compiled schema.
#[derive(Debug, Clone, Copy)]
pub struct Schema<'a> {
    set: &'a SchemaSet,
    obj: Obj,
}

impl<'a> Schema<'a> {
    pub fn schema_set(&self) -> &'a SchemaSet {
        self.set
    }

    /// Dotted package name, empty if none was declared.
    pub fn pkg_name(&self) -> &'a str {
        str_at(self.set, self.obj, schema_l::PKG_NAME)
    }

    /// Name of the source file the schema was compiled from.
    pub fn src_name(&self) -> &'a str {
        str_at(self.set, self.obj, schema_l::SRC_NAME)
    }

    fn enum_arr(&self) -> ObjArray {
        self.obj.ptr(self.set.bytes(), schema_l::ENUMS)
    }

    fn msg_arr(&self) -> ObjArray {
        self.obj.ptr(self.set.bytes(), schema_l::MESSAGES)
    }

    pub fn enums(&self) -> Defs<'a, EnumDef<'a>> {
        Defs {
            set: self.set,
            arr: self.enum_arr(),
            next: 0,
            wrap: |set, obj, index| EnumDef { set, obj, index },
        }
    }

    pub fn messages(&self) -> Defs<'a, MsgDef<'a>> {
        Defs {
            set: self.set,
            arr: self.msg_arr(),
            next: 0,
            wrap: |set, obj, index| MsgDef { set, obj, index },
        }
    }

    pub fn enum_at(&self, type_id: usize) -> Option<EnumDef<'a>> {
        self.enum_arr().get(type_id).map(|obj| EnumDef {
            set: self.set,
            obj,
            index: type_id,
        })
    }

    pub fn message_at(&self, type_id: usize) -> Option<MsgDef<'a>> {
        self.msg_arr().get(type_id).map(|obj| MsgDef {
            set: self.set,
            obj,
            index: type_id,
        })
    }
}

/// Definition of a message type.
#[derive(Debug, Clone, Copy)]
pub struct MsgDef<'a> {
    set: &'a SchemaSet,
    obj: Obj,
    index: usize,
}

impl<'a> MsgDef<'a> {
    pub fn schema_set(&self) -> &'a SchemaSet {
        self.set
    }

    /// Position within the schema's message list (the `type_id`).
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'a str {
        str_at(self.set, self.obj, msg_def::NAME)
    }

    /// `pkg.Name`, or just `Name` without a package.
    pub fn full_name(&self) -> String {
        let pkg = self.set.schema().pkg_name();
        if pkg.is_empty() {
            self.name().to_string()
        } else {
            format!("{pkg}.{}", self.name())
        }
    }

    /// Scalar region size of instances.
    pub fn ssize(&self) -> usize {
        self.obj.get_u16(self.set.bytes(), msg_def::SSIZE_AT) as usize
    }

    /// Pointer slot count of instances.
    pub fn psize(&self) -> usize {
        self.obj.get_u16(self.set.bytes(), msg_def::PSIZE_AT) as usize
    }

    fn field_arr(&self) -> ObjArray {
        self.obj.ptr(self.set.bytes(), msg_def::FIELDS)
    }

    pub fn fields(&self) -> Defs<'a, FieldDef<'a>> {
        Defs {
            set: self.set,
            arr: self.field_arr(),
            next: 0,
            wrap: |set, obj, _| FieldDef { set, obj },
        }
    }

    pub fn field_count(&self) -> usize {
        self.field_arr().len()
    }
}

impl PartialEq for MsgDef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.set, other.set) && self.obj == other.obj
    }
}

/// Definition of one field of a message.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef<'a> {
    set: &'a SchemaSet,
    obj: Obj,
}

impl<'a> FieldDef<'a> {
    pub fn schema_set(&self) -> &'a SchemaSet {
        self.set
    }

    pub fn name(&self) -> &'a str {
        str_at(self.set, self.obj, field_def::NAME)
    }

    /// Stored kind including the [`KIND_ARR`] bit.
    pub fn raw_kind(&self) -> u16 {
        self.obj.get_u16(self.set.bytes(), field_def::KIND)
    }

    pub fn kind(&self) -> Option<Kind> {
        Kind::from_raw(self.raw_kind())
    }

    pub fn is_repeated(&self) -> bool {
        self.raw_kind() & KIND_ARR != 0
    }

    pub fn type_id(&self) -> u16 {
        self.obj.get_u16(self.set.bytes(), field_def::TYPE_ID)
    }

    pub fn import_id(&self) -> u16 {
        self.obj.get_u16(self.set.bytes(), field_def::IMPORT_ID)
    }

    /// Scalar byte offset, or pointer slot index for pointer-carrying fields.
    pub fn offset(&self) -> usize {
        self.obj.get_u32(self.set.bytes(), field_def::OFFSET) as usize
    }
}

/// Definition of an enum type.
#[derive(Debug, Clone, Copy)]
pub struct EnumDef<'a> {
    set: &'a SchemaSet,
    obj: Obj,
    index: usize,
}

impl<'a> EnumDef<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'a str {
        str_at(self.set, self.obj, enum_def::NAME)
    }

    pub fn values(&self) -> Defs<'a, EnumVal<'a>> {
        Defs {
            set: self.set,
            arr: self.obj.ptr(self.set.bytes(), enum_def::VALUES),
            next: 0,
            wrap: |set, obj, _| EnumVal { set, obj },
        }
    }
}

impl PartialEq for EnumDef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.set, other.set) && self.obj == other.obj
    }
}

/// One symbol of an enum.
#[derive(Debug, Clone, Copy)]
pub struct EnumVal<'a> {
    set: &'a SchemaSet,
    obj: Obj,
}

impl<'a> EnumVal<'a> {
    pub fn symbol(&self) -> &'a str {
        str_at(self.set, self.obj, enum_val::SYMBOL)
    }

    pub fn value(&self) -> i16 {
        self.obj.get_i16(self.set.bytes(), enum_val::VALUE)
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Owned description of a schema, encoded into a schema buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SchemaSpec {
    pub pkg_name: String,
    pub src_name: String,
    pub enums: Vec<EnumSpec>,
    pub messages: Vec<MsgSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EnumSpec {
    pub name: String,
    pub values: Vec<(String, i16)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MsgSpec {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub ssize: u16,
    pub psize: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldSpec {
    pub name: String,
    pub kind: u16,
    pub type_id: u16,
    pub import_id: u16,
    pub offset: u32,
}

impl SchemaSpec {
    /// Encodes into a fresh buffer with the `Schema` root at offset 0.
    ///
    /// Parents are allocated before their children so that every pointer
    /// points forward.
    pub(crate) fn encode(&self) -> Result<Buffer> {
        let mut buf = Buffer::with_capacity(4096)?;
        let root = buf.alloc_obj(schema_l::SSIZE, schema_l::PSIZE)?;
        set_str(&mut buf, root, schema_l::PKG_NAME, &self.pkg_name)?;
        set_str(&mut buf, root, schema_l::SRC_NAME, &self.src_name)?;

        if !self.enums.is_empty() {
            let arr = buf.alloc_arr(enum_def::SSIZE, enum_def::PSIZE, self.enums.len())?;
            buf.set_ptr(root, schema_l::ENUMS, arr)?;
            for (i, e) in self.enums.iter().enumerate() {
                let edef = arr.advance(i)?;
                set_str(&mut buf, edef, enum_def::NAME, &e.name)?;
                if e.values.is_empty() {
                    continue;
                }
                let vals = buf.alloc_arr(enum_val::SSIZE, enum_val::PSIZE, e.values.len())?;
                buf.set_ptr(edef, enum_def::VALUES, vals)?;
                for (j, (sym, value)) in e.values.iter().enumerate() {
                    let v = vals.advance(j)?;
                    set_str(&mut buf, v, enum_val::SYMBOL, sym)?;
                    buf.set_i16(v, enum_val::VALUE, *value)?;
                }
            }
        }

        if !self.messages.is_empty() {
            let arr = buf.alloc_arr(msg_def::SSIZE, msg_def::PSIZE, self.messages.len())?;
            buf.set_ptr(root, schema_l::MESSAGES, arr)?;
            for (i, m) in self.messages.iter().enumerate() {
                let mdef = arr.advance(i)?;
                set_str(&mut buf, mdef, msg_def::NAME, &m.name)?;
                buf.set_u16(mdef, msg_def::SSIZE_AT, m.ssize)?;
                buf.set_u16(mdef, msg_def::PSIZE_AT, m.psize)?;
                if m.fields.is_empty() {
                    continue;
                }
                let fields = buf.alloc_arr(field_def::SSIZE, field_def::PSIZE, m.fields.len())?;
                buf.set_ptr(mdef, msg_def::FIELDS, fields)?;
                for (j, f) in m.fields.iter().enumerate() {
                    let fdef = fields.advance(j)?;
                    set_str(&mut buf, fdef, field_def::NAME, &f.name)?;
                    buf.set_u16(fdef, field_def::KIND, f.kind)?;
                    buf.set_u16(fdef, field_def::TYPE_ID, f.type_id)?;
                    buf.set_u16(fdef, field_def::IMPORT_ID, f.import_id)?;
                    buf.set_u32(fdef, field_def::OFFSET, f.offset)?;
                }
            }
        }
        Ok(buf)
    }
}

/// Allocates `s` and stores it in `slot`; empty strings stay null.
fn set_str(buf: &mut Buffer, obj: Obj, slot: usize, s: &str) -> Result<()> {
    if s.is_empty() {
        return Ok(());
    }
    let target = buf.alloc_str(s.as_bytes())?;
    match target.first() {
        Some(t) => buf.set_ptr(obj, slot, t),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchemaSpec {
        SchemaSpec {
            pkg_name: "demo.v1".into(),
            src_name: "demo.pbs".into(),
            enums: vec![EnumSpec {
                name: "Color".into(),
                values: vec![("RED".into(), 0), ("BLUE".into(), 7)],
            }],
            messages: vec![MsgSpec {
                name: "Pixel".into(),
                fields: vec![
                    FieldSpec {
                        name: "color".into(),
                        kind: Kind::Enum.raw(false),
                        type_id: 0,
                        import_id: 0,
                        offset: 0,
                    },
                    FieldSpec {
                        name: "tags".into(),
                        kind: Kind::Str.raw(true),
                        type_id: 0,
                        import_id: 0,
                        offset: 0,
                    },
                ],
                ssize: 4,
                psize: 1,
            }],
        }
    }

    #[test]
    fn encoded_schema_reads_back() {
        let set = SchemaSet::new(sample().encode().unwrap(), Vec::new()).unwrap();
        let schema = set.schema();
        assert_eq!(schema.pkg_name(), "demo.v1");
        assert_eq!(schema.src_name(), "demo.pbs");

        let e = schema.enum_at(0).unwrap();
        assert_eq!(e.name(), "Color");
        let vals: Vec<(&str, i16)> = e.values().map(|v| (v.symbol(), v.value())).collect();
        assert_eq!(vals, vec![("RED", 0), ("BLUE", 7)]);

        let m = schema.message_at(0).unwrap();
        assert_eq!(m.full_name(), "demo.v1.Pixel");
        assert_eq!((m.ssize(), m.psize()), (4, 1));
        let f: Vec<FieldDef> = m.fields().collect();
        assert_eq!(f.len(), 2);
        assert_eq!(f[0].kind(), Some(Kind::Enum));
        assert!(!f[0].is_repeated());
        assert_eq!(f[1].name(), "tags");
        assert!(f[1].is_repeated());
        assert_eq!(f[1].kind(), Some(Kind::Str));
        assert!(schema.message_at(1).is_none());
    }

    #[test]
    fn empty_package_is_empty_string() {
        let mut spec = sample();
        spec.pkg_name.clear();
        let set = SchemaSet::new(spec.encode().unwrap(), Vec::new()).unwrap();
        assert_eq!(set.schema().pkg_name(), "");
        assert_eq!(set.schema().message_at(0).unwrap().full_name(), "Pixel");
    }

    #[test]
    fn import_ids() {
        let inner = Arc::new(SchemaSet::new(sample().encode().unwrap(), Vec::new()).unwrap());
        let outer = SchemaSet::new(SchemaSpec::default().encode().unwrap(), vec![inner]).unwrap();
        assert!(std::ptr::eq(outer.import(0).unwrap(), &outer));
        assert_eq!(outer.import(1).unwrap().schema().pkg_name(), "demo.v1");
        assert!(outer.import(2).is_none());
    }

    #[test]
    fn truncated_schema_is_fail_soft() {
        let bytes = sample().encode().unwrap().into_bytes();
        // the root object itself needs 4 + 4 * 4 bytes
        for cut in 20..bytes.len() {
            let set = SchemaSet::from_bytes(bytes[..cut].to_vec()).unwrap();
            let schema = set.schema();
            for m in schema.messages() {
                for f in m.fields() {
                    let _ = (f.name(), f.kind(), f.offset());
                }
            }
            assert!(schema.messages().len() <= 1);
            assert!(schema.enums().all(|e| e.values().count() <= 2));
        }
    }

    #[test]
    fn rejects_non_schema_root() {
        assert_eq!(
            SchemaSet::from_bytes(vec![0; 8]).unwrap_err(),
            Error::MalformedSchema("no root object")
        );
        let mut buf = Buffer::new();
        buf.alloc_obj(4, 1).unwrap();
        assert!(matches!(
            SchemaSet::new(buf, Vec::new()),
            Err(Error::MalformedSchema(_))
        ));
    }

    #[test]
    fn kind_raw_round_trip() {
        for k in [
            Kind::Bool,
            Kind::Uint,
            Kind::Sint,
            Kind::Float,
            Kind::Enum,
            Kind::Str,
            Kind::Msg,
        ] {
            assert_eq!(Kind::from_raw(k.raw(true)), Some(k));
            assert_eq!(Kind::from_raw(k.raw(false)), Some(k));
        }
        assert_eq!(Kind::from_raw(9), None);
    }
}
