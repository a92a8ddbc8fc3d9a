//! Runtime introspection over compiled schemas.
//!
//! Every lookup is fail-soft: a miss returns `None`, never panics, since
//! names frequently come from untrusted message text.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::obj::Obj;
use crate::schema::{EnumDef, FieldDef, Kind, MsgDef, Schema, SchemaSet};

/// Resolved type of a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeKind<'a> {
    Bool,
    /// Unsigned integer of the given byte size.
    Uint(usize),
    /// Signed integer of the given byte size.
    Sint(usize),
    /// IEEE float of 4 or 8 bytes.
    Float(usize),
    Enum(EnumDef<'a>),
    Message(MsgDef<'a>),
    String,
}

/// Resolved type of a field plus its cardinality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldType<'a> {
    pub kind: TypeKind<'a>,
    pub repeated: bool,
}

/// Byte size of an enum value.
pub const ENUM_SIZE: usize = 2;

impl<'a> TypeKind<'a> {
    /// Byte size of one value inside a scalar region; `None` for pointer kinds.
    pub fn scalar_size(&self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            Self::Uint(n) | Self::Sint(n) | Self::Float(n) => Some(*n),
            Self::Enum(_) => Some(ENUM_SIZE),
            Self::Message(_) | Self::String => None,
        }
    }

    /// `(ssize, psize)` of one element when this type is repeated.
    pub fn element_sizes(&self) -> (usize, usize) {
        match self {
            Self::Message(m) => (m.ssize(), m.psize()),
            Self::String => (0, 1),
            other => (other.scalar_size().unwrap_or(0), 0),
        }
    }
}

impl<'a> FieldDef<'a> {
    /// Resolves the field's type through `import_id`/`type_id`.
    ///
    /// `None` if the kind is unknown or the referenced definition is missing.
    pub fn field_type(&self) -> Option<FieldType<'a>> {
        let set = self.schema_set();
        let type_id = self.type_id() as usize;
        let scalar = || match type_id {
            0..=3 => Some(1usize << type_id),
            _ => None,
        };
        let kind = match self.kind()? {
            Kind::Void => return None,
            Kind::Bool => TypeKind::Bool,
            Kind::Uint => TypeKind::Uint(scalar()?),
            Kind::Sint => TypeKind::Sint(scalar()?),
            Kind::Float => match scalar()? {
                n @ (4 | 8) => TypeKind::Float(n),
                _ => return None,
            },
            Kind::Str => TypeKind::String,
            Kind::Enum => TypeKind::Enum(set.import(self.import_id())?.schema().enum_at(type_id)?),
            Kind::Msg => {
                TypeKind::Message(set.import(self.import_id())?.schema().message_at(type_id)?)
            }
        };
        Some(FieldType {
            kind,
            repeated: self.is_repeated(),
        })
    }
}

impl<'a> MsgDef<'a> {
    /// Field with exactly this name.
    pub fn lookup_field(&self, name: &[u8]) -> Option<FieldDef<'a>> {
        self.fields().find(|f| f.name().as_bytes() == name)
    }
}

impl<'a> EnumDef<'a> {
    /// Value of `symbol`.
    pub fn value_of(&self, symbol: &[u8]) -> Option<i16> {
        self.values()
            .find(|v| v.symbol().as_bytes() == symbol)
            .map(|v| v.value())
    }

    /// First symbol declared with `value`.
    pub fn symbol_of(&self, value: i16) -> Option<&'a str> {
        self.values().find(|v| v.value() == value).map(|v| v.symbol())
    }
}

/// Result of looking up a type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRef {
    pub kind: Kind,
    pub type_id: u16,
}

/// Resolves the builtin scalar names: `int8`..`uint64`, `float`, `double`,
/// `bool` and `string`. For sized kinds `type_id` is log2 of the byte size.
pub fn lookup_builtin_type(name: &str) -> Option<TypeRef> {
    let (kind, type_id) = match name {
        "int8" => (Kind::Sint, 0),
        "int16" => (Kind::Sint, 1),
        "int32" => (Kind::Sint, 2),
        "int64" => (Kind::Sint, 3),
        "uint8" => (Kind::Uint, 0),
        "uint16" => (Kind::Uint, 1),
        "uint32" => (Kind::Uint, 2),
        "uint64" => (Kind::Uint, 3),
        "float" => (Kind::Float, 2),
        "double" => (Kind::Float, 3),
        "bool" => (Kind::Bool, 0),
        "string" => (Kind::Str, 0),
        _ => return None,
    };
    Some(TypeRef { kind, type_id })
}

/// Finds an enum or message defined in `schema` by its unqualified name.
/// Enums are searched before messages.
pub fn lookup_defined_type(schema: &Schema<'_>, name: &str) -> Option<TypeRef> {
    if let Some(e) = schema.enums().find(|e| e.name() == name) {
        return Some(TypeRef {
            kind: Kind::Enum,
            type_id: e.index() as u16,
        });
    }
    schema.messages().find(|m| m.name() == name).map(|m| TypeRef {
        kind: Kind::Msg,
        type_id: m.index() as u16,
    })
}

impl SchemaSet {
    /// Message type by bare name or `pkg.Name`.
    pub fn lookup_message(&self, name: &str) -> Result<MsgDef<'_>> {
        let schema = self.schema();
        let pkg = schema.pkg_name();
        let bare = match name.strip_prefix(pkg).and_then(|r| r.strip_prefix('.')) {
            Some(rest) if !pkg.is_empty() => rest,
            _ => name,
        };
        match lookup_defined_type(&schema, bare) {
            Some(TypeRef {
                kind: Kind::Msg,
                type_id,
            }) => schema
                .message_at(type_id as usize)
                .ok_or_else(|| Error::NotAMessageType(name.to_string())),
            _ => Err(Error::NotAMessageType(name.to_string())),
        }
    }
}

/// Allocates a zeroed instance of `mdef` in `buf`.
pub fn alloc_msg(buf: &mut Buffer, mdef: &MsgDef<'_>) -> Result<Obj> {
    buf.alloc_obj(mdef.ssize(), mdef.psize())
}

/// Allocates `n` zeroed instances of `mdef` as one array.
pub fn alloc_msg_array(buf: &mut Buffer, mdef: &MsgDef<'_>, n: usize) -> Result<Obj> {
    buf.alloc_arr(mdef.ssize(), mdef.psize(), n)
}
