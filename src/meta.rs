//! The schema format described in its own schema language.
//!
//! [`schema_set`] is built from a constant table so it needs no compiler
//! run; [`META_SCHEMA`] compiles to the same layout. Compiled schema
//! buffers are messages of type `packbuf.Schema` and can be printed with
//! the text codec like any other message.

use std::sync::{Arc, OnceLock};

use crate::schema::{EnumSpec, FieldSpec, Kind, MsgSpec, SchemaSet, SchemaSpec, KIND_ARR};

/// Source text of the meta-schema.
pub const META_SCHEMA: &str = r#"package packbuf;

enum Kind {
  VOID, BOOL, UINT, SINT, FLOAT, ENUM, STR, MSG,
  ARR = 16,
}

message EnumVal {
  string symbol;
  int16 value;
}

message EnumDef {
  string name;
  EnumVal[] values;
}

message FieldDef {
  string name;
  Kind kind;
  uint16 type_id;
  uint16 import_id;
  uint32 offset;
}

message MsgDef {
  string name;
  FieldDef[] fields;
  uint16 ssize;
  uint16 psize;
}

message Schema {
  string pkg_name;
  string src_name;
  EnumDef[] enums;
  MsgDef[] messages;
}
"#;

/// Source name recorded in the meta-schema.
pub const META_SRC_NAME: &str = "packbuf.pbs";

const KIND_SYMBOLS: [(&str, i16); 9] = [
    ("VOID", 0),
    ("BOOL", 1),
    ("UINT", 2),
    ("SINT", 3),
    ("FLOAT", 4),
    ("ENUM", 5),
    ("STR", 6),
    ("MSG", 7),
    ("ARR", KIND_ARR as i16),
];

/// `(name, kind, type_id, repeated, offset)`
type FieldRow = (&'static str, Kind, u16, bool, u32);

/// `(name, ssize, psize, fields)`, in type-id order.
const MESSAGES: [(&str, u16, u16, &[FieldRow]); 5] = [
    (
        "EnumVal",
        4,
        1,
        &[("symbol", Kind::Str, 0, false, 0), ("value", Kind::Sint, 1, false, 0)],
    ),
    (
        "EnumDef",
        0,
        2,
        &[("name", Kind::Str, 0, false, 0), ("values", Kind::Msg, 0, true, 1)],
    ),
    (
        "FieldDef",
        12,
        1,
        &[
            ("name", Kind::Str, 0, false, 0),
            ("kind", Kind::Enum, 0, false, 0),
            ("type_id", Kind::Uint, 1, false, 2),
            ("import_id", Kind::Uint, 1, false, 4),
            ("offset", Kind::Uint, 2, false, 8),
        ],
    ),
    (
        "MsgDef",
        4,
        2,
        &[
            ("name", Kind::Str, 0, false, 0),
            ("fields", Kind::Msg, 2, true, 1),
            ("ssize", Kind::Uint, 1, false, 0),
            ("psize", Kind::Uint, 1, false, 2),
        ],
    ),
    (
        "Schema",
        0,
        4,
        &[
            ("pkg_name", Kind::Str, 0, false, 0),
            ("src_name", Kind::Str, 0, false, 1),
            ("enums", Kind::Msg, 1, true, 2),
            ("messages", Kind::Msg, 3, true, 3),
        ],
    ),
];

fn spec() -> SchemaSpec {
    SchemaSpec {
        pkg_name: "packbuf".to_string(),
        src_name: META_SRC_NAME.to_string(),
        enums: vec![EnumSpec {
            name: "Kind".to_string(),
            values: KIND_SYMBOLS.iter().map(|(s, v)| (s.to_string(), *v)).collect(),
        }],
        messages: MESSAGES
            .iter()
            .map(|(name, ssize, psize, fields)| MsgSpec {
                name: name.to_string(),
                ssize: *ssize,
                psize: *psize,
                fields: fields
                    .iter()
                    .map(|(fname, kind, type_id, repeated, offset)| FieldSpec {
                        name: fname.to_string(),
                        kind: kind.raw(*repeated),
                        type_id: *type_id,
                        import_id: 0,
                        offset: *offset,
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// The shared meta-schema; `None` only if the initial allocation failed.
pub fn schema_set() -> Option<Arc<SchemaSet>> {
    static META: OnceLock<Option<Arc<SchemaSet>>> = OnceLock::new();
    META.get_or_init(|| {
        let buf = spec().encode().ok()?;
        SchemaSet::new(buf, Vec::new()).ok().map(Arc::new)
    })
    .clone()
}
