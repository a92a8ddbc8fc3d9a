//! packbuf – schema-driven zero-copy binary messages
//!
//! Messages live in an append-only [`Buffer`] and are read in place through
//! [`Obj`] handles. Schemas are compiled from text by
//! [`compiler::CompileSession`]; the compiled form is itself a packbuf
//! message described by the built-in [`meta`] schema. [`text`] converts
//! any message to and from a readable text form using only the compiled
//! schema.
//!
//! # Beispiel
//!
//! ```
//! use packbuf::compiler::CompileSession;
//! use packbuf::{reflect, Buffer, Obj};
//!
//! let set = CompileSession::isolated()
//!     .compile_str("package geo; message Point { int32 x; int32 y; string tag; }", "geo.pbs")
//!     .unwrap();
//! let point = set.lookup_message("Point").unwrap();
//!
//! // Write
//! let mut buf = Buffer::new();
//! let p = reflect::alloc_msg(&mut buf, &point).unwrap();
//! buf.set_i32(p, 0, -3).unwrap();
//! buf.set_i32(p, 4, 9).unwrap();
//! let tag = buf.alloc_str(b"origin").unwrap();
//! buf.set_ptr(p, 0, tag.first().unwrap()).unwrap();
//!
//! // Read
//! let bytes = buf.as_bytes();
//! let root = Obj::get(bytes, 0).first().unwrap();
//! assert_eq!(root.get_i32(bytes, 0), -3);
//! assert_eq!(root.get_i32(bytes, 4), 9);
//! assert_eq!(root.ptr(bytes, 0).as_str(bytes), Some("origin"));
//! ```

pub mod buffer;
pub mod compiler;
pub mod error;
pub mod float;
pub mod header;
pub mod integer;
pub mod io;
pub mod lexer;
pub mod meta;
pub mod obj;
pub mod raw;
pub mod reflect;
pub mod schema;
pub mod string;
pub mod text;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent, für interne Datenstrukturen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// HashSet mit ahash.
pub(crate) type FastHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;

// Public API: object model
pub use buffer::{Buffer, BufferId};
pub use obj::{Obj, ObjArray, Pointer};

// Public API: schemas
pub use compiler::CompileSession;
pub use reflect::{FieldType, TypeKind};
pub use schema::{EnumDef, EnumVal, FieldDef, Kind, MsgDef, Schema, SchemaSet};

// Public API: text format
pub use text::{ParseOptions, PrintOptions};
