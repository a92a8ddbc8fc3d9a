//! Central error types for buffers, the schema compiler and the text codec.
//!
//! Malformed binary input is deliberately *not* represented here: decoding a
//! bad header or an out-of-range region yields an absent (zero-length)
//! object instead of an error, so readers can proceed defensively.

use core::fmt;

/// All errors reported by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Memory for a buffer could not be reserved.
    OutOfMemory,
    /// A mutating operation was attempted on a read-only buffer.
    ReadOnlyBuffer,
    /// Only the array ending exactly at the buffer tail can be resized.
    NotTailArray,
    /// An array length does not fit into its header representation.
    LengthOverflow(u64),
    /// A pointer slot index is outside the object's pointer region.
    NoSuchSlot { slot: usize, psize: usize },
    /// A pending pointer refers to a buffer other than the one being merged.
    ForeignPointer,
    /// Pointer targets must be allocated after the slot that refers to them.
    BackwardPointer,
    /// A scalar write does not fit into the object's scalar region.
    ScalarOutOfRange {
        offset: usize,
        size: usize,
        ssize: usize,
    },
    /// Lexical or syntax error in schema text or message text.
    Syntax {
        file: String,
        line: u32,
        message: String,
    },
    /// A field type name could not be resolved after the second pass.
    UnresolvedType { file: String, line: u32, name: String },
    /// An enum or message without members.
    EmptyDefinition {
        file: String,
        line: u32,
        what: &'static str,
    },
    /// A type or field name is declared twice in the same scope.
    DuplicateDefinition { file: String, line: u32, name: String },
    /// An import chain leads back to a file that is still being compiled.
    ///
    /// Die Liste enthält den vollständigen Zyklus, erster == letzter Eintrag.
    CircularImport(Vec<String>),
    /// Import recursion exceeded the fixed ceiling.
    ImportDepthExceeded(usize),
    /// No file on the search path matches an import. `file` and `line`
    /// locate the `import` statement; `file` is empty for a top-level file.
    ImportNotFound { file: String, line: u32, path: String },
    /// `import` used where no search path is available.
    ImportDisabled { file: String, line: u32 },
    /// A message text names a field the message type does not have.
    UnknownField { file: String, line: u32, name: String },
    /// The same repeated field occurs in two non-adjacent groups.
    ScatteredField { file: String, line: u32, name: String },
    /// Message nesting exceeded the configured maximum depth.
    DepthLimitExceeded(usize),
    /// A name passed as a message type does not denote a message.
    NotAMessageType(String),
    /// The schema buffer does not decode as a schema.
    MalformedSchema(&'static str),
    /// A raw object dump hit bytes that are not a valid object.
    MalformedObject { offset: usize, what: &'static str },
    /// An I/O error while loading or saving.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::ReadOnlyBuffer => write!(f, "buffer is read-only"),
            Self::NotTailArray => write!(f, "only the array at the buffer tail can be resized"),
            Self::LengthOverflow(len) => write!(f, "array length {len} does not fit into header"),
            Self::NoSuchSlot { slot, psize } => {
                write!(f, "pointer slot {slot} out of range (object has {psize})")
            }
            Self::ForeignPointer => write!(f, "pending pointer refers to a different buffer"),
            Self::BackwardPointer => write!(f, "pointer target precedes the pointer slot"),
            Self::ScalarOutOfRange {
                offset,
                size,
                ssize,
            } => write!(
                f,
                "scalar of {size} bytes at offset {offset} exceeds scalar region of {ssize} bytes"
            ),
            Self::Syntax { file, line, message } => write!(f, "{file}:{line}: {message}"),
            Self::UnresolvedType { file, line, name } => {
                write!(f, "{file}:{line}: cannot resolve typename '{name}'")
            }
            Self::EmptyDefinition { file, line, what } => write!(f, "{file}:{line}: empty {what}"),
            Self::DuplicateDefinition { file, line, name } => {
                write!(f, "{file}:{line}: '{name}' is already defined")
            }
            Self::CircularImport(chain) => {
                write!(f, "circular dependency: {}", chain.join(" -> "))
            }
            Self::ImportDepthExceeded(max) => write!(f, "max import depth ({max}) exceeded"),
            Self::ImportNotFound { file, line, path } => {
                if !file.is_empty() {
                    write!(f, "{file}:{line}: ")?;
                }
                write!(f, "file '{path}' cannot be found")
            }
            Self::ImportDisabled { file, line } => {
                write!(f, "{file}:{line}: import is disabled in compiler")
            }
            Self::UnknownField { file, line, name } => {
                write!(f, "{file}:{line}: unknown field '{name}'")
            }
            Self::ScatteredField { file, line, name } => {
                write!(f, "{file}:{line}: repeated field '{name}' is scattered")
            }
            Self::DepthLimitExceeded(max) => write!(f, "depth limit ({max}) exceeded"),
            Self::NotAMessageType(name) => write!(f, "'{name}' is not a message type name"),
            Self::MalformedSchema(what) => write!(f, "malformed schema: {what}"),
            Self::MalformedObject { offset, what } => {
                write!(f, "malformed object at offset 0x{offset:x}: {what}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl Error {
    /// Erstellt einen `Syntax` Fehler mit Position.
    pub fn syntax(file: &str, line: u32, message: impl Into<String>) -> Self {
        Self::Syntax {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Returns the source line of positional errors.
    pub fn line(&self) -> Option<u32> {
        match self {
            Self::Syntax { line, .. }
            | Self::UnresolvedType { line, .. }
            | Self::EmptyDefinition { line, .. }
            | Self::DuplicateDefinition { line, .. }
            | Self::ImportDisabled { line, .. }
            | Self::UnknownField { line, .. }
            | Self::ScatteredField { line, .. } => Some(*line),
            Self::ImportNotFound { file, line, .. } if !file.is_empty() => Some(*line),
            _ => None,
        }
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
