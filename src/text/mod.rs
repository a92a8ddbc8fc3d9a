//! Human-readable text format for messages.
//!
//! Both directions are driven by reflection only: any message type of any
//! compiled schema can be printed and parsed without generated code.
//!
//! ```text
//! # pkg.Msg
//! scalar: 42
//! name: "escaped\n" "concatenated"
//! nested { flag: true }
//! repeated: 1
//! repeated: 2
//! ```
//!
//! # Beispiel
//!
//! ```
//! use packbuf::compiler::CompileSession;
//! use packbuf::text::{self, ParseOptions, PrintOptions};
//! use packbuf::Buffer;
//!
//! let set = CompileSession::isolated()
//!     .compile_str("message P { string name; int32[] ids; }", "p.pbs")
//!     .unwrap();
//! let mdef = set.lookup_message("P").unwrap();
//!
//! let mut buf = Buffer::new();
//! let input = b"name: \"x\" ids: 1 ids: 2";
//! let obj = text::parse(&ParseOptions::default(), &mut buf, input, &mdef).unwrap();
//! let opts = PrintOptions::default().with_indent(-1);
//! let out = text::print_to_vec(&opts, buf.as_bytes(), obj, &mdef).unwrap();
//! assert_eq!(out, b"name: \"x\" ids: 1 ids: 2 ");
//! ```

mod parser;
mod printer;

pub use parser::parse;
pub use printer::{print, print_to_vec};

/// Default nesting limit of both directions.
pub const DEFAULT_MAX_DEPTH: usize = 500;

/// A configured depth of 0 means [`DEFAULT_MAX_DEPTH`].
fn depth_limit(max_depth: usize) -> usize {
    if max_depth == 0 {
        DEFAULT_MAX_DEPTH
    } else {
        max_depth
    }
}

/// Printer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    /// Spaces per nesting level. Negative prints everything on one line,
    /// separating fields by a single space.
    pub indent: i32,
    /// Messages nested deeper than this are replaced by a comment.
    /// 0 selects [`DEFAULT_MAX_DEPTH`].
    pub max_depth: usize,
    /// Emit a leading `# pkg.Msg` line.
    pub msg_type_header: bool,
    /// Pass bytes >= 0x80 through unescaped.
    pub loose_escape: bool,
    /// Split string literals before this column; 0 disables wrapping.
    pub wrap_column: usize,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            indent: 2,
            max_depth: DEFAULT_MAX_DEPTH,
            msg_type_header: false,
            loose_escape: false,
            wrap_column: 0,
        }
    }
}

impl PrintOptions {
    pub fn with_indent(mut self, indent: i32) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_msg_type_header(mut self) -> Self {
        self.msg_type_header = true;
        self
    }

    pub fn with_loose_escape(mut self) -> Self {
        self.loose_escape = true;
        self
    }

    pub fn with_wrap_column(mut self, column: usize) -> Self {
        self.wrap_column = column;
        self
    }
}

/// Parser configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum message nesting; the root message counts as level 1.
    /// 0 selects [`DEFAULT_MAX_DEPTH`].
    pub max_depth: usize,
    /// Name used in diagnostics.
    pub filename: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            filename: "<string>".to_string(),
        }
    }
}

impl ParseOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }
}
