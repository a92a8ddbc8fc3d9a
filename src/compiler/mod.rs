//! Schema compiler: schema text → schema buffer.
//!
//! A [`CompileSession`] owns the import search path and a cache of every
//! file compiled so far. Imports are compiled depth-first the moment their
//! `import` statement is parsed; a file that is reached twice (diamond
//! imports) is compiled once and shared, a file that is reached while it is
//! still open is a circular import.
//!
//! # Beispiel
//!
//! ```
//! use packbuf::compiler::CompileSession;
//!
//! let set = CompileSession::isolated()
//!     .compile_str("package demo; message Point { int32 x; int32 y; }", "demo.pbs")
//!     .unwrap();
//! let point = set.lookup_message("demo.Point").unwrap();
//! assert_eq!((point.ssize(), point.psize()), (8, 0));
//! ```

mod parser;
mod resolve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::lexer::Lexer;
use crate::schema::SchemaSet;
use crate::FastHashMap;

/// Default ceiling for nested imports.
pub const MAX_IMPORT_DEPTH: usize = 500;

/// Identity of a schema file, independent of the path used to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FileId {
    #[cfg(unix)]
    Inode { dev: u64, ino: u64 },
    #[cfg(not(unix))]
    Path(PathBuf),
}

impl FileId {
    fn of(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let meta = std::fs::metadata(path)?;
            Ok(Self::Inode {
                dev: meta.dev(),
                ino: meta.ino(),
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self::Path(std::fs::canonicalize(path)?))
        }
    }
}

/// Compilation state of one file.
#[derive(Debug)]
enum FileState {
    /// Currently on the import stack.
    Open,
    Closed(Arc<SchemaSet>),
    /// Compilation failed; the error is replayed for later imports.
    Failed(Error),
}

/// Import search path, depth limit and the per-file cache.
#[derive(Debug)]
pub struct CompileSession {
    search_path: Vec<PathBuf>,
    imports_enabled: bool,
    max_import_depth: usize,
    depth: usize,
    files: FastHashMap<FileId, FileState>,
    /// Display names of the files being compiled, outermost first.
    stack: Vec<(String, Option<FileId>)>,
}

impl Default for CompileSession {
    fn default() -> Self {
        Self::new(Vec::<PathBuf>::new())
    }
}

impl CompileSession {
    /// Creates a session resolving imports against `search_path`, in order.
    /// An empty search path resolves relative imports against the
    /// working directory.
    pub fn new<I, P>(search_path: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_path: search_path.into_iter().map(Into::into).collect(),
            imports_enabled: true,
            max_import_depth: MAX_IMPORT_DEPTH,
            depth: 0,
            files: FastHashMap::default(),
            stack: Vec::new(),
        }
    }

    /// Session in which every `import` statement is an error.
    pub fn isolated() -> Self {
        Self {
            imports_enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_import_depth(mut self, max: usize) -> Self {
        self.max_import_depth = max;
        self
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    pub fn imports_enabled(&self) -> bool {
        self.imports_enabled
    }

    /// Compiles the schema file at `path`.
    ///
    /// The path is used as given when it exists, otherwise it is looked up
    /// on the search path like an import.
    pub fn compile_file(&mut self, path: impl AsRef<Path>) -> Result<Arc<SchemaSet>> {
        let path = path.as_ref();
        let found = if path.is_file() {
            Some(path.to_path_buf())
        } else {
            self.locate(path)
        };
        match found {
            Some(found) => self.open(&found),
            None => Err(Error::ImportNotFound {
                file: String::new(),
                line: 0,
                path: path.display().to_string(),
            }),
        }
    }

    /// Compiles schema text that does not live in a file. `filename` is
    /// recorded as the schema's source name and used in diagnostics.
    pub fn compile_str(&mut self, text: &str, filename: &str) -> Result<Arc<SchemaSet>> {
        self.stack.push((filename.to_string(), None));
        let result = self.compile_text(text.as_bytes(), filename);
        self.stack.pop();
        result
    }

    /// Resolves and compiles an `import` target named at `file:line`.
    pub(crate) fn import(&mut self, name: &str, file: &str, line: u32) -> Result<Arc<SchemaSet>> {
        match self.locate(Path::new(name)) {
            Some(found) => self.open(&found),
            None => Err(Error::ImportNotFound {
                file: file.to_string(),
                line,
                path: name.to_string(),
            }),
        }
    }

    fn locate(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() || self.search_path.is_empty() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.search_path
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
    }

    fn open(&mut self, path: &Path) -> Result<Arc<SchemaSet>> {
        if self.depth + 1 >= self.max_import_depth {
            return Err(Error::ImportDepthExceeded(self.max_import_depth));
        }
        self.depth += 1;
        let result = self.open_file(path);
        self.depth -= 1;
        result
    }

    fn open_file(&mut self, path: &Path) -> Result<Arc<SchemaSet>> {
        let name = path.display().to_string();
        let id = FileId::of(path)?;
        match self.files.get(&id) {
            Some(FileState::Closed(set)) => {
                debug!("reusing compiled schema {name}");
                return Ok(Arc::clone(set));
            }
            Some(FileState::Failed(e)) => return Err(e.clone()),
            Some(FileState::Open) => {
                let start = self
                    .stack
                    .iter()
                    .position(|(_, open)| open.as_ref() == Some(&id))
                    .unwrap_or(0);
                let mut chain: Vec<String> =
                    self.stack[start..].iter().map(|(n, _)| n.clone()).collect();
                chain.push(name);
                return Err(Error::CircularImport(chain));
            }
            None => {}
        }

        debug!("compiling {name}");
        let text = std::fs::read(path)?;
        self.files.insert(id.clone(), FileState::Open);
        self.stack.push((name.clone(), Some(id.clone())));
        let result = self.compile_text(&text, &name);
        self.stack.pop();
        let state = match &result {
            Ok(set) => FileState::Closed(Arc::clone(set)),
            Err(e) => FileState::Failed(e.clone()),
        };
        self.files.insert(id, state);
        result
    }

    fn compile_text(&mut self, text: &[u8], src_name: &str) -> Result<Arc<SchemaSet>> {
        let lex = Lexer::new(src_name, text);
        let mut unit = parser::parse(self, lex)?;
        resolve::complete(&mut unit)?;
        let buf = unit.spec.encode()?;
        debug!(
            "{src_name}: {} enums, {} messages, {} imports, {} bytes",
            unit.spec.enums.len(),
            unit.spec.messages.len(),
            unit.imports.len(),
            buf.len()
        );
        Ok(Arc::new(SchemaSet::new(buf, unit.imports)?))
    }
}
