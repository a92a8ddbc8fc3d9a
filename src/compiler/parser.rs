//! Schema language grammar.
//!
//! ```text
//! schema  = [ "package" fqn ";" ] { "import" string { string } ";" } { enum | message }
//! enum    = "enum" ident "{" ident [ "=" int ] { "," ident [ "=" int ] } [ "," ] "}"
//! message = "message" ident "{" field { field } "}"
//! field   = fqn [ "[" "]" ] ident ";"
//! ```
//!
//! Builtin field types are resolved while parsing. Everything else is
//! recorded by name and resolved in a second pass once all local types are
//! known, so messages may refer to types declared further down.

use std::sync::Arc;

use log::warn;

use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::reflect::lookup_builtin_type;
use crate::schema::{
    EnumSpec, FieldSpec, Kind, MsgSpec, SchemaSet, SchemaSpec, UNRESOLVED_IMPORT_ID,
};
use crate::string::unescape;
use crate::FastHashSet;

use super::CompileSession;

/// Most distinct unresolved type names per file.
const MAX_UNRESOLVED: usize = 32767;
/// Most imports per file; import ids are `index + 1`.
const MAX_IMPORTS: usize = 32767;
/// Most enums, and most messages, per file; type ids are 16-bit indexes.
const MAX_TYPES: usize = 1 << 16;

/// Parse result of one file, before resolution and layout.
#[derive(Debug)]
pub(super) struct Unit {
    pub spec: SchemaSpec,
    pub imports: Vec<Arc<SchemaSet>>,
    /// Type names awaiting resolution, indexed by a pending field's `type_id`.
    pub typenames: Vec<String>,
    /// Declaration line of each message.
    pub msg_lines: Vec<u32>,
}

pub(super) fn parse(session: &mut CompileSession, lex: Lexer<'_>) -> Result<Unit> {
    let src_name = lex.filename().to_string();
    let mut p = SchemaParser {
        session,
        lex,
        tok: Token::Eof,
        unit: Unit {
            spec: SchemaSpec {
                src_name,
                ..SchemaSpec::default()
            },
            imports: Vec::new(),
            typenames: Vec::new(),
            msg_lines: Vec::new(),
        },
        type_names: FastHashSet::default(),
    };
    p.schema()?;
    Ok(p.unit)
}

struct SchemaParser<'s, 'a> {
    session: &'s mut CompileSession,
    lex: Lexer<'a>,
    tok: Token,
    unit: Unit,
    /// Names of all enums and messages declared so far.
    type_names: FastHashSet<String>,
}

impl<'s, 'a> SchemaParser<'s, 'a> {
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

    fn expect_punct(&self, c: u8) -> Result<()> {
        self.expect(Token::Punct(c))
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.tok == Token::Ident && self.lex.text() == kw.as_bytes()
    }

    fn ident(&self) -> String {
        String::from_utf8_lossy(self.lex.text()).into_owned()
    }

    fn duplicate(&self, name: String) -> Error {
        Error::DuplicateDefinition {
            file: self.lex.filename().to_string(),
            line: self.lex.line(),
            name,
        }
    }

    fn schema(&mut self) -> Result<()> {
        self.advance()?;
        if self.at_keyword("package") {
            self.advance()?;
            self.unit.spec.pkg_name = self.fqn()?;
            self.expect_punct(b';')?;
            self.advance()?;
        }
        while self.at_keyword("import") {
            self.import()?;
        }
        loop {
            if self.at_keyword("enum") {
                self.enum_def()?;
            } else if self.at_keyword("message") {
                self.message()?;
            } else {
                break;
            }
        }
        self.expect(Token::Eof)
    }

    /// `ident { "." ident }`; leaves the token after the name current.
    fn fqn(&mut self) -> Result<String> {
        self.expect(Token::Ident)?;
        let mut name = self.ident();
        self.advance()?;
        while self.tok == Token::Punct(b'.') {
            self.advance()?;
            self.expect(Token::Ident)?;
            name.push('.');
            name.push_str(&self.ident());
            self.advance()?;
        }
        Ok(name)
    }

    fn import(&mut self) -> Result<()> {
        if !self.session.imports_enabled() {
            return Err(Error::ImportDisabled {
                file: self.lex.filename().to_string(),
                line: self.lex.line(),
            });
        }
        if self.unit.imports.len() >= MAX_IMPORTS {
            return Err(self.lex.error("too many imports"));
        }
        let line = self.lex.line();
        self.advance()?;
        self.expect(Token::Str)?;
        let mut path = Vec::new();
        while self.tok == Token::Str {
            let text = self.lex.text();
            unescape(&text[1..text.len() - 1], &mut path);
            self.advance()?;
        }
        self.expect_punct(b';')?;
        let path = String::from_utf8(path)
            .map_err(|_| self.lex.error("import path is not valid UTF-8"))?;
        let set = self.session.import(&path, self.lex.filename(), line)?;
        self.unit.imports.push(set);
        self.advance()
    }

    fn enum_def(&mut self) -> Result<()> {
        if self.unit.spec.enums.len() >= MAX_TYPES {
            return Err(self.lex.error("too many enums"));
        }
        self.advance()?;
        self.expect(Token::Ident)?;
        let name = self.ident();
        if !self.type_names.insert(name.clone()) {
            return Err(self.duplicate(name));
        }
        let line = self.lex.line();
        self.advance()?;
        self.expect_punct(b'{')?;
        self.advance()?;
        if self.tok == Token::Punct(b'}') {
            return Err(Error::EmptyDefinition {
                file: self.lex.filename().to_string(),
                line,
                what: "enum",
            });
        }

        let mut values: Vec<(String, i16)> = Vec::new();
        let mut next_value: i64 = 0;
        loop {
            self.expect(Token::Ident)?;
            let symbol = self.ident();
            if values.iter().any(|(s, _)| *s == symbol) {
                return Err(self.duplicate(symbol));
            }
            self.advance()?;
            if self.tok == Token::Punct(b'=') {
                self.advance()?;
                self.expect(Token::Int)?;
                next_value = crate::integer::parse_i64(self.lex.text());
                self.advance()?;
            }
            if i16::try_from(next_value).is_err() {
                warn!(
                    "{}:{}: enum value {next_value} of '{symbol}' is out of range",
                    self.lex.filename(),
                    self.lex.line()
                );
            }
            values.push((symbol, next_value as i16));
            next_value = next_value.saturating_add(1);

            if self.tok != Token::Punct(b',') {
                break;
            }
            self.advance()?;
            if self.tok != Token::Ident {
                break;
            }
        }
        self.expect_punct(b'}')?;
        self.advance()?;
        self.unit.spec.enums.push(EnumSpec { name, values });
        Ok(())
    }

    fn message(&mut self) -> Result<()> {
        if self.unit.spec.messages.len() >= MAX_TYPES {
            return Err(self.lex.error("too many messages"));
        }
        self.advance()?;
        self.expect(Token::Ident)?;
        let name = self.ident();
        if !self.type_names.insert(name.clone()) {
            return Err(self.duplicate(name));
        }
        let line = self.lex.line();
        self.advance()?;
        self.expect_punct(b'{')?;
        self.advance()?;

        let mut fields: Vec<FieldSpec> = Vec::new();
        while self.tok == Token::Ident {
            let field_line = self.lex.line();
            let typename = self.fqn()?;
            let repeated = if self.tok == Token::Punct(b'[') {
                self.advance()?;
                self.expect_punct(b']')?;
                self.advance()?;
                true
            } else {
                false
            };
            self.expect(Token::Ident)?;
            let field_name = self.ident();
            if fields.iter().any(|f| f.name == field_name) {
                return Err(self.duplicate(field_name));
            }
            self.advance()?;
            self.expect_punct(b';')?;
            self.advance()?;

            let field = match lookup_builtin_type(&typename) {
                Some(t) => FieldSpec {
                    name: field_name,
                    kind: t.kind.raw(repeated),
                    type_id: t.type_id,
                    import_id: 0,
                    offset: 0,
                },
                None => FieldSpec {
                    name: field_name,
                    kind: Kind::Void.raw(repeated),
                    type_id: self.pending_type(&typename)?,
                    import_id: UNRESOLVED_IMPORT_ID,
                    // source line until layout assigns the real offset
                    offset: field_line,
                },
            };
            fields.push(field);
        }
        if fields.is_empty() {
            return Err(Error::EmptyDefinition {
                file: self.lex.filename().to_string(),
                line,
                what: "message",
            });
        }
        self.expect_punct(b'}')?;
        self.advance()?;
        self.unit.spec.messages.push(MsgSpec {
            name,
            fields,
            ssize: 0,
            psize: 0,
        });
        self.unit.msg_lines.push(line);
        Ok(())
    }

    /// Index of `typename` in the pending name table.
    fn pending_type(&mut self, typename: &str) -> Result<u16> {
        let names = &mut self.unit.typenames;
        let idx = match names.iter().position(|n| n == typename) {
            Some(i) => i,
            None => {
                if names.len() >= MAX_UNRESOLVED {
                    return Err(self.lex.error("too many unresolved typenames"));
                }
                names.push(typename.to_string());
                names.len() - 1
            }
        };
        u16::try_from(idx).map_err(|_| self.lex.error("too many unresolved typenames"))
    }
}
