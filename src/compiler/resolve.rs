//! Second compiler pass: type resolution and message layout.

use crate::error::{Error, Result};
use crate::header::{MAX_PSIZE, MAX_SSIZE};
use crate::reflect::{lookup_builtin_type, lookup_defined_type, TypeRef, ENUM_SIZE};
use crate::schema::{Kind, MsgSpec, KIND_ARR, UNRESOLVED_IMPORT_ID};

use super::parser::Unit;

/// Resolves every pending field type, then assigns offsets and sizes.
pub(super) fn complete(unit: &mut Unit) -> Result<()> {
    for mi in 0..unit.spec.messages.len() {
        for fi in 0..unit.spec.messages[mi].fields.len() {
            let field = &unit.spec.messages[mi].fields[fi];
            if field.import_id != UNRESOLVED_IMPORT_ID {
                continue;
            }
            let name = &unit.typenames[field.type_id as usize];
            let repeated = field.kind & KIND_ARR != 0;
            let found = resolve_type(unit, name).map_err(|what| {
                Error::syntax(&unit.spec.src_name, field.offset, format!("'{name}': {what}"))
            })?;
            let Some((import_id, t)) = found else {
                return Err(Error::UnresolvedType {
                    file: unit.spec.src_name.clone(),
                    line: field.offset,
                    name: name.clone(),
                });
            };
            let field = &mut unit.spec.messages[mi].fields[fi];
            field.kind = t.kind.raw(repeated);
            field.type_id = t.type_id;
            field.import_id = import_id;
        }
    }
    for (m, line) in unit.spec.messages.iter_mut().zip(&unit.msg_lines) {
        layout(m).map_err(|what| {
            Error::syntax(&unit.spec.src_name, *line, format!("message '{}' {what}", m.name))
        })?;
    }
    Ok(())
}

/// Looks `name` up as a builtin, a local type, or a type of an import
/// whose package matches the qualifier. A bare name is qualified with the
/// current package. Returns the import id and the type.
fn resolve_type(
    unit: &Unit,
    name: &str,
) -> core::result::Result<Option<(u16, TypeRef)>, &'static str> {
    let (qualifier, base) = match name.rfind('.') {
        Some(dot) => (Some(&name[..dot]), &name[dot + 1..]),
        None => (None, name),
    };
    let pkg = unit.spec.pkg_name.as_str();
    if qualifier.is_none() {
        if let Some(t) = lookup_builtin_type(name) {
            return Ok(Some((0, t)));
        }
    }
    if qualifier.is_none() || qualifier == Some(pkg) {
        if let Some(t) = lookup_local(unit, base)? {
            return Ok(Some((0, t)));
        }
    }
    let want = qualifier.unwrap_or(pkg);
    for (i, import) in unit.imports.iter().enumerate() {
        let schema = import.schema();
        if schema.pkg_name() != want {
            continue;
        }
        if let Some(t) = lookup_defined_type(&schema, base) {
            let import_id = u16::try_from(i + 1).map_err(|_| "import id out of range")?;
            return Ok(Some((import_id, t)));
        }
    }
    Ok(None)
}

fn lookup_local(unit: &Unit, name: &str) -> core::result::Result<Option<TypeRef>, &'static str> {
    let type_id = |i: usize| u16::try_from(i).map_err(|_| "type id out of range");
    if let Some(i) = unit.spec.enums.iter().position(|e| e.name == name) {
        return Ok(Some(TypeRef {
            kind: Kind::Enum,
            type_id: type_id(i)?,
        }));
    }
    match unit.spec.messages.iter().position(|m| m.name == name) {
        Some(i) => Ok(Some(TypeRef {
            kind: Kind::Msg,
            type_id: type_id(i)?,
        })),
        None => Ok(None),
    }
}

#[inline]
fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Assigns pointer slots in declaration order and packs scalars at their
/// natural alignment (capped at 4), padding the scalar region to the
/// largest alignment used, or to 4 when the message has pointers.
fn layout(m: &mut MsgSpec) -> core::result::Result<(), &'static str> {
    let mut ssize = 0usize;
    let mut psize = 0usize;
    let mut max_align = 0usize;
    for f in &mut m.fields {
        let repeated = f.kind & KIND_ARR != 0;
        let kind = Kind::from_raw(f.kind & !KIND_ARR).ok_or("has a field of unknown kind")?;
        if repeated || kind.is_pointer() {
            f.offset = u32::try_from(psize).map_err(|_| "has too many pointer fields")?;
            psize += 1;
            continue;
        }
        let size = if kind == Kind::Enum { ENUM_SIZE } else { 1 << f.type_id };
        let align = size.min(4);
        max_align = max_align.max(align);
        ssize = align_up(ssize, align);
        f.offset = u32::try_from(ssize).map_err(|_| "exceeds the maximum scalar size")?;
        ssize += size;
    }
    if psize > 0 {
        max_align = 4;
    }
    if max_align > 0 {
        ssize = align_up(ssize, max_align);
    }
    if ssize > MAX_SSIZE {
        return Err("exceeds the maximum scalar size");
    }
    if psize > MAX_PSIZE {
        return Err("has too many pointer fields");
    }
    m.ssize = u16::try_from(ssize).map_err(|_| "exceeds the maximum scalar size")?;
    m.psize = u16::try_from(psize).map_err(|_| "has too many pointer fields")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::compiler::CompileSession;
    use crate::error::Error;
    use crate::schema::Kind;

    fn sizes(src: &str, msg: &str) -> (usize, usize) {
        let set = CompileSession::isolated().compile_str(src, "t.pbs").unwrap();
        let m = set.lookup_message(msg).unwrap();
        (m.ssize(), m.psize())
    }

    #[test]
    fn scalar_packing() {
        assert_eq!(sizes("message M { uint8 a; uint32 b; }", "M"), (8, 0));
        assert_eq!(sizes("message M { uint8 a; uint8 b; uint16 c; }", "M"), (4, 0));
        assert_eq!(sizes("message M { uint8 a; }", "M"), (1, 0));
        assert_eq!(sizes("message M { uint8 a; uint64 b; }", "M"), (12, 0));
        assert_eq!(sizes("message M { uint8 a; string s; }", "M"), (4, 1));
        assert_eq!(sizes("message M { string s; bool[] b; }", "M"), (0, 2));
    }

    #[test]
    fn offsets_follow_declaration_order() {
        let set = CompileSession::isolated()
            .compile_str(
                "enum E { A } message M { bool a; E e; string s; double d; M[] kids; }",
                "t.pbs",
            )
            .unwrap();
        let m = set.lookup_message("M").unwrap();
        let got: Vec<(Option<Kind>, bool, usize)> =
            m.fields().map(|f| (f.kind(), f.is_repeated(), f.offset())).collect();
        assert_eq!(
            got,
            vec![
                (Some(Kind::Bool), false, 0),
                (Some(Kind::Enum), false, 2),
                (Some(Kind::Str), false, 0),
                (Some(Kind::Float), false, 4),
                (Some(Kind::Msg), true, 1),
            ]
        );
        assert_eq!((m.ssize(), m.psize()), (12, 2));
    }

    #[test]
    fn forward_references_resolve() {
        let set = CompileSession::isolated()
            .compile_str(
                "package p; message A { B b; p.C c; } message B { bool x; } enum C { Z }",
                "t.pbs",
            )
            .unwrap();
        let a = set.lookup_message("A").unwrap();
        let f: Vec<_> = a.fields().collect();
        assert_eq!((f[0].kind(), f[0].type_id(), f[0].import_id()), (Some(Kind::Msg), 1, 0));
        assert_eq!((f[1].kind(), f[1].type_id()), (Some(Kind::Enum), 0));
    }

    #[test]
    fn unresolved_type_names_line() {
        let err = CompileSession::isolated()
            .compile_str("message A {\n  bool ok;\n  Missing m;\n}", "t.pbs")
            .unwrap_err();
        assert_eq!(
            err,
            Error::UnresolvedType {
                file: "t.pbs".into(),
                line: 3,
                name: "Missing".into()
            }
        );
    }

    #[test]
    fn foreign_qualifier_without_import_fails() {
        let err = CompileSession::isolated()
            .compile_str("package p; message A { q.B b; } message B { bool x; }", "t.pbs")
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedType { name, .. } if name == "q.B"));
    }

    #[test]
    fn too_many_scalars() {
        let fields: String = (0..5000).map(|i| format!("uint64 f{i};")).collect();
        let err = CompileSession::isolated()
            .compile_str(&format!("message Big {{ {fields} }}"), "t.pbs")
            .unwrap_err();
        assert!(err.to_string().contains("maximum scalar size"), "{err}");
    }
}
