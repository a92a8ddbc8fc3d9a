//! End-to-end tests of the text format: schema text → compiled schema →
//! message text → binary → message text.

use packbuf::compiler::CompileSession;
use packbuf::reflect::{alloc_msg, FieldType};
use packbuf::text::{self, ParseOptions, PrintOptions};
use packbuf::{Buffer, Error, MsgDef, Obj, SchemaSet, TypeKind};
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

const TEXT_SCHEMA: &str = "/** some long \n \
comments **/\n\
package test;\
enum TriState {\
  UNKNOWN = -1, FALSE, TRUE # some comments\n\
}\
message Msg { // some comments\n\
  TriState a;\
  TriState[] b;\
  uint8 c;\
  int8[] d;\
  uint16 e;\
  int16[] f;\
  uint32 g;\
  int32[] h;\
  uint64 i;\
  int64[] j;\
  float k;\
  double[] l;\
  string m;\
  string[] n;\
  SubMsg o;\
  SubMsg[] p;\
}\
message SubMsg {\
  bool a;\
  bool[] b;\
  Msg c;\
}";

const INPUT: &str = "b:UNKNOWN \
b:1 \
b:FALSE \
b:-99 \
c:0xfe \
d:-128 \
d:0177 \
e:0xfffe \
f:-32768 \
f:077777 \
g:0xfffdfffe \
h:-2147483648 \
h:017777777777 \
i:0xfffbfffcfffdfffe \
j:-9223372036854775808 \
j:777777777777777777777 \
k:1 \
l:2.7182818 \
l:-3.1415927e+16 \
m:\"str\" \"cat\"\
n:\"multi\\nline\"\
n:\"escape\\000d\"\
n:\"\"\
o{}\
p{a: true b: false b: true}\
p{c{a:TRUE}}";

const EXPECTED: &str = "# test.Msg\n\
a: FALSE \
b: UNKNOWN \
b: TRUE \
b: FALSE \
b: -99 \
c: 254 \
d: -128 \
d: 127 \
e: 65534 \
f: -32768 \
f: 32767 \
g: 4294836222 \
h: -2147483648 \
h: 2147483647 \
i: 18445618160917676030 \
j: -9223372036854775808 \
j: 9223372036854775807 \
k: 1 \
l: 2.7182818 \
l: -3.1415927e+16 \
m: \"strcat\" \
n: \"multi\\nline\" \
n: \"escape\\0d\" \
n: \"\" \
o { a: false } \
p { a: true b: false b: true } \
p { a: false c { a: TRUE c: 0 e: 0 g: 0 i: 0 k: 0 m: \"\" } } ";

fn schema() -> Arc<SchemaSet> {
    CompileSession::isolated()
        .compile_str(TEXT_SCHEMA, "test.pbs")
        .unwrap_or_else(|e| panic!("Schema-Fehler: {e}"))
}

fn parse_with(set: &SchemaSet, opts: &ParseOptions, input: &str) -> Result<(Buffer, Obj), Error> {
    let mdef = set.lookup_message("Msg")?;
    let mut buf = Buffer::new();
    let obj = text::parse(opts, &mut buf, input.as_bytes(), &mdef)?;
    Ok((buf, obj))
}

fn print_with(set: &SchemaSet, opts: &PrintOptions, buf: &Buffer, obj: Obj) -> String {
    let mdef = set.lookup_message("Msg").unwrap_or_else(|e| panic!("{e}"));
    let out = text::print_to_vec(opts, buf.as_bytes(), obj, &mdef)
        .unwrap_or_else(|e| panic!("Print-Fehler: {e}"));
    String::from_utf8(out).unwrap_or_else(|e| panic!("{e}"))
}

fn one_line() -> PrintOptions {
    PrintOptions::default().with_indent(-1).with_msg_type_header()
}

// ============================================================================
// Parse → Print
// ============================================================================

#[test]
fn parse_print_all_field_kinds() {
    let set = schema();
    let opts = ParseOptions::default().with_filename("<test input>");
    let (buf, obj) = parse_with(&set, &opts, INPUT).unwrap_or_else(|e| panic!("Parse-Fehler: {e}"));
    assert!(!buf.has_pending());
    assert_eq!(print_with(&set, &one_line(), &buf, obj), EXPECTED);
}

#[test]
fn root_is_readable_from_offset_zero() {
    let set = schema();
    let (buf, obj) = parse_with(&set, &ParseOptions::default(), INPUT).unwrap();
    let root = Obj::get(buf.as_bytes(), 0).first().unwrap();
    assert_eq!(root, obj);
}

#[test]
fn scalar_only_input() {
    let set = schema();
    let (buf, obj) = parse_with(&set, &ParseOptions::default(), "c:0xfe").unwrap();
    assert_eq!(
        print_with(&set, &PrintOptions::default().with_indent(-1), &buf, obj),
        "a: FALSE c: 254 e: 0 g: 0 i: 0 k: 0 m: \"\" "
    );
}

#[test]
fn indented_output_reparses_identically() {
    let set = schema();
    let (buf, obj) = parse_with(&set, &ParseOptions::default(), INPUT).unwrap();
    let pretty = print_with(&set, &PrintOptions::default(), &buf, obj);
    assert!(pretty.contains("\np {\n  a: false\n  c {\n    a: TRUE\n"), "{pretty}");

    let (buf2, obj2) = parse_with(&set, &ParseOptions::default(), &pretty)
        .unwrap_or_else(|e| panic!("Reparse-Fehler: {e}\n{pretty}"));
    assert_eq!(print_with(&set, &PrintOptions::default(), &buf2, obj2), pretty);
    assert_eq!(print_with(&set, &one_line(), &buf2, obj2), EXPECTED);
}

#[test]
fn semicolons_are_optional_separators() {
    let set = schema();
    let input = "c: 1; d: 1; d: 2; m: \"x\";";
    let (buf, obj) = parse_with(&set, &ParseOptions::default(), input).unwrap();
    assert_eq!(
        print_with(&set, &PrintOptions::default().with_indent(-1), &buf, obj),
        "a: FALSE c: 1 d: 1 d: 2 e: 0 g: 0 i: 0 k: 0 m: \"x\" "
    );
}

// ============================================================================
// Fehlerfaelle
// ============================================================================

#[test]
fn bad_inputs_are_rejected() {
    let set = schema();
    let cases = [
        ("bad enum", "a: true"),
        ("bad number", "c:1d:2"),
        ("bad bool", "o { a: FALSE }"),
        ("bad int", "c: 1.414"),
        ("bad float", "k: false"),
        ("bad string", "m: 0"),
        ("bad scalar", "b { false }"),
        ("bad field", "xyzzy: 0"),
        ("bad msg", "o: 0"),
        ("nonterminating msg", "o { a: true"),
        ("nonterminating string", "m: \"bad string..."),
        ("nonterminating comment", "m: /*bad comment..."),
        ("scattered repeated field", "d: 0 c: 1 d: 2"),
    ];
    let mut buf = Buffer::new();
    let mdef = set.lookup_message("Msg").unwrap();
    let opts = ParseOptions::default().with_filename("<test input>");
    for (name, input) in cases {
        let r = text::parse(&opts, &mut buf, input.as_bytes(), &mdef);
        assert!(r.is_err(), "{name}: {input:?} was accepted");
        assert!(buf.is_empty(), "{name}: buffer not rolled back");
    }
}

#[test]
fn error_messages_carry_file_and_line() {
    let set = schema();
    let opts = ParseOptions::default().with_filename("<test input>");
    let err = parse_with(&set, &opts, "c: 1\n\nk: false").unwrap_err();
    assert_eq!(err.line(), Some(3));
    assert!(err.to_string().starts_with("<test input>:3:"), "{err}");

    let err = parse_with(&set, &opts, "xyzzy: 0").unwrap_err();
    assert!(matches!(err, Error::UnknownField { ref name, .. } if name == "xyzzy"), "{err}");
}

// ============================================================================
// Tiefenbegrenzung
// ============================================================================

#[test]
fn depth_limit_of_nested_fixture() {
    let set = schema();
    let err = parse_with(&set, &ParseOptions::default().with_max_depth(1), INPUT).unwrap_err();
    assert_eq!(err, Error::DepthLimitExceeded(1));
    assert!(parse_with(&set, &ParseOptions::default().with_max_depth(4), INPUT).is_ok());
}

#[test]
fn default_depth_limit() {
    let set = CompileSession::isolated()
        .compile_str("message Node { Node next; uint32 n; }", "node.pbs")
        .unwrap();
    let node = set.lookup_message("Node").unwrap();
    let nested = |levels: usize| format!("{}{}", "next { ".repeat(levels), "} ".repeat(levels));

    // root plus 499 nested messages
    let defaults = ParseOptions::default();
    let mut buf = Buffer::new();
    let obj = text::parse(&defaults, &mut buf, nested(499).as_bytes(), &node).unwrap();

    let mut buf2 = Buffer::new();
    let err = text::parse(&defaults, &mut buf2, nested(500).as_bytes(), &node).unwrap_err();
    assert_eq!(err, Error::DepthLimitExceeded(text::DEFAULT_MAX_DEPTH));
    assert!(buf2.is_empty());

    let opts = ParseOptions::default().with_max_depth(502);
    assert!(text::parse(&opts, &mut buf2, nested(500).as_bytes(), &node).is_ok());

    // printer stops at its own limit and marks the cut
    let one_line = PrintOptions::default().with_indent(-1);
    let out = text::print_to_vec(&one_line, buf.as_bytes(), obj, &node).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(!out.contains("depth limit"));
    let out = text::print_to_vec(
        &PrintOptions::default().with_indent(-1).with_max_depth(3),
        buf.as_bytes(),
        obj,
        &node,
    )
    .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "next { next { next { /* print depth limit (3) exceeded */ } n: 0 } n: 0 } n: 0 "
    );
}

#[test]
fn zero_depth_means_default_limit() {
    let set = schema();
    let (buf, obj) = parse_with(&set, &ParseOptions::default().with_max_depth(0), INPUT)
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(print_with(&set, &one_line().with_max_depth(0), &buf, obj), EXPECTED);

    let set = CompileSession::isolated()
        .compile_str("message Node { Node next; }", "node.pbs")
        .unwrap();
    let node = set.lookup_message("Node").unwrap();
    let opts = ParseOptions::default().with_max_depth(0);
    let mut buf = Buffer::new();
    let deep = format!("{}{}", "next { ".repeat(500), "} ".repeat(500));
    let err = text::parse(&opts, &mut buf, deep.as_bytes(), &node).unwrap_err();
    assert_eq!(err, Error::DepthLimitExceeded(text::DEFAULT_MAX_DEPTH));
}

// ============================================================================
// Schema-Evolution
// ============================================================================

#[test]
fn old_reader_ignores_new_fields() {
    let v2 = CompileSession::isolated()
        .compile_str(
            "package evo; message M { uint32 a; string s; uint64 extra; string[] more; }",
            "v2.pbs",
        )
        .unwrap();
    let v1 = CompileSession::isolated()
        .compile_str("package evo; message M { uint32 a; string s; }", "v1.pbs")
        .unwrap();
    let m2 = v2.lookup_message("evo.M").unwrap();
    let m1 = v1.lookup_message("M").unwrap();

    let mut buf = Buffer::new();
    let obj = text::parse(
        &ParseOptions::default(),
        &mut buf,
        b"a: 5 s: \"hi\" extra: 9 more: \"x\"",
        &m2,
    )
    .unwrap();
    let one_line = PrintOptions::default().with_indent(-1);
    let out = text::print_to_vec(&one_line, buf.as_bytes(), obj, &m1).unwrap();
    assert_eq!(out, b"a: 5 s: \"hi\" ");

    // and a new reader of old data sees zero scalars and absent pointers
    let mut old = Buffer::new();
    let obj = text::parse(&ParseOptions::default(), &mut old, b"a: 5", &m1).unwrap();
    let out = text::print_to_vec(&one_line, old.as_bytes(), obj, &m2).unwrap();
    assert_eq!(out, b"a: 5 s: \"\" ");
}

// ============================================================================
// Gleitkomma
// ============================================================================

/// Schreibt `d` und `f` direkt in eine Nachricht, druckt sie einzeilig und
/// liest den Text wieder ein.
fn float_round_trip(d: f64, f: f32) -> (String, f64, f32) {
    let set = CompileSession::isolated()
        .compile_str("message M { double d; float f; }", "floats.pbs")
        .unwrap();
    let mdef = set.lookup_message("M").unwrap();
    let d_at = mdef.lookup_field(b"d").unwrap().offset();
    let f_at = mdef.lookup_field(b"f").unwrap().offset();

    let mut buf = Buffer::new();
    let obj = alloc_msg(&mut buf, &mdef).unwrap();
    buf.set_f64(obj, d_at, d).unwrap();
    buf.set_f32(obj, f_at, f).unwrap();
    let opts = PrintOptions::default().with_indent(-1);
    let out = text::print_to_vec(&opts, buf.as_bytes(), obj, &mdef).unwrap();
    let out = String::from_utf8(out).unwrap();

    let mut back = Buffer::new();
    let obj = text::parse(&ParseOptions::default(), &mut back, out.as_bytes(), &mdef)
        .unwrap_or_else(|e| panic!("Reparse-Fehler: {e}\n{out}"));
    let bytes = back.as_bytes();
    (out, obj.get_f64(bytes, d_at), obj.get_f32(bytes, f_at))
}

#[test]
fn floats_read_back_bit_exact() {
    let (out, _, _) = float_round_trip(0.1 + 0.2, f32::MIN_POSITIVE);
    assert_eq!(out, "d: 0.30000000000000004 f: 1.1754944e-38 ");

    let cases = [
        (0.1 + 0.2, f32::MIN_POSITIVE),
        (f64::MIN_POSITIVE, 0.1 + 0.2),
        (5e-324, 1e-45),
        (-1e300, f32::MAX),
        (f64::MAX, -16_777_215.0),
        (-0.0, -0.0),
        (123_456_789.0, 0.1),
        (1.0 / 3.0, 2.0 / 3.0),
    ];
    for (d, f) in cases {
        let (out, d2, f2) = float_round_trip(d, f);
        assert_eq!(d2.to_bits(), d.to_bits(), "{out}");
        assert_eq!(f2.to_bits(), f.to_bits(), "{out}");
    }
}

#[test]
fn non_finite_floats_read_back() {
    let (out, d, f) = float_round_trip(f64::NAN, f32::INFINITY);
    assert_eq!(out, "d: nan f: inf ");
    assert!(d.is_nan());
    assert_eq!(f, f32::INFINITY);

    let (out, d, f) = float_round_trip(f64::NEG_INFINITY, f32::NAN);
    assert_eq!(out, "d: -inf f: nan ");
    assert_eq!(d, f64::NEG_INFINITY);
    assert!(f.is_nan());
}

#[test]
fn float_words_ignore_case() {
    let set = CompileSession::isolated()
        .compile_str("message M { double d; float f; }", "floats.pbs")
        .unwrap();
    let mdef = set.lookup_message("M").unwrap();
    let parse = |input: &str| {
        let mut buf = Buffer::new();
        text::parse(&ParseOptions::default(), &mut buf, input.as_bytes(), &mdef)
            .map(|obj| (obj.get_f64(buf.as_bytes(), 0), obj.get_f32(buf.as_bytes(), 8)))
    };
    assert_eq!(parse("d: -Infinity f: INF").unwrap(), (f64::NEG_INFINITY, f32::INFINITY));
    let (d, f) = parse("d: NaN; f: -inf;").unwrap();
    assert!(d.is_nan());
    assert_eq!(f, f32::NEG_INFINITY);

    for bad in ["d: infinite", "d: - 1", "d: -", "f: -nanx", "f: true", "d: -\"inf\""] {
        assert!(parse(bad).is_err(), "{bad:?} was accepted");
    }
}

// ============================================================================
// Zufallswerte
// ============================================================================

const SCALARS: &str = "package rnd;
enum Level { LOW = -2, MID, HIGH = 1000 }
message Scalars {
    bool flag; uint8 u8v; int8 i8v; uint16 u16v; int16 i16v;
    uint32 u32v; int32 i32v; uint64 u64v; int64 i64v;
    float f32v; double f64v; Level level;
    bool[] flags; int8[] i8s; uint16[] u16s; int32[] i32s; uint64[] u64s;
    float[] f32s; double[] f64s; Level[] levels;
}";

/// xorshift64, reproduzierbar ohne externe Abhaengigkeit.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Zufaellige Bytes fuer einen Skalar; Gleitkommawerte treffen
    /// gelegentlich Sonderfaelle.
    fn scalar(&mut self, kind: &TypeKind<'_>, size: usize) -> Vec<u8> {
        const EDGES: [f64; 8] = [
            0.0,
            -0.0,
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::MIN_POSITIVE,
            5e-324,
            f64::MAX,
        ];
        let bits = self.next();
        let edge = (bits % 4 == 0).then(|| EDGES[(bits >> 8) as usize % EDGES.len()]);
        match (kind, edge) {
            (TypeKind::Float(4), Some(v)) => (v as f32).to_le_bytes().to_vec(),
            (TypeKind::Float(_), Some(v)) => v.to_le_bytes().to_vec(),
            _ => self.next().to_le_bytes()[..size].to_vec(),
        }
    }
}

fn random_message(rng: &mut XorShift, buf: &mut Buffer, mdef: &MsgDef<'_>) -> Obj {
    let root = alloc_msg(buf, mdef).unwrap();
    for fdef in mdef.fields() {
        let FieldType { kind, repeated } = fdef.field_type().unwrap();
        let size = kind.scalar_size().unwrap();
        if repeated {
            let len = 1 + (rng.next() % 4) as usize;
            let arr = buf.alloc_arr(size, 0, len).unwrap();
            for i in 0..len {
                let elem = arr.advance(i).unwrap();
                buf.set_scalar(elem, 0, &rng.scalar(&kind, size)).unwrap();
            }
            buf.set_ptr(root, fdef.offset(), arr).unwrap();
        } else {
            buf.set_scalar(root, fdef.offset(), &rng.scalar(&kind, size)).unwrap();
        }
    }
    root
}

#[test]
fn random_scalars_print_parse_print_identically() {
    let set = CompileSession::isolated()
        .compile_str(SCALARS, "rnd.pbs")
        .unwrap_or_else(|e| panic!("Schema-Fehler: {e}"));
    let mdef = set.lookup_message("Scalars").unwrap();
    let opts = PrintOptions::default().with_indent(-1);
    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);

    for round in 0..500 {
        let mut buf = Buffer::new();
        let obj = random_message(&mut rng, &mut buf, &mdef);
        let first = text::print_to_vec(&opts, buf.as_bytes(), obj, &mdef).unwrap();
        let first = String::from_utf8(first).unwrap();

        let mut back = Buffer::new();
        let obj = text::parse(&ParseOptions::default(), &mut back, first.as_bytes(), &mdef)
            .unwrap_or_else(|e| panic!("Runde {round}: {e}\n{first}"));
        let second = text::print_to_vec(&opts, back.as_bytes(), obj, &mdef).unwrap();
        assert_eq!(String::from_utf8(second).unwrap(), first, "Runde {round}");
    }
}
