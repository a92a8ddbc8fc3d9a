//! packbufc CLI: schema compiler and text/binary message conversion.

use clap::{Args, Parser, Subcommand};
use packbuf::compiler::CompileSession;
use packbuf::text::{self, ParseOptions, PrintOptions};
use packbuf::{io as pio, meta, raw, Buffer, Obj, SchemaSet};
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "packbufc", about = "packbuf schema compiler and message converter")]
struct Cli {
    /// Import search directory (repeatable, searched in order)
    #[arg(short = 'I', long = "include", global = true)]
    include: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a schema into its binary form
    Compile(CompileArgs),
    /// Encode message text to binary
    Encode(MessageArgs),
    /// Decode binary to message text
    Decode(MessageArgs),
    /// Dump the object structure of a binary without a schema
    DecodeRaw(RawArgs),
}

#[derive(Args)]
struct CompileArgs {
    /// Schema file (.pbs)
    schema: PathBuf,

    /// Output file (default: <schema stem>.nb, - = stdout)
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Args)]
struct MessageArgs {
    /// Schema file (.pbs); without it the schema format itself is used
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Message type, bare or package-qualified
    #[arg(short = 't', long = "type")]
    msg_type: Option<String>,

    /// Input file (- for stdin)
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Output file (- for stdout)
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Maximum message nesting depth
    #[arg(long, default_value_t = text::DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

#[derive(Args)]
struct RawArgs {
    /// Input file (- for stdin)
    #[arg(short, long, default_value = "-")]
    input: String,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Compile(args) => run_compile(&cli.include, args),
        Command::Encode(args) => run_encode(&cli.include, args),
        Command::Decode(args) => run_decode(&cli.include, args),
        Command::DecodeRaw(args) => run_decode_raw(args),
    }
}

fn read_input(path: &str) -> Result<Vec<u8>, String> {
    if path == "-" {
        if std::io::stdin().is_terminal() {
            eprintln!("reading from stdin (Ctrl+D to end)...");
        }
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| format!("read error (stdin): {e}"))?;
        Ok(buf)
    } else {
        std::fs::read(path).map_err(|e| format!("read error '{path}': {e}"))
    }
}

fn write_output(path: &str, bytes: &[u8]) -> Result<(), String> {
    if path == "-" {
        let mut out = std::io::stdout().lock();
        out.write_all(bytes)
            .and_then(|()| out.flush())
            .map_err(|e| format!("write error (stdout): {e}"))
    } else {
        std::fs::write(path, bytes).map_err(|e| format!("write error '{path}': {e}"))
    }
}

/// `dir/name.pbs` -> `name.nb`
fn default_output(schema: &Path) -> String {
    let stem = schema
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "schema".to_string());
    format!("{stem}.nb")
}

fn run_compile(include: &[PathBuf], args: CompileArgs) -> Result<(), String> {
    let mut session = CompileSession::new(include.to_vec());
    let set = session.compile_file(&args.schema).map_err(|e| e.to_string())?;
    let output = args.output.unwrap_or_else(|| default_output(&args.schema));
    write_output(&output, set.buffer().as_bytes())
}

/// Compiled schema of the message arguments and the resolved type name.
fn load_schema(
    include: &[PathBuf],
    args: &MessageArgs,
) -> Result<(Arc<SchemaSet>, String), String> {
    match &args.schema {
        Some(path) => {
            let msg_type = args
                .msg_type
                .clone()
                .ok_or("--type is required together with --schema")?;
            let set = CompileSession::new(include.to_vec())
                .compile_file(path)
                .map_err(|e| e.to_string())?;
            Ok((set, msg_type))
        }
        None => {
            let set = meta::schema_set().ok_or("cannot build the meta-schema")?;
            let msg_type = args.msg_type.clone().unwrap_or_else(|| "Schema".to_string());
            Ok((set, msg_type))
        }
    }
}

fn run_encode(include: &[PathBuf], args: MessageArgs) -> Result<(), String> {
    let (set, msg_type) = load_schema(include, &args)?;
    let mdef = set.lookup_message(&msg_type).map_err(|e| e.to_string())?;
    let input = read_input(&args.input)?;
    let opts = ParseOptions::default()
        .with_max_depth(args.max_depth)
        .with_filename(if args.input == "-" { "<stdin>" } else { args.input.as_str() });
    let mut buf = Buffer::new();
    text::parse(&opts, &mut buf, &input, &mdef).map_err(|e| e.to_string())?;
    write_output(&args.output, buf.as_bytes())
}

fn run_decode(include: &[PathBuf], args: MessageArgs) -> Result<(), String> {
    let (set, msg_type) = load_schema(include, &args)?;
    let mdef = set.lookup_message(&msg_type).map_err(|e| e.to_string())?;
    let buf = if args.input == "-" {
        pio::load_reader(&mut std::io::stdin().lock())
    } else {
        pio::load(&args.input)
    }
    .map_err(|e| e.to_string())?;
    let root = Obj::get(buf.as_bytes(), 0)
        .first()
        .ok_or("input does not start with an object")?;
    let opts = PrintOptions::default()
        .with_max_depth(args.max_depth)
        .with_msg_type_header()
        .with_loose_escape();
    let out = text::print_to_vec(&opts, buf.as_bytes(), root, &mdef).map_err(|e| e.to_string())?;
    write_output(&args.output, &out)
}

fn run_decode_raw(args: RawArgs) -> Result<(), String> {
    let input = read_input(&args.input)?;
    let mut out = std::io::stdout().lock();
    raw::dump(&mut out, &input).map_err(|e| e.to_string())?;
    out.flush().map_err(|e| format!("write error (stdout): {e}"))
}
