use c5c::error::{DriverError, Error, IncludeError, Severity};
use c5c::include::NsItem;
use clap::Parser;
use color_print::{ceprintln, cprintln};
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

#[derive(Debug, clap::Parser)]
#[clap(author, version, about = "C5 compiler: emits x86_64 GNU assembly")]
struct Args {
    /// Input .c5 files, compiled together into one translation unit
    input: Vec<PathBuf>,

    /// Output file
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Stop after emitting assembly
    #[clap(short = 'S')]
    assembly_only: bool,

    /// Prepend an include search path (repeatable)
    #[clap(short = 'I', long = "include")]
    include_paths: Vec<PathBuf>,

    /// Compile to an object file; no main required
    #[clap(long)]
    lib: bool,

    /// Install ./c5include/ into the global include directory
    #[clap(long)]
    setup_libs: bool,

    /// Dump the symbol tables after analysis
    #[clap(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    match run(args) {
        Ok(()) => {}
        Err(err) => {
            ceprintln!("<red>error</red>: {err}");
            let code = match &err {
                Error::Driver(_) | Error::Io(_) => 2,
                Error::Include(IncludeError::Unreadable { .. }) => 2,
                _ => 1,
            };
            exit(code);
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    if args.setup_libs {
        return setup_libs();
    }

    if args.input.is_empty() {
        return Err(DriverError::InputMissing(PathBuf::from("<none>")).into());
    }
    for input in &args.input {
        if input.extension().map_or(true, |e| e != "c5") {
            return Err(DriverError::BadExtension(input.clone()).into());
        }
        if !input.is_file() {
            return Err(DriverError::InputMissing(input.clone()).into());
        }
    }

    // 1. Lex and parse every input, resolving includes, into one
    //    translation unit so local libraries link by simple concatenation.
    let mut resolver = c5c::Resolver::new(args.include_paths.clone());
    let mut items: Vec<NsItem> = Vec::new();
    for input in &args.input {
        let code = std::fs::read_to_string(input)?;
        let tokens = c5c::lex(&input.to_string_lossy(), &code)?;
        let (program, errors) = c5c::parse(&tokens);
        if !errors.is_empty() {
            for err in &errors {
                ceprintln!("<red>error</red>: {err}");
            }
            exit(1);
        }
        let dir = input.parent().unwrap_or(Path::new(".")).to_path_buf();
        items.extend(resolver.expand(program, &dir)?);
    }

    // 2. Semantic analysis; diagnostics print in source order, errors
    //    block code generation.
    let options = c5c::sema::Options {
        require_main: !args.lib,
    };
    let (analysis, diags) = c5c::analyze(items, &options);
    let mut fatal = false;
    for diag in &diags {
        match diag.severity {
            Severity::Error => {
                fatal = true;
                ceprintln!("<red>error</red> {}: {} at {}", diag.code, diag.message, diag.pos);
            }
            Severity::Warning => {
                ceprintln!(
                    "<yellow>warning</yellow> {}: {} at {}",
                    diag.code,
                    diag.message,
                    diag.pos
                );
            }
        }
    }
    if fatal {
        exit(1);
    }
    if args.verbose {
        dump_symbols(&analysis);
    }

    // 3. Code generation.
    let asm = c5c::generate(&analysis);

    let base = args.input[0].with_extension("");
    if args.assembly_only {
        let out = args.output.unwrap_or_else(|| base.with_extension("s"));
        std::fs::write(&out, asm)?;
        cprintln!("<green>ok</green>: assembly written to {}", out.display());
        return Ok(());
    }

    // 4. Hand the listing to the host assembler and linker.
    let asm_file = base.with_extension("tmp.s");
    let obj_file = if args.lib {
        args.output
            .clone()
            .unwrap_or_else(|| base.with_extension("o"))
    } else {
        base.with_extension("tmp.o")
    };
    std::fs::write(&asm_file, asm)?;

    let status = Command::new("gcc")
        .arg("-c")
        .arg(&asm_file)
        .arg("-o")
        .arg(&obj_file)
        .status()?;
    if !status.success() {
        let _ = std::fs::remove_file(&asm_file);
        return Err(DriverError::AssemblerFailed(status.code().unwrap_or(-1)).into());
    }
    std::fs::remove_file(&asm_file)?;

    if args.lib {
        cprintln!("<green>ok</green>: object written to {}", obj_file.display());
        return Ok(());
    }

    let out_file = args.output.unwrap_or(base);
    let status = Command::new("gcc")
        .arg(&obj_file)
        .arg("-o")
        .arg(&out_file)
        .status()?;
    if !status.success() {
        let _ = std::fs::remove_file(&obj_file);
        return Err(DriverError::LinkerFailed(status.code().unwrap_or(-1)).into());
    }
    std::fs::remove_file(&obj_file)?;
    cprintln!("<green>ok</green>: executable ready at {}", out_file.display());
    Ok(())
}

/// Copy ./c5include/ into $HOME/.c5/include/.
fn setup_libs() -> Result<(), Error> {
    let local = PathBuf::from("c5include");
    if !local.is_dir() {
        return Err(DriverError::LibSourceMissing(local).into());
    }
    let home = std::env::var_os("HOME").unwrap_or_default();
    let global = Path::new(&home).join(".c5").join("include");
    std::fs::create_dir_all(&global)?;
    let mut count = 0;
    for entry in std::fs::read_dir(&local)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::copy(entry.path(), global.join(entry.file_name()))?;
            count += 1;
        }
    }
    cprintln!(
        "<green>ok</green>: installed {count} header(s) to {}",
        global.display()
    );
    Ok(())
}

fn dump_symbols(analysis: &c5c::Analysis) {
    cprintln!("<bold>Functions</bold>");
    for (name, sym) in &analysis.funcs {
        let params = sym
            .params
            .iter()
            .map(|(n, t)| format!("{t} {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        if sym.defined {
            cprintln!("  <green>def</green> {} {name}({params}) -> {}", sym.linkage, sym.ret);
        } else {
            cprintln!("  <cyan>ext</cyan> {} {name}({params}) -> {}", sym.linkage, sym.ret);
        }
    }
    cprintln!("<bold>Globals</bold>");
    for (name, sym) in &analysis.globals {
        if sym.is_const {
            cprintln!("  <yellow>const</yellow> {name}: {}", sym.ty);
        } else {
            cprintln!("  <cyan>var</cyan> {name}: {}", sym.ty);
        }
    }
    cprintln!("<bold>Types</bold>");
    for (name, info) in &analysis.types.structs {
        cprintln!("  struct {name}: {} byte(s)", info.size);
    }
    for (name, info) in &analysis.types.unions {
        cprintln!("  type {name}: {} byte(s)", info.size);
    }
    for name in analysis.types.enums.keys() {
        cprintln!("  enum {name}");
    }
}
