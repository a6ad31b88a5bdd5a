//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use clap::{self, crate_version, Arg, ArgMatches, Command};
use log::{info, warn, LevelFilter};
use parrot::{
    compile,
    ir::Stream,
    link::{LinkOptions, Linker},
    machine::{Machine, MachineError},
    target::{self, Arch},
    Compilation,
};

use std::{
    fs::{self, File},
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
    process,
};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("Parrot compiler")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .required(true)
                .help("Source file ('-' for stdin)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .required_unless_present("run")
                .help("Output file ('-' along with -S or --ir for stdout)"),
        )
        .arg(
            Arg::new("asm")
                .short('S')
                .help("Generate assembly instead of linking"),
        )
        .arg(
            Arg::new("ir")
                .long("ir")
                .conflicts_with("asm")
                .help("Generate an instruction listing instead of linking"),
        )
        .arg(Arg::new("strip").short('s').help("Strip executables"))
        .arg(
            Arg::new("run")
                .short('r')
                .long("run")
                .conflicts_with_all(&["asm", "ir", "output"])
                .help("Execute the program instead of building it"),
        )
        .arg(
            Arg::new("runtime-dir")
                .long("runtime-dir")
                .takes_value(true)
                .value_name("DIR")
                .env("PARROT_RUNTIME_DIR")
                .help("Directory containing libruntime.a"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Increase log verbosity"),
        )
        .get_matches();

    init_logging(args.occurrences_of("verbose"));

    let input = args.value_of("input").unwrap_or("-");
    let Compilation { stream, warnings } = match read_and_compile(input)? {
        Ok(compilation) => compilation,
        Err(diagnostics) => {
            eprint!("{}", diagnostics);
            process::exit(1);
        }
    };

    if !warnings.is_empty() {
        eprint!("{}", warnings);
    }

    if args.is_present("run") {
        return run(&stream);
    }

    build(&args, &stream)
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // RUST_LOG tiene precedencia sobre -v
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn read_and_compile(input: &str) -> anyhow::Result<Result<Compilation, parrot::error::Diagnostics>> {
    if input == "-" {
        info!("Compiling from stdin");
        return Ok(compile(io::stdin().lock(), "<stdin>"));
    }

    if Path::new(input).extension().and_then(|extension| extension.to_str()) != Some("prrt") {
        warn!("Input file {} does not have the .prrt extension", input);
    }

    info!("Compiling {}", input);

    let file = File::open(input).with_context(|| format!("Failed to open for reading: {}", input))?;
    Ok(compile(BufReader::new(file), input))
}

fn run(stream: &Stream) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();

    let mut machine = Machine::new(stdin.lock(), stdout.lock());
    match machine.run(stream) {
        Ok(()) => Ok(()),

        // Igual que libruntime: mensaje en stderr y el código de falla como estado
        Err(MachineError::Fault(fault)) => {
            eprintln!("Runtime fault: {}", fault);
            process::exit(fault.code() as i32);
        }

        Err(error) => Err(error).context("Execution failed"),
    }
}

fn build(args: &ArgMatches, stream: &Stream) -> anyhow::Result<()> {
    let arch = Arch::X86_64;
    let output = args.value_of("output").unwrap_or("-");

    // Listados sin enlazado
    if args.is_present("ir") {
        return write_to(output, |out| write!(out, "{}", stream));
    } else if args.is_present("asm") {
        return write_to(output, |out| target::emit(stream, arch, out));
    }

    if output == "-" {
        bail!("Refusing to write executable to stdout");
    }

    let mut options = LinkOptions::empty();
    if args.is_present("strip") {
        options |= LinkOptions::STRIP;
    }

    let runtime_dir = match args.value_of("runtime-dir") {
        Some(dir) => PathBuf::from(dir),
        None => default_runtime_dir()?,
    };

    info!("Linking {} against {}", output, runtime_dir.display());

    let mut linker = Linker::spawn(output, &runtime_dir, options).context("Failed to link")?;
    target::emit(stream, arch, linker.stdin()).context("Failed to emit assembly to assembler")?;

    linker
        .finish()
        .with_context(|| format!("Failed to generate executable: {}", output))
}

fn write_to<F>(output: &str, write: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    if output == "-" {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();

        write(&mut stdout).context("Failed to emit to stdout")?;
        return stdout.flush().context("Failed to emit to stdout");
    }

    let mut file =
        File::create(output).with_context(|| format!("Failed to open for writing: {}", output))?;

    write(&mut file).with_context(|| format!("Failed to emit to file: {}", output))
}

/// `lib/` junto al ejecutable del compilador.
fn default_runtime_dir() -> anyhow::Result<PathBuf> {
    let mut library_path =
        fs::read_link("/proc/self/exe").context("Failed to locate the compiler executable")?;

    library_path.pop(); // "<...>/prrtc" => "<...>"
    library_path.push("lib");

    Ok(library_path)
}
