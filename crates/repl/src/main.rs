//! comal - Comal 80 compiler and interactive environment.
//!
//! With source files: compile them (and optionally run). Without
//! arguments: the interactive line-numbered editor.

mod editor;
mod session;

use std::path::Path;
use std::process;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};

use comalc::{compile_files, dump, Diagnostics, Executor, NoExecutor, Options};
use editor::ConsoleEditor;
use session::{print_diagnostics, Outcome, Session};

#[derive(Parser)]
#[command(name = "comal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Comal 80 compiler - compile Comal programs or work interactively", long_about = None)]
struct Cli {
    /// Source files (.lst text or .cml tokenised); none enters
    /// interactive mode
    sources: Vec<String>,

    /// Require explicit declarations; disallow '=' standing in for ':='
    #[arg(long)]
    strict: bool,

    /// Report errors by physical source line rather than Comal line
    #[arg(long)]
    ide: bool,

    /// Emit debug info (recognised; used by the code generator)
    #[arg(long)]
    debug: bool,

    /// Warning level 0-4
    #[arg(short = 'w', long = "warn", value_parser = clap::value_parser!(u8).range(0..=4))]
    warn: Option<u8>,

    /// Promote warnings to errors
    #[arg(long)]
    warnaserror: bool,

    /// Dump the parse tree as XML alongside the output
    #[arg(long)]
    dump: bool,

    /// Do not inline intrinsic calls
    #[arg(long)]
    noinline: bool,

    /// Execute after a successful compile
    #[arg(long)]
    run: bool,

    /// Name of the produced executable
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    out: Option<String>,

    /// Generate shell completion scripts and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,

    /// Re-raise internal errors instead of reporting COMPILERFAILURE
    #[arg(long, hide = true)]
    dev: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "comal", &mut std::io::stdout());
        return;
    }

    let mut opts = Options::default();
    if let Ok(cwd) = std::env::current_dir()
        && let Err(e) = opts.load_project_file(&cwd)
    {
        eprintln!("{}", e);
        process::exit(1);
    }

    // Command-line flags win over comal.toml.
    opts.strict |= cli.strict;
    opts.ide |= cli.ide;
    opts.debug |= cli.debug;
    if let Some(warn) = cli.warn {
        opts.warn_level = warn;
    }
    opts.warn_as_error |= cli.warnaserror;
    opts.dump |= cli.dump;
    opts.no_inline |= cli.noinline;
    opts.run |= cli.run;
    if cli.out.is_some() {
        opts.output_file = cli.out;
    }
    opts.source_files = cli.sources;
    opts.interactive = opts.source_files.is_empty();
    opts.dev_mode = cli.dev;

    if opts.interactive {
        run_interactive(opts);
    } else {
        run_batch(&opts);
    }
}

fn run_batch(opts: &Options) {
    let mut diags = Diagnostics::new(opts.warn_level, opts.warn_as_error);
    let program = compile_files(opts, &mut diags);
    print_diagnostics(&diags);

    if diags.has_errors() {
        eprintln!("{}", diags.summary());
        process::exit(1);
    }
    let Some(program) = program else {
        process::exit(1);
    };

    if opts.dump {
        let path = dump_path(opts);
        if let Err(e) = std::fs::write(&path, dump::dump_xml(&program)) {
            eprintln!("Cannot write {}: {}", path, e);
            process::exit(1);
        }
        println!("Parse tree dumped to {}", path);
    }

    if opts.run {
        let mut executor = NoExecutor;
        if let Err(e) = executor.run(&program) {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

/// `<out|first source stem>.xml`.
fn dump_path(opts: &Options) -> String {
    let base = opts
        .output_file
        .clone()
        .or_else(|| {
            opts.source_files.first().map(|f| {
                Path::new(f)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| f.clone())
            })
        })
        .unwrap_or_else(|| "program".to_string());
    format!("{}.xml", base)
}

fn run_interactive(opts: Options) {
    println!("Comal 80 v{}", env!("CARGO_PKG_VERSION"));
    println!("Type BYE to leave.");

    let mut console = match ConsoleEditor::new() {
        Ok(console) => console,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    let mut session = Session::new(opts);

    loop {
        let prompt = session.prompt();
        let Some(input) = console.read(&prompt) else {
            break;
        };
        if session.handle_line(&input, &mut console) == Outcome::Quit {
            break;
        }
    }
    console.save_history();
}
