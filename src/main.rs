use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use mallow::diagnostic::{Diagnostic, ansi::AnsiRenderer, json, registry};
use mallow::{Engine, RunOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// The parsed program as JSON.
    Ast,
    /// Disassembled bytecode and constant pool.
    Bytecode,
}

#[derive(Parser, Debug)]
#[command(name = "mallow", version)]
#[command(about = "Run mallow programs on the bytecode VM or the tree-walking evaluator")]
struct Cli {
    /// Source file to run; `-` reads standard input
    #[arg(conflicts_with = "code")]
    file: Option<PathBuf>,

    /// Run this source text instead of a file
    #[arg(short = 'c', long)]
    code: Option<String>,

    /// Execution engine
    #[arg(long, value_enum, default_value_t = Engine::Vm)]
    engine: Engine,

    /// Print an intermediate form instead of running
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Directory searched by `include "name"`
    #[arg(long, env = "MALLOW_STD_DIR", default_value = "std")]
    std_dir: PathBuf,

    /// Report diagnostics as JSON lines on stderr
    #[arg(long)]
    json: bool,

    /// Disable colored diagnostics
    #[arg(long)]
    no_color: bool,

    /// Print the explanation for an error code and exit
    #[arg(long, value_name = "CODE")]
    explain: Option<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("MALLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct Reporter {
    json: bool,
    renderer: AnsiRenderer,
}

impl Reporter {
    fn report(&self, d: Diagnostic) {
        if self.json {
            eprintln!("{}", json::render(&d));
        } else {
            eprint!("{}", self.renderer.render(&d));
        }
    }
}

fn read_input(cli: &Cli) -> Result<String, Diagnostic> {
    if let Some(code) = &cli.code {
        return Ok(code.clone());
    }
    match cli.file.as_deref() {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .map_err(|e| Diagnostic::error(format!("cannot read {}: {}", path.display(), e))),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| Diagnostic::error(format!("cannot read standard input: {}", e)))?;
            Ok(buf)
        }
    }
}

/// Returns the expanded source alongside any error so diagnostics can quote it.
fn run(cli: &Cli, source: &str) -> Result<(), (mallow::Error, Option<String>)> {
    let opts = RunOptions { engine: cli.engine, std_dir: cli.std_dir.clone() };
    let expanded = mallow::expand(source, &opts).map_err(|e| (e, None))?;
    let program = mallow::parse_source(&expanded).map_err(|e| (e, Some(expanded.clone())))?;
    debug!(statements = program.statements.len(), engine = ?opts.engine, "parsed");

    let with_source = |e: mallow::Error| (e, Some(expanded.clone()));
    match cli.emit {
        Some(Emit::Ast) => match serde_json::to_string_pretty(&program) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("cannot serialize AST: {}", e),
        },
        Some(Emit::Bytecode) => {
            let bytecode = mallow::compiler::compile(&program).map_err(|e| with_source(e.into()))?;
            print!("{}", bytecode);
        }
        None => mallow::execute(&program, opts.engine, |v| println!("{}", v)).map_err(with_source)?,
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let use_color = !cli.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    let reporter = Reporter { json: cli.json, renderer: AnsiRenderer { use_color } };

    if let Some(code) = &cli.explain {
        return match registry::lookup(code) {
            Some(entry) => {
                print!("{}", entry.long);
                ExitCode::SUCCESS
            }
            None => {
                reporter.report(Diagnostic::error(format!("unknown error code '{}'", code)));
                ExitCode::FAILURE
            }
        };
    }

    let source = match read_input(&cli) {
        Ok(s) => s,
        Err(d) => {
            reporter.report(d);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &source) {
        Ok(()) => ExitCode::SUCCESS,
        Err((e, expanded)) => {
            let mut d = Diagnostic::from(&e);
            if let Some(text) = expanded {
                d = d.with_source(text);
            }
            reporter.report(d);
            ExitCode::FAILURE
        }
    }
}
