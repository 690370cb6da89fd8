//! mallow: a small expression language with two engines, a bytecode
//! compiler plus stack VM and a tree-walking evaluator.
//!
//! The pipeline is preprocess, lex, parse, then either compile and run on the
//! [`vm::Vm`] or evaluate directly with [`interpreter::Interpreter`].

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, instrument};

pub mod ast;
pub mod code;
pub mod codegen;
pub mod compiler;
pub mod diagnostic;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod value;
pub mod vm;

use ast::Program;
use preprocess::Preprocessor;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Preprocess(#[from] preprocess::PreprocessError),
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error("{} parse error(s); first: {}", .0.len(), .0.first().map(|e| e.message.as_str()).unwrap_or(""))]
    Parse(Vec<parser::ParseError>),
    #[error(transparent)]
    Compile(#[from] compiler::CompileError),
    #[error(transparent)]
    Vm(#[from] vm::VmError),
    #[error(transparent)]
    Runtime(#[from] interpreter::RuntimeError),
}

impl From<Vec<parser::ParseError>> for Error {
    fn from(errors: Vec<parser::ParseError>) -> Self {
        Error::Parse(errors)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which engine executes a parsed program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Engine {
    /// Compile to bytecode and run on the stack VM.
    #[default]
    Vm,
    /// Walk the AST directly; supports strings, `and`/`or` and closures.
    Eval,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub engine: Engine,
    pub std_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions { engine: Engine::Vm, std_dir: PathBuf::from("std") }
    }
}

/// Lex and parse already-preprocessed source.
pub fn parse_source(source: &str) -> Result<Program> {
    let tokens = lexer::lex(source)?;
    Ok(parser::parse(tokens)?)
}

/// Expand includes and comments, returning the text the parser sees.
pub fn expand(source: &str, opts: &RunOptions) -> Result<String> {
    Ok(Preprocessor::new(&opts.std_dir).expand(source)?)
}

/// Run a parsed program on `engine`, reporting each displayed value.
#[instrument(skip(program, on_value))]
pub fn execute(program: &Program, engine: Engine, mut on_value: impl FnMut(&dyn fmt::Display)) -> Result<()> {
    match engine {
        Engine::Vm => {
            let bytecode = compiler::compile(program)?;
            debug!(bytes = bytecode.instructions.len(), constants = bytecode.constants.len(), "compiled");
            vm::Vm::new(bytecode).run_with(|v| on_value(v))?;
        }
        Engine::Eval => {
            interpreter::Interpreter::new().run_with(program, |v| on_value(v))?;
        }
    }
    Ok(())
}

/// Preprocess, parse and run `source`.
pub fn run_source(source: &str, opts: &RunOptions, on_value: impl FnMut(&dyn fmt::Display)) -> Result<()> {
    let expanded = expand(source, opts)?;
    let program = parse_source(&expanded)?;
    execute(&program, opts.engine, on_value)
}

/// Run `source` and collect the displayed lines.
pub fn run_to_lines(source: &str, opts: &RunOptions) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    run_source(source, opts, |v| lines.push(v.to_string()))?;
    Ok(lines)
}
