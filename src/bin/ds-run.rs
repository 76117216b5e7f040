//! ds-run - Execute a Datascript source file
//!
//! A thin CLI wrapper over [`datascript::Interpreter`]/[`datascript::Parser`]
//! for manually exercising the interpreter during development. Process entry
//! and argument handling beyond this are out of this crate's scope (see
//! SPEC_FULL.md §1); this binary exists only as a development/smoke-test
//! convenience, in the same spirit as the teacher's `dol-parse`/`dol-check`.
//!
//! # Usage
//!
//! ```bash
//! ds-run path/to/program.ds
//! ds-run --verbose path/to/program.ds
//! ```

use clap::Parser as ClapParser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use datascript::error::DatascriptError;
use datascript::{Interpreter, Parser};

/// Execute a Datascript source file
#[derive(ClapParser, Debug)]
#[command(name = "ds-run")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The Datascript source file to run
    path: PathBuf,

    /// Print the value of the program's final top-level expression
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let source = match std::fs::read_to_string(&args.path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: cannot read {}: {e}", "error".red().bold(), args.path.display());
            return ExitCode::FAILURE;
        }
    };

    match run(&source, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(source: &str, args: &Args) -> Result<(), DatascriptError> {
    let mut parser = Parser::new(source)?;
    let program = parser.parse_program()?;
    let mut interpreter = Interpreter::new();
    let result = interpreter.run_program(&program)?;
    if args.verbose {
        println!("{}", result.display_string());
    }
    Ok(())
}
