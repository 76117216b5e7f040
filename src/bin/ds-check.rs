//! ds-check - Parse Datascript files without running them
//!
//! A CI-friendly syntax check: parses each given file and reports the first
//! lex/parse error with its line/column, or confirms the file parses clean.
//! Mirrors the teacher's `dol-check` in shape (collect files, report per
//! file, summarize, exit non-zero on any failure) but checks syntax only —
//! the language core does not define a static type checker beyond the local
//! annotation checks performed at evaluation time (SPEC_FULL.md §1 Non-goals).
//!
//! # Usage
//!
//! ```bash
//! ds-check path/to/program.ds
//! ds-check --recursive src/
//! ```

use clap::Parser as ClapParser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use datascript::Parser;

/// Parse Datascript files and report syntax errors
#[derive(ClapParser, Debug)]
#[command(name = "ds-check")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files or directories to check
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Recursively descend into directories
    #[arg(short, long)]
    recursive: bool,

    /// Minimal output: exit code only
    #[arg(long)]
    ci: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let files = collect_source_files(&args.paths, args.recursive);

    if files.is_empty() {
        eprintln!("{}: no .ds files found", "warning".yellow());
        return ExitCode::SUCCESS;
    }

    let mut failed = 0usize;
    for path in &files {
        match check_file(path) {
            Ok(()) => {
                if !args.ci {
                    println!("{} {}", "ok".green(), path.display());
                }
            }
            Err(message) => {
                failed += 1;
                eprintln!("{} {}: {message}", "error".red().bold(), path.display());
            }
        }
    }

    if !args.ci {
        println!("\n{} checked, {} failed", files.len(), failed);
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn check_file(path: &Path) -> Result<(), String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("cannot read file: {e}"))?;
    let mut parser = Parser::new(&source).map_err(|e| e.to_string())?;
    parser.parse_program().map_err(|e| e.to_string())?;
    Ok(())
}

fn collect_source_files(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() && recursive {
            collect_recursive(path, &mut files);
        } else if path.is_dir() {
            if let Ok(entries) = std::fs::read_dir(path) {
                for entry in entries.flatten() {
                    let p = entry.path();
                    if p.extension().is_some_and(|ext| ext == "ds") {
                        files.push(p);
                    }
                }
            }
        }
    }
    files.sort();
    files
}

fn collect_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_recursive(&path, files);
            } else if path.extension().is_some_and(|ext| ext == "ds") {
                files.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_source_files_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ds"), "declare x = 1;").unwrap();
        std::fs::write(dir.path().join("b.txt"), "not datascript").unwrap();
        let files = collect_source_files(&[dir.path().to_path_buf()], false);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().unwrap(), "ds");
    }
}
