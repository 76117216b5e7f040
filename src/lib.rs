//! # Datascript
//!
//! Datascript is a small dynamically-typed scripting language with optional
//! type annotations, first-class schemas (classes with typed fields),
//! lexical modules, structured exception handling, cooperative asynchrony,
//! and an embedded DSL for document-store operations (filters, updates,
//! aggregation pipelines).
//!
//! This crate implements the language core: the lexer, the recursive-descent
//! parser, the tree-walking evaluator, the lexical environment/scope system,
//! the module loader, the schema/instance machinery, and the semantic layer
//! of the document-store DSL. It performs no I/O of its own for the DSL: it
//! lowers surface syntax to plain documents and issues logical operations
//! against a driver-supplied [`dsl::driver::DatabaseHandle`]/
//! [`dsl::driver::CollectionHandle`]; the crate ships an in-memory reference
//! driver ([`dsl::memory`]) for its own tests.
//!
//! ## Quick start
//!
//! ```rust
//! use datascript::eval::Interpreter;
//! use datascript::parser::Parser;
//!
//! let source = r#"declare x = 2 + 3 * 4; print(x);"#;
//! let mut parser = Parser::new(source).unwrap();
//! let program = parser.parse_program().unwrap();
//! let mut interp = Interpreter::new();
//! interp.run_program(&program).unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`lexer`]: source text to token stream.
//! - [`parser`]: tokens to AST.
//! - [`ast`]: the AST node types.
//! - [`value`]: runtime values.
//! - [`environment`]: the lexical scope chain.
//! - [`module`]: the module loader (path resolution, caching, cycle detection).
//! - [`eval`]: the tree-walking evaluator, native function library, and
//!   cooperative task queue.
//! - [`dsl`]: the document-store DSL's lowering logic and driver contract.
//! - [`error`]: error types shared across every stage.

#![doc(html_root_url = "https://docs.rs/datascript/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod ast;
pub mod dsl;
pub mod environment;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod pratt;
pub mod value;

pub use error::DatascriptError;
pub use eval::Interpreter;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use value::Value;

/// Parses and runs a Datascript source string to completion in a fresh
/// interpreter, returning the value of its last top-level expression
/// statement (or [`Value::Null`] if the program ends with a non-expression
/// statement).
///
/// This is the primary entry point for embedding Datascript: it covers the
/// common case of "run this whole program and get its result or error."
/// Callers that need to run multiple programs against the same global scope
/// (e.g. a REPL), or that need to resolve imports relative to a specific
/// file, should construct an [`Interpreter`] and a [`Parser`] directly.
///
/// # Example
///
/// ```rust
/// use datascript::run_source;
///
/// let result = run_source("declare x = 40 + 2; x;").unwrap();
/// assert_eq!(result.display_string(), "42");
/// ```
pub fn run_source(source: &str) -> Result<Value, DatascriptError> {
    let mut parser = Parser::new(source)?;
    let program = parser.parse_program()?;
    let mut interpreter = Interpreter::new();
    interpreter.run_program(&program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_and_string_concatenation() {
        let result = run_source(r#"declare x = 2 + 3 * 4; x;"#).unwrap();
        assert_eq!(result.display_string(), "14");
    }

    #[test]
    fn uncaught_throw_surfaces_as_an_error() {
        let err = run_source(r#"throw "boom";"#);
        assert!(matches!(err, Err(DatascriptError::Uncaught(_))));
    }

    #[test]
    fn try_catch_binds_the_thrown_value() {
        let source = r#"
            declare caught = "unset";
            try { throw "boom"; } catch (e) { caught = e; }
            caught;
        "#;
        let result = run_source(source).unwrap();
        assert_eq!(result.display_string(), "boom");
    }
}
