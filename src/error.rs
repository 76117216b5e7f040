//! Error types for the Datascript lexer, parser, scope resolver, and
//! evaluator.
//!
//! Each pipeline stage gets its own `thiserror`-derived enum so that callers
//! can match on the stage a failure came from. [`DatascriptError`] unifies
//! them behind a single type for callers (such as the `cli` binaries) that
//! only care about reporting a diagnostic and picking an exit code.

use crate::ast::Span;
use std::fmt;
use thiserror::Error;

/// Errors raised while tokenizing source text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    /// An unrecognized character was encountered.
    #[error("unexpected character '{ch}' at line {}, column {}", span.line, span.column)]
    UnexpectedChar {
        /// The offending character.
        ch: char,
        /// Location of the character.
        span: Span,
    },

    /// A string literal was never closed before end-of-file.
    #[error("unterminated string literal starting at line {}, column {}", span.line, span.column)]
    UnterminatedString {
        /// Location of the opening quote.
        span: Span,
    },

    /// A numeric literal ended with a trailing `.` and no following digit.
    #[error("invalid numeric literal '{text}' at line {}, column {}", span.line, span.column)]
    InvalidNumber {
        /// The offending lexeme.
        text: String,
        /// Location of the literal.
        span: Span,
    },
}

impl LexError {
    /// Returns the span at which this error occurred.
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. } => *span,
            LexError::UnterminatedString { span } => *span,
            LexError::InvalidNumber { span, .. } => *span,
        }
    }
}

/// Errors raised while parsing a token stream into an AST.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The parser expected one kind of token but found another.
    #[error("expected {expected} but found {found:?} ('{lexeme}') at line {}, column {}", span.line, span.column)]
    UnexpectedToken {
        /// A human-readable description of what was expected.
        expected: String,
        /// The token kind that was actually found.
        found: crate::lexer::TokenKind,
        /// The lexeme of the offending token.
        lexeme: String,
        /// Location of the offending token.
        span: Span,
    },

    /// `const` was declared without an initializer.
    #[error("const declaration '{name}' requires an initializer at line {}, column {}", span.line, span.column)]
    ConstWithoutInitializer {
        /// The name that was declared `const`.
        name: String,
        /// Location of the declaration.
        span: Span,
    },

    /// The input ended while more tokens were expected.
    #[error("unexpected end of file while parsing {context} at line {}, column {}", span.line, span.column)]
    UnexpectedEof {
        /// What the parser was in the middle of parsing.
        context: String,
        /// Location of the end-of-file token.
        span: Span,
    },

    /// A lexer error surfaced while pulling the next token.
    #[error(transparent)]
    Lex(#[from] LexError),
}

impl ParseError {
    /// Returns the span at which this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::ConstWithoutInitializer { span, .. } => *span,
            ParseError::UnexpectedEof { span, .. } => *span,
            ParseError::Lex(e) => e.span(),
        }
    }
}

/// Errors raised by the lexical environment (declaration/lookup/assignment).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScopeError {
    /// A name was declared twice in the same scope.
    #[error("'{name}' is already declared in this scope")]
    AlreadyDeclared {
        /// The offending name.
        name: String,
    },

    /// A name was looked up but no binding exists in any enclosing scope.
    #[error("undefined variable '{name}'")]
    UndefinedVariable {
        /// The offending name.
        name: String,
    },

    /// An assignment targeted a `const` binding.
    #[error("cannot assign to const '{name}'")]
    AssignToConst {
        /// The offending name.
        name: String,
    },

    /// An import tried to bind a name already present in the importing scope.
    #[error("'{name}' is already bound in this scope and cannot be re-imported")]
    ImportBindingClash {
        /// The offending name.
        name: String,
    },

    /// A module `exposing` clause named an export the module does not have.
    #[error("module '{module}' has no export named '{name}'")]
    UnknownExport {
        /// The module specifier.
        module: String,
        /// The requested export name.
        name: String,
    },
}

/// A value thrown by user code via `throw`.
///
/// This is distinct from [`RuntimeError`]: a `RuntimeException` is a catchable
/// `Value` that propagates until a `try`/`catch` claims it, while a
/// `RuntimeError` is a host-fatal condition user code cannot suppress.
#[derive(Debug, Clone)]
pub struct RuntimeException(pub crate::value::Value);

impl fmt::Display for RuntimeException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fatal errors raised during evaluation.
///
/// Unlike [`RuntimeException`], these can never be caught by a `try`/`catch`
/// in user code; they terminate the running program.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// A scope/binding rule was violated.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// An operator or native function received a value of the wrong kind.
    #[error("type error: expected {expected}, found {actual}")]
    TypeError {
        /// The expected type/kind description.
        expected: String,
        /// The actual value's type tag.
        actual: String,
    },

    /// A callable was invoked with the wrong number of arguments.
    #[error("arity mismatch: expected {expected} arguments, found {actual}")]
    ArityMismatch {
        /// The expected argument count (or a description such as "at least 2").
        expected: String,
        /// The actual argument count supplied.
        actual: usize,
    },

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// An array index was out of bounds.
    #[error("array index {index} out of bounds (length {length})")]
    IndexOutOfBounds {
        /// The offending index.
        index: i64,
        /// The array's length.
        length: usize,
    },

    /// A value that is not callable was used as the callee of a call expression.
    #[error("value of type {actual} is not callable")]
    NotCallable {
        /// The actual value's type tag.
        actual: String,
    },

    /// `return` appeared outside any function body.
    #[error("'return' used outside a function")]
    ReturnOutsideFunction,

    /// `break` or `continue` appeared outside any loop body.
    #[error("'{keyword}' used outside a loop")]
    LoopControlOutsideLoop {
        /// Either `"break"` or `"continue"`.
        keyword: &'static str,
    },

    /// A schema declaration named a base that is not itself a class/schema.
    #[error("cannot extend '{name}': not a class or schema")]
    InvalidBase {
        /// The name that was used as a base.
        name: String,
    },

    /// Schema instantiation received an argument that does not match any
    /// declared field/constructor parameter, or a required field was missing.
    #[error("schema '{schema}' field error: {message}")]
    SchemaFieldError {
        /// The schema's name.
        schema: String,
        /// Human-readable detail.
        message: String,
    },

    /// An import graph contained a cycle.
    #[error("circular import detected: '{path}' is already being loaded")]
    CircularImport {
        /// The path that was re-entered.
        path: String,
    },

    /// An import specifier could not be resolved to a file.
    #[error("cannot resolve module '{specifier}': {reason}")]
    ModuleResolution {
        /// The original import specifier.
        specifier: String,
        /// Human-readable detail.
        reason: String,
    },

    /// The document-store DSL was used incorrectly (bad filter/update shape,
    /// missing active database, stale binding, etc).
    #[error("DSL error: {message}")]
    Dsl {
        /// Human-readable detail.
        message: String,
    },

    /// A value that cannot be represented as a plain document (a `Function`,
    /// `NativeFn`, `Class`, or `Promise`) was used where a document is
    /// required.
    #[error("value of type {actual} cannot be converted to a document")]
    NotDocumentable {
        /// The actual value's type tag.
        actual: String,
    },

    /// An embedded parse error, surfaced when `eval`-ing dynamically parsed
    /// source (e.g. module bodies) fails.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// `assert(cond, message?)` was called with a falsy condition.
    #[error("assertion failed: {message}")]
    AssertionFailed {
        /// The supplied or default assertion message.
        message: String,
    },

    /// An I/O failure resolving or reading a module file.
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable detail (the underlying `std::io::Error`'s message).
        message: String,
    },
}

impl RuntimeError {
    /// Convenience constructor for [`RuntimeError::TypeError`].
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        RuntimeError::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Convenience constructor for [`RuntimeError::ArityMismatch`].
    pub fn arity_mismatch(expected: impl Into<String>, actual: usize) -> Self {
        RuntimeError::ArityMismatch {
            expected: expected.into(),
            actual,
        }
    }
}

/// The top-level error type unifying every pipeline stage.
///
/// This is the one error type a caller driving the whole pipeline (parse,
/// then evaluate) needs to know about.
#[derive(Debug, Error)]
pub enum DatascriptError {
    /// A lexical error.
    #[error(transparent)]
    Lex(#[from] LexError),

    /// A parse error.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A fatal evaluation error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// An uncaught value thrown via `throw` that propagated to the top
    /// level without a matching `try`/`catch`.
    #[error("uncaught exception: {0}")]
    Uncaught(RuntimeException),
}
