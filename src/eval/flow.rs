//! Non-local control transfer.
//!
//! `return`/`break`/`continue` are modeled as [`Signal`]s returned
//! alongside normal statement completion, not as Rust-level errors: they
//! are caught by a specific lexical owner (the innermost function/loop) and
//! never escape past it undetected. A thrown value, by contrast, must
//! unwind through arbitrary call frames until a `try`/`catch` claims it, so
//! it travels via [`EvalError::Exception`] instead — the `?` operator does
//! the unwinding for us, exactly as it does for fatal [`RuntimeError`]s.

use crate::error::{ParseError, RuntimeError, ScopeError};
use crate::value::Value;

/// A non-local jump raised by `return`/`break`/`continue`.
#[derive(Debug, Clone)]
pub enum Signal {
    Return(Value),
    Break,
    Continue,
}

/// The error side of evaluation: either a host-fatal [`RuntimeError`] (never
/// catchable by user code) or a user-thrown [`Value`] (caught only by
/// `try`/`catch`).
#[derive(Debug, Clone)]
pub enum EvalError {
    Fatal(RuntimeError),
    Exception(Value),
}

impl From<RuntimeError> for EvalError {
    fn from(e: RuntimeError) -> Self {
        EvalError::Fatal(e)
    }
}

impl From<ScopeError> for EvalError {
    fn from(e: ScopeError) -> Self {
        EvalError::Fatal(RuntimeError::from(e))
    }
}

impl From<ParseError> for EvalError {
    fn from(e: ParseError) -> Self {
        EvalError::Fatal(RuntimeError::from(e))
    }
}

/// Result of evaluating a single statement: `None` on ordinary fallthrough,
/// `Some(signal)` when a `return`/`break`/`continue` is unwinding through it.
pub type StmtResult = Result<Option<Signal>, EvalError>;

/// Result of evaluating an expression.
pub type EvalResult = Result<Value, EvalError>;
