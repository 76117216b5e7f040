//! Tree-walking evaluation: expressions, statements, schema instantiation,
//! the document-store DSL, the native function library, control-flow
//! signals, and the cooperative task queue that backs `sleep`/`schedule`/
//! `await`.

pub mod builtins;
pub mod flow;
pub mod interpreter;
pub mod tasks;

pub use flow::{EvalError, EvalResult, Signal, StmtResult};
pub use interpreter::Interpreter;
pub use tasks::TaskQueue;
