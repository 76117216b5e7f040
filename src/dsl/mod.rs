//! The embedded document-store DSL: operator lowering into plain
//! Query/Update/Pipeline documents, the driver contract, and an in-memory
//! reference driver for tests.
//!
//! This module performs no I/O of its own; see [`driver`] for the traits a
//! host implements and [`memory`] for the reference implementation used by
//! the crate's own tests and the `cli` smoke-test binary.

pub mod document;
pub mod driver;
pub mod handle;
pub mod memory;
pub mod operation;
pub mod query;

pub use document::Document;
pub use driver::{CollectionHandle, Cursor, DatabaseHandle, UpdateResult};
pub use handle::{CollectionDefaults, CollectionValue, DatabaseValue};
pub use operation::OperationChain;
