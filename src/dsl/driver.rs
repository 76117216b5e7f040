//! Driver-facing traits. The core crate performs no I/O: it lowers surface
//! syntax to [`Document`]s and issues logical operations against these
//! `dyn`-usable traits, implemented by a host driver (or, for the crate's
//! own tests, by [`crate::dsl::memory::InMemoryDriver`]).

use crate::dsl::document::Document;
use crate::error::RuntimeError;
use std::rc::Rc;

/// The result of an `updateOne`/`updateMany` operation.
#[derive(Debug, Clone, Default)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    pub upserted_id: Option<String>,
    pub upserted_ids: Option<Vec<String>>,
}

/// A cursor over a query or aggregation result.
pub trait Cursor {
    /// Materializes the remaining results as a `Vec`.
    fn to_array(&mut self) -> Result<Vec<Document>, RuntimeError>;

    /// Applies a result-count limit, if the driver supports it lazily.
    fn limit(&mut self, n: u64);
}

/// A document-store collection. No default method performs real I/O; every
/// method is implemented by the host driver (or `InMemoryDriver`).
pub trait CollectionHandle {
    fn name(&self) -> &str;
    fn find_one(&self, filter: &Document, opts: Option<&Document>) -> Result<Option<Document>, RuntimeError>;
    fn find(&self, filter: &Document, opts: Option<&Document>) -> Result<Box<dyn Cursor>, RuntimeError>;
    fn insert_one(&self, doc: &Document) -> Result<String, RuntimeError>;
    fn insert_many(&self, docs: &[Document]) -> Result<Vec<String>, RuntimeError>;
    fn update_one(&self, filter: &Document, update: &Document, opts: Option<&Document>) -> Result<UpdateResult, RuntimeError>;
    fn update_many(&self, filter: &Document, update: &Document, opts: Option<&Document>) -> Result<UpdateResult, RuntimeError>;
    fn delete_one(&self, filter: &Document) -> Result<u64, RuntimeError>;
    fn delete_many(&self, filter: &Document) -> Result<u64, RuntimeError>;
    fn count_documents(&self, filter: &Document) -> Result<u64, RuntimeError>;
    fn aggregate(&self, pipeline: &[Document]) -> Result<Box<dyn Cursor>, RuntimeError>;
}

/// A document-store database: the entry point for obtaining collections.
pub trait DatabaseHandle {
    fn name(&self) -> &str;
    fn uri(&self) -> &str;
    fn collection(&self, name: &str) -> Rc<dyn CollectionHandle>;
    fn close(&self) -> Result<(), RuntimeError>;
}
