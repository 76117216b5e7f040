//! First-class wrappers around the driver-facing [`DatabaseHandle`]/
//! [`CollectionHandle`] traits.
//!
//! These give a connected database or collection a stable identity that can
//! be bound to a variable, passed as an argument, or stashed as a field —
//! the raw `Rc<dyn DatabaseHandle>` trait object has no room for the
//! option-default bookkeeping (`with { ... }` clauses) or the collection
//! memoization a database handle needs for its auto-collection member
//! access (§4.5).

use crate::dsl::document::Document;
use crate::dsl::driver::{CollectionHandle, DatabaseHandle};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Option defaults attached to a collection by `use collection ... with {...}`.
#[derive(Debug, Clone, Default)]
pub struct CollectionDefaults {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub limit: Option<f64>,
    pub batch_size: Option<f64>,
}

/// A bound collection: the driver handle plus its accumulated option
/// defaults.
pub struct CollectionValue {
    pub handle: Rc<dyn CollectionHandle>,
    pub defaults: RefCell<CollectionDefaults>,
}

impl CollectionValue {
    pub fn new(handle: Rc<dyn CollectionHandle>) -> Rc<Self> {
        Rc::new(CollectionValue {
            handle,
            defaults: RefCell::new(CollectionDefaults::default()),
        })
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

impl fmt::Debug for CollectionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionValue").field("name", &self.name()).finish()
    }
}

/// A bound database: the driver handle plus a memoizing cache of the
/// collections obtained through it, so repeated member access (`db.users`)
/// or repeated `use collection` on the same name returns the same
/// [`CollectionValue`] identity.
pub struct DatabaseValue {
    pub handle: Rc<dyn DatabaseHandle>,
    collections: RefCell<HashMap<String, Rc<CollectionValue>>>,
}

impl DatabaseValue {
    pub fn new(handle: Rc<dyn DatabaseHandle>) -> Rc<Self> {
        Rc::new(DatabaseValue {
            handle,
            collections: RefCell::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn uri(&self) -> &str {
        self.handle.uri()
    }

    /// Returns the cached collection for `name`, obtaining and caching it
    /// from the driver on first access.
    pub fn collection(&self, name: &str) -> Rc<CollectionValue> {
        if let Some(existing) = self.collections.borrow().get(name) {
            return Rc::clone(existing);
        }
        let created = CollectionValue::new(self.handle.collection(name));
        self.collections.borrow_mut().insert(name.to_string(), Rc::clone(&created));
        created
    }
}

impl fmt::Debug for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseValue").field("name", &self.name()).finish()
    }
}
