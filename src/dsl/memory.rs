//! An in-memory reference driver.
//!
//! This implements [`DatabaseHandle`]/[`CollectionHandle`]/[`Cursor`]
//! purely for the crate's own tests and the `cli` feature's smoke-test
//! binary. It makes no claim to I/O guarantees beyond "correctly replays
//! the logical operations against an `IndexMap`-backed store."

use crate::dsl::document::Document;
use crate::dsl::driver::{CollectionHandle, Cursor, DatabaseHandle, UpdateResult};
use crate::error::RuntimeError;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Default)]
struct Store {
    rows: Vec<Document>,
    next_id: u64,
}

/// An in-memory collection backed by a `Vec<Document>`.
pub struct InMemoryCollection {
    name: String,
    store: Rc<RefCell<Store>>,
}

impl InMemoryCollection {
    fn new(name: &str) -> Self {
        InMemoryCollection {
            name: name.to_string(),
            store: Rc::new(RefCell::new(Store::default())),
        }
    }

    fn next_id(&self) -> String {
        let mut store = self.store.borrow_mut();
        store.next_id += 1;
        store.next_id.to_string()
    }

    fn with_id(&self, mut doc: Document) -> (String, Document) {
        if let Some(map) = doc.as_object_mut() {
            if let Some(Document::String(id)) = map.get("_id") {
                return (id.clone(), doc);
            }
            let id = self.next_id();
            map.insert("_id".to_string(), Document::String(id.clone()));
            (id, doc)
        } else {
            let id = self.next_id();
            (id, doc)
        }
    }
}

/// A materialized-in-advance cursor over filtered rows.
pub struct InMemoryCursor {
    rows: Vec<Document>,
    limit: Option<u64>,
}

impl Cursor for InMemoryCursor {
    fn to_array(&mut self) -> Result<Vec<Document>, RuntimeError> {
        let rows = std::mem::take(&mut self.rows);
        Ok(match self.limit {
            Some(n) => rows.into_iter().take(n as usize).collect(),
            None => rows,
        })
    }

    fn limit(&mut self, n: u64) {
        self.limit = Some(n);
    }
}

impl CollectionHandle for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_one(&self, filter: &Document, _opts: Option<&Document>) -> Result<Option<Document>, RuntimeError> {
        let store = self.store.borrow();
        Ok(store.rows.iter().find(|row| matches(row, filter)).cloned())
    }

    fn find(&self, filter: &Document, opts: Option<&Document>) -> Result<Box<dyn Cursor>, RuntimeError> {
        let store = self.store.borrow();
        let rows: Vec<Document> = store.rows.iter().filter(|row| matches(row, filter)).cloned().collect();
        let limit = opts.and_then(|o| o.get("limit")).and_then(Document::as_f64).map(|n| n as u64);
        Ok(Box::new(InMemoryCursor { rows, limit }))
    }

    fn insert_one(&self, doc: &Document) -> Result<String, RuntimeError> {
        let (id, doc) = self.with_id(doc.clone());
        self.store.borrow_mut().rows.push(doc);
        Ok(id)
    }

    fn insert_many(&self, docs: &[Document]) -> Result<Vec<String>, RuntimeError> {
        docs.iter().map(|d| self.insert_one(d)).collect()
    }

    fn update_one(&self, filter: &Document, update: &Document, opts: Option<&Document>) -> Result<UpdateResult, RuntimeError> {
        self.update(filter, update, opts, false)
    }

    fn update_many(&self, filter: &Document, update: &Document, opts: Option<&Document>) -> Result<UpdateResult, RuntimeError> {
        self.update(filter, update, opts, true)
    }

    fn delete_one(&self, filter: &Document) -> Result<u64, RuntimeError> {
        let mut store = self.store.borrow_mut();
        if let Some(pos) = store.rows.iter().position(|row| matches(row, filter)) {
            store.rows.remove(pos);
            return Ok(1);
        }
        Ok(0)
    }

    fn delete_many(&self, filter: &Document) -> Result<u64, RuntimeError> {
        let mut store = self.store.borrow_mut();
        let before = store.rows.len();
        store.rows.retain(|row| !matches(row, filter));
        Ok((before - store.rows.len()) as u64)
    }

    fn count_documents(&self, filter: &Document) -> Result<u64, RuntimeError> {
        let store = self.store.borrow();
        Ok(store.rows.iter().filter(|row| matches(row, filter)).count() as u64)
    }

    fn aggregate(&self, pipeline: &[Document]) -> Result<Box<dyn Cursor>, RuntimeError> {
        let store = self.store.borrow();
        let mut rows: Vec<Document> = store.rows.clone();
        for stage in pipeline {
            rows = apply_stage(stage, rows)?;
        }
        Ok(Box::new(InMemoryCursor { rows, limit: None }))
    }
}

impl InMemoryCollection {
    fn update(&self, filter: &Document, update: &Document, opts: Option<&Document>, many: bool) -> Result<UpdateResult, RuntimeError> {
        let mut store = self.store.borrow_mut();
        let mut matched = 0u64;
        let mut modified = 0u64;
        for row in store.rows.iter_mut() {
            if matches(row, filter) {
                matched += 1;
                apply_update(row, update);
                modified += 1;
                if !many {
                    break;
                }
            }
        }
        let mut result = UpdateResult {
            matched_count: matched,
            modified_count: modified,
            ..Default::default()
        };
        let upsert = opts.and_then(|o| o.get("upsert")).map(|d| matches!(d, Document::Bool(true))).unwrap_or(false);
        if matched == 0 && upsert {
            drop(store);
            let mut seed = filter.clone();
            apply_update(&mut seed, update);
            let id = self.insert_one(&seed)?;
            result.upserted_count = 1;
            result.upserted_id = Some(id);
        }
        Ok(result)
    }
}

fn apply_update(row: &mut Document, update: &Document) {
    let set_payload = update.get("$set").or(Some(update));
    if let (Some(map), Some(set)) = (row.as_object_mut(), set_payload.and_then(Document::as_object)) {
        for (k, v) in set {
            if k == "_id" {
                continue;
            }
            map.insert(k.clone(), v.clone());
        }
    }
}

fn matches(row: &Document, filter: &Document) -> bool {
    let Some(conditions) = filter.as_object() else {
        return true;
    };
    if conditions.is_empty() {
        return true;
    }
    conditions.iter().all(|(field, expected)| match field.as_str() {
        "$and" => expected.as_array().map(|subs| subs.iter().all(|f| matches(row, f))).unwrap_or(false),
        "$or" => expected.as_array().map(|subs| subs.iter().any(|f| matches(row, f))).unwrap_or(false),
        _ => match_field(row.get(field), expected),
    })
}

fn match_field(actual: Option<&Document>, expected: &Document) -> bool {
    let actual = actual.unwrap_or(&Document::Null);
    if let Some(comparator) = expected.as_object() {
        if comparator.keys().all(|k| k.starts_with('$')) {
            return comparator.iter().all(|(op, v)| compare(actual, op, v));
        }
    }
    actual == expected
}

fn compare(actual: &Document, op: &str, expected: &Document) -> bool {
    match op {
        "$eq" => actual == expected,
        "$ne" => actual != expected,
        "$lt" | "$lte" | "$gt" | "$gte" => {
            let (Some(a), Some(b)) = (as_ord(actual), as_ord(expected)) else {
                return false;
            };
            match op {
                "$lt" => a < b,
                "$lte" => a <= b,
                "$gt" => a > b,
                "$gte" => a >= b,
                _ => unreachable!(),
            }
        }
        _ => true,
    }
}

fn as_ord(doc: &Document) -> Option<f64> {
    match doc {
        Document::Number(n) => Some(*n),
        _ => None,
    }
}

fn apply_stage(stage: &Document, rows: Vec<Document>) -> Result<Vec<Document>, RuntimeError> {
    let Some(map) = stage.as_object() else {
        return Ok(rows);
    };
    if let Some(filter) = map.get("$match") {
        return Ok(rows.into_iter().filter(|r| matches(r, filter)).collect());
    }
    if let Some(Document::Number(n)) = map.get("$limit") {
        return Ok(rows.into_iter().take(*n as usize).collect());
    }
    if let Some(Document::Number(n)) = map.get("$skip") {
        return Ok(rows.into_iter().skip(*n as usize).collect());
    }
    if let Some(Document::String(name)) = map.get("$count") {
        let mut out = IndexMap::new();
        out.insert(name.clone(), Document::Number(rows.len() as f64));
        return Ok(vec![Document::Object(out)]);
    }
    // $project / $sort / $group / $lookup / $unwind / $addFields: pass rows
    // through unchanged. A real driver implements these; the in-memory
    // reference only needs to replay the stages its own tests exercise.
    Ok(rows)
}

/// An in-memory database: a name, a connection URI, and a lazily-created
/// set of collections.
pub struct InMemoryDatabase {
    name: String,
    uri: String,
    collections: RefCell<HashMap<String, Rc<InMemoryCollection>>>,
}

impl InMemoryDatabase {
    pub fn new(uri: &str, name: &str) -> Rc<Self> {
        Rc::new(InMemoryDatabase {
            name: name.to_string(),
            uri: uri.to_string(),
            collections: RefCell::new(HashMap::new()),
        })
    }
}

impl DatabaseHandle for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn collection(&self, name: &str) -> Rc<dyn CollectionHandle> {
        let mut collections = self.collections.borrow_mut();
        let entry = collections
            .entry(name.to_string())
            .or_insert_with(|| Rc::new(InMemoryCollection::new(name)));
        Rc::clone(entry) as Rc<dyn CollectionHandle>
    }

    fn close(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Connects to an in-memory database. `uri`/`db_name` are recorded but
/// otherwise inert — there is no real network endpoint behind them.
pub fn connect(uri: &str, db_name: &str) -> Rc<InMemoryDatabase> {
    InMemoryDatabase::new(uri, db_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_num(n: f64) -> Document {
        Document::Number(n)
    }

    #[test]
    fn insert_and_find_round_trip() {
        let db = connect("mem://", "d");
        let users = db.collection("users");
        let mut obj = IndexMap::new();
        obj.insert("name".to_string(), Document::String("ada".to_string()));
        users.insert_one(&Document::Object(obj)).unwrap();

        let found = users.find_one(&Document::object(), None).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn comparator_filters_match_correctly() {
        let db = connect("mem://", "d");
        let nums = db.collection("nums");
        for n in [1.0, 2.0, 3.0] {
            let mut obj = IndexMap::new();
            obj.insert("n".to_string(), doc_num(n));
            nums.insert_one(&Document::Object(obj)).unwrap();
        }
        let mut gt_filter = IndexMap::new();
        let mut cmp = IndexMap::new();
        cmp.insert("$gt".to_string(), doc_num(1.0));
        gt_filter.insert("n".to_string(), Document::Object(cmp));
        let count = nums.count_documents(&Document::Object(gt_filter)).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn update_many_sets_fields_on_every_match() {
        let db = connect("mem://", "d");
        let col = db.collection("c");
        for _ in 0..3 {
            col.insert_one(&Document::object()).unwrap();
        }
        let mut set_payload = IndexMap::new();
        set_payload.insert("flag".to_string(), Document::Bool(true));
        let result = col.update_many(&Document::object(), &Document::Object(set_payload), None).unwrap();
        assert_eq!(result.matched_count, 3);
        assert_eq!(result.modified_count, 3);
    }

    #[test]
    fn delete_many_removes_all_matches() {
        let db = connect("mem://", "d");
        let col = db.collection("c");
        for _ in 0..2 {
            col.insert_one(&Document::object()).unwrap();
        }
        let deleted = col.delete_many(&Document::object()).unwrap();
        assert_eq!(deleted, 2);
    }
}
