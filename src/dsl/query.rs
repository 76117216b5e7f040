//! Lowering of surface `query { field op value, ... }` conditions into a
//! plain filter [`Document`], and the comparator/stage helper natives that
//! build the same shapes from ordinary function calls.

use crate::ast::CompareOp;
use crate::dsl::document::Document;
use indexmap::IndexMap;

/// Maps a non-equality comparator to its document operator key.
pub fn comparator_key(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "$eq",
        CompareOp::Ne => "$ne",
        CompareOp::Lt => "$lt",
        CompareOp::Le => "$lte",
        CompareOp::Gt => "$gt",
        CompareOp::Ge => "$gte",
    }
}

/// Lowers a list of `(field, op, value)` conditions into a filter document.
///
/// `==` assigns the field directly unless a comparator object already
/// lives there, in which case it is folded in under `$eq`. Every other
/// comparator always folds into a comparator object at that field.
pub fn lower_query(conditions: &[(String, CompareOp, Document)]) -> Document {
    let mut query = IndexMap::new();
    for (field, op, value) in conditions {
        match op {
            CompareOp::Eq => {
                let existing = query.remove(field);
                match existing {
                    Some(Document::Object(mut comparator)) => {
                        comparator.insert("$eq".to_string(), value.clone());
                        query.insert(field.clone(), Document::Object(comparator));
                    }
                    Some(other) => {
                        // A plain equality already present for this field;
                        // the newest condition wins.
                        let _ = other;
                        query.insert(field.clone(), value.clone());
                    }
                    None => {
                        query.insert(field.clone(), value.clone());
                    }
                }
            }
            other => {
                let key = comparator_key(*other);
                let existing = query.remove(field);
                let mut comparator = match existing {
                    Some(Document::Object(map)) => map,
                    _ => IndexMap::new(),
                };
                comparator.insert(key.to_string(), value.clone());
                query.insert(field.clone(), Document::Object(comparator));
            }
        }
    }
    Document::Object(query)
}

/// `eq/ne/gt/gte/lt/lte(field, value)` helper shape.
pub fn comparator_document(field: &str, op: CompareOp, value: Document) -> Document {
    lower_query(std::slice::from_ref(&(field.to_string(), op, value)))
}

/// `and/or(conditions...) -> { $and|$or: [...] }`.
pub fn logical_document(keyword: &str, conditions: Vec<Document>) -> Document {
    let mut map = IndexMap::new();
    map.insert(format!("${keyword}"), Document::Array(conditions));
    Document::Object(map)
}

/// `match/project/sort/limit/skip/group/addFields(payload) -> { $stage: payload }`.
pub fn stage_document(stage: &str, payload: Document) -> Document {
    let mut map = IndexMap::new();
    map.insert(format!("${stage}"), payload);
    Document::Object(map)
}

/// `count(name) -> { $count: name }`.
pub fn count_document(name: &str) -> Document {
    stage_document("count", Document::String(name.to_string()))
}

/// `lookup` accepts either a ready-made object or four positional strings.
pub fn lookup_document(from: &str, local_field: &str, foreign_field: &str, as_name: &str) -> Document {
    let mut payload = IndexMap::new();
    payload.insert("from".to_string(), Document::String(from.to_string()));
    payload.insert("localField".to_string(), Document::String(local_field.to_string()));
    payload.insert("foreignField".to_string(), Document::String(foreign_field.to_string()));
    payload.insert("as".to_string(), Document::String(as_name.to_string()));
    stage_document("lookup", Document::Object(payload))
}

/// `unwind` accepts a bare path string (auto-prefixed with `$`) or an
/// object payload as-is.
pub fn unwind_document(path: &str) -> Document {
    let prefixed = if path.starts_with('$') {
        path.to_string()
    } else {
        format!("${path}")
    };
    stage_document("unwind", Document::String(prefixed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_and_relational_fold_into_one_comparator_object() {
        let conditions = vec![
            ("a".to_string(), CompareOp::Eq, Document::Number(1.0)),
            ("a".to_string(), CompareOp::Gt, Document::Number(0.0)),
            ("b".to_string(), CompareOp::Ne, Document::Number(2.0)),
        ];
        let doc = lower_query(&conditions);
        let obj = doc.as_object().unwrap();
        let a = obj.get("a").unwrap().as_object().unwrap();
        assert_eq!(a.get("$eq").unwrap(), &Document::Number(1.0));
        assert_eq!(a.get("$gt").unwrap(), &Document::Number(0.0));
        let b = obj.get("b").unwrap().as_object().unwrap();
        assert_eq!(b.get("$ne").unwrap(), &Document::Number(2.0));
    }

    #[test]
    fn unwind_prefixes_bare_paths() {
        let doc = unwind_document("items");
        assert_eq!(doc.get("$unwind").unwrap().as_str(), Some("$items"));
    }
}
