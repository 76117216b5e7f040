//! Plain document shapes exchanged with a document-store driver, and
//! conversion to/from runtime [`Value`]s.
//!
//! A `Document` is deliberately a separate type from `Value`: it never
//! carries reference identity or callables, so it can cross the driver
//! boundary (and, with the `serde` feature, be serialized) without
//! dragging the evaluator's `Rc<RefCell<...>>` graph along with it.

use crate::error::RuntimeError;
use crate::value::{format_number, Value};
use indexmap::IndexMap;
use std::fmt;

/// A plain, driver-facing document value (a JSON-like tree).
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Document>),
    Object(IndexMap<String, Document>),
}

impl Document {
    pub fn object() -> Document {
        Document::Object(IndexMap::new())
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Document>> {
        match self {
            Document::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, Document>> {
        match self {
            Document::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Document]> {
        match self {
            Document::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Document::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Document> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// Converts a runtime [`Value`] into a [`Document`].
    ///
    /// `Function`/`NativeFn`/`Class`/`Promise` have no document
    /// representation and are rejected.
    pub fn from_value(value: &Value) -> Result<Document, RuntimeError> {
        Ok(match value {
            Value::Null => Document::Null,
            Value::Boolean(b) => Document::Bool(*b),
            Value::Number(n) => Document::Number(*n),
            Value::String(s) => Document::String(s.to_string()),
            Value::Array(a) => {
                let mut out = Vec::with_capacity(a.borrow().len());
                for item in a.borrow().iter() {
                    out.push(Document::from_value(item)?);
                }
                Document::Array(out)
            }
            Value::Object(o, _) => {
                let mut out = IndexMap::new();
                for (k, v) in o.borrow().iter() {
                    out.insert(k.clone(), Document::from_value(v)?);
                }
                Document::Object(out)
            }
            Value::Function(_)
            | Value::NativeFn(_)
            | Value::Class(_)
            | Value::Promise(_)
            | Value::Database(_)
            | Value::Collection(_)
            | Value::Operation(_) => {
                return Err(RuntimeError::NotDocumentable {
                    actual: value.type_tag().to_string(),
                })
            }
        })
    }

    /// Converts a [`Document`] back into a runtime [`Value`].
    pub fn to_value(&self) -> Value {
        match self {
            Document::Null => Value::Null,
            Document::Bool(b) => Value::Boolean(*b),
            Document::Number(n) => Value::Number(*n),
            Document::String(s) => Value::string(s.clone()),
            Document::Array(items) => Value::array(items.iter().map(Document::to_value).collect()),
            Document::Object(map) => {
                let mut out = crate::value::ObjectMap::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_value());
                }
                Value::object(out)
            }
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Null => write!(f, "null"),
            Document::Bool(b) => write!(f, "{b}"),
            Document::Number(n) => write!(f, "{}", format_number(*n)),
            Document::String(s) => write!(f, "\"{s}\""),
            Document::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Document::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars_and_containers() {
        let v = Value::object({
            let mut m = crate::value::ObjectMap::new();
            m.insert("a".to_string(), Value::Number(1.0));
            m.insert("b".to_string(), Value::array(vec![Value::string("x")]));
            m
        });
        let doc = Document::from_value(&v).unwrap();
        let back = doc.to_value();
        match back {
            Value::Object(o, _) => {
                assert_eq!(o.borrow().get("a").unwrap().display_string(), "1");
            }
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn functions_are_not_documentable() {
        let native = Value::NativeFn(std::rc::Rc::new(crate::value::NativeFnValue {
            name: "x".to_string(),
            implementation: std::rc::Rc::new(|_, _| Ok(Value::Null)),
        }));
        assert!(Document::from_value(&native).is_err());
    }
}
