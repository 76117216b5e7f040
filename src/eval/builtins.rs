//! The global native function library.
//!
//! Every name listed in SPEC_FULL.md §4.8 is installed into the root
//! environment by [`install`]. `true`/`false`/`null` are parsed as literal
//! expressions (see [`crate::ast::Expr::BooleanLiteral`]/`NullLiteral`), not
//! bindings, so they are not declared here.

use crate::dsl::document::Document;
use crate::dsl::query;
use crate::environment::{self, EnvHandle};
use crate::error::RuntimeError;
use crate::eval::flow::{EvalError, EvalResult};
use crate::eval::interpreter::{expect_arity, Interpreter};
use crate::value::{NativeFnValue, NativeImpl, ObjectMap, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Installs every native listed in SPEC_FULL.md §4.8 into `global`.
pub fn install(global: &EnvHandle) {
    for (name, f) in natives() {
        let value = Value::NativeFn(Rc::new(NativeFnValue { name: name.to_string(), implementation: f }));
        environment::declare_var(global, name, value, true).expect("global names are installed exactly once");
    }
}

fn native(name: &'static str, f: impl Fn(&mut Interpreter, Vec<Value>) -> EvalResult + 'static) -> (&'static str, NativeImpl) {
    (name, Rc::new(f))
}

fn natives() -> Vec<(&'static str, NativeImpl)> {
    vec![
        native("print", |_, args| {
            println!("{}", args.iter().map(Value::display_string).collect::<Vec<_>>().join(" "));
            Ok(Value::Null)
        }),
        native("time", |interp, args| {
            expect_arity(&args, 0)?;
            Ok(Value::Number(interp.tasks.virtual_clock_ms() as f64))
        }),
        native("sleep", |interp, args| {
            expect_arity(&args, 1)?;
            let ms = expect_number(&args, 0)?;
            Ok(Value::Promise(interp.tasks.schedule_sleep(ms)))
        }),
        native("showASTNode", |_, args| {
            expect_arity(&args, 1)?;
            Ok(Value::string(format!("{:?}", args[0])))
        }),
        native("typeOf", |_, args| {
            expect_arity(&args, 1)?;
            let name = match &args[0] {
                Value::Object(_, Some(schema_name)) => schema_name.clone(),
                Value::Class(c) => c.name.clone(),
                other => other.type_tag().to_string(),
            };
            Ok(Value::string(name))
        }),
        native("inspect", |_, args| {
            expect_arity(&args, 1)?;
            Ok(Value::string(args[0].display_string()))
        }),
        native("assert", |_, args| {
            if args.is_empty() || args.len() > 2 {
                return Err(RuntimeError::ArityMismatch { expected: "1 or 2".to_string(), actual: args.len() }.into());
            }
            if !args[0].is_truthy() {
                let message = match args.get(1) {
                    Some(v) => v.display_string(),
                    None => "assertion failed".to_string(),
                };
                return Err(RuntimeError::AssertionFailed { message }.into());
            }
            Ok(Value::Null)
        }),
        native("abs", |_, args| unary_math(&args, f64::abs)),
        native("sqrt", |_, args| unary_math(&args, f64::sqrt)),
        native("pow", |_, args| {
            expect_arity(&args, 2)?;
            let base = expect_number(&args, 0)?;
            let exp = expect_number(&args, 1)?;
            Ok(Value::Number(base.powf(exp)))
        }),
        native("max", |_, args| variadic_numbers(&args, f64::NEG_INFINITY, f64::max)),
        native("min", |_, args| variadic_numbers(&args, f64::INFINITY, f64::min)),
        native("clamp", |_, args| {
            expect_arity(&args, 3)?;
            let v = expect_number(&args, 0)?;
            let lo = expect_number(&args, 1)?;
            let hi = expect_number(&args, 2)?;
            Ok(Value::Number(v.clamp(lo, hi)))
        }),
        native("round", |_, args| unary_math(&args, f64::round)),
        native("floor", |_, args| unary_math(&args, f64::floor)),
        native("ceil", |_, args| unary_math(&args, f64::ceil)),
        native("strlen", |_, args| {
            expect_arity(&args, 1)?;
            Ok(Value::Number(expect_string(&args, 0)?.chars().count() as f64))
        }),
        native("uppercase", |_, args| {
            expect_arity(&args, 1)?;
            Ok(Value::string(expect_string(&args, 0)?.to_uppercase()))
        }),
        native("lowercase", |_, args| {
            expect_arity(&args, 1)?;
            Ok(Value::string(expect_string(&args, 0)?.to_lowercase()))
        }),
        native("contains", |_, args| {
            expect_arity(&args, 2)?;
            match &args[0] {
                Value::String(s) => Ok(Value::Boolean(s.contains(expect_string(&args, 1)?))),
                Value::Array(a) => Ok(Value::Boolean(a.borrow().iter().any(|v| v.equals(&args[1])))),
                other => Err(RuntimeError::type_error("a string or array", other.type_tag()).into()),
            }
        }),
        native("split", |_, args| {
            expect_arity(&args, 2)?;
            let s = expect_string(&args, 0)?;
            let sep = expect_string(&args, 1)?;
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(sep).map(Value::string).collect()
            };
            Ok(Value::array(parts))
        }),
        native("trim", |_, args| {
            expect_arity(&args, 1)?;
            Ok(Value::string(expect_string(&args, 0)?.trim().to_string()))
        }),
        native("toNumber", |_, args| {
            expect_arity(&args, 1)?;
            match &args[0] {
                Value::Number(n) => Ok(Value::Number(*n)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Number)
                    .map_err(|_| RuntimeError::type_error("a numeric string", format!("'{s}'")).into()),
                Value::Boolean(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
                other => Err(RuntimeError::type_error("a number, string, or boolean", other.type_tag()).into()),
            }
        }),
        native("toString", |_, args| {
            expect_arity(&args, 1)?;
            Ok(Value::string(args[0].display_string()))
        }),
        native("keys", |_, args| {
            expect_arity(&args, 1)?;
            match &args[0] {
                Value::Object(map, _) => Ok(Value::array(map.borrow().keys().map(Value::string).collect())),
                other => Err(RuntimeError::type_error("an object", other.type_tag()).into()),
            }
        }),
        native("values", |_, args| {
            expect_arity(&args, 1)?;
            match &args[0] {
                Value::Object(map, _) => Ok(Value::array(map.borrow().values().cloned().collect())),
                other => Err(RuntimeError::type_error("an object", other.type_tag()).into()),
            }
        }),
        native("entries", |_, args| {
            expect_arity(&args, 1)?;
            match &args[0] {
                Value::Object(map, _) => Ok(Value::array(
                    map.borrow()
                        .iter()
                        .map(|(k, v)| Value::array(vec![Value::string(k.clone()), v.clone()]))
                        .collect(),
                )),
                other => Err(RuntimeError::type_error("an object", other.type_tag()).into()),
            }
        }),
        native("len", |_, args| {
            expect_arity(&args, 1)?;
            match &args[0] {
                Value::Array(a) => Ok(Value::Number(a.borrow().len() as f64)),
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::Object(map, _) => Ok(Value::Number(map.borrow().len() as f64)),
                other => Err(RuntimeError::type_error("an array, string, or object", other.type_tag()).into()),
            }
        }),
        native("clone", |_, args| {
            expect_arity(&args, 1)?;
            shallow_clone(&args[0])
        }),
        native("deepClone", |_, args| {
            expect_arity(&args, 1)?;
            deep_clone(&args[0])
        }),
        native("debug", |_, args| {
            eprintln!("[debug] {}", args.iter().map(Value::display_string).collect::<Vec<_>>().join(" "));
            Ok(Value::Null)
        }),
        native("info", |_, args| {
            println!("[info] {}", args.iter().map(Value::display_string).collect::<Vec<_>>().join(" "));
            Ok(Value::Null)
        }),
        native("warn", |_, args| {
            eprintln!("[warn] {}", args.iter().map(Value::display_string).collect::<Vec<_>>().join(" "));
            Ok(Value::Null)
        }),
        native("error", |_, args| {
            eprintln!("[error] {}", args.iter().map(Value::display_string).collect::<Vec<_>>().join(" "));
            Ok(Value::Null)
        }),
        native("schemaInfo", |interp, args| {
            expect_arity(&args, 1)?;
            let (class, kind, instance_map) = match &args[0] {
                Value::Class(c) => (Rc::clone(c), "class", None),
                Value::Object(map, Some(schema_name)) => {
                    let class = interp
                        .lookup_class(schema_name)
                        .ok_or_else(|| RuntimeError::Dsl { message: format!("no registered schema named '{schema_name}'") })?;
                    (class, "instance", Some(Rc::clone(map)))
                }
                other => return Err(RuntimeError::type_error("a class or a schema instance", other.type_tag()).into()),
            };

            let describe = |ann: &crate::ast::TypeAnnotation| Value::string(crate::eval::interpreter::describe_type(ann));

            let mut out = ObjectMap::new();
            out.insert("kind".to_string(), Value::string(kind));
            out.insert("name".to_string(), Value::string(class.name.clone()));
            out.insert(
                "extends".to_string(),
                class.base.as_ref().map(|b| Value::string(b.name.clone())).unwrap_or(Value::Null),
            );
            out.insert(
                "fields".to_string(),
                Value::array(
                    class
                        .fields
                        .iter()
                        .map(|f| {
                            let mut fm = ObjectMap::new();
                            fm.insert("name".to_string(), Value::string(f.name.clone()));
                            fm.insert("required".to_string(), Value::Boolean(f.required));
                            fm.insert("type".to_string(), f.annotation.as_ref().map(describe).unwrap_or(Value::Null));
                            fm.insert("hasDefault".to_string(), Value::Boolean(f.initializer.is_some()));
                            Value::object(fm)
                        })
                        .collect(),
                ),
            );
            out.insert(
                "methods".to_string(),
                Value::array(class.methods.iter().map(|m| Value::string(m.name.clone())).collect()),
            );
            out.insert(
                "constructor".to_string(),
                Value::array(
                    class
                        .constructor_params
                        .iter()
                        .flatten()
                        .map(|p| {
                            let mut pm = ObjectMap::new();
                            pm.insert("name".to_string(), Value::string(p.name.clone()));
                            pm.insert("type".to_string(), p.annotation.as_ref().map(describe).unwrap_or(Value::Null));
                            Value::object(pm)
                        })
                        .collect(),
                ),
            );
            if let Some(map) = instance_map {
                let mut values = ObjectMap::new();
                for (k, v) in map.borrow().iter() {
                    values.insert(k.clone(), v.clone());
                }
                out.insert("values".to_string(), Value::object(values));
            }
            Ok(Value::object(out))
        }),
        native("env", |_, args| {
            expect_arity(&args, 1)?;
            let name = expect_string(&args, 0)?;
            Ok(std::env::var(name).map(Value::string).unwrap_or(Value::Null))
        }),
        native("uuid", |_, args| {
            expect_arity(&args, 0)?;
            Ok(Value::string(uuid::Uuid::new_v4().to_string()))
        }),
        native("schedule", |interp, args| {
            if !(2..=3).contains(&args.len()) {
                return Err(RuntimeError::ArityMismatch { expected: "2 or 3".to_string(), actual: args.len() }.into());
            }
            let delay = expect_number(&args, 0)?;
            let callable = args[1].clone();
            let call_args = match args.get(2) {
                Some(Value::Array(a)) => a.borrow().clone(),
                Some(Value::Null) | None => Vec::new(),
                Some(other) => return Err(RuntimeError::type_error("an array", other.type_tag()).into()),
            };
            let snapshot = deep_clone_all(&call_args)?;
            Ok(Value::Number(interp.tasks.schedule_callable(delay, callable, snapshot) as f64))
        }),
        native("connect", |_, args| {
            if args.is_empty() || args.len() > 2 {
                return Err(RuntimeError::ArityMismatch { expected: "1 or 2".to_string(), actual: args.len() }.into());
            }
            let uri = expect_string(&args, 0)?;
            let db_name = match args.get(1) {
                Some(Value::String(s)) => s.to_string(),
                Some(Value::Null) | None => "default".to_string(),
                Some(other) => return Err(RuntimeError::type_error("a string", other.type_tag()).into()),
            };
            let db = crate::eval::interpreter::connect_database(uri, &db_name);
            Ok(Value::Database(db))
        }),
        native("disconnect", |_, args| {
            expect_arity(&args, 1)?;
            match &args[0] {
                Value::Database(db) => {
                    db.handle.close()?;
                    Ok(Value::Null)
                }
                other => Err(RuntimeError::type_error("a database handle", other.type_tag()).into()),
            }
        }),
        native("match", |_, args| stage("match", &args)),
        native("project", |_, args| stage("project", &args)),
        native("sort", |_, args| stage("sort", &args)),
        native("limit", |_, args| stage("limit", &args)),
        native("skip", |_, args| stage("skip", &args)),
        native("group", |_, args| stage("group", &args)),
        native("addFields", |_, args| stage("addFields", &args)),
        native("count", |_, args| {
            expect_arity(&args, 1)?;
            let name = expect_string(&args, 0)?;
            Ok(query::count_document(name).to_value())
        }),
        native("lookup", |_, args| {
            let doc = match args.len() {
                1 => Document::from_value(&args[0])?,
                4 => query::lookup_document(expect_string(&args, 0)?, expect_string(&args, 1)?, expect_string(&args, 2)?, expect_string(&args, 3)?),
                n => return Err(RuntimeError::ArityMismatch { expected: "1 or 4".to_string(), actual: n }.into()),
            };
            Ok(match doc {
                Document::Object(_) if args.len() == 1 => query::stage_document("lookup", doc).to_value(),
                other => other.to_value(),
            })
        }),
        native("unwind", |_, args| {
            expect_arity(&args, 1)?;
            match &args[0] {
                Value::String(s) => Ok(query::unwind_document(s).to_value()),
                other @ Value::Object(..) => Ok(query::stage_document("unwind", Document::from_value(other)?).to_value()),
                other => Err(RuntimeError::type_error("a string or object", other.type_tag()).into()),
            }
        }),
        native("eq", |_, args| comparator("eq", &args)),
        native("ne", |_, args| comparator("ne", &args)),
        native("gt", |_, args| comparator("gt", &args)),
        native("gte", |_, args| comparator("gte", &args)),
        native("lt", |_, args| comparator("lt", &args)),
        native("lte", |_, args| comparator("lte", &args)),
        native("and", |_, args| logical("and", args)),
        native("or", |_, args| logical("or", args)),
    ]
}

fn expect_number(args: &[Value], i: usize) -> Result<f64, EvalError> {
    match args.get(i) {
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(RuntimeError::type_error("a number", other.type_tag()).into()),
        None => Err(RuntimeError::ArityMismatch { expected: format!("at least {}", i + 1), actual: args.len() }.into()),
    }
}

fn expect_string(args: &[Value], i: usize) -> Result<&str, EvalError> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s.as_ref()),
        Some(other) => Err(RuntimeError::type_error("a string", other.type_tag()).into()),
        None => Err(RuntimeError::ArityMismatch { expected: format!("at least {}", i + 1), actual: args.len() }.into()),
    }
}

fn unary_math(args: &[Value], f: impl Fn(f64) -> f64) -> EvalResult {
    expect_arity(args, 1)?;
    Ok(Value::Number(f(expect_number(args, 0)?)))
}

fn variadic_numbers(args: &[Value], seed: f64, combine: impl Fn(f64, f64) -> f64) -> EvalResult {
    if args.is_empty() {
        return Err(RuntimeError::ArityMismatch { expected: "at least 1".to_string(), actual: 0 }.into());
    }
    let mut acc = seed;
    for (i, _) in args.iter().enumerate() {
        acc = combine(acc, expect_number(args, i)?);
    }
    Ok(Value::Number(acc))
}

fn shallow_clone(value: &Value) -> EvalResult {
    match value {
        Value::Array(a) => Ok(Value::array(a.borrow().clone())),
        Value::Object(map, tag) => {
            let cloned = map.borrow().clone();
            Ok(match tag {
                Some(t) => Value::tagged_object(cloned, t.clone()),
                None => Value::object(cloned),
            })
        }
        other => Ok(other.clone()),
    }
}

/// Deep-clones `value`, preserving cyclic structure.
///
/// Keyed by the source handle's pointer identity rather than contents: a
/// schema instance can hold a field initialized to `this` (or any other
/// reference cycle reachable from `value`), so a plain recursive clone would
/// never terminate. Each handle is cloned at most once; a second visit
/// within the same call returns the already-allocated (possibly
/// still-being-populated) clone instead of recursing again.
fn deep_clone(value: &Value) -> EvalResult {
    deep_clone_inner(value, &mut HashMap::new())
}

/// Deep-clones every value in `values`, sharing one visited map across all of
/// them so identity shared between arguments (e.g. two parameters pointing
/// at the same object) is preserved in the snapshot.
fn deep_clone_all(values: &[Value]) -> Result<Vec<Value>, EvalError> {
    let mut visited = HashMap::new();
    values.iter().map(|v| deep_clone_inner(v, &mut visited)).collect()
}

fn deep_clone_inner(value: &Value, visited: &mut HashMap<usize, Value>) -> EvalResult {
    match value {
        Value::Array(a) => {
            let key = Rc::as_ptr(a) as usize;
            if let Some(existing) = visited.get(&key) {
                return Ok(existing.clone());
            }
            let new_arr = Rc::new(RefCell::new(Vec::with_capacity(a.borrow().len())));
            let new_value = Value::Array(Rc::clone(&new_arr));
            visited.insert(key, new_value.clone());
            let items: Vec<Value> = a.borrow().iter().map(|v| deep_clone_inner(v, visited)).collect::<Result<_, _>>()?;
            *new_arr.borrow_mut() = items;
            Ok(new_value)
        }
        Value::Object(map, tag) => {
            let key = Rc::as_ptr(map) as usize;
            if let Some(existing) = visited.get(&key) {
                return Ok(existing.clone());
            }
            let new_map = Rc::new(RefCell::new(ObjectMap::new()));
            let new_value = Value::Object(Rc::clone(&new_map), tag.clone());
            visited.insert(key, new_value.clone());
            let mut out = ObjectMap::new();
            for (k, v) in map.borrow().iter() {
                out.insert(k.clone(), deep_clone_inner(v, visited)?);
            }
            *new_map.borrow_mut() = out;
            Ok(new_value)
        }
        other => Ok(other.clone()),
    }
}

fn stage(name: &str, args: &[Value]) -> EvalResult {
    expect_arity(args, 1)?;
    let payload = Document::from_value(&args[0])?;
    Ok(query::stage_document(name, payload).to_value())
}

fn comparator(name: &str, args: &[Value]) -> EvalResult {
    expect_arity(args, 2)?;
    let op = match name {
        "eq" => crate::ast::CompareOp::Eq,
        "ne" => crate::ast::CompareOp::Ne,
        "gt" => crate::ast::CompareOp::Gt,
        "gte" => crate::ast::CompareOp::Ge,
        "lt" => crate::ast::CompareOp::Lt,
        "lte" => crate::ast::CompareOp::Le,
        _ => unreachable!(),
    };
    let field = expect_string(args, 0)?.to_string();
    let value = Document::from_value(&args[1])?;
    Ok(query::comparator_document(&field, op, value).to_value())
}

fn logical(keyword: &str, args: Vec<Value>) -> EvalResult {
    let conditions: Vec<Value> = if args.len() == 1 {
        match &args[0] {
            Value::Array(a) => a.borrow().clone(),
            _ => args,
        }
    } else {
        args
    };
    let docs: Vec<Document> = conditions.iter().map(Document::from_value).collect::<Result<_, _>>()?;
    Ok(query::logical_document(keyword, docs).to_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    fn call(name: &str, args: Vec<Value>) -> EvalResult {
        let global = Environment::root();
        install(&global);
        let mut interp = Interpreter::new();
        let f = environment::lookup_var(&global, name).unwrap();
        match f {
            Value::NativeFn(n) => (n.implementation)(&mut interp, args),
            _ => unreachable!(),
        }
    }

    #[test]
    fn typeof_reports_tags() {
        assert_eq!(call("typeOf", vec![Value::Number(1.0)]).unwrap().display_string(), "number");
        assert_eq!(call("typeOf", vec![Value::string("x")]).unwrap().display_string(), "string");
    }

    #[test]
    fn typeof_reports_schema_name_for_a_tagged_instance() {
        let instance = Value::tagged_object(ObjectMap::new(), "Dog");
        assert_eq!(call("typeOf", vec![instance]).unwrap().display_string(), "Dog");
    }

    #[test]
    fn typeof_reports_class_name_for_a_class_value() {
        let class = Rc::new(crate::value::ClassValue {
            name: "Dog".to_string(),
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
            constructor_params: None,
            closure: Environment::root(),
        });
        assert_eq!(call("typeOf", vec![Value::Class(class)]).unwrap().display_string(), "Dog");
    }

    #[test]
    fn assert_throws_runtime_error_on_falsy() {
        let err = call("assert", vec![Value::Boolean(false), Value::string("nope")]);
        assert!(matches!(err, Err(EvalError::Fatal(RuntimeError::AssertionFailed { .. }))));
    }

    #[test]
    fn clamp_bounds_value() {
        assert_eq!(call("clamp", vec![Value::Number(15.0), Value::Number(0.0), Value::Number(10.0)]).unwrap().display_string(), "10");
    }

    #[test]
    fn deep_clone_breaks_array_identity() {
        let original = Value::array(vec![Value::array(vec![Value::Number(1.0)])]);
        let cloned = call("deepClone", vec![original.clone()]).unwrap();
        assert!(!original.equals(&cloned));
    }

    #[test]
    fn deep_clone_terminates_on_a_self_referencing_object() {
        let mut map = ObjectMap::new();
        map.insert("name".to_string(), Value::string("ada"));
        let original = Value::object(map);
        if let Value::Object(m, _) = &original {
            m.borrow_mut().insert("self".to_string(), original.clone());
        }
        let cloned = call("deepClone", vec![original.clone()]).unwrap();
        assert!(!original.equals(&cloned));
        let Value::Object(cloned_map, _) = &cloned else { panic!("expected object") };
        let self_ref = cloned_map.borrow().get("self").cloned().unwrap();
        assert!(self_ref.equals(&cloned));
    }

    #[test]
    fn eq_builds_field_comparator() {
        let v = call("eq", vec![Value::string("age"), Value::Number(30.0)]).unwrap();
        match v {
            Value::Object(map, _) => assert_eq!(map.borrow().get("age").unwrap().display_string(), "30"),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn or_accepts_a_single_array_argument() {
        let conds = Value::array(vec![Value::object(ObjectMap::new()), Value::object(ObjectMap::new())]);
        let v = call("or", vec![conds]).unwrap();
        match v {
            Value::Object(map, _) => assert!(map.borrow().contains_key("$or")),
            _ => panic!("expected object"),
        }
    }
}
