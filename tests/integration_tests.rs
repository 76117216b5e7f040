//! End-to-end tests for the Datascript language core.
//!
//! These exercise the full pipeline (lex -> parse -> evaluate) on whole
//! programs rather than individual AST nodes, covering the scenarios a
//! language this size is expected to get right: arithmetic and strings,
//! class inheritance and method binding, exception propagation, module
//! imports across files, DSL query lowering, and cooperative async.

use datascript::dsl::query::lower_query;
use datascript::value::Value;
use datascript::{run_source, DatascriptError};

fn run(source: &str) -> Value {
    run_source(source).unwrap_or_else(|e| panic!("program failed: {e}\n---\n{source}"))
}

// ============================================================================
// ARITHMETIC AND STRINGS
// ============================================================================

#[test]
fn arithmetic_respects_operator_precedence() {
    assert_eq!(run("2 + 3 * 4;").display_string(), "14");
    assert_eq!(run("(2 + 3) * 4;").display_string(), "20");
    assert_eq!(run("10 % 3;").display_string(), "1");
}

#[test]
fn string_concatenation_promotes_numbers() {
    let result = run(r#"declare greeting = "count: " + 5; greeting;"#);
    assert_eq!(result.display_string(), "count: 5");
}

#[test]
fn division_by_zero_is_a_fatal_runtime_error() {
    let err = run_source("1 / 0;").unwrap_err();
    assert!(matches!(err, DatascriptError::Runtime(_)));
}

// ============================================================================
// SCHEMAS, INHERITANCE, METHOD BINDING
// ============================================================================

#[test]
fn subclass_inherits_and_overrides_base_behavior() {
    let source = r#"
        schema Animal {
            required name: string;
            speak() { return name + " makes a sound"; }
        }
        schema Dog extends Animal {
            speak() { return name + " barks"; }
        }
        declare generic = Animal({ name: "Generic" });
        declare rex = Dog({ name: "Rex" });
        generic.speak() + " | " + rex.speak();
    "#;
    assert_eq!(run(source).display_string(), "Generic makes a sound | Rex barks");
}

#[test]
fn methods_observe_field_mutations_made_by_other_methods() {
    let source = r#"
        schema Counter {
            required count: number;
            increment() { count = count + 1; }
            value() { return count; }
        }
        declare c = Counter({ count: 0 });
        c.increment();
        c.increment();
        c.value();
    "#;
    assert_eq!(run(source).display_string(), "2");
}

#[test]
fn type_of_a_schema_instance_reports_its_schema_name() {
    let source = r#"
        schema A { required name: string; greet() { return "hi " + name; } }
        schema B extends A { required age: number; }
        declare b = B({ name: "ada", age: 9 });
        typeOf(b);
    "#;
    assert_eq!(run(source).display_string(), "B");
}

#[test]
fn schema_info_describes_a_class_and_its_instance() {
    let class_source = r#"
        schema Animal { required name: string; speak() { return name; } }
        schema Dog extends Animal { required age: number = 1; }
        schemaInfo(Dog);
    "#;
    let info = run(class_source);
    let Value::Object(map, _) = &info else { panic!("expected object") };
    let map = map.borrow();
    assert_eq!(map.get("kind").unwrap().display_string(), "class");
    assert_eq!(map.get("name").unwrap().display_string(), "Dog");
    assert_eq!(map.get("extends").unwrap().display_string(), "Animal");
    assert!(!map.contains_key("values"));
    let Value::Array(fields) = map.get("fields").unwrap() else { panic!("expected array") };
    let fields = fields.borrow();
    let Value::Object(name_field, _) = fields.iter().find(|f| {
        matches!(f, Value::Object(m, _) if m.borrow().get("name").unwrap().display_string() == "name")
    }).unwrap() else { panic!("expected object") };
    assert_eq!(name_field.borrow().get("hasDefault").unwrap().display_string(), "false");
    let Value::Object(age_field, _) = fields.iter().find(|f| {
        matches!(f, Value::Object(m, _) if m.borrow().get("name").unwrap().display_string() == "age")
    }).unwrap() else { panic!("expected object") };
    assert_eq!(age_field.borrow().get("hasDefault").unwrap().display_string(), "true");

    let instance_source = r#"
        schema Animal { required name: string; speak() { return name; } }
        schema Dog extends Animal { required age: number = 1; }
        declare rex = Dog({ name: "Rex", age: 3 });
        schemaInfo(rex);
    "#;
    let info = run(instance_source);
    let Value::Object(map, _) = &info else { panic!("expected object") };
    let map = map.borrow();
    assert_eq!(map.get("kind").unwrap().display_string(), "instance");
    let Value::Object(values, _) = map.get("values").unwrap() else { panic!("expected values object") };
    assert_eq!(values.borrow().get("name").unwrap().display_string(), "Rex");
}

#[test]
fn schedule_snapshots_arguments_at_call_time() {
    let source = r#"
        schema Box { required seen: string; setSeen(v) { seen = v; } }
        declare b = Box({ seen: "original" });
        declare observed = "unset";
        schedule(1, func(x) { observed = x.seen; }, [b]);
        b.setSeen("mutated");
        await sleep(5);
        observed;
    "#;
    assert_eq!(run(source).display_string(), "original");
}

#[test]
fn missing_required_field_is_a_schema_field_error() {
    let source = r#"
        schema Point { required x: number; required y: number; }
        Point({ x: 1 });
    "#;
    let err = run_source(source).unwrap_err();
    assert!(matches!(err, DatascriptError::Runtime(_)));
}

// ============================================================================
// EXCEPTIONS
// ============================================================================

#[test]
fn try_catch_recovers_from_a_thrown_value() {
    let source = r#"
        declare result = "unset";
        try {
            throw "boom";
        } catch (e) {
            result = "caught " + e;
        }
        result;
    "#;
    assert_eq!(run(source).display_string(), "caught boom");
}

#[test]
fn uncaught_throw_surfaces_as_an_uncaught_error() {
    let err = run_source(r#"throw { code: 42 };"#).unwrap_err();
    assert!(matches!(err, DatascriptError::Uncaught(_)));
}

#[test]
fn exceptions_propagate_out_of_nested_function_calls() {
    let source = r#"
        func inner() { throw "deep"; }
        func outer() { inner(); }
        declare caught = "unset";
        try {
            outer();
        } catch (e) {
            caught = e;
        }
        caught;
    "#;
    assert_eq!(run(source).display_string(), "deep");
}

// ============================================================================
// MODULES
// ============================================================================

// These two tests import fixture files under `tests/fixtures/`, resolved
// relative to the process working directory (the crate root under `cargo
// test`), since a top-level program parsed from a string rather than loaded
// from a file has no module context of its own to resolve against.

#[test]
fn import_exposes_named_bindings_from_another_file() {
    let source = r#"
        import "./tests/fixtures/mathutils" exposing { square, PI };
        square(4) + PI;
    "#;
    assert_eq!(run(source).display_string(), "19.14159");
}

#[test]
fn circular_imports_are_rejected() {
    let source = r#"import "./tests/fixtures/circular_a" exposing { a }; a;"#;
    let err = run_source(source).unwrap_err();
    assert!(matches!(err, DatascriptError::Runtime(_)));
}

// ============================================================================
// DOCUMENT-STORE DSL LOWERING
// ============================================================================

#[test]
fn query_block_lowers_multiple_conditions_on_the_same_field() {
    use datascript::ast::CompareOp;
    use datascript::dsl::document::Document;

    let conditions = vec![
        ("a".to_string(), CompareOp::Eq, Document::Number(1.0)),
        ("a".to_string(), CompareOp::Gt, Document::Number(0.0)),
        ("b".to_string(), CompareOp::Ne, Document::Number(2.0)),
    ];
    let filter = lower_query(&conditions);
    let obj = filter.as_object().expect("query lowers to an object document");
    let a = obj.get("a").unwrap().as_object().unwrap();
    assert_eq!(a.get("$eq").unwrap(), &Document::Number(1.0));
    assert_eq!(a.get("$gt").unwrap(), &Document::Number(0.0));
    let b = obj.get("b").unwrap().as_object().unwrap();
    assert_eq!(b.get("$ne").unwrap(), &Document::Number(2.0));
}

#[test]
fn insert_then_find_round_trips_through_the_memory_driver() {
    let source = r#"
        database Shop = connect("memory://shop");
        collection Items;
        use collection Items;
        Items <- { name: "widget", price: 10 };
        Items <- { name: "gadget", price: 20 };
        declare found = Items ? query { name == "widget" };
        found.value.name;
    "#;
    assert_eq!(run(source).display_string(), "widget");
}

// ============================================================================
// COOPERATIVE ASYNC
// ============================================================================

#[test]
fn await_on_a_sleep_resumes_with_its_completion_value() {
    let source = r#"
        func delayed() {
            await sleep(5);
            return "done";
        }
        delayed();
    "#;
    assert_eq!(run(source).display_string(), "done");
}

#[test]
fn scheduled_callbacks_run_in_due_time_order() {
    let source = r#"
        declare order = "unset";
        schedule(10, func() { order = "second"; });
        schedule(1, func() { order = "first"; });
        await sleep(20);
        order;
    "#;
    assert_eq!(run(source).display_string(), "first");
}
