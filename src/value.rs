//! Runtime values.
//!
//! `Value` is the tagged union every Datascript expression evaluates to.
//! Variants with reference identity (`Array`, `Object`, `Function`,
//! `NativeFn`, `Class`) are `Rc<RefCell<...>>` handles: cloning a `Value`
//! clones the handle, not the underlying data, so mutation and
//! identity-equality (§4.5) both fall out of ordinary `Rc` semantics.

use crate::ast::{FieldDecl, MethodDecl, Param, Span, Stmt};
use crate::dsl::handle::{CollectionValue, DatabaseValue};
use crate::dsl::operation::OperationChain;
use crate::environment::EnvHandle;
use crate::eval::flow::EvalError;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// An ordered, insertion-order-preserving object payload.
pub type ObjectMap = IndexMap<String, Value>;

/// A native function's implementation.
///
/// Boxed as `dyn Fn` rather than a bare function pointer so natives can
/// close over interpreter-context state (the module loader, DSL registry,
/// task queue) without threading it through every call site by hand. Returns
/// [`EvalError`] rather than a bare `RuntimeError` because a schema method is
/// itself bound as a native thunk (§4.6) and its body may `throw` a catchable
/// value past the call site.
pub type NativeImpl = Rc<dyn Fn(&mut crate::eval::Interpreter, Vec<Value>) -> Result<Value, EvalError>>;

/// A declared function value: parameters, body, and captured environment.
#[derive(Clone)]
pub struct FunctionValue {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Rc<Vec<Stmt>>,
    pub closure: EnvHandle,
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue").field("name", &self.name).finish()
    }
}

/// A native (host-implemented) callable.
#[derive(Clone)]
pub struct NativeFnValue {
    pub name: String,
    pub implementation: NativeImpl,
}

impl fmt::Debug for NativeFnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFnValue").field("name", &self.name).finish()
    }
}

/// A declared `class`/`schema`: combined fields, methods, optional base and
/// constructor signature.
#[derive(Clone)]
pub struct ClassValue {
    pub name: String,
    pub base: Option<ClassHandle>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub constructor_params: Option<Vec<Param>>,
    pub closure: EnvHandle,
}

impl fmt::Debug for ClassValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassValue").field("name", &self.name).finish()
    }
}

/// An eventual value: either already settled or pending behind a scheduled
/// continuation in the interpreter context's task queue.
#[derive(Debug, Clone)]
pub enum Promise {
    Settled(Box<Value>),
    /// Resolves once the task with this id has run.
    Pending(u64),
}

pub type ArrayHandle = Rc<RefCell<Vec<Value>>>;
pub type ObjectHandle = Rc<RefCell<ObjectMap>>;
pub type FunctionHandle = Rc<FunctionValue>;
pub type NativeFnHandle = Rc<NativeFnValue>;
pub type ClassHandle = Rc<ClassValue>;
pub type PromiseHandle = Rc<RefCell<Promise>>;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Number(f64),
    Boolean(bool),
    String(Rc<str>),
    Array(ArrayHandle),
    /// `schema_name` is set when this object is a tagged schema instance.
    Object(ObjectHandle, Option<String>),
    Function(FunctionHandle),
    NativeFn(NativeFnHandle),
    Class(ClassHandle),
    Promise(PromiseHandle),
    /// A connected database handle bound by `database`/`using mongo`.
    Database(Rc<DatabaseValue>),
    /// A bound collection handle (`collection`/`use collection`, or derived
    /// from a database's auto-collection member access).
    Collection(Rc<CollectionValue>),
    /// The chainable result of a DSL operator (`<- ! !! ? ?? |>` or
    /// `update...where...set...with`).
    Operation(Rc<OperationChain>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(Rc::from(s.into()))
    }

    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn object(map: ObjectMap) -> Value {
        Value::Object(Rc::new(RefCell::new(map)), None)
    }

    pub fn tagged_object(map: ObjectMap, schema_name: impl Into<String>) -> Value {
        Value::Object(Rc::new(RefCell::new(map)), Some(schema_name.into()))
    }

    /// The lowercase type tag used in diagnostics and by `typeOf`.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(..) => "object",
            Value::Function(_) => "function",
            Value::NativeFn(_) => "function",
            Value::Class(_) => "class",
            Value::Promise(_) => "promise",
            Value::Database(_) => "database",
            Value::Collection(_) => "collection",
            Value::Operation(_) => "object",
        }
    }

    /// The schema name tagging this object, if any.
    pub fn schema_name(&self) -> Option<&str> {
        match self {
            Value::Object(_, Some(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Truthiness per §4.5: `Null`/`false`/`0`/empty string/empty array/empty
    /// object are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.borrow().is_empty(),
            Value::Object(o, _) => !o.borrow().is_empty(),
            Value::Function(_) | Value::NativeFn(_) | Value::Class(_) | Value::Promise(_) => true,
            Value::Database(_) | Value::Collection(_) | Value::Operation(_) => true,
        }
    }

    /// Equality per §4.5: `Null == Null`; scalars compare by value; reference
    /// types compare by identity (handle pointer equality).
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a, _), Value::Object(b, _)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::NativeFn(a), Value::NativeFn(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::Database(a), Value::Database(b)) => Rc::ptr_eq(a, b),
            (Value::Collection(a), Value::Collection(b)) => Rc::ptr_eq(a, b),
            (Value::Operation(a), Value::Operation(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Best-effort stringification used by `print`/string concatenation.
    /// Not a stable serialization format; see `to_json_string` for that.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
            Value::String(s) => s.to_string(),
            Value::Array(a) => {
                let items: Vec<String> = a.borrow().iter().map(Value::display_string).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Object(o, tag) => {
                let entries: Vec<String> = o
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.display_string()))
                    .collect();
                match tag {
                    Some(name) => format!("{} {{ {} }}", name, entries.join(", ")),
                    None => format!("{{ {} }}", entries.join(", ")),
                }
            }
            Value::Function(f) => format!("<function {}>", f.name),
            Value::NativeFn(f) => format!("<native {}>", f.name),
            Value::Class(c) => format!("<class {}>", c.name),
            Value::Promise(_) => "<promise>".to_string(),
            Value::Database(d) => format!("<database {}>", d.name()),
            Value::Collection(c) => format!("<collection {}>", c.name()),
            Value::Operation(o) => format!("<operation {}>", o.value.display_string()),
        }
    }
}

/// Formats a number the way Datascript source text would: integral floats
/// print without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

/// A span-carrying pointer back into the AST for diagnostics produced deep
/// inside evaluation (e.g. schema field errors).
#[derive(Debug, Clone, Copy)]
pub struct EvalSpan(pub Span);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_the_lattice() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(1.0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("x").is_truthy());
        assert!(!Value::array(vec![]).is_truthy());
        assert!(Value::array(vec![Value::Null]).is_truthy());
    }

    #[test]
    fn arrays_compare_by_identity_not_contents() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = Value::array(vec![Value::Number(1.0)]);
        assert!(!a.equals(&b));
        assert!(a.equals(&a.clone()));
    }

    #[test]
    fn scalars_compare_by_value() {
        assert!(Value::Number(1.0).equals(&Value::Number(1.0)));
        assert!(Value::string("a").equals(&Value::string("a")));
        assert!(!Value::Number(1.0).equals(&Value::string("1")));
    }

    #[test]
    fn integral_numbers_display_without_decimal() {
        assert_eq!(format_number(14.0), "14");
        assert_eq!(format_number(1.5), "1.5");
    }
}
