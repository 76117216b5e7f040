//! The tree-walking evaluator: statement/expression dispatch, schema
//! instantiation and method binding, module loading, and the document-store
//! DSL's statement and operator forms.
//!
//! One [`Interpreter`] owns everything a running program needs beyond the
//! lexical environment chain itself: the global scope, the [`ModuleLoader`],
//! the cooperative [`TaskQueue`], and the small bit of process state the DSL
//! statements thread through (`database`/`collection`/`using mongo`).

use crate::ast::{ClassMember, Expr, ExportKind, FieldDecl, MethodDecl, Param, Stmt, TypeAnnotation};
use crate::dsl::document::Document;
use crate::dsl::driver::{CollectionHandle, Cursor, DatabaseHandle, UpdateResult};
use crate::dsl::handle::{CollectionValue, DatabaseValue};
use crate::dsl::memory;
use crate::dsl::operation::OperationChain;
use crate::dsl::query;
use crate::environment::{self, EnvHandle, Environment};
use crate::error::{DatascriptError, RuntimeError, RuntimeException};
use crate::eval::builtins;
use crate::eval::flow::{EvalError, EvalResult, Signal, StmtResult};
use crate::eval::tasks::{TaskKind, TaskQueue};
use crate::module::ModuleLoader;
use crate::value::{
    ClassHandle, ClassValue, FunctionHandle, FunctionValue, NativeFnValue, NativeImpl, ObjectHandle,
    ObjectMap, Promise, Value,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;

/// A key used to look up a member on an object/array/database/etc: either a
/// dotted property name or the result of evaluating a computed `[...]`
/// expression.
enum MemberKey {
    Name(String),
    Index(i64),
}

impl MemberKey {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Number(n) => MemberKey::Index(n.trunc() as i64),
            Value::String(s) => MemberKey::Name(s.to_string()),
            other => MemberKey::Name(other.display_string()),
        }
    }

    fn as_name(&self) -> String {
        match self {
            MemberKey::Name(n) => n.clone(),
            MemberKey::Index(i) => i.to_string(),
        }
    }
}

/// The active database binding, tracked so `collection`/`use collection`
/// without an explicit source can auto-derive from it, and so `database`/
/// `using mongo` know what to tear down on exit.
#[derive(Clone)]
struct ActiveDatabase {
    binding: String,
    value: Rc<DatabaseValue>,
}

/// The small bit of process state the DSL statements thread through a run.
/// Snapshotted and restored around `using mongo ... { ... }` blocks.
#[derive(Clone, Default)]
struct DslState {
    active_database: Option<ActiveDatabase>,
    collections: HashSet<String>,
}

/// Owns everything a running program needs beyond the lexical environment
/// chain: the global scope, module loader, task queue, and DSL/schema side
/// tables.
pub struct Interpreter {
    pub global: EnvHandle,
    pub modules: ModuleLoader,
    pub tasks: TaskQueue,
    dsl: DslState,
    classes: RefCell<HashMap<String, ClassHandle>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let global = Environment::root();
        builtins::install(&global);
        Interpreter {
            global,
            modules: ModuleLoader::new(),
            tasks: TaskQueue::new(),
            dsl: DslState::default(),
            classes: RefCell::new(HashMap::new()),
        }
    }

    /// Runs a parsed top-level program to completion in the global scope.
    ///
    /// The program's result is the value of its last top-level bare
    /// expression statement (REPL-style completion value), or whatever an
    /// explicit top-level `return` produces. This only applies at this
    /// outermost level — nested blocks and function bodies still require an
    /// explicit `return` to produce a value, via [`Interpreter::exec_block`].
    pub fn run_program(&mut self, program: &Stmt) -> Result<Value, DatascriptError> {
        let body: Vec<Stmt> = match program {
            Stmt::Program { body } => body.clone(),
            other => vec![other.clone()],
        };
        let global = Rc::clone(&self.global);
        let mut last_value = Value::Null;
        for stmt in &body {
            if let Stmt::ExprStatement { expr, .. } = stmt {
                last_value = match self.eval_expr(expr, &global) {
                    Ok(v) => v,
                    Err(e) => return Err(eval_error_to_program_error(e)),
                };
                continue;
            }
            last_value = Value::Null;
            match self.eval_stmt(stmt, &global) {
                Ok(Some(Signal::Return(v))) => return Ok(v),
                Ok(Some(Signal::Break)) => {
                    return Err(RuntimeError::LoopControlOutsideLoop { keyword: "break" }.into())
                }
                Ok(Some(Signal::Continue)) => {
                    return Err(RuntimeError::LoopControlOutsideLoop { keyword: "continue" }.into())
                }
                Ok(None) => {}
                Err(e) => return Err(eval_error_to_program_error(e)),
            }
        }
        Ok(last_value)
    }

    /// Registers a declared class under its name, so `schemaInfo` can find
    /// its definition given only a tagged instance.
    fn register_class(&self, class: &ClassHandle) {
        self.classes.borrow_mut().insert(class.name.clone(), Rc::clone(class));
    }

    /// Looks up a previously declared class by name.
    pub(crate) fn lookup_class(&self, name: &str) -> Option<ClassHandle> {
        self.classes.borrow().get(name).cloned()
    }

    /// The currently active database binding, if any (fatal `Dsl` error if
    /// none — every DSL auto-derivation path requires one).
    fn active_database(&self) -> Result<Rc<DatabaseValue>, RuntimeError> {
        self.dsl
            .active_database
            .as_ref()
            .map(|a| Rc::clone(&a.value))
            .ok_or_else(|| RuntimeError::Dsl { message: "no active database".to_string() })
    }

    pub(crate) fn dsl_active_database(&self) -> Option<Rc<DatabaseValue>> {
        self.dsl.active_database.as_ref().map(|a| Rc::clone(&a.value))
    }

    pub(crate) fn dsl_clear(&mut self) {
        self.dsl = DslState::default();
    }

    // ---------------------------------------------------------------
    // Statement execution
    // ---------------------------------------------------------------

    /// Executes a sequence of statements directly in `env` (no new child
    /// scope — callers that need block scoping create the child first).
    fn exec_block(&mut self, stmts: &[Stmt], env: &EnvHandle) -> StmtResult {
        for stmt in stmts {
            if let Some(signal) = self.eval_stmt(stmt, env)? {
                return Ok(Some(signal));
            }
        }
        Ok(None)
    }

    fn eval_stmt(&mut self, stmt: &Stmt, env: &EnvHandle) -> StmtResult {
        match stmt {
            Stmt::Program { body } => self.exec_block(body, env),

            Stmt::VarDeclaration { name, is_const, initializer, .. } => {
                let value = match initializer {
                    Some(e) => self.eval_expr(e, env)?,
                    None => Value::Null,
                };
                environment::declare_var(env, name, value, *is_const)?;
                Ok(None)
            }

            Stmt::FunctionDeclaration { name, params, body, .. } => {
                let f = FunctionValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: Rc::new(body.clone()),
                    closure: Rc::clone(env),
                };
                environment::declare_var(env, name, Value::Function(Rc::new(f)), false)?;
                Ok(None)
            }

            Stmt::ClassDeclaration { name, base, constructor_params, members, .. } => {
                self.eval_class_declaration(name, base, constructor_params, members, env)?;
                Ok(None)
            }

            Stmt::ExprStatement { expr, .. } => {
                self.eval_expr(expr, env)?;
                Ok(None)
            }

            Stmt::IfStatement { condition, then_branch, else_branch, .. } => {
                let cond = self.eval_expr(condition, env)?;
                if cond.is_truthy() {
                    self.exec_block(then_branch, &Environment::child(env))
                } else if let Some(else_b) = else_branch {
                    self.exec_block(else_b, &Environment::child(env))
                } else {
                    Ok(None)
                }
            }

            Stmt::WhileStatement { condition, body, .. } => {
                loop {
                    let cond = self.eval_expr(condition, env)?;
                    if !cond.is_truthy() {
                        break;
                    }
                    let loop_env = Environment::child(env);
                    match self.exec_block(body, &loop_env)? {
                        Some(Signal::Break) => break,
                        Some(Signal::Continue) | None => continue,
                        Some(signal @ Signal::Return(_)) => return Ok(Some(signal)),
                    }
                }
                Ok(None)
            }

            Stmt::ReturnStatement { value, .. } => {
                let v = match value {
                    Some(e) => self.eval_expr(e, env)?,
                    None => Value::Null,
                };
                Ok(Some(Signal::Return(v)))
            }

            Stmt::BreakStatement { .. } => Ok(Some(Signal::Break)),
            Stmt::ContinueStatement { .. } => Ok(Some(Signal::Continue)),

            Stmt::TryCatchStatement { try_block, catch_param, catch_block, .. } => {
                let try_env = Environment::child(env);
                match self.exec_block(try_block, &try_env) {
                    Ok(signal) => Ok(signal),
                    Err(EvalError::Exception(val)) => {
                        let catch_env = Environment::child(env);
                        if let Some(param) = catch_param {
                            environment::declare_var(&catch_env, param, val, false)?;
                        }
                        self.exec_block(catch_block, &catch_env)
                    }
                    Err(fatal) => Err(fatal),
                }
            }

            Stmt::ThrowStatement { value, .. } => {
                let v = self.eval_expr(value, env)?;
                Err(EvalError::Exception(v))
            }

            Stmt::ImportStatement { specifier, namespace_alias, exposing, default_alias, .. } => {
                self.eval_import(specifier, namespace_alias, exposing, default_alias, env)?;
                Ok(None)
            }

            Stmt::ExportDeclaration { kind, .. } => {
                self.eval_export(kind, env)?;
                Ok(None)
            }

            Stmt::DatabaseStatement { name, initializer, .. } => {
                self.eval_database_statement(name, initializer, env)?;
                Ok(None)
            }

            Stmt::CollectionStatement { name, initializer, .. } => {
                self.eval_collection_statement(name, initializer.as_deref(), env)?;
                Ok(None)
            }

            Stmt::UseCollectionStatement { name, options, .. } => {
                self.eval_use_collection_statement(name, options.as_deref(), env)?;
                Ok(None)
            }

            Stmt::UsingStatement { uri, database, alias, options, body, .. } => self.eval_using_statement(
                uri,
                database.as_deref(),
                alias.as_deref(),
                options.as_deref(),
                body,
                env,
            ),
        }
    }

    fn declared_name(stmt: &Stmt) -> Option<String> {
        match stmt {
            Stmt::VarDeclaration { name, .. }
            | Stmt::FunctionDeclaration { name, .. }
            | Stmt::ClassDeclaration { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    fn eval_export(&mut self, kind: &ExportKind, env: &EnvHandle) -> Result<(), EvalError> {
        match kind {
            ExportKind::Default(expr) => {
                let v = self.eval_expr(expr, env)?;
                environment::set_module_export(env, "default", v);
            }
            ExportKind::Named(names) => {
                for n in names {
                    let v = environment::lookup_var(env, &n.name)?;
                    environment::set_module_export(env, &n.name, v);
                }
            }
            ExportKind::Declaration(stmt) => {
                self.eval_stmt(stmt, env)?;
                if let Some(name) = Self::declared_name(stmt) {
                    let v = environment::lookup_var(env, &name)?;
                    environment::set_module_export(env, &name, v);
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Module imports
    // ---------------------------------------------------------------

    fn eval_import(
        &mut self,
        specifier: &str,
        namespace_alias: &Option<String>,
        exposing: &[crate::ast::ExposedName],
        default_alias: &Option<String>,
        env: &EnvHandle,
    ) -> Result<(), EvalError> {
        let path = self.modules.resolve_import_path(specifier)?;
        let namespace = self.load_module(&path)?;

        if let Some(alias) = namespace_alias {
            Self::bind_import(env, alias, namespace.clone())?;
        }
        for exp in exposing {
            let member = Self::namespace_member(&namespace, &exp.name).ok_or_else(|| {
                crate::error::ScopeError::UnknownExport { module: specifier.to_string(), name: exp.name.clone() }
            })?;
            Self::bind_import(env, &exp.name, member)?;
        }
        if let Some(alias) = default_alias {
            let member = Self::namespace_member(&namespace, "default").ok_or_else(|| {
                crate::error::ScopeError::UnknownExport { module: specifier.to_string(), name: "default".to_string() }
            })?;
            Self::bind_import(env, alias, member)?;
        }
        Ok(())
    }

    fn bind_import(env: &EnvHandle, name: &str, value: Value) -> Result<(), EvalError> {
        if env.borrow().has_own_binding(name) {
            return Err(crate::error::ScopeError::ImportBindingClash { name: name.to_string() }.into());
        }
        environment::declare_var(env, name, value, true)?;
        Ok(())
    }

    fn namespace_member(namespace: &Value, name: &str) -> Option<Value> {
        match namespace {
            Value::Object(map, _) => map.borrow().get(name).cloned(),
            _ => None,
        }
    }

    fn load_module(&mut self, path: &Path) -> Result<Value, EvalError> {
        if let Some(cached) = self.modules.cached_result(path) {
            return Ok(cached);
        }
        self.modules.enter(path)?;
        let load_result = self.load_module_inner(path);
        self.modules.exit(path);
        match load_result {
            Ok(namespace) => {
                self.modules.cache_result(path, namespace.clone());
                Ok(namespace)
            }
            Err(e) => {
                self.modules.evict_result(path);
                Err(e)
            }
        }
    }

    fn load_module_inner(&mut self, path: &Path) -> Result<Value, EvalError> {
        let source = std::fs::read_to_string(path).map_err(|e| RuntimeError::Io { message: e.to_string() })?;
        let program = self.modules.get_module_program(path, &source)?;
        let module_env = Environment::module_child(&self.global);
        let body: Vec<Stmt> = match program.as_ref() {
            Stmt::Program { body } => body.clone(),
            other => vec![other.clone()],
        };
        self.exec_block(&body, &module_env)?;
        let exports = environment::get_module_exports(&module_env);
        let mut map = ObjectMap::new();
        for (k, v) in exports {
            map.insert(k, v);
        }
        Ok(Value::object(map))
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    fn eval_expr(&mut self, expr: &Expr, env: &EnvHandle) -> EvalResult {
        match expr {
            Expr::NumericLiteral { value, .. } => Ok(Value::Number(*value)),
            Expr::StringLiteral { value, .. } => Ok(Value::string(value.clone())),
            Expr::BooleanLiteral { value, .. } => Ok(Value::Boolean(*value)),
            Expr::NullLiteral { .. } => Ok(Value::Null),
            Expr::Identifier { name, .. } => Ok(environment::lookup_var(env, name)?),

            Expr::ObjectLiteral { entries, .. } => {
                let mut map = ObjectMap::new();
                for entry in entries {
                    let v = self.eval_expr(&entry.value, env)?;
                    map.insert(entry.key.clone(), v);
                }
                Ok(Value::object(map))
            }

            Expr::ArrayLiteral { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for e in elements {
                    items.push(self.eval_expr(e, env)?);
                }
                Ok(Value::array(items))
            }

            Expr::AssignmentExpr { name, value, .. } => {
                let v = self.eval_expr(value, env)?;
                environment::assign_var(env, name, v.clone())?;
                Ok(v)
            }

            Expr::BinaryExpr { op, left, right, .. } => self.eval_binary(*op, left, right, env),

            Expr::UnaryExpr { op, operand, .. } => {
                let v = self.eval_expr(operand, env)?;
                match op {
                    '!' => Ok(Value::Boolean(!v.is_truthy())),
                    '-' => match v {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(RuntimeError::type_error("a number", other.type_tag()).into()),
                    },
                    other => unreachable!("parser never produces unary operator '{other}'"),
                }
            }

            Expr::AwaitExpr { operand, .. } => {
                let v = self.eval_expr(operand, env)?;
                self.await_value(v)
            }

            Expr::CallExpr { callee, args, .. } => {
                let callee_val = self.eval_expr(callee, env)?;
                let mut arg_vals = Vec::with_capacity(args.len());
                for a in args {
                    arg_vals.push(self.eval_expr(a, env)?);
                }
                self.call_value(callee_val, arg_vals)
            }

            Expr::MemberExpr { object, computed, property, .. } => {
                let obj_val = self.eval_expr(object, env)?;
                let key = match computed {
                    Some(e) => {
                        let v = self.eval_expr(e, env)?;
                        MemberKey::from_value(v)
                    }
                    None => MemberKey::Name(property.clone()),
                };
                self.eval_member(obj_val, key)
            }

            Expr::MongoQueryExpr { conditions, .. } => {
                let mut conds = Vec::with_capacity(conditions.len());
                for c in conditions {
                    let v = self.eval_expr(&c.value, env)?;
                    let doc = Document::from_value(&v)?;
                    conds.push((c.field.clone(), c.op, doc));
                }
                Ok(query::lower_query(&conds).to_value())
            }

            Expr::MongoOperationExpr { collection, op, operand, .. } => {
                self.eval_mongo_operation(collection, *op, operand, env)
            }

            Expr::MongoUpdateExpr { target, filter, update, options, many, .. } => {
                self.eval_mongo_update_expr(target, filter, update, options.as_deref(), *many, env)
            }
        }
    }

    fn eval_binary(&mut self, op: crate::ast::BinaryOp, left: &Expr, right: &Expr, env: &EnvHandle) -> EvalResult {
        use crate::ast::BinaryOp as B;
        match op {
            B::And => {
                let l = self.eval_expr(left, env)?;
                if !l.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
                let r = self.eval_expr(right, env)?;
                Ok(Value::Boolean(r.is_truthy()))
            }
            B::Or => {
                let l = self.eval_expr(left, env)?;
                if l.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
                let r = self.eval_expr(right, env)?;
                Ok(Value::Boolean(r.is_truthy()))
            }
            B::Eq => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                Ok(Value::Boolean(l.equals(&r)))
            }
            B::Ne => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                Ok(Value::Boolean(!l.equals(&r)))
            }
            B::Lt | B::Le | B::Gt | B::Ge => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                let ord = match (&l, &r) {
                    (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                    (Value::String(a), Value::String(b)) => Some(a.as_ref().cmp(b.as_ref())),
                    _ => {
                        return Err(RuntimeError::type_error(
                            "two numbers or two strings",
                            format!("{} and {}", l.type_tag(), r.type_tag()),
                        )
                        .into())
                    }
                };
                let ord = ord.ok_or_else(|| RuntimeError::type_error("comparable numbers", "NaN"))?;
                let result = match op {
                    B::Lt => ord.is_lt(),
                    B::Le => ord.is_le(),
                    B::Gt => ord.is_gt(),
                    B::Ge => ord.is_ge(),
                    _ => unreachable!(),
                };
                Ok(Value::Boolean(result))
            }
            B::Add => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                match (&l, &r) {
                    (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                    (Value::String(_), _) | (_, Value::String(_)) => {
                        Ok(Value::string(format!("{}{}", l.display_string(), r.display_string())))
                    }
                    _ => Err(RuntimeError::type_error(
                        "two numbers or a string operand",
                        format!("{} and {}", l.type_tag(), r.type_tag()),
                    )
                    .into()),
                }
            }
            B::Sub | B::Mul | B::Div | B::Mod => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                let (a, b) = match (&l, &r) {
                    (Value::Number(a), Value::Number(b)) => (*a, *b),
                    _ => return Err(RuntimeError::type_error("two numbers", format!("{} and {}", l.type_tag(), r.type_tag())).into()),
                };
                match op {
                    B::Sub => Ok(Value::Number(a - b)),
                    B::Mul => Ok(Value::Number(a * b)),
                    B::Div => {
                        if b == 0.0 {
                            Err(RuntimeError::DivisionByZero.into())
                        } else {
                            Ok(Value::Number(a / b))
                        }
                    }
                    B::Mod => {
                        if b == 0.0 {
                            Err(RuntimeError::DivisionByZero.into())
                        } else {
                            Ok(Value::Number(a % b))
                        }
                    }
                    _ => unreachable!(),
                }
            }
        }
    }

    fn eval_member(&self, object: Value, key: MemberKey) -> EvalResult {
        match &object {
            Value::Array(arr) => match &key {
                MemberKey::Name(name) if name == "length" => Ok(Value::Number(arr.borrow().len() as f64)),
                MemberKey::Name(_) => Ok(Value::Null),
                MemberKey::Index(i) => {
                    let len = arr.borrow().len();
                    if *i < 0 || *i as usize >= len {
                        return Err(RuntimeError::IndexOutOfBounds { index: *i, length: len }.into());
                    }
                    Ok(arr.borrow()[*i as usize].clone())
                }
            },
            Value::Object(map, _) => {
                let name = key.as_name();
                Ok(map.borrow().get(&name).cloned().unwrap_or(Value::Null))
            }
            Value::Database(db) => {
                let name = key.as_name();
                match name.as_str() {
                    "name" => Ok(Value::string(db.name())),
                    "uri" => Ok(Value::string(db.uri())),
                    _ => Ok(Value::Collection(db.collection(&name))),
                }
            }
            Value::Collection(col) => {
                let name = key.as_name();
                match name.as_str() {
                    "name" => Ok(Value::string(col.name())),
                    _ => Ok(Value::Null),
                }
            }
            Value::Operation(chain) => self.eval_operation_member(chain, &key),
            Value::Class(class) => {
                let name = key.as_name();
                match name.as_str() {
                    "name" => Ok(Value::string(class.name.clone())),
                    _ => Ok(Value::Null),
                }
            }
            Value::String(s) => {
                let name = key.as_name();
                if name == "length" {
                    Ok(Value::Number(s.chars().count() as f64))
                } else {
                    Ok(Value::Null)
                }
            }
            _ => Ok(Value::Null),
        }
    }

    // ---------------------------------------------------------------
    // Calls, functions, classes
    // ---------------------------------------------------------------

    fn call_value(&mut self, callee: Value, args: Vec<Value>) -> EvalResult {
        match callee {
            Value::Function(f) => self.call_function(&f, args),
            Value::NativeFn(n) => (n.implementation)(self, args),
            Value::Class(c) => self.instantiate_class(&c, args),
            other => Err(RuntimeError::NotCallable { actual: other.type_tag().to_string() }.into()),
        }
    }

    fn call_function(&mut self, f: &FunctionHandle, args: Vec<Value>) -> EvalResult {
        let call_env = Environment::child(&f.closure);
        self.bind_params(&f.params, args, &call_env, None, "")?;
        match self.exec_block(&f.body, &call_env)? {
            Some(Signal::Return(v)) => Ok(v),
            Some(Signal::Break) => Err(RuntimeError::LoopControlOutsideLoop { keyword: "break" }.into()),
            Some(Signal::Continue) => Err(RuntimeError::LoopControlOutsideLoop { keyword: "continue" }.into()),
            None => Ok(Value::Null),
        }
    }

    /// Binds `args` to `params` in `env`, evaluating defaults (in `env`, so
    /// later defaults can see earlier parameters) and type-checking
    /// annotated parameters. `allow_assign_over` names that should be
    /// assigned into an existing binding rather than freshly declared (used
    /// by method calls, where a parameter can collide with a field local).
    fn bind_params(
        &mut self,
        params: &[Param],
        args: Vec<Value>,
        env: &EnvHandle,
        allow_assign_over: Option<&HashSet<&str>>,
        what_prefix: &str,
    ) -> Result<(), EvalError> {
        if args.len() > params.len() {
            return Err(RuntimeError::ArityMismatch { expected: params.len().to_string(), actual: args.len() }.into());
        }
        let mut args_iter = args.into_iter();
        for param in params {
            let val = match args_iter.next() {
                Some(v) => v,
                None => match &param.default {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => {
                        let required = params.iter().take_while(|p| p.default.is_none()).count();
                        return Err(RuntimeError::ArityMismatch { expected: format!("at least {required}"), actual: 0 }.into());
                    }
                },
            };
            if let Some(ann) = &param.annotation {
                type_check(&val, ann, true, None, &format!("{what_prefix}parameter '{}'", param.name))?;
            }
            if allow_assign_over.map(|names| names.contains(param.name.as_str())).unwrap_or(false) {
                environment::assign_var(env, &param.name, val)?;
            } else {
                environment::declare_var(env, &param.name, val, false)?;
            }
        }
        Ok(())
    }

    fn eval_class_declaration(
        &mut self,
        name: &str,
        base: &Option<String>,
        constructor_params: &Option<Vec<Param>>,
        members: &[ClassMember],
        env: &EnvHandle,
    ) -> Result<(), EvalError> {
        let base_class: Option<ClassHandle> = match base {
            Some(bname) => match environment::lookup_var(env, bname)? {
                Value::Class(c) => Some(c),
                _ => return Err(RuntimeError::InvalidBase { name: bname.clone() }.into()),
            },
            None => None,
        };

        let mut fields: Vec<FieldDecl> = base_class.as_ref().map(|c| c.fields.clone()).unwrap_or_default();
        let mut methods: Vec<MethodDecl> = base_class.as_ref().map(|c| c.methods.clone()).unwrap_or_default();

        for member in members {
            match member {
                ClassMember::Field(f) => {
                    if let Some(existing) = fields.iter_mut().find(|e| e.name == f.name) {
                        *existing = f.clone();
                    } else {
                        fields.push(f.clone());
                    }
                }
                ClassMember::Method(m) => {
                    if let Some(existing) = methods.iter_mut().find(|e| e.name == m.name) {
                        *existing = m.clone();
                    } else {
                        methods.push(m.clone());
                    }
                }
            }
        }

        let combined_ctor = match constructor_params {
            Some(params) => {
                let mut base_params = base_class.as_ref().and_then(|c| c.constructor_params.clone()).unwrap_or_default();
                for p in params {
                    if let Some(existing) = base_params.iter_mut().find(|e| e.name == p.name) {
                        *existing = p.clone();
                    } else {
                        base_params.push(p.clone());
                    }
                }
                Some(base_params)
            }
            None => base_class.as_ref().and_then(|c| c.constructor_params.clone()),
        };

        let class_value = Rc::new(ClassValue {
            name: name.to_string(),
            base: base_class,
            fields,
            methods,
            constructor_params: combined_ctor,
            closure: Rc::clone(env),
        });
        self.register_class(&class_value);
        environment::declare_var(env, name, Value::Class(class_value), false)?;
        Ok(())
    }

    fn instantiate_class(&mut self, class: &ClassHandle, args: Vec<Value>) -> EvalResult {
        let instance_map: ObjectHandle = Rc::new(RefCell::new(ObjectMap::new()));
        let instance_value = Value::Object(Rc::clone(&instance_map), Some(class.name.clone()));

        let instance_env = Environment::child(&class.closure);
        environment::declare_var(&instance_env, "this", instance_value.clone(), false)?;
        for field in &class.fields {
            environment::declare_var(&instance_env, &field.name, Value::Null, false)?;
        }

        let provided: HashMap<String, Value> = if args.len() == 1 && matches!(&args[0], Value::Object(_, None)) {
            let Value::Object(map, _) = &args[0] else { unreachable!() };
            let field_names: HashSet<&str> = class.fields.iter().map(|f| f.name.as_str()).collect();
            let mut out = HashMap::new();
            for (k, v) in map.borrow().iter() {
                if !field_names.contains(k.as_str()) {
                    return Err(RuntimeError::SchemaFieldError { schema: class.name.clone(), message: format!("unknown field '{k}'") }.into());
                }
                out.insert(k.clone(), v.clone());
            }
            out
        } else {
            let names: Vec<&str> = match &class.constructor_params {
                Some(params) => params.iter().map(|p| p.name.as_str()).collect(),
                None => class.fields.iter().map(|f| f.name.as_str()).collect(),
            };
            if args.len() > names.len() {
                return Err(RuntimeError::ArityMismatch { expected: names.len().to_string(), actual: args.len() }.into());
            }
            names.into_iter().zip(args).map(|(n, v)| (n.to_string(), v)).collect()
        };

        for field in &class.fields {
            let value = if let Some(v) = provided.get(&field.name) {
                v.clone()
            } else if let Some(init) = &field.initializer {
                self.eval_expr(init, &instance_env)?
            } else if field.required {
                return Err(RuntimeError::SchemaFieldError {
                    schema: class.name.clone(),
                    message: format!("missing required field '{}'", field.name),
                }
                .into());
            } else {
                Value::Null
            };
            if let Some(ann) = &field.annotation {
                type_check(&value, ann, !field.required, Some(&class.name), &format!("field '{}'", field.name))?;
            }
            instance_map.borrow_mut().insert(field.name.clone(), value);
        }

        for method in &class.methods {
            let thunk = self.bind_method(class, method, &instance_map, &instance_value);
            instance_map.borrow_mut().insert(method.name.clone(), thunk);
        }
        if !class.methods.iter().any(|m| m.name == "save") {
            let default_save = default_save_method(class, &instance_map);
            instance_map.borrow_mut().insert("save".to_string(), default_save);
        }

        Ok(instance_value)
    }

    fn bind_method(&self, class: &ClassHandle, method: &MethodDecl, instance_map: &ObjectHandle, instance_value: &Value) -> Value {
        let class_clone = Rc::clone(class);
        let method_name = method.name.clone();
        let instance_map_clone = Rc::clone(instance_map);
        let instance_value_clone = instance_value.clone();
        let implementation: NativeImpl = Rc::new(move |interp: &mut Interpreter, args: Vec<Value>| {
            interp.invoke_method(&class_clone, &method_name, &instance_map_clone, &instance_value_clone, args)
        });
        Value::NativeFn(Rc::new(NativeFnValue { name: method.name.clone(), implementation }))
    }

    fn invoke_method(
        &mut self,
        class: &ClassHandle,
        method_name: &str,
        instance_map: &ObjectHandle,
        instance_value: &Value,
        args: Vec<Value>,
    ) -> EvalResult {
        let method = class
            .methods
            .iter()
            .find(|m| m.name == method_name)
            .expect("a bound method thunk always names a method of its own class")
            .clone();

        let method_env = Environment::child(&class.closure);
        environment::declare_var(&method_env, "this", instance_value.clone(), false)?;
        for field in &class.fields {
            let current = instance_map.borrow().get(&field.name).cloned().unwrap_or(Value::Null);
            environment::declare_var(&method_env, &field.name, current, false)?;
        }

        let field_names: HashSet<&str> = class.fields.iter().map(|f| f.name.as_str()).collect();
        self.bind_params(&method.params, args, &method_env, Some(&field_names), &format!("method '{method_name}' "))?;

        let exec_result = self.exec_block(&method.body, &method_env);

        match exec_result {
            Ok(signal_opt) => {
                for field in &class.fields {
                    let current = environment::lookup_var(&method_env, &field.name)?;
                    if let Some(ann) = &field.annotation {
                        type_check(&current, ann, !field.required, Some(&class.name), &format!("field '{}'", field.name))?;
                    }
                    instance_map.borrow_mut().insert(field.name.clone(), current);
                }
                match signal_opt {
                    Some(Signal::Return(v)) => Ok(v),
                    Some(Signal::Break) => Err(RuntimeError::LoopControlOutsideLoop { keyword: "break" }.into()),
                    Some(Signal::Continue) => Err(RuntimeError::LoopControlOutsideLoop { keyword: "continue" }.into()),
                    None => Ok(Value::Null),
                }
            }
            Err(e) => Err(e),
        }
    }

    // ---------------------------------------------------------------
    // Await / task queue
    // ---------------------------------------------------------------

    fn await_value(&mut self, value: Value) -> EvalResult {
        match value {
            Value::Promise(p) => self.settle_promise(&p),
            other => Ok(other),
        }
    }

    fn settle_promise(&mut self, promise: &crate::value::PromiseHandle) -> EvalResult {
        loop {
            let settled = match &*promise.borrow() {
                Promise::Settled(v) => Some((**v).clone()),
                Promise::Pending(_) => None,
            };
            if let Some(v) = settled {
                return Ok(v);
            }
            let task = self
                .tasks
                .pop()
                .ok_or_else(|| RuntimeError::Dsl { message: "deadlock: awaited value never settles".to_string() })?;
            self.run_task(task)?;
        }
    }

    fn run_task(&mut self, task: crate::eval::tasks::ScheduledTask) -> Result<(), EvalError> {
        match task.kind {
            TaskKind::Sleep { promise } => {
                *promise.borrow_mut() = Promise::Settled(Box::new(Value::Null));
            }
            TaskKind::Callable { callable, args } => {
                self.call_value(callable, args)?;
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // DSL statements
    // ---------------------------------------------------------------

    fn eval_database_statement(&mut self, name: &str, initializer: &Expr, env: &EnvHandle) -> Result<(), EvalError> {
        let v = self.eval_expr(initializer, env)?;
        let db = match v {
            Value::Database(db) => db,
            other => {
                return Err(RuntimeError::Dsl {
                    message: format!("database initializer must be a database handle, found {}", other.type_tag()),
                }
                .into())
            }
        };
        if let Some(prev) = self.dsl.active_database.take() {
            environment::remove_var(env, &prev.binding);
        }
        for col_name in self.dsl.collections.drain() {
            environment::remove_var(env, &col_name);
        }
        environment::declare_var(env, name, Value::Database(Rc::clone(&db)), true)?;
        self.dsl.active_database = Some(ActiveDatabase { binding: name.to_string(), value: db });
        Ok(())
    }

    fn eval_collection_statement(&mut self, name: &str, initializer: Option<&Expr>, env: &EnvHandle) -> Result<(), EvalError> {
        let collection_value = match initializer {
            None => {
                let active = self.active_database()?;
                active.collection(name)
            }
            Some(expr) => {
                let v = self.eval_expr(expr, env)?;
                match v {
                    Value::String(s) => {
                        let active = self.active_database()?;
                        active.collection(&s)
                    }
                    Value::Collection(c) => c,
                    Value::Database(db) => db.collection(name),
                    other => {
                        return Err(RuntimeError::Dsl {
                            message: format!("collection initializer must be a string, collection, or database, found {}", other.type_tag()),
                        }
                        .into())
                    }
                }
            }
        };
        environment::declare_var(env, name, Value::Collection(Rc::clone(&collection_value)), true)?;
        self.dsl.collections.insert(name.to_string());
        Ok(())
    }

    fn eval_use_collection_statement(&mut self, name: &str, options: Option<&Expr>, env: &EnvHandle) -> Result<(), EvalError> {
        let collection_value: Rc<CollectionValue> = if self.dsl.collections.contains(name) {
            match environment::lookup_var(env, name)? {
                Value::Collection(c) => c,
                _ => return Err(RuntimeError::Dsl { message: format!("'{name}' is not bound to a collection") }.into()),
            }
        } else {
            let active = self.active_database()?;
            let col = active.collection(name);
            environment::declare_var(env, name, Value::Collection(Rc::clone(&col)), true)?;
            self.dsl.collections.insert(name.to_string());
            col
        };

        if let Some(opts_expr) = options {
            let opts_val = self.eval_expr(opts_expr, env)?;
            let Value::Object(map, _) = &opts_val else {
                return Err(RuntimeError::Dsl { message: "collection options must be an object".to_string() }.into());
            };
            apply_collection_options(&collection_value, map)?;
        }
        Ok(())
    }

    fn eval_using_statement(
        &mut self,
        uri_expr: &Expr,
        database_expr: Option<&Expr>,
        alias: Option<&str>,
        options_expr: Option<&Expr>,
        body: &[Stmt],
        env: &EnvHandle,
    ) -> StmtResult {
        let uri_val = self.eval_expr(uri_expr, env)?;
        let uri = match uri_val {
            Value::String(s) => s.to_string(),
            other => return Err(RuntimeError::Dsl { message: format!("mongo uri must be a string, found {}", other.type_tag()) }.into()),
        };
        let db_name = match database_expr {
            Some(e) => match self.eval_expr(e, env)? {
                Value::String(s) => s.to_string(),
                other => return Err(RuntimeError::Dsl { message: format!("database name must be a string, found {}", other.type_tag()) }.into()),
            },
            None => "default".to_string(),
        };
        let alias_name = alias.unwrap_or("db").to_string();

        let snapshot = self.dsl.clone();
        self.dsl = DslState::default();

        let db_value = connect_database(&uri, &db_name);
        let scope = Environment::child(env);
        if let Err(e) = environment::declare_var(&scope, &alias_name, Value::Database(Rc::clone(&db_value)), true) {
            let _ = db_value.handle.close();
            self.dsl = snapshot;
            return Err(e.into());
        }
        self.dsl.active_database = Some(ActiveDatabase { binding: alias_name.clone(), value: Rc::clone(&db_value) });

        let setup_result = self.setup_using_collections(options_expr, &db_value, &scope);
        let result = match setup_result {
            Ok(()) => self.exec_block(body, &scope),
            Err(e) => Err(e),
        };

        let _ = db_value.handle.close();
        self.dsl = snapshot;
        result
    }

    fn setup_using_collections(&mut self, options_expr: Option<&Expr>, db_value: &Rc<DatabaseValue>, scope: &EnvHandle) -> Result<(), EvalError> {
        let Some(opts_expr) = options_expr else { return Ok(()) };
        let opts_val = self.eval_expr(opts_expr, scope)?;
        let Value::Object(map, _) = &opts_val else {
            return Err(RuntimeError::Dsl { message: "using options must be an object".to_string() }.into());
        };
        let collections_val = map.borrow().get("collections").cloned();
        let Some(Value::Object(collections_map, _)) = collections_val else { return Ok(()) };
        let entries: Vec<(String, Value)> = collections_map.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (col_name, col_opts) in entries {
            let col = db_value.collection(&col_name);
            environment::declare_var(scope, &col_name, Value::Collection(Rc::clone(&col)), true)?;
            self.dsl.collections.insert(col_name);
            if let Value::Object(opt_map, _) = &col_opts {
                apply_collection_options(&col, opt_map)?;
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // DSL operators / operation chains
    // ---------------------------------------------------------------

    fn as_collection(&self, v: &Value) -> Result<Rc<CollectionValue>, RuntimeError> {
        match v {
            Value::Collection(c) => Ok(Rc::clone(c)),
            Value::Operation(chain) => Ok(Rc::clone(&chain.collection)),
            other => Err(RuntimeError::Dsl { message: format!("expected a collection, found {}", other.type_tag()) }),
        }
    }

    fn eval_mongo_operation(&mut self, collection_expr: &Expr, op: crate::ast::MongoOp, operand_expr: &Expr, env: &EnvHandle) -> EvalResult {
        use crate::ast::MongoOp;
        let collection_val = self.eval_expr(collection_expr, env)?;
        let collection = self.as_collection(&collection_val)?;
        let operand_val = unwrap_chain(self.eval_expr(operand_expr, env)?);

        let result_value = match op {
            MongoOp::Insert => dsl_insert(&collection, operand_val)?,
            MongoOp::DeleteOne => dsl_delete(&collection, operand_val, false)?,
            MongoOp::DeleteMany => dsl_delete(&collection, operand_val, true)?,
            MongoOp::FindOne => dsl_find_one(&collection, operand_val)?,
            MongoOp::FindMany => dsl_find_many(&collection, operand_val)?,
            MongoOp::Aggregate => dsl_aggregate(&collection, operand_val)?,
        };
        Ok(Value::Operation(Rc::new(OperationChain::new(result_value, collection))))
    }

    fn eval_mongo_update_expr(
        &mut self,
        target_expr: &Expr,
        filter_expr: &Expr,
        update_expr: &Expr,
        options_expr: Option<&Expr>,
        many: bool,
        env: &EnvHandle,
    ) -> EvalResult {
        let target_val = self.eval_expr(target_expr, env)?;
        let collection = self.as_collection(&target_val)?;
        let filter_val = unwrap_chain(self.eval_expr(filter_expr, env)?);
        let update_val = unwrap_chain(self.eval_expr(update_expr, env)?);
        let opts_val = match options_expr {
            Some(e) => Some(unwrap_chain(self.eval_expr(e, env)?)),
            None => None,
        };
        let result_value = dsl_update(&collection, filter_val, update_val, opts_val, many)?;
        Ok(Value::Operation(Rc::new(OperationChain::new(result_value, collection))))
    }

    fn eval_operation_member(&self, chain: &Rc<OperationChain>, key: &MemberKey) -> EvalResult {
        let name = key.as_name();
        match name.as_str() {
            "value" | "lastResult" => Ok(chain.value.clone()),
            "collection" => Ok(Value::Collection(Rc::clone(&chain.collection))),
            "unwrap" | "valueOf" => {
                let v = chain.value.clone();
                Ok(native_thunk(name.clone(), move |_, args| {
                    expect_arity(&args, 0)?;
                    Ok(v.clone())
                }))
            }
            "toJSON" => {
                let v = chain.value.clone();
                Ok(native_thunk("toJSON", move |_, args| {
                    expect_arity(&args, 0)?;
                    Ok(Document::from_value(&v)?.to_value())
                }))
            }
            "thenInsert" | "thenInsertMany" => Ok(chain_then1(chain, |col, v| dsl_insert(col, unwrap_chain(v)))),
            "thenDelete" => Ok(chain_then1(chain, |col, v| dsl_delete(col, unwrap_chain(v), false))),
            "thenDeleteMany" => Ok(chain_then1(chain, |col, v| dsl_delete(col, unwrap_chain(v), true))),
            "thenFind" => Ok(chain_then1(chain, |col, v| dsl_find_one(col, unwrap_chain(v)))),
            "thenFindMany" => Ok(chain_then1(chain, |col, v| dsl_find_many(col, unwrap_chain(v)))),
            "thenAggregate" => Ok(chain_then1(chain, |col, v| dsl_aggregate(col, unwrap_chain(v)))),
            "thenUpdate" => Ok(chain_then_update(chain, false)),
            "thenUpdateMany" => Ok(chain_then_update(chain, true)),
            _ => Ok(Value::Null),
        }
    }
}

// =====================================================================
// Free functions (no interpreter state needed)
// =====================================================================

/// Converts an evaluator-level error into the top-level error type returned
/// from [`Interpreter::run_program`].
fn eval_error_to_program_error(e: EvalError) -> DatascriptError {
    match e {
        EvalError::Fatal(e) => e.into(),
        EvalError::Exception(v) => DatascriptError::Uncaught(RuntimeException(v)),
    }
}

/// Unwraps an `Operation` chain to its carried value; passes everything
/// else through unchanged. Applied to every DSL operand so a chained
/// result can be fed straight into the next operator.
fn unwrap_chain(v: Value) -> Value {
    match v {
        Value::Operation(chain) => chain.value.clone(),
        other => other,
    }
}

fn value_to_filter_document(v: Value) -> Result<Document, RuntimeError> {
    match v {
        Value::Null => Ok(Document::object()),
        other => Document::from_value(&other),
    }
}

fn dsl_insert(collection: &CollectionValue, doc_val: Value) -> Result<Value, RuntimeError> {
    match doc_val {
        Value::Array(arr) => {
            let docs: Vec<Document> = arr.borrow().iter().map(Document::from_value).collect::<Result<_, _>>()?;
            let ids = collection.handle.insert_many(&docs)?;
            Ok(Value::array(ids.into_iter().map(Value::string).collect()))
        }
        Value::Object(..) => {
            let doc = Document::from_value(&doc_val)?;
            let id = collection.handle.insert_one(&doc)?;
            Ok(Value::string(id))
        }
        other => Err(RuntimeError::Dsl { message: format!("insert requires an object or array of objects, found {}", other.type_tag()) }),
    }
}

fn dsl_delete(collection: &CollectionValue, filter_val: Value, many: bool) -> Result<Value, RuntimeError> {
    let filter = value_to_filter_document(filter_val)?;
    let count = if many { collection.handle.delete_many(&filter)? } else { collection.handle.delete_one(&filter)? };
    Ok(Value::Number(count as f64))
}

fn collection_find_opts(collection: &CollectionValue) -> Option<Document> {
    let defaults = collection.defaults.borrow();
    if defaults.projection.is_none() && defaults.sort.is_none() {
        return None;
    }
    let mut map = indexmap::IndexMap::new();
    if let Some(p) = &defaults.projection {
        map.insert("projection".to_string(), p.clone());
    }
    if let Some(s) = &defaults.sort {
        map.insert("sort".to_string(), s.clone());
    }
    Some(Document::Object(map))
}

fn dsl_find_one(collection: &CollectionValue, filter_val: Value) -> Result<Value, RuntimeError> {
    let filter = value_to_filter_document(filter_val)?;
    let opts = collection_find_opts(collection);
    match collection.handle.find_one(&filter, opts.as_ref())? {
        Some(doc) => Ok(doc.to_value()),
        None => Ok(Value::Null),
    }
}

fn dsl_find_many(collection: &CollectionValue, filter_val: Value) -> Result<Value, RuntimeError> {
    let filter = value_to_filter_document(filter_val)?;
    let opts = collection_find_opts(collection);
    let mut cursor = collection.handle.find(&filter, opts.as_ref())?;
    if let Some(limit) = collection.defaults.borrow().limit {
        cursor.limit(limit as u64);
    }
    let docs = cursor.to_array()?;
    Ok(Value::array(docs.into_iter().map(|d| d.to_value()).collect()))
}

fn dsl_aggregate(collection: &CollectionValue, pipeline_val: Value) -> Result<Value, RuntimeError> {
    let Value::Array(arr) = pipeline_val else {
        return Err(RuntimeError::Dsl { message: format!("aggregate pipeline must be an array, found {}", pipeline_val.type_tag()) });
    };
    let stages: Vec<Document> = arr.borrow().iter().map(Document::from_value).collect::<Result<_, _>>()?;
    let mut cursor = collection.handle.aggregate(&stages)?;
    let docs = cursor.to_array()?;
    Ok(Value::array(docs.into_iter().map(|d| d.to_value()).collect()))
}

fn update_result_to_value(result: UpdateResult) -> Value {
    let mut out = ObjectMap::new();
    out.insert("matchedCount".to_string(), Value::Number(result.matched_count as f64));
    out.insert("modifiedCount".to_string(), Value::Number(result.modified_count as f64));
    out.insert("upsertedCount".to_string(), Value::Number(result.upserted_count as f64));
    out.insert("upsertedId".to_string(), result.upserted_id.map(Value::string).unwrap_or(Value::Null));
    if let Some(ids) = result.upserted_ids {
        out.insert("upsertedIds".to_string(), Value::array(ids.into_iter().map(Value::string).collect()));
    }
    Value::object(out)
}

fn dsl_update(collection: &CollectionValue, filter_val: Value, update_val: Value, opts_val: Option<Value>, many: bool) -> Result<Value, RuntimeError> {
    let filter = value_to_filter_document(filter_val)?;
    let update_doc = Document::from_value(&update_val)?;
    let opts_doc = match opts_val {
        Some(v) => Some(Document::from_value(&v)?),
        None => None,
    };
    let result = if many {
        collection.handle.update_many(&filter, &update_doc, opts_doc.as_ref())?
    } else {
        collection.handle.update_one(&filter, &update_doc, opts_doc.as_ref())?
    };
    Ok(update_result_to_value(result))
}

fn apply_collection_options(collection: &CollectionValue, map: &ObjectHandle) -> Result<(), RuntimeError> {
    let mut defaults = collection.defaults.borrow_mut();
    let map_ref = map.borrow();
    if let Some(v) = map_ref.get("projection") {
        match v {
            Value::Object(..) => defaults.projection = Some(Document::from_value(v)?),
            Value::Null => {}
            other => return Err(RuntimeError::Dsl { message: format!("'projection' must be an object, found {}", other.type_tag()) }),
        }
    }
    if let Some(v) = map_ref.get("sort") {
        match v {
            Value::Object(..) => defaults.sort = Some(Document::from_value(v)?),
            Value::Null => {}
            other => return Err(RuntimeError::Dsl { message: format!("'sort' must be an object, found {}", other.type_tag()) }),
        }
    }
    if let Some(v) = map_ref.get("limit") {
        match v {
            Value::Number(n) if n.is_finite() => defaults.limit = Some(*n),
            Value::Null => {}
            other => return Err(RuntimeError::Dsl { message: format!("'limit' must be a finite number, found {}", other.type_tag()) }),
        }
    }
    if let Some(v) = map_ref.get("batchSize") {
        match v {
            Value::Number(n) if n.is_finite() => defaults.batch_size = Some(*n),
            Value::Null => {}
            other => return Err(RuntimeError::Dsl { message: format!("'batchSize' must be a finite number, found {}", other.type_tag()) }),
        }
    }
    Ok(())
}

/// Connects to the document store. The crate ships only the in-memory
/// reference driver; a host embedding this interpreter with a real driver
/// would replace this free function with one that dispatches on `uri`'s
/// scheme.
pub(crate) fn connect_database(uri: &str, db_name: &str) -> Rc<DatabaseValue> {
    let handle: Rc<dyn DatabaseHandle> = memory::connect(uri, db_name);
    DatabaseValue::new(handle)
}

fn default_save_method(class: &ClassHandle, instance_map: &ObjectHandle) -> Value {
    let class_name = class.name.clone();
    let field_names: Vec<String> = class.fields.iter().map(|f| f.name.clone()).collect();
    let instance_map = Rc::clone(instance_map);
    let implementation: NativeImpl = Rc::new(move |_interp, args| {
        expect_arity(&args, 0)?;
        let mut out = ObjectMap::new();
        out.insert("__schema".to_string(), Value::string(class_name.clone()));
        let map = instance_map.borrow();
        for name in &field_names {
            let field_val = map.get(name).cloned().unwrap_or(Value::Null);
            let json_val = Document::from_value(&field_val).map(|d| d.to_value()).unwrap_or(field_val);
            out.insert(name.clone(), json_val);
        }
        Ok(Value::object(out))
    });
    Value::NativeFn(Rc::new(NativeFnValue { name: "save".to_string(), implementation }))
}

fn native_thunk(name: impl Into<String>, f: impl Fn(&mut Interpreter, Vec<Value>) -> EvalResult + 'static) -> Value {
    Value::NativeFn(Rc::new(NativeFnValue { name: name.into(), implementation: Rc::new(f) }))
}

fn chain_then1(chain: &Rc<OperationChain>, f: impl Fn(&CollectionValue, Value) -> Result<Value, RuntimeError> + 'static) -> Value {
    let col = Rc::clone(&chain.collection);
    native_thunk("then", move |_interp, mut args| {
        if args.len() != 1 {
            return Err(RuntimeError::ArityMismatch { expected: "1".to_string(), actual: args.len() }.into());
        }
        let payload = args.remove(0);
        let v = f(&col, payload)?;
        Ok(Value::Operation(Rc::new(OperationChain::new(v, Rc::clone(&col)))))
    })
}

fn chain_then_update(chain: &Rc<OperationChain>, many: bool) -> Value {
    let col = Rc::clone(&chain.collection);
    native_thunk("thenUpdate", move |_interp, args| {
        if args.len() < 2 || args.len() > 3 {
            return Err(RuntimeError::ArityMismatch { expected: "2 or 3".to_string(), actual: args.len() }.into());
        }
        let mut it = args.into_iter();
        let filter = unwrap_chain(it.next().unwrap());
        let update = unwrap_chain(it.next().unwrap());
        let opts = it.next().map(unwrap_chain);
        let v = dsl_update(&col, filter, update, opts, many)?;
        Ok(Value::Operation(Rc::new(OperationChain::new(v, Rc::clone(&col)))))
    })
}

/// Formats a type annotation for diagnostics (`string`, `number[]`, ...).
pub(crate) fn describe_type(ann: &TypeAnnotation) -> String {
    format!("{}{}", ann.base, "[]".repeat(ann.array_depth as usize))
}

fn type_matches(value: &Value, ann: &TypeAnnotation) -> bool {
    if ann.base.eq_ignore_ascii_case("any") {
        return true;
    }
    if ann.array_depth > 0 {
        return match value {
            Value::Array(arr) => arr.borrow().iter().all(|item| {
                type_matches(item, &TypeAnnotation { base: ann.base.clone(), array_depth: ann.array_depth - 1, span: ann.span })
            }),
            _ => false,
        };
    }
    match ann.base.to_ascii_lowercase().as_str() {
        "string" => matches!(value, Value::String(_)),
        "number" => matches!(value, Value::Number(_)),
        "boolean" => matches!(value, Value::Boolean(_)),
        "null" => matches!(value, Value::Null),
        "array" => matches!(value, Value::Array(_)),
        "object" => matches!(value, Value::Object(..)),
        other => value.schema_name().map(|n| n.eq_ignore_ascii_case(other)).unwrap_or(false),
    }
}

/// Checks `value` against `ann`: a non-required field/parameter accepts
/// `Null` unconditionally; otherwise the value's runtime shape (or, for a
/// schema-named base, its tag) must match.
pub(crate) fn type_check(value: &Value, ann: &TypeAnnotation, allow_null: bool, schema: Option<&str>, what: &str) -> Result<(), EvalError> {
    if allow_null && matches!(value, Value::Null) {
        return Ok(());
    }
    if type_matches(value, ann) {
        return Ok(());
    }
    Err(RuntimeError::SchemaFieldError {
        schema: schema.unwrap_or("<none>").to_string(),
        message: format!("{what} expected {}, found {}", describe_type(ann), value.type_tag()),
    }
    .into())
}

pub(crate) fn expect_arity(args: &[Value], n: usize) -> Result<(), EvalError> {
    if args.len() != n {
        return Err(RuntimeError::ArityMismatch { expected: n.to_string(), actual: args.len() }.into());
    }
    Ok(())
}
