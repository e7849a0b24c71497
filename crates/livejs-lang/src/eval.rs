//! A tree-walking interpreter for the supported JavaScript subset.
//!
//! [`Interpreter`] is the bundled [`ExecutionHost`]: it runs instrumented
//! source, reports every debug sink call to a [`DebugSink`] and returns the
//! error that escaped the top level, if any. Promises settle through a
//! microtask queue and timers run on a virtual clock, so a run always ends
//! once there is nothing left to do.
pub mod builtin;
pub mod env;
pub mod error;
mod function;
pub mod promise;
pub mod runtime_value;

use std::{collections::VecDeque, rc::Rc};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use self::{
    builtin::Realm,
    env::{Env, EnvError},
    error::{EvalError, Thrown},
    promise::{Job, PromiseState, TimerQueue},
    runtime_value::{FunctionCode, Object, ObjectKind, ObjectRef, PropertyKey, Value, lookup},
};
use crate::{
    ast::{
        self, Ident, Printer, Program,
        node::{
            AssignOp, BinaryOp, Expr, ExprKind, ForHead, ForInit, Literal, LogicalOp, MemberProp,
            Pattern, Prop, PropKey, Stmt, StmtKind, UnaryOp, UpdateOp, VarDecl, VarKind,
        },
    },
    number::Number,
    transform::Instrumentation,
};

/// Nested calls allowed before a `RangeError` is thrown.
pub const MAX_CALL_DEPTH: usize = 200;
/// Times a single `setInterval` timer may fire in one run.
pub const MAX_INTERVAL_RUNS: u32 = 1_000;

/// The outcome of waiting on a promise-like value.
#[derive(Debug, Clone)]
pub enum Settled {
    Fulfilled(Value),
    Rejected(Value),
    /// The value can never settle, e.g. a promise nobody resolves.
    Pending,
}

/// Lets the receiver of debug values wait for promises to settle.
pub trait Awaiter {
    fn settle(&mut self, value: &Value) -> Settled;
}

/// Receives the values passed to the debug sink.
pub trait DebugSink {
    /// `line` is `None` for console output that was not instrumented.
    fn emit(&mut self, line: Option<u32>, values: Vec<Value>, awaiter: &mut dyn Awaiter);
}

/// Runs instrumented source. All output flows through `sink`; `cancel` is
/// exposed to the program as the cancellation predicate.
pub trait ExecutionHost {
    fn execute(
        &mut self,
        source: &str,
        sink: &mut dyn DebugSink,
        cancel: &dyn Fn() -> bool,
    ) -> Result<(), EvalError>;
}

#[derive(Debug, Clone)]
pub struct Interpreter {
    pub instrumentation: Instrumentation,
    pub max_call_depth: usize,
    pub max_interval_runs: u32,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            instrumentation: Instrumentation::default(),
            max_call_depth: MAX_CALL_DEPTH,
            max_interval_runs: MAX_INTERVAL_RUNS,
        }
    }
}

impl Interpreter {
    pub fn new(instrumentation: Instrumentation) -> Self {
        Self {
            instrumentation,
            ..Default::default()
        }
    }
}

impl ExecutionHost for Interpreter {
    fn execute(
        &mut self,
        source: &str,
        sink: &mut dyn DebugSink,
        cancel: &dyn Fn() -> bool,
    ) -> Result<(), EvalError> {
        let program = ast::parse(source).map_err(|err| EvalError::Syntax(err.to_string()))?;
        let mut runtime = Runtime::new(self, sink, cancel);
        runtime.run(&program)
    }
}

/// Non-local exits. `Fatal` errors come from outside the running code, such
/// as a failing timer callback, and cannot be caught by it.
#[derive(Debug)]
pub enum Abrupt {
    Throw(Value),
    Fatal(Value),
    Return(Value),
    Break(Option<Ident>),
    Continue(Option<Ident>),
    /// An `await` on a promise that will never settle.
    Suspend,
}

#[derive(Debug, PartialEq)]
enum Flow {
    Next,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BindMode {
    Declare(VarKind),
    Param,
    Assign,
}

/// A resolved assignment target.
enum Reference {
    Binding(Ident),
    Property(Value, PropertyKey),
}

pub struct Runtime<'a> {
    sink: Option<&'a mut dyn DebugSink>,
    cancel: &'a dyn Fn() -> bool,
    pending_emits: VecDeque<(Option<u32>, Vec<Value>)>,
    pub(crate) realm: Realm,
    global_env: Env,
    microtasks: VecDeque<Job>,
    timers: TimerQueue,
    depth: usize,
    max_call_depth: usize,
    code: FxHashMap<(usize, u8), Rc<FunctionCode>>,
    fatal: Option<Value>,
    rng: u64,
}

impl<'a> Runtime<'a> {
    pub fn new(
        interpreter: &Interpreter,
        sink: &'a mut dyn DebugSink,
        cancel: &'a dyn Fn() -> bool,
    ) -> Self {
        let realm = Realm::new(&interpreter.instrumentation);
        let global_env = Env::root(Value::Object(realm.global.clone()));
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0x2545_f491_4f6c_dd1d);

        Self {
            sink: Some(sink),
            cancel,
            pending_emits: VecDeque::new(),
            realm,
            global_env,
            microtasks: VecDeque::new(),
            timers: TimerQueue::new(interpreter.max_interval_runs),
            depth: 0,
            max_call_depth: interpreter.max_call_depth,
            code: FxHashMap::default(),
            fatal: None,
            rng: seed | 1,
        }
    }

    /// Runs a whole program, then its pending tasks and timers.
    pub fn run(&mut self, program: &Program) -> Result<(), EvalError> {
        let env = self.global_env.clone();
        let outcome = self
            .exec_body(&program.body, &env)
            .and_then(|_| self.run_event_loop());

        match outcome {
            Ok(()) | Err(Abrupt::Suspend) => Ok(()),
            Err(Abrupt::Throw(error) | Abrupt::Fatal(error)) => {
                Err(EvalError::Uncaught(describe_thrown(&error)))
            }
            Err(abrupt) => {
                tracing::debug!(?abrupt, "ignoring stray completion at top level");
                Ok(())
            }
        }
    }

    pub(crate) fn emit(&mut self, line: Option<u32>, values: Vec<Value>) -> Result<(), Abrupt> {
        self.pending_emits.push_back((line, values));
        // A sink call made while the sink is awaiting a value is flushed by
        // the outer call.
        let Some(sink) = self.sink.take() else {
            return Ok(());
        };

        while let Some((line, values)) = self.pending_emits.pop_front() {
            sink.emit(line, values, self);
        }
        self.sink = Some(sink);

        match self.fatal.take() {
            Some(error) => Err(Abrupt::Fatal(error)),
            None => Ok(()),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        (self.cancel)()
    }

    /// xorshift64*, for `Math.random`.
    pub(crate) fn next_random(&mut self) -> f64 {
        self.rng ^= self.rng >> 12;
        self.rng ^= self.rng << 25;
        self.rng ^= self.rng >> 27;
        let bits = self.rng.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }

    pub(crate) fn make_error(&self, name: &str, message: impl AsRef<str>) -> Value {
        let error = Object::new(ObjectKind::Error, Some(self.realm.error_prototype(name)));
        let error = error.into_ref();
        error
            .borrow_mut()
            .set("message", Value::string(message.as_ref()));
        Value::Object(error)
    }

    pub(crate) fn type_error(&self, message: impl AsRef<str>) -> Abrupt {
        Abrupt::Throw(self.make_error("TypeError", message))
    }

    pub(crate) fn range_error(&self, message: impl AsRef<str>) -> Abrupt {
        Abrupt::Throw(self.make_error("RangeError", message))
    }

    pub(crate) fn reference_error(&self, message: impl AsRef<str>) -> Abrupt {
        Abrupt::Throw(self.make_error("ReferenceError", message))
    }

    pub(crate) fn syntax_error(&self, message: impl AsRef<str>) -> Abrupt {
        Abrupt::Throw(self.make_error("SyntaxError", message))
    }

    pub(crate) fn new_object(&self) -> ObjectRef {
        Object::new(
            ObjectKind::Ordinary,
            Some(self.realm.object_prototype.clone()),
        )
        .into_ref()
    }

    pub(crate) fn new_array(&self, values: Vec<Value>) -> Value {
        Value::Object(
            Object::new(
                ObjectKind::Array(values),
                Some(self.realm.array_prototype.clone()),
            )
            .into_ref(),
        )
    }

    /// Reads `base[key]`, boxing primitives onto their prototypes.
    pub(crate) fn get(&mut self, base: &Value, key: &PropertyKey) -> Result<Value, Abrupt> {
        let prototype = match base {
            Value::Undefined | Value::Null => {
                return Err(self.type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    base.to_js_string(),
                    key
                )));
            }
            Value::Object(object) => {
                if key.as_str() == Some("prototype") && object.borrow().is_callable() {
                    return Ok(self
                        .constructor_prototype(object)
                        .map(Value::Object)
                        .unwrap_or_default());
                }
                return Ok(lookup(object, key).unwrap_or_default());
            }
            Value::String(s) => {
                if key.as_str() == Some("length") {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(index) = key.as_index() {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or_default());
                }
                &self.realm.string_prototype
            }
            Value::Symbol(symbol) => {
                if key.as_str() == Some("description") {
                    return Ok(symbol
                        .description
                        .clone()
                        .map(Value::String)
                        .unwrap_or_default());
                }
                &self.realm.symbol_prototype
            }
            Value::Number(_) => &self.realm.number_prototype,
            Value::Bool(_) => &self.realm.boolean_prototype,
            Value::BigInt(_) => &self.realm.bigint_prototype,
        };

        Ok(lookup(prototype, key).unwrap_or_default())
    }

    pub(crate) fn get_named(&mut self, base: &Value, key: &str) -> Result<Value, Abrupt> {
        self.get(base, &PropertyKey::from(key))
    }

    pub(crate) fn set(&mut self, base: &Value, key: PropertyKey, value: Value) -> Result<(), Abrupt> {
        match base {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                base.to_js_string(),
                key
            ))),
            Value::Object(object) => {
                object.borrow_mut().set(key, value);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// The values produced by iterating `value` with `for...of` or spread.
    pub(crate) fn iterate(&mut self, value: &Value) -> Result<Vec<Value>, Abrupt> {
        if let Value::String(s) = value {
            return Ok(s.chars().map(|c| Value::string(c.to_string())).collect());
        }
        if let Value::Object(object) = value
            && let ObjectKind::Array(elements) = &object.borrow().kind
        {
            return Ok(elements.clone());
        }
        Err(self.type_error(format!(
            "{} is not iterable",
            match value {
                Value::Object(_) => "object".to_string(),
                value => value.to_js_string(),
            }
        )))
    }

    fn exec_body(&mut self, body: &[Stmt], env: &Env) -> Result<(), Abrupt> {
        hoist_vars(body, env);
        self.exec_block(body, env)
    }

    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> Result<(), Abrupt> {
        for stmt in body {
            if let StmtKind::Function(function) = &stmt.kind
                && let Some(name) = &function.name
            {
                let value = self.make_function(function, env, None);
                env.declare(name.clone(), value, true);
            }
        }

        body.iter().try_for_each(|stmt| self.exec_stmt(stmt, env))
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Result<(), Abrupt> {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.eval(expr, env).map(|_| ()),
            StmtKind::Var(decl) => self.exec_var(decl, env),
            StmtKind::Function(_) | StmtKind::Empty => Ok(()),
            StmtKind::Class(class) => {
                let value = self.eval_class(class, env, None)?;
                if let Some(name) = &class.name {
                    env.declare(name.clone(), value, true);
                }
                Ok(())
            }
            StmtKind::Block(body) => self.exec_block(body, &env.child()),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.is_truthy() {
                    self.exec_stmt(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, env)
                } else {
                    Ok(())
                }
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value, env)?,
                    None => Value::Undefined,
                };
                Err(Abrupt::Return(value))
            }
            StmtKind::Break(label) => Err(Abrupt::Break(label.clone())),
            StmtKind::Continue(label) => Err(Abrupt::Continue(label.clone())),
            StmtKind::Throw(value) => Err(Abrupt::Throw(self.eval(value, env)?)),
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                let mut result = self.exec_block(block, &env.child());

                if let Some(handler) = handler
                    && let Err(Abrupt::Throw(error)) = result
                {
                    let catch_env = env.child();
                    result = match &handler.param {
                        Some(param) => self.bind_pattern(
                            param,
                            error,
                            &catch_env,
                            BindMode::Declare(VarKind::Let),
                        ),
                        None => Ok(()),
                    }
                    .and_then(|_| self.exec_block(&handler.body, &catch_env));
                }

                match finalizer {
                    Some(finalizer)
                        if !matches!(result, Err(Abrupt::Suspend | Abrupt::Fatal(_))) =>
                    {
                        self.exec_block(finalizer, &env.child())?;
                        result
                    }
                    _ => result,
                }
            }
            StmtKind::Labeled { .. } => {
                let mut labels = Vec::new();
                let mut target = stmt;
                while let StmtKind::Labeled { label, body } = &target.kind {
                    labels.push(label.clone());
                    target = body;
                }

                let result = if target.is_loop() {
                    self.exec_loop(target, env, &labels)
                } else {
                    self.exec_stmt(target, env)
                };
                match result {
                    Err(Abrupt::Break(Some(label))) if labels.contains(&label) => Ok(()),
                    result => result,
                }
            }
            _ => self.exec_loop(stmt, env, &[]),
        }
    }

    fn exec_loop(&mut self, stmt: &Stmt, env: &Env, labels: &[Ident]) -> Result<(), Abrupt> {
        match &stmt.kind {
            StmtKind::While { test, body } => {
                while self.eval(test, env)?.is_truthy() {
                    if self.loop_body(body, env, labels)? == Flow::Exit {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::DoWhile { body, test } => {
                loop {
                    if self.loop_body(body, env, labels)? == Flow::Exit
                        || !self.eval(test, env)?.is_truthy()
                    {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_env = env.child();
                let per_iteration = match init {
                    Some(ForInit::Var(decl)) if decl.kind != VarKind::Var => decl
                        .declarators
                        .iter()
                        .flat_map(|declarator| declarator.target.bound_names())
                        .collect(),
                    _ => Vec::new(),
                };
                match init {
                    Some(ForInit::Var(decl)) => self.exec_var(decl, &loop_env)?,
                    Some(ForInit::Expr(expr)) => {
                        self.eval(expr, &loop_env)?;
                    }
                    None => {}
                }

                let mut iteration_env = if per_iteration.is_empty() {
                    loop_env
                } else {
                    loop_env.copy_for_iteration(&per_iteration)
                };
                loop {
                    if let Some(test) = test
                        && !self.eval(test, &iteration_env)?.is_truthy()
                    {
                        break;
                    }
                    if self.loop_body(body, &iteration_env, labels)? == Flow::Exit {
                        break;
                    }
                    if !per_iteration.is_empty() {
                        iteration_env = iteration_env.copy_for_iteration(&per_iteration);
                    }
                    if let Some(update) = update {
                        self.eval(update, &iteration_env)?;
                    }
                }
                Ok(())
            }
            StmtKind::ForIn { left, right, body } => {
                let object = self.eval(right, env)?;
                let keys = match &object {
                    Value::Object(object) => object.borrow().own_keys(),
                    Value::String(s) => (0..s.chars().count())
                        .map(|index| SmolStr::new(index.to_string()))
                        .collect(),
                    _ => Vec::new(),
                };
                let values = keys.into_iter().map(Value::String).collect();
                self.for_each_value(left, values, body, env, labels)
            }
            StmtKind::ForOf { left, right, body } => {
                let iterable = self.eval(right, env)?;
                let values = self.iterate(&iterable)?;
                self.for_each_value(left, values, body, env, labels)
            }
            _ => Ok(()),
        }
    }

    fn for_each_value(
        &mut self,
        left: &ForHead,
        values: Vec<Value>,
        body: &Stmt,
        env: &Env,
        labels: &[Ident],
    ) -> Result<(), Abrupt> {
        for value in values {
            let iteration_env = env.child();
            match left {
                ForHead::Var(kind, pattern) => {
                    self.bind_pattern(pattern, value, &iteration_env, BindMode::Declare(*kind))?
                }
                ForHead::Pattern(pattern) => {
                    self.bind_pattern(pattern, value, &iteration_env, BindMode::Assign)?
                }
            }
            if self.loop_body(body, &iteration_env, labels)? == Flow::Exit {
                break;
            }
        }
        Ok(())
    }

    fn loop_body(&mut self, body: &Stmt, env: &Env, labels: &[Ident]) -> Result<Flow, Abrupt> {
        match self.exec_stmt(body, env) {
            Ok(()) | Err(Abrupt::Continue(None)) => Ok(Flow::Next),
            Err(Abrupt::Break(None)) => Ok(Flow::Exit),
            Err(Abrupt::Continue(Some(label))) if labels.contains(&label) => Ok(Flow::Next),
            Err(Abrupt::Break(Some(label))) if labels.contains(&label) => Ok(Flow::Exit),
            Err(abrupt) => Err(abrupt),
        }
    }

    fn exec_var(&mut self, decl: &VarDecl, env: &Env) -> Result<(), Abrupt> {
        for declarator in &decl.declarators {
            let value = match (&declarator.init, &declarator.target) {
                (Some(init), Pattern::Ident(name)) => self.eval_named(init, name, env)?,
                (Some(init), _) => self.eval(init, env)?,
                // `var x;` keeps the hoisted value.
                (None, _) if decl.kind == VarKind::Var => continue,
                (None, _) => Value::Undefined,
            };
            self.bind_pattern(&declarator.target, value, env, BindMode::Declare(decl.kind))?;
        }
        Ok(())
    }

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        env: &Env,
        mode: BindMode,
    ) -> Result<(), Abrupt> {
        match pattern {
            Pattern::Ident(name) => match mode {
                BindMode::Declare(VarKind::Var) => {
                    if env.assign(name, value.clone()).is_err() {
                        env.declare(name.clone(), value, true);
                    }
                    Ok(())
                }
                BindMode::Declare(VarKind::Const) => {
                    env.declare(name.clone(), value, false);
                    Ok(())
                }
                BindMode::Declare(VarKind::Let) | BindMode::Param => {
                    env.declare(name.clone(), value, true);
                    Ok(())
                }
                BindMode::Assign => self.put_reference(Reference::Binding(name.clone()), value, env),
            },
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    return Err(self.type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_js_string(),
                        value.to_js_string()
                    )));
                }

                let mut used = Vec::with_capacity(props.len());
                for prop in props {
                    let key = self.prop_key(&prop.key, env)?;
                    let property = self.get(&value, &key)?;
                    used.push(key);
                    self.bind_pattern(&prop.value, property, env, mode)?;
                }

                if let Some(rest) = rest {
                    let remaining = self.new_object();
                    if let Value::Object(source) = &value {
                        let source = source.borrow();
                        for key in source.own_keys() {
                            let key = PropertyKey::from(key);
                            if !used.contains(&key)
                                && let Some(property) = source.get_own(&key)
                            {
                                remaining.borrow_mut().set(key, property);
                            }
                        }
                    }
                    self.bind_pattern(rest, Value::Object(remaining), env, mode)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest } => {
                let mut values = self.iterate(&value)?.into_iter();
                for element in elements {
                    let item = values.next().unwrap_or_default();
                    if let Some(element) = element {
                        self.bind_pattern(element, item, env, mode)?;
                    }
                }
                if let Some(rest) = rest {
                    let remaining = self.new_array(values.collect());
                    self.bind_pattern(rest, remaining, env, mode)?;
                }
                Ok(())
            }
            Pattern::Default { target, value: default } => {
                let value = match (value, target.as_ref()) {
                    (Value::Undefined, Pattern::Ident(name)) => {
                        self.eval_named(default, name, env)?
                    }
                    (Value::Undefined, _) => self.eval(default, env)?,
                    (value, _) => value,
                };
                self.bind_pattern(target, value, env, mode)
            }
            Pattern::Expr(expr) => {
                let reference = self.reference(expr, env)?;
                self.put_reference(reference, value, env)
            }
        }
    }

    fn reference(&mut self, expr: &Expr, env: &Env) -> Result<Reference, Abrupt> {
        match &expr.kind {
            ExprKind::Ident(name) => Ok(Reference::Binding(name.clone())),
            ExprKind::Member {
                object, property, ..
            } => {
                let base = self.eval(object, env)?;
                let key = self.member_key(property, env)?;
                Ok(Reference::Property(base, key))
            }
            _ => Err(self.syntax_error("Invalid left-hand side in assignment")),
        }
    }

    fn pattern_reference(&mut self, pattern: &Pattern, env: &Env) -> Result<Reference, Abrupt> {
        match pattern {
            Pattern::Ident(name) => Ok(Reference::Binding(name.clone())),
            Pattern::Expr(expr) => self.reference(expr, env),
            _ => Err(self.syntax_error("Invalid left-hand side in assignment")),
        }
    }

    fn get_reference(&mut self, reference: &Reference, env: &Env) -> Result<Value, Abrupt> {
        match reference {
            Reference::Binding(name) => self.lookup(name, env),
            Reference::Property(base, key) => self.get(base, key),
        }
    }

    fn put_reference(&mut self, reference: Reference, value: Value, env: &Env) -> Result<(), Abrupt> {
        match reference {
            Reference::Binding(name) => match env.assign(&name, value.clone()) {
                Ok(()) => Ok(()),
                Err(EnvError::AssignToConstant) => {
                    Err(self.type_error(EnvError::AssignToConstant.to_string()))
                }
                Err(EnvError::NotDefined(name)) => {
                    self.realm.global.borrow_mut().set(name, value);
                    Ok(())
                }
            },
            Reference::Property(base, key) => self.set(&base, key, value),
        }
    }

    fn lookup(&mut self, name: &str, env: &Env) -> Result<Value, Abrupt> {
        env.lookup(name)
            .or_else(|| lookup(&self.realm.global, &PropertyKey::from(name)))
            .ok_or_else(|| self.reference_error(format!("{} is not defined", name)))
    }

    fn member_key(&mut self, property: &MemberProp, env: &Env) -> Result<PropertyKey, Abrupt> {
        match property {
            MemberProp::Ident(name) => Ok(PropertyKey::String(name.clone())),
            MemberProp::Computed(expr) => Ok(self.eval(expr, env)?.to_property_key()),
        }
    }

    fn prop_key(&mut self, key: &PropKey, env: &Env) -> Result<PropertyKey, Abrupt> {
        match key {
            PropKey::Ident(name) => Ok(PropertyKey::String(name.clone())),
            PropKey::String(name) => Ok(PropertyKey::from(name.as_str())),
            PropKey::Number(n) => Ok(PropertyKey::String(SmolStr::new(n.to_string()))),
            PropKey::Computed(expr) => Ok(self.eval(expr, env)?.to_property_key()),
        }
    }

    pub(crate) fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, Abrupt> {
        match &expr.kind {
            ExprKind::Literal(literal) => literal_value(literal)
                .ok_or_else(|| self.range_error("Maximum BigInt size exceeded")),
            ExprKind::Template { quasis, exprs } => {
                let mut text = String::new();
                for (index, quasi) in quasis.iter().enumerate() {
                    text.push_str(quasi);
                    if let Some(expr) = exprs.get(index) {
                        let value = self.eval(expr, env)?;
                        text.push_str(&self.to_string(&value)?);
                    }
                }
                Ok(Value::from(text))
            }
            ExprKind::Ident(name) => self.lookup(name, env),
            ExprKind::This => Ok(env.frame().this),
            ExprKind::Super => Err(self.syntax_error("'super' keyword unexpected here")),
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    match element {
                        None => values.push(Value::Undefined),
                        Some(Expr {
                            kind: ExprKind::Spread(inner),
                            ..
                        }) => {
                            let spread = self.eval(inner, env)?;
                            values.extend(self.iterate(&spread)?);
                        }
                        Some(element) => values.push(self.eval(element, env)?),
                    }
                }
                Ok(self.new_array(values))
            }
            ExprKind::Object(props) => self.eval_object(props, env),
            ExprKind::Function(function) => Ok(self.make_function(function, env, None)),
            ExprKind::Arrow(arrow) => Ok(self.make_arrow(arrow, env, None)),
            ExprKind::Class(class) => self.eval_class(class, env, None),
            ExprKind::Call { .. } | ExprKind::Member { .. } => {
                Ok(self.eval_chain(expr, env)?.unwrap_or_default())
            }
            ExprKind::New { callee, args } => {
                let constructor = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                if !constructor.is_callable() {
                    return Err(self.type_error(format!(
                        "{} is not a constructor",
                        Printer::new().print_expr(callee)
                    )));
                }
                self.construct(&constructor, args)
            }
            ExprKind::Unary { op, arg } => self.eval_unary(*op, arg, env),
            ExprKind::Update { op, prefix, arg } => {
                let reference = self.reference(arg, env)?;
                let old = self.get_reference(&reference, env)?;
                let old = match old {
                    Value::BigInt(n) => Value::BigInt(n),
                    old => Value::Number(old.to_number()),
                };
                let new = match (&old, op) {
                    (Value::BigInt(n), UpdateOp::Increment) => Value::BigInt(
                        n.checked_add(1)
                            .ok_or_else(|| self.range_error("Maximum BigInt size exceeded"))?,
                    ),
                    (Value::BigInt(n), UpdateOp::Decrement) => Value::BigInt(
                        n.checked_sub(1)
                            .ok_or_else(|| self.range_error("Maximum BigInt size exceeded"))?,
                    ),
                    (old, UpdateOp::Increment) => Value::Number(old.to_number() + 1.0),
                    (old, UpdateOp::Decrement) => Value::Number(old.to_number() - 1.0),
                };
                self.put_reference(reference, new.clone(), env)?;
                Ok(if *prefix { new } else { old })
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.binary(*op, left, right)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short_circuits = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.is_truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, env),
            ExprKind::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval(expr, env)?;
                }
                Ok(last)
            }
            ExprKind::Await(arg) => {
                let value = self.eval(arg, env)?;
                self.await_value(value)
            }
            ExprKind::Spread(_) => Err(self.syntax_error("Unexpected token '...'")),
        }
    }

    /// Evaluates a value about to be bound to `name`, naming anonymous
    /// functions and classes after it.
    fn eval_named(&mut self, expr: &Expr, name: &Ident, env: &Env) -> Result<Value, Abrupt> {
        match &expr.kind {
            ExprKind::Function(function) if function.name.is_none() => {
                Ok(self.make_function(function, env, Some(name.clone())))
            }
            ExprKind::Arrow(arrow) => Ok(self.make_arrow(arrow, env, Some(name.clone()))),
            ExprKind::Class(class) if class.name.is_none() => {
                self.eval_class(class, env, Some(name.clone()))
            }
            _ => self.eval(expr, env),
        }
    }

    /// Evaluates a member or call chain. `None` means an optional link
    /// short-circuited the whole chain.
    fn eval_chain(&mut self, expr: &Expr, env: &Env) -> Result<Option<Value>, Abrupt> {
        match &expr.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                if matches!(object.kind, ExprKind::Super) {
                    let key = self.member_key(property, env)?;
                    return self.super_get(&key, env).map(Some);
                }

                let Some(base) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && base.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property, env)?;
                self.get(&base, &key).map(Some)
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                if matches!(callee.kind, ExprKind::Super) {
                    let args = self.eval_args(args, env)?;
                    return self.super_call(args, env).map(Some);
                }

                let Some((this, function)) = self.eval_callee(callee, env)? else {
                    return Ok(None);
                };
                if *optional && function.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_args(args, env)?;
                if !function.is_callable() {
                    return Err(self.type_error(format!(
                        "{} is not a function",
                        Printer::new().print_expr(callee)
                    )));
                }
                self.call(&function, this, args).map(Some)
            }
            _ => self.eval(expr, env).map(Some),
        }
    }

    /// The function a call invokes and the `this` it receives.
    fn eval_callee(&mut self, callee: &Expr, env: &Env) -> Result<Option<(Value, Value)>, Abrupt> {
        match &callee.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                if matches!(object.kind, ExprKind::Super) {
                    let key = self.member_key(property, env)?;
                    let function = self.super_get(&key, env)?;
                    return Ok(Some((env.frame().this, function)));
                }

                let Some(base) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && base.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property, env)?;
                let function = self.get(&base, &key)?;
                Ok(Some((base, function)))
            }
            _ => Ok(self
                .eval_chain(callee, env)?
                .map(|function| (Value::Undefined, function))),
        }
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Result<Vec<Value>, Abrupt> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match &arg.kind {
                ExprKind::Spread(inner) => {
                    let spread = self.eval(inner, env)?;
                    values.extend(self.iterate(&spread)?);
                }
                _ => values.push(self.eval(arg, env)?),
            }
        }
        Ok(values)
    }

    fn eval_object(&mut self, props: &[Prop], env: &Env) -> Result<Value, Abrupt> {
        let object = self.new_object();

        for prop in props {
            match prop {
                Prop::KeyValue { key, value } => {
                    let key = self.prop_key(key, env)?;
                    let value = match key.as_str() {
                        Some(name) => self.eval_named(value, &SmolStr::new(name), env)?,
                        None => self.eval(value, env)?,
                    };
                    object.borrow_mut().set(key, value);
                }
                Prop::Shorthand(name) => {
                    let value = self.lookup(name, env)?;
                    object.borrow_mut().set(name.clone(), value);
                }
                Prop::Method { key, function } => {
                    let key = self.prop_key(key, env)?;
                    let method = self.make_method(function, env, &key, object.clone());
                    object.borrow_mut().set(key, method);
                }
                Prop::Spread(expr) => {
                    let source = self.eval(expr, env)?;
                    self.copy_own(&source, &object);
                }
            }
        }

        Ok(Value::Object(object))
    }

    /// Copies the own enumerable properties of `source` onto `target`.
    pub(crate) fn copy_own(&mut self, source: &Value, target: &ObjectRef) {
        match source {
            Value::Object(source) => {
                let entries = {
                    let source = source.borrow();
                    source
                        .own_keys()
                        .into_iter()
                        .filter_map(|key| {
                            let key = PropertyKey::from(key);
                            source.get_own(&key).map(|value| (key, value))
                        })
                        .collect::<Vec<_>>()
                };
                let mut target = target.borrow_mut();
                for (key, value) in entries {
                    target.set(key, value);
                }
            }
            Value::String(s) => {
                let mut target = target.borrow_mut();
                for (index, c) in s.chars().enumerate() {
                    target.set(index, Value::string(c.to_string()));
                }
            }
            _ => {}
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, arg: &Expr, env: &Env) -> Result<Value, Abrupt> {
        match op {
            UnaryOp::Typeof => {
                if let ExprKind::Ident(name) = &arg.kind
                    && env.lookup(name).is_none()
                    && lookup(&self.realm.global, &PropertyKey::from(name.as_str())).is_none()
                {
                    return Ok(Value::string("undefined"));
                }
                Ok(Value::string(self.eval(arg, env)?.type_of()))
            }
            UnaryOp::Delete => match &arg.kind {
                ExprKind::Member {
                    object, property, ..
                } => {
                    let base = self.eval(object, env)?;
                    let key = self.member_key(property, env)?;
                    Ok(Value::Bool(match base {
                        Value::Object(object) => object.borrow_mut().delete(&key),
                        _ => true,
                    }))
                }
                _ => Ok(Value::Bool(true)),
            },
            op => {
                let value = self.eval(arg, env)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Void, _) => Ok(Value::Undefined),
                    (UnaryOp::Neg, Value::BigInt(n)) => n
                        .checked_neg()
                        .map(Value::BigInt)
                        .ok_or_else(|| self.range_error("Maximum BigInt size exceeded")),
                    (UnaryOp::Neg, value) => Ok(Value::Number(-value.to_number())),
                    (UnaryOp::Plus, Value::BigInt(_)) => {
                        Err(self.type_error("Cannot convert a BigInt value to a number"))
                    }
                    (UnaryOp::Plus, value) => Ok(Value::Number(value.to_number())),
                    (UnaryOp::BitNot, Value::BigInt(n)) => Ok(Value::BigInt(!n)),
                    (UnaryOp::BitNot, value) => Ok(Value::Number(f64::from(!value.to_int32()))),
                    (UnaryOp::Typeof | UnaryOp::Delete, _) => Ok(Value::Undefined),
                }
            }
        }
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Pattern,
        value: &Expr,
        env: &Env,
    ) -> Result<Value, Abrupt> {
        match op {
            AssignOp::Assign => {
                let value = match target {
                    Pattern::Ident(name) => self.eval_named(value, name, env)?,
                    _ => self.eval(value, env)?,
                };
                self.bind_pattern(target, value.clone(), env, BindMode::Assign)?;
                Ok(value)
            }
            AssignOp::Binary(op) => {
                let reference = self.pattern_reference(target, env)?;
                let current = self.get_reference(&reference, env)?;
                let right = self.eval(value, env)?;
                let result = self.binary(op, current, right)?;
                self.put_reference(reference, result.clone(), env)?;
                Ok(result)
            }
            AssignOp::Logical(op) => {
                let reference = self.pattern_reference(target, env)?;
                let current = self.get_reference(&reference, env)?;
                let assigns = match op {
                    LogicalOp::And => current.is_truthy(),
                    LogicalOp::Or => !current.is_truthy(),
                    LogicalOp::Nullish => current.is_nullish(),
                };
                if !assigns {
                    return Ok(current);
                }
                let result = self.eval(value, env)?;
                self.put_reference(reference, result.clone(), env)?;
                Ok(result)
            }
        }
    }

    /// `String(value)`, rejecting symbols the way template literals do.
    pub(crate) fn to_string(&self, value: &Value) -> Result<String, Abrupt> {
        match value {
            Value::Symbol(_) => Err(self.type_error("Cannot convert a Symbol value to a string")),
            value => Ok(value.to_js_string()),
        }
    }

    pub(crate) fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, Abrupt> {
        match op {
            BinaryOp::Add => match (&left, &right) {
                (Value::String(_) | Value::Object(_), _) | (_, Value::String(_) | Value::Object(_)) => {
                    let mut text = self.to_string(&left)?;
                    text.push_str(&self.to_string(&right)?);
                    Ok(Value::from(text))
                }
                _ => self.arithmetic(op, &left, &right),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Exp => {
                self.arithmetic(op, &left, &right)
            }
            BinaryOp::Eq => Ok(Value::Bool(left.loose_equals(&right))),
            BinaryOp::NotEq => Ok(Value::Bool(!left.loose_equals(&right))),
            BinaryOp::StrictEq => Ok(Value::Bool(left.strict_equals(&right))),
            BinaryOp::StrictNotEq => Ok(Value::Bool(!left.strict_equals(&right))),
            BinaryOp::Lt => Ok(Value::Bool(compare(&left, &right, |o| o.is_lt()))),
            BinaryOp::LtEq => Ok(Value::Bool(compare(&left, &right, |o| o.is_le()))),
            BinaryOp::Gt => Ok(Value::Bool(compare(&left, &right, |o| o.is_gt()))),
            BinaryOp::GtEq => Ok(Value::Bool(compare(&left, &right, |o| o.is_ge()))),
            BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::UShr
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor => self.bitwise(op, &left, &right),
            BinaryOp::In => match &right {
                Value::Object(object) => {
                    Ok(Value::Bool(lookup(object, &left.to_property_key()).is_some()))
                }
                _ => Err(self.type_error(format!(
                    "Cannot use 'in' operator to search for '{}' in {}",
                    left.to_js_string(),
                    right.to_js_string()
                ))),
            },
            BinaryOp::InstanceOf => {
                if !right.is_callable() {
                    return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
                }
                let prototype = self.get_named(&right, "prototype")?;
                Ok(Value::Bool(is_instance(&left, &prototype)))
            }
        }
    }

    fn arithmetic(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Abrupt> {
        match (left, right) {
            (Value::BigInt(a), Value::BigInt(b)) => {
                let (a, b) = (*a, *b);
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div | BinaryOp::Mod if b == 0 => {
                        return Err(self.range_error("Division by zero"));
                    }
                    BinaryOp::Div => a.checked_div(b),
                    BinaryOp::Mod => a.checked_rem(b),
                    BinaryOp::Exp if b < 0 => {
                        return Err(self.range_error("Exponent must be non-negative"));
                    }
                    BinaryOp::Exp => u32::try_from(b).ok().and_then(|b| a.checked_pow(b)),
                    _ => None,
                };
                result
                    .map(Value::BigInt)
                    .ok_or_else(|| self.range_error("Maximum BigInt size exceeded"))
            }
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(self.type_error(
                "Cannot mix BigInt and other types, use explicit conversions",
            )),
            _ => {
                let (a, b) = (left.to_number(), right.to_number());
                Ok(Value::Number(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Mod => a % b,
                    _ => a.powf(b),
                }))
            }
        }
    }

    fn bitwise(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Abrupt> {
        if let (Value::BigInt(a), Value::BigInt(b)) = (left, right) {
            let shift = u32::try_from(*b).unwrap_or(u32::MAX).min(127);
            return Ok(Value::BigInt(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                BinaryOp::Shl => a << shift,
                _ => a >> shift,
            }));
        }

        let (a, b) = (left.to_int32(), right.to_int32());
        let shift = (b as u32) & 0x1f;
        Ok(Value::Number(match op {
            BinaryOp::BitAnd => f64::from(a & b),
            BinaryOp::BitOr => f64::from(a | b),
            BinaryOp::BitXor => f64::from(a ^ b),
            BinaryOp::Shl => f64::from(a.wrapping_shl(shift)),
            BinaryOp::Shr => f64::from(a >> shift),
            _ => f64::from((a as u32) >> shift),
        }))
    }
}

impl Awaiter for Runtime<'_> {
    fn settle(&mut self, value: &Value) -> Settled {
        if value.as_object().is_none() {
            return Settled::Fulfilled(value.clone());
        }

        let promise = self.promise_resolve(value.clone());
        Self::mark_handled(&promise);
        if let Err(abrupt) = self.drive_until_settled(&promise) {
            if let Abrupt::Throw(error) | Abrupt::Fatal(error) = abrupt {
                self.fatal.get_or_insert(error);
            }
            return Settled::Pending;
        }

        match Self::promise_state(&promise) {
            PromiseState::Fulfilled(value) => Settled::Fulfilled(value),
            PromiseState::Rejected(reason) => Settled::Rejected(reason),
            PromiseState::Pending => Settled::Pending,
        }
    }
}

/// Declares every `var` in `body` (outside nested functions) as `undefined`.
fn hoist_vars(body: &[Stmt], env: &Env) {
    for stmt in body {
        hoist_stmt(stmt, env);
    }
}

fn hoist_stmt(stmt: &Stmt, env: &Env) {
    let declare = |kind: VarKind, names: Vec<Ident>| {
        if kind == VarKind::Var {
            names.into_iter().for_each(|name| env.declare_var(name));
        }
    };

    match &stmt.kind {
        StmtKind::Var(decl) => declare(
            decl.kind,
            decl.declarators
                .iter()
                .flat_map(|declarator| declarator.target.bound_names())
                .collect(),
        ),
        StmtKind::Block(body) => hoist_vars(body, env),
        StmtKind::If {
            consequent,
            alternate,
            ..
        } => {
            hoist_stmt(consequent, env);
            if let Some(alternate) = alternate {
                hoist_stmt(alternate, env);
            }
        }
        StmtKind::For { init, body, .. } => {
            if let Some(ForInit::Var(decl)) = init {
                declare(
                    decl.kind,
                    decl.declarators
                        .iter()
                        .flat_map(|declarator| declarator.target.bound_names())
                        .collect(),
                );
            }
            hoist_stmt(body, env);
        }
        StmtKind::ForIn { left, body, .. } | StmtKind::ForOf { left, body, .. } => {
            if let ForHead::Var(kind, pattern) = left {
                declare(*kind, pattern.bound_names());
            }
            hoist_stmt(body, env);
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::Labeled { body, .. } => hoist_stmt(body, env),
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => {
            hoist_vars(block, env);
            if let Some(handler) = handler {
                hoist_vars(&handler.body, env);
            }
            if let Some(finalizer) = finalizer {
                hoist_vars(finalizer, env);
            }
        }
        _ => {}
    }
}

/// `None` for a BigInt literal too large to represent.
fn literal_value(literal: &Literal) -> Option<Value> {
    Some(match literal {
        Literal::Number(n) => Value::Number(n.value()),
        Literal::String(s) => Value::string(s),
        Literal::BigInt(digits) => Value::BigInt(parse_bigint(digits)?),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    })
}

pub(crate) fn parse_bigint(digits: &str) -> Option<i128> {
    let lower = digits.to_ascii_lowercase();
    match lower.get(..2) {
        Some("0x") => i128::from_str_radix(&lower[2..], 16).ok(),
        Some("0o") => i128::from_str_radix(&lower[2..], 8).ok(),
        Some("0b") => i128::from_str_radix(&lower[2..], 2).ok(),
        _ => lower.parse().ok(),
    }
}

/// Relational comparison: strings compare by code point, everything else
/// numerically. Comparisons involving `NaN` are false.
fn compare(left: &Value, right: &Value, test: fn(std::cmp::Ordering) -> bool) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) => test(a.as_str().cmp(b.as_str())),
        (Value::BigInt(a), Value::BigInt(b)) => test(a.cmp(b)),
        _ => left
            .to_number()
            .partial_cmp(&right.to_number())
            .is_some_and(test),
    }
}

/// Whether `prototype` appears on the prototype chain of `value`.
pub(crate) fn is_instance(value: &Value, prototype: &Value) -> bool {
    let (Value::Object(object), Value::Object(prototype)) = (value, prototype) else {
        return false;
    };

    let mut current = object.borrow().prototype.clone();
    while let Some(candidate) = current {
        if Rc::ptr_eq(&candidate, prototype) {
            return true;
        }
        current = candidate.borrow().prototype.clone();
    }
    false
}

/// Reduces a thrown value to the name and message shown to the user.
pub fn describe_thrown(value: &Value) -> Thrown {
    if value.is_error() {
        let name = value
            .get("name")
            .map(|name| name.to_js_string())
            .unwrap_or_else(|| "Error".to_string());
        let message = value
            .get("message")
            .map(|message| message.to_js_string())
            .unwrap_or_default();
        return Thrown::new(Some(&name), message);
    }

    Thrown::new(None, value.to_js_string())
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<(Option<u32>, String)>,
    }

    impl DebugSink for Recorder {
        fn emit(&mut self, line: Option<u32>, values: Vec<Value>, awaiter: &mut dyn Awaiter) {
            let text = values
                .iter()
                .map(|value| match awaiter.settle(value) {
                    Settled::Fulfilled(value) if value.is_array() => format!("[{}]", value.to_js_string()),
                    Settled::Fulfilled(value) => value.to_js_string(),
                    Settled::Rejected(reason) => format!("rejected {}", reason.to_js_string()),
                    Settled::Pending => "pending".to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            self.lines.push((line, text));
        }
    }

    /// Runs on a thread with a large stack, like the engine's worker.
    fn execute_with(
        interpreter: Interpreter,
        code: &str,
        cancelled: bool,
    ) -> (Vec<(Option<u32>, String)>, Result<(), EvalError>) {
        let code = code.to_string();
        std::thread::Builder::new()
            .stack_size(16 * 1024 * 1024)
            .spawn(move || {
                let mut interpreter = interpreter;
                let mut recorder = Recorder::default();
                let result = interpreter.execute(&code, &mut recorder, &|| cancelled);
                (recorder.lines, result)
            })
            .unwrap()
            .join()
            .unwrap()
    }

    fn execute(code: &str) -> (Vec<String>, Result<(), EvalError>) {
        let (lines, result) = execute_with(Interpreter::default(), code, false);
        (lines.into_iter().map(|(_, text)| text).collect(), result)
    }

    fn output(code: &str) -> Vec<String> {
        let (lines, result) = execute(code);
        assert_eq!(result, Ok(()), "unexpected error for {:?}", code);
        lines
    }

    fn error(code: &str) -> String {
        match execute(code).1 {
            Err(err) => err.content(),
            Ok(()) => panic!("expected an error for {:?}", code),
        }
    }

    #[rstest]
    #[case::arithmetic("console.log(1 + 2 * 3, 7 % 4, 2 ** 10)", "7 3 1024")]
    #[case::string_concat("console.log(\"a\" + 1 + 2)", "a12")]
    #[case::loose_equality("console.log(null == undefined, 1 == \"1\", 0 === -0)", "true true true")]
    #[case::closures("const add = (a) => (b) => a + b; console.log(add(2)(3))", "5")]
    #[case::var_hoisting("console.log(x); var x = 1", "undefined")]
    #[case::function_hoisting("console.log(f()); function f() { return 4 }", "4")]
    #[case::template("const n = 3; console.log(`n=${n + 1}!`)", "n=4!")]
    #[case::typeof_undeclared("console.log(typeof nope, typeof null, typeof (() => 1))", "undefined object function")]
    #[case::optional_chain("const o = null; console.log(o?.a.b, o?.f())", "undefined undefined")]
    #[case::nullish_assign("let a = null; a ??= 5; let b = 1; b ||= 9; console.log(a, b)", "5 1")]
    #[case::destructuring("const { a, b = 2, ...rest } = { a: 1, c: 3 }; const [x, , y = 9, ...zs] = [1, 2, undefined, 4, 5]; console.log(a, b, rest.c, x, y, zs.length)", "1 2 3 1 9 2")]
    #[case::let_per_iteration("const fs = []; for (let i = 0; i < 3; i++) fs.push(() => i); console.log(fs.map((f) => f()).join())", "0,1,2")]
    #[case::labeled_continue("let n = 0; outer: for (const i of [1, 2, 3]) { for (const j of [1, 2]) { if (j === 2) continue outer; n += i } } console.log(n)", "6")]
    #[case::for_in("const keys = []; for (const k in { b: 1, a: 2, 1: 0 }) keys.push(k); console.log(keys.join())", "1,b,a")]
    #[case::do_while("let i = 0; do { i++ } while (i < 5); console.log(i)", "5")]
    #[case::bigint("console.log(2n ** 64n, typeof 1n)", "18446744073709551616 bigint")]
    #[case::sort("console.log([3, 1, 10, 2].sort((a, b) => a - b).join())", "1,2,3,10")]
    #[case::array_methods("console.log([1, 2, 3, 4].filter((n) => n % 2).map((n) => n * 10).reduce((a, b) => a + b, 0))", "40")]
    #[case::string_methods("console.log(\"a-b-c\".split(\"-\").reverse().join(\"+\"), \"abc\".toUpperCase().padStart(5, \".\"))", "c+b+a ..ABC")]
    #[case::json("console.log(JSON.stringify({ a: [1, \"x\", null, undefined], f() {} }))", "{\"a\":[1,\"x\",null,null]}")]
    #[case::json_parse("console.log(JSON.parse('{\"n\": [1, 2]}').n[1])", "2")]
    #[case::object_statics("const o = Object.assign({}, { a: 1 }, { b: 2 }); console.log(Object.keys(o).join(), Object.values(o).join(), Object.entries(o).length)", "a,b 1,2 2")]
    #[case::spread("const a = [1, 2]; const o = { ...{ x: 1 }, y: 2 }; console.log(Math.max(...a, 0), [...a, ...\"hi\"].join(), o.x + o.y)", "2 1,2,h,i 3")]
    #[case::bind_call_apply("function f(a, b) { return this.k + a + b } const o = { k: 1 }; console.log(f.call(o, 2, 3), f.apply(o, [2, 3]), f.bind(o, 2)(3))", "6 6 6")]
    #[case::function_names("const f = () => 1; const o = { m() {} }; console.log(f.name, o.m.name, (function named() {}).name)", "f m named")]
    fn test_programs(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(output(code), vec![expected.to_string()]);
    }

    #[test]
    fn test_classes() {
        let code = "
            class A {
              static kind = \"base\";
              count = 1;
              constructor(x) { this.x = x }
              get() { return this.x + this.count }
              static make() { return new this(5) }
            }
            class B extends A {
              constructor() { super(2) }
              get() { return super.get() * 10 }
            }
            class C extends B {}
            console.log(new B().get(), A.make().get(), B.kind, new C() instanceof A, typeof A)
        ";
        assert_eq!(output(code), vec!["30 6 base true function"]);
    }

    #[test]
    fn test_class_without_new_is_a_type_error() {
        assert_eq!(
            error("class A {} A()"),
            "TypeError: Class constructor A cannot be invoked without 'new'"
        );
    }

    #[rstest]
    #[case::plain_error("throw new Error(\"boom\")", "boom")]
    #[case::type_error("null.x", "TypeError: Cannot read properties of null (reading 'x')")]
    #[case::not_a_function("const o = {}; o.missing()", "TypeError: o.missing is not a function")]
    #[case::reference_error("y + 1", "ReferenceError: y is not defined")]
    #[case::const_assignment("const c = 1; c = 2", "TypeError: Assignment to constant variable.")]
    #[case::thrown_string("throw \"oops\"", "oops")]
    #[case::subclass("class E extends Error { constructor(m) { super(m); this.name = \"E\" } } throw new E(\"bad\")", "E: bad")]
    #[case::recursion("function f() { return f() } f()", "RangeError: Maximum call stack size exceeded")]
    #[case::bigint_mix("1n + 1", "TypeError: Cannot mix BigInt and other types, use explicit conversions")]
    #[case::bigint_literal_overflow("170141183460469231731687303715884105728n", "RangeError: Maximum BigInt size exceeded")]
    #[case::bigint_increment_overflow("let n = 170141183460469231731687303715884105727n; n++", "RangeError: Maximum BigInt size exceeded")]
    #[case::bigint_decrement_overflow("let n = -170141183460469231731687303715884105727n - 1n; --n", "RangeError: Maximum BigInt size exceeded")]
    #[case::bigint_negate_overflow("-(-170141183460469231731687303715884105727n - 1n)", "RangeError: Maximum BigInt size exceeded")]
    fn test_uncaught_errors(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(error(code), expected);
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(execute("let = ;").1, Err(EvalError::Syntax(_))));
    }

    #[test]
    fn test_try_catch_finally() {
        let code = "
            try { null.x } catch (e) { console.log(e.name, e instanceof TypeError) } finally { console.log(\"done\") }
            try { throw { code: 7 } } catch ({ code }) { console.log(code) }
        ";
        assert_eq!(output(code), vec!["TypeError true", "done", "7"]);
    }

    #[test]
    fn test_microtasks_run_after_sync_code() {
        let code = "
            Promise.resolve(1).then((v) => console.log(\"then\", v));
            queueMicrotask(() => console.log(\"micro\"));
            console.log(\"sync\");
        ";
        assert_eq!(output(code), vec!["sync", "then 1", "micro"]);
    }

    #[test]
    fn test_timers_run_in_virtual_time_order() {
        let code = "
            setTimeout(() => console.log(\"late\"), 50);
            setTimeout(() => console.log(\"early\"), 5);
            const id = setTimeout(() => console.log(\"cleared\"), 1);
            clearTimeout(id);
        ";
        assert_eq!(output(code), vec!["early", "late"]);
    }

    #[test]
    fn test_top_level_await_drives_timers() {
        let code = "
            const v = await new Promise((resolve) => setTimeout(() => resolve(7), 100));
            console.log(v);
        ";
        assert_eq!(output(code), vec!["7"]);
    }

    #[test]
    fn test_async_functions() {
        let code = "
            async function ok() { return 1 }
            async function fail() { throw new Error(\"x\") }
            fail().catch((e) => console.log(\"caught\", e.message));
            console.log(await ok() + await Promise.all([ok(), 2]).then((vs) => vs.length));
        ";
        assert_eq!(output(code), vec!["caught x", "3"]);
    }

    #[test]
    fn test_await_that_never_settles_ends_quietly() {
        let (lines, result) = execute("await new Promise(() => {}); console.log(\"never\")");
        assert!(lines.is_empty());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_rejected_await_is_uncaught() {
        assert_eq!(error("await Promise.reject(new RangeError(\"r\"))"), "RangeError: r");
    }

    #[test]
    fn test_timer_errors_end_the_run() {
        let code = "
            setTimeout(() => { throw new Error(\"in timer\") }, 1);
            setTimeout(() => console.log(\"after\"), 2);
        ";
        let (lines, result) = execute(code);
        assert!(lines.is_empty());
        assert_eq!(result.map_err(|err| err.content()), Err("in timer".to_string()));
    }

    #[test]
    fn test_interval_stops_at_limit() {
        let interpreter = Interpreter {
            max_interval_runs: 5,
            ..Default::default()
        };
        let code = "
            let n = 0;
            setInterval(() => { n++ }, 10);
            setTimeout(() => console.log(n), 1000);
        ";
        let (lines, result) = execute_with(interpreter, code, false);
        assert_eq!(result, Ok(()));
        assert_eq!(lines, vec![(None, "5".to_string())]);
    }

    #[test]
    fn test_debug_sink_reports_lines() {
        let (lines, _) = execute_with(
            Interpreter::default(),
            "__livejs_debug(4, \"x\", 1); console.log(\"y\")",
            false,
        );
        assert_eq!(
            lines,
            vec![(Some(4), "x 1".to_string()), (None, "y".to_string())]
        );
    }

    #[test]
    fn test_awaiter_settles_emitted_promises() {
        let code = "
            __livejs_debug(1, Promise.resolve(5));
            __livejs_debug(2, Promise.reject(new Error(\"no\")));
            __livejs_debug(3, new Promise(() => {}));
        ";
        assert_eq!(output(code), vec!["5", "rejected Error: no", "pending"]);
    }

    #[test]
    fn test_cancellation_predicate_and_pending_work() {
        let (lines, result) = execute_with(
            Interpreter::default(),
            "console.log(__livejs_cancelled()); setTimeout(() => console.log(\"late\"), 1)",
            true,
        );
        assert_eq!(lines, vec![(None, "true".to_string())]);
        assert!(result.is_err_and(|err| err.is_cancellation()));
    }

    #[test]
    fn test_custom_instrumentation_names() {
        let interpreter = Interpreter::new(Instrumentation {
            sink: SmolStr::new("sink"),
            cancel: SmolStr::new("stop"),
        });
        let (lines, result) = execute_with(interpreter, "sink(2, stop())", false);
        assert_eq!(result, Ok(()));
        assert_eq!(lines, vec![(Some(2), "false".to_string())]);
    }

    #[rstest]
    #[case::undefined(Value::Undefined, None, "undefined")]
    #[case::number(Value::Number(3.0), None, "3")]
    fn test_describe_thrown_primitives(#[case] value: Value, #[case] name: Option<&str>, #[case] message: &str) {
        assert_eq!(describe_thrown(&value), Thrown::new(name, message));
    }

    #[rstest]
    #[case::decimal("123", Some(123))]
    #[case::hex("0xff", Some(255))]
    #[case::binary("0b101", Some(5))]
    #[case::invalid("12z", None)]
    fn test_parse_bigint(#[case] digits: &str, #[case] expected: Option<i128>) {
        assert_eq!(parse_bigint(digits), expected);
    }
}
