//! Calling and constructing functions, and evaluating classes.
use std::rc::Rc;

use super::{
    Abrupt, BindMode, Runtime,
    env::{Env, FunctionFrame},
    runtime_value::{
        ClassInfo, Closure, FieldInit, FunctionBody, FunctionCode, Object, ObjectKind, ObjectRef,
        PropertyKey, Value, lookup,
    },
};
use crate::ast::{
    Ident,
    node::{Arrow, Class, ClassMember, Expr, Function, MethodKind},
};

const FUNCTION_TAG: u8 = 0;
const ARROW_TAG: u8 = 1;
const FIELD_TAG: u8 = 2;

impl Runtime<'_> {
    fn cached_code(&mut self, key: (usize, u8), build: impl FnOnce() -> FunctionCode) -> Rc<FunctionCode> {
        self.code
            .entry(key)
            .or_insert_with(|| Rc::new(build()))
            .clone()
    }

    fn function_code(&mut self, function: &Function) -> Rc<FunctionCode> {
        let key = (function as *const Function as usize, FUNCTION_TAG);
        self.cached_code(key, || FunctionCode {
            params: function.params.clone(),
            body: FunctionBody::Block(function.body.clone()),
            is_async: function.is_async,
            is_arrow: false,
        })
    }

    fn arrow_code(&mut self, arrow: &Arrow) -> Rc<FunctionCode> {
        let key = (arrow as *const Arrow as usize, ARROW_TAG);
        self.cached_code(key, || FunctionCode {
            params: arrow.params.clone(),
            body: FunctionBody::from(arrow.body.clone()),
            is_async: arrow.is_async,
            is_arrow: true,
        })
    }

    fn field_code(&mut self, expr: &Expr) -> Rc<FunctionCode> {
        let key = (expr as *const Expr as usize, FIELD_TAG);
        self.cached_code(key, || FunctionCode {
            params: Vec::new(),
            body: FunctionBody::Expr(expr.clone()),
            is_async: false,
            is_arrow: false,
        })
    }

    fn new_closure(&self, closure: Closure) -> Value {
        Value::Object(
            Object::new(
                ObjectKind::Function(Rc::new(closure)),
                Some(self.realm.function_prototype.clone()),
            )
            .into_ref(),
        )
    }

    pub(super) fn make_function(&mut self, function: &Function, env: &Env, name: Option<Ident>) -> Value {
        let code = self.function_code(function);

        match &function.name {
            // A named function expression can refer to itself.
            Some(own_name) => {
                let scope = env.child();
                let value = self.new_closure(Closure {
                    name: own_name.clone(),
                    code,
                    env: scope.clone(),
                    home: None,
                    class: None,
                });
                scope.declare(own_name.clone(), value.clone(), false);
                value
            }
            None => self.new_closure(Closure {
                name: name.unwrap_or_default(),
                code,
                env: env.clone(),
                home: None,
                class: None,
            }),
        }
    }

    pub(super) fn make_arrow(&mut self, arrow: &Arrow, env: &Env, name: Option<Ident>) -> Value {
        let code = self.arrow_code(arrow);
        self.new_closure(Closure {
            name: name.unwrap_or_default(),
            code,
            env: env.clone(),
            home: None,
            class: None,
        })
    }

    pub(super) fn make_method(
        &mut self,
        function: &Function,
        env: &Env,
        key: &PropertyKey,
        home: ObjectRef,
    ) -> Value {
        let code = self.function_code(function);
        self.new_closure(Closure {
            name: key.to_string().into(),
            code,
            env: env.clone(),
            home: Some(home),
            class: None,
        })
    }

    /// The `prototype` object of a constructor, created on first use.
    pub(crate) fn constructor_prototype(&self, function: &ObjectRef) -> Option<ObjectRef> {
        let key = PropertyKey::from("prototype");
        if let Some(prototype) = function.borrow().properties.get(&key) {
            return prototype.as_object().cloned();
        }

        let constructible = match &function.borrow().kind {
            ObjectKind::Function(closure) => !closure.code.is_arrow && !closure.code.is_async,
            _ => false,
        };
        if !constructible {
            return None;
        }

        let prototype = self.new_object();
        prototype
            .borrow_mut()
            .set("constructor", Value::Object(function.clone()));
        function
            .borrow_mut()
            .set(key, Value::Object(prototype.clone()));
        Some(prototype)
    }

    pub(crate) fn call(&mut self, function: &Value, this: Value, args: Vec<Value>) -> Result<Value, Abrupt> {
        let Some(object) = function.as_object() else {
            return Err(self.type_error(format!("{} is not a function", function.to_js_string())));
        };
        if self.depth >= self.max_call_depth {
            return Err(self.range_error("Maximum call stack size exceeded"));
        }

        let kind = match &object.borrow().kind {
            ObjectKind::Function(closure) => Callee::Closure(closure.clone()),
            ObjectKind::Native(native) => Callee::Native(native.func, native.captures.clone()),
            ObjectKind::Bound(bound) => Callee::Bound(bound.target.clone(), bound.this.clone(), bound.args.clone()),
            _ => Callee::None,
        };

        self.depth += 1;
        let result = match kind {
            Callee::Closure(closure) if closure.is_class() => Err(self.type_error(format!(
                "Class constructor {} cannot be invoked without 'new'",
                closure.name
            ))),
            Callee::Closure(closure) => self.call_closure(&closure, this, args, None),
            Callee::Native(func, captures) => func(self, &this, &args, &captures),
            Callee::Bound(target, bound_this, mut bound_args) => {
                bound_args.extend(args);
                self.call(&target, bound_this, bound_args)
            }
            Callee::None => Err(self.type_error(format!(
                "{} is not a function",
                function.to_js_string()
            ))),
        };
        self.depth -= 1;
        result
    }

    fn call_closure(
        &mut self,
        closure: &Closure,
        this: Value,
        args: Vec<Value>,
        constructor: Option<ObjectRef>,
    ) -> Result<Value, Abrupt> {
        let env = if closure.code.is_arrow {
            closure.env.arrow()
        } else {
            let env = closure.env.function(FunctionFrame {
                this,
                home: closure.home.clone(),
                constructor,
            });
            let arguments = self.new_array(args.clone());
            env.declare(Ident::new_static("arguments"), arguments, true);
            env
        };

        if !closure.code.is_async {
            return self.run_function_body(&closure.code, &env, args);
        }

        let promise = self.new_promise();
        match self.run_function_body(&closure.code, &env, args) {
            Ok(value) => self.resolve_promise(&promise, value),
            Err(Abrupt::Throw(reason)) => self.reject_promise(&promise, reason),
            // The function stays suspended forever and its promise pending.
            Err(Abrupt::Suspend) => {}
            Err(abrupt) => return Err(abrupt),
        }
        Ok(Value::Object(promise))
    }

    fn run_function_body(&mut self, code: &FunctionCode, env: &Env, args: Vec<Value>) -> Result<Value, Abrupt> {
        self.bind_params(code, env, args)?;

        match &code.body {
            FunctionBody::Expr(expr) => self.eval(expr, env),
            FunctionBody::Block(body) => match self.exec_body(body, env) {
                Ok(()) | Err(Abrupt::Break(_) | Abrupt::Continue(_)) => Ok(Value::Undefined),
                Err(Abrupt::Return(value)) => Ok(value),
                Err(abrupt) => Err(abrupt),
            },
        }
    }

    fn bind_params(&mut self, code: &FunctionCode, env: &Env, args: Vec<Value>) -> Result<(), Abrupt> {
        let mut args = args.into_iter();

        for param in &code.params {
            let value = if param.rest {
                self.new_array(args.by_ref().collect())
            } else {
                args.next().unwrap_or_default()
            };
            self.bind_pattern(&param.pattern, value, env, BindMode::Param)?;
        }
        Ok(())
    }

    /// `new constructor(...args)`.
    pub(crate) fn construct(&mut self, constructor: &Value, args: Vec<Value>) -> Result<Value, Abrupt> {
        let Some(object) = constructor.as_object().cloned() else {
            return Err(self.type_error(format!(
                "{} is not a constructor",
                constructor.to_js_string()
            )));
        };
        if self.depth >= self.max_call_depth {
            return Err(self.range_error("Maximum call stack size exceeded"));
        }

        let kind = match &object.borrow().kind {
            ObjectKind::Function(closure) => Callee::Closure(closure.clone()),
            ObjectKind::Native(native) => Callee::Native(native.func, native.captures.clone()),
            ObjectKind::Bound(bound) => Callee::Bound(bound.target.clone(), Value::Undefined, bound.args.clone()),
            _ => Callee::None,
        };

        self.depth += 1;
        let result = match kind {
            Callee::Closure(closure) if closure.code.is_arrow || closure.code.is_async => {
                Err(self.type_error(format!("{} is not a constructor", closure.name)))
            }
            Callee::Closure(closure) => {
                let prototype = self
                    .constructor_prototype(&object)
                    .unwrap_or_else(|| self.realm.object_prototype.clone());
                let this = Value::Object(Object::new(ObjectKind::Ordinary, Some(prototype)).into_ref());

                self.construct_closure(&closure, &object, this.clone(), args)
                    .map(|result| match result {
                        Value::Object(_) => result,
                        _ => this,
                    })
            }
            // Built-in constructors create their own objects.
            Callee::Native(func, captures) => func(self, &Value::Undefined, &args, &captures),
            Callee::Bound(target, _, mut bound_args) => {
                bound_args.extend(args);
                self.construct(&target, bound_args)
            }
            Callee::None => Err(self.type_error(format!(
                "{} is not a constructor",
                constructor.to_js_string()
            ))),
        };
        self.depth -= 1;
        result
    }

    /// Runs a constructor on an existing `this`. Base classes get their
    /// fields before the body runs; derived classes get them from `super()`.
    fn construct_closure(
        &mut self,
        closure: &Closure,
        function: &ObjectRef,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, Abrupt> {
        match &closure.class {
            None => self.call_closure(closure, this, args, Some(function.clone())),
            Some(class) if class.parent.is_none() => {
                self.init_fields(closure, &this)?;
                if class.implicit_constructor {
                    return Ok(Value::Undefined);
                }
                self.call_closure(closure, this, args, Some(function.clone()))
            }
            Some(class) if class.implicit_constructor => {
                self.super_construct(closure, &this, args)?;
                Ok(Value::Undefined)
            }
            Some(_) => self.call_closure(closure, this, args, Some(function.clone())),
        }
    }

    /// `super(...args)` inside a derived constructor.
    pub(super) fn super_call(&mut self, args: Vec<Value>, env: &Env) -> Result<Value, Abrupt> {
        let frame = env.frame();
        let closure = frame.constructor.as_ref().and_then(|constructor| match &constructor.borrow().kind {
            ObjectKind::Function(closure) if closure.is_class() => Some(closure.clone()),
            _ => None,
        });
        let Some(closure) = closure else {
            return Err(self.syntax_error("'super' keyword unexpected here"));
        };

        self.super_construct(&closure, &frame.this, args)?;
        Ok(Value::Undefined)
    }

    /// Runs the parent constructor of `closure` on `this`, then the field
    /// initializers of `closure` itself.
    fn super_construct(&mut self, closure: &Closure, this: &Value, args: Vec<Value>) -> Result<(), Abrupt> {
        let parent = closure
            .class
            .as_ref()
            .and_then(|class| class.parent.clone())
            .unwrap_or_default();
        let Some(parent_object) = parent.as_object().cloned() else {
            return Err(self.type_error("Super constructor null of anonymous class is not a constructor"));
        };

        let kind = match &parent_object.borrow().kind {
            ObjectKind::Function(parent) => Callee::Closure(parent.clone()),
            ObjectKind::Native(native) => Callee::Native(native.func, native.captures.clone()),
            _ => Callee::None,
        };
        match kind {
            Callee::Closure(parent) => {
                self.depth += 1;
                let result = self.construct_closure(&parent, &parent_object, this.clone(), args);
                self.depth -= 1;
                result?;
            }
            Callee::Native(func, captures) => {
                func(self, this, &args, &captures)?;
            }
            _ => {
                return Err(self.type_error(format!(
                    "Super constructor {} is not a constructor",
                    parent.to_js_string()
                )));
            }
        }

        self.init_fields(closure, this)
    }

    fn init_fields(&mut self, closure: &Closure, this: &Value) -> Result<(), Abrupt> {
        let Some(class) = &closure.class else {
            return Ok(());
        };

        for FieldInit { key, init } in &class.fields {
            let value = match init {
                Some(code) => {
                    let env = closure.env.function(FunctionFrame {
                        this: this.clone(),
                        home: closure.home.clone(),
                        constructor: None,
                    });
                    self.eval_field(code, key, &env)?
                }
                None => Value::Undefined,
            };
            self.set(this, key.clone(), value)?;
        }
        Ok(())
    }

    fn eval_field(&mut self, code: &FunctionCode, key: &PropertyKey, env: &Env) -> Result<Value, Abrupt> {
        match (&code.body, key.as_str()) {
            (FunctionBody::Expr(expr), Some(name)) => self.eval_named(expr, &Ident::new(name), env),
            (FunctionBody::Expr(expr), None) => self.eval(expr, env),
            (FunctionBody::Block(_), _) => self.run_function_body(code, env, Vec::new()),
        }
    }

    /// `super[key]` inside a method.
    pub(super) fn super_get(&mut self, key: &PropertyKey, env: &Env) -> Result<Value, Abrupt> {
        let Some(home) = env.frame().home else {
            return Err(self.syntax_error("'super' keyword unexpected here"));
        };
        let parent = home.borrow().prototype.clone();
        Ok(parent
            .and_then(|parent| lookup(&parent, key))
            .unwrap_or_default())
    }

    pub(super) fn eval_class(&mut self, class: &Class, env: &Env, name: Option<Ident>) -> Result<Value, Abrupt> {
        let name = class.name.clone().or(name).unwrap_or_default();

        let parent = match &class.super_class {
            Some(super_class) => {
                let parent = self.eval(super_class, env)?;
                if !parent.is_callable() && !matches!(parent, Value::Null) {
                    return Err(self.type_error(format!(
                        "Class extends value {} is not a constructor or null",
                        parent.to_js_string()
                    )));
                }
                Some(parent)
            }
            None => None,
        };
        let prototype_parent = match &parent {
            Some(Value::Null) => None,
            Some(parent) => self.get_named(parent, "prototype")?.as_object().cloned(),
            None => Some(self.realm.object_prototype.clone()),
        };
        let prototype = Object::new(ObjectKind::Ordinary, prototype_parent).into_ref();
        let scope = env.child();

        let constructor = class.members.iter().find_map(|member| match member {
            ClassMember::Method {
                kind: MethodKind::Constructor,
                function,
                ..
            } => Some(function),
            _ => None,
        });
        let (code, implicit_constructor) = match constructor {
            Some(function) => (self.function_code(function), false),
            None => (
                Rc::new(FunctionCode {
                    params: Vec::new(),
                    body: FunctionBody::Block(Vec::new()),
                    is_async: false,
                    is_arrow: false,
                }),
                true,
            ),
        };

        let mut fields = Vec::new();
        for member in &class.members {
            if let ClassMember::Field {
                key,
                value,
                is_static: false,
            } = member
            {
                let key = self.prop_key(key, &scope)?;
                let init = value.as_ref().map(|value| self.field_code(value));
                fields.push(FieldInit { key, init });
            }
        }

        let constructor_parent = match &parent {
            Some(Value::Object(parent)) => parent.clone(),
            _ => self.realm.function_prototype.clone(),
        };
        let constructor = Object::new(
            ObjectKind::Function(Rc::new(Closure {
                name: name.clone(),
                code,
                env: scope.clone(),
                home: Some(prototype.clone()),
                class: Some(ClassInfo {
                    parent: parent.filter(|parent| !matches!(parent, Value::Null)),
                    fields,
                    implicit_constructor,
                }),
            })),
            Some(constructor_parent),
        )
        .into_ref();
        constructor
            .borrow_mut()
            .set("prototype", Value::Object(prototype.clone()));
        prototype
            .borrow_mut()
            .set("constructor", Value::Object(constructor.clone()));
        if !name.is_empty() {
            scope.declare(name, Value::Object(constructor.clone()), false);
        }

        for member in &class.members {
            match member {
                ClassMember::Method {
                    key,
                    kind: MethodKind::Method,
                    function,
                    is_static,
                } => {
                    let key = self.prop_key(key, &scope)?;
                    let home = if *is_static { &constructor } else { &prototype };
                    let method = self.make_method(function, &scope, &key, home.clone());
                    home.borrow_mut().set(key, method);
                }
                ClassMember::Field {
                    key,
                    value,
                    is_static: true,
                } => {
                    let key = self.prop_key(key, &scope)?;
                    let value = match value {
                        Some(value) => {
                            let env = scope.function(FunctionFrame {
                                this: Value::Object(constructor.clone()),
                                home: Some(constructor.clone()),
                                constructor: None,
                            });
                            match key.as_str() {
                                Some(name) => self.eval_named(value, &Ident::new(name), &env)?,
                                None => self.eval(value, &env)?,
                            }
                        }
                        None => Value::Undefined,
                    };
                    constructor.borrow_mut().set(key, value);
                }
                _ => {}
            }
        }

        Ok(Value::Object(constructor))
    }
}

enum Callee {
    Closure(Rc<Closure>),
    Native(super::runtime_value::NativeFn, Vec<Value>),
    Bound(Value, Value, Vec<Value>),
    None,
}
