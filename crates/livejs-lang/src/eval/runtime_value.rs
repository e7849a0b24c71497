use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    rc::Rc,
};

use indexmap::IndexMap;
use itertools::Itertools;
use rustc_hash::FxBuildHasher;
use smol_str::SmolStr;

use super::{
    env::Env,
    promise::PromiseRecord,
};
use crate::{
    ast::node::{ArrowBody, Expr, Param},
    number::Number,
};

pub type ObjectRef = Rc<RefCell<Object>>;
pub type Properties = IndexMap<PropertyKey, Value, FxBuildHasher>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(SmolStr),
    Symbol(Rc<Symbol>),
    Object(ObjectRef),
}

#[derive(Debug)]
pub struct Symbol {
    pub description: Option<SmolStr>,
}

/// A property name. Symbols compare by identity.
#[derive(Clone, Debug)]
pub enum PropertyKey {
    String(SmolStr),
    Symbol(Rc<Symbol>),
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyKey::String(a), PropertyKey::String(b)) => a == b,
            (PropertyKey::Symbol(a), PropertyKey::Symbol(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            PropertyKey::String(name) => name.hash(state),
            PropertyKey::Symbol(symbol) => Rc::as_ptr(symbol).hash(state),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        PropertyKey::String(SmolStr::new(name))
    }
}

impl From<SmolStr> for PropertyKey {
    fn from(name: SmolStr) -> Self {
        PropertyKey::String(name)
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        PropertyKey::String(SmolStr::new(index.to_string()))
    }
}

impl PropertyKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(name) => Some(name.as_str()),
            PropertyKey::Symbol(_) => None,
        }
    }

    /// The key as an array index, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PropertyKey::String(name) if name == "0" => Some(0),
            PropertyKey::String(name) if !name.starts_with('0') => name.parse().ok(),
            _ => None,
        }
    }
}

impl Display for PropertyKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(name) => write!(f, "{}", name),
            PropertyKey::Symbol(symbol) => write!(
                f,
                "Symbol({})",
                symbol.description.as_deref().unwrap_or_default()
            ),
        }
    }
}

pub struct Object {
    pub kind: ObjectKind,
    pub properties: Properties,
    pub prototype: Option<ObjectRef>,
}

pub enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    Function(Rc<Closure>),
    Native(NativeFunction),
    Bound(BoundFunction),
    Promise(PromiseRecord),
    Error,
}

impl Debug for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.properties.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Object {
    pub fn new(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            kind,
            properties: Properties::default(),
            prototype,
        }
    }

    pub fn into_ref(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Function(_) | ObjectKind::Native(_) | ObjectKind::Bound(_)
        )
    }

    pub fn set(&mut self, key: impl Into<PropertyKey>, value: Value) {
        let key = key.into();

        if let ObjectKind::Array(elements) = &mut self.kind {
            if let Some(index) = key.as_index() {
                if index >= elements.len() {
                    elements.resize(index + 1, Value::Undefined);
                }
                elements[index] = value;
                return;
            }
            if key.as_str() == Some("length") {
                let length = value.to_number();
                if length >= 0.0 && length.fract() == 0.0 {
                    elements.resize(length as usize, Value::Undefined);
                }
                return;
            }
        }

        self.properties.insert(key, value);
    }

    /// An own property, including the virtual `length` and index slots.
    pub fn get_own(&self, key: &PropertyKey) -> Option<Value> {
        match &self.kind {
            ObjectKind::Array(elements) => {
                if let Some(index) = key.as_index() {
                    return elements.get(index).cloned();
                }
                if key.as_str() == Some("length") {
                    return Some(Value::Number(elements.len() as f64));
                }
            }
            ObjectKind::Function(closure) if !self.properties.contains_key(key) => {
                match key.as_str() {
                    Some("name") => return Some(Value::String(closure.name.clone())),
                    Some("length") => return Some(Value::Number(closure.arity() as f64)),
                    _ => {}
                }
            }
            ObjectKind::Native(native) if key.as_str() == Some("name") => {
                return Some(Value::String(native.name.clone()));
            }
            _ => {}
        }

        self.properties.get(key).cloned()
    }

    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.get_own(key).is_some()
    }

    /// Own enumerable string keys in JavaScript order: indices first.
    pub fn own_keys(&self) -> Vec<SmolStr> {
        let indices = match &self.kind {
            ObjectKind::Array(elements) => (0..elements.len())
                .map(|index| SmolStr::new(index.to_string()))
                .collect(),
            _ => Vec::new(),
        };

        let (mut numeric, named): (Vec<_>, Vec<_>) = self
            .properties
            .keys()
            .filter_map(|key| key.as_str().map(SmolStr::new))
            .partition(|key| PropertyKey::from(key.clone()).as_index().is_some());
        numeric.sort_by_key(|key| key.parse::<usize>().unwrap_or(usize::MAX));

        indices.into_iter().chain(numeric).chain(named).collect()
    }

    pub fn delete(&mut self, key: &PropertyKey) -> bool {
        if let ObjectKind::Array(elements) = &mut self.kind
            && let Some(index) = key.as_index()
        {
            if index < elements.len() {
                elements[index] = Value::Undefined;
            }
            return true;
        }
        self.properties.shift_remove(key);
        true
    }
}

/// Looks `key` up on `object` and then along its prototype chain.
pub fn lookup(object: &ObjectRef, key: &PropertyKey) -> Option<Value> {
    let mut current = Some(object.clone());

    while let Some(object) = current {
        let object = object.borrow();
        if let Some(value) = object.get_own(key) {
            return Some(value);
        }
        current = object.prototype.clone();
    }

    None
}

pub enum FunctionBody {
    Block(Vec<crate::ast::node::Stmt>),
    Expr(Expr),
}

impl From<ArrowBody> for FunctionBody {
    fn from(body: ArrowBody) -> Self {
        match body {
            ArrowBody::Block(block) => FunctionBody::Block(block),
            ArrowBody::Expr(expr) => FunctionBody::Expr(*expr),
        }
    }
}

/// The parsed code of a function, shared by every closure created from it.
pub struct FunctionCode {
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_arrow: bool,
}

/// An instance field initializer declared in a class body.
pub struct FieldInit {
    pub key: PropertyKey,
    pub init: Option<Rc<FunctionCode>>,
}

pub struct ClassInfo {
    pub parent: Option<Value>,
    pub fields: Vec<FieldInit>,
    /// `true` when the class body declares no constructor.
    pub implicit_constructor: bool,
}

pub struct Closure {
    pub name: SmolStr,
    pub code: Rc<FunctionCode>,
    pub env: Env,
    /// The object methods were defined on, used to resolve `super.x`.
    pub home: Option<ObjectRef>,
    pub class: Option<ClassInfo>,
}

impl Closure {
    pub fn arity(&self) -> usize {
        self.code
            .params
            .iter()
            .take_while(|param| {
                !param.rest && !matches!(param.pattern, crate::ast::node::Pattern::Default { .. })
            })
            .count()
    }

    pub fn is_class(&self) -> bool {
        self.class.is_some()
    }
}

pub type NativeFn = fn(
    &mut super::Runtime<'_>,
    &Value,
    &[Value],
    &[Value],
) -> Result<Value, super::Abrupt>;

/// A built-in function. `captures` carries state for functions created at
/// runtime, such as promise resolvers.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: SmolStr,
    pub func: NativeFn,
    pub captures: Vec<Value>,
}

#[derive(Clone)]
pub struct BoundFunction {
    pub target: Value,
    pub this: Value,
    pub args: Vec<Value>,
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::String(SmolStr::new(text))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        self.as_object()
            .is_some_and(|object| object.borrow().is_callable())
    }

    pub fn is_array(&self) -> bool {
        self.as_object()
            .is_some_and(|object| matches!(object.borrow().kind, ObjectKind::Array(_)))
    }

    pub fn is_error(&self) -> bool {
        self.as_object()
            .is_some_and(|object| matches!(object.borrow().kind, ObjectKind::Error))
    }

    /// A property lookup that needs no runtime: own properties and the
    /// prototype chain of objects.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_object()
            .and_then(|object| lookup(object, &PropertyKey::from(key)))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(_) if self.is_callable() => "function",
            Value::Object(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Symbol(_) | Value::Object(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::BigInt(n) => *n as f64,
            Value::String(s) => Number::parse(s).value(),
            Value::Symbol(_) => f64::NAN,
            Value::Object(_) if self.is_array() => Number::parse(&self.to_js_string()).value(),
            Value::Object(_) => f64::NAN,
        }
    }

    /// `ToInt32` used by the bitwise operators.
    pub fn to_int32(&self) -> i32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        (n.trunc().rem_euclid(4_294_967_296.0) as u32) as i32
    }

    pub fn to_property_key(&self) -> PropertyKey {
        match self {
            Value::Symbol(symbol) => PropertyKey::Symbol(symbol.clone()),
            Value::String(s) => PropertyKey::String(s.clone()),
            value => PropertyKey::String(SmolStr::new(value.to_js_string())),
        }
    }

    /// `String(value)`.
    pub fn to_js_string(&self) -> String {
        let mut seen = Vec::new();
        self.write_js_string(&mut seen)
    }

    fn write_js_string(&self, seen: &mut Vec<*const RefCell<Object>>) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => Number::new(*n).to_string(),
            Value::BigInt(n) => n.to_string(),
            Value::String(s) => s.to_string(),
            Value::Symbol(symbol) => format!(
                "Symbol({})",
                symbol.description.as_deref().unwrap_or_default()
            ),
            Value::Object(object) => {
                let ptr = Rc::as_ptr(object);
                if seen.contains(&ptr) {
                    return String::new();
                }
                if self.is_error() {
                    return self.error_summary();
                }

                let elements = match &object.borrow().kind {
                    ObjectKind::Array(elements) => elements.clone(),
                    kind => return describe_kind(kind),
                };

                seen.push(ptr);
                let joined = elements
                    .iter()
                    .map(|element| match element {
                        Value::Undefined | Value::Null => String::new(),
                        element => element.write_js_string(seen),
                    })
                    .join(",");
                seen.pop();
                joined
            }
        }
    }

    /// `Name: message` for error objects, or just the name without a message.
    pub fn error_summary(&self) -> String {
        let name = self
            .get("name")
            .map(|name| name.to_js_string())
            .unwrap_or_else(|| "Error".to_string());
        let message = self
            .get("message")
            .map(|message| message.to_js_string())
            .unwrap_or_default();

        if message.is_empty() {
            name
        } else {
            format!("{}: {}", name, message)
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Equality used by `includes`: like `===` except `NaN` equals itself.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::BigInt(a), Value::Number(b)) | (Value::Number(b), Value::BigInt(a)) => {
                (*a as f64) == *b
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Object(_), Value::Number(_) | Value::String(_) | Value::BigInt(_)) => {
                Value::string(self.to_js_string()).loose_equals(other)
            }
            (Value::Number(_) | Value::String(_) | Value::BigInt(_), Value::Object(_)) => {
                self.loose_equals(&Value::string(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }
}

fn describe_kind(kind: &ObjectKind) -> String {
    match kind {
        ObjectKind::Function(closure) if closure.is_class() => {
            format!("class {} {{ }}", closure.name)
        }
        ObjectKind::Function(closure) => format!("function {}() {{ [code] }}", closure.name),
        ObjectKind::Native(native) => format!("function {}() {{ [native code] }}", native.name),
        ObjectKind::Bound(_) => "function () { [native code] }".to_string(),
        ObjectKind::Promise(_) => "[object Promise]".to_string(),
        ObjectKind::Array(_) | ObjectKind::Error | ObjectKind::Ordinary => {
            "[object Object]".to_string()
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(SmolStr::new(s))
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(object) => match &object.borrow().kind {
                ObjectKind::Array(elements) => write!(f, "Array({})", elements.len()),
                ObjectKind::Function(closure) => write!(f, "Function({})", closure.name),
                ObjectKind::Native(native) => write!(f, "Native({})", native.name),
                ObjectKind::Bound(_) => write!(f, "BoundFunction"),
                ObjectKind::Promise(_) => write!(f, "Promise"),
                ObjectKind::Error => write!(f, "Error"),
                ObjectKind::Ordinary => write!(f, "Object"),
            },
            value => write!(f, "{}", value.to_js_string()),
        }
    }
}
