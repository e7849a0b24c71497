//! The global object and the built-in library.
mod array;
mod json;
mod string;

pub(crate) use json::json_number;

use std::rc::Rc;

use smol_str::SmolStr;

use super::{
    Abrupt, Runtime, is_instance, parse_bigint,
    promise,
    runtime_value::{
        BoundFunction, NativeFn, NativeFunction, Object, ObjectKind, ObjectRef, PropertyKey,
        Symbol, Value,
    },
};
use crate::{number::Number, transform::Instrumentation};

pub const ERROR_TYPES: [&str; 5] = ["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError"];

/// Console methods forwarded to the debug sink.
const CONSOLE_METHODS: [&str; 8] = ["log", "info", "warn", "error", "debug", "trace", "table", "dir"];

pub struct Realm {
    pub global: ObjectRef,
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    pub number_prototype: ObjectRef,
    pub boolean_prototype: ObjectRef,
    pub bigint_prototype: ObjectRef,
    pub symbol_prototype: ObjectRef,
    pub promise_prototype: ObjectRef,
    errors: Vec<(&'static str, ObjectRef)>,
}

/// The first argument, or `undefined`.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

impl Realm {
    pub fn new(instrumentation: &Instrumentation) -> Self {
        let object_prototype = Object::new(ObjectKind::Ordinary, None).into_ref();
        let prototype = || Object::new(ObjectKind::Ordinary, Some(object_prototype.clone())).into_ref();
        let error_prototype = prototype();

        let mut realm = Self {
            global: prototype(),
            function_prototype: prototype(),
            array_prototype: prototype(),
            string_prototype: prototype(),
            number_prototype: prototype(),
            boolean_prototype: prototype(),
            bigint_prototype: prototype(),
            symbol_prototype: prototype(),
            promise_prototype: prototype(),
            errors: ERROR_TYPES
                .iter()
                .map(|name| match *name {
                    "Error" => (*name, error_prototype.clone()),
                    name => (
                        name,
                        Object::new(ObjectKind::Ordinary, Some(error_prototype.clone())).into_ref(),
                    ),
                })
                .collect(),
            object_prototype,
        };

        realm.install_globals(instrumentation);
        realm
    }

    pub fn native(&self, name: &str, func: NativeFn) -> Value {
        self.native_with(name, func, Vec::new())
    }

    /// A native function carrying `captures` into every call.
    pub fn native_with(&self, name: &str, func: NativeFn, captures: Vec<Value>) -> Value {
        Value::Object(self.native_object(name, func, captures))
    }

    fn native_object(&self, name: &str, func: NativeFn, captures: Vec<Value>) -> ObjectRef {
        Object::new(
            ObjectKind::Native(NativeFunction {
                name: SmolStr::new(name),
                func,
                captures,
            }),
            Some(self.function_prototype.clone()),
        )
        .into_ref()
    }

    /// The prototype for errors called `name`, `Error.prototype` if unknown.
    pub fn error_prototype(&self, name: &str) -> ObjectRef {
        self.errors
            .iter()
            .find(|(error, _)| *error == name)
            .or_else(|| self.errors.first())
            .map(|(_, prototype)| prototype.clone())
            .unwrap_or_else(|| self.object_prototype.clone())
    }

    fn define(&self, object: &ObjectRef, methods: &[(&str, NativeFn)]) {
        let mut object = object.borrow_mut();
        for (name, func) in methods {
            object.set(*name, self.native(name, *func));
        }
    }

    /// A constructor function linked both ways with `prototype`.
    fn constructor(&self, name: &str, func: NativeFn, captures: Vec<Value>, prototype: &ObjectRef) -> ObjectRef {
        let object = self.native_object(name, func, captures);
        object
            .borrow_mut()
            .set("prototype", Value::Object(prototype.clone()));
        prototype
            .borrow_mut()
            .set("constructor", Value::Object(object.clone()));
        self.global.borrow_mut().set(name, Value::Object(object.clone()));
        object
    }

    fn install_globals(&mut self, instrumentation: &Instrumentation) {
        let global = self.global.clone();

        {
            let mut global = global.borrow_mut();
            global.set("globalThis", Value::Object(self.global.clone()));
            global.set("undefined", Value::Undefined);
            global.set("NaN", Value::Number(f64::NAN));
            global.set("Infinity", Value::Number(f64::INFINITY));
            global.set(instrumentation.sink.clone(), self.native(&instrumentation.sink, debug_sink));
            global.set(instrumentation.cancel.clone(), self.native(&instrumentation.cancel, cancelled));
        }

        self.define(
            &global,
            &[
                ("parseInt", parse_int),
                ("parseFloat", parse_float),
                ("isNaN", is_nan),
                ("isFinite", is_finite),
                ("setTimeout", promise::set_timeout),
                ("setInterval", promise::set_interval),
                ("clearTimeout", promise::clear_timer),
                ("clearInterval", promise::clear_timer),
                ("queueMicrotask", queue_microtask),
            ],
        );

        let console = Object::new(ObjectKind::Ordinary, Some(self.object_prototype.clone())).into_ref();
        for method in CONSOLE_METHODS {
            console.borrow_mut().set(method, self.native(method, console_method));
        }
        global.borrow_mut().set("console", Value::Object(console));

        self.install_object();
        self.install_function();
        self.install_primitives();
        self.install_errors();
        self.install_promise();
        self.install_math();
        array::install(self);
        string::install(self);
        json::install(self);
    }

    fn install_object(&self) {
        let object = self.constructor("Object", object_constructor, Vec::new(), &self.object_prototype);
        self.define(
            &object,
            &[
                ("keys", object_keys),
                ("values", object_values),
                ("entries", object_entries),
                ("assign", object_assign),
                ("fromEntries", object_from_entries),
                ("create", object_create),
                ("getPrototypeOf", object_get_prototype_of),
                ("freeze", identity),
            ],
        );
        self.define(
            &self.object_prototype,
            &[
                ("hasOwnProperty", has_own_property),
                ("toString", object_to_string),
            ],
        );
    }

    fn install_function(&self) {
        self.define(
            &self.function_prototype,
            &[
                ("call", function_call),
                ("apply", function_apply),
                ("bind", function_bind),
                ("toString", primitive_to_string),
            ],
        );
    }

    fn install_primitives(&self) {
        let number = self.constructor("Number", number_constructor, Vec::new(), &self.number_prototype);
        self.define(
            &number,
            &[
                ("isInteger", number_is_integer),
                ("isSafeInteger", number_is_safe_integer),
                ("isFinite", number_is_finite),
                ("isNaN", number_is_nan),
                ("parseFloat", parse_float),
                ("parseInt", parse_int),
            ],
        );
        {
            let mut number = number.borrow_mut();
            number.set("MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0));
            number.set("MIN_SAFE_INTEGER", Value::Number(-9_007_199_254_740_991.0));
            number.set("EPSILON", Value::Number(f64::EPSILON));
            number.set("MAX_VALUE", Value::Number(f64::MAX));
            number.set("MIN_VALUE", Value::Number(5e-324));
            number.set("POSITIVE_INFINITY", Value::Number(f64::INFINITY));
            number.set("NEGATIVE_INFINITY", Value::Number(f64::NEG_INFINITY));
            number.set("NaN", Value::Number(f64::NAN));
        }
        self.define(
            &self.number_prototype,
            &[
                ("toFixed", number_to_fixed),
                ("toString", number_to_string),
                ("valueOf", value_of),
            ],
        );

        self.constructor("Boolean", boolean_constructor, Vec::new(), &self.boolean_prototype);
        self.define(
            &self.boolean_prototype,
            &[("toString", primitive_to_string), ("valueOf", value_of)],
        );

        self.constructor("BigInt", bigint_constructor, Vec::new(), &self.bigint_prototype);
        self.define(
            &self.bigint_prototype,
            &[("toString", primitive_to_string), ("valueOf", value_of)],
        );

        self.constructor("Symbol", symbol_constructor, Vec::new(), &self.symbol_prototype);
        self.define(&self.symbol_prototype, &[("toString", primitive_to_string)]);
    }

    fn install_errors(&self) {
        for (name, prototype) in &self.errors {
            {
                let mut prototype = prototype.borrow_mut();
                prototype.set("name", Value::string(name));
                prototype.set("message", Value::string(""));
            }
            self.constructor(name, error_constructor, vec![Value::string(name)], prototype);
        }
        self.define(&self.error_prototype("Error"), &[("toString", error_to_string)]);
    }

    fn install_promise(&self) {
        let constructor = self.constructor(
            "Promise",
            promise::promise_constructor,
            Vec::new(),
            &self.promise_prototype,
        );
        self.define(
            &constructor,
            &[
                ("resolve", promise::resolve),
                ("reject", promise::reject),
                ("all", promise::all),
            ],
        );
        self.define(
            &self.promise_prototype,
            &[
                ("then", promise::then),
                ("catch", promise::catch),
                ("finally", promise::finally),
            ],
        );
    }

    fn install_math(&self) {
        let math = Object::new(ObjectKind::Ordinary, Some(self.object_prototype.clone())).into_ref();
        self.define(
            &math,
            &[
                ("abs", math_abs),
                ("floor", math_floor),
                ("ceil", math_ceil),
                ("round", math_round),
                ("trunc", math_trunc),
                ("sign", math_sign),
                ("sqrt", math_sqrt),
                ("cbrt", math_cbrt),
                ("exp", math_exp),
                ("log", math_log),
                ("log2", math_log2),
                ("log10", math_log10),
                ("sin", math_sin),
                ("cos", math_cos),
                ("tan", math_tan),
                ("atan", math_atan),
                ("pow", math_pow),
                ("atan2", math_atan2),
                ("min", math_min),
                ("max", math_max),
                ("hypot", math_hypot),
                ("random", math_random),
            ],
        );
        {
            let mut math = math.borrow_mut();
            math.set("PI", Value::Number(std::f64::consts::PI));
            math.set("E", Value::Number(std::f64::consts::E));
            math.set("LN2", Value::Number(std::f64::consts::LN_2));
            math.set("LN10", Value::Number(std::f64::consts::LN_10));
            math.set("SQRT2", Value::Number(std::f64::consts::SQRT_2));
        }
        self.global.borrow_mut().set("Math", Value::Object(math));
    }
}

fn debug_sink(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let line = args.first().map(|line| line.to_number()).unwrap_or(0.0);
    let line = (line.is_finite() && line >= 0.0).then_some(line as u32);
    runtime.emit(line, args.iter().skip(1).cloned().collect())?;
    Ok(Value::Undefined)
}

fn console_method(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    runtime.emit(None, args.to_vec())?;
    Ok(Value::Undefined)
}

fn cancelled(runtime: &mut Runtime<'_>, _: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(runtime.is_cancelled()))
}

fn queue_microtask(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return Err(runtime.type_error("The \"callback\" argument must be of type function"));
    }
    let resolved = runtime.promise_resolve(Value::Undefined);
    runtime.promise_then(&resolved, Some(callback), None);
    Ok(Value::Undefined)
}

fn identity(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(arg(args, 0))
}

fn value_of(_: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(this.clone())
}

fn primitive_to_string(_: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::from(this.to_js_string()))
}

/// Leading part of `text` that forms a decimal literal, for `parseFloat`.
fn float_prefix(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut end = 0;
    let digits = |mut index: usize| {
        while bytes.get(index).is_some_and(u8::is_ascii_digit) {
            index += 1;
        }
        index
    };

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if text[end..].starts_with("Infinity") {
        return &text[..end + "Infinity".len()];
    }

    let integer_end = digits(end);
    let mut mantissa_end = integer_end;
    if bytes.get(integer_end) == Some(&b'.') {
        mantissa_end = digits(integer_end + 1);
    }
    if mantissa_end == end || (mantissa_end == end + 1 && bytes.get(end) == Some(&b'.')) {
        return "";
    }

    end = mantissa_end;
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exponent_end = digits(exponent);
        if exponent_end > exponent {
            end = exponent_end;
        }
    }
    &text[..end]
}

pub(crate) fn parse_float_str(text: &str) -> f64 {
    let prefix = float_prefix(text.trim_start());
    match prefix.trim_start_matches(['+', '-']) {
        "" => f64::NAN,
        "Infinity" if prefix.starts_with('-') => f64::NEG_INFINITY,
        "Infinity" => f64::INFINITY,
        _ => prefix.parse().unwrap_or(f64::NAN),
    }
}

fn parse_float(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Number(parse_float_str(&arg(args, 0).to_js_string())))
}

pub(crate) fn parse_int_str(text: &str, radix: Option<u32>) -> f64 {
    let text = text.trim_start();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (radix, text) = match radix {
        Some(16) | None if text.starts_with("0x") || text.starts_with("0X") => (16, &text[2..]),
        Some(radix) if !(2..=36).contains(&radix) => return f64::NAN,
        Some(radix) => (radix, text),
        None => (10, text),
    };

    let digits = text
        .chars()
        .map_while(|c| c.to_digit(radix))
        .collect::<Vec<_>>();
    if digits.is_empty() {
        return f64::NAN;
    }

    let value = digits
        .iter()
        .fold(0.0, |acc, digit| acc * f64::from(radix) + f64::from(*digit));
    if negative { -value } else { value }
}

fn parse_int(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let radix = match arg(args, 1) {
        Value::Undefined => None,
        radix => match radix.to_int32() {
            0 => None,
            radix => Some(radix as u32),
        },
    };
    Ok(Value::Number(parse_int_str(&arg(args, 0).to_js_string(), radix)))
}

fn is_nan(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(arg(args, 0).to_number().is_nan()))
}

fn is_finite(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(arg(args, 0).to_number().is_finite()))
}

fn object_constructor(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    match arg(args, 0) {
        value @ Value::Object(_) => Ok(value),
        _ => Ok(Value::Object(runtime.new_object())),
    }
}

/// Own enumerable string keys of any value, as `Object.keys` sees them.
pub(crate) fn own_keys(runtime: &Runtime<'_>, value: &Value) -> Result<Vec<SmolStr>, Abrupt> {
    match value {
        Value::Undefined | Value::Null => Err(runtime.type_error("Cannot convert undefined or null to object")),
        Value::Object(object) => Ok(object.borrow().own_keys()),
        Value::String(s) => Ok((0..s.chars().count())
            .map(|index| SmolStr::new(index.to_string()))
            .collect()),
        _ => Ok(Vec::new()),
    }
}

fn object_keys(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let keys = own_keys(runtime, &arg(args, 0))?;
    Ok(runtime.new_array(keys.into_iter().map(Value::String).collect()))
}

fn object_values(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let object = arg(args, 0);
    let mut values = Vec::new();
    for key in own_keys(runtime, &object)? {
        values.push(runtime.get(&object, &PropertyKey::String(key))?);
    }
    Ok(runtime.new_array(values))
}

fn object_entries(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let object = arg(args, 0);
    let mut entries = Vec::new();
    for key in own_keys(runtime, &object)? {
        let value = runtime.get(&object, &PropertyKey::String(key.clone()))?;
        entries.push(runtime.new_array(vec![Value::String(key), value]));
    }
    Ok(runtime.new_array(entries))
}

fn object_assign(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let Value::Object(target) = arg(args, 0) else {
        return Err(runtime.type_error("Cannot convert undefined or null to object"));
    };
    for source in args.iter().skip(1) {
        runtime.copy_own(source, &target);
    }
    Ok(Value::Object(target))
}

fn object_from_entries(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let object = runtime.new_object();
    for entry in runtime.iterate(&arg(args, 0))? {
        let key = runtime.get(&entry, &PropertyKey::from(0usize))?;
        let value = runtime.get(&entry, &PropertyKey::from(1usize))?;
        object.borrow_mut().set(key.to_property_key(), value);
    }
    Ok(Value::Object(object))
}

fn object_create(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let prototype = match arg(args, 0) {
        Value::Object(prototype) => Some(prototype),
        Value::Null => None,
        value => {
            return Err(runtime.type_error(format!(
                "Object prototype may only be an Object or null: {}",
                value.to_js_string()
            )));
        }
    };
    Ok(Value::Object(Object::new(ObjectKind::Ordinary, prototype).into_ref()))
}

fn object_get_prototype_of(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let prototype = match arg(args, 0) {
        Value::Object(object) => object.borrow().prototype.clone(),
        Value::String(_) => Some(runtime.realm.string_prototype.clone()),
        Value::Number(_) => Some(runtime.realm.number_prototype.clone()),
        Value::Bool(_) => Some(runtime.realm.boolean_prototype.clone()),
        _ => return Err(runtime.type_error("Cannot convert undefined or null to object")),
    };
    Ok(prototype.map(Value::Object).unwrap_or(Value::Null))
}

fn has_own_property(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let key = arg(args, 0).to_property_key();
    match this {
        Value::Object(object) => Ok(Value::Bool(object.borrow().has_own(&key))),
        Value::String(s) => Ok(Value::Bool(
            key.as_index().is_some_and(|index| index < s.chars().count()),
        )),
        Value::Undefined | Value::Null => Err(runtime.type_error("Cannot convert undefined or null to object")),
        _ => Ok(Value::Bool(false)),
    }
}

fn object_to_string(_: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let tag = match this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        value if value.is_array() => "Array",
        value if value.is_callable() => "Function",
        value if value.is_error() => "Error",
        _ => "Object",
    };
    Ok(Value::from(format!("[object {}]", tag)))
}

fn function_call(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let rest = args.iter().skip(1).cloned().collect();
    runtime.call(this, arg(args, 0), rest)
}

fn function_apply(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let rest = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        list => runtime.iterate(&list)?,
    };
    runtime.call(this, arg(args, 0), rest)
}

fn function_bind(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    if !this.is_callable() {
        return Err(runtime.type_error("Bind must be called on a function"));
    }
    Ok(Value::Object(
        Object::new(
            ObjectKind::Bound(BoundFunction {
                target: this.clone(),
                this: arg(args, 0),
                args: args.iter().skip(1).cloned().collect(),
            }),
            Some(runtime.realm.function_prototype.clone()),
        )
        .into_ref(),
    ))
}

fn number_constructor(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Number(match args.first() {
        None => 0.0,
        Some(value) => value.to_number(),
    }))
}

fn number_is_integer(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(
        matches!(arg(args, 0), Value::Number(n) if Number::new(n).is_int()),
    ))
}

fn number_is_safe_integer(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(matches!(
        arg(args, 0),
        Value::Number(n) if Number::new(n).is_int() && n.abs() <= 9_007_199_254_740_991.0
    )))
}

fn number_is_finite(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite())))
}

fn number_is_nan(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_nan())))
}

fn number_to_fixed(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    // `-0` prints without a sign.
    let n = this.to_number() + 0.0;
    let digits = arg(args, 0).to_number();
    let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
    if !(0.0..=100.0).contains(&digits) {
        return Err(runtime.range_error("toFixed() digits argument must be between 0 and 100"));
    }
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(Value::from(Number::new(n).to_string()));
    }
    Ok(Value::from(format!("{:.*}", digits as usize, n)))
}

pub(crate) fn to_radix_string(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return Number::new(n).to_string();
    }

    let negative = n < 0.0;
    let n = n.abs();
    let mut integer = n.trunc();
    let mut digits = Vec::new();
    loop {
        let digit = (integer % f64::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        integer = (integer / f64::from(radix)).trunc();
        if integer < 1.0 {
            break;
        }
    }
    let mut text: String = digits.into_iter().rev().collect();

    let mut fraction = n.fract();
    if fraction > 0.0 {
        text.push('.');
        for _ in 0..20 {
            fraction *= f64::from(radix);
            let digit = fraction.trunc() as u32;
            text.push(std::char::from_digit(digit, radix).unwrap_or('0'));
            fraction = fraction.fract();
            if fraction == 0.0 {
                break;
            }
        }
    }

    if negative { format!("-{}", text) } else { text }
}

fn number_to_string(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let radix = match arg(args, 0) {
        Value::Undefined => 10,
        radix => radix.to_number() as u32,
    };
    if !(2..=36).contains(&radix) {
        return Err(runtime.range_error("toString() radix must be between 2 and 36"));
    }
    Ok(Value::from(to_radix_string(this.to_number(), radix)))
}

fn boolean_constructor(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(arg(args, 0).is_truthy()))
}

fn bigint_constructor(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let value = arg(args, 0);
    let converted = match &value {
        Value::BigInt(n) => Some(*n),
        Value::Number(n) if Number::new(*n).is_int() => Some(*n as i128),
        Value::Bool(b) => Some(i128::from(*b)),
        Value::String(s) => parse_bigint(s.trim()),
        _ => None,
    };
    converted.map(Value::BigInt).ok_or_else(|| {
        runtime.syntax_error(format!("Cannot convert {} to a BigInt", value.to_js_string()))
    })
}

fn symbol_constructor(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let description = match arg(args, 0) {
        Value::Undefined => None,
        description => Some(SmolStr::new(description.to_js_string())),
    };
    Ok(Value::Symbol(Rc::new(Symbol { description })))
}

/// Shared by every error constructor; `captures` holds the error name.
/// Called from a subclass constructor, it turns the existing `this` into
/// an error instead of allocating a new one.
fn error_constructor(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], captures: &[Value]) -> Result<Value, Abrupt> {
    let name = captures
        .first()
        .map(|name| name.to_js_string())
        .unwrap_or_else(|| "Error".to_string());
    let prototype = runtime.realm.error_prototype(&name);

    let error = match this {
        Value::Object(object) if is_instance(this, &Value::Object(prototype.clone())) => {
            object.borrow_mut().kind = ObjectKind::Error;
            object.clone()
        }
        _ => Object::new(ObjectKind::Error, Some(prototype)).into_ref(),
    };

    match arg(args, 0) {
        Value::Undefined => {}
        message => error
            .borrow_mut()
            .set("message", Value::from(runtime.to_string(&message)?)),
    }
    if let Value::Object(options) = arg(args, 1)
        && let Some(cause) = options.borrow().get_own(&PropertyKey::from("cause"))
    {
        error.borrow_mut().set("cause", cause);
    }
    Ok(Value::Object(error))
}

fn error_to_string(_: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::from(this.error_summary()))
}

fn math_unary(args: &[Value], f: fn(f64) -> f64) -> Result<Value, Abrupt> {
    Ok(Value::Number(f(arg(args, 0).to_number())))
}

macro_rules! math_fn {
    ($($name:ident => $f:expr),* $(,)?) => {
        $(
            fn $name(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
                math_unary(args, $f)
            }
        )*
    };
}

math_fn! {
    math_abs => f64::abs,
    math_floor => f64::floor,
    math_ceil => f64::ceil,
    // JavaScript rounds halves towards positive infinity.
    math_round => |n: f64| (n + 0.5).floor(),
    math_trunc => f64::trunc,
    math_sign => |n: f64| if n.is_nan() || n == 0.0 { n } else { n.signum() },
    math_sqrt => f64::sqrt,
    math_cbrt => f64::cbrt,
    math_exp => f64::exp,
    math_log => f64::ln,
    math_log2 => f64::log2,
    math_log10 => f64::log10,
    math_sin => f64::sin,
    math_cos => f64::cos,
    math_tan => f64::tan,
    math_atan => f64::atan,
}

fn math_pow(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
}

fn math_atan2(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Number(arg(args, 0).to_number().atan2(arg(args, 1).to_number())))
}

fn math_min(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Number(args.iter().map(Value::to_number).fold(
        f64::INFINITY,
        |min, n| if n.is_nan() || min.is_nan() { f64::NAN } else { min.min(n) },
    )))
}

fn math_max(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Number(args.iter().map(Value::to_number).fold(
        f64::NEG_INFINITY,
        |max, n| if n.is_nan() || max.is_nan() { f64::NAN } else { max.max(n) },
    )))
}

fn math_hypot(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Number(
        args.iter()
            .map(|n| n.to_number().powi(2))
            .sum::<f64>()
            .sqrt(),
    ))
}

fn math_random(runtime: &mut Runtime<'_>, _: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Number(runtime.next_random()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("42", None, 42.0)]
    #[case::trailing_text("12px", None, 12.0)]
    #[case::negative("  -7", None, -7.0)]
    #[case::hex("0x1f", None, 31.0)]
    #[case::binary("101", Some(2), 5.0)]
    #[case::fraction("3.9", None, 3.0)]
    fn test_parse_int(#[case] text: &str, #[case] radix: Option<u32>, #[case] expected: f64) {
        assert_eq!(parse_int_str(text, radix), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::letters("abc")]
    #[case::bad_radix("10")]
    fn test_parse_int_nan(#[case] text: &str) {
        let radix = (text == "10").then_some(1);
        assert!(parse_int_str(text, radix).is_nan());
    }

    #[rstest]
    #[case::plain("2.75", 2.75)]
    #[case::trailing_text("2.5kg", 2.5)]
    #[case::exponent("1e3x", 1000.0)]
    #[case::dangling_exponent("4e", 4.0)]
    #[case::leading_dot(".5", 0.5)]
    #[case::infinity("-Infinity", f64::NEG_INFINITY)]
    fn test_parse_float(#[case] text: &str, #[case] expected: f64) {
        assert_eq!(parse_float_str(text), expected);
    }

    #[test]
    fn test_parse_float_nan() {
        assert!(parse_float_str(".").is_nan());
        assert!(parse_float_str("x1").is_nan());
    }

    #[rstest]
    #[case::binary(5.0, 2, "101")]
    #[case::hex(255.0, 16, "ff")]
    #[case::negative(-10.0, 16, "-a")]
    #[case::fraction(0.5, 2, "0.1")]
    #[case::decimal(1.5, 10, "1.5")]
    fn test_to_radix_string(#[case] n: f64, #[case] radix: u32, #[case] expected: &str) {
        assert_eq!(to_radix_string(n, radix), expected);
    }

    #[test]
    fn test_error_prototypes_chain_to_error() {
        let realm = Realm::new(&Instrumentation::default());
        let type_error = realm.error_prototype("TypeError");
        let error = realm.error_prototype("Error");

        assert!(
            type_error
                .borrow()
                .prototype
                .as_ref()
                .is_some_and(|parent| Rc::ptr_eq(parent, &error))
        );
        assert!(Rc::ptr_eq(&realm.error_prototype("Unknown"), &error));
    }

    #[test]
    fn test_globals_include_instrumentation_bindings() {
        let realm = Realm::new(&Instrumentation::default());
        let global = realm.global.borrow();

        assert!(global.has_own(&"__livejs_debug".into()));
        assert!(global.has_own(&"__livejs_cancelled".into()));
        assert!(global.has_own(&"console".into()));
        assert!(global.has_own(&"Promise".into()));
    }
}
