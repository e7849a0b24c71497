use std::rc::Rc;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use super::{Realm, arg};
use crate::{
    eval::{
        Abrupt, Runtime,
        runtime_value::{Object, ObjectKind, PropertyKey, Value},
    },
    number::Number,
};

pub(super) fn install(realm: &Realm) {
    let json = Object::new(ObjectKind::Ordinary, Some(realm.object_prototype.clone())).into_ref();
    realm.define(&json, &[("stringify", stringify), ("parse", parse)]);
    realm.global.borrow_mut().set("JSON", Value::Object(json));
}

/// Converts a finite number to JSON, keeping integers integral.
pub(crate) fn json_number(n: f64) -> serde_json::Value {
    if Number::new(n).is_int() && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// `None` for values JSON skips: `undefined`, functions and symbols.
fn to_json(
    runtime: &Runtime<'_>,
    value: &Value,
    path: &mut Vec<*const std::cell::RefCell<Object>>,
) -> Result<Option<serde_json::Value>, Abrupt> {
    let object = match value {
        Value::Undefined | Value::Symbol(_) => return Ok(None),
        Value::Null => return Ok(Some(serde_json::Value::Null)),
        Value::Bool(b) => return Ok(Some(serde_json::Value::Bool(*b))),
        Value::Number(n) => return Ok(Some(json_number(*n))),
        Value::String(s) => return Ok(Some(serde_json::Value::String(s.to_string()))),
        Value::BigInt(_) => return Err(runtime.type_error("Do not know how to serialize a BigInt")),
        Value::Object(_) if value.is_callable() => return Ok(None),
        Value::Object(object) => object,
    };

    let ptr = Rc::as_ptr(object);
    if path.contains(&ptr) {
        return Err(runtime.type_error("Converting circular structure to JSON"));
    }
    path.push(ptr);

    let (elements, entries) = {
        let object = object.borrow();
        match &object.kind {
            ObjectKind::Array(elements) => (Some(elements.clone()), Vec::new()),
            kind => (
                None,
                object
                    .own_keys()
                    .into_iter()
                    // Error messages are not enumerable.
                    .filter(|key| !(matches!(kind, ObjectKind::Error) && key == "message"))
                    .filter_map(|key| {
                        object
                            .get_own(&PropertyKey::from(key.clone()))
                            .map(|value| (key, value))
                    })
                    .collect(),
            ),
        }
    };

    let json = match elements {
        Some(elements) => {
            let mut array = Vec::with_capacity(elements.len());
            for element in &elements {
                array.push(to_json(runtime, element, path)?.unwrap_or(serde_json::Value::Null));
            }
            serde_json::Value::Array(array)
        }
        None => {
            let mut map = serde_json::Map::new();
            for (key, value) in &entries {
                if let Some(value) = to_json(runtime, value, path)? {
                    map.insert(key.to_string(), value);
                }
            }
            serde_json::Value::Object(map)
        }
    };

    path.pop();
    Ok(Some(json))
}

fn indent(value: &Value) -> String {
    match value {
        Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    }
}

fn stringify(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let Some(json) = to_json(runtime, &arg(args, 0), &mut Vec::new())? else {
        return Ok(Value::Undefined);
    };

    let indent = indent(&arg(args, 2));
    if indent.is_empty() {
        return Ok(Value::from(json.to_string()));
    }

    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(indent.as_bytes()));
    json.serialize(&mut serializer)
        .map_err(|err| runtime.type_error(err.to_string()))?;
    Ok(Value::from(String::from_utf8_lossy(&buffer).into_owned()))
}

fn from_json(runtime: &Runtime<'_>, json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s),
        serde_json::Value::Array(elements) => runtime.new_array(
            elements
                .into_iter()
                .map(|element| from_json(runtime, element))
                .collect(),
        ),
        serde_json::Value::Object(map) => {
            let object = runtime.new_object();
            for (key, value) in map {
                let value = from_json(runtime, value);
                object.borrow_mut().set(key.as_str(), value);
            }
            Value::Object(object)
        }
    }
}

fn parse(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let text = runtime.to_string(&arg(args, 0))?;
    let json = serde_json::from_str::<serde_json::Value>(&text)
        .map_err(|err| runtime.syntax_error(format!("{} is not valid JSON: {}", text, err)))?;
    Ok(from_json(runtime, json))
}
