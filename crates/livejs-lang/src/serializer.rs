//! Converts runtime values into coloured display elements.
//!
//! Containers go through a decycling step that replaces repeated objects
//! with `{"$ref": path}` markers, so cyclic graphs always terminate.
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    eval::{
        Awaiter, Settled,
        builtin::json_number,
        runtime_value::{Object, ObjectKind, PropertyKey, Value},
    },
    number::Number,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    True,
    False,
    Number,
    String,
    Gray,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Elements(Vec<ColoredElement>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColoredElement {
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl ColoredElement {
    pub fn text(content: impl Into<String>, color: Option<Color>) -> Self {
        Self {
            content: Content::Text(content.into()),
            color,
        }
    }

    pub fn elements(children: Vec<ColoredElement>, color: Option<Color>) -> Self {
        Self {
            content: Content::Elements(children),
            color,
        }
    }

    /// The concatenated text of every leaf.
    pub fn plain_text(&self) -> String {
        flatten(self)
            .into_iter()
            .filter_map(|leaf| match leaf.content {
                Content::Text(text) => Some(text),
                Content::Elements(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("Do not know how to serialize a BigInt")]
    BigInt,
    #[error("Value is nested more than {MAX_DEPTH} levels deep")]
    TooDeep,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Renders `value` for display. Promise-likes are waited on through
/// `awaiter` and replaced by what they settle to.
pub fn stringify(value: &Value, awaiter: &mut dyn Awaiter) -> Result<ColoredElement, SerializeError> {
    if has_callable_then(value) {
        return Ok(match awaiter.settle(value) {
            Settled::Fulfilled(resolved) if looks_like_http_response(&resolved) => {
                let status = resolved
                    .get("status")
                    .map(|status| status.to_js_string())
                    .unwrap_or_default();
                ColoredElement::text(format!("Response {{ status: {} }}", status), Some(Color::Gray))
            }
            // A thenable that resolves to itself would never bottom out.
            Settled::Fulfilled(resolved) if has_callable_then(&resolved) => {
                ColoredElement::text("Promise { <pending> }", Some(Color::Gray))
            }
            Settled::Fulfilled(resolved) => stringify(&resolved, awaiter)?,
            Settled::Rejected(reason) => ColoredElement::text(
                format!("Promise rejected: {}", rejection_message(&reason)),
                Some(Color::Error),
            ),
            Settled::Pending => ColoredElement::text("Promise { <pending> }", Some(Color::Gray)),
        });
    }

    let element = match value {
        Value::Undefined => ColoredElement::text("undefined", Some(Color::Gray)),
        Value::Null => ColoredElement::text("null", Some(Color::Gray)),
        Value::Bool(true) => ColoredElement::text("true", Some(Color::True)),
        Value::Bool(false) => ColoredElement::text("false", Some(Color::False)),
        Value::Number(n) => ColoredElement::text(Number::new(*n).to_string(), Some(Color::Number)),
        Value::BigInt(n) => ColoredElement::text(format!("{}n", n), Some(Color::Number)),
        Value::String(s) => ColoredElement::text(serde_json::to_string(s.as_str())?, Some(Color::String)),
        Value::Symbol(symbol) => {
            let description = symbol
                .description
                .as_ref()
                .map(|description| Value::String(description.clone()))
                .unwrap_or_default();
            ColoredElement::elements(
                vec![
                    ColoredElement::text("Symbol(", None),
                    stringify(&description, awaiter)?,
                    ColoredElement::text(")", None),
                ],
                None,
            )
        }
        Value::Object(_) if value.is_callable() => {
            ColoredElement::text(function_label(value), Some(Color::Gray))
        }
        Value::Object(_) if value.is_error() => {
            ColoredElement::text(value.error_summary(), Some(Color::Error))
        }
        Value::Object(_) => {
            let json = decycle(value)?.unwrap_or(serde_json::Value::Null);
            let color = (!value.is_array()).then_some(Color::Gray);
            ColoredElement::text(serde_json::to_string_pretty(&json)?, color)
        }
    };

    Ok(element)
}

/// The leaves of `element`, depth first and left to right.
pub fn flatten(element: &ColoredElement) -> Vec<ColoredElement> {
    match &element.content {
        Content::Text(_) => vec![element.clone()],
        Content::Elements(children) => children.iter().flat_map(flatten).collect(),
    }
}

/// Heuristic: anything with a callable `then` is treated as a promise.
///
/// Objects that merely happen to have such a method are waited on too.
pub fn has_callable_then(value: &Value) -> bool {
    value
        .get("then")
        .is_some_and(|then| then.is_callable())
}

/// Heuristic: a `fetch` response has `status`, `headers` and a callable
/// `text`. Matching objects are summarized instead of walked.
pub fn looks_like_http_response(value: &Value) -> bool {
    value.as_object().is_some()
        && value.get("status").is_some()
        && value.get("headers").is_some()
        && value.get("text").is_some_and(|text| text.is_callable())
}

fn function_label(value: &Value) -> String {
    match value.get("name").map(|name| name.to_js_string()) {
        Some(name) if !name.is_empty() => format!("[Function: {}]", name),
        _ => "[Function (anonymous)]".to_string(),
    }
}

fn rejection_message(reason: &Value) -> String {
    if reason.is_error() {
        reason
            .get("message")
            .map(|message| message.to_js_string())
            .unwrap_or_default()
    } else {
        reason.to_js_string()
    }
}

type ObjectPtr = *const std::cell::RefCell<Object>;

/// Containers nested deeper than this are not rendered.
pub const MAX_DEPTH: usize = 1000;

/// Converts `value` to JSON, replacing every object seen before with a
/// `$ref` to the path where it first appeared. `None` means the value has
/// no JSON form (`undefined`, functions, symbols).
pub fn decycle(value: &Value) -> Result<Option<serde_json::Value>, SerializeError> {
    let mut seen = FxHashMap::default();
    to_json(value, "$".to_string(), 0, &mut seen)
}

fn to_json(
    value: &Value,
    path: String,
    depth: usize,
    seen: &mut FxHashMap<ObjectPtr, String>,
) -> Result<Option<serde_json::Value>, SerializeError> {
    let object = match value {
        Value::Undefined | Value::Symbol(_) => return Ok(None),
        Value::Null => return Ok(Some(serde_json::Value::Null)),
        Value::Bool(b) => return Ok(Some(serde_json::Value::Bool(*b))),
        Value::Number(n) => return Ok(Some(json_number(*n))),
        Value::String(s) => return Ok(Some(serde_json::Value::String(s.to_string()))),
        Value::BigInt(_) => return Err(SerializeError::BigInt),
        Value::Object(_) if value.is_callable() => return Ok(None),
        Value::Object(object) => object,
    };

    let ptr = Rc::as_ptr(object);
    if let Some(first) = seen.get(&ptr) {
        return Ok(Some(serde_json::json!({ "$ref": first })));
    }
    if depth >= MAX_DEPTH {
        return Err(SerializeError::TooDeep);
    }
    seen.insert(ptr, path.clone());

    let (elements, entries) = {
        let object = object.borrow();
        match &object.kind {
            ObjectKind::Array(elements) => (Some(elements.clone()), Vec::new()),
            kind => {
                let is_error = matches!(kind, ObjectKind::Error);
                let entries = object
                    .own_keys()
                    .into_iter()
                    .filter(|key| !(is_error && key == "message"))
                    .filter_map(|key| {
                        object
                            .get_own(&PropertyKey::from(key.clone()))
                            .map(|value| (key, value))
                    })
                    .collect::<Vec<_>>();
                (None, entries)
            }
        }
    };

    let json = match elements {
        Some(elements) => {
            let mut array = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                let path = format!("{}[{}]", path, index);
                array.push(to_json(element, path, depth + 1, seen)?.unwrap_or(serde_json::Value::Null));
            }
            serde_json::Value::Array(array)
        }
        None => {
            let mut map = serde_json::Map::new();
            for (key, value) in &entries {
                let path = format!("{}[{}]", path, serde_json::to_string(key.as_str())?);
                if let Some(value) = to_json(value, path, depth + 1, seen)? {
                    map.insert(key.to_string(), value);
                }
            }
            serde_json::Value::Object(map)
        }
    };

    Ok(Some(json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{
        Abrupt, Runtime,
        runtime_value::{NativeFunction, ObjectRef, Symbol},
    };
    use rstest::rstest;
    use smol_str::SmolStr;

    /// Settles every promise-like the same way.
    struct FixedAwaiter(Settled);

    impl Awaiter for FixedAwaiter {
        fn settle(&mut self, _: &Value) -> Settled {
            self.0.clone()
        }
    }

    fn pending() -> FixedAwaiter {
        FixedAwaiter(Settled::Pending)
    }

    fn noop(_: &mut Runtime<'_>, _: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
        Ok(Value::Undefined)
    }

    fn function(name: &str) -> Value {
        Value::Object(
            Object::new(
                ObjectKind::Native(NativeFunction {
                    name: SmolStr::new(name),
                    func: noop,
                    captures: Vec::new(),
                }),
                None,
            )
            .into_ref(),
        )
    }

    fn object(entries: Vec<(&str, Value)>) -> ObjectRef {
        let object = Object::new(ObjectKind::Ordinary, None).into_ref();
        for (key, value) in entries {
            object.borrow_mut().set(key, value);
        }
        object
    }

    fn array(elements: Vec<Value>) -> Value {
        Value::Object(Object::new(ObjectKind::Array(elements), None).into_ref())
    }

    fn error(name: &str, message: &str) -> Value {
        let error = Object::new(ObjectKind::Error, None).into_ref();
        error.borrow_mut().set("name", Value::string(name));
        error.borrow_mut().set("message", Value::string(message));
        Value::Object(error)
    }

    fn response(status: f64) -> Value {
        Value::Object(object(vec![
            ("status", Value::Number(status)),
            ("headers", Value::Object(object(vec![]))),
            ("text", function("text")),
        ]))
    }

    fn thenable() -> Value {
        Value::Object(object(vec![("then", function("then"))]))
    }

    #[rstest]
    #[case::undefined(Value::Undefined, "undefined", Some(Color::Gray))]
    #[case::null(Value::Null, "null", Some(Color::Gray))]
    #[case::true_(Value::Bool(true), "true", Some(Color::True))]
    #[case::false_(Value::Bool(false), "false", Some(Color::False))]
    #[case::integer(Value::Number(8.0), "8", Some(Color::Number))]
    #[case::fraction(Value::Number(0.5), "0.5", Some(Color::Number))]
    #[case::nan(Value::Number(f64::NAN), "NaN", Some(Color::Number))]
    #[case::bigint(Value::BigInt(12), "12n", Some(Color::Number))]
    #[case::string(Value::string("a\"b"), "\"a\\\"b\"", Some(Color::String))]
    #[case::function(function("add"), "[Function: add]", Some(Color::Gray))]
    #[case::anonymous_function(function(""), "[Function (anonymous)]", Some(Color::Gray))]
    #[case::error(error("TypeError", "bad"), "TypeError: bad", Some(Color::Error))]
    #[case::array(array(vec![Value::Number(1.0), Value::Undefined]), "[\n  1,\n  null\n]", None)]
    #[case::object(
        Value::Object(object(vec![("b", Value::Number(1.0)), ("a", Value::Undefined), ("f", function("f"))])),
        "{\n  \"b\": 1\n}",
        Some(Color::Gray)
    )]
    fn test_stringify(#[case] value: Value, #[case] expected: &str, #[case] color: Option<Color>) {
        assert_eq!(
            stringify(&value, &mut pending()).unwrap(),
            ColoredElement::text(expected, color)
        );
    }

    #[test]
    fn test_stringify_symbol() {
        let symbol = Value::Symbol(Rc::new(Symbol {
            description: Some(SmolStr::new("id")),
        }));
        let element = stringify(&symbol, &mut pending()).unwrap();

        assert_eq!(element.plain_text(), "Symbol(\"id\")");
        assert_eq!(
            flatten(&element).iter().map(|leaf| leaf.color).collect::<Vec<_>>(),
            vec![None, Some(Color::String), None]
        );
    }

    #[test]
    fn test_stringify_self_reference() {
        let node = object(vec![("name", Value::string("root"))]);
        node.borrow_mut().set("self", Value::Object(node.clone()));
        let list = array(vec![Value::Object(node.clone()), Value::Object(node)]);

        assert_eq!(
            stringify(&list, &mut pending()).unwrap().plain_text(),
            serde_json::to_string_pretty(&serde_json::json!([
                { "name": "root", "self": { "$ref": "$[0]" } },
                { "$ref": "$[0]" }
            ]))
            .unwrap()
        );
    }

    #[test]
    fn test_decycle_nested_path() {
        let inner = object(vec![]);
        let outer = object(vec![("a b", Value::Object(inner.clone()))]);
        inner.borrow_mut().set("up", Value::Object(outer.clone()));
        inner.borrow_mut().set("me", Value::Object(inner.clone()));

        assert_eq!(
            decycle(&Value::Object(outer)).unwrap(),
            Some(serde_json::json!({ "a b": { "up": { "$ref": "$" }, "me": { "$ref": "$[\"a b\"]" } } }))
        );
    }

    #[test]
    fn test_stringify_bigint_in_container_fails() {
        let value = array(vec![Value::BigInt(1)]);
        assert!(matches!(
            stringify(&value, &mut pending()),
            Err(SerializeError::BigInt)
        ));
    }

    fn nested_arrays(depth: usize) -> Value {
        (0..depth).fold(array(vec![]), |inner, _| array(vec![inner]))
    }

    #[rstest]
    #[case::at_limit(MAX_DEPTH - 1, true)]
    #[case::past_limit(MAX_DEPTH + 500, false)]
    fn test_stringify_depth_limit(#[case] depth: usize, #[case] renders: bool) {
        let result = stringify(&nested_arrays(depth), &mut pending());

        if renders {
            let text = result.unwrap().plain_text();
            assert!(text.starts_with("[\n  [\n    ["));
        } else {
            assert!(matches!(result, Err(SerializeError::TooDeep)));
        }
    }

    #[rstest]
    #[case::fulfilled(Settled::Fulfilled(Value::Number(42.0)), ColoredElement::text("42", Some(Color::Number)))]
    #[case::response(Settled::Fulfilled(response(404.0)), ColoredElement::text("Response { status: 404 }", Some(Color::Gray)))]
    #[case::rejected_error(Settled::Rejected(error("Error", "nope")), ColoredElement::text("Promise rejected: nope", Some(Color::Error)))]
    #[case::rejected_value(Settled::Rejected(Value::string("why")), ColoredElement::text("Promise rejected: why", Some(Color::Error)))]
    #[case::pending(Settled::Pending, ColoredElement::text("Promise { <pending> }", Some(Color::Gray)))]
    fn test_stringify_promise_like(#[case] settled: Settled, #[case] expected: ColoredElement) {
        assert_eq!(
            stringify(&thenable(), &mut FixedAwaiter(settled)).unwrap(),
            expected
        );
    }

    #[rstest]
    #[case::thenable(thenable(), true)]
    #[case::then_not_callable(Value::Object(object(vec![("then", Value::Number(1.0))])), false)]
    #[case::plain_object(Value::Object(object(vec![])), false)]
    #[case::primitive(Value::string("then"), false)]
    fn test_has_callable_then(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(has_callable_then(&value), expected);
    }

    #[rstest]
    #[case::response(response(200.0), true)]
    #[case::missing_headers(Value::Object(object(vec![("status", Value::Number(200.0)), ("text", function("text"))])), false)]
    #[case::text_not_callable(
        Value::Object(object(vec![
            ("status", Value::Number(200.0)),
            ("headers", Value::Null),
            ("text", Value::string("body")),
        ])),
        false
    )]
    #[case::number(Value::Number(200.0), false)]
    fn test_looks_like_http_response(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(looks_like_http_response(&value), expected);
    }

    #[test]
    fn test_flatten_preserves_leaf_order() {
        let element = ColoredElement::elements(
            vec![
                ColoredElement::text("a", Some(Color::String)),
                ColoredElement::elements(
                    vec![
                        ColoredElement::text("b", None),
                        ColoredElement::text("c", Some(Color::Number)),
                    ],
                    Some(Color::Gray),
                ),
                ColoredElement::text("d", None),
            ],
            None,
        );

        assert_eq!(
            flatten(&element),
            vec![
                ColoredElement::text("a", Some(Color::String)),
                ColoredElement::text("b", None),
                ColoredElement::text("c", Some(Color::Number)),
                ColoredElement::text("d", None),
            ]
        );
    }

    #[test]
    fn test_flatten_leaf_is_itself() {
        let leaf = ColoredElement::text("x", Some(Color::Gray));
        assert_eq!(flatten(&leaf), vec![leaf]);
    }

    #[test]
    fn test_colored_element_json_shape() {
        let element = ColoredElement::elements(vec![ColoredElement::text("1", Some(Color::Number))], None);
        assert_eq!(
            serde_json::to_value(&element).unwrap(),
            serde_json::json!({ "content": [{ "content": "1", "color": "number" }] })
        );
    }
}
