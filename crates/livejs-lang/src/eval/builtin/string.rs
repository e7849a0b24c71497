use super::{Realm, arg};
use crate::eval::{Abrupt, Runtime, runtime_value::Value};

pub(super) fn install(realm: &Realm) {
    let string = realm.constructor("String", string_constructor, Vec::new(), &realm.string_prototype);
    realm.define(&string, &[("fromCharCode", from_char_code)]);
    realm.define(
        &realm.string_prototype,
        &[
            ("at", at),
            ("charAt", char_at),
            ("charCodeAt", char_code_at),
            ("concat", concat),
            ("endsWith", ends_with),
            ("includes", includes),
            ("indexOf", index_of),
            ("lastIndexOf", last_index_of),
            ("padEnd", pad_end),
            ("padStart", pad_start),
            ("repeat", repeat),
            ("replace", replace),
            ("replaceAll", replace_all),
            ("slice", slice),
            ("split", split),
            ("startsWith", starts_with),
            ("substring", substring),
            ("toLowerCase", to_lower_case),
            ("toString", to_string),
            ("toUpperCase", to_upper_case),
            ("trim", trim),
            ("trimEnd", trim_end),
            ("trimStart", trim_start),
            ("valueOf", to_string),
        ],
    );
}

fn this_string(runtime: &Runtime<'_>, this: &Value) -> Result<Vec<char>, Abrupt> {
    match this {
        Value::Undefined | Value::Null => Err(runtime.type_error(
            "String.prototype method called on null or undefined",
        )),
        this => Ok(runtime.to_string(this)?.chars().collect()),
    }
}

fn text(chars: &[char]) -> Value {
    Value::from(chars.iter().collect::<String>())
}

fn arg_string(runtime: &Runtime<'_>, args: &[Value], index: usize) -> Result<Vec<char>, Abrupt> {
    Ok(runtime.to_string(&arg(args, index))?.chars().collect())
}

/// A position argument clamped to `0..=len`.
fn clamp(value: &Value, len: usize, default: usize) -> usize {
    match value {
        Value::Undefined => default,
        value => {
            let n = value.to_number();
            if n.is_nan() { 0 } else { n.trunc().clamp(0.0, len as f64) as usize }
        }
    }
}

/// Like [`clamp`] but negative positions count from the end.
fn relative(value: &Value, len: usize, default: usize) -> usize {
    match value {
        Value::Number(n) if *n < 0.0 => (len as f64 + n.trunc()).max(0.0) as usize,
        value => clamp(value, len, default),
    }
}

fn find(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return (from <= haystack.len()).then_some(from);
    }
    (from..=haystack.len().saturating_sub(needle.len()))
        .find(|&start| haystack[start..].starts_with(needle))
}

fn string_constructor(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    match args.first() {
        None => Ok(Value::string("")),
        // `String(symbol)` is allowed, unlike implicit conversion.
        Some(value @ Value::Symbol(_)) => Ok(Value::from(value.to_js_string())),
        Some(value) => Ok(Value::from(runtime.to_string(value)?)),
    }
}

fn from_char_code(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::from(
        args.iter()
            .map(|code| char::from_u32(code.to_number() as u32 & 0xffff).unwrap_or('\u{fffd}'))
            .collect::<String>(),
    ))
}

fn at(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let n = arg(args, 0).to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let index = if n < 0.0 { chars.len() as f64 + n } else { n };
    Ok(if index < 0.0 {
        Value::Undefined
    } else {
        chars
            .get(index as usize)
            .map(|c| Value::from(c.to_string()))
            .unwrap_or_default()
    })
}

fn char_at(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let index = arg(args, 0).to_number();
    let index = if index.is_nan() { 0.0 } else { index.trunc() };
    Ok(Value::from(if index < 0.0 {
        String::new()
    } else {
        chars
            .get(index as usize)
            .map(char::to_string)
            .unwrap_or_default()
    }))
}

fn char_code_at(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let index = arg(args, 0).to_number();
    let index = if index.is_nan() { 0.0 } else { index.trunc() };
    Ok(Value::Number(if index < 0.0 {
        f64::NAN
    } else {
        chars
            .get(index as usize)
            .map(|c| f64::from(u32::from(*c)))
            .unwrap_or(f64::NAN)
    }))
}

fn concat(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let mut result: String = this_string(runtime, this)?.into_iter().collect();
    for value in args {
        result.push_str(&runtime.to_string(value)?);
    }
    Ok(Value::from(result))
}

fn ends_with(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let needle = arg_string(runtime, args, 0)?;
    let end = clamp(&arg(args, 1), chars.len(), chars.len());
    Ok(Value::Bool(chars[..end].ends_with(&needle)))
}

fn starts_with(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let needle = arg_string(runtime, args, 0)?;
    let start = clamp(&arg(args, 1), chars.len(), 0);
    Ok(Value::Bool(chars[start..].starts_with(&needle)))
}

fn includes(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let needle = arg_string(runtime, args, 0)?;
    let start = clamp(&arg(args, 1), chars.len(), 0);
    Ok(Value::Bool(find(&chars, &needle, start).is_some()))
}

fn index_of(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let needle = arg_string(runtime, args, 0)?;
    let start = clamp(&arg(args, 1), chars.len(), 0);
    Ok(Value::Number(
        find(&chars, &needle, start).map(|index| index as f64).unwrap_or(-1.0),
    ))
}

fn last_index_of(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let needle = arg_string(runtime, args, 0)?;
    if needle.len() > chars.len() {
        return Ok(Value::Number(-1.0));
    }
    Ok(Value::Number(
        (0..=chars.len() - needle.len())
            .rev()
            .find(|&start| chars[start..].starts_with(&needle))
            .map(|index| index as f64)
            .unwrap_or(-1.0),
    ))
}

fn pad(runtime: &Runtime<'_>, this: &Value, args: &[Value], at_start: bool) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let target = arg(args, 0).to_number();
    let filler = match arg(args, 1) {
        Value::Undefined => vec![' '],
        _ => arg_string(runtime, args, 1)?,
    };
    if !target.is_finite() || target as usize <= chars.len() || filler.is_empty() {
        return Ok(text(&chars));
    }

    let padding = filler
        .iter()
        .cycle()
        .take(target as usize - chars.len())
        .collect::<String>();
    let original = chars.iter().collect::<String>();
    Ok(Value::from(if at_start {
        padding + &original
    } else {
        original + &padding
    }))
}

fn pad_end(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    pad(runtime, this, args, false)
}

fn pad_start(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    pad(runtime, this, args, true)
}

fn repeat(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let count = arg(args, 0).to_number();
    let count = if count.is_nan() { 0.0 } else { count.trunc() };
    if count < 0.0 || count.is_infinite() {
        return Err(runtime.range_error(format!("Invalid count value: {}", arg(args, 0).to_js_string())));
    }
    Ok(Value::from(
        chars.iter().collect::<String>().repeat(count as usize),
    ))
}

/// Replaces the first (or every) occurrence of a string pattern. A function
/// replacement is called with the match, its offset and the whole string.
fn replace_with(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], all: bool) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let pattern = arg_string(runtime, args, 0)?;
    let replacement = arg(args, 1);

    let mut result = String::new();
    let mut position = 0;
    while let Some(start) = find(&chars, &pattern, position) {
        result.extend(&chars[position..start]);
        let matched = text(&chars[start..start + pattern.len()]);
        if replacement.is_callable() {
            let replaced = runtime.call(
                &replacement,
                Value::Undefined,
                vec![matched, Value::from(start), text(&chars)],
            )?;
            result.push_str(&runtime.to_string(&replaced)?);
        } else {
            result.push_str(&runtime.to_string(&replacement)?.replace("$&", &matched.to_js_string()));
        }

        position = start + pattern.len();
        if !all || position > chars.len() {
            break;
        }
        if pattern.is_empty() {
            if let Some(c) = chars.get(position) {
                result.push(*c);
            }
            position += 1;
        }
    }
    if position <= chars.len() {
        result.extend(&chars[position..]);
    }
    Ok(Value::from(result))
}

fn replace(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    replace_with(runtime, this, args, false)
}

fn replace_all(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    replace_with(runtime, this, args, true)
}

fn slice(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let start = relative(&arg(args, 0), chars.len(), 0);
    let end = relative(&arg(args, 1), chars.len(), chars.len());
    Ok(if start < end { text(&chars[start..end]) } else { Value::string("") })
}

fn substring(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let start = clamp(&arg(args, 0), chars.len(), 0);
    let end = clamp(&arg(args, 1), chars.len(), chars.len());
    Ok(text(&chars[start.min(end)..start.max(end)]))
}

fn split(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let chars = this_string(runtime, this)?;
    let limit = match arg(args, 1) {
        Value::Undefined => usize::MAX,
        limit => limit.to_number().max(0.0) as usize,
    };

    let parts = match arg(args, 0) {
        Value::Undefined => vec![text(&chars)],
        _ => {
            let separator = arg_string(runtime, args, 0)?;
            if separator.is_empty() {
                chars.iter().map(|c| Value::from(c.to_string())).collect()
            } else {
                let mut parts = Vec::new();
                let mut position = 0;
                while let Some(start) = find(&chars, &separator, position) {
                    parts.push(text(&chars[position..start]));
                    position = start + separator.len();
                }
                parts.push(text(&chars[position..]));
                parts
            }
        }
    };

    Ok(runtime.new_array(parts.into_iter().take(limit).collect()))
}

fn to_lower_case(runtime: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::from(this_string(runtime, this)?.iter().collect::<String>().to_lowercase()))
}

fn to_upper_case(runtime: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::from(this_string(runtime, this)?.iter().collect::<String>().to_uppercase()))
}

fn to_string(runtime: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(text(&this_string(runtime, this)?))
}

fn trim(runtime: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::string(this_string(runtime, this)?.iter().collect::<String>().trim()))
}

fn trim_end(runtime: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::string(this_string(runtime, this)?.iter().collect::<String>().trim_end()))
}

fn trim_start(runtime: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::string(this_string(runtime, this)?.iter().collect::<String>().trim_start()))
}
