use std::cmp::Ordering;

use itertools::Itertools;

use super::{Realm, arg};
use crate::eval::{
    Abrupt, Runtime,
    runtime_value::{ObjectKind, PropertyKey, Value},
};

pub(super) fn install(realm: &Realm) {
    let array = realm.constructor("Array", array_constructor, Vec::new(), &realm.array_prototype);
    realm.define(
        &array,
        &[("isArray", is_array), ("from", from), ("of", of)],
    );
    realm.define(
        &realm.array_prototype,
        &[
            ("at", at),
            ("concat", concat),
            ("every", every),
            ("fill", fill),
            ("filter", filter),
            ("find", find),
            ("findIndex", find_index),
            ("findLast", find_last),
            ("flat", flat),
            ("flatMap", flat_map),
            ("forEach", for_each),
            ("includes", includes),
            ("indexOf", index_of),
            ("join", join),
            ("lastIndexOf", last_index_of),
            ("map", map),
            ("pop", pop),
            ("push", push),
            ("reduce", reduce),
            ("reverse", reverse),
            ("shift", shift),
            ("slice", slice),
            ("some", some),
            ("sort", sort),
            ("splice", splice),
            ("toString", join),
            ("unshift", unshift),
        ],
    );
}

fn elements(runtime: &Runtime<'_>, this: &Value) -> Result<Vec<Value>, Abrupt> {
    if let Some(object) = this.as_object()
        && let ObjectKind::Array(elements) = &object.borrow().kind
    {
        return Ok(elements.clone());
    }
    Err(runtime.type_error("Array.prototype method called on a non-array"))
}

fn update<T>(
    runtime: &Runtime<'_>,
    this: &Value,
    f: impl FnOnce(&mut Vec<Value>) -> T,
) -> Result<T, Abrupt> {
    if let Some(object) = this.as_object()
        && let ObjectKind::Array(elements) = &mut object.borrow_mut().kind
    {
        return Ok(f(elements));
    }
    Err(runtime.type_error("Array.prototype method called on a non-array"))
}

/// Resolves a relative index argument against `len`, the way `slice` does.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    match value {
        Value::Undefined => default,
        value => {
            let n = value.to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                n.min(len as f64) as usize
            }
        }
    }
}

fn callback(runtime: &Runtime<'_>, args: &[Value]) -> Result<Value, Abrupt> {
    let callback = arg(args, 0);
    if callback.is_callable() {
        Ok(callback)
    } else {
        Err(runtime.type_error(format!("{} is not a function", callback.to_js_string())))
    }
}

/// Calls `f(element, index, array)` for every element until `stop` says so.
/// Returns the index it stopped at.
fn scan(
    runtime: &mut Runtime<'_>,
    this: &Value,
    args: &[Value],
    stop: impl Fn(&Value) -> bool,
) -> Result<Option<(usize, Value)>, Abrupt> {
    let callback = callback(runtime, args)?;
    let this_arg = arg(args, 1);

    for (index, element) in elements(runtime, this)?.into_iter().enumerate() {
        let result = runtime.call(
            &callback,
            this_arg.clone(),
            vec![element.clone(), Value::from(index), this.clone()],
        )?;
        if stop(&result) {
            return Ok(Some((index, element)));
        }
    }
    Ok(None)
}

fn array_constructor(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    match args {
        [Value::Number(n)] => {
            if n.fract() != 0.0 || *n < 0.0 || *n > f64::from(u32::MAX) {
                return Err(runtime.range_error("Invalid array length"));
            }
            Ok(runtime.new_array(vec![Value::Undefined; *n as usize]))
        }
        args => Ok(runtime.new_array(args.to_vec())),
    }
}

fn is_array(_: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(arg(args, 0).is_array()))
}

fn from(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let source = arg(args, 0);
    let values = match &source {
        Value::Object(object) if !source.is_array() => {
            // Array-like objects: `{ length: n }`.
            let length = object
                .borrow()
                .get_own(&PropertyKey::from("length"))
                .map(|length| length.to_number())
                .filter(|length| length.is_finite() && *length > 0.0)
                .unwrap_or(0.0) as usize;
            let mut values = Vec::with_capacity(length);
            for index in 0..length {
                values.push(runtime.get(&source, &PropertyKey::from(index))?);
            }
            values
        }
        _ => runtime.iterate(&source)?,
    };

    let mapper = arg(args, 1);
    if !mapper.is_callable() {
        return Ok(runtime.new_array(values));
    }
    let mut mapped = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        mapped.push(runtime.call(&mapper, Value::Undefined, vec![value, Value::from(index)])?);
    }
    Ok(runtime.new_array(mapped))
}

fn of(runtime: &mut Runtime<'_>, _: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(runtime.new_array(args.to_vec()))
}

fn at(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let elements = elements(runtime, this)?;
    let n = arg(args, 0).to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let index = if n < 0.0 { elements.len() as f64 + n } else { n };
    Ok(if index < 0.0 {
        Value::Undefined
    } else {
        elements.get(index as usize).cloned().unwrap_or_default()
    })
}

fn concat(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let mut result = elements(runtime, this)?;
    for value in args {
        if value.is_array() {
            result.extend(elements(runtime, value)?);
        } else {
            result.push(value.clone());
        }
    }
    Ok(runtime.new_array(result))
}

fn every(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(scan(runtime, this, args, |result| !result.is_truthy())?.is_none()))
}

fn some(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Bool(scan(runtime, this, args, Value::is_truthy)?.is_some()))
}

fn find(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(scan(runtime, this, args, Value::is_truthy)?
        .map(|(_, element)| element)
        .unwrap_or_default())
}

fn find_index(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    Ok(Value::Number(
        scan(runtime, this, args, Value::is_truthy)?
            .map(|(index, _)| index as f64)
            .unwrap_or(-1.0),
    ))
}

fn find_last(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let callback = callback(runtime, args)?;
    for (index, element) in elements(runtime, this)?.into_iter().enumerate().rev() {
        let found = runtime.call(
            &callback,
            Value::Undefined,
            vec![element.clone(), Value::from(index), this.clone()],
        )?;
        if found.is_truthy() {
            return Ok(element);
        }
    }
    Ok(Value::Undefined)
}

fn fill(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let value = arg(args, 0);
    update(runtime, this, |elements| {
        let len = elements.len();
        let start = relative_index(&arg(args, 1), len, 0);
        let end = relative_index(&arg(args, 2), len, len);
        for element in elements.iter_mut().take(end).skip(start) {
            *element = value.clone();
        }
    })?;
    Ok(this.clone())
}

fn filter(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let callback = callback(runtime, args)?;
    let mut kept = Vec::new();
    for (index, element) in elements(runtime, this)?.into_iter().enumerate() {
        let keep = runtime.call(
            &callback,
            arg(args, 1),
            vec![element.clone(), Value::from(index), this.clone()],
        )?;
        if keep.is_truthy() {
            kept.push(element);
        }
    }
    Ok(runtime.new_array(kept))
}

fn map(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let callback = callback(runtime, args)?;
    let elements = elements(runtime, this)?;
    let mut mapped = Vec::with_capacity(elements.len());
    for (index, element) in elements.into_iter().enumerate() {
        mapped.push(runtime.call(
            &callback,
            arg(args, 1),
            vec![element, Value::from(index), this.clone()],
        )?);
    }
    Ok(runtime.new_array(mapped))
}

fn for_each(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    scan(runtime, this, args, |_| false)?;
    Ok(Value::Undefined)
}

fn flatten_into(runtime: &Runtime<'_>, values: Vec<Value>, depth: f64, out: &mut Vec<Value>) -> Result<(), Abrupt> {
    for value in values {
        if depth >= 1.0 && value.is_array() {
            flatten_into(runtime, elements(runtime, &value)?, depth - 1.0, out)?;
        } else {
            out.push(value);
        }
    }
    Ok(())
}

fn flat(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let depth = match arg(args, 0) {
        Value::Undefined => 1.0,
        depth => depth.to_number(),
    };
    let mut flattened = Vec::new();
    flatten_into(runtime, elements(runtime, this)?, depth, &mut flattened)?;
    Ok(runtime.new_array(flattened))
}

fn flat_map(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], captures: &[Value]) -> Result<Value, Abrupt> {
    let mapped = map(runtime, this, args, captures)?;
    let mut flattened = Vec::new();
    flatten_into(runtime, elements(runtime, &mapped)?, 1.0, &mut flattened)?;
    Ok(runtime.new_array(flattened))
}

fn includes(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let needle = arg(args, 0);
    let elements = elements(runtime, this)?;
    let start = relative_index(&arg(args, 1), elements.len(), 0);
    Ok(Value::Bool(
        elements[start..].iter().any(|element| element.same_value_zero(&needle)),
    ))
}

fn index_of(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let needle = arg(args, 0);
    let elements = elements(runtime, this)?;
    let start = relative_index(&arg(args, 1), elements.len(), 0);
    Ok(Value::Number(
        elements[start..]
            .iter()
            .position(|element| element.strict_equals(&needle))
            .map(|index| (index + start) as f64)
            .unwrap_or(-1.0),
    ))
}

fn last_index_of(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let needle = arg(args, 0);
    Ok(Value::Number(
        elements(runtime, this)?
            .iter()
            .rposition(|element| element.strict_equals(&needle))
            .map(|index| index as f64)
            .unwrap_or(-1.0),
    ))
}

fn join(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let separator = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        separator => separator.to_js_string(),
    };
    let joined = elements(runtime, this)?
        .iter()
        .map(|element| match element {
            Value::Undefined | Value::Null => String::new(),
            element => element.to_js_string(),
        })
        .join(&separator);
    Ok(Value::from(joined))
}

fn pop(runtime: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    update(runtime, this, |elements| elements.pop().unwrap_or_default())
}

fn push(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    update(runtime, this, |elements| {
        elements.extend(args.iter().cloned());
        Value::from(elements.len())
    })
}

fn shift(runtime: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    update(runtime, this, |elements| {
        if elements.is_empty() {
            Value::Undefined
        } else {
            elements.remove(0)
        }
    })
}

fn unshift(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    update(runtime, this, |elements| {
        elements.splice(0..0, args.iter().cloned());
        Value::from(elements.len())
    })
}

fn reduce(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let callback = callback(runtime, args)?;
    let mut elements = elements(runtime, this)?.into_iter().enumerate();

    let mut accumulator = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match elements.next() {
            Some((_, first)) => first,
            None => return Err(runtime.type_error("Reduce of empty array with no initial value")),
        },
    };
    for (index, element) in elements {
        accumulator = runtime.call(
            &callback,
            Value::Undefined,
            vec![accumulator, element, Value::from(index), this.clone()],
        )?;
    }
    Ok(accumulator)
}

fn reverse(runtime: &mut Runtime<'_>, this: &Value, _: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    update(runtime, this, |elements| elements.reverse())?;
    Ok(this.clone())
}

fn slice(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let elements = elements(runtime, this)?;
    let len = elements.len();
    let start = relative_index(&arg(args, 0), len, 0);
    let end = relative_index(&arg(args, 1), len, len);
    let sliced = if start < end { elements[start..end].to_vec() } else { Vec::new() };
    Ok(runtime.new_array(sliced))
}

fn splice(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let removed = update(runtime, this, |elements| {
        let len = elements.len();
        let start = relative_index(&arg(args, 0), len, 0);
        let count = match args.get(1) {
            None => len - start,
            Some(count) => {
                let count = count.to_number();
                if count.is_nan() || count < 0.0 {
                    0
                } else {
                    (count as usize).min(len - start)
                }
            }
        };
        elements
            .splice(start..start + count, args.iter().skip(2).cloned())
            .collect()
    })?;
    Ok(runtime.new_array(removed))
}

/// Default sort order: `undefined` last, everything else by string value.
fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => Ordering::Equal,
        (Value::Undefined, _) => Ordering::Greater,
        (_, Value::Undefined) => Ordering::Less,
        (a, b) => a.to_js_string().cmp(&b.to_js_string()),
    }
}

/// A stable merge sort with a fallible comparator. A user comparator may
/// be inconsistent or throw, which `slice::sort_by` cannot tolerate.
fn merge_sort(
    values: Vec<Value>,
    compare: &mut dyn FnMut(&Value, &Value) -> Result<Ordering, Abrupt>,
) -> Result<Vec<Value>, Abrupt> {
    if values.len() <= 1 {
        return Ok(values);
    }

    let mut left = values;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, compare)?;
    let right = merge_sort(right, compare)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        let next = if compare(a, b)? == Ordering::Greater {
            right.next()
        } else {
            left.next()
        };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

fn sort(runtime: &mut Runtime<'_>, this: &Value, args: &[Value], _: &[Value]) -> Result<Value, Abrupt> {
    let comparator = arg(args, 0);
    let values = elements(runtime, this)?;

    let sorted = if comparator.is_callable() {
        merge_sort(values, &mut |a, b| match (a, b) {
            (Value::Undefined, _) | (_, Value::Undefined) => Ok(default_order(a, b)),
            _ => {
                let order = runtime
                    .call(&comparator, Value::Undefined, vec![a.clone(), b.clone()])?
                    .to_number();
                Ok(if order > 0.0 {
                    Ordering::Greater
                } else if order < 0.0 {
                    Ordering::Less
                } else {
                    Ordering::Equal
                })
            }
        })?
    } else {
        merge_sort(values, &mut |a, b| Ok(default_order(a, b)))?
    };

    update(runtime, this, |elements| *elements = sorted)?;
    Ok(this.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn numbers(values: &[f64]) -> Vec<Value> {
        values.iter().copied().map(Value::Number).collect()
    }

    #[rstest]
    #[case::undefined(Value::Undefined, 5, 3, 3)]
    #[case::positive(Value::Number(2.0), 5, 0, 2)]
    #[case::negative(Value::Number(-2.0), 5, 0, 3)]
    #[case::past_end(Value::Number(9.0), 5, 0, 5)]
    #[case::before_start(Value::Number(-9.0), 5, 0, 0)]
    fn test_relative_index(#[case] value: Value, #[case] len: usize, #[case] default: usize, #[case] expected: usize) {
        assert_eq!(relative_index(&value, len, default), expected);
    }

    #[test]
    fn test_default_order_sorts_as_strings() {
        let sorted = merge_sort(numbers(&[10.0, 9.0, 1.0]), &mut |a, b| Ok(default_order(a, b))).unwrap();
        assert_eq!(sorted.iter().map(Value::to_js_string).collect::<Vec<_>>(), vec!["1", "10", "9"]);
    }

    #[test]
    fn test_merge_sort_is_stable() {
        let values = vec![
            Value::string("b1"),
            Value::string("a"),
            Value::string("b2"),
        ];
        let sorted = merge_sort(values, &mut |a, b| {
            Ok(a.to_js_string()[..1].cmp(&b.to_js_string()[..1]))
        })
        .unwrap();
        assert_eq!(
            sorted.iter().map(Value::to_js_string).collect::<Vec<_>>(),
            vec!["a", "b1", "b2"]
        );
    }

    #[test]
    fn test_merge_sort_tolerates_inconsistent_comparator() {
        let sorted = merge_sort(numbers(&[3.0, 1.0, 2.0, 5.0, 4.0]), &mut |_, _| Ok(Ordering::Greater)).unwrap();
        assert_eq!(sorted.len(), 5);
    }
}
