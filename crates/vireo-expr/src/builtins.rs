#![forbid(unsafe_code)]

//! Builtin member calls on collections, strings and numbers.
//!
//! `items.push(x)` in an expression has no property named `push` to read, so
//! calls on these receivers are dispatched here by name. Mutating array, map
//! and set methods go through the collection mutators, which notify any
//! attached collection observer.

use std::cmp::Ordering;

use vireo_core::value::{format_number, number_to_index};
use vireo_core::{ArrayRef, LifecycleFlags, Result, Value};

/// Whether `name` is a builtin method of `this`'s kind.
#[must_use]
pub fn is_builtin(this: &Value, name: &str) -> bool {
    match this {
        Value::Array(_) => matches!(
            name,
            "push"
                | "pop"
                | "shift"
                | "unshift"
                | "splice"
                | "reverse"
                | "sort"
                | "join"
                | "indexOf"
                | "includes"
                | "slice"
                | "concat"
        ),
        Value::String(_) => matches!(
            name,
            "toUpperCase"
                | "toLowerCase"
                | "trim"
                | "includes"
                | "startsWith"
                | "endsWith"
                | "indexOf"
                | "slice"
                | "split"
        ),
        Value::Map(_) => matches!(name, "get" | "has" | "set" | "delete" | "clear"),
        Value::Set(_) => matches!(name, "has" | "add" | "delete" | "clear"),
        Value::Number(_) => name == "toFixed",
        _ => false,
    }
}

/// Call builtin `name` on `this`. `None` when `this` has no such builtin.
pub fn call_builtin(
    flags: LifecycleFlags,
    this: &Value,
    name: &str,
    args: &[Value],
) -> Option<Result<Value>> {
    if !is_builtin(this, name) {
        return None;
    }
    Some(match this {
        Value::Array(array) => call_array(flags, array, name, args),
        Value::String(s) => Ok(call_string(s, name, args)),
        Value::Map(map) => match name {
            "get" => Ok(map.get(&arg(args, 0))),
            "has" => Ok(Value::Bool(map.has(&arg(args, 0)))),
            "set" => map
                .set(arg(args, 0), arg(args, 1), flags)
                .map(|()| this.clone()),
            "delete" => map.delete(&arg(args, 0), flags).map(Value::Bool),
            _ => map.clear(flags).map(|()| Value::Undefined),
        },
        Value::Set(set) => match name {
            "has" => Ok(Value::Bool(set.has(&arg(args, 0)))),
            "add" => set.add(arg(args, 0), flags).map(|_| this.clone()),
            "delete" => set.delete(&arg(args, 0), flags).map(Value::Bool),
            _ => set.clear(flags).map(|()| Value::Undefined),
        },
        Value::Number(n) => Ok(to_fixed(*n, &arg(args, 0))),
        _ => Ok(Value::Undefined),
    })
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Resolve a relative (possibly negative) index against `len`.
fn relative(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        len.saturating_sub((-n).min(len as f64) as usize)
    } else {
        (n.min(len as f64)) as usize
    }
}

fn call_array(
    flags: LifecycleFlags,
    array: &ArrayRef,
    name: &str,
    args: &[Value],
) -> Result<Value> {
    match name {
        "push" => array.push(args.iter().cloned(), flags).map(Value::from),
        "pop" => array.pop(flags),
        "shift" => array.shift(flags),
        "unshift" => array.unshift(args.to_vec(), flags).map(Value::from),
        "splice" => {
            let start = match args.first() {
                Some(start) => start.to_number(),
                None => return Ok(Value::Array(ArrayRef::new())),
            };
            let start = if start.is_nan() { 0 } else { start.trunc() as isize };
            let delete_count = args
                .get(1)
                .map(|count| number_to_index(count.to_number().max(0.0).trunc()).unwrap_or(0));
            let inserted = args.get(2..).map(<[Value]>::to_vec).unwrap_or_default();
            let removed = array.splice(start, delete_count, inserted, flags)?;
            Ok(Value::Array(ArrayRef::from_values(removed)))
        }
        "reverse" => array.reverse(flags).map(|()| Value::Array(array.clone())),
        "sort" => {
            match args.first().and_then(Value::as_function) {
                Some(compare) => array.sort_by(
                    |a, b| {
                        let order = compare
                            .call(&Value::Undefined, &[a.clone(), b.clone()])?
                            .to_number();
                        Ok(order.partial_cmp(&0.0).unwrap_or(Ordering::Equal))
                    },
                    flags,
                )?,
                None => array.sort(flags)?,
            }
            Ok(Value::Array(array.clone()))
        }
        "join" => {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_owned(),
                Some(sep) => sep.to_display_string(),
            };
            let joined: Vec<String> = array
                .to_vec()
                .iter()
                .map(Value::to_interpolation_string)
                .collect();
            Ok(Value::string(joined.join(&separator)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            let found = array
                .to_vec()
                .iter()
                .position(|item| item.strict_equals(&needle));
            Ok(found.map_or(Value::Number(-1.0), Value::from))
        }
        "includes" => {
            let needle = arg(args, 0);
            let found = array
                .to_vec()
                .iter()
                .any(|item| item.strict_equals(&needle) || item.same_value(&needle));
            Ok(Value::Bool(found))
        }
        "slice" => {
            let items = array.to_vec();
            let start = relative(&arg(args, 0), items.len(), 0);
            let end = relative(&arg(args, 1), items.len(), items.len());
            let slice = items.get(start..end.max(start)).unwrap_or_default();
            Ok(Value::Array(ArrayRef::from_values(slice.to_vec())))
        }
        _ => {
            let mut items = array.to_vec();
            for value in args {
                match value {
                    Value::Array(other) => items.extend(other.to_vec()),
                    other => items.push(other.clone()),
                }
            }
            Ok(Value::Array(ArrayRef::from_values(items)))
        }
    }
}

fn call_string(s: &str, name: &str, args: &[Value]) -> Value {
    let needle = || arg(args, 0).to_display_string();
    match name {
        "toUpperCase" => Value::string(s.to_uppercase()),
        "toLowerCase" => Value::string(s.to_lowercase()),
        "trim" => Value::string(s.trim()),
        "includes" => Value::Bool(s.contains(needle().as_str())),
        "startsWith" => Value::Bool(s.starts_with(needle().as_str())),
        "endsWith" => Value::Bool(s.ends_with(needle().as_str())),
        "indexOf" => match s.find(needle().as_str()) {
            Some(byte) => Value::from(s[..byte].chars().count()),
            None => Value::Number(-1.0),
        },
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let start = relative(&arg(args, 0), chars.len(), 0);
            let end = relative(&arg(args, 1), chars.len(), chars.len());
            let slice = chars.get(start..end.max(start)).unwrap_or_default();
            Value::string(slice.iter().collect::<String>())
        }
        _ => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::string(s)],
                Some(sep) => {
                    let sep = sep.to_display_string();
                    if sep.is_empty() {
                        s.chars().map(|c| Value::string(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::string).collect()
                    }
                }
            };
            Value::Array(ArrayRef::from_values(parts))
        }
    }
}

fn to_fixed(n: f64, digits: &Value) -> Value {
    if !n.is_finite() {
        return Value::string(format_number(n));
    }
    let digits = number_to_index(digits.to_number()).unwrap_or(0).min(100);
    Value::string(format!("{n:.digits$}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vireo_core::{FunctionRef, MapRef, SetRef};

    fn call(this: &Value, name: &str, args: &[Value]) -> Value {
        call_builtin(LifecycleFlags::empty(), this, name, args)
            .expect("builtin")
            .unwrap()
    }

    fn numbers(values: &[f64]) -> Value {
        Value::Array(ArrayRef::from_values(values.iter().map(|&n| Value::Number(n)).collect()))
    }

    fn as_numbers(value: &Value) -> Vec<f64> {
        value.as_array().unwrap().to_vec().iter().map(Value::to_number).collect()
    }

    #[test]
    fn array_mutators() {
        let items = numbers(&[1.0, 2.0, 3.0]);
        assert_eq!(call(&items, "push", &[Value::Number(4.0)]).to_number(), 4.0);
        assert_eq!(call(&items, "shift", &[]).to_number(), 1.0);
        let removed = call(
            &items,
            "splice",
            &[Value::Number(-2.0), Value::Number(1.0), Value::Number(9.0)],
        );
        assert_eq!(as_numbers(&removed), [3.0]);
        assert_eq!(as_numbers(&items), [2.0, 9.0, 4.0]);
        call(&items, "reverse", &[]);
        assert_eq!(as_numbers(&items), [4.0, 9.0, 2.0]);
    }

    #[test]
    fn sort_with_and_without_comparator() {
        let items = numbers(&[10.0, 9.0, 1.0]);
        call(&items, "sort", &[]);
        assert_eq!(as_numbers(&items), [1.0, 10.0, 9.0]);
        let descending = FunctionRef::new("desc", |_, args| {
            Ok(Value::Number(args[1].to_number() - args[0].to_number()))
        });
        call(&items, "sort", &[Value::Function(descending)]);
        assert_eq!(as_numbers(&items), [10.0, 9.0, 1.0]);
    }

    #[test]
    fn array_queries() {
        let items = numbers(&[1.0, 2.0, f64::NAN]);
        assert_eq!(call(&items, "indexOf", &[Value::Number(2.0)]).to_number(), 1.0);
        assert_eq!(call(&items, "indexOf", &[Value::Number(f64::NAN)]).to_number(), -1.0);
        assert!(call(&items, "includes", &[Value::Number(f64::NAN)]).is_truthy());
        assert_eq!(call(&items, "join", &[Value::from("-")]).to_display_string(), "1-2-NaN");
        assert_eq!(as_numbers(&call(&items, "slice", &[Value::Number(-2.0)]))[0], 2.0);
        let joined = call(&items, "concat", &[numbers(&[7.0]), Value::Number(8.0)]);
        assert_eq!(joined.as_array().unwrap().len(), 5);
    }

    #[test]
    fn strings() {
        let s = Value::from("  Hello World ");
        assert_eq!(call(&s, "trim", &[]).to_display_string(), "Hello World");
        let s = Value::from("a,b,c");
        assert_eq!(call(&s, "split", &[",".into()]).as_array().unwrap().len(), 3);
        assert_eq!(call(&s, "indexOf", &["b".into()]).to_number(), 2.0);
        assert_eq!(call(&s, "slice", &[Value::Number(2.0)]).to_display_string(), "b,c");
        assert!(call(&s, "startsWith", &["a,".into()]).is_truthy());
        assert_eq!(call(&s, "toUpperCase", &[]).to_display_string(), "A,B,C");
    }

    #[test]
    fn maps_sets_numbers() {
        let map = Value::Map(MapRef::new());
        call(&map, "set", &["k".into(), Value::Number(1.0)]);
        assert_eq!(call(&map, "get", &["k".into()]).to_number(), 1.0);
        assert!(call(&map, "delete", &["k".into()]).is_truthy());
        assert!(!call(&map, "has", &["k".into()]).is_truthy());

        let set = Value::Set(SetRef::new());
        call(&set, "add", &[Value::Number(1.0)]);
        assert!(call(&set, "has", &[Value::Number(1.0)]).is_truthy());

        let n = Value::Number(3.14159);
        assert_eq!(call(&n, "toFixed", &[Value::Number(2.0)]).to_display_string(), "3.14");
        assert!(call_builtin(LifecycleFlags::empty(), &n, "push", &[]).is_none());
        assert!(!is_builtin(&Value::Null, "push"));
    }
}
