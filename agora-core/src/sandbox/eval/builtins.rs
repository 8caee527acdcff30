//! The closed builtin surface reachable from sandboxed code.
//!
//! Everything here is a pure function over [`Value`]s: no I/O, no clock, no
//! environment, no reflection. The name tables double as the validator's
//! whitelist, so a name missing here is rejected before evaluation.

use super::expression::{compare_values, iter_values, values_equal, Value};
use super::{EvalError, EvalResult};

/// Whitelisted builtin functions.
pub const FUNCTION_NAMES: &[&str] = &[
    "len", "str", "int", "float", "bool", "list", "tuple", "dict", "sorted", "reversed",
    "enumerate", "range", "zip", "sum", "min", "max", "abs", "round",
];

/// Whitelisted method names across all receiver types.
pub const METHOD_NAMES: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "rsplit",
    "join",
    "replace",
    "startswith",
    "endswith",
    "count",
    "find",
    "index",
    "title",
    "capitalize",
    "zfill",
    "isdigit",
    "isalpha",
    "get",
    "keys",
    "values",
    "items",
];

/// Maximum number of elements `range` may materialize.
const MAX_RANGE: i64 = 100_000;

pub fn call_function(name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "len" => builtin_len(args),
        "str" => builtin_str(args),
        "int" => builtin_int(args),
        "float" => builtin_float(args),
        "bool" => builtin_bool(args),
        "list" => builtin_list(args),
        "tuple" => builtin_tuple(args),
        "dict" => builtin_dict(args),
        "sorted" => builtin_sorted(args),
        "reversed" => builtin_reversed(args),
        "enumerate" => builtin_enumerate(args),
        "range" => builtin_range(args),
        "zip" => builtin_zip(args),
        "sum" => builtin_sum(args),
        "min" => builtin_extreme("min", args),
        "max" => builtin_extreme("max", args),
        "abs" => builtin_abs(args),
        "round" => builtin_round(args),
        other => Err(EvalError::Name(other.to_string())),
    }
}

fn expect_args(name: &str, args: &[Value], count: usize) -> EvalResult<()> {
    if args.len() != count {
        return Err(EvalError::Type(format!(
            "{}() takes exactly {} argument{}, got {}",
            name,
            count,
            if count == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn builtin_len(args: &[Value]) -> EvalResult<Value> {
    expect_args("len", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
        Value::List(items) | Value::Tuple(items) => Ok(Value::Integer(items.len() as i64)),
        Value::Map(entries) => Ok(Value::Integer(entries.len() as i64)),
        other => Err(EvalError::Type(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

fn builtin_str(args: &[Value]) -> EvalResult<Value> {
    match args {
        [] => Ok(Value::String(String::new())),
        [value] => Ok(Value::String(value.to_string())),
        _ => Err(EvalError::Type(format!(
            "str() takes at most 1 argument, got {}",
            args.len()
        ))),
    }
}

fn builtin_int(args: &[Value]) -> EvalResult<Value> {
    expect_args("int", args, 1)?;
    match &args[0] {
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Float(v) => Ok(Value::Integer(v.trunc() as i64)),
        Value::Boolean(b) => Ok(Value::Integer(*b as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| EvalError::Type(format!("invalid literal for int(): '{}'", s))),
        other => Err(EvalError::Type(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_float(args: &[Value]) -> EvalResult<Value> {
    expect_args("float", args, 1)?;
    match &args[0] {
        Value::Integer(i) => Ok(Value::Float(*i as f64)),
        Value::Float(v) => Ok(Value::Float(*v)),
        Value::Boolean(b) => Ok(Value::Float(*b as i64 as f64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| EvalError::Type(format!("could not convert string to float: '{}'", s))),
        other => Err(EvalError::Type(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_bool(args: &[Value]) -> EvalResult<Value> {
    match args {
        [] => Ok(Value::Boolean(false)),
        [value] => Ok(Value::Boolean(value.truthy())),
        _ => Err(EvalError::Type(format!(
            "bool() takes at most 1 argument, got {}",
            args.len()
        ))),
    }
}

fn builtin_list(args: &[Value]) -> EvalResult<Value> {
    match args {
        [] => Ok(Value::List(vec![])),
        [value] => Ok(Value::List(iter_values(value)?)),
        _ => Err(EvalError::Type(format!(
            "list() takes at most 1 argument, got {}",
            args.len()
        ))),
    }
}

fn builtin_tuple(args: &[Value]) -> EvalResult<Value> {
    match args {
        [] => Ok(Value::Tuple(vec![])),
        [value] => Ok(Value::Tuple(iter_values(value)?)),
        _ => Err(EvalError::Type(format!(
            "tuple() takes at most 1 argument, got {}",
            args.len()
        ))),
    }
}

fn builtin_dict(args: &[Value]) -> EvalResult<Value> {
    match args {
        [] => Ok(Value::Map(vec![])),
        [Value::Map(entries)] => Ok(Value::Map(entries.clone())),
        [Value::List(items)] | [Value::Tuple(items)] => {
            let mut entries: Vec<(String, Value)> = Vec::with_capacity(items.len());
            for item in items {
                let pair = match item {
                    Value::List(pair) | Value::Tuple(pair) if pair.len() == 2 => pair,
                    other => {
                        return Err(EvalError::Type(format!(
                            "dict() requires key/value pairs, got '{}'",
                            other.type_name()
                        )));
                    }
                };
                let key = match &pair[0] {
                    Value::String(s) => s.clone(),
                    other => {
                        return Err(EvalError::Type(format!(
                            "dict keys must be strings, got '{}'",
                            other.type_name()
                        )));
                    }
                };
                if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
                    entry.1 = pair[1].clone();
                } else {
                    entries.push((key, pair[1].clone()));
                }
            }
            Ok(Value::Map(entries))
        }
        [other] => Err(EvalError::Type(format!(
            "dict() argument must be a dict or a pair sequence, not '{}'",
            other.type_name()
        ))),
        _ => Err(EvalError::Type(format!(
            "dict() takes at most 1 argument, got {}",
            args.len()
        ))),
    }
}

fn builtin_sorted(args: &[Value]) -> EvalResult<Value> {
    expect_args("sorted", args, 1)?;
    let mut items = iter_values(&args[0])?;

    let all_numeric = items
        .iter()
        .all(|v| matches!(v, Value::Integer(_) | Value::Float(_)));
    let all_strings = items.iter().all(|v| matches!(v, Value::String(_)));
    if !all_numeric && !all_strings {
        return Err(EvalError::Type(
            "sorted() requires a sequence of numbers or of strings".to_string(),
        ));
    }
    // Comparisons cannot fail after the homogeneity check.
    items.sort_by(|a, b| compare_values(a, b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Value::List(items))
}

fn builtin_reversed(args: &[Value]) -> EvalResult<Value> {
    expect_args("reversed", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        Value::List(items) | Value::Tuple(items) => {
            Ok(Value::List(items.iter().rev().cloned().collect()))
        }
        other => Err(EvalError::Type(format!(
            "'{}' object is not reversible",
            other.type_name()
        ))),
    }
}

fn builtin_enumerate(args: &[Value]) -> EvalResult<Value> {
    expect_args("enumerate", args, 1)?;
    let items = iter_values(&args[0])?;
    Ok(Value::List(
        items
            .into_iter()
            .enumerate()
            .map(|(i, v)| Value::Tuple(vec![Value::Integer(i as i64), v]))
            .collect(),
    ))
}

fn builtin_range(args: &[Value]) -> EvalResult<Value> {
    let as_int = |value: &Value| match value {
        Value::Integer(i) => Ok(*i),
        other => Err(EvalError::Type(format!(
            "range() arguments must be integers, got '{}'",
            other.type_name()
        ))),
    };

    let (start, stop, step) = match args {
        [stop] => (0, as_int(stop)?, 1),
        [start, stop] => (as_int(start)?, as_int(stop)?, 1),
        [start, stop, step] => (as_int(start)?, as_int(stop)?, as_int(step)?),
        _ => {
            return Err(EvalError::Type(format!(
                "range() takes 1 to 3 arguments, got {}",
                args.len()
            )));
        }
    };
    if step == 0 {
        return Err(EvalError::Type("range() step cannot be zero".to_string()));
    }

    let span = if step > 0 {
        (stop - start).max(0)
    } else {
        (start - stop).max(0)
    };
    if span / step.abs() + 1 > MAX_RANGE {
        return Err(EvalError::Type("range() result too large".to_string()));
    }

    let mut items = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        items.push(Value::Integer(i));
        i += step;
    }
    Ok(Value::List(items))
}

fn builtin_zip(args: &[Value]) -> EvalResult<Value> {
    if args.len() < 2 {
        return Err(EvalError::Type(format!(
            "zip() takes at least 2 arguments, got {}",
            args.len()
        )));
    }
    let sequences: Vec<Vec<Value>> = args
        .iter()
        .map(iter_values)
        .collect::<EvalResult<Vec<_>>>()?;
    let shortest = sequences.iter().map(Vec::len).min().unwrap_or(0);
    let mut rows = Vec::with_capacity(shortest);
    for i in 0..shortest {
        rows.push(Value::Tuple(
            sequences.iter().map(|seq| seq[i].clone()).collect(),
        ));
    }
    Ok(Value::List(rows))
}

fn builtin_sum(args: &[Value]) -> EvalResult<Value> {
    expect_args("sum", args, 1)?;
    let items = iter_values(&args[0])?;

    let mut sum_int = 0i64;
    let mut sum_float = 0.0;
    let mut using_float = false;

    for value in &items {
        match value {
            Value::Integer(i) => {
                if using_float {
                    sum_float += *i as f64;
                } else {
                    sum_int += i;
                }
            }
            Value::Float(f) => {
                if !using_float {
                    sum_float = sum_int as f64;
                    using_float = true;
                }
                sum_float += f;
            }
            other => {
                return Err(EvalError::Type(format!(
                    "sum() requires numbers, got '{}'",
                    other.type_name()
                )));
            }
        }
    }

    if using_float {
        Ok(Value::Float(sum_float))
    } else {
        Ok(Value::Integer(sum_int))
    }
}

fn builtin_extreme(name: &str, args: &[Value]) -> EvalResult<Value> {
    let items = match args {
        [] => {
            return Err(EvalError::Type(format!(
                "{}() expected at least 1 argument",
                name
            )));
        }
        [single] => iter_values(single)?,
        several => several.to_vec(),
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(EvalError::Type(format!("{}() arg is an empty sequence", name)));
    };
    for candidate in iter {
        let ordering = compare_values(&candidate, &best)?;
        let wins = if name == "min" {
            ordering.is_lt()
        } else {
            ordering.is_gt()
        };
        if wins {
            best = candidate;
        }
    }
    Ok(best)
}

fn builtin_abs(args: &[Value]) -> EvalResult<Value> {
    expect_args("abs", args, 1)?;
    match &args[0] {
        Value::Integer(i) => Ok(Value::Integer(i.abs())),
        Value::Float(v) => Ok(Value::Float(v.abs())),
        other => Err(EvalError::Type(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_round(args: &[Value]) -> EvalResult<Value> {
    match args {
        [Value::Integer(i)] => Ok(Value::Integer(*i)),
        [Value::Float(v)] => Ok(Value::Integer(v.round() as i64)),
        [value, Value::Integer(digits)] => {
            let v = match value {
                Value::Integer(i) => *i as f64,
                Value::Float(v) => *v,
                other => {
                    return Err(EvalError::Type(format!(
                        "round() argument must be a number, not '{}'",
                        other.type_name()
                    )));
                }
            };
            let factor = 10f64.powi(*digits as i32);
            Ok(Value::Float((v * factor).round() / factor))
        }
        [other] => Err(EvalError::Type(format!(
            "round() argument must be a number, not '{}'",
            other.type_name()
        ))),
        _ => Err(EvalError::Type(format!(
            "round() takes 1 or 2 arguments, got {}",
            args.len()
        ))),
    }
}

pub fn call_method(receiver: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
    match receiver {
        Value::String(s) => call_string_method(s, method, args),
        Value::List(items) | Value::Tuple(items) => call_sequence_method(items, method, args),
        Value::Map(entries) => call_map_method(entries, method, args),
        other => Err(EvalError::Type(format!(
            "'{}' object has no method '{}'",
            other.type_name(),
            method
        ))),
    }
}

fn string_arg<'a>(method: &str, args: &'a [Value], index: usize) -> EvalResult<&'a str> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(EvalError::Type(format!(
            "{}() argument must be a string, not '{}'",
            method,
            other.type_name()
        ))),
        None => Err(EvalError::Type(format!(
            "{}() is missing a string argument",
            method
        ))),
    }
}

fn char_position(haystack: &str, needle: &str) -> Option<i64> {
    haystack
        .find(needle)
        .map(|byte_pos| haystack[..byte_pos].chars().count() as i64)
}

fn call_string_method(receiver: &str, method: &str, args: &[Value]) -> EvalResult<Value> {
    match (method, args.len()) {
        ("upper", 0) => Ok(Value::String(receiver.to_uppercase())),
        ("lower", 0) => Ok(Value::String(receiver.to_lowercase())),
        ("strip", 0) => Ok(Value::String(receiver.trim().to_string())),
        ("lstrip", 0) => Ok(Value::String(receiver.trim_start().to_string())),
        ("rstrip", 0) => Ok(Value::String(receiver.trim_end().to_string())),
        ("strip", 1) | ("lstrip", 1) | ("rstrip", 1) => {
            let set: Vec<char> = string_arg(method, args, 0)?.chars().collect();
            let matcher = |c: char| set.contains(&c);
            let result = match method {
                "strip" => receiver.trim_matches(matcher),
                "lstrip" => receiver.trim_start_matches(matcher),
                _ => receiver.trim_end_matches(matcher),
            };
            Ok(Value::String(result.to_string()))
        }
        ("split", 0) | ("rsplit", 0) => Ok(Value::List(
            receiver
                .split_whitespace()
                .map(|part| Value::String(part.to_string()))
                .collect(),
        )),
        ("split", 1) | ("rsplit", 1) => {
            let separator = string_arg(method, args, 0)?;
            if separator.is_empty() {
                return Err(EvalError::Type("empty separator".to_string()));
            }
            Ok(Value::List(
                receiver
                    .split(separator)
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        ("join", 1) => {
            let items = iter_values(&args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => parts.push(s),
                    other => {
                        return Err(EvalError::Type(format!(
                            "join() requires strings, got '{}'",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::String(parts.join(receiver)))
        }
        ("replace", 2) => {
            let from = string_arg(method, args, 0)?;
            let to = string_arg(method, args, 1)?;
            if from.is_empty() {
                return Err(EvalError::Type("empty replacement target".to_string()));
            }
            Ok(Value::String(receiver.replace(from, to)))
        }
        ("startswith", 1) => Ok(Value::Boolean(
            receiver.starts_with(string_arg(method, args, 0)?),
        )),
        ("endswith", 1) => Ok(Value::Boolean(
            receiver.ends_with(string_arg(method, args, 0)?),
        )),
        ("count", 1) => {
            let needle = string_arg(method, args, 0)?;
            let count = if needle.is_empty() {
                receiver.chars().count() + 1
            } else {
                receiver.matches(needle).count()
            };
            Ok(Value::Integer(count as i64))
        }
        ("find", 1) => Ok(Value::Integer(
            char_position(receiver, string_arg(method, args, 0)?).unwrap_or(-1),
        )),
        ("index", 1) => {
            let needle = string_arg(method, args, 0)?;
            char_position(receiver, needle)
                .map(Value::Integer)
                .ok_or_else(|| EvalError::Type("substring not found".to_string()))
        }
        ("title", 0) => {
            let mut out = String::with_capacity(receiver.len());
            let mut prev_alpha = false;
            for c in receiver.chars() {
                if c.is_alphabetic() {
                    if prev_alpha {
                        out.extend(c.to_lowercase());
                    } else {
                        out.extend(c.to_uppercase());
                    }
                    prev_alpha = true;
                } else {
                    out.push(c);
                    prev_alpha = false;
                }
            }
            Ok(Value::String(out))
        }
        ("capitalize", 0) => {
            let mut chars = receiver.chars();
            let out = match chars.next() {
                None => String::new(),
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
            };
            Ok(Value::String(out))
        }
        ("zfill", 1) => {
            let width = match &args[0] {
                Value::Integer(i) => *i.max(&0) as usize,
                other => {
                    return Err(EvalError::Type(format!(
                        "zfill() argument must be an integer, not '{}'",
                        other.type_name()
                    )));
                }
            };
            let (sign, body) = match receiver.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", receiver),
            };
            let current = sign.len() + body.chars().count();
            let padding = width.saturating_sub(current);
            Ok(Value::String(format!(
                "{}{}{}",
                sign,
                "0".repeat(padding),
                body
            )))
        }
        ("isdigit", 0) => Ok(Value::Boolean(
            !receiver.is_empty() && receiver.chars().all(|c| c.is_ascii_digit()),
        )),
        ("isalpha", 0) => Ok(Value::Boolean(
            !receiver.is_empty() && receiver.chars().all(char::is_alphabetic),
        )),
        _ => Err(EvalError::Type(format!(
            "'str' object has no method '{}' with {} argument(s)",
            method,
            args.len()
        ))),
    }
}

fn call_sequence_method(items: &[Value], method: &str, args: &[Value]) -> EvalResult<Value> {
    match (method, args.len()) {
        ("count", 1) => Ok(Value::Integer(
            items.iter().filter(|v| values_equal(v, &args[0])).count() as i64,
        )),
        ("index", 1) => items
            .iter()
            .position(|v| values_equal(v, &args[0]))
            .map(|i| Value::Integer(i as i64))
            .ok_or_else(|| EvalError::Type(format!("{} is not in sequence", args[0].repr()))),
        _ => Err(EvalError::Type(format!(
            "sequence object has no method '{}' with {} argument(s)",
            method,
            args.len()
        ))),
    }
}

fn call_map_method(entries: &[(String, Value)], method: &str, args: &[Value]) -> EvalResult<Value> {
    match (method, args.len()) {
        ("get", 1) | ("get", 2) => {
            let key = string_arg(method, args, 0)?;
            Ok(entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Null)))
        }
        ("keys", 0) => Ok(Value::List(
            entries
                .iter()
                .map(|(k, _)| Value::String(k.clone()))
                .collect(),
        )),
        ("values", 0) => Ok(Value::List(entries.iter().map(|(_, v)| v.clone()).collect())),
        ("items", 0) => Ok(Value::List(
            entries
                .iter()
                .map(|(k, v)| Value::Tuple(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
        )),
        _ => Err(EvalError::Type(format!(
            "'dict' object has no method '{}' with {} argument(s)",
            method,
            args.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    #[test]
    fn test_len() {
        assert_eq!(call_function("len", &[s("abc")]).unwrap(), Value::Integer(3));
        assert_eq!(
            call_function("len", &[Value::List(vec![Value::Integer(1)])]).unwrap(),
            Value::Integer(1)
        );
        assert!(call_function("len", &[Value::Integer(1)]).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call_function("int", &[s(" 42 ")]).unwrap(), Value::Integer(42));
        assert!(call_function("int", &[s("4.5")]).is_err());
        assert_eq!(call_function("int", &[Value::Float(4.9)]).unwrap(), Value::Integer(4));
        assert_eq!(call_function("float", &[s("2.5")]).unwrap(), Value::Float(2.5));
        assert_eq!(call_function("str", &[Value::Integer(7)]).unwrap(), s("7"));
        assert_eq!(
            call_function("bool", &[s("")]).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            call_function("bool", &[Value::List(vec![Value::Null])]).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_sorted() {
        assert_eq!(
            call_function(
                "sorted",
                &[Value::List(vec![
                    Value::Integer(3),
                    Value::Integer(1),
                    Value::Integer(2)
                ])]
            )
            .unwrap(),
            Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
        assert_eq!(
            call_function("sorted", &[s("cba")]).unwrap(),
            Value::List(vec![s("a"), s("b"), s("c")])
        );
        assert!(call_function(
            "sorted",
            &[Value::List(vec![Value::Integer(1), s("a")])]
        )
        .is_err());
    }

    #[test]
    fn test_range() {
        assert_eq!(
            call_function("range", &[Value::Integer(3)]).unwrap(),
            Value::List(vec![Value::Integer(0), Value::Integer(1), Value::Integer(2)])
        );
        assert_eq!(
            call_function(
                "range",
                &[Value::Integer(5), Value::Integer(1), Value::Integer(-2)]
            )
            .unwrap(),
            Value::List(vec![Value::Integer(5), Value::Integer(3)])
        );
        assert!(call_function("range", &[Value::Integer(10_000_000)]).is_err());
        assert!(
            call_function("range", &[Value::Integer(1), Value::Integer(2), Value::Integer(0)])
                .is_err()
        );
    }

    #[test]
    fn test_zip_and_enumerate() {
        assert_eq!(
            call_function(
                "zip",
                &[
                    Value::List(vec![Value::Integer(1), Value::Integer(2)]),
                    Value::List(vec![s("a"), s("b"), s("c")]),
                ]
            )
            .unwrap(),
            Value::List(vec![
                Value::Tuple(vec![Value::Integer(1), s("a")]),
                Value::Tuple(vec![Value::Integer(2), s("b")]),
            ])
        );
        assert_eq!(
            call_function("enumerate", &[s("ab")]).unwrap(),
            Value::List(vec![
                Value::Tuple(vec![Value::Integer(0), s("a")]),
                Value::Tuple(vec![Value::Integer(1), s("b")]),
            ])
        );
    }

    #[test]
    fn test_aggregates() {
        let numbers = Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(call_function("sum", &[numbers.clone()]).unwrap(), Value::Integer(6));
        assert_eq!(call_function("min", &[numbers.clone()]).unwrap(), Value::Integer(1));
        assert_eq!(call_function("max", &[numbers]).unwrap(), Value::Integer(3));
        assert_eq!(
            call_function("max", &[Value::Integer(1), Value::Integer(9)]).unwrap(),
            Value::Integer(9)
        );
        assert!(call_function("min", &[Value::List(vec![])]).is_err());
    }

    #[test]
    fn test_round_and_abs() {
        assert_eq!(
            call_function("round", &[Value::Float(2.6)]).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            call_function("round", &[Value::Float(2.345), Value::Integer(2)]).unwrap(),
            Value::Float(2.35)
        );
        assert_eq!(
            call_function("abs", &[Value::Integer(-4)]).unwrap(),
            Value::Integer(4)
        );
    }

    #[test]
    fn test_unknown_function() {
        assert!(matches!(
            call_function("open", &[]),
            Err(EvalError::Name(name)) if name == "open"
        ));
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(call_method(&s("abc"), "upper", &[]).unwrap(), s("ABC"));
        assert_eq!(call_method(&s("AbC"), "lower", &[]).unwrap(), s("abc"));
        assert_eq!(call_method(&s("  x  "), "strip", &[]).unwrap(), s("x"));
        assert_eq!(call_method(&s("xxaxx"), "strip", &[s("x")]).unwrap(), s("a"));
        assert_eq!(
            call_method(&s("a,b"), "split", &[s(",")]).unwrap(),
            Value::List(vec![s("a"), s("b")])
        );
        assert_eq!(
            call_method(&s("a b  c"), "split", &[]).unwrap(),
            Value::List(vec![s("a"), s("b"), s("c")])
        );
        assert_eq!(
            call_method(&s("-"), "join", &[Value::List(vec![s("a"), s("b")])]).unwrap(),
            s("a-b")
        );
        assert_eq!(
            call_method(&s("banana"), "replace", &[s("na"), s("NA")]).unwrap(),
            s("baNANA")
        );
        assert_eq!(
            call_method(&s("banana"), "count", &[s("na")]).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            call_method(&s("banana"), "find", &[s("nan")]).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            call_method(&s("banana"), "find", &[s("xyz")]).unwrap(),
            Value::Integer(-1)
        );
        assert!(call_method(&s("banana"), "index", &[s("xyz")]).is_err());
        assert_eq!(
            call_method(&s("hello world"), "title", &[]).unwrap(),
            s("Hello World")
        );
        assert_eq!(call_method(&s("hELLO"), "capitalize", &[]).unwrap(), s("Hello"));
        assert_eq!(
            call_method(&s("-42"), "zfill", &[Value::Integer(5)]).unwrap(),
            s("-0042")
        );
        assert_eq!(
            call_method(&s("123"), "isdigit", &[]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            call_method(&s("12a"), "isdigit", &[]).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_sequence_methods() {
        let list = Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(1)]);
        assert_eq!(call_method(&list, "count", &[Value::Integer(1)]).unwrap(), Value::Integer(2));
        assert_eq!(call_method(&list, "index", &[Value::Integer(2)]).unwrap(), Value::Integer(1));
        assert!(call_method(&list, "index", &[Value::Integer(9)]).is_err());
    }

    #[test]
    fn test_map_methods() {
        let map = Value::Map(vec![
            ("a".to_string(), Value::Integer(1)),
            ("b".to_string(), Value::Integer(2)),
        ]);
        assert_eq!(call_method(&map, "get", &[s("a")]).unwrap(), Value::Integer(1));
        assert_eq!(call_method(&map, "get", &[s("z")]).unwrap(), Value::Null);
        assert_eq!(
            call_method(&map, "get", &[s("z"), Value::Integer(0)]).unwrap(),
            Value::Integer(0)
        );
        assert_eq!(
            call_method(&map, "keys", &[]).unwrap(),
            Value::List(vec![s("a"), s("b")])
        );
        assert_eq!(
            call_method(&map, "items", &[]).unwrap(),
            Value::List(vec![
                Value::Tuple(vec![s("a"), Value::Integer(1)]),
                Value::Tuple(vec![s("b"), Value::Integer(2)]),
            ])
        );
    }

    #[test]
    fn test_whitelist_tables_cover_dispatch() {
        for name in FUNCTION_NAMES {
            // Calling with a plainly wrong arity must not report an unknown name.
            let result = call_function(name, &[Value::Null, Value::Null, Value::Null, Value::Null]);
            assert!(
                !matches!(result, Err(EvalError::Name(_))),
                "{} missing from dispatch",
                name
            );
        }
    }
}
