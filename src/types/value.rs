//! Loosely-typed value helpers shared by rule evaluation and queries.
//!
//! Context records and atom attributes arrive as JSON. Comparisons
//! coerce between numbers, numeric strings and booleans so authored
//! rules behave the same whether a value was stored as `"3"` or `3`.

use serde_json::Value;
use std::cmp::Ordering;

/// Resolve a dotted path against a JSON value.
///
/// Returns `None` ("undefined") when any segment is missing. Numeric
/// segments index into arrays.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Numeric view of a value, if it has one.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// String view of a value.
pub fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Coercing equality.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Array(_), _) | (_, Value::Array(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => a == b,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

/// Ordered comparison.
///
/// Two strings compare lexicographically unless both are numeric; any
/// other pair compares numerically when both sides coerce to numbers.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => Some(x.cmp(y)),
        };
    }
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => None,
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

/// Array membership, or substring containment after string coercion.
pub fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::Null => false,
        other => coerce_string(other).contains(&coerce_string(needle)),
    }
}

/// Membership of `value` in a supplied list. A non-list never matches.
pub fn is_in(value: &Value, list: &Value) -> bool {
    match list {
        Value::Array(items) => items.iter().any(|item| loose_eq(value, item)),
        _ => false,
    }
}

/// Total order used for sorting.
///
/// Values are ranked by class first: numbers and numeric strings, then
/// other strings, booleans, arrays, objects and null. Comparison only
/// happens inside a class, so mixed keys such as `5`, `"10a"` and `"2"`
/// never form a cycle. Missing values sort last.
pub fn sort_key_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let (cx, cy) = (sort_class(x), sort_class(y));
            cx.cmp(&cy).then_with(|| match cx {
                SortClass::Numeric => match (as_number(x), as_number(y)) {
                    (Some(p), Some(q)) => p.total_cmp(&q),
                    _ => Ordering::Equal,
                },
                SortClass::Text => coerce_string(x).cmp(&coerce_string(y)),
                SortClass::Bool => x.as_bool().cmp(&y.as_bool()),
                SortClass::Array | SortClass::Object => x.to_string().cmp(&y.to_string()),
                SortClass::Null => Ordering::Equal,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SortClass {
    Numeric,
    Text,
    Bool,
    Array,
    Object,
    Null,
}

fn sort_class(value: &Value) -> SortClass {
    match value {
        Value::Number(_) | Value::String(_) if as_number(value).is_some() => SortClass::Numeric,
        Value::Number(_) | Value::String(_) => SortClass::Text,
        Value::Bool(_) => SortClass::Bool,
        Value::Array(_) => SortClass::Array,
        Value::Object(_) => SortClass::Object,
        Value::Null => SortClass::Null,
    }
}
