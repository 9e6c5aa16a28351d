//! Query expression evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for query expressions,
//! enabling filtering, sorting and full-text matching over stored JSON
//! field maps.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Value};

use shelf_core::query::{Expr, FieldOp, SortDirection, SortTerm};

/// Type-erased, comparable representation of JSON values.
///
/// This enum wraps JSON values and provides comparison operations for
/// filtering queries. It normalizes all numeric types to f64 for easy
/// comparison.
///
/// # Note
///
/// This is a private implementation detail used for query evaluation.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// String value
    String(&'a str),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(value) => Comparable::Number(value.as_f64().unwrap_or(f64::NAN)),
            Value::String(value) => Comparable::String(value),
            Value::Array(arr) => {
                Comparable::Array(arr.iter().map(Comparable::from).collect::<Vec<_>>())
            }
            Value::Object(map) => Comparable::Map(
                map.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>(),
            ),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dot-separated field path against a field map.
pub(crate) fn lookup<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Evaluates a filter expression against a field map.
pub(crate) fn matches(fields: &Map<String, Value>, expr: &Expr) -> bool {
    match expr {
        Expr::And(list) => list.iter().all(|inner| matches(fields, inner)),
        Expr::Or(list) => list.iter().any(|inner| matches(fields, inner)),
        Expr::Field { field, op, value } => field_matches(fields, field, *op, value),
    }
}

fn field_matches(fields: &Map<String, Value>, field: &str, op: FieldOp, value: &Value) -> bool {
    let found = lookup(fields, field);
    match op {
        FieldOp::IsNull => found.is_none_or(Value::is_null),
        FieldOp::IsNotNull => found.is_some_and(|actual| !actual.is_null()),
        _ => {
            let Some(actual) = found else { return false };
            compare(actual, op, value)
        }
    }
}

fn compare(actual: &Value, op: FieldOp, value: &Value) -> bool {
    match op {
        FieldOp::Eq => Comparable::from(actual) == Comparable::from(value),
        FieldOp::Ne => Comparable::from(actual) != Comparable::from(value),
        FieldOp::Gt => Comparable::from(actual) > Comparable::from(value),
        FieldOp::Gte => Comparable::from(actual) >= Comparable::from(value),
        FieldOp::Lt => Comparable::from(actual) < Comparable::from(value),
        FieldOp::Lte => Comparable::from(actual) <= Comparable::from(value),
        FieldOp::In => value
            .as_array()
            .is_some_and(|list| list.iter().any(|v| Comparable::from(actual) == Comparable::from(v))),
        FieldOp::Contains => match actual {
            Value::Array(items) => {
                items.iter().any(|v| Comparable::from(v) == Comparable::from(value))
            }
            Value::String(haystack) => {
                value.as_str().is_some_and(|needle| haystack.contains(needle))
            }
            _ => false,
        },
        FieldOp::Like => match (actual.as_str(), value.as_str()) {
            (Some(text), Some(pattern)) => like_matches(pattern, text),
            _ => false,
        },
        FieldOp::Regex => match (actual.as_str(), value.as_str()) {
            (Some(text), Some(pattern)) => {
                regex::Regex::new(pattern).is_ok_and(|re| re.is_match(text))
            }
            _ => false,
        },
        FieldOp::Between => value.as_array().is_some_and(|range| match range.as_slice() {
            [low, high] => {
                Comparable::from(actual) >= Comparable::from(low)
                    && Comparable::from(actual) <= Comparable::from(high)
            }
            _ => false,
        }),
        FieldOp::IsNull | FieldOp::IsNotNull => unreachable!("handled in field_matches"),
    }
}

/// Matches a SQL-style wildcard pattern where `%` matches any run of
/// characters and `_` matches exactly one.
fn like_matches(pattern: &str, text: &str) -> bool {
    fn inner(pattern: &[char], text: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some((&'%', rest)) => {
                (0..=text.len()).any(|offset| inner(rest, &text[offset..]))
            }
            Some((&'_', rest)) => text.split_first().is_some_and(|(_, tail)| inner(rest, tail)),
            Some((ch, rest)) => {
                text.split_first().is_some_and(|(head, tail)| head == ch && inner(rest, tail))
            }
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    inner(&pattern, &text)
}

/// Compares two field maps under a list of sort terms.
///
/// Earlier terms take precedence; values that do not compare (missing
/// fields, mixed types) rank as equal and keep their relative order.
pub(crate) fn compare_terms(
    a: &Map<String, Value>,
    b: &Map<String, Value>,
    terms: &[SortTerm],
) -> Ordering {
    for term in terms {
        let left = lookup(a, &term.field).map(Comparable::from).unwrap_or(Comparable::Null);
        let right = lookup(b, &term.field).map(Comparable::from).unwrap_or(Comparable::Null);
        let ordering = left.partial_cmp(&right).unwrap_or(Ordering::Equal);
        let ordering = match term.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Tests whether every whitespace-separated token of the query appears as a
/// word in at least one of the indexed string fields. Matching is
/// case-insensitive.
pub(crate) fn text_matches(fields: &Map<String, Value>, indexed: &[String], query: &str) -> bool {
    let tokens: Vec<String> =
        query.split_whitespace().map(str::to_lowercase).filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return false;
    }
    tokens.iter().all(|token| {
        indexed.iter().any(|field| {
            lookup(fields, field)
                .and_then(Value::as_str)
                .is_some_and(|text| {
                    text.to_lowercase()
                        .split(|c: char| !c.is_alphanumeric())
                        .any(|word| word == token)
                })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelf_core::query::{asc, desc, field};

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn nested_paths_resolve_through_objects() {
        let fields = doc(json!({ "address": { "city": "Turin" } }));
        assert!(matches(&fields, &field("address.city").eq("Turin")));
        assert!(!matches(&fields, &field("address.country").is_not_null()));
    }

    #[test]
    fn missing_fields_fail_comparisons_but_pass_is_null() {
        let fields = doc(json!({ "age": 30 }));
        assert!(!matches(&fields, &field("name").eq("Alice")));
        assert!(matches(&fields, &field("name").is_null()));
        assert!(matches(&fields, &field("age").is_not_null()));
    }

    #[test]
    fn between_is_inclusive() {
        let fields = doc(json!({ "age": 30 }));
        assert!(matches(&fields, &field("age").between(30, 40)));
        assert!(matches(&fields, &field("age").between(20, 30)));
        assert!(!matches(&fields, &field("age").between(31, 40)));
    }

    #[test]
    fn contains_handles_arrays_and_substrings() {
        let fields = doc(json!({ "tags": ["a", "b"], "bio": "hello world" }));
        assert!(matches(&fields, &field("tags").contains("b")));
        assert!(!matches(&fields, &field("tags").contains("c")));
        assert!(matches(&fields, &field("bio").contains("lo wo")));
    }

    #[test]
    fn like_wildcards() {
        let fields = doc(json!({ "name": "Charlie" }));
        assert!(matches(&fields, &field("name").like("Char%")));
        assert!(matches(&fields, &field("name").like("%arli_")));
        assert!(!matches(&fields, &field("name").like("Char")));
    }

    #[test]
    fn regex_matches_strings() {
        let fields = doc(json!({ "email": "a@example.com" }));
        assert!(matches(&fields, &field("email").regex("^[a-z]+@example\\.com$")));
        assert!(!matches(&fields, &field("email").regex("^x")));
    }

    #[test]
    fn mixed_type_comparisons_do_not_match() {
        let fields = doc(json!({ "age": 30 }));
        assert!(!matches(&fields, &field("age").gt("20")));
        assert!(!matches(&fields, &field("age").eq("30")));
    }

    #[test]
    fn sort_terms_apply_in_order() {
        let a = doc(json!({ "city": "Rome", "age": 30 }));
        let b = doc(json!({ "city": "Rome", "age": 20 }));
        let terms = vec![asc("city"), desc("age")];
        assert_eq!(compare_terms(&a, &b, &terms), Ordering::Less);
        assert_eq!(compare_terms(&b, &a, &terms), Ordering::Greater);
    }

    #[test]
    fn text_matching_requires_every_token() {
        let fields = doc(json!({ "title": "Grocery run", "body": "buy milk and bread" }));
        let indexed = vec!["title".to_string(), "body".to_string()];
        assert!(text_matches(&fields, &indexed, "milk"));
        assert!(text_matches(&fields, &indexed, "grocery bread"));
        assert!(!text_matches(&fields, &indexed, "grocery cheese"));
        assert!(!text_matches(&fields, &indexed, "mil"));
    }
}
