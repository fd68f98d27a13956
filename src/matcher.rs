//! In-memory evaluation of a selector against one document.
//!
//! The result is what PostgreSQL would answer for the compiled WHERE clause
//! on a row holding the document: comparisons with SQL NULL are unknown,
//! `NOT unknown` stays unknown, and a row only matches on `TRUE`. JSON
//! fields follow jsonb equality, ordering and containment.

use crate::compiler::compile_selector;
use crate::error::{QueryError, Result};
use crate::schema::{FieldDescriptor, FieldShape, SqlType, Table};
use crate::selector::{Predicate, Selector};
use regex::RegexBuilder;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// SQL three-valued logic; `None` is unknown
pub type Truth = Option<bool>;

/// Whether `document` satisfies `selector`
pub fn matches(table: &Table, selector: &Selector, document: &Value) -> Result<bool> {
    Ok(evaluate(table, selector, document)? == Some(true))
}

/// Three-valued result of the selector on `document`.
///
/// Fails exactly where compiling the selector against `table` fails.
pub fn evaluate(table: &Table, selector: &Selector, document: &Value) -> Result<Truth> {
    compile_selector(table, selector)?;
    let row = document.as_object().ok_or_else(|| {
        QueryError::TypeMismatch(format!("document must be an object, got {}", document))
    })?;
    Matcher { table, row }.selector(selector)
}

struct Matcher<'a> {
    table: &'a Table,
    row: &'a Map<String, Value>,
}

impl Matcher<'_> {
    fn selector(&self, selector: &Selector) -> Result<Truth> {
        match selector {
            Selector::Leaf(fields) => {
                let mut truth = Some(true);
                for (path, predicate) in fields {
                    truth = and3(truth, self.field(path, predicate)?);
                }
                Ok(truth)
            }
            Selector::And(children) => {
                let mut truth = Some(true);
                for child in children {
                    truth = and3(truth, self.selector(child)?);
                }
                Ok(truth)
            }
            Selector::Or(children) => self.any(children),
            Selector::Nor(children) if children.is_empty() => Ok(Some(true)),
            Selector::Nor(children) => Ok(not3(self.any(children)?)),
        }
    }

    fn any(&self, children: &[Selector]) -> Result<Truth> {
        let mut truth = Some(false);
        for child in children {
            truth = or3(truth, self.selector(child)?);
        }
        Ok(truth)
    }

    fn field(&self, path: &str, predicate: &Predicate) -> Result<Truth> {
        let descriptor = self.table.resolve_field(path)?;
        self.predicate(&descriptor, path, predicate)
    }

    fn predicate(&self, field: &FieldDescriptor, path: &str, predicate: &Predicate) -> Result<Truth> {
        match predicate {
            Predicate::Not(inner) => Ok(not3(self.predicate(field, path, inner)?)),
            Predicate::Conjunction(predicates) => {
                let mut truth = Some(true);
                for p in predicates {
                    truth = and3(truth, self.predicate(field, path, p)?);
                }
                Ok(truth)
            }
            _ => {
                let column = self.row.get(field.column()).filter(|v| !v.is_null());
                match (field, field.shape()) {
                    (FieldDescriptor::Indexed(indexed), _) => {
                        let value = match navigate(column, &indexed.keys) {
                            None | Some(Value::Null) => None,
                            Some(value) => Some(cast_text(&indexed.sql_type, path, value)?),
                        };
                        scalar(value.as_ref(), path, predicate)
                    }
                    (_, FieldShape::Scalar(_)) => scalar(column, path, predicate),
                    (_, FieldShape::Array(_)) => native_array(column, path, predicate),
                    (_, FieldShape::JsonArray) => json_array(column, path, predicate),
                    (_, FieldShape::JsonArrayPath) => {
                        json_array_path(column, field.keys(), predicate)
                    }
                    (_, FieldShape::Json) => json_value(navigate(column, field.keys()), path, predicate),
                }
            }
        }
    }
}

fn and3(a: Truth, b: Truth) -> Truth {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(a: Truth, b: Truth) -> Truth {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn not3(a: Truth) -> Truth {
    a.map(|v| !v)
}

/// `"col"->'a'->'b'`: missing keys and non-objects give SQL NULL
fn navigate<'v>(root: Option<&'v Value>, keys: &[String]) -> Option<&'v Value> {
    keys.iter()
        .try_fold(root?, |value, key| value.as_object()?.get(key))
}

/// `(("col"->>'k')::TYPE)`
fn cast_text(sql_type: &SqlType, path: &str, value: &Value) -> Result<Value> {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let invalid = || {
        QueryError::TypeMismatch(format!(
            "value {} of field \"{}\" is not a valid {}",
            value, path, sql_type
        ))
    };

    match sql_type {
        t if t.is_integer() => text.parse::<i64>().map(Value::from).map_err(|_| invalid()),
        t if t.is_numeric() => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        SqlType::Boolean => match text.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        _ => Ok(Value::String(text)),
    }
}

/// Ordering of two non-null scalars of one SQL type
fn scalar_cmp(path: &str, a: &Value, b: &Value) -> Result<Ordering> {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64().zip(y.as_f64()).and_then(|(x, y)| x.partial_cmp(&y)),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    };
    ordering.ok_or_else(|| {
        QueryError::TypeMismatch(format!(
            "cannot compare {} with {} on field \"{}\"",
            a, b, path
        ))
    })
}

fn regex_matches(pattern: &str, case_insensitive: bool, text: &str) -> Result<bool> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|err| QueryError::TypeMismatch(format!("invalid $regex: {}", err)))?;
    Ok(regex.is_match(text))
}

/// `IS NOT NULL` when `exists`, `IS NULL` otherwise
fn null_check(value: Option<&Value>, exists: bool) -> Truth {
    Some(value.is_some() == exists)
}

fn scalar(value: Option<&Value>, path: &str, predicate: &Predicate) -> Result<Truth> {
    match predicate {
        Predicate::Eq(Value::Null) => Ok(null_check(value, false)),
        Predicate::Ne(Value::Null) => Ok(null_check(value, true)),
        Predicate::Exists(exists) => Ok(null_check(value, *exists)),
        Predicate::Eq(literal)
        | Predicate::Ne(literal)
        | Predicate::Gt(literal)
        | Predicate::Gte(literal)
        | Predicate::Lt(literal)
        | Predicate::Lte(literal) => {
            let Some(value) = value else {
                return Ok(None);
            };
            let ordering = scalar_cmp(path, value, literal)?;
            Ok(Some(match predicate {
                Predicate::Eq(_) => ordering == Ordering::Equal,
                Predicate::Ne(_) => ordering != Ordering::Equal,
                Predicate::Gt(_) => ordering == Ordering::Greater,
                Predicate::Gte(_) => ordering != Ordering::Less,
                Predicate::Lt(_) => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }))
        }
        Predicate::In(values) | Predicate::Nin(values) => {
            let negate = matches!(predicate, Predicate::Nin(_));
            let has_null = values.iter().any(Value::is_null);
            let values: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();

            if values.is_empty() {
                return Ok(match (negate, has_null) {
                    (false, true) => null_check(value, false),
                    (false, false) => Some(false),
                    (true, true) => null_check(value, true),
                    (true, false) => Some(true),
                });
            }

            let membership = match value {
                None => None,
                Some(value) => {
                    let mut found = false;
                    for candidate in &values {
                        found |= scalar_cmp(path, value, candidate)? == Ordering::Equal;
                    }
                    Some(found != negate)
                }
            };

            if has_null && !negate {
                Ok(or3(null_check(value, false), membership))
            } else {
                Ok(membership)
            }
        }
        Predicate::Regex {
            pattern,
            case_insensitive,
        } => match value {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(regex_matches(pattern, *case_insensitive, text)?)),
            Some(other) => Err(QueryError::TypeMismatch(format!(
                "$regex on non-text value {} of field \"{}\"",
                other, path
            ))),
        },
        _ => Err(QueryError::unsupported("$size/$all", path)),
    }
}

/// `x = ANY(arr)`: true on a hit, unknown if the array holds NULLs
fn any_element(path: &str, elements: &[Value], needle: &Value) -> Result<Truth> {
    let mut truth = Some(false);
    for element in elements {
        if element.is_null() {
            truth = or3(truth, None);
        } else if scalar_cmp(path, element, needle)? == Ordering::Equal {
            return Ok(Some(true));
        }
    }
    Ok(truth)
}

fn array_elements<'v>(path: &str, value: &'v Value) -> Result<&'v [Value]> {
    value.as_array().map(Vec::as_slice).ok_or_else(|| {
        QueryError::TypeMismatch(format!("field \"{}\" holds {}, not an array", path, value))
    })
}

fn native_array(value: Option<&Value>, path: &str, predicate: &Predicate) -> Result<Truth> {
    match predicate {
        Predicate::Eq(Value::Null) => return Ok(null_check(value, false)),
        Predicate::Ne(Value::Null) => return Ok(null_check(value, true)),
        Predicate::Exists(exists) => return Ok(null_check(value, *exists)),
        Predicate::In(values) if values.is_empty() => return Ok(Some(false)),
        Predicate::Nin(values) if values.is_empty() => return Ok(Some(true)),
        _ => {}
    }

    let Some(value) = value else {
        return Ok(None);
    };
    let elements = array_elements(path, value)?;

    match predicate {
        Predicate::Eq(Value::Array(other)) | Predicate::Ne(Value::Array(other)) => {
            // array equality treats NULL elements as equal to each other
            let mut equal = elements.len() == other.len();
            for (a, b) in elements.iter().zip(other) {
                equal &= match (a.is_null(), b.is_null()) {
                    (true, true) => true,
                    (false, false) => scalar_cmp(path, a, b)? == Ordering::Equal,
                    _ => false,
                };
            }
            Ok(Some(equal != matches!(predicate, Predicate::Ne(_))))
        }
        Predicate::Eq(needle) => any_element(path, elements, needle),
        Predicate::Ne(needle) => Ok(not3(any_element(path, elements, needle)?)),
        Predicate::In(values) | Predicate::Nin(values) => {
            // `arr && list`
            let mut overlap = false;
            for needle in values.iter().filter(|v| !v.is_null()) {
                overlap |= any_element(path, elements, needle)? == Some(true);
            }
            Ok(Some(overlap != matches!(predicate, Predicate::Nin(_))))
        }
        Predicate::Contains(Value::Array(needles)) => {
            // `arr @> list`
            let mut contained = true;
            for needle in needles {
                contained &= !needle.is_null() && any_element(path, elements, needle)? == Some(true);
            }
            Ok(Some(contained))
        }
        Predicate::Size(size) => Ok(Some(elements.len() as u64 == *size)),
        _ => Err(QueryError::unsupported("comparison", path)),
    }
}

fn json_array(value: Option<&Value>, path: &str, predicate: &Predicate) -> Result<Truth> {
    let holds = |needle: &Value| value.map(|v| jsonb_contains(v, &Value::Array(vec![needle.clone()])));

    match predicate {
        Predicate::Eq(Value::Null) => Ok(null_check(value, false)),
        Predicate::Ne(Value::Null) => Ok(null_check(value, true)),
        Predicate::Exists(exists) => Ok(null_check(value, *exists)),
        Predicate::Eq(other @ Value::Array(_)) => {
            Ok(value.map(|v| jsonb_cmp(v, other) == Ordering::Equal))
        }
        Predicate::Ne(other @ Value::Array(_)) => {
            Ok(value.map(|v| jsonb_cmp(v, other) != Ordering::Equal))
        }
        Predicate::Eq(needle) => Ok(holds(needle)),
        Predicate::Ne(needle) => Ok(not3(holds(needle))),
        Predicate::In(values) => Ok(values.iter().fold(Some(false), |t, v| or3(t, holds(v)))),
        Predicate::Nin(values) if values.is_empty() => Ok(Some(true)),
        Predicate::Nin(values) => Ok(not3(values.iter().fold(Some(false), |t, v| or3(t, holds(v))))),
        Predicate::Contains(needles) => Ok(value.map(|v| jsonb_contains(v, needles))),
        Predicate::Size(size) => match value {
            None => Ok(None),
            Some(v) => Ok(Some(array_elements(path, v)?.len() as u64 == *size)),
        },
        _ => Err(QueryError::unsupported("comparison", path)),
    }
}

/// Nest under the key path like the compiler does for array-element fields
fn nest(keys: &[String], value: &Value) -> Value {
    keys.iter().rev().fold(value.clone(), |inner, key| {
        let mut object = Map::new();
        object.insert(key.clone(), inner);
        Value::Object(object)
    })
}

fn json_array_path(value: Option<&Value>, keys: &[String], predicate: &Predicate) -> Result<Truth> {
    let holds =
        |needle: &Value| value.map(|v| jsonb_contains(v, &Value::Array(vec![nest(keys, needle)])));

    match predicate {
        Predicate::Eq(needle) => Ok(holds(needle)),
        Predicate::Ne(needle) => Ok(not3(holds(needle))),
        Predicate::In(values) => Ok(values.iter().fold(Some(false), |t, v| or3(t, holds(v)))),
        Predicate::Nin(values) if values.is_empty() => Ok(Some(true)),
        Predicate::Nin(values) => Ok(not3(values.iter().fold(Some(false), |t, v| or3(t, holds(v))))),
        Predicate::Contains(Value::Array(needles)) => {
            let elements = Value::Array(needles.iter().map(|n| nest(keys, n)).collect());
            Ok(value.map(|v| jsonb_contains(v, &elements)))
        }
        _ => Err(QueryError::unsupported("comparison", &keys.join("."))),
    }
}

fn json_value(value: Option<&Value>, path: &str, predicate: &Predicate) -> Result<Truth> {
    let compare = |literal: &Value, test: fn(Ordering) -> bool| value.map(|v| test(jsonb_cmp(v, literal)));

    match predicate {
        Predicate::Eq(Value::Null) => Ok(Some(matches!(value, None | Some(Value::Null)))),
        Predicate::Ne(Value::Null) => Ok(Some(!matches!(value, None | Some(Value::Null)))),
        Predicate::Exists(exists) => Ok(null_check(value, *exists)),
        Predicate::Eq(literal) => Ok(compare(literal, Ordering::is_eq)),
        Predicate::Ne(literal) => Ok(compare(literal, Ordering::is_ne)),
        Predicate::Gt(literal) => Ok(compare(literal, Ordering::is_gt)),
        Predicate::Gte(literal) => Ok(compare(literal, Ordering::is_ge)),
        Predicate::Lt(literal) => Ok(compare(literal, Ordering::is_lt)),
        Predicate::Lte(literal) => Ok(compare(literal, Ordering::is_le)),
        Predicate::In(values) | Predicate::Nin(values) => {
            let negate = matches!(predicate, Predicate::Nin(_));
            if values.is_empty() {
                return Ok(Some(negate));
            }
            // jsonb_build_array(NULL) is `[null]`
            let element = Value::Array(vec![value.cloned().unwrap_or(Value::Null)]);
            let found = jsonb_contains(&Value::Array(values.clone()), &element);
            Ok(Some(found != negate))
        }
        Predicate::Contains(needle) => Ok(value.map(|v| jsonb_contains(v, needle))),
        Predicate::Size(size) => Ok(match value {
            Some(Value::Array(items)) => Some(items.len() as u64 == *size),
            _ => None,
        }),
        Predicate::Regex {
            pattern,
            case_insensitive,
        } => match value {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(regex_matches(pattern, *case_insensitive, text)?)),
            Some(_) => Ok(Some(false)),
        },
        _ => Err(QueryError::unsupported("$not", path)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// jsonb btree ordering: Object > Array > Boolean > Number > String > Null,
/// containers by size first
pub fn jsonb_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .len()
            .cmp(&y.len())
            .then_with(|| {
                x.iter()
                    .zip(y)
                    .map(|(a, b)| jsonb_cmp(a, b))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            }),
        (Value::Object(x), Value::Object(y)) => {
            fn keys(map: &Map<String, Value>) -> Vec<&String> {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
                keys
            }
            let (kx, ky) = (keys(x), keys(y));
            x.len()
                .cmp(&y.len())
                .then_with(|| {
                    kx.iter()
                        .zip(&ky)
                        .map(|(a, b)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
                        .find(|o| o.is_ne())
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| {
                    kx.iter()
                        .map(|k| jsonb_cmp(&x[k.as_str()], &y[k.as_str()]))
                        .find(|o| o.is_ne())
                        .unwrap_or(Ordering::Equal)
                })
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// jsonb `@>`
pub fn jsonb_contains(container: &Value, contained: &Value) -> bool {
    match (container, contained) {
        (Value::Object(outer), Value::Object(inner)) => inner.iter().all(|(key, value)| {
            outer
                .get(key)
                .map_or(false, |candidate| nested_contains(candidate, value))
        }),
        (Value::Array(outer), Value::Array(inner)) => inner
            .iter()
            .all(|value| outer.iter().any(|candidate| nested_contains(candidate, value))),
        // a top-level array contains its scalar elements
        (Value::Array(outer), scalar) if !scalar.is_object() => outer
            .iter()
            .any(|candidate| !candidate.is_array() && !candidate.is_object() && jsonb_cmp(candidate, scalar).is_eq()),
        (a, b) if !a.is_array() && !a.is_object() && !b.is_array() && !b.is_object() => {
            type_rank(a) == type_rank(b) && jsonb_cmp(a, b).is_eq()
        }
        _ => false,
    }
}

fn nested_contains(candidate: &Value, value: &Value) -> bool {
    match (candidate, value) {
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => {
            jsonb_contains(candidate, value)
        }
        (a, b) if a.is_array() || a.is_object() || b.is_array() || b.is_object() => false,
        (a, b) => type_rank(a) == type_rank(b) && jsonb_cmp(a, b).is_eq(),
    }
}
