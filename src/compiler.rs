//! Selector compiler: turns a [`Selector`] into the atoms of a boolean SQL
//! expression against one [`Table`].
//!
//! Every field reference goes through [`Table::resolve_field`]; the shape of
//! the resolved field decides which SQL each operator becomes. Compound
//! expressions always come out parenthesized, so callers can splice the
//! result next to `AND`/`OR`/`NOT` without precedence surprises.

use crate::error::{QueryError, Result};
use crate::query::Query;
use crate::schema::{FieldDescriptor, FieldShape, SqlType, Table};
use crate::selector::{Predicate, Selector};
use serde_json::{Map, Value};

/// Compile a selector into WHERE-clause atoms
pub fn compile_selector(table: &Table, selector: &Selector) -> Result<Query> {
    SelectorCompiler::new(table).compile(selector)
}

/// Recursive selector translator bound to one table
pub struct SelectorCompiler<'a> {
    table: &'a Table,
}

impl<'a> SelectorCompiler<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self { table }
    }

    pub fn compile(&self, selector: &Selector) -> Result<Query> {
        match selector {
            Selector::Leaf(fields) => {
                let parts = fields
                    .iter()
                    .map(|(path, predicate)| self.field(path, predicate))
                    .collect::<Result<Vec<_>>>()?;
                Ok(all_of(parts))
            }
            Selector::And(children) => Ok(all_of(self.children(children)?)),
            Selector::Or(children) => Ok(any_of(self.children(children)?)),
            Selector::Nor(children) => {
                if children.is_empty() {
                    return Ok(Query::from_sql("TRUE"));
                }
                Ok(not(Query::join(self.children(children)?, "OR")))
            }
        }
    }

    fn children(&self, children: &[Selector]) -> Result<Vec<Query>> {
        children.iter().map(|child| self.compile(child)).collect()
    }

    fn field(&self, path: &str, predicate: &Predicate) -> Result<Query> {
        let descriptor = self.table.resolve_field(path)?;
        self.predicate(&descriptor, path, predicate)
    }

    fn predicate(&self, field: &FieldDescriptor, path: &str, predicate: &Predicate) -> Result<Query> {
        match predicate {
            Predicate::Not(inner) => Ok(not(self.predicate(field, path, inner)?)),
            Predicate::Conjunction(predicates) => {
                let parts = predicates
                    .iter()
                    .map(|p| self.predicate(field, path, p))
                    .collect::<Result<Vec<_>>>()?;
                Ok(all_of(parts))
            }
            _ => match field.shape() {
                FieldShape::Scalar(sql_type) => scalar(&field.sql(), sql_type, path, predicate),
                FieldShape::Array(inner) => native_array(&field.sql(), inner, path, predicate),
                FieldShape::JsonArray => json_array(&field.sql(), path, predicate),
                FieldShape::JsonArrayPath => json_array_path(field, path, predicate),
                FieldShape::Json => json_value(&field.sql(), path, predicate),
            },
        }
    }
}

/// `( a AND b )`, a lone part as itself, nothing as `TRUE`
fn all_of(mut parts: Vec<Query>) -> Query {
    match parts.len() {
        0 => Query::from_sql("TRUE"),
        1 => parts.remove(0),
        _ => Query::parenthesized(Query::join(parts, "AND")),
    }
}

/// `( a OR b )`, a lone part as itself, nothing as `FALSE`
fn any_of(mut parts: Vec<Query>) -> Query {
    match parts.len() {
        0 => Query::from_sql("FALSE"),
        1 => parts.remove(0),
        _ => Query::parenthesized(Query::join(parts, "OR")),
    }
}

fn not(inner: Query) -> Query {
    let mut query = Query::from_sql("NOT");
    query.append(Query::parenthesized(inner));
    query
}

/// `<expr> <op> $n`
fn compare(expr: &str, op: &str, value: Value, cast: Option<String>) -> Query {
    let mut query = Query::from_sql(format!("{} {}", expr, op));
    query.typed_param(value, cast);
    query
}

fn null_check(expr: &str, exists: bool) -> Query {
    if exists {
        Query::from_sql(format!("{} IS NOT NULL", expr))
    } else {
        Query::from_sql(format!("{} IS NULL", expr))
    }
}

/// JSON values are bound as serialized text and cast on the SQL side
fn json_text(value: &Value) -> Result<Value> {
    Ok(Value::String(serde_json::to_string(value)?))
}

fn json_compare(expr: &str, op: &str, value: &Value) -> Result<Query> {
    Ok(compare(expr, op, json_text(value)?, Some("jsonb".to_string())))
}

fn operator_name(predicate: &Predicate) -> &'static str {
    match predicate {
        Predicate::Eq(_) => "$eq",
        Predicate::Ne(_) => "$ne",
        Predicate::Gt(_) => "$gt",
        Predicate::Gte(_) => "$gte",
        Predicate::Lt(_) => "$lt",
        Predicate::Lte(_) => "$lte",
        Predicate::In(_) => "$in",
        Predicate::Nin(_) => "$nin",
        Predicate::Exists(_) => "$exists",
        Predicate::Contains(_) => "$all",
        Predicate::Size(_) => "$size",
        Predicate::Regex { .. } => "$regex",
        Predicate::Not(_) => "$not",
        Predicate::Conjunction(_) => "$and",
    }
}

fn not_applicable(predicate: &Predicate, path: &str, kind: &str) -> QueryError {
    QueryError::TypeMismatch(format!(
        "{} cannot be applied to {} field \"{}\"",
        operator_name(predicate),
        kind,
        path
    ))
}

fn check_literal(sql_type: &SqlType, path: &str, value: &Value) -> Result<()> {
    if sql_type.accepts(value) {
        Ok(())
    } else {
        Err(QueryError::TypeMismatch(format!(
            "field \"{}\" of type {} cannot be compared with {}",
            path, sql_type, value
        )))
    }
}

fn regex_param(path: &str, pattern: &str, case_insensitive: bool) -> Result<(&'static str, Value)> {
    regex::Regex::new(pattern).map_err(|err| {
        QueryError::TypeMismatch(format!("invalid $regex on field \"{}\": {}", path, err))
    })?;
    let op = if case_insensitive { "~*" } else { "~" };
    Ok((op, Value::String(pattern.to_string())))
}

fn scalar(expr: &str, sql_type: &SqlType, path: &str, predicate: &Predicate) -> Result<Query> {
    let cast = sql_type.param_cast();

    match predicate {
        Predicate::Eq(Value::Null) => Ok(null_check(expr, false)),
        Predicate::Ne(Value::Null) => Ok(null_check(expr, true)),
        Predicate::Exists(exists) => Ok(null_check(expr, *exists)),
        Predicate::Eq(value)
        | Predicate::Ne(value)
        | Predicate::Gt(value)
        | Predicate::Gte(value)
        | Predicate::Lt(value)
        | Predicate::Lte(value) => {
            check_literal(sql_type, path, value)?;
            let op = match predicate {
                Predicate::Eq(_) => "=",
                Predicate::Ne(_) => "<>",
                Predicate::Gt(_) => ">",
                Predicate::Gte(_) => ">=",
                Predicate::Lt(_) => "<",
                _ => "<=",
            };
            Ok(compare(expr, op, value.clone(), cast))
        }
        Predicate::In(values) | Predicate::Nin(values) => {
            let negate = matches!(predicate, Predicate::Nin(_));
            let has_null = values.iter().any(Value::is_null);
            let values: Vec<Value> = values.iter().filter(|v| !v.is_null()).cloned().collect();
            for value in &values {
                check_literal(sql_type, path, value)?;
            }

            if values.is_empty() {
                return Ok(match (negate, has_null) {
                    (false, true) => null_check(expr, false),
                    (false, false) => Query::from_sql("FALSE"),
                    (true, true) => null_check(expr, true),
                    (true, false) => Query::from_sql("TRUE"),
                });
            }

            let (op, wrapper) = if negate { ("<>", "ALL(") } else { ("=", "ANY(") };
            let mut membership = Query::from_sql(format!("{} {}", expr, op));
            membership.wrapped_param(wrapper, Value::Array(values), sql_type.array_cast(), ")");

            if has_null && !negate {
                Ok(any_of(vec![null_check(expr, false), membership]))
            } else {
                Ok(membership)
            }
        }
        Predicate::Regex {
            pattern,
            case_insensitive,
        } => {
            if *sql_type != SqlType::Text {
                return Err(not_applicable(predicate, path, "non-text"));
            }
            let (op, pattern) = regex_param(path, pattern, *case_insensitive)?;
            Ok(compare(expr, op, pattern, None))
        }
        Predicate::Contains(_) | Predicate::Size(_) => {
            Err(not_applicable(predicate, path, "non-array"))
        }
        Predicate::Not(_) | Predicate::Conjunction(_) => unreachable_compound(predicate, path),
    }
}

fn native_array(expr: &str, inner: &SqlType, path: &str, predicate: &Predicate) -> Result<Query> {
    let array_type = SqlType::Array(Box::new(inner.clone()));
    let array_cast = array_type.param_cast();

    // `$n = ANY("tags")`
    let element_of = |value: &Value| -> Result<Query> {
        check_literal(inner, path, value)?;
        let mut query = Query::new();
        query.typed_param(value.clone(), inner.param_cast());
        query.sql(format!("= ANY({})", expr));
        Ok(query)
    };

    match predicate {
        Predicate::Eq(Value::Null) => Ok(null_check(expr, false)),
        Predicate::Ne(Value::Null) => Ok(null_check(expr, true)),
        Predicate::Exists(exists) => Ok(null_check(expr, *exists)),
        Predicate::Eq(value @ Value::Array(_)) | Predicate::Ne(value @ Value::Array(_)) => {
            check_literal(&array_type, path, value)?;
            let op = if matches!(predicate, Predicate::Eq(_)) { "=" } else { "<>" };
            Ok(compare(expr, op, value.clone(), array_cast))
        }
        Predicate::Eq(value) => element_of(value),
        Predicate::Ne(value) => Ok(not(element_of(value)?)),
        Predicate::In(values) | Predicate::Nin(values) => {
            let negate = matches!(predicate, Predicate::Nin(_));
            if values.is_empty() {
                return Ok(Query::from_sql(if negate { "TRUE" } else { "FALSE" }));
            }
            let list = Value::Array(values.clone());
            check_literal(&array_type, path, &list)?;
            let overlap = compare(expr, "&&", list, array_cast);
            Ok(if negate { not(overlap) } else { overlap })
        }
        Predicate::Contains(value) => {
            check_literal(&array_type, path, value)?;
            Ok(compare(expr, "@>", value.clone(), array_cast))
        }
        Predicate::Size(size) => Ok(compare(
            &format!("cardinality({})", expr),
            "=",
            Value::from(*size),
            None,
        )),
        Predicate::Gt(_)
        | Predicate::Gte(_)
        | Predicate::Lt(_)
        | Predicate::Lte(_)
        | Predicate::Regex { .. } => Err(not_applicable(predicate, path, "array")),
        Predicate::Not(_) | Predicate::Conjunction(_) => unreachable_compound(predicate, path),
    }
}

fn json_array(expr: &str, path: &str, predicate: &Predicate) -> Result<Query> {
    // `"col" @> '[v]'`
    let holds = |value: &Value| json_compare(expr, "@>", &Value::Array(vec![value.clone()]));

    match predicate {
        Predicate::Eq(Value::Null) => Ok(null_check(expr, false)),
        Predicate::Ne(Value::Null) => Ok(null_check(expr, true)),
        Predicate::Exists(exists) => Ok(null_check(expr, *exists)),
        Predicate::Eq(value @ Value::Array(_)) => json_compare(expr, "=", value),
        Predicate::Ne(value @ Value::Array(_)) => json_compare(expr, "<>", value),
        Predicate::Eq(value) => holds(value),
        Predicate::Ne(value) => Ok(not(holds(value)?)),
        Predicate::In(values) => {
            let parts = values.iter().map(holds).collect::<Result<Vec<_>>>()?;
            Ok(any_of(parts))
        }
        Predicate::Nin(values) => {
            if values.is_empty() {
                return Ok(Query::from_sql("TRUE"));
            }
            let parts = values.iter().map(holds).collect::<Result<Vec<_>>>()?;
            Ok(not(any_of(parts)))
        }
        Predicate::Contains(value) => json_compare(expr, "@>", value),
        Predicate::Size(size) => Ok(compare(
            &format!("jsonb_array_length({})", expr),
            "=",
            Value::from(*size),
            None,
        )),
        Predicate::Gt(_)
        | Predicate::Gte(_)
        | Predicate::Lt(_)
        | Predicate::Lte(_)
        | Predicate::Regex { .. } => Err(not_applicable(predicate, path, "JSON array")),
        Predicate::Not(_) | Predicate::Conjunction(_) => unreachable_compound(predicate, path),
    }
}

/// Nest a value under the key path: `["a", "b"], v` becomes `{"a": {"b": v}}`
fn nest(keys: &[String], value: &Value) -> Value {
    keys.iter().rev().fold(value.clone(), |inner, key| {
        let mut object = Map::new();
        object.insert(key.clone(), inner);
        Value::Object(object)
    })
}

fn json_array_path(field: &FieldDescriptor, path: &str, predicate: &Predicate) -> Result<Query> {
    let expr = field.sql();
    let keys = field.keys();
    // `"col" @> '[{"key": v}]'`
    let holds = |value: &Value| json_compare(&expr, "@>", &Value::Array(vec![nest(keys, value)]));

    match predicate {
        Predicate::Eq(value) => holds(value),
        Predicate::Ne(value) => Ok(not(holds(value)?)),
        Predicate::In(values) => {
            let parts = values.iter().map(holds).collect::<Result<Vec<_>>>()?;
            Ok(any_of(parts))
        }
        Predicate::Nin(values) => {
            if values.is_empty() {
                return Ok(Query::from_sql("TRUE"));
            }
            let parts = values.iter().map(holds).collect::<Result<Vec<_>>>()?;
            Ok(not(any_of(parts)))
        }
        Predicate::Contains(Value::Array(values)) => {
            let elements = values.iter().map(|v| nest(keys, v)).collect();
            json_compare(&expr, "@>", &Value::Array(elements))
        }
        Predicate::Contains(_)
        | Predicate::Gt(_)
        | Predicate::Gte(_)
        | Predicate::Lt(_)
        | Predicate::Lte(_)
        | Predicate::Exists(_)
        | Predicate::Size(_)
        | Predicate::Regex { .. } => Err(not_applicable(predicate, path, "JSON array element")),
        Predicate::Not(_) | Predicate::Conjunction(_) => unreachable_compound(predicate, path),
    }
}

fn json_value(expr: &str, path: &str, predicate: &Predicate) -> Result<Query> {
    match predicate {
        Predicate::Eq(Value::Null) => Ok(Query::from_sql(format!(
            "( {} IS NULL OR {} = 'null'::jsonb )",
            expr, expr
        ))),
        Predicate::Ne(Value::Null) => Ok(Query::from_sql(format!(
            "( {} IS NOT NULL AND {} <> 'null'::jsonb )",
            expr, expr
        ))),
        Predicate::Exists(exists) => Ok(null_check(expr, *exists)),
        Predicate::Eq(value) => json_compare(expr, "=", value),
        Predicate::Ne(value) => json_compare(expr, "<>", value),
        Predicate::Gt(value) => json_compare(expr, ">", value),
        Predicate::Gte(value) => json_compare(expr, ">=", value),
        Predicate::Lt(value) => json_compare(expr, "<", value),
        Predicate::Lte(value) => json_compare(expr, "<=", value),
        Predicate::In(values) | Predicate::Nin(values) => {
            let negate = matches!(predicate, Predicate::Nin(_));
            if values.is_empty() {
                return Ok(Query::from_sql(if negate { "TRUE" } else { "FALSE" }));
            }
            // `$n::jsonb @> jsonb_build_array(expr)`: the bound list holds the value
            let mut membership = Query::new();
            membership.typed_param(json_text(&Value::Array(values.clone()))?, Some("jsonb".to_string()));
            membership.sql(format!("@> jsonb_build_array({})", expr));
            Ok(if negate { not(membership) } else { membership })
        }
        Predicate::Contains(value) => json_compare(expr, "@>", value),
        Predicate::Size(size) => Ok(compare(
            &format!(
                "CASE jsonb_typeof({}) WHEN 'array' THEN jsonb_array_length({}) END",
                expr, expr
            ),
            "=",
            Value::from(*size),
            None,
        )),
        Predicate::Regex {
            pattern,
            case_insensitive,
        } => {
            let (op, pattern) = regex_param(path, pattern, *case_insensitive)?;
            let mut query = Query::from_sql(format!(
                "( jsonb_typeof({}) = 'string' AND ({} #>> '{{}}') {}",
                expr, expr, op
            ));
            query.param(pattern).sql(")");
            Ok(query)
        }
        Predicate::Not(_) | Predicate::Conjunction(_) => unreachable_compound(predicate, path),
    }
}

/// `$not` and operator conjunctions are unwrapped before shapes are consulted
fn unreachable_compound(predicate: &Predicate, path: &str) -> Result<Query> {
    Err(not_applicable(predicate, path, "this"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn posts() -> Table {
        Table::new(
            "Posts",
            vec![
                ("title", SqlType::Text, false),
                ("baseScore", SqlType::Integer, false),
                ("postedAt", SqlType::Timestamp, true),
                ("draft", SqlType::Boolean, false),
                ("tagIds", SqlType::Array(Box::new(SqlType::Text)), true),
                ("coauthorStatuses", SqlType::JsonArray, true),
                ("contents", SqlType::Json, true),
            ],
        )
        .unwrap()
        .with_indexed_path("contents.wordCount", SqlType::Integer)
        .unwrap()
    }

    fn compile(selector: serde_json::Value) -> Result<crate::query::CompiledQuery> {
        let selector = Selector::from_value(&selector)?;
        Ok(compile_selector(&posts(), &selector)?.compile())
    }

    #[test]
    fn test_empty_selector_is_true() {
        let compiled = compile(json!({})).unwrap();
        assert_eq!(compiled.sql, "TRUE");
        assert!(compiled.args.is_empty());
    }

    #[test]
    fn test_equality_and_implicit_and() {
        let compiled = compile(json!({"baseScore": 3, "title": "test"})).unwrap();
        assert_eq!(compiled.sql, "( \"baseScore\" = $1 AND \"title\" = $2 )");
        assert_eq!(compiled.args, vec![json!(3), json!("test")]);
    }

    #[test]
    fn test_null_equality() {
        let compiled = compile(json!({"postedAt": null})).unwrap();
        assert_eq!(compiled.sql, "\"postedAt\" IS NULL");
        assert!(compiled.args.is_empty());

        let compiled = compile(json!({"postedAt": {"$ne": null}})).unwrap();
        assert_eq!(compiled.sql, "\"postedAt\" IS NOT NULL");
    }

    #[test]
    fn test_comparisons() {
        let compiled = compile(json!({"baseScore": {"$gte": 10, "$lt": 20}})).unwrap();
        assert_eq!(compiled.sql, "( \"baseScore\" >= $1 AND \"baseScore\" < $2 )");
        assert_eq!(compiled.args, vec![json!(10), json!(20)]);

        let compiled = compile(json!({"title": {"$ne": "x"}})).unwrap();
        assert_eq!(compiled.sql, "\"title\" <> $1");
    }

    #[test]
    fn test_timestamp_param_is_cast() {
        let compiled = compile(json!({"postedAt": {"$gt": "2020-01-01T00:00:00Z"}})).unwrap();
        assert_eq!(compiled.sql, "\"postedAt\" > $1::TIMESTAMP");
    }

    #[test]
    fn test_in_and_nin_bind_one_array() {
        let compiled = compile(json!({"title": {"$in": ["a", "b"]}})).unwrap();
        assert_eq!(compiled.sql, "\"title\" = ANY($1)");
        assert_eq!(compiled.args, vec![json!(["a", "b"])]);

        let compiled = compile(json!({"title": {"$nin": ["a"]}})).unwrap();
        assert_eq!(compiled.sql, "\"title\" <> ALL($1)");
        assert_eq!(compiled.args, vec![json!(["a"])]);
    }

    #[test]
    fn test_in_with_null_member() {
        let compiled = compile(json!({"title": {"$in": ["a", null]}})).unwrap();
        assert_eq!(compiled.sql, "( \"title\" IS NULL OR \"title\" = ANY($1) )");
        assert_eq!(compiled.args, vec![json!(["a"])]);
    }

    #[test]
    fn test_empty_in_lists() {
        assert_eq!(compile(json!({"title": {"$in": []}})).unwrap().sql, "FALSE");
        assert_eq!(compile(json!({"title": {"$nin": []}})).unwrap().sql, "TRUE");
    }

    #[test]
    fn test_exists() {
        assert_eq!(
            compile(json!({"postedAt": {"$exists": true}})).unwrap().sql,
            "\"postedAt\" IS NOT NULL"
        );
        assert_eq!(
            compile(json!({"postedAt": {"$exists": false}})).unwrap().sql,
            "\"postedAt\" IS NULL"
        );
    }

    #[test]
    fn test_combinators() {
        let compiled = compile(json!({
            "$or": [{"draft": false}, {"baseScore": {"$gt": 5}, "title": "x"}]
        }))
        .unwrap();
        assert_eq!(
            compiled.sql,
            "( \"draft\" = $1 OR ( \"baseScore\" > $2 AND \"title\" = $3 ) )"
        );
        assert_eq!(compiled.args, vec![json!(false), json!(5), json!("x")]);

        let compiled = compile(json!({"$nor": [{"draft": true}, {"baseScore": 0}]})).unwrap();
        assert_eq!(compiled.sql, "NOT ( \"draft\" = $1 OR \"baseScore\" = $2 )");
    }

    #[test]
    fn test_not_operator() {
        let compiled = compile(json!({"baseScore": {"$not": {"$gt": 5}}})).unwrap();
        assert_eq!(compiled.sql, "NOT ( \"baseScore\" > $1 )");
    }

    #[test]
    fn test_native_array_field() {
        let compiled = compile(json!({"tagIds": "t1"})).unwrap();
        assert_eq!(compiled.sql, "$1 = ANY(\"tagIds\")");
        assert_eq!(compiled.args, vec![json!("t1")]);

        let compiled = compile(json!({"tagIds": {"$in": ["t1", "t2"]}})).unwrap();
        assert_eq!(compiled.sql, "\"tagIds\" && $1::TEXT[]");

        let compiled = compile(json!({"tagIds": {"$all": ["t1", "t2"]}})).unwrap();
        assert_eq!(compiled.sql, "\"tagIds\" @> $1::TEXT[]");

        let compiled = compile(json!({"tagIds": {"$size": 2}})).unwrap();
        assert_eq!(compiled.sql, "cardinality(\"tagIds\") = $1");
        assert_eq!(compiled.args, vec![json!(2)]);
    }

    #[test]
    fn test_json_array_containment() {
        let compiled = compile(json!({"coauthorStatuses.userId": "u1"})).unwrap();
        assert_eq!(compiled.sql, "\"coauthorStatuses\" @> $1::jsonb");
        assert_eq!(compiled.args, vec![json!("[{\"userId\":\"u1\"}]")]);

        let compiled = compile(json!({"coauthorStatuses": {"$size": 0}})).unwrap();
        assert_eq!(compiled.sql, "jsonb_array_length(\"coauthorStatuses\") = $1");

        let compiled =
            compile(json!({"coauthorStatuses.userId": {"$in": ["u1", "u2"]}})).unwrap();
        assert_eq!(
            compiled.sql,
            "( \"coauthorStatuses\" @> $1::jsonb OR \"coauthorStatuses\" @> $2::jsonb )"
        );
    }

    #[test]
    fn test_json_path_comparison() {
        let compiled = compile(json!({"contents.version": "1.0"})).unwrap();
        assert_eq!(compiled.sql, "(\"contents\"->'version') = $1::jsonb");
        assert_eq!(compiled.args, vec![json!("\"1.0\"")]);

        let compiled = compile(json!({"contents.version": {"$in": ["1.0", "2.0"]}})).unwrap();
        assert_eq!(
            compiled.sql,
            "$1::jsonb @> jsonb_build_array((\"contents\"->'version'))"
        );
        assert_eq!(compiled.args, vec![json!("[\"1.0\",\"2.0\"]")]);
    }

    #[test]
    fn test_indexed_path_uses_expression() {
        let compiled = compile(json!({"contents.wordCount": {"$gt": 100}})).unwrap();
        assert_eq!(
            compiled.sql,
            "((\"contents\"->>'wordCount')::INTEGER) > $1"
        );
        assert_eq!(compiled.args, vec![json!(100)]);
    }

    #[test]
    fn test_regex() {
        let compiled = compile(json!({"title": {"$regex": "^Rust", "$options": "i"}})).unwrap();
        assert_eq!(compiled.sql, "\"title\" ~* $1");

        let err = compile(json!({"title": {"$regex": "("}})).unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch(_)));

        let err = compile(json!({"baseScore": {"$regex": "1"}})).unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch(_)));
    }

    #[test]
    fn test_unknown_field_fails() {
        let err = compile(json!({"nope": 1})).unwrap_err();
        match err {
            QueryError::UnknownField { field, collection } => {
                assert_eq!(field, "nope");
                assert_eq!(collection, "Posts");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = compile(json!({"$or": [{"title": "a"}, {"nested.field": 1}]})).unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { .. }));
    }

    #[test]
    fn test_type_mismatches() {
        assert!(matches!(
            compile(json!({"baseScore": "high"})).unwrap_err(),
            QueryError::TypeMismatch(_)
        ));
        assert!(matches!(
            compile(json!({"title": {"$size": 1}})).unwrap_err(),
            QueryError::TypeMismatch(_)
        ));
        assert!(matches!(
            compile(json!({"tagIds": {"$gt": "a"}})).unwrap_err(),
            QueryError::TypeMismatch(_)
        ));
        assert!(matches!(
            compile(json!({"coauthorStatuses.userId": {"$exists": true}})).unwrap_err(),
            QueryError::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let selector = json!({
            "title": {"$in": ["a", "b"]},
            "$or": [{"draft": false}, {"tagIds": "x"}],
            "contents.wordCount": {"$gte": 3}
        });
        let first = compile(selector.clone()).unwrap();
        let second = compile(selector).unwrap();
        assert_eq!(first, second);
    }
}
