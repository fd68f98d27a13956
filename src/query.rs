//! The atom stream every statement is assembled from.
//!
//! A [`Query`] is an ordered list of atoms. Nothing is numbered while atoms
//! are collected; placeholders are assigned in a single pass by
//! [`Query::compile`], so fragments built independently can be appended in
//! any combination and still come out numbered `$1..$n` in text order.

use crate::schema::quote_identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One indivisible piece of a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// Literal SQL text
    Sql(String),
    /// A bound parameter, optionally cast (`$1::jsonb`) and wrapped in
    /// text that must touch the placeholder (`ANY($1)`)
    Param {
        value: Value,
        cast: Option<String>,
        prefix: String,
        suffix: String,
    },
    /// A table reference, quoted on output
    Table(String),
    /// A nested statement, parenthesized on output
    SubQuery(Query),
}

/// Ordered atom stream for a single statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    atoms: Vec<Atom>,
}

/// Final `{sql, args}` pair handed to the SQL client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Query {
    pub fn new() -> Self {
        Self { atoms: Vec::new() }
    }

    /// A fragment holding a single SQL literal
    pub fn from_sql(sql: impl Into<String>) -> Self {
        let mut query = Self::new();
        query.sql(sql);
        query
    }

    pub fn sql(&mut self, sql: impl Into<String>) -> &mut Self {
        self.atoms.push(Atom::Sql(sql.into()));
        self
    }

    pub fn param(&mut self, value: Value) -> &mut Self {
        self.typed_param(value, None)
    }

    pub fn typed_param(&mut self, value: Value, cast: Option<String>) -> &mut Self {
        self.wrapped_param("", value, cast, "")
    }

    /// A parameter rendered as `<prefix>$n<suffix>` with no separating spaces
    pub fn wrapped_param(
        &mut self,
        prefix: &str,
        value: Value,
        cast: Option<String>,
        suffix: &str,
    ) -> &mut Self {
        self.atoms.push(Atom::Param {
            value,
            cast,
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        });
        self
    }

    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.atoms.push(Atom::Table(name.into()));
        self
    }

    pub fn sub_query(&mut self, query: Query) -> &mut Self {
        self.atoms.push(Atom::SubQuery(query));
        self
    }

    /// Move all atoms of `other` to the end of this stream
    pub fn append(&mut self, other: Query) -> &mut Self {
        self.atoms.extend(other.atoms);
        self
    }

    /// Join fragments with a literal separator, e.g. `AND`
    pub fn join(parts: Vec<Query>, separator: &str) -> Query {
        let mut query = Query::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                query.sql(separator);
            }
            query.append(part);
        }
        query
    }

    /// Surround a fragment with `( … )`
    pub fn parenthesized(inner: Query) -> Query {
        let mut query = Query::from_sql("(");
        query.append(inner);
        query.sql(")");
        query
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Number of parameters, including those of nested sub-queries
    pub fn param_count(&self) -> usize {
        self.atoms
            .iter()
            .map(|atom| match atom {
                Atom::Param { .. } => 1,
                Atom::SubQuery(query) => query.param_count(),
                _ => 0,
            })
            .sum()
    }

    /// Concatenate the atoms into SQL text with `$n` placeholders
    pub fn compile(self) -> CompiledQuery {
        let mut args = Vec::with_capacity(self.param_count());
        let sql = render(self.atoms, &mut args);
        CompiledQuery { sql, args }
    }
}

fn render(atoms: Vec<Atom>, args: &mut Vec<Value>) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(atoms.len());

    for atom in atoms {
        match atom {
            // a bare comma attaches to the token before it
            Atom::Sql(sql) if sql == "," => match parts.last_mut() {
                Some(last) => last.push(','),
                None => parts.push(sql),
            },
            Atom::Sql(sql) => parts.push(sql),
            Atom::Param {
                value,
                cast,
                prefix,
                suffix,
            } => {
                args.push(value);
                let placeholder = match cast {
                    Some(cast) => format!("${}::{}", args.len(), cast),
                    None => format!("${}", args.len()),
                };
                parts.push(format!("{}{}{}", prefix, placeholder, suffix));
            }
            Atom::Table(name) => parts.push(quote_identifier(&name)),
            Atom::SubQuery(query) => parts.push(format!("({})", render(query.atoms, args))),
        }
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_literals_and_params() {
        let mut query = Query::new();
        query.sql("SELECT * FROM").table("Posts").sql("WHERE \"a\" =").param(json!(3));

        let compiled = query.compile();
        assert_eq!(compiled.sql, "SELECT * FROM \"Posts\" WHERE \"a\" = $1");
        assert_eq!(compiled.args, vec![json!(3)]);
    }

    #[test]
    fn test_sub_query_shares_counter() {
        let mut inner = Query::new();
        inner.sql("SELECT \"_id\" FROM").table("Posts").sql("WHERE \"a\" =").param(json!(1));
        inner.sql("LIMIT").param(json!(5));

        let mut outer = Query::new();
        outer.sql("\"b\" =").param(json!("x")).sql("AND \"_id\" IN").sub_query(inner);
        outer.sql("AND \"c\" =").param(json!(true));

        let compiled = outer.compile();
        assert_eq!(
            compiled.sql,
            "\"b\" = $1 AND \"_id\" IN (SELECT \"_id\" FROM \"Posts\" WHERE \"a\" = $2 LIMIT $3) AND \"c\" = $4"
        );
        assert_eq!(compiled.args, vec![json!("x"), json!(1), json!(5), json!(true)]);
    }

    #[test]
    fn test_typed_param_cast() {
        let mut query = Query::from_sql("\"meta\" =");
        query.typed_param(json!("{}"), Some("jsonb".to_string()));
        assert_eq!(query.compile().sql, "\"meta\" = $1::jsonb");
    }

    #[test]
    fn test_wrapped_param_touches_text() {
        let mut query = Query::from_sql("\"a\" =");
        query.wrapped_param("ANY(", json!([1, 2]), None, ")");
        let compiled = query.compile();
        assert_eq!(compiled.sql, "\"a\" = ANY($1)");
        assert_eq!(compiled.args, vec![json!([1, 2])]);
    }

    #[test]
    fn test_join_and_parenthesize() {
        let parts = vec![Query::from_sql("TRUE"), Query::from_sql("FALSE")];
        let query = Query::parenthesized(Query::join(parts, "OR"));
        assert_eq!(query.compile().sql, "( TRUE OR FALSE )");
    }

    #[test]
    fn test_comma_attaches_to_previous_token() {
        let parts = vec![Query::from_sql("\"a\""), Query::from_sql("\"b\"")];
        let mut query = Query::join(parts, ",");
        query.sql("=").param(json!(1));
        assert_eq!(query.compile().sql, "\"a\", \"b\" = $1");
    }

    #[test]
    fn test_param_count_counts_nested() {
        let mut inner = Query::new();
        inner.param(json!(1)).param(json!(2));
        let mut outer = Query::new();
        outer.param(json!(0)).sub_query(inner);
        assert_eq!(outer.param_count(), 3);
        assert!(!outer.is_empty());
    }
}
