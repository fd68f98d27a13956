use crate::error::{QueryError, Result};
use serde_json::Value;
use std::fmt;

/// Primary key column present on every table
pub const ID_FIELD: &str = "_id";

/// SQL type mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    BigInt,
    Integer,
    SmallInt,
    Real,
    DoublePrecision,
    Text,
    Boolean,
    Timestamp,
    /// JSONB column holding an arbitrary document
    Json,
    /// JSONB column holding an array
    JsonArray,
    Bytea,
    /// Native PostgreSQL array of the inner type
    Array(Box<SqlType>),
}

impl SqlType {
    pub fn to_sql(&self) -> String {
        match self {
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::DoublePrecision => "DOUBLE PRECISION".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Json | SqlType::JsonArray => "JSONB".to_string(),
            SqlType::Bytea => "BYTEA".to_string(),
            SqlType::Array(inner) => format!("{}[]", inner.to_sql()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, SqlType::BigInt | SqlType::Integer | SqlType::SmallInt)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, SqlType::Real | SqlType::DoublePrecision)
    }

    pub fn is_json(&self) -> bool {
        matches!(self, SqlType::Json | SqlType::JsonArray)
    }

    /// Whether a non-null literal can be compared with or stored in a value of this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            SqlType::BigInt | SqlType::Integer | SqlType::SmallInt => {
                value.is_i64() || value.is_u64()
            }
            SqlType::Real | SqlType::DoublePrecision => value.is_number(),
            SqlType::Text | SqlType::Timestamp | SqlType::Bytea => value.is_string(),
            SqlType::Boolean => value.is_boolean(),
            SqlType::Json => true,
            SqlType::JsonArray => value.is_array(),
            SqlType::Array(inner) => match value {
                Value::Array(items) => items.iter().all(|item| inner.accepts(item)),
                _ => false,
            },
        }
    }

    /// Cast appended to a placeholder bound to a single value of this type.
    ///
    /// The client binds timestamps and byte strings (`\x…` hex) as text and
    /// JSON as serialized text, so those need an explicit cast for PostgreSQL
    /// to infer the right type.
    pub fn param_cast(&self) -> Option<String> {
        match self {
            SqlType::Timestamp => Some("TIMESTAMP".to_string()),
            SqlType::Bytea => Some("BYTEA".to_string()),
            SqlType::Json | SqlType::JsonArray => Some("jsonb".to_string()),
            SqlType::Array(_) => Some(self.to_sql()),
            _ => None,
        }
    }

    /// Cast appended to a placeholder bound to an array of values of this type
    pub fn array_cast(&self) -> Option<String> {
        match self {
            SqlType::Timestamp => Some("TIMESTAMP[]".to_string()),
            SqlType::Bytea => Some("BYTEA[]".to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

/// A typed JSON key path backed by a generated expression index, e.g.
/// `(("profile"->>'karma')::INTEGER)`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPath {
    pub path: String,
    pub column: String,
    pub keys: Vec<String>,
    pub sql_type: SqlType,
    pub expression: String,
}

/// How a field path is rendered and which operators apply to it
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDescriptor {
    /// A plain column
    Column { name: String, sql_type: SqlType },
    /// A JSON key path with a registered expression index
    Indexed(IndexedPath),
    /// A key path into a JSON document column
    JsonPath { column: String, keys: Vec<String> },
    /// A key path into the objects of a JSON array column
    JsonArrayPath { column: String, keys: Vec<String> },
}

/// Operator family of a resolved field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldShape<'a> {
    Scalar(&'a SqlType),
    Array(&'a SqlType),
    JsonArray,
    Json,
    JsonArrayPath,
}

impl FieldDescriptor {
    /// SQL fragment referencing the field
    pub fn sql(&self) -> String {
        match self {
            FieldDescriptor::Column { name, .. } => quote_identifier(name),
            FieldDescriptor::Indexed(indexed) => indexed.expression.clone(),
            FieldDescriptor::JsonPath { column, keys } => {
                format!("({})", json_value_path(column, keys))
            }
            FieldDescriptor::JsonArrayPath { column, .. } => quote_identifier(column),
        }
    }

    pub fn shape(&self) -> FieldShape<'_> {
        match self {
            FieldDescriptor::Column { sql_type, .. } => match sql_type {
                SqlType::Json => FieldShape::Json,
                SqlType::JsonArray => FieldShape::JsonArray,
                SqlType::Array(inner) => FieldShape::Array(inner),
                other => FieldShape::Scalar(other),
            },
            FieldDescriptor::Indexed(indexed) => FieldShape::Scalar(&indexed.sql_type),
            FieldDescriptor::JsonPath { .. } => FieldShape::Json,
            FieldDescriptor::JsonArrayPath { .. } => FieldShape::JsonArrayPath,
        }
    }

    /// Name of the underlying table column
    pub fn column(&self) -> &str {
        match self {
            FieldDescriptor::Column { name, .. } => name,
            FieldDescriptor::Indexed(indexed) => &indexed.column,
            FieldDescriptor::JsonPath { column, .. }
            | FieldDescriptor::JsonArrayPath { column, .. } => column,
        }
    }

    /// Keys below the column, empty for plain columns
    pub fn keys(&self) -> &[String] {
        match self {
            FieldDescriptor::Column { .. } => &[],
            FieldDescriptor::Indexed(indexed) => &indexed.keys,
            FieldDescriptor::JsonPath { keys, .. }
            | FieldDescriptor::JsonArrayPath { keys, .. } => keys,
        }
    }
}

/// Immutable schema descriptor for one collection.
///
/// Every table carries an `_id TEXT NOT NULL` primary key as its first column.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<ColumnDef>,
    indexed_paths: Vec<IndexedPath>,
}

impl Table {
    /// Create a table from `(field, type, nullable)` triples
    pub fn new(name: &str, fields: Vec<(&str, SqlType, bool)>) -> Result<Self> {
        if name.is_empty() {
            return Err(QueryError::Schema("Table name must not be empty".to_string()));
        }

        let mut columns = vec![ColumnDef {
            name: ID_FIELD.to_string(),
            sql_type: SqlType::Text,
            nullable: false,
        }];

        for (field_name, sql_type, nullable) in fields {
            if field_name.is_empty() || field_name.contains('.') || field_name.starts_with('$') {
                return Err(QueryError::Schema(format!(
                    "Invalid field name \"{}\" in {}",
                    field_name, name
                )));
            }
            if columns.iter().any(|c| c.name == field_name) {
                return Err(QueryError::Schema(format!(
                    "Field {} declared twice in {}",
                    field_name, name
                )));
            }
            columns.push(ColumnDef {
                name: field_name.to_string(),
                sql_type,
                nullable,
            });
        }

        Ok(Self {
            name: name.to_string(),
            columns,
            indexed_paths: Vec::new(),
        })
    }

    /// Register a typed JSON key path served by a generated expression index
    pub fn with_indexed_path(mut self, path: &str, sql_type: SqlType) -> Result<Self> {
        let (column, keys) = split_path(path)
            .ok_or_else(|| QueryError::Schema(format!("Indexed path {} has no keys", path)))?;

        match self.column(column) {
            Some(def) if def.sql_type == SqlType::Json => {}
            Some(_) => {
                return Err(QueryError::Schema(format!(
                    "Indexed path {} must start at a JSON column",
                    path
                )))
            }
            None => return Err(QueryError::unknown_field(path, &self.name)),
        }

        if sql_type.is_json() || matches!(sql_type, SqlType::Array(_) | SqlType::Bytea) {
            return Err(QueryError::Schema(format!(
                "Indexed path {} must have a scalar type, got {}",
                path, sql_type
            )));
        }

        if self.indexed_paths.iter().any(|p| p.path == path) {
            return Err(QueryError::Schema(format!("Indexed path {} registered twice", path)));
        }

        let text = json_text_path(column, &keys);
        let expression = if sql_type == SqlType::Text {
            format!("({})", text)
        } else {
            format!("(({})::{})", text, sql_type)
        };

        self.indexed_paths.push(IndexedPath {
            path: path.to_string(),
            column: column.to_string(),
            keys,
            sql_type,
            expression,
        });

        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quoted table identifier
    pub fn sql_name(&self) -> String {
        quote_identifier(&self.name)
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn indexed_paths(&self) -> &[IndexedPath] {
        &self.indexed_paths
    }

    /// Resolve a (possibly dotted) field path to its descriptor
    pub fn resolve_field(&self, path: &str) -> Result<FieldDescriptor> {
        if let Some(def) = self.column(path) {
            return Ok(FieldDescriptor::Column {
                name: def.name.clone(),
                sql_type: def.sql_type.clone(),
            });
        }

        if let Some(indexed) = self.indexed_paths.iter().find(|p| p.path == path) {
            return Ok(FieldDescriptor::Indexed(indexed.clone()));
        }

        let (column, keys) =
            split_path(path).ok_or_else(|| QueryError::unknown_field(path, &self.name))?;

        match self.column(column).map(|def| &def.sql_type) {
            Some(SqlType::Json) => Ok(FieldDescriptor::JsonPath {
                column: column.to_string(),
                keys,
            }),
            Some(SqlType::JsonArray) => Ok(FieldDescriptor::JsonArrayPath {
                column: column.to_string(),
                keys,
            }),
            _ => Err(QueryError::unknown_field(path, &self.name)),
        }
    }

    /// Resolve a field that must be a plain column
    pub fn resolve_column(&self, name: &str) -> Result<&ColumnDef> {
        self.column(name)
            .ok_or_else(|| QueryError::unknown_field(name, &self.name))
    }
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an SQL string literal, doubling embedded quotes
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Split `column.key1.key2` into its column and non-empty key list
fn split_path(path: &str) -> Option<(&str, Vec<String>)> {
    let mut parts = path.split('.');
    let column = parts.next()?;
    let keys: Vec<String> = parts.map(str::to_string).collect();
    if column.is_empty() || keys.is_empty() || keys.iter().any(String::is_empty) {
        return None;
    }
    Some((column, keys))
}

/// `"col"->'a'->'b'`
fn json_value_path(column: &str, keys: &[String]) -> String {
    let mut sql = quote_identifier(column);
    for key in keys {
        sql.push_str("->");
        sql.push_str(&quote_literal(key));
    }
    sql
}

/// `"col"->'a'->>'b'`
fn json_text_path(column: &str, keys: &[String]) -> String {
    let mut sql = quote_identifier(column);
    for (i, key) in keys.iter().enumerate() {
        sql.push_str(if i + 1 == keys.len() { "->>" } else { "->" });
        sql.push_str(&quote_literal(key));
    }
    sql
}
