use crate::error::Result;
use crate::query::CompiledQuery;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Row from a query result, columns in result order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRow {
    pub columns: Map<String, Value>,
}

impl QueryRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.columns.insert(key, value);
    }

    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.columns
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.columns
            .get(key)
            .and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.columns.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.columns.get(key).and_then(|v| v.as_bool())
    }

    /// The row as a JSON document keyed by column
    pub fn into_document(self) -> Value {
        Value::Object(self.columns)
    }
}

/// Result of a query
pub type QueryResult = Vec<QueryRow>;

/// Executes compiled statements.
///
/// Implementations bind `args` positionally to `$1..$n` and must hand `sql`
/// to the database unchanged.
#[async_trait]
pub trait SqlClient: Send {
    /// Run a statement that returns rows
    async fn query(&mut self, query: &CompiledQuery) -> Result<QueryResult>;

    /// Run a statement and return the number of affected rows
    async fn execute(&mut self, query: &CompiledQuery) -> Result<u64>;
}
