use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown field \"{field}\" in collection {collection}")]
    UnknownField { field: String, collection: String },

    #[error("Unsupported operator {operator} on field \"{field}\"")]
    UnsupportedOperator { operator: String, field: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Refusing to {operation} every row of {table}; set noSafetyHarness to allow it")]
    UnsafeMutation {
        operation: &'static str,
        table: String,
    },

    #[error("Malformed fragment: {0}")]
    MalformedFragment(String),

    #[error("Unknown view \"{view}\" for collection {table}")]
    UnknownView { table: String, view: String },

    #[error("No default view registered for collection {0}")]
    NoDefaultView(String),

    #[error("Invalid query options: {0}")]
    InvalidOptions(String),

    #[error("Selector nested deeper than {0} levels")]
    SelectorTooDeep(usize),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "postgres")]
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl QueryError {
    pub(crate) fn unknown_field(field: impl Into<String>, collection: impl Into<String>) -> Self {
        QueryError::UnknownField {
            field: field.into(),
            collection: collection.into(),
        }
    }

    pub(crate) fn unsupported(operator: impl Into<String>, field: impl Into<String>) -> Self {
        QueryError::UnsupportedOperator {
            operator: operator.into(),
            field: field.into(),
        }
    }
}
