//! selector-sql - MongoDB-style selectors compiled to parameterized PostgreSQL
//!
//! selector-sql turns JSON selectors such as `{"baseScore": {"$gt": 10}}`
//! into `{sql, args}` pairs with `$1..$n` placeholders, against collections
//! whose documents are stored one row per document.
//!
//! # Architecture
//!
//! - **Table metadata**: column types decide how each field path is rendered
//!   (plain column, native array, JSONB document, JSONB array, indexed path)
//! - **Atom stream**: statements are collected as SQL/parameter atoms and
//!   numbered once, so fragments compose freely
//! - **Selector compiler**: operator set `$eq $ne $gt $gte $lt $lte $in $nin
//!   $exists $all $size $regex $not $and $or $nor`
//! - **Statement builders**: SELECT, DELETE (with safety harness), UPDATE and
//!   INSERT
//! - **Views**: named, parameterized selector templates per collection
//! - **Fragments**: projections derived from field-list fragments
//!
//! # Example
//!
//! ```rust
//! use selector_sql::prelude::*;
//! use serde_json::json;
//!
//! # fn main() -> selector_sql::Result<()> {
//! let posts = Table::new(
//!     "Posts",
//!     vec![
//!         ("title", SqlType::Text, false),
//!         ("baseScore", SqlType::Integer, true),
//!         ("tagIds", SqlType::Array(Box::new(SqlType::Text)), true),
//!     ],
//! )?;
//!
//! let selector = Selector::from_value(&json!({
//!     "baseScore": {"$gte": 10},
//!     "tagIds": "news"
//! }))?;
//!
//! let query = SelectBuilder::new(&posts)
//!     .selector(selector)
//!     .select(vec!["_id", "title"])
//!     .order_desc("baseScore")
//!     .limit(20)
//!     .build()?;
//!
//! assert_eq!(
//!     query.sql,
//!     "SELECT \"_id\", \"title\" FROM \"Posts\" WHERE ( \"baseScore\" >= $1 AND $2 = ANY(\"tagIds\") ) ORDER BY \"baseScore\" DESC LIMIT $3"
//! );
//! assert_eq!(query.args, vec![json!(10), json!("news"), json!(20)]);
//! # Ok(())
//! # }
//! ```
//!
//! # Backend Support
//!
//! The crate only produces SQL. A sqlx-based PostgreSQL client is available
//! behind a feature:
//!
//! ```toml
//! [dependencies]
//! selector-sql = { version = "0.1", features = ["postgres"] }
//! ```

pub mod backend;
pub mod builder;
pub mod compiler;
pub mod error;
pub mod fragment;
pub mod matcher;
pub mod options;
pub mod planner;
pub mod query;
pub mod schema;
pub mod selector;
pub mod views;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use backend::{QueryResult, QueryRow, SqlClient};
pub use builder::{
    Assignment, ConflictStrategy, DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder,
};
pub use compiler::{compile_selector, SelectorCompiler};
pub use error::{QueryError, Result};
pub use fragment::Fragment;
pub use matcher::matches;
pub use options::{Projection, QueryOptions, Sort, SortDirection};
pub use planner::{PlannerConfig, QueryPlanner, QueryTarget};
pub use query::{Atom, CompiledQuery, Query};
pub use schema::{ColumnDef, FieldDescriptor, IndexedPath, SqlType, Table, ID_FIELD};
pub use selector::{Predicate, Selector};
pub use views::{ViewContext, ViewQuery, ViewRegistry, ViewResolver, ViewTerms};

#[cfg(feature = "postgres")]
pub use postgres::PostgresClient;

/// Prelude for common imports
pub mod prelude {
    pub use crate::backend::{QueryResult, QueryRow, SqlClient};
    pub use crate::builder::{DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder};
    pub use crate::error::{QueryError, Result};
    pub use crate::options::{Projection, QueryOptions, Sort, SortDirection};
    pub use crate::planner::{PlannerConfig, QueryPlanner, QueryTarget};
    pub use crate::query::CompiledQuery;
    pub use crate::schema::{SqlType, Table};
    pub use crate::selector::Selector;
    pub use crate::views::{ViewContext, ViewQuery, ViewRegistry, ViewTerms};

    #[cfg(feature = "postgres")]
    pub use crate::postgres::PostgresClient;
}
