use crate::backend::{QueryResult, QueryRow, SqlClient};
use crate::error::Result;
use crate::query::CompiledQuery;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row};
use tracing::{debug, warn};

/// [`SqlClient`] over a sqlx PostgreSQL pool
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with connection pool
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run a statement without bound arguments, e.g. DDL
    pub async fn execute_raw(&self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub fn is_connected(&self) -> bool {
        !self.pool.is_closed()
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Convert PostgreSQL row to QueryRow
    fn convert_row(row: &PgRow) -> QueryRow {
        let mut query_row = QueryRow::new();

        for column in row.columns() {
            let column_name = column.name();
            query_row.insert(column_name.to_string(), decode_column(row, column_name));
        }

        query_row
    }
}

/// Decode one column by trying the Rust types sqlx maps each `SqlType` to
fn decode_column(row: &PgRow, name: &str) -> Value {
    if let Ok(value) = row.try_get::<Option<Value>, _>(name) {
        value.unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<String>, _>(name) {
        value.map(Value::String).unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<i64>, _>(name) {
        value.map(Value::from).unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<i32>, _>(name) {
        value.map(Value::from).unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<i16>, _>(name) {
        value.map(Value::from).unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<f64>, _>(name) {
        value.map(Value::from).unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<f32>, _>(name) {
        value.map(Value::from).unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<bool>, _>(name) {
        value.map(Value::Bool).unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<NaiveDateTime>, _>(name) {
        value.map(timestamp_value).unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<DateTime<Utc>>, _>(name) {
        value
            .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(name) {
        value.map(|bytes| Value::String(bytea_hex(&bytes))).unwrap_or(Value::Null)
    } else if let Ok(value) = row.try_get::<Option<Vec<Option<String>>>, _>(name) {
        array_value(value, Value::String)
    } else if let Ok(value) = row.try_get::<Option<Vec<Option<i64>>>, _>(name) {
        array_value(value, Value::from)
    } else if let Ok(value) = row.try_get::<Option<Vec<Option<i32>>>, _>(name) {
        array_value(value, Value::from)
    } else if let Ok(value) = row.try_get::<Option<Vec<Option<i16>>>, _>(name) {
        array_value(value, Value::from)
    } else if let Ok(value) = row.try_get::<Option<Vec<Option<f64>>>, _>(name) {
        array_value(value, Value::from)
    } else if let Ok(value) = row.try_get::<Option<Vec<Option<f32>>>, _>(name) {
        array_value(value, Value::from)
    } else if let Ok(value) = row.try_get::<Option<Vec<Option<bool>>>, _>(name) {
        array_value(value, Value::Bool)
    } else if let Ok(value) = row.try_get::<Option<Vec<Option<NaiveDateTime>>>, _>(name) {
        array_value(value, timestamp_value)
    } else if let Ok(value) = row.try_get::<Option<Vec<Option<Vec<u8>>>>, _>(name) {
        array_value(value, |bytes| Value::String(bytea_hex(&bytes)))
    } else {
        warn!(column = name, "column type has no JSON mapping, reading as null");
        Value::Null
    }
}

fn array_value<T>(items: Option<Vec<Option<T>>>, convert: impl Fn(T) -> Value) -> Value {
    match items {
        Some(items) => Value::Array(
            items
                .into_iter()
                .map(|item| item.map(&convert).unwrap_or(Value::Null))
                .collect(),
        ),
        None => Value::Null,
    }
}

/// ISO-8601 without offset, the text form a `TIMESTAMP` parameter accepts
fn timestamp_value(ts: NaiveDateTime) -> Value {
    Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

/// PostgreSQL's hex text form (`\x0a1b`), which `::BYTEA` parses back
fn bytea_hex(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(2 + bytes.len() * 2);
    text.push_str("\\x");
    for byte in bytes {
        text.push_str(&format!("{:02x}", byte));
    }
    text
}

/// Bind every argument positionally, by its JSON shape
fn bind_args<'q>(query: &'q CompiledQuery) -> Query<'q, Postgres, PgArguments> {
    query
        .args
        .iter()
        .fold(sqlx::query(&query.sql), |bound, arg| bind_arg(bound, arg))
}

fn bind_arg<'q>(
    query: Query<'q, Postgres, PgArguments>,
    arg: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match arg {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.as_str()),
        Value::Array(items) if items.iter().all(Value::is_string) => query.bind(
            items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect::<Vec<String>>(),
        ),
        Value::Array(items) if items.iter().all(Value::is_i64) => {
            query.bind(items.iter().filter_map(Value::as_i64).collect::<Vec<i64>>())
        }
        Value::Array(items) if items.iter().all(Value::is_number) => {
            query.bind(items.iter().filter_map(Value::as_f64).collect::<Vec<f64>>())
        }
        Value::Array(items) if items.iter().all(Value::is_boolean) => {
            query.bind(items.iter().filter_map(Value::as_bool).collect::<Vec<bool>>())
        }
        other => query.bind(sqlx::types::Json(other)),
    }
}

#[async_trait]
impl SqlClient for PostgresClient {
    async fn query(&mut self, query: &CompiledQuery) -> Result<QueryResult> {
        debug!(args = query.args.len(), "running query");
        let rows = bind_args(query).fetch_all(&self.pool).await?;

        let result = rows.iter().map(Self::convert_row).collect();

        Ok(result)
    }

    async fn execute(&mut self, query: &CompiledQuery) -> Result<u64> {
        debug!(args = query.args.len(), "running statement");
        let result = bind_args(query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{InsertBuilder, SelectBuilder, UpdateBuilder};
    use crate::schema::{SqlType, Table};
    use crate::selector::Selector;
    use serde_json::json;

    fn database_url() -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgresql://localhost/test".to_string())
    }

    async fn recreate(client: &PostgresClient, table: &Table, ddl: &str) {
        client
            .execute_raw(&format!("DROP TABLE IF EXISTS {}", table.sql_name()))
            .await
            .unwrap();
        client
            .execute_raw(&format!("CREATE TABLE {} ({})", table.sql_name(), ddl))
            .await
            .unwrap();
    }

    #[test]
    fn test_bytea_hex() {
        assert_eq!(bytea_hex(&[]), "\\x");
        assert_eq!(bytea_hex(&[0x01, 0xab, 0xff]), "\\x01abff");
    }

    #[test]
    fn test_timestamp_text_form() {
        let ts = NaiveDateTime::parse_from_str("2020-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(timestamp_value(ts), json!("2020-01-01T00:00:00"));
    }

    #[tokio::test]
    #[ignore] // Requires PostgreSQL running
    async fn test_postgres_connection() {
        let client = PostgresClient::connect(&database_url()).await;
        assert!(client.is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires PostgreSQL running
    async fn test_typed_columns_read_back() {
        let mut client = PostgresClient::connect(&database_url()).await.unwrap();
        let table = Table::new(
            "TypedColumns",
            vec![
                ("postedAt", SqlType::Timestamp, true),
                ("ratio", SqlType::Real, true),
                ("score", SqlType::DoublePrecision, true),
                ("nums", SqlType::Array(Box::new(SqlType::BigInt)), true),
                ("small", SqlType::Array(Box::new(SqlType::Integer)), true),
                ("flags", SqlType::Array(Box::new(SqlType::Boolean)), true),
                ("blob", SqlType::Bytea, true),
            ],
        )
        .unwrap();
        recreate(
            &client,
            &table,
            "\"_id\" TEXT PRIMARY KEY, \"postedAt\" TIMESTAMP, \"ratio\" REAL, \
             \"score\" DOUBLE PRECISION, \"nums\" BIGINT[], \"small\" INTEGER[], \
             \"flags\" BOOLEAN[], \"blob\" BYTEA",
        )
        .await;

        let document = json!({
            "_id": "t1",
            "postedAt": "2020-01-01T00:00:00",
            "ratio": 0.5,
            "score": 2.25,
            "nums": [1, 2],
            "small": [3],
            "flags": [true, false],
            "blob": "\\x0102"
        });
        let insert = InsertBuilder::new(&table).document(document.clone()).build().unwrap();
        assert_eq!(client.execute(&insert).await.unwrap(), 1);

        let select = SelectBuilder::new(&table).build().unwrap();
        let rows = client.query(&select).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].clone().into_document(), document);

        client.execute_raw("DROP TABLE \"TypedColumns\"").await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires PostgreSQL running
    async fn test_nested_set_creates_missing_objects() {
        let mut client = PostgresClient::connect(&database_url()).await.unwrap();
        let table = Table::new("NestedSet", vec![("profile", SqlType::Json, true)]).unwrap();
        recreate(&client, &table, "\"_id\" TEXT PRIMARY KEY, \"profile\" JSONB").await;

        let insert = InsertBuilder::new(&table)
            .documents(vec![
                json!({"_id": "empty", "profile": {}}),
                json!({"_id": "missing"}),
                json!({"_id": "partial", "profile": {"location": {"zip": "1"}}}),
            ])
            .build()
            .unwrap();
        client.execute(&insert).await.unwrap();

        let update = UpdateBuilder::new(&table)
            .selector(Selector::from_value(&json!({"_id": {"$in": ["empty", "missing", "partial"]}})).unwrap())
            .set("profile.location.city", json!("X"))
            .build()
            .unwrap();
        assert_eq!(client.execute(&update).await.unwrap(), 3);

        let select = SelectBuilder::new(&table).order_asc("_id").build().unwrap();
        let profiles: Vec<Value> = client
            .query(&select)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.columns["profile"].clone())
            .collect();
        assert_eq!(
            profiles,
            vec![
                json!({"location": {"city": "X"}}),
                json!({"location": {"city": "X"}}),
                json!({"location": {"zip": "1", "city": "X"}}),
            ]
        );

        client.execute_raw("DROP TABLE \"NestedSet\"").await.unwrap();
    }
}
