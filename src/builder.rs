use crate::compiler::compile_selector;
use crate::error::{QueryError, Result};
use crate::options::{Projection, QueryOptions, Sort, SortDirection};
use crate::query::{CompiledQuery, Query};
use crate::schema::{quote_identifier, ColumnDef, FieldDescriptor, SqlType, Table, ID_FIELD};
use crate::selector::{Predicate, Selector};
use serde_json::Value;
use tracing::{debug, warn};

/// SELECT query builder
#[derive(Debug, Clone)]
pub struct SelectBuilder<'a> {
    table: &'a Table,
    selector: Selector,
    projection: Option<Projection>,
    sort: Sort,
    limit: Option<u64>,
    offset: Option<u64>,
    count: bool,
}

impl<'a> SelectBuilder<'a> {
    /// Create a new SELECT query builder
    pub fn new(table: &'a Table) -> Self {
        Self {
            table,
            selector: Selector::empty(),
            projection: None,
            sort: Sort::new(),
            limit: None,
            offset: None,
            count: false,
        }
    }

    /// Replace the selector
    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    /// AND another selector onto the current one
    pub fn and_where(mut self, selector: Selector) -> Self {
        self.selector = self.selector.and_with(selector);
        self
    }

    /// Add a `field = value` condition
    pub fn where_eq(self, field: impl Into<String>, value: Value) -> Self {
        self.and_where(Selector::eq(field, value))
    }

    /// Add a `field > value` condition
    pub fn where_gt(self, field: impl Into<String>, value: Value) -> Self {
        self.and_where(Selector::field(field, Predicate::Gt(value)))
    }

    /// Add a `field < value` condition
    pub fn where_lt(self, field: impl Into<String>, value: Value) -> Self {
        self.and_where(Selector::field(field, Predicate::Lt(value)))
    }

    /// Add a `field IN (...)` condition
    pub fn where_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.and_where(Selector::field(field, Predicate::In(values)))
    }

    /// Add a `field IS NULL` condition
    pub fn where_null(self, field: impl Into<String>) -> Self {
        self.and_where(Selector::eq(field, Value::Null))
    }

    /// Apply projection, sort, limit and offset from options
    pub fn options(mut self, options: QueryOptions) -> Self {
        if let Some(projection) = options.projection {
            self.projection = Some(projection);
        }
        if let Some(sort) = options.sort {
            self.sort = sort;
        }
        self.limit = options.limit.or(self.limit);
        self.offset = options.offset.or(self.offset);
        self
    }

    /// Select specific columns
    pub fn select(mut self, columns: Vec<impl Into<String>>) -> Self {
        self.projection = Some(Projection::include(columns));
        self
    }

    /// Select all columns
    pub fn select_all(mut self) -> Self {
        self.projection = None;
        self
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Return `COUNT(*)` instead of rows; sort and paging are ignored
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Add ORDER BY
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = self.sort.by(field, direction);
        self
    }

    /// Add ascending ORDER BY
    pub fn order_asc(self, field: impl Into<String>) -> Self {
        self.order_by(field, SortDirection::Asc)
    }

    /// Add descending ORDER BY
    pub fn order_desc(self, field: impl Into<String>) -> Self {
        self.order_by(field, SortDirection::Desc)
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Set LIMIT
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set OFFSET
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Assemble the statement without numbering it, for use as a sub-query
    pub fn into_query(self) -> Result<Query> {
        let mut query = Query::from_sql("SELECT");
        query.sql(self.projection_sql()?);
        query.sql("FROM").table(self.table.name());

        if !self.selector.is_empty() {
            query.sql("WHERE");
            query.append(compile_selector(self.table, &self.selector)?);
        }

        if self.count {
            return Ok(query);
        }

        if !self.sort.is_empty() {
            query.sql("ORDER BY");
            query.sql(sort_sql(self.table, &self.sort)?);
        }

        if let Some(limit) = self.limit {
            query.sql("LIMIT").param(Value::from(limit));
        }

        if let Some(offset) = self.offset {
            query.sql("OFFSET").param(Value::from(offset));
        }

        Ok(query)
    }

    /// Build the SQL statement and its arguments
    pub fn build(self) -> Result<CompiledQuery> {
        let table = self.table.name().to_string();
        let compiled = self.into_query()?.compile();
        debug!(table = %table, args = compiled.args.len(), "compiled select");
        Ok(compiled)
    }

    fn projection_sql(&self) -> Result<String> {
        if self.count {
            return Ok("COUNT(*)".to_string());
        }

        match &self.projection {
            None => Ok("*".to_string()),
            Some(Projection::Include(fields)) => {
                let columns = fields
                    .iter()
                    .map(|field| Ok(quote_identifier(&self.table.resolve_column(field)?.name)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(columns.join(", "))
            }
            Some(Projection::Exclude(fields)) => {
                for field in fields {
                    self.table.resolve_column(field)?;
                }
                let columns: Vec<String> = self
                    .table
                    .columns()
                    .iter()
                    .filter(|column| !fields.contains(&column.name))
                    .map(|column| quote_identifier(&column.name))
                    .collect();
                if columns.is_empty() {
                    return Err(QueryError::InvalidOptions(format!(
                        "projection excludes every column of {}",
                        self.table.name()
                    )));
                }
                Ok(columns.join(", "))
            }
        }
    }
}

/// DELETE query builder
#[derive(Debug, Clone)]
pub struct DeleteBuilder<'a> {
    table: &'a Table,
    selector: Selector,
    sort: Sort,
    limit: Option<u64>,
    no_safety_harness: bool,
    returning: bool,
}

impl<'a> DeleteBuilder<'a> {
    /// Create a new DELETE query builder
    pub fn new(table: &'a Table) -> Self {
        Self {
            table,
            selector: Selector::empty(),
            sort: Sort::new(),
            limit: None,
            no_safety_harness: false,
            returning: false,
        }
    }

    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn and_where(mut self, selector: Selector) -> Self {
        self.selector = self.selector.and_with(selector);
        self
    }

    /// Add simple WHERE condition (field = value)
    pub fn where_eq(self, field: impl Into<String>, value: Value) -> Self {
        self.and_where(Selector::eq(field, value))
    }

    /// Apply limit, sort and the safety flag; projection and offset are rejected
    pub fn options(mut self, options: QueryOptions) -> Result<Self> {
        if options.projection.is_some() || options.offset.is_some() {
            return Err(QueryError::InvalidOptions(
                "DELETE accepts only limit, sort and noSafetyHarness".to_string(),
            ));
        }
        if let Some(sort) = options.sort {
            self.sort = sort;
        }
        self.limit = options.limit.or(self.limit);
        self.no_safety_harness |= options.no_safety_harness;
        Ok(self)
    }

    /// Delete at most `limit` rows, picked by a sub-select on `_id`
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order in which bounded deletes pick their rows
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = self.sort.by(field, direction);
        self
    }

    /// Allow an empty selector to delete every row
    pub fn no_safety_harness(mut self) -> Self {
        self.no_safety_harness = true;
        self
    }

    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    /// Build the SQL statement and its arguments
    pub fn build(self) -> Result<CompiledQuery> {
        guard_full_table(self.table, &self.selector, self.no_safety_harness, "delete")?;

        let mut query = Query::from_sql("DELETE FROM");
        query.table(self.table.name());

        if let Some(limit) = self.limit {
            query.sql("WHERE");
            query.append(id_in(bounded_ids(self.table, self.selector, self.sort, limit)?));
        } else if !self.selector.is_empty() {
            query.sql("WHERE");
            query.append(compile_selector(self.table, &self.selector)?);
        }

        if self.returning {
            query.sql("RETURNING *");
        }

        let compiled = query.compile();
        debug!(table = %self.table.name(), args = compiled.args.len(), "compiled delete");
        Ok(compiled)
    }
}

/// A single field assignment of an UPDATE
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Set(String, Value),
    Unset(String),
    Inc(String, Value),
    Push(String, Value),
}

impl Assignment {
    pub fn field(&self) -> &str {
        match self {
            Assignment::Set(field, _)
            | Assignment::Unset(field)
            | Assignment::Inc(field, _)
            | Assignment::Push(field, _) => field,
        }
    }
}

/// UPDATE query builder
#[derive(Debug, Clone)]
pub struct UpdateBuilder<'a> {
    table: &'a Table,
    selector: Selector,
    assignments: Vec<Assignment>,
    sort: Sort,
    limit: Option<u64>,
    no_safety_harness: bool,
    returning: bool,
}

impl<'a> UpdateBuilder<'a> {
    /// Create a new UPDATE query builder
    pub fn new(table: &'a Table) -> Self {
        Self {
            table,
            selector: Selector::empty(),
            assignments: Vec::new(),
            sort: Sort::new(),
            limit: None,
            no_safety_harness: false,
            returning: false,
        }
    }

    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn and_where(mut self, selector: Selector) -> Self {
        self.selector = self.selector.and_with(selector);
        self
    }

    /// Add simple WHERE condition (field = value)
    pub fn where_eq(self, field: impl Into<String>, value: Value) -> Self {
        self.and_where(Selector::eq(field, value))
    }

    /// Set a field value; dotted paths write into JSON columns
    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.assignments.push(Assignment::Set(field.into(), value));
        self
    }

    /// Set multiple field values
    pub fn set_many(mut self, values: Vec<(impl Into<String>, Value)>) -> Self {
        for (field, value) in values {
            self.assignments.push(Assignment::Set(field.into(), value));
        }
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.assignments.push(Assignment::Unset(field.into()));
        self
    }

    pub fn inc(mut self, field: impl Into<String>, amount: Value) -> Self {
        self.assignments.push(Assignment::Inc(field.into(), amount));
        self
    }

    pub fn push(mut self, field: impl Into<String>, value: Value) -> Self {
        self.assignments.push(Assignment::Push(field.into(), value));
        self
    }

    /// Add the assignments of a modifier document (`$set`, `$unset`, `$inc`, `$push`)
    pub fn modifier(mut self, modifier: &Value) -> Result<Self> {
        let operations = match modifier {
            Value::Object(operations) => operations,
            other => {
                return Err(QueryError::TypeMismatch(format!(
                    "modifier must be an object, got {}",
                    other
                )))
            }
        };

        for (op, fields) in operations {
            let fields = match fields {
                Value::Object(fields) => fields,
                other => {
                    return Err(QueryError::TypeMismatch(format!(
                        "{} expects an object of fields, got {}",
                        op, other
                    )))
                }
            };
            for (field, value) in fields {
                let assignment = match op.as_str() {
                    "$set" => Assignment::Set(field.clone(), value.clone()),
                    "$unset" => Assignment::Unset(field.clone()),
                    "$inc" => Assignment::Inc(field.clone(), value.clone()),
                    "$push" => Assignment::Push(field.clone(), value.clone()),
                    other if other.starts_with('$') => {
                        return Err(QueryError::unsupported(other, field.as_str()))
                    }
                    other => {
                        return Err(QueryError::TypeMismatch(format!(
                            "modifier key {} is not an update operator",
                            other
                        )))
                    }
                };
                self.assignments.push(assignment);
            }
        }

        Ok(self)
    }

    /// Apply limit, sort and the safety flag; projection and offset are rejected
    pub fn options(mut self, options: QueryOptions) -> Result<Self> {
        if options.projection.is_some() || options.offset.is_some() {
            return Err(QueryError::InvalidOptions(
                "UPDATE accepts only limit, sort and noSafetyHarness".to_string(),
            ));
        }
        if let Some(sort) = options.sort {
            self.sort = sort;
        }
        self.limit = options.limit.or(self.limit);
        self.no_safety_harness |= options.no_safety_harness;
        Ok(self)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn no_safety_harness(mut self) -> Self {
        self.no_safety_harness = true;
        self
    }

    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    /// Build the SQL statement and its arguments
    pub fn build(self) -> Result<CompiledQuery> {
        if self.assignments.is_empty() {
            return Err(QueryError::TypeMismatch(
                "UPDATE must have at least one assignment".to_string(),
            ));
        }

        guard_full_table(self.table, &self.selector, self.no_safety_harness, "update")?;

        let mut query = Query::from_sql("UPDATE");
        query.table(self.table.name()).sql("SET");
        query.append(self.set_clause()?);

        if let Some(limit) = self.limit {
            query.sql("WHERE");
            query.append(id_in(bounded_ids(self.table, self.selector, self.sort, limit)?));
        } else if !self.selector.is_empty() {
            query.sql("WHERE");
            query.append(compile_selector(self.table, &self.selector)?);
        }

        if self.returning {
            query.sql("RETURNING *");
        }

        let compiled = query.compile();
        debug!(table = %self.table.name(), args = compiled.args.len(), "compiled update");
        Ok(compiled)
    }

    /// `"a" = $1, "profile" = jsonb_set(…)`, one entry per touched column
    fn set_clause(&self) -> Result<Query> {
        // (column, new value, whole column assigned)
        let mut columns: Vec<(String, Query, bool)> = Vec::new();

        for assignment in &self.assignments {
            let field = assignment.field();
            let descriptor = self.table.resolve_field(field)?;
            let column = self.table.resolve_column(descriptor.column())?;
            let slot = columns.iter().position(|(name, _, _)| *name == column.name);

            let conflict = || {
                QueryError::TypeMismatch(format!(
                    "conflicting updates to column {} of {}",
                    column.name,
                    self.table.name()
                ))
            };

            let keys = descriptor.keys().to_vec();
            let nested = matches!(
                descriptor,
                FieldDescriptor::JsonPath { .. } | FieldDescriptor::Indexed(_)
            );

            if nested {
                let base = match slot {
                    Some(i) if columns[i].2 => return Err(conflict()),
                    Some(i) => std::mem::take(&mut columns[i].1),
                    None => Query::from_sql(quote_identifier(&column.name)),
                };
                let value = nested_assignment(base, &keys, assignment)?;
                match slot {
                    Some(i) => columns[i].1 = value,
                    None => columns.push((column.name.clone(), value, false)),
                }
            } else {
                if slot.is_some() || matches!(descriptor, FieldDescriptor::JsonArrayPath { .. }) {
                    return Err(match slot {
                        Some(_) => conflict(),
                        None => QueryError::TypeMismatch(format!(
                            "cannot update \"{}\" inside JSON array elements",
                            field
                        )),
                    });
                }
                let value = column_assignment(column, assignment)?;
                columns.push((column.name.clone(), value, true));
            }
        }

        let parts = columns
            .into_iter()
            .map(|(name, value, _)| {
                let mut part = Query::from_sql(format!("{} =", quote_identifier(&name)));
                part.append(value);
                part
            })
            .collect();
        Ok(Query::join(parts, ","))
    }
}

/// New value for a whole column
fn column_assignment(column: &ColumnDef, assignment: &Assignment) -> Result<Query> {
    let name = quote_identifier(&column.name);

    match assignment {
        Assignment::Set(_, value) => bind_value(column, value),
        Assignment::Unset(_) => bind_value(column, &Value::Null),
        Assignment::Inc(field, amount) => {
            if !column.sql_type.is_numeric() || !column.sql_type.accepts(amount) {
                return Err(QueryError::TypeMismatch(format!(
                    "$inc on \"{}\" needs a numeric column and amount, got {}",
                    field, amount
                )));
            }
            let mut query = Query::from_sql(format!("COALESCE({}, 0) +", name));
            query.param(amount.clone());
            Ok(query)
        }
        Assignment::Push(field, value) => match &column.sql_type {
            SqlType::Array(inner) => {
                if !inner.accepts(value) {
                    return Err(QueryError::TypeMismatch(format!(
                        "cannot $push {} onto \"{}\" of type {}",
                        value, field, column.sql_type
                    )));
                }
                let mut query = Query::from_sql(format!("array_append({},", name));
                query.wrapped_param("", value.clone(), inner.param_cast(), ")");
                Ok(query)
            }
            SqlType::JsonArray => {
                let mut query = Query::from_sql(format!("COALESCE({}, '[]'::jsonb) ||", name));
                query.typed_param(
                    Value::String(serde_json::to_string(&Value::Array(vec![value.clone()]))?),
                    Some("jsonb".to_string()),
                );
                Ok(query)
            }
            other => Err(QueryError::TypeMismatch(format!(
                "$push on \"{}\" needs an array column, got {}",
                field, other
            ))),
        },
    }
}

/// Wrap the current value of a JSON column in a keyed write
fn nested_assignment(base: Query, keys: &[String], assignment: &Assignment) -> Result<Query> {
    match assignment {
        Assignment::Set(_, value) => {
            let mut value_query = Query::new();
            value_query.typed_param(
                Value::String(serde_json::to_string(value)?),
                Some("jsonb".to_string()),
            );
            Ok(json_set(base, keys, value_query))
        }
        Assignment::Unset(_) => {
            let path = Value::Array(keys.iter().cloned().map(Value::String).collect());
            let mut query = base;
            query.sql("#-").typed_param(path, Some("text[]".to_string()));
            Ok(query)
        }
        Assignment::Inc(field, _) | Assignment::Push(field, _) => Err(QueryError::TypeMismatch(
            format!("only $set and $unset can write inside JSON field \"{}\"", field),
        )),
    }
}

/// `jsonb_set` one key at a time, so missing parent objects are created.
///
/// `jsonb_set(.., '{a,b}', .., TRUE)` only creates the last key and leaves
/// the target untouched when `a` is absent.
fn json_set(target: Query, keys: &[String], value: Query) -> Query {
    let (head, rest) = match keys.split_first() {
        Some(split) => split,
        None => return value,
    };
    let head_path = Value::Array(vec![Value::String(head.clone())]);

    let value = if rest.is_empty() {
        value
    } else {
        let mut child = target.clone();
        child
            .sql("#>")
            .typed_param(head_path.clone(), Some("text[]".to_string()));
        json_set(child, rest, value)
    };

    let mut query = Query::new();
    query.sql("jsonb_set( COALESCE(");
    query.append(target);
    query.sql(",").sql("'{}'::jsonb )").sql(",");
    query.typed_param(head_path, Some("text[]".to_string())).sql(",");
    query.append(value);
    query.sql(",").sql("TRUE )");
    query
}

/// Bind a value for storage in a column, with the cast its type needs
fn bind_value(column: &ColumnDef, value: &Value) -> Result<Query> {
    if value.is_null() {
        if !column.nullable {
            return Err(QueryError::TypeMismatch(format!(
                "column {} is not nullable",
                column.name
            )));
        }
        return Ok(Query::from_sql("NULL"));
    }

    if !column.sql_type.accepts(value) {
        return Err(QueryError::TypeMismatch(format!(
            "column {} of type {} cannot store {}",
            column.name, column.sql_type, value
        )));
    }

    let mut query = Query::new();
    if column.sql_type.is_json() {
        query.typed_param(Value::String(serde_json::to_string(value)?), column.sql_type.param_cast());
    } else {
        query.typed_param(value.clone(), column.sql_type.param_cast());
    }
    Ok(query)
}

/// What an INSERT does when the `_id` already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    #[default]
    Error,
    Ignore,
    Upsert,
}

/// INSERT query builder
#[derive(Debug, Clone)]
pub struct InsertBuilder<'a> {
    table: &'a Table,
    documents: Vec<Value>,
    conflict: ConflictStrategy,
    returning: bool,
}

impl<'a> InsertBuilder<'a> {
    /// Create a new INSERT query builder
    pub fn new(table: &'a Table) -> Self {
        Self {
            table,
            documents: Vec::new(),
            conflict: ConflictStrategy::Error,
            returning: false,
        }
    }

    /// Add one document (a JSON object keyed by column)
    pub fn document(mut self, document: Value) -> Self {
        self.documents.push(document);
        self
    }

    pub fn documents(mut self, documents: Vec<Value>) -> Self {
        self.documents.extend(documents);
        self
    }

    pub fn on_conflict(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict = strategy;
        self
    }

    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    /// Build the SQL statement and its arguments
    pub fn build(self) -> Result<CompiledQuery> {
        if self.documents.is_empty() {
            return Err(QueryError::TypeMismatch(
                "INSERT must have at least one document".to_string(),
            ));
        }

        let mut rows = Vec::with_capacity(self.documents.len());
        for document in &self.documents {
            match document {
                Value::Object(fields) => rows.push(fields),
                other => {
                    return Err(QueryError::TypeMismatch(format!(
                        "documents must be objects, got {}",
                        other
                    )))
                }
            }
        }

        // ordered union of keys, first appearance wins
        let mut columns: Vec<&ColumnDef> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                let column = self.table.resolve_column(key)?;
                if !columns.iter().any(|c| c.name == column.name) {
                    columns.push(column);
                }
            }
        }

        let mut query = Query::from_sql("INSERT INTO");
        query.table(self.table.name());
        let names: Vec<String> = columns.iter().map(|c| quote_identifier(&c.name)).collect();
        query.sql(format!("({})", names.join(", ")));
        query.sql("VALUES");

        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                values.push(match row.get(&column.name) {
                    Some(value) => bind_value(column, value)?,
                    None => Query::from_sql("DEFAULT"),
                });
            }
            tuples.push(Query::parenthesized(Query::join(values, ",")));
        }
        query.append(Query::join(tuples, ","));

        match self.conflict {
            ConflictStrategy::Error => {}
            ConflictStrategy::Ignore => {
                query.sql("ON CONFLICT DO NOTHING");
            }
            ConflictStrategy::Upsert => {
                let updates: Vec<String> = columns
                    .iter()
                    .filter(|c| c.name != ID_FIELD)
                    .map(|c| {
                        let name = quote_identifier(&c.name);
                        format!("{} = EXCLUDED.{}", name, name)
                    })
                    .collect();
                query.sql(format!("ON CONFLICT ({})", quote_identifier(ID_FIELD)));
                if updates.is_empty() {
                    query.sql("DO NOTHING");
                } else {
                    query.sql(format!("DO UPDATE SET {}", updates.join(", ")));
                }
            }
        }

        if self.returning {
            query.sql("RETURNING *");
        }

        let compiled = query.compile();
        debug!(table = %self.table.name(), args = compiled.args.len(), "compiled insert");
        Ok(compiled)
    }
}

/// `"a" ASC, ("profile"->'rank') DESC`
fn sort_sql(table: &Table, sort: &Sort) -> Result<String> {
    let keys = sort
        .fields()
        .iter()
        .map(|(field, direction)| {
            let descriptor = table.resolve_field(field)?;
            if let FieldDescriptor::JsonArrayPath { .. } = descriptor {
                return Err(QueryError::InvalidOptions(format!(
                    "cannot sort on \"{}\" inside JSON array elements",
                    field
                )));
            }
            Ok(format!("{} {}", descriptor.sql(), direction))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(keys.join(", "))
}

/// Refuse a mutation whose selector matches every row unless explicitly allowed
fn guard_full_table(
    table: &Table,
    selector: &Selector,
    allowed: bool,
    operation: &'static str,
) -> Result<()> {
    if !selector.matches_everything() {
        return Ok(());
    }
    if !allowed {
        return Err(QueryError::UnsafeMutation {
            operation,
            table: table.name().to_string(),
        });
    }
    warn!(table = %table.name(), operation, "full-table mutation with safety harness disabled");
    Ok(())
}

/// `SELECT "_id" FROM "t" WHERE … ORDER BY … LIMIT $n`, unnumbered
fn bounded_ids(table: &Table, selector: Selector, sort: Sort, limit: u64) -> Result<Query> {
    SelectBuilder::new(table)
        .selector(selector)
        .select(vec![ID_FIELD])
        .sort(sort)
        .limit(limit)
        .into_query()
}

/// `"_id" IN (<ids>)`
fn id_in(ids: Query) -> Query {
    let mut query = Query::from_sql(format!("{} IN", quote_identifier(ID_FIELD)));
    query.sub_query(ids);
    query
}
