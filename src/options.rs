use crate::error::{QueryError, Result};
use crate::schema::ID_FIELD;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Accepts `1`/`-1` as well as `"asc"`/`"desc"`
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) if n.as_i64() == Some(1) => Ok(SortDirection::Asc),
            Value::Number(n) if n.as_i64() == Some(-1) => Ok(SortDirection::Desc),
            Value::String(s) if s.eq_ignore_ascii_case("asc") => Ok(SortDirection::Asc),
            Value::String(s) if s.eq_ignore_ascii_case("desc") => Ok(SortDirection::Desc),
            other => Err(QueryError::InvalidOptions(format!(
                "sort direction must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Ordered list of sort keys
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Sort {
    fields: Vec<(String, SortDirection)>,
}

impl Sort {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.fields.push((field.into(), direction));
        self
    }

    pub fn asc(self, field: impl Into<String>) -> Self {
        self.by(field, SortDirection::Asc)
    }

    pub fn desc(self, field: impl Into<String>) -> Self {
        self.by(field, SortDirection::Desc)
    }

    pub fn fields(&self) -> &[(String, SortDirection)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<Map<String, Value>> for Sort {
    type Error = QueryError;

    fn try_from(map: Map<String, Value>) -> Result<Self> {
        let fields = map
            .iter()
            .map(|(field, direction)| Ok((field.clone(), SortDirection::from_value(direction)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }
}

/// Field projection
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub enum Projection {
    /// Only these columns, in this order
    Include(Vec<String>),
    /// Every column except these
    Exclude(Vec<String>),
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Include(fields.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(fields.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<Map<String, Value>> for Projection {
    type Error = QueryError;

    fn try_from(map: Map<String, Value>) -> Result<Self> {
        let mut included = Vec::new();
        let mut excluded = Vec::new();

        for (field, flag) in &map {
            let keep = match flag {
                Value::Bool(keep) => *keep,
                Value::Number(n) if n.as_i64() == Some(1) => true,
                Value::Number(n) if n.as_i64() == Some(0) => false,
                other => {
                    return Err(QueryError::InvalidOptions(format!(
                        "projection of {} must be 0 or 1, got {}",
                        field, other
                    )))
                }
            };
            if keep {
                included.push(field.clone());
            } else {
                excluded.push(field.clone());
            }
        }

        match (included.is_empty(), excluded.is_empty()) {
            (true, true) => Err(QueryError::InvalidOptions("empty projection".to_string())),
            (false, true) => Ok(Projection::Include(included)),
            (true, false) => Ok(Projection::Exclude(excluded)),
            // `{_id: 0, a: 1}` is the one mix that makes sense
            (false, false) if excluded.iter().all(|f| f == ID_FIELD) => {
                Ok(Projection::Include(included))
            }
            (false, false) => Err(QueryError::InvalidOptions(
                "projection cannot mix inclusion and exclusion".to_string(),
            )),
        }
    }
}

/// Statement options: projection, sort, paging and the mutation safety flag
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryOptions {
    #[serde(default)]
    pub projection: Option<Projection>,
    #[serde(default)]
    pub sort: Option<Sort>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default, alias = "skip")]
    pub offset: Option<u64>,
    #[serde(default)]
    pub no_safety_harness: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON; `null` yields the defaults
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|err| QueryError::InvalidOptions(err.to_string()))
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn without_safety_harness(mut self) -> Self {
        self.no_safety_harness = true;
        self
    }

    /// Field-wise merge where values set in `overrides` win
    pub fn merge(self, overrides: QueryOptions) -> QueryOptions {
        QueryOptions {
            projection: overrides.projection.or(self.projection),
            sort: overrides.sort.or(self.sort),
            limit: overrides.limit.or(self.limit),
            offset: overrides.offset.or(self.offset),
            no_safety_harness: self.no_safety_harness || overrides.no_safety_harness,
        }
    }
}
