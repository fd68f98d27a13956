use crate::error::{QueryError, Result};
use crate::options::QueryOptions;
use crate::schema::{Table, ID_FIELD};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Turns per-call terms into a selector and options
pub type ViewResolver = Arc<dyn Fn(&ViewTerms, &ViewContext) -> Result<ViewQuery> + Send + Sync>;

/// What a view resolves to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    /// Selector JSON, parsed later by the planner
    pub selector: Value,
    pub options: QueryOptions,
}

impl ViewQuery {
    pub fn new(selector: Value) -> Self {
        Self {
            selector,
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Named view over the default view: selector keys and option fields
    /// set by `overlay` win
    fn merge(self, overlay: ViewQuery) -> ViewQuery {
        let mut selector = selector_object(self.selector);
        for (key, value) in selector_object(overlay.selector) {
            selector.insert(key, value);
        }
        ViewQuery {
            selector: Value::Object(selector),
            options: self.options.merge(overlay.options),
        }
    }
}

fn selector_object(selector: Value) -> Map<String, Value> {
    match selector {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        // string shorthand for `{_id: …}`
        other => {
            let mut map = Map::new();
            map.insert(ID_FIELD.to_string(), other);
            map
        }
    }
}

/// Per-call view parameters, e.g. `{limit: 20, userId: "u1"}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewTerms {
    terms: Map<String, Value>,
}

impl ViewTerms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(terms) => Ok(Self {
                terms: terms.clone(),
            }),
            other => Err(QueryError::TypeMismatch(format!(
                "view terms must be an object, got {}",
                other
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.terms.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.terms.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn limit(&self) -> Result<Option<u64>> {
        self.count("limit")
    }

    pub fn offset(&self) -> Result<Option<u64>> {
        self.count("offset")
    }

    fn count(&self, key: &str) -> Result<Option<u64>> {
        match self.terms.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                QueryError::InvalidOptions(format!(
                    "term {} must be a non-negative integer, got {}",
                    key, value
                ))
            }),
        }
    }
}

/// Read-only ambient state a resolver may consult
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewContext {
    pub current_user_id: Option<String>,
    pub is_admin: bool,
}

impl ViewContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            current_user_id: Some(id.into()),
            is_admin: false,
        }
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

#[derive(Default)]
struct TableViews {
    default: Option<ViewResolver>,
    named: HashMap<String, ViewResolver>,
}

/// Views per table, filled at startup and read-only afterwards
#[derive(Default)]
pub struct ViewRegistry {
    tables: HashMap<String, TableViews>,
}

impl fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (table, views) in &self.tables {
            let mut names: Vec<&str> = views.named.keys().map(String::as_str).collect();
            names.sort_unstable();
            map.entry(table, &(views.default.is_some(), names));
        }
        map.finish()
    }
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_view<F>(&mut self, table: &Table, name: &str, resolver: F) -> Result<()>
    where
        F: Fn(&ViewTerms, &ViewContext) -> Result<ViewQuery> + Send + Sync + 'static,
    {
        let views = self.tables.entry(table.name().to_string()).or_default();
        if views.named.contains_key(name) {
            return Err(QueryError::Schema(format!(
                "View {} registered twice for {}",
                name,
                table.name()
            )));
        }
        views.named.insert(name.to_string(), Arc::new(resolver));
        Ok(())
    }

    pub fn register_default_view<F>(&mut self, table: &Table, resolver: F) -> Result<()>
    where
        F: Fn(&ViewTerms, &ViewContext) -> Result<ViewQuery> + Send + Sync + 'static,
    {
        let views = self.tables.entry(table.name().to_string()).or_default();
        if views.default.is_some() {
            return Err(QueryError::Schema(format!(
                "Default view registered twice for {}",
                table.name()
            )));
        }
        views.default = Some(Arc::new(resolver));
        Ok(())
    }

    pub fn has_view(&self, table: &Table, name: &str) -> bool {
        self.tables
            .get(table.name())
            .map_or(false, |views| views.named.contains_key(name))
    }

    /// Resolve the default view, then merge the named view (if any) over it
    pub fn resolve(
        &self,
        table: &Table,
        name: Option<&str>,
        terms: &ViewTerms,
        context: &ViewContext,
    ) -> Result<ViewQuery> {
        let views = self.tables.get(table.name());
        let default = views.and_then(|views| views.default.as_ref());

        let named = match name {
            Some(name) => Some(
                views
                    .and_then(|views| views.named.get(name))
                    .ok_or_else(|| QueryError::UnknownView {
                        table: table.name().to_string(),
                        view: name.to_string(),
                    })?,
            ),
            None => None,
        };

        trace!(table = %table.name(), view = name.unwrap_or("default"), "resolving view");

        match (default, named) {
            (None, None) => Err(QueryError::NoDefaultView(table.name().to_string())),
            (Some(default), None) => default(terms, context),
            (None, Some(named)) => named(terms, context),
            (Some(default), Some(named)) => {
                let base = default(terms, context)?;
                Ok(base.merge(named(terms, context)?))
            }
        }
    }
}
