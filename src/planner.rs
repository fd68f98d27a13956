use crate::builder::{DeleteBuilder, SelectBuilder, UpdateBuilder};
use crate::error::Result;
use crate::options::QueryOptions;
use crate::query::CompiledQuery;
use crate::schema::Table;
use crate::selector::Selector;
use crate::views::{ViewContext, ViewQuery, ViewRegistry, ViewTerms};
use serde_json::Value;

/// Configuration for the query planner
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Upper bound for limits that come from views or terms
    pub max_documents: u64,
    /// Maximum combinator / `$not` nesting accepted in a selector
    pub max_selector_depth: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_documents: 1000,
            max_selector_depth: 32,
        }
    }
}

/// Where a statement's selector comes from
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTarget<'n> {
    /// A registered view; `None` picks the table's default view
    View(Option<&'n str>),
    /// A selector given inline
    Selector(Value),
}

impl From<Value> for QueryTarget<'_> {
    fn from(selector: Value) -> Self {
        QueryTarget::Selector(selector)
    }
}

/// Entry point for callers: resolves views and terms, then drives the builders
#[derive(Debug)]
pub struct QueryPlanner<'r> {
    views: &'r ViewRegistry,
    config: PlannerConfig,
}

impl<'r> QueryPlanner<'r> {
    pub fn new(views: &'r ViewRegistry, config: PlannerConfig) -> Self {
        Self { views, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn build_select(
        &self,
        table: &Table,
        target: QueryTarget<'_>,
        terms: &ViewTerms,
        context: &ViewContext,
        options: QueryOptions,
    ) -> Result<CompiledQuery> {
        let (selector, planned) = self.plan(table, target, terms, context)?;
        SelectBuilder::new(table)
            .selector(selector)
            .options(planned.merge(options))
            .build()
    }

    pub fn build_count(
        &self,
        table: &Table,
        target: QueryTarget<'_>,
        terms: &ViewTerms,
        context: &ViewContext,
    ) -> Result<CompiledQuery> {
        let (selector, _) = self.plan(table, target, terms, context)?;
        SelectBuilder::new(table).selector(selector).count().build()
    }

    pub fn build_delete(
        &self,
        table: &Table,
        target: QueryTarget<'_>,
        terms: &ViewTerms,
        context: &ViewContext,
        options: QueryOptions,
    ) -> Result<CompiledQuery> {
        let (selector, planned) = self.plan(table, target, terms, context)?;
        DeleteBuilder::new(table)
            .selector(selector)
            .options(mutation_options(planned).merge(options))?
            .build()
    }

    pub fn build_update(
        &self,
        table: &Table,
        target: QueryTarget<'_>,
        terms: &ViewTerms,
        context: &ViewContext,
        modifier: &Value,
        options: QueryOptions,
    ) -> Result<CompiledQuery> {
        let (selector, planned) = self.plan(table, target, terms, context)?;
        UpdateBuilder::new(table)
            .selector(selector)
            .modifier(modifier)?
            .options(mutation_options(planned).merge(options))?
            .build()
    }

    /// Selector and the options implied by the view and terms:
    /// view options < term limit (clamped) and offset.
    /// Callers merge their own options over the result.
    fn plan(
        &self,
        table: &Table,
        target: QueryTarget<'_>,
        terms: &ViewTerms,
        context: &ViewContext,
    ) -> Result<(Selector, QueryOptions)> {
        let resolved = match target {
            QueryTarget::View(name) => self.views.resolve(table, name, terms, context)?,
            QueryTarget::Selector(selector) => ViewQuery::new(selector),
        };

        let selector = Selector::parse(&resolved.selector, self.config.max_selector_depth)?;

        let mut planned = resolved.options;
        planned.limit = planned.limit.map(|limit| self.clamp(limit));
        if let Some(limit) = terms.limit()? {
            planned.limit = Some(self.clamp(limit));
        }
        if let Some(offset) = terms.offset()? {
            planned.offset = Some(offset);
        }

        Ok((selector, planned))
    }

    fn clamp(&self, limit: u64) -> u64 {
        limit.min(self.config.max_documents)
    }
}

/// Projection and offset planned from a view or terms don't apply to
/// mutations. Caller options are merged afterwards, so the builder still
/// rejects explicit ones.
fn mutation_options(planned: QueryOptions) -> QueryOptions {
    QueryOptions {
        projection: None,
        offset: None,
        ..planned
    }
}
