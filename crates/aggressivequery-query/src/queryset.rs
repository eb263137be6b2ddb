//! The query execution contract the planner rewrites against.

use aggressivequery_core::EntityName;
use std::fmt;

/// A query value the planner can reconfigure.
///
/// Every setter *replaces* the previous configuration of its kind; once the
/// planner runs, it owns joins, prefetches and the column projection.
pub trait QuerySet: Clone + fmt::Debug + Send + Sync + 'static {
    /// The entity type this query returns.
    fn model(&self) -> EntityName;

    /// A fresh "all rows" query for another entity on the same backend.
    fn for_entity(&self, entity: EntityName) -> Self;

    /// Restrict the projection to `columns`; `rel__col` addresses joined columns.
    fn restrict_columns(self, columns: Vec<String>) -> Self;

    /// Join the given `__`-separated relation paths.
    fn set_joins(self, paths: Vec<String>) -> Self;

    /// Relation paths currently joined.
    fn joined_paths(&self) -> &[String] {
        &[]
    }

    /// Fetch the given relations in follow-up batched queries.
    fn set_prefetches(self, prefetches: Vec<Prefetch<Self>>) -> Self;
}

/// One batched follow-up fetch.
#[derive(Debug, Clone)]
pub struct Prefetch<Q> {
    /// Relation path from the root query, `__`-separated.
    pub lookup: String,
    /// Sub-query replacing the default "all rows of the target" fetch.
    pub query: Option<Q>,
    /// Attribute the results are bound to instead of the relation accessor.
    pub to_attr: Option<String>,
}

impl<Q> Prefetch<Q> {
    pub fn new(lookup: impl Into<String>) -> Self {
        Self {
            lookup: lookup.into(),
            query: None,
            to_attr: None,
        }
    }

    #[must_use]
    pub fn query(mut self, query: Q) -> Self {
        self.query = Some(query);
        self
    }

    #[must_use]
    pub fn to_attr(mut self, name: impl Into<String>) -> Self {
        self.to_attr = Some(name.into());
        self
    }

    /// Name the prefetched rows are reachable under.
    pub fn attribute(&self) -> &str {
        match &self.to_attr {
            Some(attr) => attr,
            None => self.lookup.rsplit("__").next().unwrap_or(&self.lookup),
        }
    }
}
