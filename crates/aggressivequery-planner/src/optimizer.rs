//! Query optimization: join, prefetch and column-restriction phases.

use crate::extensions::Extension;
use crate::hints::Hint;
use crate::inspector::Inspector;
use crate::selection::SEPARATOR;
use crate::structures::{ResultNode, SkipTree};
use aggressivequery_core::{ExtensionConfigurationError, Result, SchemaError};
use aggressivequery_query::{Prefetch, QuerySet};
use std::fmt;

/// A stage that rewrites a query to fetch exactly `result`.
pub trait Optimize<Q: QuerySet>: Send + Sync {
    fn optimize(&self, query: Q, result: &ResultNode) -> Result<Q>;
}

/// A joinable relation, named by its path from the query root.
#[derive(Debug, Clone)]
pub struct LazyJoin<'a> {
    pub name: String,
    pub hint: &'a Hint,
    pub result: &'a ResultNode,
}

/// A prefetchable relation, named by its path from the query root.
#[derive(Debug, Clone)]
pub struct LazyPrefetch<'a> {
    pub name: String,
    pub hint: &'a Hint,
    pub result: &'a ResultNode,
}

fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{SEPARATOR}{name}"),
        None => name.to_string(),
    }
}

/// The default optimizer.
///
/// Phases run outermost first: joins, then prefetches (each prefetch
/// sub-query optimized the same way), then the column projection.
pub struct QueryOptimizer<Q: QuerySet> {
    inspector: Inspector,
    enable_selections: bool,
    prefetch_stages: Vec<Box<dyn Extension<Q>>>,
}

impl<Q: QuerySet> QueryOptimizer<Q> {
    pub fn new(inspector: Inspector) -> Self {
        Self {
            inspector,
            enable_selections: false,
            prefetch_stages: Vec::new(),
        }
    }

    /// Run the column-restriction phase.
    #[must_use]
    pub fn enable_selections(mut self, enabled: bool) -> Self {
        self.enable_selections = enabled;
        self
    }

    /// Extensions applied to every prefetch sub-query, in order.
    #[must_use]
    pub fn prefetch_stages(mut self, stages: Vec<Box<dyn Extension<Q>>>) -> Self {
        self.prefetch_stages = stages;
        self
    }

    pub fn inspector(&self) -> &Inspector {
        &self.inspector
    }

    /// Every joinable relation under `result`, nested joins included.
    pub fn collect_lazy_join_list<'a>(
        &self,
        result: &'a ResultNode,
        prefix: Option<&str>,
    ) -> Vec<LazyJoin<'a>> {
        let mut out = Vec::new();
        for pair in self.inspector.collect_joins(result) {
            let name = qualify(prefix, pair.hint.name());
            let nested = self.collect_lazy_join_list(pair.result, Some(name.as_str()));
            out.push(LazyJoin {
                name,
                hint: pair.hint,
                result: pair.result,
            });
            out.extend(nested);
        }
        out
    }

    /// Every prefetchable relation under `result`, flattened.
    ///
    /// Descends into prefetched nodes and into the nodes they join, so a
    /// to-many relation anywhere below yields its own qualified entry.
    pub fn collect_lazy_prefetch_list<'a>(
        &self,
        result: &'a ResultNode,
        prefix: Option<&str>,
    ) -> Vec<LazyPrefetch<'a>> {
        let mut out = Vec::new();
        for pair in self.inspector.collect_prefetch_list(result) {
            let name = qualify(prefix, pair.hint.name());
            let nested = self.collect_lazy_prefetch_list(pair.result, Some(name.as_str()));
            let behind_joins: Vec<_> = self
                .collect_lazy_join_list(pair.result, Some(name.as_str()))
                .into_iter()
                .flat_map(|join| {
                    self.collect_lazy_prefetch_list(join.result, Some(join.name.as_str()))
                })
                .collect();
            out.push(LazyPrefetch {
                name,
                hint: pair.hint,
                result: pair.result,
            });
            out.extend(nested);
            out.extend(behind_joins);
        }
        out
    }

    /// Phase 1. Returns the query and the prefetches found behind joins.
    ///
    /// `keep` lists joins that survive ahead of the planned ones.
    fn optimize_join<'a>(
        &self,
        query: Q,
        result: &'a ResultNode,
        keep: Vec<String>,
    ) -> (Q, Vec<LazyPrefetch<'a>>) {
        let joins = self.collect_lazy_join_list(result, None);
        let mut names = keep;
        for join in &joins {
            if !names.contains(&join.name) {
                names.push(join.name.clone());
            }
        }
        let surfaced = joins
            .iter()
            .flat_map(|join| {
                self.collect_lazy_prefetch_list(join.result, Some(join.name.as_str()))
            })
            .collect();

        tracing::debug!(
            target: "aggressivequery::optimizer",
            entity = query.model(),
            joins = ?names,
            "set joins"
        );
        (query.set_joins(names), surfaced)
    }

    /// Phase 2.
    fn optimize_prefetch(&self, query: Q, lazy: &[LazyPrefetch<'_>]) -> Result<Q> {
        let prefetches = lazy
            .iter()
            .map(|lp| self.prefetch(&query, lp))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            target: "aggressivequery::optimizer",
            entity = query.model(),
            prefetches = ?prefetches.iter().map(|p| p.lookup.as_str()).collect::<Vec<_>>(),
            "set prefetches"
        );
        Ok(query.set_prefetches(prefetches))
    }

    fn prefetch(&self, root: &Q, lazy: &LazyPrefetch<'_>) -> Result<Prefetch<Q>> {
        let through = lazy.hint.schema();
        let Some(target) = through.related_entity() else {
            return Err(SchemaError::invalid(format!(
                "prefetch '{}' is not a relation",
                lazy.name
            ))
            .into());
        };

        let (query, lookup, to_attr) = match lazy.hint {
            Hint::Schema(_) => (root.for_entity(target), lazy.name.clone(), None),
            Hint::Custom(custom) => {
                let query = match &custom.payload {
                    Some(payload) => payload.downcast_ref::<Q>().cloned().ok_or_else(|| {
                        ExtensionConfigurationError::new(
                            "custom_prefetch",
                            format!("override '{}' holds a query of another type", lazy.name),
                        )
                    })?,
                    None => root.for_entity(target),
                };
                let lookup = match lazy.name.rsplit_once(SEPARATOR) {
                    Some((parent, _)) => format!("{parent}{SEPARATOR}{}", through.name),
                    None => through.name.clone(),
                };
                (query, lookup, Some(custom.name.clone()))
            }
        };

        // A caller-built sub-query keeps the joins it was handed with.
        let keep = match lazy.hint {
            Hint::Custom(_) => query.joined_paths().to_vec(),
            Hint::Schema(_) => Vec::new(),
        };
        let mut query = query;
        for stage in &self.prefetch_stages {
            query = stage.apply(query, &lazy.name);
        }
        let (query, _) = self.optimize_join(query, lazy.result, keep);
        let stitch: Vec<String> = through.remote_key().map(str::to_string).into_iter().collect();
        let query = self.optimize_selections(query, lazy.result, &stitch)?;

        Ok(Prefetch {
            lookup,
            query: Some(query),
            to_attr,
        })
    }

    /// Phase 3. A no-op unless selections are enabled.
    pub fn optimize_selections(
        &self,
        query: Q,
        result: &ResultNode,
        externals: &[String],
    ) -> Result<Q> {
        if !self.enable_selections {
            return Ok(query);
        }
        let mut columns = self.inspector.collect_selections(result)?;
        for column in externals {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        tracing::debug!(
            target: "aggressivequery::optimizer",
            entity = query.model(),
            ?columns,
            "restrict columns"
        );
        Ok(query.restrict_columns(columns))
    }
}

impl<Q: QuerySet> Optimize<Q> for QueryOptimizer<Q> {
    #[tracing::instrument(level = "debug", skip_all, fields(entity = query.model()))]
    fn optimize(&self, query: Q, result: &ResultNode) -> Result<Q> {
        let (query, surfaced) = self.optimize_join(query, result, Vec::new());
        let mut lazy = self.collect_lazy_prefetch_list(result, None);
        lazy.extend(surfaced);
        let query = self.optimize_prefetch(query, &lazy)?;
        self.optimize_selections(query, result, &[])
    }
}

impl<Q: QuerySet> fmt::Debug for QueryOptimizer<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptimizer")
            .field("enable_selections", &self.enable_selections)
            .field("prefetch_stages", &self.prefetch_stages)
            .finish_non_exhaustive()
    }
}

/// Removes excluded subtrees, then delegates to `inner`.
pub struct SkipFilter<Q: QuerySet> {
    inner: Box<dyn Optimize<Q>>,
    skip: SkipTree,
}

impl<Q: QuerySet> SkipFilter<Q> {
    pub fn new(inner: Box<dyn Optimize<Q>>, skip: SkipTree) -> Self {
        Self { inner, skip }
    }

    pub fn skip(&self) -> &SkipTree {
        &self.skip
    }

    pub fn inner(&self) -> &dyn Optimize<Q> {
        self.inner.as_ref()
    }
}

impl<Q: QuerySet> Optimize<Q> for SkipFilter<Q> {
    fn optimize(&self, query: Q, result: &ResultNode) -> Result<Q> {
        tracing::debug!(
            target: "aggressivequery::optimizer",
            skip = ?self.skip.paths(),
            "skip filter"
        );
        let pruned = result.excluded(&self.skip);
        self.inner.optimize(query, &pruned)
    }
}
