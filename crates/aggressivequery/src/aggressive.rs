//! The selection-bound query wrapper.

use crate::config::PlannerConfig;
use aggressivequery_core::{EntityName, ExtensionConfigurationError, Result};
use aggressivequery_planner::{
    ExtensionArgs, ExtensionContext, ExtensionRegistry, HintExtractor, Inspector, Optimize,
    PrefetchFilterFn, QueryOptimizer, ResultNode, more_specific_selection, validate_selection,
};
use aggressivequery_query::{Prefetch, QuerySet};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A base query bound to a selection.
///
/// The optimized query is computed on the first [`to_query`](Self::to_query)
/// and reused afterwards. Configuring an extension returns a new
/// `AggressiveQuery` with its own memo; the receiver is left untouched.
pub struct AggressiveQuery<Q: QuerySet> {
    source: Q,
    selection: Vec<String>,
    config: PlannerConfig,
    extractor: HintExtractor,
    extensions: ExtensionRegistry<Q>,
    optimized: OnceLock<Q>,
}

/// Bind `base` to `selection` with the default extensions.
pub fn build_optimized_query<Q: QuerySet, S: AsRef<str>>(
    extractor: &HintExtractor,
    base: Q,
    selection: &[S],
    config: PlannerConfig,
) -> Result<AggressiveQuery<Q>> {
    build_optimized_query_with_extensions(
        extractor,
        base,
        selection,
        config,
        ExtensionRegistry::with_defaults(),
    )
}

/// Bind `base` to `selection` with an explicit extension registry.
///
/// Fails fast on a malformed selection, and on a root entity the schema
/// does not know.
pub fn build_optimized_query_with_extensions<Q: QuerySet, S: AsRef<str>>(
    extractor: &HintExtractor,
    base: Q,
    selection: &[S],
    config: PlannerConfig,
    extensions: ExtensionRegistry<Q>,
) -> Result<AggressiveQuery<Q>> {
    validate_selection(selection)?;
    let selection = if config.more_specific {
        selection.iter().map(|s| s.as_ref().to_string()).collect()
    } else {
        more_specific_selection(selection)
    };

    let extractor = extractor.clone().sorted(config.sorted);
    extractor.hints().load(base.model())?;

    tracing::debug!(
        target: "aggressivequery",
        entity = base.model(),
        more_specific = config.more_specific,
        ?selection,
        "bound selection"
    );
    Ok(AggressiveQuery {
        source: base,
        selection,
        config,
        extractor,
        extensions,
        optimized: OnceLock::new(),
    })
}

impl<Q: QuerySet> AggressiveQuery<Q> {
    pub fn model(&self) -> EntityName {
        self.source.model()
    }

    /// The query the optimizer starts from.
    pub fn source(&self) -> &Q {
        &self.source
    }

    /// The selection after the more-specific expansion, if any.
    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn config(&self) -> PlannerConfig {
        self.config
    }

    pub fn extractor(&self) -> &HintExtractor {
        &self.extractor
    }

    pub fn extensions(&self) -> &ExtensionRegistry<Q> {
        &self.extensions
    }

    /// Run the setup of the extension registered as `name` on a copy.
    pub fn extend(&self, name: &str, args: ExtensionArgs<Q>) -> Result<Self> {
        let mut next = self.clone();
        let hints = Arc::clone(self.extractor.hints());
        let cx = ExtensionContext {
            root: self.source.model(),
            hints: hints.as_ref(),
        };
        let Some(extension) = next.extensions.with_name_mut(name) else {
            return Err(ExtensionConfigurationError::new(
                name,
                format!("no extension named '{name}' is registered"),
            )
            .into());
        };
        extension.setup(&cx, args)?;
        Ok(next)
    }

    /// Rewrite the prefetch sub-query of `path` with `filter`.
    pub fn prefetch_filter<F>(&self, path: &str, filter: F) -> Result<Self>
    where
        F: Fn(Q) -> Q + Send + Sync + 'static,
    {
        self.prefetch_filters(vec![(path.to_string(), Arc::new(filter) as PrefetchFilterFn<Q>)])
    }

    pub fn prefetch_filters(&self, filters: Vec<(String, PrefetchFilterFn<Q>)>) -> Result<Self> {
        self.extend("prefetch_filter", ExtensionArgs::PrefetchFilters(filters))
    }

    /// Leave the given paths out of the optimized query.
    pub fn skip_filter<S: AsRef<str>>(&self, paths: &[S]) -> Result<Self> {
        let paths = paths.iter().map(|p| p.as_ref().to_string()).collect();
        self.extend("skip_filter", ExtensionArgs::Paths(paths))
    }

    /// Fetch `path` through `prefetch` instead of the schema relation.
    pub fn custom_prefetch(&self, path: &str, prefetch: Prefetch<Q>) -> Result<Self> {
        self.custom_prefetches(vec![(path.to_string(), prefetch)])
    }

    pub fn custom_prefetches(&self, prefetches: Vec<(String, Prefetch<Q>)>) -> Result<Self> {
        self.extend("custom_prefetch", ExtensionArgs::Prefetches(prefetches))
    }

    /// The extracted tree, overrides included, before any skip filter.
    pub fn result(&self) -> Result<ResultNode> {
        let custom = self.extensions.custom_hints();
        self.extractor
            .extract_with(self.source.model(), &self.selection, &custom)
    }

    /// The optimizer stack: the base optimizer wrapped by every
    /// optimizer-kind extension.
    pub fn optimizer(&self) -> Box<dyn Optimize<Q>> {
        let inspector = Inspector::new(Arc::clone(self.extractor.hints()));
        let base = QueryOptimizer::new(inspector)
            .enable_selections(self.config.more_specific)
            .prefetch_stages(self.extensions.prefetch_stages());
        self.extensions.wrap(Box::new(base))
    }

    fn optimize(&self) -> Result<Q> {
        let result = self.result()?;
        tracing::debug!(
            target: "aggressivequery",
            entity = self.source.model(),
            depth = result.depth(),
            "optimizing"
        );
        self.optimizer().optimize(self.source.clone(), &result)
    }

    /// The optimized query, computed once.
    pub fn to_query(&self) -> Result<&Q> {
        if let Some(query) = self.optimized.get() {
            return Ok(query);
        }
        let query = self.optimize()?;
        Ok(self.optimized.get_or_init(|| query))
    }

    pub fn into_query(mut self) -> Result<Q> {
        match self.optimized.take() {
            Some(query) => Ok(query),
            None => self.optimize(),
        }
    }

    /// The extracted tree as pretty-printed JSON.
    pub fn pp(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.result()?)?)
    }
}

impl<Q: QuerySet> Clone for AggressiveQuery<Q> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            selection: self.selection.clone(),
            config: self.config,
            extractor: self.extractor.clone(),
            extensions: self.extensions.clone(),
            optimized: OnceLock::new(),
        }
    }
}

impl<Q: QuerySet> fmt::Debug for AggressiveQuery<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggressiveQuery")
            .field("model", &self.source.model())
            .field("selection", &self.selection)
            .field("config", &self.config)
            .field("extensions", &self.extensions)
            .field("optimized", &self.optimized.get().is_some())
            .finish_non_exhaustive()
    }
}
