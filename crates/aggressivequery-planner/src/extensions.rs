//! Pluggable optimizer behaviors.
//!
//! Extensions are looked up by name (to run their setup) and by kind (to be
//! consulted by the stage they hook into):
//!
//! - [`ExtensionKind::Prefetch`]: rewrites prefetch sub-queries (`apply`)
//! - [`ExtensionKind::Extraction`]: overlays custom hints (`custom_hints`)
//! - [`ExtensionKind::Optimizer`]: wraps the optimizer (`wrap`)

use crate::extraction::CustomHints;
use crate::hints::{CustomHint, CustomKind, Hint, SchemaHintCache};
use crate::optimizer::{Optimize, SkipFilter};
use crate::selection::{SEPARATOR, validate_path};
use crate::structures::SkipTree;
use aggressivequery_core::{EntityName, Error, ExtensionConfigurationError, Result};
use aggressivequery_query::{Prefetch, QuerySet};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Stage an extension hooks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    Prefetch,
    Extraction,
    Optimizer,
}

/// A caller-supplied rewrite of a prefetch sub-query.
pub type PrefetchFilterFn<Q> = Arc<dyn Fn(Q) -> Q + Send + Sync>;

/// Arguments passed to [`Extension::setup`].
pub enum ExtensionArgs<Q> {
    /// Prefetch path → filter, in registration order.
    PrefetchFilters(Vec<(String, PrefetchFilterFn<Q>)>),
    /// `__`-separated paths.
    Paths(Vec<String>),
    /// Override path → replacement prefetch.
    Prefetches(Vec<(String, Prefetch<Q>)>),
}

impl<Q> fmt::Debug for ExtensionArgs<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionArgs::PrefetchFilters(filters) => f
                .debug_tuple("PrefetchFilters")
                .field(&filters.iter().map(|(p, _)| p).collect::<Vec<_>>())
                .finish(),
            ExtensionArgs::Paths(paths) => f.debug_tuple("Paths").field(paths).finish(),
            ExtensionArgs::Prefetches(prefetches) => f
                .debug_tuple("Prefetches")
                .field(&prefetches.iter().map(|(p, _)| p).collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// What an extension can see during setup.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionContext<'a> {
    /// Entity of the query being extended.
    pub root: EntityName,
    pub hints: &'a SchemaHintCache,
}

/// A pluggable behavior.
///
/// `setup` runs on the copy owned by a freshly cloned query, so extensions
/// may accumulate state without affecting the query they were cloned from.
pub trait Extension<Q: QuerySet>: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ExtensionKind;

    fn setup(&mut self, cx: &ExtensionContext<'_>, args: ExtensionArgs<Q>) -> Result<()>;

    /// Rewrite the prefetch sub-query fetched under `path`.
    fn apply(&self, subquery: Q, _path: &str) -> Q {
        subquery
    }

    /// Wrap the optimizer.
    fn wrap(&self, inner: Box<dyn Optimize<Q>>) -> Box<dyn Optimize<Q>> {
        inner
    }

    /// Hints to overlay during extraction.
    fn custom_hints(&self) -> Option<&CustomHints> {
        None
    }

    fn clone_box(&self) -> Box<dyn Extension<Q>>;
}

impl<Q: QuerySet> Clone for Box<dyn Extension<Q>> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

fn config_error(extension: &str, message: impl Into<String>) -> Error {
    ExtensionConfigurationError::new(extension, message).into()
}

fn unexpected_args<Q>(extension: &str, args: &ExtensionArgs<Q>) -> Error {
    config_error(extension, format!("unsupported arguments {args:?}"))
}

/// `path` with every alias replaced by the name it stands for.
///
/// Segments the schema does not know (override names, typos) are kept as
/// written, and nothing below them is resolved.
fn canonical_path(cx: &ExtensionContext<'_>, path: &str) -> Result<String> {
    let mut entity = Some(cx.root);
    let mut segments = Vec::new();
    for segment in path.split(SEPARATOR) {
        let hint = match entity {
            Some(current) => cx.hints.load(current)?.get(segment).cloned(),
            None => None,
        };
        match hint {
            Some(hint) => {
                segments.push(hint.name.clone());
                entity = hint.related_entity();
            }
            None => {
                segments.push(segment.to_string());
                entity = None;
            }
        }
    }
    Ok(segments.join(SEPARATOR))
}

// ============================================================================
// Registry
// ============================================================================

/// Extensions indexed by name and by kind.
pub struct ExtensionRegistry<Q: QuerySet> {
    slots: Vec<Box<dyn Extension<Q>>>,
    by_name: HashMap<&'static str, usize>,
    by_kind: HashMap<ExtensionKind, Vec<usize>>,
}

impl<Q: QuerySet> ExtensionRegistry<Q> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_name: HashMap::new(),
            by_kind: HashMap::new(),
        }
    }

    /// `prefetch_filter`, `skip_filter` and `custom_prefetch`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.install(Box::new(PrefetchFilterExtension::<Q>::default()));
        registry.install(Box::new(SkipFilterExtension::default()));
        registry.install(Box::new(CustomPrefetchExtension::default()));
        registry
    }

    /// Add an extension. Fails if the name is taken.
    pub fn register(&mut self, extension: Box<dyn Extension<Q>>) -> Result<()> {
        let name = extension.name();
        if self.by_name.contains_key(name) {
            return Err(config_error(name, "an extension with this name is already registered"));
        }
        self.install(extension);
        Ok(())
    }

    /// Add an extension, replacing any extension of the same name.
    pub fn replace(&mut self, extension: Box<dyn Extension<Q>>) {
        if let Some(&slot) = self.by_name.get(extension.name()) {
            tracing::warn!(
                target: "aggressivequery::extensions",
                name = extension.name(),
                "replacing registered extension"
            );
            let old_kind = self.slots[slot].kind();
            if let Some(slots) = self.by_kind.get_mut(&old_kind) {
                slots.retain(|&s| s != slot);
            }
            self.by_kind.entry(extension.kind()).or_default().push(slot);
            self.slots[slot] = extension;
        } else {
            self.install(extension);
        }
    }

    fn install(&mut self, extension: Box<dyn Extension<Q>>) {
        let slot = self.slots.len();
        self.by_name.insert(extension.name(), slot);
        self.by_kind.entry(extension.kind()).or_default().push(slot);
        self.slots.push(extension);
    }

    pub fn with_name(&self, name: &str) -> Option<&dyn Extension<Q>> {
        self.by_name.get(name).map(|&slot| self.slots[slot].as_ref())
    }

    pub fn with_name_mut(&mut self, name: &str) -> Option<&mut Box<dyn Extension<Q>>> {
        let slot = *self.by_name.get(name)?;
        self.slots.get_mut(slot)
    }

    /// Extensions of `kind`, in registration order.
    pub fn with_kind(&self, kind: ExtensionKind) -> impl Iterator<Item = &dyn Extension<Q>> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|&slot| self.slots[slot].as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|e| e.name()).collect()
    }

    /// Overrides of every extraction-kind extension, merged.
    pub fn custom_hints(&self) -> CustomHints {
        let mut merged = CustomHints::new();
        for extension in self.with_kind(ExtensionKind::Extraction) {
            for (parent, scope) in extension.custom_hints().into_iter().flatten() {
                merged
                    .entry(parent.clone())
                    .or_default()
                    .extend(scope.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        merged
    }

    /// Copies of every prefetch-kind extension.
    pub fn prefetch_stages(&self) -> Vec<Box<dyn Extension<Q>>> {
        self.with_kind(ExtensionKind::Prefetch)
            .map(|e| e.clone_box())
            .collect()
    }

    /// `base` wrapped by every optimizer-kind extension, first registered innermost.
    pub fn wrap(&self, base: Box<dyn Optimize<Q>>) -> Box<dyn Optimize<Q>> {
        self.with_kind(ExtensionKind::Optimizer)
            .fold(base, |inner, extension| extension.wrap(inner))
    }
}

impl<Q: QuerySet> Default for ExtensionRegistry<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: QuerySet> Clone for ExtensionRegistry<Q> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            by_name: self.by_name.clone(),
            by_kind: self.by_kind.clone(),
        }
    }
}

impl<Q: QuerySet> fmt::Debug for ExtensionRegistry<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.slots).finish()
    }
}

// ============================================================================
// prefetch_filter
// ============================================================================

/// Filters applied to the prefetch sub-query of a path, in registration order.
pub struct PrefetchFilterExtension<Q> {
    filters: Vec<(String, PrefetchFilterFn<Q>)>,
}

impl<Q> Default for PrefetchFilterExtension<Q> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
        }
    }
}

impl<Q> Clone for PrefetchFilterExtension<Q> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
        }
    }
}

impl<Q> fmt::Debug for PrefetchFilterExtension<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchFilterExtension")
            .field("paths", &self.filters.iter().map(|(p, _)| p).collect::<Vec<_>>())
            .finish()
    }
}

impl<Q: QuerySet> Extension<Q> for PrefetchFilterExtension<Q> {
    fn name(&self) -> &'static str {
        "prefetch_filter"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Prefetch
    }

    fn setup(&mut self, cx: &ExtensionContext<'_>, args: ExtensionArgs<Q>) -> Result<()> {
        let filters = match args {
            ExtensionArgs::PrefetchFilters(filters) => filters,
            other => return Err(unexpected_args("prefetch_filter", &other)),
        };
        let mut resolved = Vec::with_capacity(filters.len());
        for (path, filter) in filters {
            validate_path(&path)?;
            resolved.push((canonical_path(cx, &path)?, filter));
        }
        self.filters.extend(resolved);
        Ok(())
    }

    fn apply(&self, subquery: Q, path: &str) -> Q {
        self.filters
            .iter()
            .filter(|(p, _)| p == path)
            .fold(subquery, |query, (_, filter)| filter(query))
    }

    fn clone_box(&self) -> Box<dyn Extension<Q>> {
        Box::new(self.clone())
    }
}

// ============================================================================
// skip_filter
// ============================================================================

/// Excludes subtrees from the result before optimization.
#[derive(Debug, Clone, Default)]
pub struct SkipFilterExtension {
    skip: SkipTree,
}

impl SkipFilterExtension {
    pub fn skip(&self) -> &SkipTree {
        &self.skip
    }
}

impl<Q: QuerySet> Extension<Q> for SkipFilterExtension {
    fn name(&self) -> &'static str {
        "skip_filter"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Optimizer
    }

    fn setup(&mut self, cx: &ExtensionContext<'_>, args: ExtensionArgs<Q>) -> Result<()> {
        let paths = match args {
            ExtensionArgs::Paths(paths) => paths,
            other => return Err(unexpected_args("skip_filter", &other)),
        };
        for path in &paths {
            validate_path(path)?;
            self.skip.insert(&canonical_path(cx, path)?);
        }
        Ok(())
    }

    fn wrap(&self, inner: Box<dyn Optimize<Q>>) -> Box<dyn Optimize<Q>> {
        if self.skip.is_empty() {
            inner
        } else {
            Box::new(SkipFilter::new(inner, self.skip.clone()))
        }
    }

    fn clone_box(&self) -> Box<dyn Extension<Q>> {
        Box::new(self.clone())
    }
}

// ============================================================================
// custom_prefetch
// ============================================================================

/// Replaces the target of a relation with a caller-supplied prefetch.
///
/// The override is registered under `path`, whose final segment must equal
/// the prefetch's `to_attr`; `Prefetch::lookup` names the relation it
/// traverses on the parent entity.
#[derive(Debug, Clone, Default)]
pub struct CustomPrefetchExtension {
    overrides: CustomHints,
}

impl CustomPrefetchExtension {
    fn register<Q: QuerySet>(
        &mut self,
        cx: &ExtensionContext<'_>,
        path: &str,
        prefetch: Prefetch<Q>,
    ) -> Result<()> {
        const NAME: &str = "custom_prefetch";

        validate_path(path)?;
        let Some(to_attr) = prefetch.to_attr.clone() else {
            return Err(config_error(
                NAME,
                format!("override '{path}' has no to_attr binding"),
            ));
        };
        let (parent, last) = path.rsplit_once(SEPARATOR).unwrap_or(("", path));
        if last != to_attr {
            return Err(config_error(
                NAME,
                format!("to_attr '{to_attr}' does not match the last segment of '{path}'"),
            ));
        }

        let mut entity = cx.root;
        let mut walked = String::new();
        for segment in parent.split(SEPARATOR).filter(|s| !s.is_empty()) {
            let overridden = self
                .overrides
                .get(&walked)
                .and_then(|scope| scope.get(segment))
                .and_then(Hint::related_entity);
            let target = match overridden {
                Some(target) => Some(target),
                None => cx
                    .hints
                    .load(entity)?
                    .get(segment)
                    .and_then(|h| h.related_entity()),
            };
            let Some(target) = target else {
                return Err(config_error(
                    NAME,
                    format!("'{segment}' in '{path}' is not a relation of '{entity}'"),
                ));
            };
            entity = target;
            if !walked.is_empty() {
                walked.push_str(SEPARATOR);
            }
            walked.push_str(segment);
        }

        let hints = cx.hints.load(entity)?;
        let Some(through) = hints.get(&prefetch.lookup).filter(|h| h.is_relation()) else {
            return Err(config_error(
                NAME,
                format!("'{}' is not a relation of '{entity}'", prefetch.lookup),
            ));
        };
        let target = through.related_entity();
        if let Some(query) = &prefetch.query {
            if Some(query.model()) != target {
                return Err(config_error(
                    NAME,
                    format!(
                        "override '{path}' queries '{}' but '{}' leads to '{}'",
                        query.model(),
                        prefetch.lookup,
                        target.unwrap_or_default()
                    ),
                ));
            }
        }

        tracing::debug!(
            target: "aggressivequery::extensions",
            path,
            through = %through.name,
            "registered custom prefetch"
        );
        let hint = Hint::Custom(Arc::new(CustomHint {
            name: to_attr.clone(),
            kind: CustomKind::Prefetch,
            through: Arc::clone(through),
            payload: prefetch
                .query
                .map(|q| Arc::new(q) as Arc<dyn Any + Send + Sync>),
        }));
        self.overrides.entry(walked).or_default().insert(to_attr, hint);
        Ok(())
    }
}

impl<Q: QuerySet> Extension<Q> for CustomPrefetchExtension {
    fn name(&self) -> &'static str {
        "custom_prefetch"
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Extraction
    }

    fn setup(&mut self, cx: &ExtensionContext<'_>, args: ExtensionArgs<Q>) -> Result<()> {
        let prefetches = match args {
            ExtensionArgs::Prefetches(prefetches) => prefetches,
            other => return Err(unexpected_args("custom_prefetch", &other)),
        };
        for (path, prefetch) in prefetches {
            self.register(cx, &path, prefetch)?;
        }
        Ok(())
    }

    fn custom_hints(&self) -> Option<&CustomHints> {
        Some(&self.overrides)
    }

    fn clone_box(&self) -> Box<dyn Extension<Q>> {
        Box::new(self.clone())
    }
}
