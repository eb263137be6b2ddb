//! Selection-driven query planning for AggressiveQuery.
//!
//! `aggressivequery-planner` turns a list of `__`-separated selection paths
//! into join, prefetch and column directives on a [`QuerySet`].
//!
//! # Pipeline
//!
//! - **Hints**: [`SchemaHintCache`] reflects each entity once into a [`HintMap`].
//! - **Extraction**: [`HintExtractor`] walks the paths through the schema graph,
//!   suppressing wildcard cycles, and classifies the tree into a [`ResultNode`].
//! - **Inspection**: [`Inspector`] decides which relations join and which prefetch.
//! - **Optimization**: [`QueryOptimizer`] applies the directives, wrapped by any
//!   optimizer-kind extensions such as the skip filter.
//!
//! [`QuerySet`]: aggressivequery_query::QuerySet

pub mod extensions;
pub mod extraction;
pub mod hints;
pub mod inspector;
pub mod optimizer;
pub mod selection;
pub mod structures;

pub use extensions::{
    CustomPrefetchExtension, Extension, ExtensionArgs, ExtensionContext, ExtensionKind,
    ExtensionRegistry, PrefetchFilterExtension, PrefetchFilterFn, SkipFilterExtension,
};
pub use extraction::{CustomHints, HintExtractor};
pub use hints::{
    CustomHint, CustomKind, CustomScope, Hint, HintBacking, HintIterator, HintMap, SchemaHint,
    SchemaHintCache, Token,
};
pub use inspector::{Inspector, Pair, is_joinable, is_prefetchable};
pub use optimizer::{LazyJoin, LazyPrefetch, Optimize, QueryOptimizer, SkipFilter};
pub use selection::{SEPARATOR, WILDCARD, more_specific_selection, validate_path, validate_selection};
pub use structures::{ResultNode, SkipTree, TmpResult};
