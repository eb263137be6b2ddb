//! AggressiveQuery - fetch exactly what a selection asks for.
//!
//! Given a base query and a list of `__`-separated selection paths,
//! AggressiveQuery decides which relations to join, which to load with a
//! batched follow-up query, and (in more-specific mode) which columns to
//! project. Wildcards are expanded through the schema graph without
//! looping back over relations already on the path.
//!
//! # Quick Start
//!
//! ```
//! use aggressivequery::prelude::*;
//! use std::sync::Arc;
//!
//! let schema = Arc::new(
//!     Schema::new()
//!         .entity(EntityDef::new("order").columns(&["name"]))
//!         .entity(
//!             EntityDef::new("item")
//!                 .columns(&["name"])
//!                 .relation(RelationDef::foreign_key("order", "order").related_name("items")),
//!         ),
//! );
//! let extractor = HintExtractor::new(Arc::new(SchemaHintCache::new(schema.clone())));
//!
//! let query = build_optimized_query(
//!     &extractor,
//!     Select::new(schema, "order"),
//!     &["name", "items__name"],
//!     PlannerConfig::default(),
//! )
//! .unwrap();
//! assert_eq!(query.to_query().unwrap().round_trips().unwrap(), 2);
//! ```
//!
//! # Extensions
//!
//! - `prefetch_filter`: rewrite the sub-query of one prefetch path
//! - `skip_filter`: leave paths out of the optimized query
//! - `custom_prefetch`: fetch a relation through a caller-built sub-query

pub mod aggressive;
pub mod config;

pub use aggressive::{
    AggressiveQuery, build_optimized_query, build_optimized_query_with_extensions,
};
pub use config::PlannerConfig;

pub use aggressivequery_core::{
    ConfigError, EntityDef, EntityName, Error, ExtensionConfigurationError, FieldDescriptor,
    InvalidSelectionError, RelationDef, RelationDescriptor, RelationDirection, RelationshipKind,
    Result, Schema, SchemaError, SchemaErrorKind, SchemaProvider, Value,
};
pub use aggressivequery_planner::{
    CustomHint, CustomHints, CustomKind, CustomPrefetchExtension, Extension, ExtensionArgs,
    ExtensionContext, ExtensionKind, ExtensionRegistry, Hint, HintExtractor, HintIterator,
    HintMap, Inspector, Optimize, PrefetchFilterExtension, PrefetchFilterFn, QueryOptimizer,
    ResultNode, SchemaHint, SchemaHintCache, SkipFilter, SkipFilterExtension, SkipTree,
    more_specific_selection, validate_selection,
};
pub use aggressivequery_query::{Dialect, Expr, Prefetch, QuerySet, Select};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        AggressiveQuery, EntityDef, Error, Expr, HintExtractor, PlannerConfig, Prefetch,
        QuerySet, RelationDef, Result, Schema, SchemaHintCache, Select, build_optimized_query,
    };
}
