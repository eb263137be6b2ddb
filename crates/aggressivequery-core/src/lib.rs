//! Core types for AggressiveQuery.
//!
//! This crate provides the foundations shared by the planner and the query layer:
//!
//! - `Error` taxonomy and the crate-wide `Result` alias
//! - `RelationshipKind` / `RelationDirection` cardinality metadata
//! - `EntityDef` / `RelationDef` declarations and the `Schema` registry
//! - `SchemaProvider`, the contract the planner reflects entities through
//! - `Value` for bound query parameters

pub mod error;
pub mod relationship;
pub mod schema;
pub mod value;

pub use error::{
    ConfigError, Error, ExtensionConfigurationError, InvalidSelectionError, Result, SchemaError,
    SchemaErrorKind,
};
pub use relationship::{EntityName, RelationDef, RelationDirection, RelationshipKind};
pub use schema::{EntityDef, FieldDescriptor, RelationDescriptor, Schema, SchemaProvider};
pub use value::Value;
