//! Shared schema fixtures for the integration tests.

#![allow(dead_code)]

use aggressivequery::{
    EntityDef, EntityName, HintExtractor, PlannerConfig, RelationDef, Schema, SchemaHintCache,
    Select,
};
use std::sync::Arc;

/// customer ← customerkarma (one-to-one), customerposition (two FKs),
/// order (many-to-many) ← item ← subitem.
pub fn shop_schema() -> Schema {
    Schema::new()
        .entity(EntityDef::new("customer").columns(&["name", "memo"]))
        .entity(
            EntityDef::new("customerkarma")
                .columns(&["karma", "memo3"])
                .relation(RelationDef::one_to_one("customer", "customer").related_name("karma")),
        )
        .entity(
            EntityDef::new("customerposition")
                .columns(&["position"])
                .relation(RelationDef::foreign_key("customer", "customer"))
                .relation(
                    RelationDef::foreign_key("referrer", "customer")
                        .related_name("referred_positions"),
                ),
        )
        .entity(
            EntityDef::new("order")
                .columns(&["name"])
                .relation(RelationDef::many_to_many("customers", "customer").related_name("orders")),
        )
        .entity(
            EntityDef::new("item")
                .columns(&["name", "price"])
                .relation(RelationDef::foreign_key("order", "order").related_name("items")),
        )
        .entity(
            EntityDef::new("subitem")
                .columns(&["name"])
                .relation(RelationDef::foreign_key("item", "item").related_name("subitems")),
        )
}

/// A single self-referential entity.
pub fn node_schema() -> Schema {
    Schema::new().entity(
        EntityDef::new("node")
            .columns(&["name"])
            .relation(RelationDef::foreign_key("parent", "node").related_name("children")),
    )
}

pub struct Fixture {
    pub schema: Arc<Schema>,
    pub extractor: HintExtractor,
}

impl Fixture {
    pub fn new(schema: Schema) -> Self {
        let schema = Arc::new(schema);
        let hints = Arc::new(SchemaHintCache::new(schema.clone()));
        Self {
            schema,
            extractor: HintExtractor::new(hints),
        }
    }

    pub fn shop() -> Self {
        Self::new(shop_schema())
    }

    pub fn nodes() -> Self {
        Self::new(node_schema())
    }

    pub fn select(&self, entity: EntityName) -> Select {
        Select::new(self.schema.clone(), entity)
    }
}

pub fn strict() -> PlannerConfig {
    PlannerConfig::default().more_specific(true)
}
