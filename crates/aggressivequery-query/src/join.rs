//! JOIN clauses resolved from relation paths.

use crate::expr::{Dialect, Expr};
use aggressivequery_core::{
    EntityName, RelationDirection, Result, Schema, SchemaError, Value,
};

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// A JOIN clause against an aliased table.
#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: JoinType,
    pub table: String,
    pub alias: String,
    pub on: Expr,
}

impl Join {
    pub fn left(table: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Left,
            table: table.into(),
            alias: alias.into(),
            on,
        }
    }

    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        format!(
            " {} {} AS {} ON {}",
            self.join_type.as_str(),
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier(&self.alias),
            self.on.build_with_dialect(dialect, params, offset)
        )
    }
}

/// A join plus the entity reachable under its alias.
#[derive(Debug, Clone)]
pub struct ResolvedJoin {
    /// The relation path, used verbatim as table alias.
    pub path: String,
    pub entity: EntityName,
    pub join: Join,
}

/// Resolve `__`-separated relation paths from `root` into ordered joins.
///
/// Intermediate relations are joined implicitly, each alias at most once.
/// Only to-one relations can be joined.
pub fn resolve_joins(schema: &Schema, root: EntityName, paths: &[String]) -> Result<Vec<ResolvedJoin>> {
    let mut joins: Vec<ResolvedJoin> = Vec::new();

    for path in paths {
        let mut parent_alias = root.to_string();
        let mut parent = root;
        let mut prefix = String::new();

        for segment in path.split("__") {
            if !prefix.is_empty() {
                prefix.push_str("__");
            }
            prefix.push_str(segment);

            if let Some(existing) = joins.iter().find(|j| j.path == prefix) {
                parent = existing.entity;
                parent_alias = existing.path.clone();
                continue;
            }

            let rel = schema.relation(parent, segment)?;
            if !rel.kind.is_to_one() {
                return Err(SchemaError::invalid(format!(
                    "cannot join to-many relation '{prefix}' from '{root}'"
                ))
                .into());
            }

            let target_pk = schema.lookup(rel.target)?.primary_key;
            let on = match rel.direction {
                RelationDirection::Forward => {
                    let Some(local_key) = rel.local_key else {
                        return Err(SchemaError::invalid(format!(
                            "relation '{prefix}' has no foreign key column"
                        ))
                        .into());
                    };
                    Expr::qualified(parent_alias.as_str(), local_key)
                        .eq(Expr::qualified(prefix.as_str(), target_pk))
                }
                RelationDirection::Reverse => {
                    let Some(remote_key) = rel.remote_key else {
                        return Err(SchemaError::invalid(format!(
                            "relation '{prefix}' has no foreign key column"
                        ))
                        .into());
                    };
                    let parent_pk = schema.lookup(parent)?.primary_key;
                    Expr::qualified(prefix.as_str(), remote_key)
                        .eq(Expr::qualified(parent_alias.as_str(), parent_pk))
                }
            };

            tracing::trace!(
                target: "aggressivequery::join",
                path = %prefix,
                table = rel.target,
                "resolved join"
            );
            joins.push(ResolvedJoin {
                path: prefix.clone(),
                entity: rel.target,
                join: Join::left(rel.target, prefix.as_str(), on),
            });
            parent = rel.target;
            parent_alias = prefix.clone();
        }
    }

    Ok(joins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggressivequery_core::{EntityDef, RelationDef};

    fn schema() -> Schema {
        Schema::new()
            .entity(EntityDef::new("customer").columns(&["name"]))
            .entity(
                EntityDef::new("customerkarma")
                    .columns(&["point"])
                    .relation(RelationDef::one_to_one("customer", "customer").related_name("karma")),
            )
            .entity(
                EntityDef::new("order")
                    .columns(&["name"])
                    .relation(RelationDef::foreign_key("buyer", "customer").related_name("orders")),
            )
    }

    fn render(joins: &[ResolvedJoin]) -> String {
        let mut params = Vec::new();
        joins
            .iter()
            .map(|j| j.join.build_with_dialect(Dialect::Postgres, &mut params, 0))
            .collect()
    }

    #[test]
    fn nested_paths_join_intermediates_once() {
        let schema = schema();
        let joins = resolve_joins(
            &schema,
            "order",
            &["buyer__karma".to_string(), "buyer".to_string()],
        )
        .unwrap();
        assert_eq!(joins.len(), 2);
        assert_eq!(
            render(&joins),
            " LEFT JOIN \"customer\" AS \"buyer\" ON \"order\".\"buyer_id\" = \"buyer\".\"id\" \
             LEFT JOIN \"customerkarma\" AS \"buyer__karma\" ON \"buyer__karma\".\"customer_id\" = \"buyer\".\"id\""
        );
    }

    #[test]
    fn to_many_cannot_be_joined() {
        let schema = schema();
        let err = resolve_joins(&schema, "customer", &["orders".to_string()]).unwrap_err();
        assert!(err.to_string().contains("to-many"));
    }
}
