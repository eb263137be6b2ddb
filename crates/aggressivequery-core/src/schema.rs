//! Entity declarations and the in-memory schema registry.

use crate::error::{Result, SchemaError};
use crate::relationship::{EntityName, RelationDef, RelationDirection, RelationshipKind};
use serde::Serialize;
use std::collections::HashSet;

/// Declaration of one entity type: its columns and the relations it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    /// Entity (and table) name.
    pub name: EntityName,
    /// Primary key column, always the first column.
    pub primary_key: &'static str,
    /// Plain columns, in declaration order.
    pub columns: Vec<&'static str>,
    /// Forward relations, in declaration order.
    pub relations: Vec<RelationDef>,
}

impl EntityDef {
    /// Declare an entity with an implicit `id` primary key.
    pub fn new(name: EntityName) -> Self {
        Self {
            name,
            primary_key: "id",
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    #[must_use]
    pub fn primary_key(mut self, column: &'static str) -> Self {
        self.primary_key = column;
        self
    }

    #[must_use]
    pub fn columns(mut self, columns: &[&'static str]) -> Self {
        self.columns.extend_from_slice(columns);
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Every physical column: primary key, plain columns, then foreign keys.
    pub fn concrete_columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(1 + self.columns.len() + self.relations.len());
        columns.push(self.primary_key.to_string());
        columns.extend(self.columns.iter().map(|c| (*c).to_string()));
        columns.extend(self.relations.iter().filter_map(RelationDef::local_key_column));
        columns
    }
}

/// Relation half of a [`FieldDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationDescriptor {
    pub kind: RelationshipKind,
    pub direction: RelationDirection,
    pub target: EntityName,
    /// Accessor of the opposite side, on `target`.
    pub related_name: String,
    /// Foreign-key column on this entity (forward to-one only).
    pub local_key: Option<String>,
    /// Foreign-key column on `target` pointing back here (reverse, non many-to-many).
    pub remote_key: Option<String>,
}

/// One field as reported by a [`SchemaProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Secondary lookup names resolving to this field.
    pub aliases: Vec<String>,
    pub relation: Option<RelationDescriptor>,
}

impl FieldDescriptor {
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            relation: None,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    /// Does `name` address this field (by name or alias)?
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// Reflects entity types into field descriptors.
pub trait SchemaProvider: Send + Sync {
    /// Every column and relation of `entity`, including reverse relations.
    fn fields(&self, entity: EntityName) -> Result<Vec<FieldDescriptor>>;
}

/// Registry of entity declarations.
///
/// Reverse relations are derived on demand from the forward relations of
/// every registered entity, so registration order does not matter.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: Vec<EntityDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity (builder form).
    #[must_use]
    pub fn entity(mut self, def: EntityDef) -> Self {
        self.register(def);
        self
    }

    pub fn register(&mut self, def: EntityDef) {
        self.entities.push(def);
    }

    pub fn get(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Like [`Schema::get`], failing with `EntityNotFound`.
    pub fn lookup(&self, name: &str) -> Result<&EntityDef> {
        self.get(name)
            .ok_or_else(|| SchemaError::entity_not_found(name).into())
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.iter()
    }

    /// Resolve a relation accessor (name or alias) on `entity`.
    pub fn relation(&self, entity: EntityName, name: &str) -> Result<RelationDescriptor> {
        self.fields(entity)?
            .into_iter()
            .find(|f| f.answers_to(name))
            .and_then(|f| f.relation)
            .ok_or_else(|| SchemaError::field_not_found(entity, name).into())
    }

    /// Check every entity for dangling targets and accessor clashes.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for def in &self.entities {
            if !names.insert(def.name) {
                return Err(
                    SchemaError::invalid(format!("entity '{}' registered twice", def.name)).into(),
                );
            }
            self.fields(def.name)?;
        }
        Ok(())
    }
}

/// Accessor (and optional alias) of the reverse side of `rel`, owned by `owner`.
fn reverse_accessor(owner: EntityName, rel: &RelationDef) -> (String, Option<String>) {
    if let Some(name) = rel.related_name {
        return (name.to_string(), None);
    }
    if rel.kind == RelationshipKind::OneToOne {
        (owner.to_string(), None)
    } else {
        (format!("{owner}_set"), Some(owner.to_string()))
    }
}

impl SchemaProvider for Schema {
    fn fields(&self, entity: EntityName) -> Result<Vec<FieldDescriptor>> {
        let def = self.lookup(entity)?;

        let mut fields = vec![FieldDescriptor::column(def.primary_key)];
        fields.extend(def.columns.iter().map(|c| FieldDescriptor::column(*c)));

        for rel in &def.relations {
            if self.get(rel.target).is_none() {
                return Err(SchemaError::invalid(format!(
                    "relation '{}.{}' targets unknown entity '{}'",
                    def.name, rel.name, rel.target
                ))
                .into());
            }
            fields.push(FieldDescriptor {
                name: rel.name.to_string(),
                aliases: Vec::new(),
                relation: Some(RelationDescriptor {
                    kind: rel.kind,
                    direction: RelationDirection::Forward,
                    target: rel.target,
                    related_name: reverse_accessor(def.name, rel).0,
                    local_key: rel.local_key_column(),
                    remote_key: None,
                }),
            });
        }

        for owner in &self.entities {
            for rel in owner.relations.iter().filter(|r| r.target == def.name) {
                let (accessor, alias) = reverse_accessor(owner.name, rel);
                fields.push(FieldDescriptor {
                    name: accessor,
                    aliases: alias.into_iter().collect(),
                    relation: Some(RelationDescriptor {
                        kind: rel.kind.inverse(),
                        direction: RelationDirection::Reverse,
                        target: owner.name,
                        related_name: rel.name.to_string(),
                        local_key: None,
                        remote_key: rel.local_key_column(),
                    }),
                });
            }
        }

        let mut seen = HashSet::new();
        for field in &fields {
            for name in std::iter::once(&field.name).chain(&field.aliases) {
                if !seen.insert(name.as_str()) {
                    return Err(SchemaError::invalid(format!(
                        "entity '{}' exposes '{}' more than once",
                        def.name, name
                    ))
                    .into());
                }
            }
        }

        tracing::trace!(
            target: "aggressivequery::schema",
            entity,
            fields = fields.len(),
            "described entity"
        );
        Ok(fields)
    }
}
