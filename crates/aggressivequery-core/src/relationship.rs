//! Relationship metadata.
//!
//! Relations are declared once, on the entity that physically owns the
//! foreign key (or, for many-to-many, on the side that names the link).
//! The opposite side is discovered by the [`Schema`](crate::Schema) registry
//! and exposed as a reverse relation.

use serde::{Deserialize, Serialize};

/// Entity type handle. Entities are identified by their table name.
pub type EntityName = &'static str;

/// The cardinality of a relation, seen from the side that exposes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// One-to-one: `CustomerKarma` has one `Customer`.
    OneToOne,
    /// Many-to-one: many `Item`s belong to one `Order`.
    #[default]
    ManyToOne,
    /// One-to-many: one `Order` has many `Item`s.
    OneToMany,
    /// Many-to-many: `Order`s have many `Customer`s via a link table.
    ManyToMany,
}

impl RelationshipKind {
    /// At most one related row: can be satisfied by a join.
    pub const fn is_to_one(self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }

    /// A collection of related rows: must be prefetched.
    pub const fn is_to_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// The kind as seen from the other end.
    pub const fn inverse(self) -> Self {
        match self {
            Self::OneToOne => Self::OneToOne,
            Self::ManyToOne => Self::OneToMany,
            Self::OneToMany => Self::ManyToOne,
            Self::ManyToMany => Self::ManyToMany,
        }
    }
}

/// Which side of the relation holds the declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationDirection {
    /// This entity owns the foreign key.
    #[default]
    Forward,
    /// Another entity points here.
    Reverse,
}

/// A forward relation declared on its owning entity.
///
/// ```
/// use aggressivequery_core::RelationDef;
///
/// let rel = RelationDef::foreign_key("order", "order").related_name("items");
/// assert_eq!(rel.local_key_column().as_deref(), Some("order_id"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDef {
    /// Accessor name on the owning entity (e.g., `"order"`).
    pub name: &'static str,

    /// The related entity type (e.g., `"order"`).
    pub target: EntityName,

    /// Cardinality from the owner's side. Always a forward kind.
    pub kind: RelationshipKind,

    /// Foreign-key column on the owner. Defaults to `<name>_id` for to-one kinds.
    pub local_key: Option<&'static str>,

    /// Accessor name of the reverse relation on the target.
    pub related_name: Option<&'static str>,
}

impl RelationDef {
    const fn new(name: &'static str, target: EntityName, kind: RelationshipKind) -> Self {
        Self {
            name,
            target,
            kind,
            local_key: None,
            related_name: None,
        }
    }

    /// Declare a many-to-one foreign key.
    pub const fn foreign_key(name: &'static str, target: EntityName) -> Self {
        Self::new(name, target, RelationshipKind::ManyToOne)
    }

    /// Declare a one-to-one foreign key.
    pub const fn one_to_one(name: &'static str, target: EntityName) -> Self {
        Self::new(name, target, RelationshipKind::OneToOne)
    }

    /// Declare a many-to-many relation. It has no physical column on either entity.
    pub const fn many_to_many(name: &'static str, target: EntityName) -> Self {
        Self::new(name, target, RelationshipKind::ManyToMany)
    }

    /// Set the reverse accessor name exposed on the target.
    pub const fn related_name(mut self, name: &'static str) -> Self {
        self.related_name = Some(name);
        self
    }

    /// Override the foreign-key column name.
    pub const fn local_key(mut self, column: &'static str) -> Self {
        self.local_key = Some(column);
        self
    }

    /// The physical foreign-key column, if the relation has one.
    pub fn local_key_column(&self) -> Option<String> {
        if !self.kind.is_to_one() {
            return None;
        }
        Some(
            self.local_key
                .map_or_else(|| format!("{}_id", self.name), str::to_string),
        )
    }
}
