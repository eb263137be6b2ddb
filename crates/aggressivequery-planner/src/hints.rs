//! Field hints: per-entity descriptors, their cache, and token resolution.
//!
//! A [`Hint`] says what a selection name means on one entity: a plain column,
//! a forward relation (this entity owns the foreign key) or a reverse one.
//! Hints are computed once per entity by [`SchemaHintCache`] and shared
//! read-only afterwards.

use aggressivequery_core::{
    EntityName, FieldDescriptor, RelationDescriptor, RelationDirection, RelationshipKind, Result,
    SchemaProvider,
};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

// ============================================================================
// Hints
// ============================================================================

/// Schema-derived descriptor of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaHint {
    pub name: String,
    pub relation: Option<RelationDescriptor>,
}

impl SchemaHint {
    pub fn from_field(field: FieldDescriptor) -> Self {
        Self {
            name: field.name,
            relation: field.relation,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    pub fn is_reverse_related(&self) -> bool {
        self.relation
            .as_ref()
            .is_some_and(|r| r.direction == RelationDirection::Reverse)
    }

    pub fn related_entity(&self) -> Option<EntityName> {
        self.relation.as_ref().map(|r| r.target)
    }

    /// Accessor of the opposite side, on the related entity.
    pub fn related_name(&self) -> Option<&str> {
        self.relation.as_ref().map(|r| r.related_name.as_str())
    }

    pub fn kind(&self) -> Option<RelationshipKind> {
        self.relation.as_ref().map(|r| r.kind)
    }

    /// Foreign-key column on this entity.
    pub fn local_key(&self) -> Option<&str> {
        self.relation.as_ref().and_then(|r| r.local_key.as_deref())
    }

    /// Foreign-key column on the related entity pointing back here.
    pub fn remote_key(&self) -> Option<&str> {
        self.relation.as_ref().and_then(|r| r.remote_key.as_deref())
    }
}

/// What a caller-supplied override replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomKind {
    Prefetch,
}

impl CustomKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            CustomKind::Prefetch => "prefetch",
        }
    }
}

/// Caller-supplied override standing in for a schema relation.
///
/// Reachable only by its exact name. `through` is the real relation the
/// override traverses; `payload` is the replacement sub-query, if any.
pub struct CustomHint {
    pub name: String,
    pub kind: CustomKind,
    pub through: Arc<SchemaHint>,
    pub payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for CustomHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomHint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("through", &self.through.name)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// A selected name: schema-derived or caller-supplied.
#[derive(Debug, Clone)]
pub enum Hint {
    Schema(Arc<SchemaHint>),
    Custom(Arc<CustomHint>),
}

impl Hint {
    pub fn name(&self) -> &str {
        match self {
            Hint::Schema(h) => &h.name,
            Hint::Custom(c) => &c.name,
        }
    }

    /// The schema relation behind this hint.
    pub fn schema(&self) -> &SchemaHint {
        match self {
            Hint::Schema(h) => h,
            Hint::Custom(c) => &c.through,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Hint::Custom(_))
    }

    pub fn is_relation(&self) -> bool {
        match self {
            Hint::Schema(h) => h.is_relation(),
            Hint::Custom(_) => true,
        }
    }

    pub fn is_reverse_related(&self) -> bool {
        self.schema().is_reverse_related()
    }

    pub fn related_entity(&self) -> Option<EntityName> {
        self.schema().related_entity()
    }

    pub fn related_name(&self) -> Option<&str> {
        self.schema().related_name()
    }

    pub fn kind(&self) -> Option<RelationshipKind> {
        self.schema().kind()
    }

    pub fn local_key(&self) -> Option<&str> {
        self.schema().local_key()
    }

    pub fn remote_key(&self) -> Option<&str> {
        self.schema().remote_key()
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hint::Schema(h) => write!(f, "Hint(name='{}')", h.name),
            Hint::Custom(c) => write!(f, "CustomHint(name='{}')", c.name),
        }
    }
}

impl Serialize for Hint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Hint", 5)?;
        state.serialize_field("name", self.name())?;
        let kind = match self {
            Hint::Schema(_) => "schema",
            Hint::Custom(c) => c.kind.as_str(),
        };
        state.serialize_field("kind", kind)?;
        state.serialize_field("is_relation", &self.is_relation())?;
        state.serialize_field("is_reverse_related", &self.is_reverse_related())?;
        state.serialize_field("related_entity", &self.related_entity())?;
        state.end()
    }
}

// ============================================================================
// Hint map and cache
// ============================================================================

/// Every hint of one entity, in declaration order, addressable by name or alias.
#[derive(Debug)]
pub struct HintMap {
    entity: EntityName,
    hints: Vec<Arc<SchemaHint>>,
    index: HashMap<String, usize>,
}

impl HintMap {
    pub fn from_fields(entity: EntityName, fields: Vec<FieldDescriptor>) -> Self {
        let mut hints = Vec::with_capacity(fields.len());
        let mut index = HashMap::new();
        for field in fields {
            let slot = hints.len();
            for alias in &field.aliases {
                index.entry(alias.clone()).or_insert(slot);
            }
            index.insert(field.name.clone(), slot);
            hints.push(Arc::new(SchemaHint::from_field(field)));
        }
        Self {
            entity,
            hints,
            index,
        }
    }

    pub fn entity(&self) -> EntityName {
        self.entity
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SchemaHint>> {
        self.index.get(name).map(|&slot| &self.hints[slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SchemaHint>> {
        self.hints.iter()
    }

    pub fn non_relations(&self) -> impl Iterator<Item = &Arc<SchemaHint>> {
        self.hints.iter().filter(|h| !h.is_relation())
    }

    /// Every lookup name, aliases included, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.index.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

/// Backing storage of a [`SchemaHintCache`].
pub type HintBacking = HashMap<EntityName, Arc<HintMap>>;

/// Memoized entity → [`HintMap`] cache.
///
/// Share one cache (behind an `Arc`) across every planner of a process so
/// each entity is reflected once. Population is insert-if-absent: racing
/// loads may both reflect, the first stored map wins.
pub struct SchemaHintCache {
    provider: Arc<dyn SchemaProvider>,
    cache: RwLock<HintBacking>,
}

impl SchemaHintCache {
    pub fn new(provider: Arc<dyn SchemaProvider>) -> Self {
        Self::with_backing(provider, HintBacking::new())
    }

    /// Start from a pre-populated backing map.
    pub fn with_backing(provider: Arc<dyn SchemaProvider>, backing: HintBacking) -> Self {
        Self {
            provider,
            cache: RwLock::new(backing),
        }
    }

    /// Reflect `entity` without touching the cache.
    pub fn extract(&self, entity: EntityName) -> Result<HintMap> {
        let fields = self.provider.fields(entity)?;
        Ok(HintMap::from_fields(entity, fields))
    }

    /// Cached hints of `entity`, reflecting on first access.
    pub fn load(&self, entity: EntityName) -> Result<Arc<HintMap>> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(hints) = cache.get(entity) {
                return Ok(Arc::clone(hints));
            }
        }

        let hints = Arc::new(self.extract(entity)?);
        tracing::debug!(
            target: "aggressivequery::hints",
            entity,
            hints = hints.len(),
            "loaded entity hints"
        );
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(entity).or_insert(hints)))
    }

    pub fn is_loaded(&self, entity: EntityName) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(entity)
    }

    /// Number of entities cached so far.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SchemaHintCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaHintCache")
            .field("entities", &self.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Token iteration
// ============================================================================

/// One selection token at a single level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A field, relation or alias named explicitly.
    Exact(String),
    /// Every relation.
    Relations,
    /// Every plain column.
    NonRelations,
    /// Everything a flat name can reach: the plain columns. Relations are
    /// only reached through a prefix or [`Token::Relations`].
    All,
}

/// Overrides visible at one level, by name.
pub type CustomScope = HashMap<String, Hint>;

/// Resolves tokens against one entity's hints into `(hint, exact)` pairs.
///
/// A hint is yielded at most once per iterator, across all of its tokens.
/// Exact names see overrides first; wildcards only see schema hints.
#[derive(Debug)]
pub struct HintIterator<'a> {
    map: &'a HintMap,
    custom: Option<&'a CustomScope>,
    tokens: VecDeque<Token>,
    pending: VecDeque<(Hint, bool)>,
    history: HashSet<String>,
}

impl<'a> HintIterator<'a> {
    pub fn new(map: &'a HintMap, tokens: Vec<Token>) -> Self {
        Self {
            map,
            custom: None,
            tokens: tokens.into(),
            pending: VecDeque::new(),
            history: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_custom(mut self, custom: Option<&'a CustomScope>) -> Self {
        self.custom = custom;
        self
    }

    /// Same hints and overrides, new tokens, empty history.
    ///
    /// Each relation prefix is rescanned independently so that a relation
    /// reached both by `*__x` and `rel__y` descends under both prefixes.
    pub fn rescan(&self, tokens: Vec<Token>) -> Self {
        Self::new(self.map, tokens).with_custom(self.custom)
    }

    fn offer(&mut self, hint: Hint, exact: bool) {
        if self.history.insert(hint.name().to_string()) {
            self.pending.push_back((hint, exact));
        }
    }

    fn expand(&mut self, token: Token) {
        let map = self.map;
        match token {
            Token::Exact(name) => {
                let hint = self
                    .custom
                    .and_then(|scope| scope.get(&name).cloned())
                    .or_else(|| map.get(&name).map(|h| Hint::Schema(Arc::clone(h))));
                if let Some(hint) = hint {
                    self.offer(hint, true);
                }
            }
            Token::Relations | Token::NonRelations | Token::All => {
                for hint in map.iter() {
                    let wanted = match token {
                        Token::Relations => hint.is_relation(),
                        _ => !hint.is_relation(),
                    };
                    if wanted {
                        self.offer(Hint::Schema(Arc::clone(hint)), false);
                    }
                }
            }
        }
    }
}

impl Iterator for HintIterator<'_> {
    type Item = (Hint, bool);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            let token = self.tokens.pop_front()?;
            self.expand(token);
        }
    }
}
