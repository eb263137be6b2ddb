//! Relation inspection: which relations join, which prefetch, which columns load.

use crate::hints::{Hint, SchemaHintCache};
use crate::structures::ResultNode;
use aggressivequery_core::Result;
use std::sync::Arc;

/// A relation hint and the subresult selected through it.
#[derive(Debug, Clone, Copy)]
pub struct Pair<'a> {
    pub hint: &'a Hint,
    pub result: &'a ResultNode,
}

/// Can be folded into the parent query with a join (to-one, schema-derived).
pub fn is_joinable(hint: &Hint) -> bool {
    match hint {
        Hint::Schema(h) => h.kind().is_some_and(|k| k.is_to_one()),
        Hint::Custom(_) => false,
    }
}

/// Must be loaded by a separate batched query.
pub fn is_prefetchable(hint: &Hint) -> bool {
    match hint {
        Hint::Schema(h) => h.kind().is_some_and(|k| k.is_to_many()),
        Hint::Custom(_) => true,
    }
}

#[derive(Debug, Clone)]
pub struct Inspector {
    hints: Arc<SchemaHintCache>,
}

impl Inspector {
    pub fn new(hints: Arc<SchemaHintCache>) -> Self {
        Self { hints }
    }

    pub fn depth(&self, result: &ResultNode) -> usize {
        result.depth()
    }

    /// To-one relations with a selected subresult.
    pub fn collect_joins<'a>(&self, result: &'a ResultNode) -> Vec<Pair<'a>> {
        pairs(result, is_joinable)
    }

    /// To-many relations and overrides with a selected subresult.
    pub fn collect_prefetch_list<'a>(&self, result: &'a ResultNode) -> Vec<Pair<'a>> {
        pairs(result, is_prefetchable)
    }

    /// Columns to load for `result`, joined columns as `rel__col`.
    ///
    /// Forward relations that are not joined (bare, or prefetched through an
    /// override) contribute their foreign-key column, which the prefetch is
    /// stitched back on. Joined forward relations recurse. Joined reverse
    /// relations load every plain column of their target: the backend cannot
    /// narrow the projection of an object reached through a reverse
    /// one-to-one.
    pub fn collect_selections(&self, result: &ResultNode) -> Result<Vec<String>> {
        let mut columns: Vec<String> = result.fields.iter().map(|h| h.name().to_string()).collect();
        let joins = self.collect_joins(result);

        for hint in &result.related {
            let joined = joins.iter().any(|pair| pair.hint.name() == hint.name());
            if joined {
                continue;
            }
            if let Some(key) = hint.local_key() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.to_string());
                }
            }
        }

        for pair in joins {
            let nested = if pair.hint.is_reverse_related() {
                match pair.hint.related_entity() {
                    Some(target) => self
                        .hints
                        .load(target)?
                        .non_relations()
                        .map(|h| h.name.clone())
                        .collect(),
                    None => Vec::new(),
                }
            } else {
                self.collect_selections(pair.result)?
            };
            columns.extend(
                nested
                    .into_iter()
                    .map(|column| format!("{}__{}", pair.hint.name(), column)),
            );
        }

        Ok(columns)
    }
}

fn pairs<'a>(result: &'a ResultNode, wanted: fn(&Hint) -> bool) -> Vec<Pair<'a>> {
    result
        .subresults
        .iter()
        .filter_map(|sub| {
            result
                .relations()
                .find(|hint| hint.name() == sub.name && wanted(hint))
                .map(|hint| Pair { hint, result: sub })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::HintExtractor;
    use aggressivequery_core::{EntityDef, RelationDef, Schema};

    fn setup() -> (HintExtractor, Inspector) {
        let schema = Schema::new()
            .entity(EntityDef::new("customer").columns(&["name"]))
            .entity(
                EntityDef::new("profile")
                    .columns(&["bio"])
                    .relation(RelationDef::one_to_one("customer", "customer").related_name("profile")),
            )
            .entity(
                EntityDef::new("order")
                    .columns(&["name"])
                    .relation(RelationDef::foreign_key("customer", "customer").related_name("orders")),
            )
            .entity(
                EntityDef::new("item")
                    .columns(&["name"])
                    .relation(RelationDef::foreign_key("order", "order").related_name("items")),
            );
        let hints = Arc::new(SchemaHintCache::new(Arc::new(schema)));
        (HintExtractor::new(Arc::clone(&hints)), Inspector::new(hints))
    }

    fn names(pairs: &[Pair<'_>]) -> Vec<String> {
        pairs.iter().map(|p| p.hint.name().to_string()).collect()
    }

    #[test]
    fn to_one_joins_and_to_many_prefetches() {
        let (extractor, inspector) = setup();
        let result = extractor
            .extract("order", &["name", "customer__name", "items__name"])
            .unwrap();
        assert_eq!(names(&inspector.collect_joins(&result)), vec!["customer"]);
        assert_eq!(names(&inspector.collect_prefetch_list(&result)), vec!["items"]);
        assert_eq!(inspector.depth(&result), 2);
    }

    #[test]
    fn relation_without_subresult_is_neither() {
        let (extractor, inspector) = setup();
        let result = extractor.extract("order", &["customer", "items"]).unwrap();
        assert!(inspector.collect_joins(&result).is_empty());
        assert!(inspector.collect_prefetch_list(&result).is_empty());
    }

    #[test]
    fn selections_cover_joined_columns_and_bare_foreign_keys() {
        let (extractor, inspector) = setup();
        let joined = extractor
            .extract("order", &["name", "customer__name", "items__name"])
            .unwrap();
        assert_eq!(
            inspector.collect_selections(&joined).unwrap(),
            vec!["name", "customer__name"]
        );

        let bare = extractor.extract("order", &["customer"]).unwrap();
        assert_eq!(inspector.collect_selections(&bare).unwrap(), vec!["customer_id"]);
    }

    #[test]
    fn joined_reverse_one_to_one_loads_every_plain_column() {
        let (extractor, inspector) = setup();
        let result = extractor.extract("customer", &["profile__bio"]).unwrap();
        assert_eq!(names(&inspector.collect_joins(&result)), vec!["profile"]);
        assert_eq!(
            inspector.collect_selections(&result).unwrap(),
            vec!["profile__id", "profile__bio"]
        );
    }
}
