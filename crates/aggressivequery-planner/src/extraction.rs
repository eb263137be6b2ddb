//! Path drilldown: selection paths → classified result tree.

use crate::hints::{CustomScope, HintIterator, SchemaHintCache, Token};
use crate::selection::{SEPARATOR, WILDCARD, validate_selection};
use crate::structures::{ResultNode, TmpResult};
use aggressivequery_core::{EntityName, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Overrides by parent path (`__`-joined, "" for the root).
pub type CustomHints = HashMap<String, CustomScope>;

/// Walks selection paths through the schema graph.
#[derive(Debug, Clone)]
pub struct HintExtractor {
    hints: Arc<SchemaHintCache>,
    sorted: bool,
}

/// State of one extraction call.
struct Descent<'a> {
    /// `(entity, relation)` pairs entered on the current path, plus `(root, "")`.
    backrefs: HashSet<(EntityName, String)>,
    path: Vec<String>,
    custom: &'a CustomHints,
}

impl HintExtractor {
    pub fn new(hints: Arc<SchemaHintCache>) -> Self {
        Self {
            hints,
            sorted: true,
        }
    }

    /// Sort every level of the result by name (default on).
    #[must_use]
    pub fn sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn hints(&self) -> &Arc<SchemaHintCache> {
        &self.hints
    }

    pub fn extract<S: AsRef<str>>(&self, root: EntityName, selection: &[S]) -> Result<ResultNode> {
        self.extract_with(root, selection, &CustomHints::new())
    }

    /// Extract with caller-supplied overrides visible to exact names.
    #[tracing::instrument(level = "debug", skip(self, selection, custom))]
    pub fn extract_with<S: AsRef<str>>(
        &self,
        root: EntityName,
        selection: &[S],
        custom: &CustomHints,
    ) -> Result<ResultNode> {
        let tmp = self.drilldown(root, selection, custom)?;
        Ok(self.classify(tmp))
    }

    /// Build the unclassified tree for `selection` from `root`.
    pub fn drilldown<S: AsRef<str>>(
        &self,
        root: EntityName,
        selection: &[S],
        custom: &CustomHints,
    ) -> Result<TmpResult> {
        validate_selection(selection)?;
        let names: Vec<String> = selection.iter().map(|s| s.as_ref().to_string()).collect();

        let mut descent = Descent {
            backrefs: HashSet::from([(root, String::new())]),
            path: Vec::new(),
            custom,
        };
        self.drilldown_level(&mut descent, root, &names, 0)
    }

    fn drilldown_level(
        &self,
        descent: &mut Descent<'_>,
        entity: EntityName,
        names: &[String],
        depth: usize,
    ) -> Result<TmpResult> {
        let mut flat = Vec::new();
        let mut nested: Vec<(String, Vec<String>)> = Vec::new();
        for name in names {
            if name == WILDCARD {
                flat.push(Token::NonRelations);
            } else if let Some((prefix, rest)) = name.split_once(SEPARATOR) {
                match nested.iter_mut().find(|(p, _)| p == prefix) {
                    Some((_, rests)) => rests.push(rest.to_string()),
                    None => nested.push((prefix.to_string(), vec![rest.to_string()])),
                }
            } else {
                flat.push(Token::Exact(name.clone()));
            }
        }

        tracing::debug!(
            target: "aggressivequery::extraction",
            entity,
            depth,
            path = %descent.path.join(SEPARATOR),
            ?names,
            "drilldown"
        );

        let hints = self.hints.load(entity)?;
        let custom = descent.custom;
        let scope = custom.get(&descent.path.join(SEPARATOR));
        let mut node = TmpResult::new(descent.path.last().cloned().unwrap_or_default());

        let mut iter = HintIterator::new(&hints, flat).with_custom(scope);
        for (hint, _) in iter.by_ref() {
            node.insert_hint(hint);
        }

        for (prefix, rests) in &nested {
            let token = if prefix == WILDCARD {
                Token::Relations
            } else {
                Token::Exact(prefix.clone())
            };

            for (hint, exact) in iter.rescan(vec![token]) {
                let Some(target) = hint.related_entity() else {
                    node.insert_hint(hint);
                    continue;
                };

                if !exact {
                    if depth == 1 && descent.backrefs.contains(&(target, String::new())) {
                        tracing::trace!(
                            target: "aggressivequery::extraction",
                            entity,
                            relation = hint.name(),
                            "skip: leads back to the root"
                        );
                        continue;
                    }
                    if let Some(back) = hint.related_name() {
                        if descent.backrefs.contains(&(target, back.to_string())) {
                            tracing::trace!(
                                target: "aggressivequery::extraction",
                                entity,
                                relation = hint.name(),
                                back,
                                "skip: reverse of a relation already on the path"
                            );
                            continue;
                        }
                    }
                }

                let key = (entity, hint.name().to_string());
                let entered = descent.backrefs.insert(key.clone());
                descent.path.push(hint.name().to_string());
                let child = self.drilldown_level(descent, target, rests, depth + 1);
                descent.path.pop();
                if entered {
                    descent.backrefs.remove(&key);
                }

                node.insert_hint(hint);
                node.merge_subresult(child?);
            }
        }

        Ok(node)
    }

    /// Split hints into fields, forward and reverse relations, recursively.
    pub fn classify(&self, tmp: TmpResult) -> ResultNode {
        let mut node = ResultNode {
            name: tmp.name,
            ..ResultNode::default()
        };
        for hint in tmp.hints {
            if !hint.is_relation() {
                node.fields.push(hint);
            } else if hint.is_reverse_related() {
                node.reverse_related.push(hint);
            } else {
                node.related.push(hint);
            }
        }
        node.subresults = tmp
            .subresults
            .into_iter()
            .map(|sr| self.classify(sr))
            .collect();

        if self.sorted {
            node.fields.sort_by(|a, b| a.name().cmp(b.name()));
            node.related.sort_by(|a, b| a.name().cmp(b.name()));
            node.reverse_related.sort_by(|a, b| a.name().cmp(b.name()));
            node.subresults.sort_by(|a, b| a.name.cmp(&b.name));
        }
        node
    }
}
