//! Selection trees built during extraction.

use crate::hints::Hint;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Intermediate node: everything selected at one position, unclassified.
#[derive(Debug, Clone, Default)]
pub struct TmpResult {
    /// Relation that reached this node ("" for the root).
    pub name: String,
    pub hints: Vec<Hint>,
    pub subresults: Vec<TmpResult>,
}

impl TmpResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn hint(&self, name: &str) -> Option<&Hint> {
        self.hints.iter().find(|h| h.name() == name)
    }

    pub fn subresult(&self, name: &str) -> Option<&TmpResult> {
        self.subresults.iter().find(|sr| sr.name == name)
    }

    /// Record a hint. A name already present keeps its first hint.
    pub fn insert_hint(&mut self, hint: Hint) {
        if self.hint(hint.name()).is_none() {
            self.hints.push(hint);
        }
    }

    /// Add a child, merging into an existing child of the same name.
    pub fn merge_subresult(&mut self, child: TmpResult) {
        match self.subresults.iter_mut().find(|sr| sr.name == child.name) {
            Some(existing) => existing.merge(child),
            None => self.subresults.push(child),
        }
    }

    pub fn merge(&mut self, other: TmpResult) {
        for hint in other.hints {
            self.insert_hint(hint);
        }
        for child in other.subresults {
            self.merge_subresult(child);
        }
    }
}

/// Classified node: fields, forward relations and reverse relations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultNode {
    pub name: String,
    pub fields: Vec<Hint>,
    pub related: Vec<Hint>,
    pub reverse_related: Vec<Hint>,
    pub subresults: Vec<ResultNode>,
}

impl ResultNode {
    pub fn subresult(&self, name: &str) -> Option<&ResultNode> {
        self.subresults.iter().find(|sr| sr.name == name)
    }

    /// Forward then reverse relation hints.
    pub fn relations(&self) -> impl Iterator<Item = &Hint> {
        self.related.iter().chain(&self.reverse_related)
    }

    /// Levels in the tree; a lone root is 1.
    pub fn depth(&self) -> usize {
        1 + self
            .subresults
            .iter()
            .map(ResultNode::depth)
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.related.is_empty()
            && self.reverse_related.is_empty()
            && self.subresults.is_empty()
    }

    /// Copy of this tree with the `skip` paths removed.
    ///
    /// A child left empty only by the removal is dropped as well; its
    /// relation hint stays as a bare reference.
    pub fn excluded(&self, skip: &SkipTree) -> ResultNode {
        let keep = |hint: &&Hint| !skip.get(hint.name()).is_some_and(SkipTree::is_excluded);

        let mut subresults = Vec::with_capacity(self.subresults.len());
        for child in &self.subresults {
            match skip.get(&child.name) {
                Some(sub) if sub.is_excluded() => {}
                Some(sub) => {
                    let pruned = child.excluded(sub);
                    if pruned.is_empty() && !child.is_empty() {
                        tracing::trace!(
                            target: "aggressivequery::extraction",
                            name = %child.name,
                            "dropped subresult emptied by skip filter"
                        );
                        continue;
                    }
                    subresults.push(pruned);
                }
                None => subresults.push(child.clone()),
            }
        }

        ResultNode {
            name: self.name.clone(),
            fields: self.fields.iter().filter(keep).cloned().collect(),
            related: self.related.iter().filter(keep).cloned().collect(),
            reverse_related: self.reverse_related.iter().filter(keep).cloned().collect(),
            subresults,
        }
    }
}

impl fmt::Display for ResultNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(items: &[T]) -> String {
            let inner: Vec<String> = items.iter().map(ToString::to_string).collect();
            format!("[{}]", inner.join(", "))
        }

        let mut parts = Vec::new();
        if !self.name.is_empty() {
            parts.push(format!("name='{}'", self.name));
        }
        if !self.fields.is_empty() {
            parts.push(format!("fields={}", list(&self.fields)));
        }
        if !self.related.is_empty() {
            parts.push(format!("related={}", list(&self.related)));
        }
        if !self.reverse_related.is_empty() {
            parts.push(format!("reverse_related={}", list(&self.reverse_related)));
        }
        if !self.subresults.is_empty() {
            parts.push(format!("subresults={}", list(&self.subresults)));
        }
        write!(f, "Result({})", parts.join(", "))
    }
}

/// Tree of `__`-separated paths to exclude.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipTree {
    excluded: bool,
    children: BTreeMap<String, SkipTree>,
}

impl SkipTree {
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut tree = Self::default();
        for path in paths {
            tree.insert(path.as_ref());
        }
        tree
    }

    pub fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split("__") {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.excluded = true;
    }

    pub fn get(&self, name: &str) -> Option<&SkipTree> {
        self.children.get(name)
    }

    /// The whole subtree at this position is removed.
    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn is_empty(&self) -> bool {
        !self.excluded && self.children.is_empty()
    }

    /// Every excluded path, `__`-joined.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, child) in &self.children {
            if child.excluded {
                out.push(name.clone());
            }
            out.extend(child.paths().into_iter().map(|p| format!("{name}__{p}")));
        }
        out
    }
}
