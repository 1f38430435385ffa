//! Structural matcher.
//!
//! Walks the Go tree, unifies `match` patterns from a lift block's from
//! clause against candidate nodes, and produces binding environments. The
//! traversal is pre-order over every descendant with no pruning, and it
//! continues past matched nodes, so nested matches are produced too.
//!
//! Bindings are `NodeId`-based `Value`s, not references, so they survive the
//! executor's later mutation of the same tree.

use std::collections::BTreeMap;

use crate::gotree::{Node, NodeId, Tree, Value};
use crate::rule::ast::{
    AstPattern, CmpOp, FieldMatch, LiftBlock, MatchStmt, MatchValue, Predicate, Property,
    WhereClause,
};

/// Captured values by binding name. Insertion order is irrelevant; a
/// `BTreeMap` keeps display output deterministic.
pub type Bindings = BTreeMap<String, Value>;

/// A successful pattern match: the matched node plus everything it captured.
#[derive(Debug, Clone)]
pub struct Match {
    pub node: NodeId,
    pub bindings: Bindings,
}

/// Pattern matching over one parsed target file.
pub struct Matcher<'t> {
    tree: &'t Tree,
    file: NodeId,
}

impl<'t> Matcher<'t> {
    pub fn new(tree: &'t Tree, file: NodeId) -> Self {
        Self { tree, file }
    }

    /// Execute all matchers in a lift block's from clause.
    ///
    /// The first matcher runs against the whole file. Each subsequent
    /// matcher either cross-joins against the whole file (no `in`; the
    /// product is unbounded by design — the corpus always scopes with `in`)
    /// or re-roots at the node a previous matcher bound (`in $X`). An empty
    /// from clause yields no matches.
    pub fn match_block(&self, block: &LiftBlock) -> Vec<Match> {
        let Some(first) = block.from.matchers.first() else {
            return Vec::new();
        };

        let mut matches = self.match_stmt(first, self.file, None);

        for stmt in &block.from.matchers[1..] {
            matches = match &stmt.scope {
                None => {
                    let fresh = self.match_stmt(stmt, self.file, None);
                    cross_join(matches, fresh)
                }
                Some(scope_name) => {
                    let mut scoped = Vec::new();
                    for m in &matches {
                        // Matches whose scope binding is absent or not a
                        // node are dropped.
                        if let Some(Value::Node(root)) = m.bindings.get(scope_name) {
                            scoped.extend(self.match_stmt(stmt, *root, Some(&m.bindings)));
                        }
                    }
                    scoped
                }
            };
        }

        matches
    }

    /// Find every node under `scope` matching one `match` statement.
    fn match_stmt(
        &self,
        stmt: &MatchStmt,
        scope: NodeId,
        inherited: Option<&Bindings>,
    ) -> Vec<Match> {
        let mut matches = Vec::new();
        self.tree.walk(scope, &mut |node| {
            if self.tree.kind_name(node) != stmt.node_type {
                return;
            }
            let mut bindings = inherited.cloned().unwrap_or_default();
            if self.match_fields(node, &stmt.fields, &mut bindings) {
                matches.push(Match { node, bindings });
            }
        });
        matches
    }

    fn match_fields(
        &self,
        node: NodeId,
        fields: &[FieldMatch],
        bindings: &mut Bindings,
    ) -> bool {
        fields.iter().all(|f| self.match_field(node, f, bindings))
    }

    fn match_field(&self, node: NodeId, field: &FieldMatch, bindings: &mut Bindings) -> bool {
        let value = self.tree.field(node, &field.name);

        if value.is_nil() {
            // An absent field fails unification, except that a bare binding
            // still captures nil so optional subtrees can bind.
            return match &field.value {
                MatchValue::Wildcard => true,
                MatchValue::Binding(name) | MatchValue::Spread(name) => {
                    self.bind(name, Value::Nil, bindings)
                }
                _ => false,
            };
        }

        self.match_value(&value, &field.value, bindings)
    }

    fn match_value(&self, value: &Value, pattern: &MatchValue, bindings: &mut Bindings) -> bool {
        match pattern {
            MatchValue::Wildcard => true,
            MatchValue::Binding(name) => self.bind(name, value.clone(), bindings),
            MatchValue::Spread(name) => {
                if self.list_items(value).is_none() {
                    return false;
                }
                self.bind(name, value.clone(), bindings)
            }
            MatchValue::Exact(expected) => self.match_exact(value, expected),
            MatchValue::Pattern(p) => self.match_pattern(value, p, bindings),
            MatchValue::List(patterns) => {
                let Some(items) = self.list_items(value) else {
                    return false;
                };
                if items.len() != patterns.len() {
                    return false;
                }
                items
                    .iter()
                    .zip(patterns)
                    .all(|(item, p)| self.match_value(&Value::Node(*item), p, bindings))
            }
        }
    }

    fn match_exact(&self, value: &Value, expected: &str) -> bool {
        match value {
            Value::Node(id) => self.tree.ident_name(*id) == Some(expected),
            Value::Str(s) => s == expected,
            _ => false,
        }
    }

    fn match_pattern(&self, value: &Value, pattern: &AstPattern, bindings: &mut Bindings) -> bool {
        let Some(node) = value.as_node() else {
            return false;
        };
        if self.tree.kind_name(node) != pattern.node_type {
            return false;
        }
        self.match_fields(node, &pattern.fields, bindings)
    }

    /// Capture a value. Rebinding an already-bound name requires equality:
    /// node identity for nodes, name equality for identifiers, byte
    /// equality for strings.
    fn bind(&self, name: &str, value: Value, bindings: &mut Bindings) -> bool {
        if let Some(existing) = bindings.get(name) {
            if !self.values_equal(existing, &value) {
                return false;
            }
        }
        bindings.insert(name.to_string(), value);
        true
    }

    fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Node(x), Value::Node(y)) => {
                if x == y {
                    return true;
                }
                match (self.tree.ident_name(*x), self.tree.ident_name(*y)) {
                    (Some(xn), Some(yn)) => xn == yn,
                    _ => false,
                }
            }
            (Value::Node(id), Value::Str(s)) | (Value::Str(s), Value::Node(id)) => {
                self.tree.ident_name(*id) == Some(s)
            }
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::List(x), Value::List(y)) => x == y,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }

    /// A value is list-like if it is a slice field or a field-list
    /// container node.
    fn list_items(&self, value: &Value) -> Option<Vec<NodeId>> {
        list_items(self.tree, value)
    }
}

fn list_items(tree: &Tree, value: &Value) -> Option<Vec<NodeId>> {
    match value {
        Value::List(items) => Some(items.clone()),
        Value::Node(id) => match tree.node(*id) {
            Node::FieldList { list } => Some(list.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Cartesian product of two match sets, bindings merged right-biased on
/// name collision. Either side empty means an empty product.
fn cross_join(a: Vec<Match>, b: Vec<Match>) -> Vec<Match> {
    let mut result = Vec::new();
    for ma in &a {
        for mb in &b {
            let mut merged = ma.bindings.clone();
            for (k, v) in &mb.bindings {
                merged.insert(k.clone(), v.clone());
            }
            result.push(Match {
                node: ma.node,
                bindings: merged,
            });
        }
    }
    result
}

/// Keep the matches for which every predicate in every where clause holds.
pub fn filter_matches(
    tree: &Tree,
    matches: Vec<Match>,
    where_clauses: &[WhereClause],
) -> Vec<Match> {
    if where_clauses.is_empty() {
        return matches;
    }
    matches
        .into_iter()
        .filter(|m| {
            where_clauses
                .iter()
                .flat_map(|w| &w.predicates)
                .all(|p| eval_predicate(tree, p, &m.bindings))
        })
        .collect()
}

/// Evaluate one predicate against a match's bindings.
///
/// A predicate over a name no matcher bound is false, not an error — the
/// match simply fails the filter.
pub fn eval_predicate(tree: &Tree, pred: &Predicate, bindings: &Bindings) -> bool {
    match pred {
        Predicate::Not(inner) => !eval_predicate(tree, inner, bindings),
        Predicate::Contains { binding, pattern } => {
            let Some(Value::Node(root)) = bindings.get(binding) else {
                return false;
            };
            contains(tree, *root, pattern)
        }
        Predicate::Len { binding, op, value } => {
            let Some(bound) = bindings.get(binding) else {
                return false;
            };
            let len = list_items(tree, bound).map(|items| items.len()).unwrap_or(0) as i64;
            match op {
                CmpOp::Gt => len > *value,
                CmpOp::Ge => len >= *value,
                CmpOp::Lt => len < *value,
                CmpOp::Le => len <= *value,
                CmpOp::Eq => len == *value,
                CmpOp::Ne => len != *value,
            }
        }
        Predicate::Member { binding, values } => {
            let Some(bound) = bindings.get(binding) else {
                return false;
            };
            let name = match bound {
                Value::Node(id) => match tree.ident_name(*id) {
                    Some(name) => name.to_string(),
                    None => return false,
                },
                Value::Str(s) => s.clone(),
                _ => return false,
            };
            values.iter().any(|v| *v == name)
        }
        Predicate::Property { binding, property } => {
            let Some(bound) = bindings.get(binding) else {
                return false;
            };
            eval_property(tree, bound, *property)
        }
    }
}

/// Pre-order search of the bound subtree, short-circuiting on the first
/// node that matches the probe pattern. Probe bindings are throwaway.
fn contains(tree: &Tree, root: NodeId, pattern: &AstPattern) -> bool {
    let matcher = Matcher::new(tree, root);
    let mut found = false;
    tree.walk(root, &mut |node| {
        if found || tree.kind_name(node) != pattern.node_type {
            return;
        }
        let mut probe = Bindings::new();
        if matcher.match_fields(node, &pattern.fields, &mut probe) {
            found = true;
        }
    });
    found
}

fn eval_property(tree: &Tree, value: &Value, property: Property) -> bool {
    match property {
        Property::Exported => {
            let name = match value {
                Value::Node(id) => match tree.ident_name(*id) {
                    Some(name) => name.to_string(),
                    None => return false,
                },
                Value::Str(s) => s.clone(),
                _ => return false,
            };
            name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        }
        Property::Pointer => {
            matches!(value, Value::Node(id) if matches!(tree.node(*id), Node::StarExpr { .. }))
        }
        Property::Slice => {
            matches!(value, Value::Node(id) if matches!(tree.node(*id), Node::ArrayType { .. }))
        }
        Property::Map => {
            matches!(value, Value::Node(id) if matches!(tree.node(*id), Node::MapType { .. }))
        }
        Property::Error => {
            matches!(value, Value::Node(id) if tree.ident_name(*id) == Some("error"))
        }
        // No defined semantics in the rule corpus; always false.
        Property::Builtin => false,
    }
}
