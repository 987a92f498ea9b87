//! Deep key/value rewriting over nested trees.
//!
//! Section descriptors are assembled as [`Tree`]s so that "this field was
//! never set" ([`Node::Undefined`]) stays distinguishable from an explicit
//! JSON `null` until the final cleanup pass removes it.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// A keyed tree of [`Node`]s.
pub type Tree = BTreeMap<String, Node>;

/// A value inside a [`Tree`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// The field was absent on the source entry.
    Undefined,
    /// Scalar JSON value (string, number, bool, null).
    Leaf(Value),
    /// Ordered sequence.
    List(Vec<Node>),
    /// Nested keyed tree.
    Tree(Tree),
}

impl Node {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Node::Tree(
                map.into_iter()
                    .map(|(key, value)| (key, Node::from_json(value)))
                    .collect(),
            ),
            Value::Array(items) => Node::List(items.into_iter().map(Node::from_json).collect()),
            other => Node::Leaf(other),
        }
    }

    /// `None` becomes [`Node::Undefined`].
    pub fn from_optional(value: Option<Value>) -> Self {
        value.map_or(Node::Undefined, Node::from_json)
    }

    /// Convert back to JSON. Undefined values left inside lists become `null`.
    pub fn into_json(self) -> Value {
        match self {
            Node::Undefined => Value::Null,
            Node::Leaf(value) => value,
            Node::List(items) => Value::Array(items.into_iter().map(Node::into_json).collect()),
            Node::Tree(tree) => Value::Object(tree_into_map(tree)),
        }
    }
}

/// Convert a tree into a JSON object, dropping undefined keys.
pub fn tree_into_map(tree: Tree) -> Map<String, Value> {
    tree.into_iter()
        .filter(|(_, node)| !matches!(node, Node::Undefined))
        .map(|(key, node)| (key, node.into_json()))
        .collect()
}

/// Rewrite every key/value pair of `tree`.
///
/// `rewrite` returns the replacement pair, or `None` to drop the key. When
/// the replacement value is a tree it is rewritten recursively; lists are
/// walked so trees nested in them are rewritten too, while list elements
/// themselves are never dropped. The input is left untouched.
pub fn deep_transform<F>(tree: &Tree, rewrite: &F) -> Tree
where
    F: Fn(&str, &Node) -> Option<(String, Node)>,
{
    tree.iter()
        .filter_map(|(key, value)| {
            let (next_key, next_value) = rewrite(key.as_str(), value)?;
            Some((next_key, descend(next_value, rewrite)))
        })
        .collect()
}

fn descend<F>(node: Node, rewrite: &F) -> Node
where
    F: Fn(&str, &Node) -> Option<(String, Node)>,
{
    match node {
        Node::Tree(inner) => Node::Tree(deep_transform(&inner, rewrite)),
        Node::List(items) => Node::List(
            items
                .into_iter()
                .map(|item| descend(item, rewrite))
                .collect(),
        ),
        leaf => leaf,
    }
}

/// Remove every key whose value is [`Node::Undefined`], at any depth.
pub fn strip_undefined(tree: &Tree) -> Tree {
    deep_transform(tree, &|key: &str, value: &Node| match value {
        Node::Undefined => None,
        _ => Some((key.to_string(), value.clone())),
    })
}
