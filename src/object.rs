use std::collections::BTreeMap;

use crate::node::Node;
use crate::strings::decode;

/// Key lookup over an `object` literal node.
///
/// Wrapping anything that is not an object (or nothing at all) yields an
/// accessor on which every lookup misses.
#[derive(Debug, Clone, Copy)]
pub struct Object<'a> {
    node: Option<Node<'a>>,
}

impl<'a> Object<'a> {
    pub fn new(node: Option<Node<'a>>) -> Self {
        Object { node }
    }

    pub fn is_valid(&self) -> bool {
        self.node.is_some_and(|n| n.kind() == "object")
    }

    pub fn node(&self) -> Option<Node<'a>> {
        self.node.filter(|n| n.kind() == "object")
    }

    fn pairs(&self) -> impl Iterator<Item = (String, Node<'a>)> {
        self.node()
            .map(|n| n.named_children())
            .unwrap_or_default()
            .into_iter()
            .filter(|pair| pair.kind() == "pair")
            .filter_map(|pair| {
                let key = pair.child_by_field("key")?;
                let value = pair.child_by_field("value")?;
                Some((decode(key.raw_string()), value))
            })
    }

    /// Decoded keys in source order; repeated keys are listed once.
    pub fn keys(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (key, _) in self.pairs() {
            if !out.contains(&key) {
                out.push(key);
            }
        }
        out
    }

    /// Value node of the first pair whose key satisfies `pred`.
    pub fn find_node(&self, pred: impl Fn(&str) -> bool) -> Option<Node<'a>> {
        self.pairs().find(|(key, _)| pred(key)).map(|(_, value)| value)
    }

    pub fn get_node(&self, key: &str) -> Option<Node<'a>> {
        self.find_node(|k| k == key)
    }

    pub fn get_node_ci(&self, key: &str) -> Option<Node<'a>> {
        self.find_node(|k| k.eq_ignore_ascii_case(key))
    }

    pub fn get_object(&self, key: &str) -> Object<'a> {
        Object::new(self.get_node(key))
    }

    /// Quote-stripped text of a string value, or `default` when the key is
    /// missing or its value is not a string literal.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        string_value(self.get_node(key)).unwrap_or(default).to_string()
    }

    pub fn get_string_ci(&self, key: &str, default: &str) -> String {
        string_value(self.get_node_ci(key)).unwrap_or(default).to_string()
    }

    /// Flatten to key → string value; non-string values become empty.
    pub fn as_map(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (key, value) in self.pairs() {
            out.entry(key)
                .or_insert_with(|| string_value(Some(value)).unwrap_or_default().to_string());
        }
        out
    }
}

fn string_value(node: Option<Node<'_>>) -> Option<&str> {
    node.filter(|n| n.kind() == "string").map(|n| n.raw_string())
}
