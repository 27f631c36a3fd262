use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::OnceLock;

use serde_json::{Map, Value};
use tree_sitter::{Language, Query, QueryCursor, QueryError, StreamingIterator};

use crate::object::Object;
use crate::strings::{decode, dequote};

static JS_LANGUAGE: OnceLock<Language> = OnceLock::new();

pub(crate) fn js_language() -> &'static Language {
    JS_LANGUAGE.get_or_init(|| tree_sitter_javascript::LANGUAGE.into())
}

/// Compile a tree-sitter query against the JavaScript grammar.
pub fn compile_query(pattern: &str) -> Result<Query, QueryError> {
    Query::new(js_language(), pattern)
}

/// A syntax node together with the source buffer it was parsed from.
///
/// Cheap to copy; every accessor that might not exist returns `Option`.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    inner: tree_sitter::Node<'a>,
    source: &'a str,
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind())
            .field("span", &self.span())
            .finish()
    }
}

impl<'a> Node<'a> {
    pub fn new(inner: tree_sitter::Node<'a>, source: &'a str) -> Self {
        Node { inner, source }
    }

    pub fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    pub fn is_named(&self) -> bool {
        self.inner.is_named()
    }

    /// Source text covered by this node.
    pub fn content(&self) -> &'a str {
        self.source.get(self.inner.byte_range()).unwrap_or("")
    }

    pub fn span(&self) -> Range<usize> {
        self.inner.byte_range()
    }

    pub fn child_by_field(&self, field: &str) -> Option<Node<'a>> {
        self.inner.child_by_field_name(field).map(|n| self.wrap(n))
    }

    pub fn named_child(&self, index: usize) -> Option<Node<'a>> {
        self.inner.named_child(index).map(|n| self.wrap(n))
    }

    pub fn named_child_count(&self) -> usize {
        self.inner.named_child_count()
    }

    pub fn named_children(&self) -> Vec<Node<'a>> {
        let mut cursor = self.inner.walk();
        self.inner
            .named_children(&mut cursor)
            .map(|n| self.wrap(n))
            .collect()
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.inner.parent().map(|n| self.wrap(n))
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'a>> {
        std::iter::successors(self.parent(), |n| n.parent())
    }

    pub fn has_error(&self) -> bool {
        self.inner.has_error()
    }

    /// String literal text with the quotes removed but escapes left alone.
    pub fn raw_string(&self) -> &'a str {
        dequote(self.content())
    }

    pub fn decoded_string(&self) -> String {
        decode(self.content())
    }

    /// True for string literals and expressions whose text starts with a quote.
    pub fn is_stringy(&self) -> bool {
        self.kind() == "string" || self.content().starts_with(&['"', '\'', '`'][..])
    }

    /// Flatten a `+` concatenation into one string, replacing every operand
    /// that is not a string literal with `placeholder`.
    ///
    /// `'/user/' + id + '/edit'` becomes `/user/EXPR/edit`.
    pub fn collapsed_string(&self, placeholder: &str) -> String {
        let mut out = String::new();
        let mut stack = vec![*self];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "binary_expression" if node.is_concatenation() => {
                    if let Some(right) = node.child_by_field("right") {
                        stack.push(right);
                    }
                    if let Some(left) = node.child_by_field("left") {
                        stack.push(left);
                    }
                }
                "string" => out.push_str(node.raw_string()),
                _ => out.push_str(placeholder),
            }
        }
        out
    }

    fn is_concatenation(&self) -> bool {
        self.child_by_field("operator")
            .is_some_and(|op| op.kind() == "+")
    }

    pub fn as_object(&self) -> Object<'a> {
        Object::new(Some(*self))
    }

    /// Native JSON rendering of a literal: strings are decoded, numbers
    /// parsed, objects and arrays converted recursively. Anything else
    /// becomes its source text.
    pub fn to_value(&self) -> Value {
        match self.kind() {
            "string" => Value::String(self.decoded_string()),
            "number" => parse_number(self.content()),
            "object" => {
                let mut map = Map::new();
                for pair in self.named_children() {
                    if pair.kind() != "pair" {
                        continue;
                    }
                    let (Some(key), Some(value)) =
                        (pair.child_by_field("key"), pair.child_by_field("value"))
                    else {
                        continue;
                    };
                    map.insert(decode(key.raw_string()), value.to_value());
                }
                Value::Object(map)
            }
            "array" => Value::Array(
                self.named_children()
                    .into_iter()
                    .filter(|n| n.kind() != "comment")
                    .map(|n| n.to_value())
                    .collect(),
            ),
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            _ => Value::String(self.content().to_string()),
        }
    }

    /// Run a compiled query rooted at this node, one result per match.
    pub fn query_matches(&self, query: &Query) -> Vec<QueryResult<'a>> {
        let names = query.capture_names();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, self.inner, self.source.as_bytes());
        let mut out = Vec::new();
        while let Some(m) = matches.next() {
            let mut result = QueryResult::default();
            for capture in m.captures {
                let name = names[capture.index as usize];
                result.captures.insert(name.to_string(), self.wrap(capture.node));
            }
            if !result.captures.is_empty() {
                out.push(result);
            }
        }
        out
    }

    /// Every captured node of every match, in match order.
    pub fn query_nodes(&self, query: &Query) -> Vec<Node<'a>> {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, self.inner, self.source.as_bytes());
        let mut out = Vec::new();
        while let Some(m) = matches.next() {
            out.extend(m.captures.iter().map(|c| self.wrap(c.node)));
        }
        out
    }

    pub(crate) fn inner(&self) -> tree_sitter::Node<'a> {
        self.inner
    }

    fn wrap(&self, inner: tree_sitter::Node<'a>) -> Node<'a> {
        Node::new(inner, self.source)
    }
}

fn parse_number(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(text.to_string()),
    }
}

/// Captured nodes of a single query match, keyed by capture name.
#[derive(Debug, Default, Clone)]
pub struct QueryResult<'a> {
    captures: BTreeMap<String, Node<'a>>,
}

impl<'a> QueryResult<'a> {
    pub fn get(&self, capture: &str) -> Option<Node<'a>> {
        self.captures.get(capture).copied()
    }

    pub fn has(&self, capture: &str) -> bool {
        self.captures.contains_key(capture)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, Node<'a>)> + '_ {
        self.captures.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use crate::analyzer::Analyzer;

    fn first_expression(src: &str, f: impl FnOnce(super::Node<'_>)) {
        let analyzer = Analyzer::new(src.as_bytes()).expect("parse");
        let stmt = analyzer.root().named_child(0).expect("statement");
        let expr = stmt.named_child(0).expect("expression");
        f(expr);
    }

    #[test]
    fn collapses_concatenations() {
        first_expression(r#""./login.php?redirect="+url"#, |n| {
            assert_eq!(n.collapsed_string("EXPR"), "./login.php?redirect=EXPR");
        });
        first_expression(r#"'/path/'+['one','two','three'].join('/')"#, |n| {
            assert_eq!(n.collapsed_string("EXPR"), "/path/EXPR");
        });
        first_expression("someVar", |n| {
            assert_eq!(n.collapsed_string("EXPR"), "EXPR");
        });
        first_expression(r#""/a/" + b + "/c" + d"#, |n| {
            assert_eq!(n.collapsed_string("{}"), "/a/{}/c{}");
        });
        first_expression("`/api/${version}`", |n| {
            assert_eq!(n.collapsed_string("EXPR"), "EXPR");
        });
    }

    #[test]
    fn non_additive_operators_are_opaque() {
        first_expression(r#""a" - "b""#, |n| {
            assert_eq!(n.collapsed_string("EXPR"), "EXPR");
        });
    }

    #[test]
    fn stringy_detection() {
        first_expression(r#""x" + y"#, |n| assert!(n.is_stringy()));
        first_expression("`tpl${a}`", |n| assert!(n.is_stringy()));
        first_expression("y + 'x'", |n| assert!(!n.is_stringy()));
    }

    #[test]
    fn converts_literals_to_json() {
        first_expression(
            r#"({name: "a\x3db", n: 3, f: 1.5, list: [true, null, "x"], nested: {"k": false}, other: foo})"#,
            |n| {
                let obj = n.named_child(0).expect("object");
                let value = obj.to_value();
                assert_eq!(value["name"], "a=b");
                assert_eq!(value["n"], 3);
                assert_eq!(value["f"], 1.5);
                assert_eq!(value["list"], serde_json::json!([true, null, "x"]));
                assert_eq!(value["nested"]["k"], false);
                assert_eq!(value["other"], "foo");
            },
        );
    }

    #[test]
    fn queries_group_captures() {
        let analyzer = Analyzer::new(b"a.b(1); c.d(2);").expect("parse");
        let results = analyzer
            .query_multi("(call_expression function: (member_expression property: (property_identifier) @prop) arguments: (arguments (number) @arg))")
            .expect("valid query");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].get("prop").map(|n| n.content()), Some("b"));
        assert_eq!(results[1].get("arg").map(|n| n.content()), Some("2"));
        assert!(!results[0].has("missing"));
    }
}
