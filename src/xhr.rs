use std::collections::BTreeMap;
use std::sync::OnceLock;

use tree_sitter::{Query, QueryError};

use crate::node::{compile_query, Node};
use crate::urls::{argument, callee, MatchContext, UrlFinding, UrlKind};

const HTTP_VERBS: &[&str] = &["GET", "HEAD", "OPTIONS", "POST", "PUT", "PATCH", "DELETE"];

const SCOPE_KINDS: &[&str] = &[
    "function_declaration",
    "function_expression",
    "function",
    "arrow_function",
    "method_definition",
    "generator_function",
    "generator_function_declaration",
];

static MEMBER_CALLS: OnceLock<Result<Query, QueryError>> = OnceLock::new();

fn member_calls_query() -> Option<&'static Query> {
    MEMBER_CALLS
        .get_or_init(|| {
            compile_query(
                "(call_expression \
                   function: (member_expression \
                     object: (identifier) \
                     property: (property_identifier)) \
                   arguments: (arguments (string))) @call",
            )
        })
        .as_ref()
        .ok()
}

/// Nearest enclosing function, or the root when the call is top-level.
fn enclosing_scope<'a>(node: Node<'a>) -> Node<'a> {
    let mut scope = node;
    for ancestor in node.ancestors() {
        scope = ancestor;
        if SCOPE_KINDS.contains(&ancestor.kind()) {
            break;
        }
    }
    scope
}

/// `obj.open("VERB", url)`, with headers taken from `obj.setRequestHeader`
/// calls in the same function scope.
pub(crate) fn match_xhr<'a>(node: Node<'a>, ctx: &mut MatchContext<'a>) -> Option<UrlFinding> {
    let object = callee(node)?.strip_suffix(".open")?;

    // window.open and friends share the name; a literal verb tells them apart.
    let method = argument(node, 0).filter(|a| a.kind() == "string")?.raw_string();
    if !HTTP_VERBS.contains(&method) {
        return None;
    }
    let target = argument(node, 1).filter(|a| a.is_stringy())?;

    let placeholder = ctx.placeholder;
    let mut finding = UrlFinding::new(target.collapsed_string(placeholder), UrlKind::XhrOpen, node)
        .with_method(method)
        .claiming(target);

    if let Some(query) = member_calls_query() {
        let calls = ctx.scoped_nodes(enclosing_scope(node), query);
        finding.headers = request_headers(calls, object);
    }
    finding.content_type = finding
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.clone())
        .unwrap_or_default();

    Some(finding)
}

// First value wins when a header is set more than once.
fn request_headers(calls: &[Node<'_>], object: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for &call in calls {
        let Some(name) = callee(call) else { continue };
        if name.strip_suffix(".setRequestHeader") != Some(object) {
            continue;
        }
        let Some(header) = argument(call, 0).filter(|a| a.kind() == "string") else {
            continue;
        };
        let value = argument(call, 1)
            .filter(|a| a.kind() == "string")
            .map(|a| a.raw_string())
            .unwrap_or_default();
        headers
            .entry(header.raw_string().to_string())
            .or_insert_with(|| value.to_string());
    }
    headers
}
