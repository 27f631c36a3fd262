use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use log::warn;
use serde::{Serialize, Serializer};
use tree_sitter::Query;

use crate::jquery::match_jquery;
use crate::maybe_url::{maybe_url, UrlParts};
use crate::node::{compile_query, js_language, Node};
use crate::strings::decode;
use crate::xhr::match_xhr;

/// How a URL was found in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UrlKind {
    LocationAssignment,
    LocationReplacement,
    WindowOpen,
    Fetch,
    XhrOpen,
    JqueryAjax,
    /// Any other call with a URL-looking first argument; carries the callee text.
    Call(String),
    StringLiteral,
}

impl UrlKind {
    pub fn as_str(&self) -> &str {
        match self {
            UrlKind::LocationAssignment => "locationAssignment",
            UrlKind::LocationReplacement => "locationReplacement",
            UrlKind::WindowOpen => "windowOpen",
            UrlKind::Fetch => "fetch",
            UrlKind::XhrOpen => "xhrOpen",
            UrlKind::JqueryAjax => "jqueryAjax",
            UrlKind::Call(callee) => callee,
            UrlKind::StringLiteral => "stringLiteral",
        }
    }
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for UrlKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlFinding {
    pub url: String,
    pub query_params: Vec<String>,
    pub body_params: Vec<String>,
    pub method: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    pub kind: UrlKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip)]
    pub(crate) url_span: Option<Range<usize>>,
}

impl UrlFinding {
    /// A finding for `url`, recorded against the matched node's source text.
    pub fn new(url: impl Into<String>, kind: UrlKind, matched: Node<'_>) -> Self {
        UrlFinding {
            url: url.into(),
            query_params: Vec::new(),
            body_params: Vec::new(),
            method: String::new(),
            headers: BTreeMap::new(),
            content_type: String::new(),
            kind,
            source_text: Some(matched.content().to_string()),
            filename: None,
            url_span: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Record the expression the URL came from; literals inside it are
    /// not reported again on their own.
    pub fn claiming(mut self, expr: Node<'_>) -> Self {
        self.url_span = Some(expr.span());
        self
    }
}

pub type CustomUrlFn = Arc<dyn Fn(Node<'_>, &str) -> Option<UrlFinding> + Send + Sync>;

/// One entry of the ordered URL matcher table.
#[derive(Clone)]
pub enum UrlMatcher {
    Fetch,
    XhrOpen,
    JQuery,
    LocationAssignment,
    LocationReplace,
    WindowOpen,
    GenericCall,
    StringLiteral,
    /// User-supplied matcher; receives the node and the expression placeholder.
    Custom { target: String, extract: CustomUrlFn },
}

impl fmt::Debug for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlMatcher::Custom { target, .. } => write!(f, "Custom({target})"),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl UrlMatcher {
    pub fn defaults() -> Vec<UrlMatcher> {
        vec![
            UrlMatcher::Fetch,
            UrlMatcher::XhrOpen,
            UrlMatcher::JQuery,
            UrlMatcher::LocationAssignment,
            UrlMatcher::LocationReplace,
            UrlMatcher::WindowOpen,
            UrlMatcher::GenericCall,
            UrlMatcher::StringLiteral,
        ]
    }

    pub fn custom<F>(target: impl Into<String>, extract: F) -> Self
    where
        F: Fn(Node<'_>, &str) -> Option<UrlFinding> + Send + Sync + 'static,
    {
        UrlMatcher::Custom {
            target: target.into(),
            extract: Arc::new(extract),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            UrlMatcher::Fetch => "Fetch",
            UrlMatcher::XhrOpen => "XhrOpen",
            UrlMatcher::JQuery => "JQuery",
            UrlMatcher::LocationAssignment => "LocationAssignment",
            UrlMatcher::LocationReplace => "LocationReplace",
            UrlMatcher::WindowOpen => "WindowOpen",
            UrlMatcher::GenericCall => "GenericCall",
            UrlMatcher::StringLiteral => "StringLiteral",
            UrlMatcher::Custom { .. } => "Custom",
        }
    }

    /// Syntax node kind this matcher inspects.
    pub fn target(&self) -> &str {
        match self {
            UrlMatcher::LocationAssignment => "assignment_expression",
            UrlMatcher::StringLiteral => "string",
            UrlMatcher::Custom { target, .. } => target,
            _ => "call_expression",
        }
    }

    pub(crate) fn is_catch_all(&self) -> bool {
        matches!(self, UrlMatcher::GenericCall | UrlMatcher::StringLiteral)
    }

    pub(crate) fn extract<'a>(&self, node: Node<'a>, ctx: &mut MatchContext<'a>) -> Option<UrlFinding> {
        match self {
            UrlMatcher::Fetch => match_fetch(node, ctx),
            UrlMatcher::XhrOpen => match_xhr(node, ctx),
            UrlMatcher::JQuery => match_jquery(node, ctx),
            UrlMatcher::LocationAssignment => match_location_assignment(node, ctx),
            UrlMatcher::LocationReplace => {
                match_navigation_call(node, ctx, UrlKind::LocationReplacement, |callee| {
                    callee.ends_with("location.replace")
                })
            }
            UrlMatcher::WindowOpen => match_navigation_call(node, ctx, UrlKind::WindowOpen, |callee| {
                callee == "window.open" || callee == "open"
            }),
            UrlMatcher::GenericCall => match_generic_call(node, ctx),
            UrlMatcher::StringLiteral => match_string_literal(node),
            UrlMatcher::Custom { extract, .. } => extract(node, ctx.placeholder),
        }
    }
}

/// Per-run state shared by the URL matchers.
pub(crate) struct MatchContext<'a> {
    pub placeholder: &'a str,
    scope_calls: HashMap<(usize, usize, u16), Vec<Node<'a>>>,
}

impl<'a> MatchContext<'a> {
    pub fn new(placeholder: &'a str) -> Self {
        MatchContext {
            placeholder,
            scope_calls: HashMap::new(),
        }
    }

    /// Nodes found by `query` under `scope`, computed once per scope node.
    pub fn scoped_nodes(&mut self, scope: Node<'a>, query: &Query) -> &[Node<'a>] {
        let span = scope.span();
        let key = (span.start, span.end, scope.inner().kind_id());
        self.scope_calls
            .entry(key)
            .or_insert_with(|| scope.query_nodes(query))
    }
}

const ASSIGNMENT_TARGETS: &[&str] = &["location", "this.url", "this._url", "this.baseUrl"];
const ASSIGNMENT_SUFFIXES: &[&str] = &[".href", ".location", ".src"];

fn is_location_target(name: &str) -> bool {
    ASSIGNMENT_TARGETS.contains(&name) || ASSIGNMENT_SUFFIXES.iter().any(|s| name.ends_with(s))
}

fn match_location_assignment<'a>(node: Node<'a>, ctx: &MatchContext<'a>) -> Option<UrlFinding> {
    let left = node.child_by_field("left")?;
    let right = node.child_by_field("right")?;
    if !is_location_target(left.content()) {
        return None;
    }
    // Only values that at least start with a literal say anything useful.
    if right.content().len() < 2 || !right.is_stringy() {
        return None;
    }
    Some(
        UrlFinding::new(right.collapsed_string(ctx.placeholder), UrlKind::LocationAssignment, node)
            .with_method("GET")
            .claiming(right),
    )
}

pub(crate) fn callee(node: Node<'_>) -> Option<&str> {
    node.child_by_field("function").map(|f| f.content())
}

pub(crate) fn argument<'a>(node: Node<'a>, index: usize) -> Option<Node<'a>> {
    node.child_by_field("arguments")?.named_child(index)
}

fn match_navigation_call<'a>(
    node: Node<'a>,
    ctx: &MatchContext<'a>,
    kind: UrlKind,
    wanted: impl Fn(&str) -> bool,
) -> Option<UrlFinding> {
    if !wanted(callee(node)?) {
        return None;
    }
    let target = argument(node, 0).filter(|a| a.is_stringy())?;
    Some(
        UrlFinding::new(target.collapsed_string(ctx.placeholder), kind, node)
            .with_method("GET")
            .claiming(target),
    )
}

fn match_fetch<'a>(node: Node<'a>, ctx: &MatchContext<'a>) -> Option<UrlFinding> {
    let name = callee(node)?;
    if name != "fetch" && name != "window.fetch" {
        return None;
    }
    let target = argument(node, 0).filter(|a| a.is_stringy())?;
    let init = argument(node, 1)
        .map(|n| n.as_object())
        .unwrap_or_else(|| crate::object::Object::new(None));
    let headers = init.get_object("headers");

    let mut finding = UrlFinding::new(target.collapsed_string(ctx.placeholder), UrlKind::Fetch, node)
        .with_method(init.get_string("method", "GET").to_ascii_uppercase())
        .claiming(target);
    finding.headers = headers.as_map();
    finding.content_type = headers.get_string_ci("content-type", "");
    Some(finding)
}

fn match_generic_call<'a>(node: Node<'a>, ctx: &MatchContext<'a>) -> Option<UrlFinding> {
    let function = node.child_by_field("function")?;
    if !matches!(function.kind(), "identifier" | "member_expression") {
        return None;
    }
    let target = argument(node, 0).filter(|a| a.is_stringy())?;
    let url = target.collapsed_string(ctx.placeholder);
    if !maybe_url(&decode(&url)) {
        return None;
    }
    Some(UrlFinding::new(url, UrlKind::Call(function.content().to_string()), node).claiming(target))
}

fn match_string_literal(node: Node<'_>) -> Option<UrlFinding> {
    let raw = node.raw_string();
    if !maybe_url(raw) {
        return None;
    }
    Some(UrlFinding::new(raw, UrlKind::StringLiteral, node).claiming(node))
}

/// Spans already accounted for by an earlier finding. Candidates arrive in
/// document order, so spans ending before the current node can be dropped.
#[derive(Default)]
struct Claims {
    spans: Vec<Range<usize>>,
}

impl Claims {
    fn covers(&mut self, span: &Range<usize>) -> bool {
        while self.spans.last().is_some_and(|c| c.end <= span.start) {
            self.spans.pop();
        }
        self.spans
            .iter()
            .any(|c| c.start <= span.start && span.end <= c.end)
    }

    fn push(&mut self, span: Range<usize>) {
        self.spans.push(span);
    }
}

fn candidate_query(matchers: &[UrlMatcher]) -> Option<Query> {
    let mut targets: Vec<&str> = Vec::new();
    for matcher in matchers {
        let target = matcher.target();
        if targets.contains(&target) {
            continue;
        }
        if js_language().id_for_node_kind(target, true) == 0 {
            warn!("Ignoring URL matcher for unknown node kind {target:?}");
            continue;
        }
        targets.push(target);
    }
    if targets.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = targets.iter().map(|t| format!("({t})")).collect();
    match compile_query(&format!("[{}] @matches", alternatives.join(" "))) {
        Ok(query) => Some(query),
        Err(e) => {
            warn!("Could not compile URL candidate query: {e}");
            None
        }
    }
}

/// Run `matchers` over every candidate node under `root`.
///
/// Each node goes to the matchers targeting its kind, in table order; the
/// first one that produces a finding wins the node.
pub(crate) fn find_urls(root: Node<'_>, matchers: &[UrlMatcher], placeholder: &str) -> Vec<UrlFinding> {
    let Some(query) = candidate_query(matchers) else {
        return Vec::new();
    };

    let mut ctx = MatchContext::new(placeholder);
    let mut claims = Claims::default();
    let mut out = Vec::new();

    for node in root.query_nodes(&query) {
        let claimed = claims.covers(&node.span());
        for matcher in matchers.iter().filter(|m| m.target() == node.kind()) {
            if claimed && matcher.is_catch_all() {
                continue;
            }
            let Some(finding) = matcher.extract(node, &mut ctx) else {
                continue;
            };
            if let Some(span) = finding.url_span.clone() {
                claims.push(span);
            }
            if let Some(finding) = normalize(finding, placeholder) {
                out.push(finding);
            }
            break;
        }
    }
    out
}

const DROPPED_SCHEMES: &[&str] = &["data:", "tel:", "about:", "javascript:"];
const DROPPED_HOSTS: &[&str] = &["www.w3.org"];

/// Decode the URL, discard useless ones, and fold its own query string
/// into `query_params`.
pub(crate) fn normalize(mut finding: UrlFinding, placeholder: &str) -> Option<UrlFinding> {
    finding.url = decode(&finding.url);

    let lower = finding.url.to_ascii_lowercase();
    if DROPPED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return None;
    }

    if !has_literal_content(&finding.url, placeholder) {
        return None;
    }

    if let Some(parts) = UrlParts::parse(&finding.url) {
        if parts.host.as_deref().is_some_and(|h| DROPPED_HOSTS.contains(&h)) {
            return None;
        }
        finding.query_params.extend(
            parts
                .query_names()
                .filter(|name| *name != placeholder)
                .map(str::to_string),
        );
    }

    dedup_in_order(&mut finding.query_params);
    dedup_in_order(&mut finding.body_params);
    Some(finding)
}

// Anything besides placeholders and separators counts.
fn has_literal_content(url: &str, placeholder: &str) -> bool {
    let content: String = url.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let marker: String = placeholder.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if marker.is_empty() {
        return !content.is_empty();
    }
    !content.replace(&marker, "").is_empty()
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;

    fn urls(src: &str) -> Vec<UrlFinding> {
        Analyzer::new(src.as_bytes()).expect("parse").urls()
    }

    #[test]
    fn location_assignment_claims_its_literals() {
        let found = urls(r#"document.location = "/login?redirect=" + redirect + "&method=oauth";"#);
        assert_eq!(found.len(), 1);
        let f = &found[0];
        assert_eq!(f.kind, UrlKind::LocationAssignment);
        assert_eq!(f.url, "/login?redirect=EXPR&method=oauth");
        assert_eq!(f.method, "GET");
        assert_eq!(f.query_params, vec!["redirect", "method"]);
        assert!(f.body_params.is_empty());
    }

    #[test]
    fn assignment_needs_leading_literal() {
        let found = urls(r#"location.href = base + "/path.html";"#);
        assert!(found.iter().all(|f| f.kind == UrlKind::StringLiteral));
        let found = urls(r#"img.src = "/static/logo.png";"#);
        assert_eq!(found[0].kind, UrlKind::LocationAssignment);
    }

    #[test]
    fn fetch_reads_init_object() {
        let found = urls(
            r#"fetch("/api/users?page=2", {method: "post", headers: {"Content-Type": "application/json", "X-Requested-With": "fetch"}});"#,
        );
        assert_eq!(found.len(), 1);
        let f = &found[0];
        assert_eq!(f.kind, UrlKind::Fetch);
        assert_eq!(f.method, "POST");
        assert_eq!(f.query_params, vec!["page"]);
        assert_eq!(f.content_type, "application/json");
        assert_eq!(f.headers.get("X-Requested-With").map(String::as_str), Some("fetch"));
    }

    #[test]
    fn fetch_defaults_to_get() {
        let found = urls(r#"fetch('/api/ping');"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].method, "GET");
        assert!(found[0].headers.is_empty());
    }

    #[test]
    fn navigation_calls() {
        let found = urls(r#"window.open("https://example.com/help"); location.replace("/home");"#);
        let kinds: Vec<_> = found.iter().map(|f| f.kind.clone()).collect();
        assert_eq!(kinds, vec![UrlKind::WindowOpen, UrlKind::LocationReplacement]);
        assert_eq!(found[1].url, "/home");
    }

    #[test]
    fn generic_calls_record_callee() {
        let found = urls(r#"api.request("/v2/orders.json"); log("hello world");"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, UrlKind::Call("api.request".into()));
        assert_eq!(found[0].kind.as_str(), "api.request");
    }

    #[test]
    fn string_literals_are_the_fallback() {
        let found = urls(r#"var endpoints = ["https://cdn.example.com/lib.js", "not a url", "/api/v1/\x75sers"];"#);
        let got: Vec<_> = found.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(got, vec!["https://cdn.example.com/lib.js", "/api/v1/users"]);
        assert!(found.iter().all(|f| f.kind == UrlKind::StringLiteral && f.method.is_empty()));
    }

    #[test]
    fn junk_is_dropped() {
        assert!(urls(r#"location.href = "javascript:void(0)";"#).is_empty());
        assert!(urls(r#"var ns = "http://www.w3.org/2000/svg";"#).is_empty());
        assert!(urls(r#"location = "" + next;"#).is_empty());
        assert!(urls(r#"var d = "data:image/png;base64,AAAA";"#).is_empty());
        assert!(urls(r#"location.href = "tel:+15551234";"#).is_empty());
        assert!(urls(r#"window.open("about:blank");"#).is_empty());
        assert!(urls(r#"location.href = "/" + a + "/" + b;"#).is_empty());
    }

    #[test]
    fn digits_count_as_literal_content() {
        let found = urls(r#"location.href = "/123/" + id;"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "/123/EXPR");
    }

    #[test]
    fn placeholder_param_names_are_skipped() {
        let found = urls(r#"location.href = "/search?" + key + "=1&q=" + q;"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "/search?EXPR=1&q=EXPR");
        assert_eq!(found[0].query_params, vec!["q"]);
    }

    #[test]
    fn custom_matchers_extend_the_candidates() {
        let mut analyzer = Analyzer::new(b"const req = new Request('/api/items');").expect("parse");
        analyzer.add_url_matcher(UrlMatcher::custom("new_expression", |node, _| {
            let ctor = node.child_by_field("constructor")?;
            if ctor.content() != "Request" {
                return None;
            }
            let arg = node.child_by_field("arguments")?.named_child(0)?;
            Some(
                UrlFinding::new(arg.raw_string(), UrlKind::Call("new Request".into()), node)
                    .with_method("GET")
                    .claiming(arg),
            )
        }));
        let found = analyzer.urls();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind.as_str(), "new Request");
        assert_eq!(found[0].url, "/api/items");
    }

    #[test]
    fn findings_serialize_with_expected_fields() {
        let found = urls(r#"fetch("/a.json");"#);
        let json = serde_json::to_value(&found[0]).expect("serializes");
        assert_eq!(json["kind"], "fetch");
        assert_eq!(json["queryParams"], serde_json::json!([]));
        assert_eq!(json["bodyParams"], serde_json::json!([]));
        assert!(json.get("headers").is_none());
        assert!(json.get("url_span").is_none());
        assert_eq!(json["sourceText"], r#"fetch("/a.json")"#);
    }

    #[test]
    fn claims_track_nesting() {
        let mut claims = Claims::default();
        claims.push(10..20);
        assert!(claims.covers(&(12..15)));
        assert!(!claims.covers(&(5..8)));
        assert!(!claims.covers(&(25..30)));
        assert!(claims.spans.is_empty());
    }
}
