use crate::node::Node;
use crate::object::Object;
use crate::urls::{argument, callee, MatchContext, UrlFinding, UrlKind};

const JQUERY_CALLS: &[&str] = &[
    "$.get",
    "$.post",
    "$.ajax",
    "jQuery.get",
    "jQuery.post",
    "jQuery.ajax",
];

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// `$.get`, `$.post` and `$.ajax` in their three call shapes:
/// `(url, data)`, `(url, settings)` and `(settings)`.
pub(crate) fn match_jquery<'a>(node: Node<'a>, ctx: &MatchContext<'a>) -> Option<UrlFinding> {
    let name = callee(node)?;
    if !JQUERY_CALLS.contains(&name) {
        return None;
    }
    let first = argument(node, 0)?;
    let second = argument(node, 1);
    let is_ajax = name.ends_with(".ajax");

    let mut finding = UrlFinding::new(String::new(), UrlKind::JqueryAjax, node);
    if name.ends_with(".post") {
        finding.method = "POST".to_string();
    } else if name.ends_with(".get") {
        finding.method = "GET".to_string();
    }

    let mut settings = None;
    if first.is_stringy() {
        finding.url = first.collapsed_string(ctx.placeholder);
        finding = finding.claiming(first);
        if is_ajax {
            settings = second;
        } else {
            let params = second.map(|n| n.as_object().keys()).unwrap_or_default();
            if finding.method == "GET" {
                finding.query_params = params;
            } else {
                finding.body_params = params;
                finding.content_type = FORM_CONTENT_TYPE.to_string();
            }
        }
    } else if first.kind() == "object" {
        settings = Some(first);
    }

    if let Some(settings) = settings {
        apply_settings(&mut finding, settings.as_object(), ctx.placeholder);
    }
    if finding.method.is_empty() {
        finding.method = "GET".to_string();
    }

    if finding.url.is_empty() {
        return None;
    }
    Some(finding)
}

fn apply_settings(finding: &mut UrlFinding, settings: Object<'_>, placeholder: &str) {
    if finding.url.is_empty() {
        if let Some(url) = settings.get_node("url") {
            finding.url = url.collapsed_string(placeholder);
            finding.url_span = Some(url.span());
        }
    }

    let headers = settings.get_object("headers");
    finding.headers = headers.as_map();

    if finding.method.is_empty() {
        let fallback = settings.get_string("type", "GET");
        finding.method = settings.get_string("method", &fallback).to_ascii_uppercase();
    }

    let params = settings.get_object("data").keys();
    if finding.method == "GET" {
        finding.query_params = params;
    } else {
        finding.body_params = params;
        let declared = headers.get_string_ci("content-type", "");
        finding.content_type = if declared.is_empty() {
            settings.get_string("contentType", FORM_CONTENT_TYPE)
        } else {
            declared
        };
    }
}
