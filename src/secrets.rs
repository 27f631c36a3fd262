use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::node::{compile_query, Node};
use crate::patterns::CompiledPattern;
use crate::strings::decode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecretFinding {
    pub kind: String,
    pub severity: Severity,
    pub data: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl SecretFinding {
    pub fn new(kind: impl Into<String>, severity: Severity, data: BTreeMap<String, String>) -> Self {
        SecretFinding {
            kind: kind.into(),
            severity,
            data,
            context: None,
            filename: None,
        }
    }
}

pub type CustomSecretFn = Arc<dyn Fn(Node<'_>) -> Option<SecretFinding> + Send + Sync>;

/// One entry of the ordered secret matcher table.
#[derive(Clone)]
pub enum SecretMatcher {
    AwsAccessKey,
    GoogleApiKey,
    Firebase,
    GithubToken,
    /// Objects with `REACT_APP_` keys. Noisy; runs only in research mode.
    ReactApp,
    /// Any pair whose key mentions "secret". Noisy; runs only in research mode.
    GenericSecret,
    User(Arc<CompiledPattern>),
    Custom { query: String, extract: CustomSecretFn },
}

impl fmt::Debug for SecretMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretMatcher::AwsAccessKey => f.write_str("AwsAccessKey"),
            SecretMatcher::GoogleApiKey => f.write_str("GoogleApiKey"),
            SecretMatcher::Firebase => f.write_str("Firebase"),
            SecretMatcher::GithubToken => f.write_str("GithubToken"),
            SecretMatcher::ReactApp => f.write_str("ReactApp"),
            SecretMatcher::GenericSecret => f.write_str("GenericSecret"),
            SecretMatcher::User(p) => write!(f, "User({})", p.name),
            SecretMatcher::Custom { query, .. } => write!(f, "Custom({query})"),
        }
    }
}

const STRING_QUERY: &str = "(string) @matches";
const OBJECT_QUERY: &str = "(object) @matches";
const PAIR_QUERY: &str = "(pair) @matches";

impl SecretMatcher {
    pub fn defaults() -> Vec<SecretMatcher> {
        vec![
            SecretMatcher::AwsAccessKey,
            SecretMatcher::ReactApp,
            SecretMatcher::GoogleApiKey,
            SecretMatcher::Firebase,
            SecretMatcher::GenericSecret,
            SecretMatcher::GithubToken,
        ]
    }

    pub fn user(pattern: CompiledPattern) -> Self {
        SecretMatcher::User(Arc::new(pattern))
    }

    pub fn custom<F>(query: impl Into<String>, extract: F) -> Self
    where
        F: Fn(Node<'_>) -> Option<SecretFinding> + Send + Sync + 'static,
    {
        SecretMatcher::Custom {
            query: query.into(),
            extract: Arc::new(extract),
        }
    }

    pub fn query(&self) -> &str {
        match self {
            SecretMatcher::AwsAccessKey | SecretMatcher::GoogleApiKey | SecretMatcher::GithubToken => {
                STRING_QUERY
            }
            SecretMatcher::Firebase | SecretMatcher::ReactApp => OBJECT_QUERY,
            SecretMatcher::GenericSecret => PAIR_QUERY,
            SecretMatcher::User(p) => p.query(),
            SecretMatcher::Custom { query, .. } => query,
        }
    }

    fn is_research(&self) -> bool {
        matches!(self, SecretMatcher::ReactApp | SecretMatcher::GenericSecret)
    }

    pub(crate) fn extract(&self, node: Node<'_>, research: bool) -> Option<SecretFinding> {
        if self.is_research() && !research {
            return None;
        }
        match self {
            SecretMatcher::AwsAccessKey => {
                cloud_key(node, "AWSAccessKey", |key| {
                    AWS_PREFIXES.iter().any(|p| key.starts_with(p))
                        && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
                })
            }
            SecretMatcher::GoogleApiKey => cloud_key(node, "gcpKey", |key| {
                key.strip_prefix(GOOGLE_PREFIX).is_some_and(|rest| {
                    !rest.is_empty()
                        && rest
                            .bytes()
                            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'_' | b'-'))
                })
            }),
            SecretMatcher::Firebase => firebase(node),
            SecretMatcher::GithubToken => github_token(node),
            SecretMatcher::ReactApp => react_app(node),
            SecretMatcher::GenericSecret => generic_secret(node),
            SecretMatcher::User(p) => p.extract(node),
            SecretMatcher::Custom { extract, .. } => extract(node),
        }
    }
}

const AWS_PREFIXES: &[&str] = &["AKIA", "A3T", "AGPA", "AIDA", "AROA", "AIPA", "ANPA", "ANVA", "ASIA"];
const GOOGLE_PREFIX: &str = "AIza";
const CLOUD_KEY_LEN: std::ops::RangeInclusive<usize> = 16..=128;

/// The enclosing object of a string that is the value of a pair.
pub(crate) fn object_context(node: Node<'_>) -> Option<BTreeMap<String, String>> {
    enclosing_object(node).map(|o| o.as_map())
}

fn enclosing_object<'a>(node: Node<'a>) -> Option<crate::object::Object<'a>> {
    let pair = node.parent().filter(|p| p.kind() == "pair")?;
    let object = pair.parent().filter(|p| p.kind() == "object")?;
    Some(object.as_object())
}

fn cloud_key(node: Node<'_>, kind: &str, shape: impl Fn(&str) -> bool) -> Option<SecretFinding> {
    let key = node.raw_string();
    if !CLOUD_KEY_LEN.contains(&key.len()) || !shape(key) {
        return None;
    }

    let mut finding = SecretFinding::new(kind, Severity::Low, BTreeMap::from([("key".to_string(), key.to_string())]));

    let Some(object) = enclosing_object(node) else {
        return Some(finding);
    };
    finding.context = Some(object.as_map());

    let secret = object
        .keys()
        .into_iter()
        .find(|k| k.to_ascii_lowercase().contains("secret"))
        .map(|k| decode(&object.get_string(&k, "")));
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        finding.severity = Severity::High;
        finding.data.insert("secret".to_string(), secret);
    }
    Some(finding)
}

const FIREBASE_KEYS: &[&str] = &["apiKey", "authDomain", "projectId", "storageBucket"];

fn firebase(node: Node<'_>) -> Option<SecretFinding> {
    let object = node.as_object();
    let keys = object.keys();
    if !FIREBASE_KEYS.iter().all(|k| keys.iter().any(|have| have == k)) {
        return None;
    }
    if !object.get_string_ci("apiKey", "").starts_with(GOOGLE_PREFIX) {
        return None;
    }
    Some(SecretFinding::new("firebase", Severity::High, object.as_map()))
}

static GITHUB_TOKEN: OnceLock<Option<Regex>> = OnceLock::new();

fn github_token_pattern() -> Option<&'static Regex> {
    GITHUB_TOKEN
        .get_or_init(|| match Regex::new(r"([a-zA-Z0-9_-]{2,}:)?ghp_[a-zA-Z0-9]{30,}") {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("GitHub token pattern failed to compile: {e}");
                None
            }
        })
        .as_ref()
}

fn github_token(node: Node<'_>) -> Option<SecretFinding> {
    let text = node.raw_string();
    // Cheap filter first; most strings never get near the regex.
    if !text.contains("ghp_") || !github_token_pattern()?.is_match(text) {
        return None;
    }
    let mut finding = SecretFinding::new("githubKey", Severity::Low, BTreeMap::from([("key".to_string(), text.to_string())]));
    finding.context = object_context(node);
    Some(finding)
}

fn react_app(node: Node<'_>) -> Option<SecretFinding> {
    let object = node.as_object();
    if !object.keys().iter().any(|k| k.starts_with("REACT_APP_")) {
        return None;
    }
    Some(SecretFinding::new("reactApp", Severity::Info, object.as_map()))
}

fn generic_secret(node: Node<'_>) -> Option<SecretFinding> {
    let key = node.child_by_field("key")?.raw_string();
    if !key.to_ascii_lowercase().contains("secret") {
        return None;
    }
    let value = node.child_by_field("value").filter(|v| v.kind() == "string")?;
    let mut finding = SecretFinding::new(
        "genericSecret",
        Severity::Info,
        BTreeMap::from([(key.to_string(), value.raw_string().to_string())]),
    );
    finding.context = node
        .parent()
        .filter(|p| p.kind() == "object")
        .map(|p| p.as_object().as_map());
    Some(finding)
}

/// Run every matcher over the nodes its query selects. Each distinct query
/// runs once; output follows matcher order, then node order.
pub(crate) fn find_secrets(root: Node<'_>, matchers: &[SecretMatcher], research: bool) -> Vec<SecretFinding> {
    let mut selected: HashMap<&str, Vec<Node<'_>>> = HashMap::new();
    let mut out = Vec::new();

    for matcher in matchers {
        if matcher.is_research() && !research {
            continue;
        }
        let query_text = matcher.query();
        let nodes = selected.entry(query_text).or_insert_with(|| match compile_query(query_text) {
            Ok(query) => root.query_nodes(&query),
            Err(e) => {
                warn!("Skipping secret matcher {matcher:?}: {e}");
                Vec::new()
            }
        });
        out.extend(nodes.iter().filter_map(|&node| matcher.extract(node, research)));
    }
    out
}
