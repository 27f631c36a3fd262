use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::node::Node;
use crate::secrets::{object_context, SecretFinding, SecretMatcher, Severity};

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("failed to read pattern file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pattern JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pattern {name:?}: invalid regex: {source}")]
    Regex {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("pattern {name:?}: 'key', 'value', both, or 'object' must be supplied")]
    NoCriteria { name: String },
}

/// A user-defined secret pattern as written in a JSON pattern file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPattern {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "keyPattern")]
    pub key: Option<String>,
    #[serde(default, alias = "valuePattern")]
    pub value: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, alias = "nestedPatterns")]
    pub object: Vec<UserPattern>,
}

impl UserPattern {
    pub fn compile(&self) -> Result<CompiledPattern, PatternError> {
        let key = self.regex(self.key.as_deref())?;
        let value = self.regex(self.value.as_deref())?;
        let object = self
            .object
            .iter()
            .map(|nested| {
                let compiled = nested.compile()?;
                if compiled.key.is_none() && compiled.value.is_none() {
                    return Err(PatternError::NoCriteria {
                        name: nested.name.clone(),
                    });
                }
                Ok(compiled)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if key.is_none() && value.is_none() && object.is_empty() {
            return Err(PatternError::NoCriteria {
                name: self.name.clone(),
            });
        }

        Ok(CompiledPattern {
            name: self.name.clone(),
            key,
            value,
            severity: self.severity,
            object,
        })
    }

    fn regex(&self, source: Option<&str>) -> Result<Option<Regex>, PatternError> {
        match source.filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(s) => Regex::new(s).map(Some).map_err(|source| PatternError::Regex {
                name: self.name.clone(),
                source,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub name: String,
    key: Option<Regex>,
    value: Option<Regex>,
    pub severity: Severity,
    object: Vec<CompiledPattern>,
}

impl CompiledPattern {
    pub fn matches_key(&self, key: &str) -> bool {
        self.key.as_ref().map_or(true, |re| re.is_match(key))
    }

    pub fn matches_value(&self, value: &str) -> bool {
        self.value.as_ref().map_or(true, |re| re.is_match(value))
    }

    pub(crate) fn query(&self) -> &'static str {
        if !self.object.is_empty() {
            "(object) @matches"
        } else if self.key.is_some() {
            "(pair) @matches"
        } else {
            "(string) @matches"
        }
    }

    pub(crate) fn extract(&self, node: Node<'_>) -> Option<SecretFinding> {
        if !self.object.is_empty() {
            self.match_object(node)
        } else if self.key.is_some() {
            self.match_pair(node)
        } else {
            self.match_string(node)
        }
    }

    fn match_object(&self, node: Node<'_>) -> Option<SecretFinding> {
        let pairs = node.named_children();
        let all_present = self
            .object
            .iter()
            .all(|nested| pairs.iter().any(|&pair| nested.pair_parts(pair).is_some()));
        if !all_present {
            return None;
        }
        Some(self.finding(node.as_object().as_map()))
    }

    fn match_pair(&self, node: Node<'_>) -> Option<SecretFinding> {
        let (key, value) = self.pair_parts(node)?;
        let data = BTreeMap::from([
            ("key".to_string(), key.to_string()),
            ("value".to_string(), value.to_string()),
        ]);
        let mut finding = self.finding(data);
        finding.context = node
            .parent()
            .filter(|p| p.kind() == "object")
            .map(|p| p.as_object().as_map());
        Some(finding)
    }

    fn match_string(&self, node: Node<'_>) -> Option<SecretFinding> {
        let text = node.raw_string();
        if !self.matches_value(text) {
            return None;
        }
        let mut finding = self.finding(BTreeMap::from([("match".to_string(), text.to_string())]));
        finding.context = object_context(node);
        Some(finding)
    }

    fn pair_parts<'a>(&self, pair: Node<'a>) -> Option<(&'a str, &'a str)> {
        if pair.kind() != "pair" {
            return None;
        }
        let key = pair.child_by_field("key")?.raw_string();
        if !self.matches_key(key) {
            return None;
        }
        let value = pair.child_by_field("value").filter(|v| v.kind() == "string")?;
        let value = value.raw_string();
        self.matches_value(value).then_some((key, value))
    }

    fn finding(&self, data: BTreeMap<String, String>) -> SecretFinding {
        SecretFinding::new(self.name.clone(), self.severity, data)
    }
}

/// Parse and compile a JSON array of patterns. Any bad pattern fails the
/// whole set.
pub fn parse_user_patterns(reader: impl Read) -> Result<Vec<SecretMatcher>, PatternError> {
    let patterns: Vec<UserPattern> = serde_json::from_reader(reader)?;
    patterns
        .iter()
        .map(|p| p.compile().map(SecretMatcher::user))
        .collect()
}

pub fn load_user_patterns(path: impl AsRef<Path>) -> Result<Vec<SecretMatcher>, PatternError> {
    let file = File::open(path)?;
    parse_user_patterns(BufReader::new(file))
}
