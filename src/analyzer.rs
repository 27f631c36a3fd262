use std::cell::RefCell;

use thiserror::Error;
use tree_sitter::{Parser, QueryError, Tree};

use crate::html;
use crate::node::{compile_query, js_language, Node, QueryResult};
use crate::secrets::{find_secrets, SecretFinding, SecretMatcher};
use crate::urls::{find_urls, UrlFinding, UrlMatcher};
#[cfg(test)]
use crate::urls::UrlKind;

pub const DEFAULT_PLACEHOLDER: &str = "EXPR";

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("failed to load the JavaScript grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("parser produced no syntax tree")]
    Parse,
}

#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Stands in for every non-literal operand of a collapsed string.
    pub placeholder: String,
    /// Enable the noisy `reactApp` and `genericSecret` matchers.
    pub research_matchers: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        AnalyzerOptions {
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            research_matchers: false,
        }
    }
}

thread_local! {
    static PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

fn parse(source: &str) -> Result<Tree, AnalyzerError> {
    PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            let mut parser = Parser::new();
            parser.set_language(js_language())?;
            *slot = Some(parser);
        }
        let parser = slot.as_mut().ok_or(AnalyzerError::Parse)?;
        parser.parse(source, None).ok_or(AnalyzerError::Parse)
    })
}

/// One parsed source document plus the matcher tables run against it.
///
/// Syntax errors never fail construction; extraction simply works on
/// whatever the parser recovered.
pub struct Analyzer {
    source: String,
    tree: Tree,
    options: AnalyzerOptions,
    url_matchers: Vec<UrlMatcher>,
    secret_matchers: Vec<SecretMatcher>,
}

impl Analyzer {
    pub fn new(source: &[u8]) -> Result<Self, AnalyzerError> {
        Self::with_options(source, AnalyzerOptions::default())
    }

    pub fn with_options(source: &[u8], options: AnalyzerOptions) -> Result<Self, AnalyzerError> {
        let mut source = String::from_utf8_lossy(source).into_owned();
        let mut tree = parse(&source)?;

        // A page saved as .js, or HTML piped on stdin: analyze its scripts.
        if tree.root_node().has_error() && html::looks_like_html(source.as_bytes()) {
            if let Some(scripts) = html::extract_inline_scripts(&source) {
                log::debug!("Input looks like HTML; analyzing {} bytes of inline script", scripts.len());
                tree = parse(&scripts)?;
                source = scripts;
            }
        }

        Ok(Analyzer {
            source,
            tree,
            options,
            url_matchers: UrlMatcher::defaults(),
            secret_matchers: SecretMatcher::defaults(),
        })
    }

    pub fn root(&self) -> Node<'_> {
        Node::new(self.tree.root_node(), &self.source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Every captured node of `pattern`, in document order.
    pub fn query(&self, pattern: &str) -> Result<Vec<Node<'_>>, QueryError> {
        let query = compile_query(pattern)?;
        Ok(self.root().query_nodes(&query))
    }

    /// One result per match of `pattern`, with captures grouped by name.
    pub fn query_multi(&self, pattern: &str) -> Result<Vec<QueryResult<'_>>, QueryError> {
        let query = compile_query(pattern)?;
        Ok(self.root().query_matches(&query))
    }

    /// Add a URL matcher after the specific built-in ones. The catch-all
    /// matchers keep the lowest priority.
    pub fn add_url_matcher(&mut self, matcher: UrlMatcher) {
        let at = self
            .url_matchers
            .iter()
            .position(UrlMatcher::is_catch_all)
            .unwrap_or(self.url_matchers.len());
        self.url_matchers.insert(at, matcher);
    }

    pub fn add_secret_matchers(&mut self, matchers: impl IntoIterator<Item = SecretMatcher>) {
        self.secret_matchers.extend(matchers);
    }

    pub fn replace_secret_matchers(&mut self, matchers: Vec<SecretMatcher>) {
        self.secret_matchers = matchers;
    }

    pub fn urls(&self) -> Vec<UrlFinding> {
        find_urls(self.root(), &self.url_matchers, &self.options.placeholder)
    }

    pub fn secrets(&self) -> Vec<SecretFinding> {
        find_secrets(self.root(), &self.secret_matchers, self.options.research_matchers)
    }
}
