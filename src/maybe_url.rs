use url::{ParseError, Url};

const FILE_EXTENSIONS: &[&str] = &[
    "js", "css", "html", "htm", "xhtml", "xlsx", "xls", "docx", "doc", "pdf", "rss", "xml", "php",
    "phtml", "asp", "aspx", "asmx", "ashx", "cgi", "pl", "rb", "py", "do", "jsp", "jspa", "json",
    "jsonp", "txt",
];

const DISALLOWED: &[char] = &[
    ' ', '(', ')', '!', '<', '>', '\'', '"', '`', '{', '}', '^', '$', ',',
];

// Relative references are resolved against this to get at their path and query.
const PLACEHOLDER_BASE: &str = "http://relative.invalid/";

/// Cheap test for whether a string literal is worth treating as a URL or path.
pub fn maybe_url(candidate: &str) -> bool {
    if !candidate.contains(&['/', '?', '.'][..]) {
        return false;
    }
    if candidate.contains(DISALLOWED) {
        return false;
    }
    if candidate.starts_with('/') {
        return true;
    }

    let Some(parts) = UrlParts::parse(candidate) else {
        return false;
    };

    if let Some(scheme) = parts.scheme.as_deref() {
        if scheme != "http" && scheme != "https" {
            return false;
        }
    }

    if parts.host.as_deref().is_some_and(|h| h.contains('.')) {
        return true;
    }

    if parts.query.iter().any(|(_, value)| !value.is_empty()) {
        return true;
    }

    match parts.path.rsplit_once('.') {
        Some((_, ext)) => FILE_EXTENSIONS.contains(&ext),
        None => false,
    }
}

/// The pieces of a URL or relative reference that matchers care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl UrlParts {
    /// Lenient parse accepting absolute URLs, scheme-relative (`//host/...`)
    /// references and relative paths.
    pub fn parse(input: &str) -> Option<UrlParts> {
        match Url::parse(input) {
            Ok(url) => Some(UrlParts::from_url(&url, true)),
            Err(ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse(PLACEHOLDER_BASE).ok()?;
                let url = base.join(input).ok()?;
                let mut parts = UrlParts::from_url(&url, input.starts_with("//"));
                parts.scheme = None;
                Some(parts)
            }
            Err(_) => None,
        }
    }

    fn from_url(url: &Url, keep_host: bool) -> UrlParts {
        UrlParts {
            scheme: Some(url.scheme().to_ascii_lowercase()),
            host: url.host_str().filter(|_| keep_host).map(str::to_string),
            path: url.path().to_string(),
            query: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn query_names(&self) -> impl Iterator<Item = &str> {
        self.query.iter().map(|(k, _)| k.as_str())
    }
}
