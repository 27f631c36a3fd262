use clap::{Parser, ValueEnum};

use crate::analyzer::{AnalyzerOptions, DEFAULT_PLACEHOLDER};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Extract URLs and paths
    Urls,
    /// Extract secrets and other interesting bits
    Secrets,
    /// Print the syntax tree of each input
    Tree,
    /// Run a tree-sitter query against each input
    Query,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Single,
    Ndjson,
    PerFile,
}

#[derive(Parser)]
#[command(version, about = "Extract URLs, paths and secrets from JavaScript source.", long_about = None)]
pub struct Cli {
    /// What to extract
    #[arg(value_enum)]
    pub mode: Mode,

    /// Files, directories, or URLs (read from stdin, one per line, when omitted)
    pub inputs: Vec<String>,

    /// Number of threads to use (0 = auto-detect logical cores)
    #[arg(short = 'j', long, default_value_t = 0)]
    pub threads: usize,

    /// Stand-in for non-literal parts of a concatenated string
    #[arg(short = 'P', long, default_value_t = String::from(DEFAULT_PLACEHOLDER))]
    pub placeholder: String,

    /// Cookie(s) to send when fetching URL inputs
    #[arg(short = 'C', long)]
    pub cookie: Option<String>,

    /// Extra request headers for URL inputs, e.g. -H "Authorization: Bearer x"
    #[arg(short = 'H', long)]
    pub header: Vec<String>,

    /// Read raw JavaScript source from stdin instead of a list of inputs
    #[arg(long)]
    pub raw_input: bool,

    /// Exclude glob patterns (repeatable), e.g. --exclude "**/vendor/**"
    #[arg(short = 'x', long)]
    pub exclude: Vec<String>,

    /// Write JSON output to a file (or directory with --output-format per-file)
    #[arg(long)]
    pub output: Option<String>,

    /// Output format when --output is set
    #[arg(long, value_enum, default_value_t = OutputFormat::Single)]
    pub output_format: OutputFormat,

    /// Disable colorized output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Include the filename in each record
    #[arg(short = 'f', long)]
    pub include_filename: bool,

    /// urls: ignore matches that come from bare string literals
    #[arg(short = 'I', long)]
    pub ignore_strings: bool,

    /// urls: include the source text each URL was found in
    #[arg(short = 'S', long)]
    pub include_source: bool,

    /// urls: resolve relative paths against this absolute URL
    #[arg(short = 'R', long)]
    pub resolve_paths: Option<String>,

    /// urls: report each URL only once per input
    #[arg(short = 'u', long)]
    pub unique: bool,

    /// secrets: JSON file of user-defined patterns
    #[arg(short = 'p', long)]
    pub patterns: Option<String>,

    /// secrets: also run the noisy research matchers
    #[arg(long)]
    pub research_matchers: bool,

    /// query: tree-sitter query to run, e.g. '(string) @matches'
    #[arg(short = 'q', long, required_if_eq("mode", "query"))]
    pub query: Option<String>,

    /// query: print matched source as-is instead of converting to JSON values
    #[arg(short = 'r', long)]
    pub raw_output: bool,
}

impl Cli {
    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            placeholder: self.placeholder.clone(),
            research_matchers: self.research_matchers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_and_flags() {
        let cli = Cli::try_parse_from(["jsfathom", "urls", "-S", "-P", "{x}", "a.js", "b.js"]).expect("valid");
        assert_eq!(cli.mode, Mode::Urls);
        assert_eq!(cli.inputs, vec!["a.js", "b.js"]);
        assert!(cli.include_source);
        assert_eq!(cli.analyzer_options().placeholder, "{x}");
        assert!(!cli.analyzer_options().research_matchers);
    }

    #[test]
    fn query_mode_requires_a_query() {
        assert!(Cli::try_parse_from(["jsfathom", "query", "a.js"]).is_err());
        let cli = Cli::try_parse_from(["jsfathom", "query", "-q", "(string) @s", "a.js"]).expect("valid");
        assert_eq!(cli.query.as_deref(), Some("(string) @s"));
    }

    #[test]
    fn output_format_values() {
        let cli = Cli::try_parse_from(["jsfathom", "secrets", "--output", "out", "--output-format", "per-file"])
            .expect("valid");
        assert_eq!(cli.output_format, OutputFormat::PerFile);
        assert_eq!(cli.placeholder, DEFAULT_PLACEHOLDER);
    }
}
