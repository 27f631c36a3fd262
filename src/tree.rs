use owo_colors::OwoColorize;

use crate::node::Node;

/// Render the named nodes under `root`, one per line, indented two spaces per
/// level. Leaves and strings also show their source text.
pub fn render_tree(root: Node<'_>, color: bool) -> String {
    let mut out = String::new();
    let source = root.content();
    let base = root.span().start;
    let mut cursor = root.inner().walk();
    let mut depth = 0usize;
    let mut descend = true;

    loop {
        let current = cursor.node();
        if descend && current.is_named() {
            let indent = "  ".repeat(depth);
            let field = cursor
                .field_name()
                .map(|f| format!("{f}: "))
                .unwrap_or_default();
            let text = if current.child_count() == 0 || current.kind() == "string" {
                let range = current.start_byte() - base..current.end_byte() - base;
                format!(" ({})", source.get(range).unwrap_or(""))
            } else {
                String::new()
            };
            let line = if color {
                format!("{indent}{}{}{}\n", field.dimmed(), current.kind().cyan(), text.green())
            } else {
                format!("{indent}{field}{}{text}\n", current.kind())
            };
            out.push_str(&line);
        }

        if descend && cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        if cursor.goto_next_sibling() {
            descend = true;
            continue;
        }
        if depth == 0 || !cursor.goto_parent() {
            break;
        }
        depth -= 1;
        descend = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;

    #[test]
    fn renders_fields_and_leaves() {
        let analyzer = Analyzer::new(b"fetch('/a');").expect("parse");
        let tree = render_tree(analyzer.root(), false);
        let lines: Vec<&str> = tree.lines().collect();
        assert_eq!(
            lines,
            vec![
                "program",
                "  expression_statement",
                "    call_expression",
                "      function: identifier (fetch)",
                "      arguments: arguments",
                "        string ('/a')",
                "          string_fragment (/a)",
            ]
        );
    }

    #[test]
    fn colored_output_keeps_one_line_per_node() {
        let analyzer = Analyzer::new(b"var a = {k: \"v\"};").expect("parse");
        let plain = render_tree(analyzer.root(), false);
        let colored = render_tree(analyzer.root(), true);
        assert_eq!(plain.lines().count(), colored.lines().count());
        assert!(colored.contains("pair".cyan().to_string().as_str()));
        assert!(colored.ends_with('\n'));
    }
}
