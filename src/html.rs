use memchr::memmem;
use scraper::{Html, Selector};

const SNIFF_LEN: usize = 4096;
const MARKERS: &[&[u8]] = &[b"<!doctype", b"<html", b"<head", b"<body", b"<script"];

/// Cheap check on the start of the buffer for tell-tale HTML tags.
pub fn looks_like_html(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(SNIFF_LEN)];
    let lower = sample.to_ascii_lowercase();
    MARKERS.iter().any(|m| memmem::find(&lower, m).is_some())
}

/// Text of every inline `<script>` element, joined with newlines. `None`
/// when the document has no inline script at all.
pub fn extract_inline_scripts(document: &str) -> Option<String> {
    let selector = Selector::parse("script").ok()?;
    let html = Html::parse_document(document);
    let scripts: Vec<String> = html
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect();
    if scripts.is_empty() {
        None
    } else {
        Some(scripts.join("\n"))
    }
}
