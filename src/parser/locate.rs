use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[src]").unwrap());

/// Element that wraps the first comment containing `marker`.
pub fn by_marker<'a>(doc: &'a Html, marker: &str) -> Option<ElementRef<'a>> {
    doc.tree
        .root()
        .descendants()
        .find(|node| matches!(node.value(), Node::Comment(c) if c.contains(marker)))
        .and_then(|comment| comment.parent())
        .and_then(ElementRef::wrap)
}

/// Cell next to the first `<td>` whose text matches `label`.
pub fn by_label<'a>(doc: &'a Html, label: &Regex) -> Option<ElementRef<'a>> {
    for td in doc.select(&TD) {
        let text = element_text(td);
        if !label.is_match(&text) {
            continue;
        }
        debug!("label {} matched cell {:?}", label.as_str(), text);
        let next = td
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|sib| sib.value().name() == "td");
        if next.is_some() {
            return next;
        }
    }
    None
}

/// Marker comment first, then the label cell.
pub fn locate<'a>(doc: &'a Html, marker: &str, label: &Regex) -> Option<ElementRef<'a>> {
    match by_marker(doc, marker) {
        Some(el) => Some(el),
        None => {
            debug!("marker {} not found, trying label", marker);
            by_label(doc, label)
        }
    }
}

/// Trimmed text fragments joined by single spaces.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(|t| t.replace('\u{a0}', " "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text with line structure kept: `<br>` and text-node boundaries become
/// newlines.
pub fn element_lines(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(t) => {
                out.push_str(&t.replace('\u{a0}', " "));
                out.push('\n');
            }
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

pub fn first_img_src(el: ElementRef<'_>) -> Option<String> {
    el.select(&IMG)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| src.trim().to_string())
}
