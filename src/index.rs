use std::sync::LazyLock;

use chrono::{Datelike, Local};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{info, warn};

const START_MARKER: &str = "enter new event below";
const END_MARKER: &str = "end of last event";

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Event page links from the bulletin index, in page order.
pub fn extract_links(doc: &Html) -> Vec<String> {
    extract_links_for_year(doc, Local::now().year())
}

/// Same as [`extract_links`] with the fallback pinned to `year`.
pub fn extract_links_for_year(doc: &Html, year: i32) -> Vec<String> {
    let links = between_markers(doc);
    if !links.is_empty() {
        info!("Found {} event links between index markers", links.len());
        return links;
    }

    warn!("Index markers not found, falling back to {} filename pattern", year);
    let links = by_filename_pattern(doc, year);
    info!("Found {} event links by filename pattern", links.len());
    links
}

/// Parse index HTML into owned links.
pub fn parse_index_page(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    extract_links(&doc)
}

// Every <a href> after the start comment, up to the end comment.
fn between_markers(doc: &Html) -> Vec<String> {
    let mut links = Vec::new();
    let mut inside = false;

    for node in doc.tree.root().descendants() {
        match node.value() {
            Node::Comment(c) if !inside && c.contains(START_MARKER) => inside = true,
            Node::Comment(c) if inside && c.contains(END_MARKER) => break,
            Node::Element(el) if inside && el.name() == "a" => {
                if let Some(href) = el.attr("href") {
                    links.push(href.to_string());
                }
            }
            _ => {}
        }
    }
    links
}

fn by_filename_pattern(doc: &Html, year: i32) -> Vec<String> {
    let Ok(re) = Regex::new(&format!(r"{}_\d{{4}}_\d{{4}}.*\.html", year)) else {
        return Vec::new();
    };
    doc.select(&ANCHOR)
        .filter_map(|a: ElementRef<'_>| a.value().attr("href"))
        .filter(|href| re.is_match(href))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKED: &str = r#"<html><body>
        <a href="/index.html">Home</a>
        <table>
        <!-- enter new event below -->
        <tr><td><a href="2025_Earthquake_Information\August\2025_0803_0147_B2.html">03 Aug</a></td></tr>
        <tr><td><a href="2025_Earthquake_Information/August/2025_0802_2210_B1.html">02 Aug</a></td></tr>
        <!-- end of last event -->
        <tr><td><a href="archive.html">Archive</a></td></tr>
        </table>
    </body></html>"#;

    #[test]
    fn links_between_markers() {
        let doc = Html::parse_document(MARKED);
        let links = extract_links_for_year(&doc, 2025);
        assert_eq!(
            links,
            vec![
                r"2025_Earthquake_Information\August\2025_0803_0147_B2.html",
                "2025_Earthquake_Information/August/2025_0802_2210_B1.html",
            ]
        );
    }

    #[test]
    fn missing_end_marker_runs_to_document_end() {
        let html = r#"<html><body><!-- enter new event below -->
            <a href="a.html">a</a><div><a href="b.html">b</a></div></body></html>"#;
        let doc = Html::parse_document(html);
        assert_eq!(extract_links_for_year(&doc, 2025), vec!["a.html", "b.html"]);
    }

    #[test]
    fn fallback_matches_current_year_filenames() {
        let year = Local::now().year();
        let html = format!(
            r#"<html><body>
            <a href="{y}_Earthquake_Information/{y}_0101_0000_B1.html">new</a>
            <a href="{prev}_Earthquake_Information/{prev}_1231_2359_B1.html">old</a>
            <a href="about.html">about</a>
            </body></html>"#,
            y = year,
            prev = year - 1
        );
        let links = parse_index_page(&html);
        assert_eq!(links.len(), 1);
        assert!(links[0].ends_with(&format!("{}_0101_0000_B1.html", year)));
    }

    #[test]
    fn fallback_keeps_page_order() {
        let html = r#"<html><body>
            <a href="2025_Earthquake_Information/2025_0802_2210_B1.html">later</a>
            <a href="notes.html">notes</a>
            <a href="2025_Earthquake_Information/2025_0115_0300_B3.html">earlier</a>
            </body></html>"#;
        let doc = Html::parse_document(html);
        assert_eq!(
            extract_links_for_year(&doc, 2025),
            vec![
                "2025_Earthquake_Information/2025_0802_2210_B1.html",
                "2025_Earthquake_Information/2025_0115_0300_B3.html",
            ]
        );
    }

    #[test]
    fn nothing_found() {
        let doc = Html::parse_document("<html><body><p>maintenance</p></body></html>");
        assert!(extract_links(&doc).is_empty());
    }
}
