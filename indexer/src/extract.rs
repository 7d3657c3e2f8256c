//! Corpus input: pre-extracted field records or stored raw HTML pages.

use engine::Document;
use scraper::Html;
use serde::Deserialize;
use url::Url;

/// A raw page as stored by the crawl: the fetched URL and its HTML.
#[derive(Debug, Deserialize)]
pub struct RawPage {
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InputRecord {
    Page(RawPage),
    Fields(Document),
}

impl InputRecord {
    pub fn into_document(self) -> Document {
        match self {
            InputRecord::Page(page) => extract_fields(&page.url, &page.content),
            InputRecord::Fields(mut doc) => {
                doc.url = strip_fragment(&doc.url);
                doc
            }
        }
    }
}

pub fn strip_fragment(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut u) => {
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => raw.trim().to_string(),
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Zone {
    Skip,
    Body,
    Bold,
    Heading,
    Title,
}

/// Highest-priority zone among a text node's enclosing elements.
/// Script-like containers hide their text entirely.
fn zone_of<'a, I: Iterator<Item = &'a str>>(ancestors: I) -> Zone {
    let mut zone = Zone::Skip;
    for name in ancestors {
        let z = match name {
            "script" | "style" | "noscript" | "template" => return Zone::Skip,
            "title" => Zone::Title,
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Zone::Heading,
            "b" | "strong" => Zone::Bold,
            "body" => Zone::Body,
            _ => continue,
        };
        zone = zone.max(z);
    }
    zone
}

/// Split an HTML page into field text. Every text node is attributed to
/// exactly one field, so heading and bold text is not counted again as body.
pub fn extract_fields(url: &str, html: &str) -> Document {
    let parsed = Html::parse_document(html);
    let mut doc = Document { url: strip_fragment(url), ..Default::default() };

    for node in parsed.tree.root().descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let text: &str = text;
        if text.trim().is_empty() {
            continue;
        }
        let names = node.ancestors().filter_map(|a| a.value().as_element().map(|e| e.name()));
        let target = match zone_of(names) {
            Zone::Title => &mut doc.title,
            Zone::Heading => &mut doc.heading,
            Zone::Bold => &mut doc.bold,
            Zone::Body => &mut doc.body,
            Zone::Skip => continue,
        };
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(text.trim());
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_attributed_once() {
        let html = r#"<html><head><title>UCI Home</title><script>var x = 1;</script></head>
            <body><h1>Welcome <b>Anteaters</b></h1><p>Some <strong>bold</strong> words and text.</p></body></html>"#;
        let doc = extract_fields("https://uci.edu/#top", html);
        assert_eq!(doc.url, "https://uci.edu/");
        assert_eq!(doc.title, "UCI Home");
        assert_eq!(doc.heading, "Welcome Anteaters");
        assert_eq!(doc.bold, "bold");
        assert_eq!(doc.body, "Some words and text.");
    }

    #[test]
    fn raw_page_and_field_records_both_parse() {
        let raw = r#"{"url": "https://a.edu/x", "content": "<title>T</title><p>hi</p>", "encoding": "utf-8"}"#;
        let page: InputRecord = serde_json::from_str(raw).unwrap();
        assert!(matches!(page, InputRecord::Page(_)));
        let doc = page.into_document();
        assert_eq!(doc.title, "T");
        assert_eq!(doc.body, "hi");

        let fields: InputRecord =
            serde_json::from_str(r#"{"url": "https://a.edu/y#frag", "title": "Y", "body": "text"}"#).unwrap();
        let doc = fields.into_document();
        assert_eq!(doc.url, "https://a.edu/y");
        assert_eq!(doc.heading, "");
    }

    #[test]
    fn unparsable_url_kept_verbatim() {
        assert_eq!(strip_fragment("  not a url "), "not a url");
    }
}
