//! HTML text extractor.

use async_trait::async_trait;
use scraper::{Html, Selector};

use textgate_core::{ContentKind, ContentUnit, ExtractError, FormatExtractor};

/// Extractor for HTML documents: scripts and styles dropped, visible
/// text collected in document order, whitespace collapsed.
pub struct HtmlExtractor;

impl HtmlExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let Ok(skip) = Selector::parse("script, style, noscript") else {
        return String::new();
    };

    // Text nodes under script/style are executable or presentational, not
    // content.
    let skipped: Vec<_> = doc.select(&skip).map(|el| el.id()).collect();

    let mut lines = Vec::new();
    collect_visible_text(doc.root_element(), &skipped, &mut lines);
    lines.join("\n")
}

fn collect_visible_text(
    node: scraper::ElementRef,
    skipped: &[ego_tree::NodeId],
    out: &mut Vec<String>,
) {
    for child in node.children() {
        if let Some(el) = scraper::ElementRef::wrap(child) {
            if skipped.contains(&el.id()) {
                continue;
            }
            collect_visible_text(el, skipped, out);
        } else if let Some(text) = child.value().as_text() {
            let line = text.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !line.is_empty() {
                out.push(line);
            }
        }
    }
}

#[async_trait]
impl FormatExtractor for HtmlExtractor {
    fn supported_kinds(&self) -> &[ContentKind] {
        &[ContentKind::Html]
    }

    async fn extract(&self, unit: &ContentUnit) -> Result<String, ExtractError> {
        let html = String::from_utf8_lossy(&unit.bytes);
        Ok(html_to_text(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(html: &str) -> ContentUnit {
        ContentUnit {
            sanitized_path: "p.html".to_string(),
            original_name: "p.html".to_string(),
            bytes: html.as_bytes().to_vec(),
            declared: Some(ContentKind::Html),
            sniffed: ContentKind::Html,
        }
    }

    #[tokio::test]
    async fn test_basic_text_extraction() {
        let ex = HtmlExtractor::new();
        let text = ex
            .extract(&unit("<html><body><h1>Title</h1><p>Body text.</p></body></html>"))
            .await
            .unwrap();
        assert!(text.contains("Title"));
        assert!(text.contains("Body text."));
    }

    #[tokio::test]
    async fn test_scripts_and_styles_stripped() {
        let html = r#"<html><head>
            <style>body { color: red; }</style>
            <script>alert("xss")</script>
        </head><body><p>visible</p><noscript>enable js</noscript></body></html>"#;
        let ex = HtmlExtractor::new();
        let text = ex.extract(&unit(html)).await.unwrap();
        assert!(text.contains("visible"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("enable js"));
    }

    #[tokio::test]
    async fn test_whitespace_collapsed() {
        let html = "<p>a\n\n\n   lot    of\t\tspace</p>";
        let ex = HtmlExtractor::new();
        let text = ex.extract(&unit(html)).await.unwrap();
        assert_eq!(text, "a lot of space");
    }
}
