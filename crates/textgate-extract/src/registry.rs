//! Extractor registry routing content units by sniffed kind.

use std::collections::HashMap;
use std::sync::Arc;

use textgate_core::{ContentKind, ContentUnit, ExtractError, FormatExtractor};

/// Registry of format extractors.
pub struct ExtractorRegistry {
    /// Named extractors
    extractors: HashMap<String, Arc<dyn FormatExtractor>>,
    /// Kind to extractor name mapping
    kind_mapping: HashMap<ContentKind, String>,
}

impl ExtractorRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
            kind_mapping: HashMap::new(),
        }
    }

    /// Registry with the in-tree extractors registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("text", crate::TextExtractor::new());
        registry.register("html", crate::HtmlExtractor::new());
        registry.register("json", crate::JsonExtractor::new());
        registry.register("pdf", crate::PdfExtractor::new());
        registry
    }

    /// Register an extractor under a name, claiming its supported kinds.
    pub fn register<E: FormatExtractor + 'static>(&mut self, name: &str, extractor: E) {
        let extractor = Arc::new(extractor);
        for kind in extractor.supported_kinds() {
            self.kind_mapping.insert(*kind, name.to_string());
        }
        self.extractors.insert(name.to_string(), extractor);
    }

    /// Get the extractor for a content kind.
    #[must_use]
    pub fn get_for_kind(&self, kind: ContentKind) -> Option<Arc<dyn FormatExtractor>> {
        self.kind_mapping
            .get(&kind)
            .and_then(|name| self.extractors.get(name))
            .cloned()
    }

    /// Extract text from a unit, routing by its sniffed kind.
    pub async fn extract(&self, unit: &ContentUnit) -> Result<String, ExtractError> {
        let extractor = self
            .get_for_kind(unit.sniffed)
            .ok_or_else(|| ExtractError::Unsupported(unit.sniffed.label().to_string()))?;
        extractor.extract(unit).await
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TextExtractor;

    fn unit(kind: ContentKind, bytes: &[u8]) -> ContentUnit {
        ContentUnit {
            sanitized_path: "u".to_string(),
            original_name: "u".to_string(),
            bytes: bytes.to_vec(),
            declared: None,
            sniffed: kind,
        }
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = ExtractorRegistry::new();
        assert!(registry.get_for_kind(ContentKind::PlainText).is_none());
    }

    #[test]
    fn test_register_claims_kinds() {
        let mut registry = ExtractorRegistry::new();
        registry.register("text", TextExtractor::new());
        assert!(registry.get_for_kind(ContentKind::PlainText).is_some());
        assert!(registry.get_for_kind(ContentKind::Pdf).is_none());
    }

    #[tokio::test]
    async fn test_extract_routes_by_sniffed_kind() {
        let registry = ExtractorRegistry::with_defaults();
        let text = registry
            .extract(&unit(ContentKind::PlainText, b"hello world"))
            .await
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_extract_unsupported_kind() {
        let registry = ExtractorRegistry::with_defaults();
        let err = registry
            .extract(&unit(ContentKind::OctetStream, &[0, 1, 2]))
            .await
            .unwrap_err();
        match err {
            ExtractError::Unsupported(label) => {
                assert_eq!(label, "application/octet-stream");
            }
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_defaults_cover_the_text_family() {
        let registry = ExtractorRegistry::with_defaults();
        for kind in [
            ContentKind::PlainText,
            ContentKind::Markdown,
            ContentKind::Html,
            ContentKind::Json,
            ContentKind::Xml,
            ContentKind::Pdf,
        ] {
            assert!(registry.get_for_kind(kind).is_some(), "{kind}");
        }
    }
}
