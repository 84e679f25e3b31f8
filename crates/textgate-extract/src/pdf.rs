//! PDF text extractor (text layer only).

use async_trait::async_trait;
use tracing::debug;

use textgate_core::{ContentKind, ContentUnit, ExtractError, FormatExtractor};

/// Extractor for PDF documents.
///
/// Pulls the embedded text layer; scanned PDFs with no text layer come
/// back (nearly) empty, which is a quality outcome, not an error.
pub struct PdfExtractor;

impl PdfExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormatExtractor for PdfExtractor {
    fn supported_kinds(&self) -> &[ContentKind] {
        &[ContentKind::Pdf]
    }

    async fn extract(&self, unit: &ContentUnit) -> Result<String, ExtractError> {
        let text = pdf_extract::extract_text_from_mem(&unit.bytes)
            .map_err(|e| ExtractError::Failed(format!("pdf: {e}")))?;
        debug!(
            unit = %unit.sanitized_path,
            chars = text.len(),
            "pdf text layer extracted"
        );
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_garbage_bytes_fail_cleanly() {
        let ex = PdfExtractor::new();
        let unit = ContentUnit {
            sanitized_path: "f.pdf".to_string(),
            original_name: "f.pdf".to_string(),
            bytes: b"%PDF-1.4 but truncated".to_vec(),
            declared: Some(ContentKind::Pdf),
            sniffed: ContentKind::Pdf,
        };
        let err = ex.extract(&unit).await.unwrap_err();
        assert!(matches!(err, ExtractError::Failed(_)));
    }

    #[test]
    fn test_supported_kinds() {
        let ex = PdfExtractor::new();
        assert!(ex.can_extract(ContentKind::Pdf));
        assert!(!ex.can_extract(ContentKind::PlainText));
    }
}
