//! Plain text extractor with legacy-encoding fallback.

use async_trait::async_trait;
use encoding_rs::{UTF_8, WINDOWS_1251, WINDOWS_1252};

use textgate_core::{ContentKind, ContentUnit, ExtractError, FormatExtractor};

/// Extractor for text-family content.
///
/// Decoding order: strict UTF-8, then WINDOWS-1251 (the dominant legacy
/// Cyrillic encoding in this service's traffic), then WINDOWS-1252, and
/// finally lossy UTF-8 so no text input is unextractable.
pub struct TextExtractor;

impl TextExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn decode(bytes: &[u8]) -> String {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return s.to_string();
        }
        for encoding in [WINDOWS_1251, WINDOWS_1252] {
            let (decoded, had_errors) = encoding.decode_without_bom_handling(bytes);
            if !had_errors {
                return decoded.into_owned();
            }
        }
        let (decoded, _, _) = UTF_8.decode(bytes);
        decoded.into_owned()
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormatExtractor for TextExtractor {
    fn supported_kinds(&self) -> &[ContentKind] {
        &[
            ContentKind::PlainText,
            ContentKind::Markdown,
            ContentKind::Xml,
            ContentKind::Rtf,
        ]
    }

    async fn extract(&self, unit: &ContentUnit) -> Result<String, ExtractError> {
        let text = Self::decode(&unit.bytes);
        Ok(text.trim_end().to_string())
    }
}
