//! JSON text extractor: recursive string harvest with dotted paths.

use async_trait::async_trait;
use serde_json::Value;

use textgate_core::{ContentKind, ContentUnit, ExtractError, FormatExtractor};

/// Extractor for JSON documents.
///
/// Emits one `path: value` line per string leaf, depth-first in document
/// order, so nested structure survives into the text.
pub struct JsonExtractor;

impl JsonExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn harvest(value: &Value, path: &str, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                harvest(child, &child_path, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                let child_path = if path.is_empty() {
                    format!("[{i}]")
                } else {
                    format!("{path}[{i}]")
                };
                harvest(child, &child_path, out);
            }
        }
        Value::String(s) => {
            if !s.trim().is_empty() {
                out.push(format!("{path}: {s}"));
            }
        }
        _ => {}
    }
}

#[async_trait]
impl FormatExtractor for JsonExtractor {
    fn supported_kinds(&self) -> &[ContentKind] {
        &[ContentKind::Json]
    }

    async fn extract(&self, unit: &ContentUnit) -> Result<String, ExtractError> {
        let value: Value = serde_json::from_slice(&unit.bytes)
            .map_err(|e| ExtractError::Decode(format!("invalid json: {e}")))?;
        let mut lines = Vec::new();
        harvest(&value, "", &mut lines);
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(json: &str) -> ContentUnit {
        ContentUnit {
            sanitized_path: "d.json".to_string(),
            original_name: "d.json".to_string(),
            bytes: json.as_bytes().to_vec(),
            declared: Some(ContentKind::Json),
            sniffed: ContentKind::Json,
        }
    }

    #[tokio::test]
    async fn test_nested_strings_with_paths() {
        let ex = JsonExtractor::new();
        let text = ex
            .extract(&unit(
                r#"{"title": "report", "meta": {"author": "b"}, "tags": ["x", "y"]}"#,
            ))
            .await
            .unwrap();
        assert!(text.contains("title: report"));
        assert!(text.contains("meta.author: b"));
        assert!(text.contains("tags[0]: x"));
        assert!(text.contains("tags[1]: y"));
    }

    #[tokio::test]
    async fn test_non_string_leaves_skipped() {
        let ex = JsonExtractor::new();
        let text = ex
            .extract(&unit(r#"{"n": 42, "b": true, "s": "kept"}"#))
            .await
            .unwrap();
        assert_eq!(text, "s: kept");
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let ex = JsonExtractor::new();
        let err = ex.extract(&unit("{broken")).await.unwrap_err();
        assert!(matches!(err, ExtractError::Decode(_)));
    }
}
