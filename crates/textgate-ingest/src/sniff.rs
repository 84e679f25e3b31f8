//! Content type sniffing and type-forgery detection.
//!
//! # Invariants
//! - [`sniff`] is pure: no I/O, no failure modes. Unrecognized content is
//!   `OctetStream`, which is a valid answer, not an error.
//! - Compound suffixes are matched before their tails: `.tar.gz` and
//!   `.tgz` resolve to `TarGz`, never to `Gzip`.
//! - Extension claims never override sniffed content; they are only
//!   compared against it.

use textgate_core::{ArchiveKind, ContentKind, IngestError};

/// Determine the true content kind from the bytes alone.
#[must_use]
pub fn sniff(bytes: &[u8]) -> ContentKind {
    if bytes.is_empty() {
        return ContentKind::OctetStream;
    }

    if let Some(t) = infer::get(bytes) {
        return match t.mime_type() {
            "application/pdf" => ContentKind::Pdf,
            // Office and OpenDocument files are zip containers; refine by
            // looking for their well-known member names.
            "application/zip" => refine_zip(bytes),
            "application/epub+zip" => ContentKind::Archive(ArchiveKind::Zip),
            "application/gzip" => ContentKind::Archive(ArchiveKind::Gzip),
            "application/x-tar" => ContentKind::Archive(ArchiveKind::Tar),
            "application/rtf" => ContentKind::Rtf,
            "application/x-executable"
            | "application/x-mach-binary"
            | "application/vnd.microsoft.portable-executable" => ContentKind::Executable,
            mime if mime.starts_with("application/vnd.openxmlformats-officedocument") => {
                ContentKind::OfficeOpenXml
            }
            mime if mime.starts_with("application/vnd.oasis.opendocument") => {
                ContentKind::OpenDocument
            }
            mime if mime.starts_with("image/") => ContentKind::Image,
            _ => ContentKind::OctetStream,
        };
    }

    // No magic bytes matched; fall back to a text heuristic.
    if is_likely_text(bytes) {
        refine_text(bytes)
    } else {
        ContentKind::OctetStream
    }
}

/// Tell Office/OpenDocument documents apart from plain zip containers.
fn refine_zip(bytes: &[u8]) -> ContentKind {
    let window = &bytes[..bytes.len().min(8192)];

    if contains(window, b"[Content_Types].xml") {
        return ContentKind::OfficeOpenXml;
    }
    // ODF stores an uncompressed `mimetype` member first; its value sits
    // right after the local file header.
    if contains(window, b"mimetypeapplication/vnd.oasis.opendocument") {
        return ContentKind::OpenDocument;
    }
    ContentKind::Archive(ArchiveKind::Zip)
}

/// Classify already-confirmed text content into a routable subtype.
fn refine_text(bytes: &[u8]) -> ContentKind {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
    let trimmed = head.trim_start();

    if trimmed.starts_with("{\\rtf") {
        return ContentKind::Rtf;
    }
    if trimmed.starts_with("<?xml") {
        return ContentKind::Xml;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return ContentKind::Html;
    }
    if (trimmed.starts_with('{') || trimmed.starts_with('[')) && looks_like_json(bytes) {
        return ContentKind::Json;
    }
    ContentKind::PlainText
}

/// Bracket-balance check; avoids tagging prose that merely opens with a
/// brace without paying for a full parse here. The JSON extractor does
/// the real parse later.
fn looks_like_json(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes)
        .ok()
        .map(|s| {
            let mut depth = 0i32;
            let mut in_str = false;
            let mut esc = false;
            for c in s.chars() {
                if esc {
                    esc = false;
                    continue;
                }
                match c {
                    '\\' if in_str => esc = true,
                    '"' => in_str = !in_str,
                    '{' | '[' if !in_str => depth += 1,
                    '}' | ']' if !in_str => depth -= 1,
                    _ => {}
                }
                if depth < 0 {
                    return false;
                }
            }
            depth == 0 && !in_str
        })
        .unwrap_or(false)
}

/// Heuristic: printable ratio over the first 8 KiB, NUL bytes disqualify.
fn is_likely_text(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(8192)];
    if sample.contains(&0) {
        return false;
    }
    let printable = sample
        .iter()
        .filter(|&&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b) || b >= 0x80)
        .count();
    printable * 100 >= sample.len() * 95
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Kind claimed by the (untrusted) file name, if the extension is known.
#[must_use]
pub fn declared_kind(name: &str) -> Option<ContentKind> {
    let lower = name.to_ascii_lowercase();

    // Compound suffixes first.
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        return Some(ContentKind::Archive(ArchiveKind::TarGz));
    }

    let ext = lower.rsplit('.').next().filter(|e| *e != lower.as_str())?;
    let kind = match ext {
        "txt" | "log" | "csv" | "text" => ContentKind::PlainText,
        "md" | "markdown" => ContentKind::Markdown,
        "html" | "htm" => ContentKind::Html,
        "json" => ContentKind::Json,
        "xml" | "yaml" | "yml" => ContentKind::Xml,
        "rtf" => ContentKind::Rtf,
        "pdf" => ContentKind::Pdf,
        "docx" | "xlsx" | "pptx" => ContentKind::OfficeOpenXml,
        "odt" | "ods" | "odp" => ContentKind::OpenDocument,
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" | "tif" | "webp" => ContentKind::Image,
        "zip" | "epub" => ContentKind::Archive(ArchiveKind::Zip),
        "tar" => ContentKind::Archive(ArchiveKind::Tar),
        "gz" => ContentKind::Archive(ArchiveKind::Gzip),
        "exe" | "dll" => ContentKind::Executable,
        _ => {
            // Fall back to the shared media-type table for the long tail
            // of text-ish extensions (source code and friends).
            let guess = mime_guess::from_path(&lower).first()?;
            return match guess.type_().as_str() {
                "text" => Some(ContentKind::PlainText),
                "image" => Some(ContentKind::Image),
                _ => None,
            };
        }
    };
    Some(kind)
}

/// Fail when the claimed extension and the sniffed content belong to
/// different extractor families.
///
/// Tolerances, both deliberate:
/// - no claim at all is fine (names are optional);
/// - an `OctetStream` sniff is fine; unknown content is not evidence of
///   forgery, and the extractor registry has nothing registered for it
///   anyway.
pub fn verify_consistency(
    declared: Option<ContentKind>,
    sniffed: ContentKind,
) -> Result<(), IngestError> {
    let Some(declared) = declared else {
        return Ok(());
    };
    if sniffed == ContentKind::OctetStream {
        return Ok(());
    }
    if declared.family() == sniffed.family() {
        return Ok(());
    }
    Err(IngestError::TypeMismatch {
        declared: declared.label().to_string(),
        sniffed: sniffed.label().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GZIP_HEADER: &[u8] = &[0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00];

    #[test]
    fn test_sniff_pdf() {
        let bytes = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\nrest of the document";
        assert_eq!(sniff(bytes), ContentKind::Pdf);
    }

    #[test]
    fn test_sniff_gzip() {
        assert_eq!(sniff(GZIP_HEADER), ContentKind::Archive(ArchiveKind::Gzip));
    }

    #[test]
    fn test_sniff_plain_zip() {
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        assert_eq!(sniff(&bytes), ContentKind::Archive(ArchiveKind::Zip));
    }

    #[test]
    fn test_sniff_office_zip() {
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend_from_slice(&[0u8; 26]);
        bytes.extend_from_slice(b"[Content_Types].xml");
        bytes.extend_from_slice(&[0u8; 32]);
        assert_eq!(sniff(&bytes), ContentKind::OfficeOpenXml);
    }

    #[test]
    fn test_sniff_opendocument_zip() {
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend_from_slice(&[0u8; 26]);
        bytes.extend_from_slice(b"mimetypeapplication/vnd.oasis.opendocument.text");
        assert_eq!(sniff(&bytes), ContentKind::OpenDocument);
    }

    #[test]
    fn test_sniff_text_variants() {
        assert_eq!(sniff(b"just some prose\n"), ContentKind::PlainText);
        assert_eq!(sniff(b"<!DOCTYPE html><html></html>"), ContentKind::Html);
        assert_eq!(sniff(b"<html><body>hi</body></html>"), ContentKind::Html);
        assert_eq!(sniff(b"<?xml version=\"1.0\"?><a/>"), ContentKind::Xml);
        assert_eq!(sniff(b"{\\rtf1\\ansi hello}"), ContentKind::Rtf);
        assert_eq!(sniff(br#"{"a": [1, 2, 3]}"#), ContentKind::Json);
        // Prose that opens with a brace is not JSON.
        assert_eq!(sniff(b"{this is not json at all"), ContentKind::PlainText);
    }

    #[test]
    fn test_sniff_binary_is_octet_stream() {
        let bytes = [0u8, 1, 2, 3, 0xff, 0xfe, 0, 0, 7, 9];
        assert_eq!(sniff(&bytes), ContentKind::OctetStream);
        assert_eq!(sniff(&[]), ContentKind::OctetStream);
    }

    #[test]
    fn test_sniff_utf8_cyrillic_is_text() {
        let bytes = "привет мир, это текст".as_bytes();
        assert_eq!(sniff(bytes), ContentKind::PlainText);
    }

    #[test]
    fn test_declared_compound_suffixes_win() {
        assert_eq!(
            declared_kind("backup.tar.gz"),
            Some(ContentKind::Archive(ArchiveKind::TarGz))
        );
        assert_eq!(
            declared_kind("backup.TGZ"),
            Some(ContentKind::Archive(ArchiveKind::TarGz))
        );
        assert_eq!(
            declared_kind("file.gz"),
            Some(ContentKind::Archive(ArchiveKind::Gzip))
        );
    }

    #[test]
    fn test_declared_common_kinds() {
        assert_eq!(declared_kind("doc.PDF"), Some(ContentKind::Pdf));
        assert_eq!(declared_kind("a.docx"), Some(ContentKind::OfficeOpenXml));
        assert_eq!(declared_kind("a.odt"), Some(ContentKind::OpenDocument));
        assert_eq!(declared_kind("pic.JPEG"), Some(ContentKind::Image));
        assert_eq!(declared_kind("notes.md"), Some(ContentKind::Markdown));
        assert_eq!(declared_kind("README"), None);
        assert_eq!(declared_kind(""), None);
    }

    #[test]
    fn test_declared_source_code_via_mime_guess() {
        assert_eq!(declared_kind("script.py"), Some(ContentKind::PlainText));
        assert_eq!(declared_kind("main.rs"), Some(ContentKind::PlainText));
    }

    #[test]
    fn test_consistency_same_family_ok() {
        assert!(verify_consistency(Some(ContentKind::PlainText), ContentKind::Json).is_ok());
        assert!(verify_consistency(Some(ContentKind::Markdown), ContentKind::PlainText).is_ok());
        assert!(verify_consistency(Some(ContentKind::Pdf), ContentKind::Pdf).is_ok());
    }

    #[test]
    fn test_consistency_no_claim_or_unknown_sniff_ok() {
        assert!(verify_consistency(None, ContentKind::Executable).is_ok());
        assert!(verify_consistency(Some(ContentKind::PlainText), ContentKind::OctetStream).is_ok());
    }

    #[test]
    fn test_consistency_family_swap_fails() {
        // Claimed .txt, actually a zip container.
        let err = verify_consistency(
            Some(ContentKind::PlainText),
            ContentKind::Archive(ArchiveKind::Zip),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::TypeMismatch { .. }));

        // Claimed .txt, actually an executable.
        assert!(
            verify_consistency(Some(ContentKind::PlainText), ContentKind::Executable).is_err()
        );

        // Claimed .pdf, actually plain text.
        assert!(verify_consistency(Some(ContentKind::Pdf), ContentKind::PlainText).is_err());
    }
}
