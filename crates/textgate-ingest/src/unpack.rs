//! Recursive archive expansion under budget.
//!
//! # Invariants
//! - The compressed size is gated *before* any entry is read.
//! - Decompressed output is charged to [`ExpansionState`] in fixed-size
//!   chunks, so a zip-bomb aborts mid-stream, never "at the end".
//! - Depth is checked before recursing; an over-depth nested archive is
//!   emitted as an opaque leaf, not silently dropped and not recursed.
//! - Entries are visited in container order; later same-name entries get
//!   disambiguated names instead of overwriting earlier ones.
//! - Guard failures abort the entire unpack. Temporary storage is owned
//!   by the caller's `TempDir` and reclaimed on every exit path.

use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use textgate_core::{
    ArchiveKind, ContentKind, ContentUnit, ExpansionState, IngestError, ResourceBudget, Result,
};

use crate::sanitize::{contained_path, PathSanitizer};
use crate::sniff::{declared_kind, sniff};

/// Decompression read granularity. Budget and deadline are re-checked at
/// every boundary.
const CHUNK: usize = 64 * 1024;

/// OS metadata entries that never become content units.
const JUNK_NAMES: &[&str] = &[".ds_store", "thumbs.db", "desktop.ini"];

/// Recursive, budget-enforcing archive expander.
///
/// Stateless; all per-request accounting lives in the caller-owned
/// [`ExpansionState`] and [`PathSanitizer`].
pub struct ArchiveUnpacker;

impl ArchiveUnpacker {
    /// Expand one archive into leaf content units.
    ///
    /// `container_name` is the untrusted name of the archive itself, used
    /// to name the inner member of single-file gzip streams. Blocking:
    /// call from `spawn_blocking`.
    pub fn unpack(
        archive_bytes: &[u8],
        kind: ArchiveKind,
        container_name: &str,
        budget: &ResourceBudget,
        state: &mut ExpansionState,
        sanitizer: &mut PathSanitizer,
        workdir: &Path,
    ) -> Result<Vec<ContentUnit>> {
        if archive_bytes.len() as u64 > budget.max_archive_bytes {
            warn!(
                size = archive_bytes.len(),
                max = budget.max_archive_bytes,
                container = container_name,
                "archive rejected: compressed size over budget"
            );
            return Err(IngestError::ResourceExceeded {
                max: budget.max_archive_bytes,
            });
        }

        // Every open archive holds one depth frame, the top level
        // included. Callers avoid over-depth recursion via `can_recurse`;
        // this is the backstop.
        state.enter_archive(budget)?;
        let result = Self::dispatch(
            archive_bytes,
            kind,
            container_name,
            budget,
            state,
            sanitizer,
            workdir,
        );
        state.exit_archive();

        let units = result?;
        debug!(
            container = container_name,
            units = units.len(),
            expanded = state.bytes_expanded(),
            "archive expanded"
        );
        Ok(units)
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        archive_bytes: &[u8],
        kind: ArchiveKind,
        container_name: &str,
        budget: &ResourceBudget,
        state: &mut ExpansionState,
        sanitizer: &mut PathSanitizer,
        workdir: &Path,
    ) -> Result<Vec<ContentUnit>> {
        let mut units = Vec::new();
        match kind {
            ArchiveKind::Zip => {
                Self::unpack_zip(archive_bytes, budget, state, sanitizer, workdir, &mut units)?;
            }
            ArchiveKind::Tar => {
                let cursor = Cursor::new(archive_bytes);
                Self::unpack_tar(cursor, budget, state, sanitizer, workdir, &mut units)?;
            }
            ArchiveKind::TarGz => {
                let decoder = GzDecoder::new(Cursor::new(archive_bytes));
                Self::unpack_tar(decoder, budget, state, sanitizer, workdir, &mut units)?;
            }
            ArchiveKind::Gzip => {
                Self::unpack_gzip(
                    archive_bytes,
                    container_name,
                    budget,
                    state,
                    sanitizer,
                    workdir,
                    &mut units,
                )?;
            }
        }
        Ok(units)
    }

    fn unpack_zip(
        bytes: &[u8],
        budget: &ResourceBudget,
        state: &mut ExpansionState,
        sanitizer: &mut PathSanitizer,
        workdir: &Path,
        units: &mut Vec<ContentUnit>,
    ) -> Result<()> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).map_err(|_| IngestError::MalformedArchive)?;

        if archive.len() as u32 > budget.max_entries_per_archive {
            warn!(
                entries = archive.len(),
                max = budget.max_entries_per_archive,
                "archive rejected: entry count over budget"
            );
            return Err(IngestError::ResourceExceeded {
                max: u64::from(budget.max_entries_per_archive),
            });
        }

        for i in 0..archive.len() {
            state.check_deadline(budget)?;

            let mut entry = archive
                .by_index(i)
                .map_err(|_| IngestError::MalformedArchive)?;
            if entry.is_dir() {
                continue;
            }
            let raw_name = entry.name().to_string();
            if is_junk(&raw_name) {
                debug!(entry = %raw_name, "skipping metadata entry");
                continue;
            }

            let data = read_charged(&mut entry, budget, state)?;
            drop(entry);
            Self::emit_entry(&raw_name, data, budget, state, sanitizer, workdir, units)?;
        }
        Ok(())
    }

    fn unpack_tar<R: Read>(
        reader: R,
        budget: &ResourceBudget,
        state: &mut ExpansionState,
        sanitizer: &mut PathSanitizer,
        workdir: &Path,
        units: &mut Vec<ContentUnit>,
    ) -> Result<()> {
        let mut archive = tar::Archive::new(reader);
        let entries = archive
            .entries()
            .map_err(|_| IngestError::MalformedArchive)?;

        let mut seen: u32 = 0;
        for entry in entries {
            state.check_deadline(budget)?;

            let mut entry = entry.map_err(|_| IngestError::MalformedArchive)?;
            if !entry.header().entry_type().is_file() {
                // Directories, symlinks, hardlinks, devices: links in
                // particular are never followed.
                continue;
            }

            seen += 1;
            if seen > budget.max_entries_per_archive {
                warn!(
                    max = budget.max_entries_per_archive,
                    "archive aborted: entry count over budget"
                );
                return Err(IngestError::ResourceExceeded {
                    max: u64::from(budget.max_entries_per_archive),
                });
            }

            let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            if is_junk(&raw_name) {
                debug!(entry = %raw_name, "skipping metadata entry");
                continue;
            }

            let data = read_charged(&mut entry, budget, state)?;
            Self::emit_entry(&raw_name, data, budget, state, sanitizer, workdir, units)?;
        }
        Ok(())
    }

    fn unpack_gzip(
        bytes: &[u8],
        container_name: &str,
        budget: &ResourceBudget,
        state: &mut ExpansionState,
        sanitizer: &mut PathSanitizer,
        workdir: &Path,
        units: &mut Vec<ContentUnit>,
    ) -> Result<()> {
        let mut decoder = GzDecoder::new(Cursor::new(bytes));
        let data = read_charged(&mut decoder, budget, state)?;
        let inner_name = gzip_inner_name(container_name);
        Self::emit_entry(&inner_name, data, budget, state, sanitizer, workdir, units)
    }

    /// Classify one decompressed entry: recurse into nested archives while
    /// depth remains, otherwise emit a leaf unit.
    #[allow(clippy::too_many_arguments)]
    fn emit_entry(
        raw_name: &str,
        data: Vec<u8>,
        budget: &ResourceBudget,
        state: &mut ExpansionState,
        sanitizer: &mut PathSanitizer,
        workdir: &Path,
        units: &mut Vec<ContentUnit>,
    ) -> Result<()> {
        let sniffed = sniff(&data);

        if let Some(nested) = effective_archive_kind(raw_name, sniffed) {
            if state.can_recurse(budget) {
                let produced = Self::unpack(
                    &data, nested, raw_name, budget, state, sanitizer, workdir,
                )?;
                units.extend(produced);
                return Ok(());
            }
            // Over-depth: reported as an unexpandable leaf, contents not
            // inspected.
            warn!(
                entry = %raw_name,
                depth = state.depth(),
                "nesting limit reached; keeping nested archive as opaque leaf"
            );
        }

        let declared = declared_kind(raw_name);
        if let Some(claimed) = declared {
            if crate::sniff::verify_consistency(Some(claimed), sniffed).is_err() {
                // Reportable for audit, not fatal inside an archive: the
                // entry is routed by its sniffed kind regardless.
                warn!(
                    entry = %raw_name,
                    declared = %claimed,
                    sniffed = %sniffed,
                    "archive entry type mismatch"
                );
            }
        }

        let sanitized = sanitizer.sanitize(raw_name);
        if sanitized.had_traversal {
            warn!(
                entry = %raw_name,
                contained_as = %sanitized.name,
                "traversal attempt in entry path"
            );
        }

        let dest = contained_path(workdir, &sanitized.name)?;
        std::fs::write(&dest, &data)?;

        state.note_unit();
        units.push(ContentUnit {
            sanitized_path: sanitized.name,
            original_name: raw_name.to_string(),
            bytes: data,
            declared,
            sniffed,
        });
        Ok(())
    }
}

/// Archive kind for a piece of content: sniffed container kinds win, with
/// the `.tar.gz` name refinement applied to gzip sniffs (magic bytes
/// cannot tell the two apart without decompressing).
pub fn effective_archive_kind(name: &str, sniffed: ContentKind) -> Option<ArchiveKind> {
    match sniffed {
        ContentKind::Archive(ArchiveKind::Gzip) => {
            let lower = name.to_ascii_lowercase();
            if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
                Some(ArchiveKind::TarGz)
            } else {
                Some(ArchiveKind::Gzip)
            }
        }
        ContentKind::Archive(kind) => Some(kind),
        _ => None,
    }
}

/// Stream `reader` to a buffer, charging every chunk against the budget
/// and re-checking the deadline between chunks.
fn read_charged<R: Read>(
    reader: &mut R,
    budget: &ResourceBudget,
    state: &mut ExpansionState,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; CHUNK];
    loop {
        state.check_deadline(budget)?;
        let n = reader
            .read(&mut buf)
            .map_err(|_| IngestError::MalformedArchive)?;
        if n == 0 {
            break;
        }
        state.charge(n as u64, budget)?;
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

fn is_junk(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("__macosx/") || lower.contains("/__macosx/") {
        return true;
    }
    lower
        .rsplit('/')
        .next()
        .map(|base| JUNK_NAMES.contains(&base))
        .unwrap_or(false)
}

/// Inner member name for a single-file gzip stream: the container name
/// with its `.gz` suffix dropped.
fn gzip_inner_name(container_name: &str) -> String {
    let lower = container_name.to_ascii_lowercase();
    if lower.ends_with(".gz") && container_name.len() > 3 {
        container_name[..container_name.len() - 3].to_string()
    } else {
        format!("{container_name}.out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn budget() -> ResourceBudget {
        ResourceBudget::default()
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        cursor.into_inner()
    }

    fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, *name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn build_gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn run_unpack(
        bytes: &[u8],
        kind: ArchiveKind,
        name: &str,
        budget: &ResourceBudget,
    ) -> Result<Vec<ContentUnit>> {
        let dir = tempdir().unwrap();
        let mut state = ExpansionState::new(budget);
        let mut sanitizer = PathSanitizer::new();
        ArchiveUnpacker::unpack(
            bytes,
            kind,
            name,
            budget,
            &mut state,
            &mut sanitizer,
            dir.path(),
        )
    }

    #[test]
    fn test_zip_roundtrip_two_entries_in_order() {
        let zip = build_zip(&[("a.txt", b"alpha"), ("b/c.txt", b"charlie")]);
        let units = run_unpack(&zip, ArchiveKind::Zip, "t.zip", &budget()).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].sanitized_path, "a.txt");
        assert_eq!(units[0].bytes, b"alpha");
        assert_eq!(units[0].sniffed, ContentKind::PlainText);
        assert_eq!(units[1].sanitized_path, "b_c.txt");
        assert_eq!(units[1].original_name, "b/c.txt");
    }

    #[test]
    fn test_zip_junk_and_directories_skipped() {
        let zip = build_zip(&[
            ("__MACOSX/._a.txt", b"resource fork"),
            (".DS_Store", b"junk"),
            ("real.txt", b"content"),
        ]);
        let units = run_unpack(&zip, ArchiveKind::Zip, "t.zip", &budget()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].sanitized_path, "real.txt");
    }

    #[test]
    fn test_zip_traversal_entry_contained() {
        let zip = build_zip(&[("../../etc/passwd", b"root:x:0:0")]);
        let dir = tempdir().unwrap();
        let b = budget();
        let mut state = ExpansionState::new(&b);
        let mut sanitizer = PathSanitizer::new();
        let units = ArchiveUnpacker::unpack(
            &zip,
            ArchiveKind::Zip,
            "evil.zip",
            &b,
            &mut state,
            &mut sanitizer,
            dir.path(),
        )
        .unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].sanitized_path, "etc_passwd");
        // Written inside the workdir, nowhere else.
        assert!(dir.path().join("etc_passwd").exists());
    }

    #[test]
    fn test_zip_bomb_aborts_with_resource_exceeded() {
        // 1 MiB of zeros compresses to ~1 KiB; cap expansion far below.
        let payload = vec![0u8; 1024 * 1024];
        let zip = build_zip(&[("zeros.bin", payload.as_slice())]);
        let b = ResourceBudget {
            max_expanded_bytes: 64 * 1024,
            ..ResourceBudget::default()
        };
        let err = run_unpack(&zip, ArchiveKind::Zip, "bomb.zip", &b).unwrap_err();
        assert!(matches!(err, IngestError::ResourceExceeded { .. }));
    }

    #[test]
    fn test_bomb_leaves_no_temp_files_behind() {
        let payload = vec![0u8; 1024 * 1024];
        let zip = build_zip(&[("ok.txt", b"fine"), ("zeros.bin", payload.as_slice())]);
        let b = ResourceBudget {
            max_expanded_bytes: 64 * 1024,
            ..ResourceBudget::default()
        };

        let dir = tempdir().unwrap();
        let workdir = dir.path().to_path_buf();
        let mut state = ExpansionState::new(&b);
        let mut sanitizer = PathSanitizer::new();
        let result = ArchiveUnpacker::unpack(
            &zip,
            ArchiveKind::Zip,
            "bomb.zip",
            &b,
            &mut state,
            &mut sanitizer,
            &workdir,
        );
        assert!(result.is_err());

        drop(dir);
        assert!(!workdir.exists());
    }

    #[test]
    fn test_compressed_size_gate() {
        let zip = build_zip(&[("a.txt", b"alpha")]);
        let b = ResourceBudget {
            max_archive_bytes: 8,
            ..ResourceBudget::default()
        };
        let err = run_unpack(&zip, ArchiveKind::Zip, "t.zip", &b).unwrap_err();
        assert!(matches!(err, IngestError::ResourceExceeded { max: 8 }));
    }

    #[test]
    fn test_entry_count_cap() {
        let zip = build_zip(&[("a", b"1"), ("b", b"2"), ("c", b"3")]);
        let b = ResourceBudget {
            max_entries_per_archive: 2,
            ..ResourceBudget::default()
        };
        let err = run_unpack(&zip, ArchiveKind::Zip, "t.zip", &b).unwrap_err();
        assert!(matches!(err, IngestError::ResourceExceeded { .. }));
    }

    #[test]
    fn test_nested_zip_expanded_within_depth() {
        let inner = build_zip(&[("deep.txt", b"buried")]);
        let outer = build_zip(&[("inner.zip", inner.as_slice())]);
        let units = run_unpack(&outer, ArchiveKind::Zip, "outer.zip", &budget()).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].sanitized_path, "deep.txt");
        assert_eq!(units[0].bytes, b"buried");
    }

    #[test]
    fn test_over_depth_archive_becomes_opaque_leaf() {
        // depth cap 1: the outer zip consumes the single level, so the
        // inner zip must surface unexpanded.
        let innermost = build_zip(&[("x.txt", b"x")]);
        let outer = build_zip(&[("nested.zip", innermost.as_slice())]);
        let b = ResourceBudget {
            max_nesting_depth: 1,
            ..ResourceBudget::default()
        };

        let units = run_unpack(&outer, ArchiveKind::Zip, "outer.zip", &b).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].sanitized_path, "nested.zip");
        assert_eq!(units[0].sniffed, ContentKind::Archive(ArchiveKind::Zip));
        // Contents were not inspected.
        assert_eq!(units[0].bytes, innermost);
    }

    #[test]
    fn test_tar_roundtrip() {
        let tar = build_tar(&[("docs/readme.md", b"# hi"), ("empty.txt", b"")]);
        let units = run_unpack(&tar, ArchiveKind::Tar, "t.tar", &budget()).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].sanitized_path, "docs_readme.md");
        // Zero-byte entries are valid leaves.
        assert_eq!(units[1].sanitized_path, "empty.txt");
        assert!(units[1].bytes.is_empty());
    }

    #[test]
    fn test_targz_roundtrip() {
        let tar = build_tar(&[("a.txt", b"via tar.gz")]);
        let targz = build_gzip(&tar);
        let units = run_unpack(&targz, ArchiveKind::TarGz, "t.tar.gz", &budget()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].bytes, b"via tar.gz");
    }

    #[test]
    fn test_gzip_single_member_named_from_container() {
        let gz = build_gzip(b"plain body");
        let units = run_unpack(&gz, ArchiveKind::Gzip, "notes.txt.gz", &budget()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].sanitized_path, "notes.txt");
        assert_eq!(units[0].bytes, b"plain body");
    }

    #[test]
    fn test_colliding_entry_names_disambiguated() {
        let zip = build_zip(&[("a/f.txt", b"one"), ("a\\f.txt", b"two")]);
        let units = run_unpack(&zip, ArchiveKind::Zip, "t.zip", &budget()).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].sanitized_path, "a_f.txt");
        assert_eq!(units[1].sanitized_path, "a_f_1.txt");
        assert_eq!(units[1].bytes, b"two");
    }

    #[test]
    fn test_malformed_zip_rejected() {
        let garbage = b"PK\x03\x04 but not really a zip file";
        let err = run_unpack(garbage, ArchiveKind::Zip, "t.zip", &budget()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedArchive));
    }

    #[test]
    fn test_empty_archive_is_not_an_error() {
        let zip = build_zip(&[]);
        let units = run_unpack(&zip, ArchiveKind::Zip, "t.zip", &budget()).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_deadline_aborts_unpack() {
        let zip = build_zip(&[("a.txt", b"alpha")]);
        let b = ResourceBudget {
            processing_timeout: std::time::Duration::from_millis(0),
            ..ResourceBudget::default()
        };
        let err = run_unpack(&zip, ArchiveKind::Zip, "t.zip", &b).unwrap_err();
        assert!(matches!(err, IngestError::Timeout { .. }));
    }
}
