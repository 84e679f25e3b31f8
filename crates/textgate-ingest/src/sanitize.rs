//! Safe-name mapping for hostile paths.
//!
//! # Guarantees
//! - Output never contains `..` segments or path separators; it is a
//!   single flat name that joins strictly inside the working root.
//! - Deterministic: the same raw path against the same used-name history
//!   yields the same output. Collisions get a numeric suffix, no
//!   randomness.
//!
//! # Algorithm
//! - Normalize `\` to `/`; split into components.
//! - Drop empties, `.`, `..` (recording traversal attempts) and
//!   drive-letter prefixes.
//! - Replace every byte outside `[A-Za-z0-9._-]` with `_`.
//! - Join surviving components with `_` into one flat name.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use textgate_core::IngestError;

/// Name used when nothing survives sanitization.
const EMPTY_PLACEHOLDER: &str = "unnamed";

/// Longest name emitted; longer inputs are truncated ahead of the
/// collision suffix.
const MAX_NAME_LEN: usize = 128;

/// Result of sanitizing one raw path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedName {
    /// The safe, unique flat name.
    pub name: String,
    /// The input tried to climb above the root (`..` past the top, or an
    /// absolute prefix). Reportable, not fatal: the name is still safe.
    pub had_traversal: bool,
}

/// Maps raw archive-entry and upload names to safe names, tracking
/// uniqueness for the lifetime of one request.
#[derive(Debug, Default)]
pub struct PathSanitizer {
    used: HashSet<String>,
}

impl PathSanitizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize `raw` and reserve the resulting name.
    pub fn sanitize(&mut self, raw: &str) -> SanitizedName {
        let (base, had_traversal) = flatten(raw);
        let name = self.disambiguate(base);
        self.used.insert(name.clone());
        SanitizedName {
            name,
            had_traversal,
        }
    }

    /// Number of names handed out so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.used.len()
    }

    fn disambiguate(&self, base: String) -> String {
        if !self.used.contains(&base) {
            return base;
        }
        let (stem, ext) = split_extension(&base);
        for n in 1.. {
            let candidate = if ext.is_empty() {
                format!("{stem}_{n}")
            } else {
                format!("{stem}_{n}.{ext}")
            };
            if !self.used.contains(&candidate) {
                return candidate;
            }
        }
        unreachable!("u64 counter exhausted");
    }
}

/// Join `name` under `root`, re-checking containment.
///
/// The sanitizer's output cannot escape by construction; this is the
/// guard of last resort before anything touches the filesystem.
pub fn contained_path(root: &Path, name: &str) -> Result<PathBuf, IngestError> {
    let joined = root.join(name);
    let escapes = joined
        .components()
        .any(|c| matches!(c, Component::ParentDir))
        || !joined.starts_with(root);
    if escapes {
        return Err(IngestError::PathTraversalAttempt);
    }
    Ok(joined)
}

fn flatten(raw: &str) -> (String, bool) {
    let normalized = raw.replace('\\', "/");
    let mut had_traversal = normalized.starts_with('/');
    let mut parts: Vec<String> = Vec::new();

    for comp in normalized.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    had_traversal = true;
                }
            }
            _ => {
                let cleaned = clean_component(comp);
                if !cleaned.is_empty() {
                    parts.push(cleaned);
                }
            }
        }
    }

    let mut name = parts.join("_");
    // Leading dots would produce hidden files in the workdir.
    while name.starts_with('.') {
        name.remove(0);
    }
    if name.is_empty() {
        name = EMPTY_PLACEHOLDER.to_string();
    }
    if name.len() > MAX_NAME_LEN {
        name = truncate_keeping_extension(&name);
    }
    (name, had_traversal)
}

fn clean_component(comp: &str) -> String {
    // Windows drive prefixes ("C:") collapse to the letter alone.
    let comp = comp.strip_suffix(':').unwrap_or(comp);
    let mut out = String::with_capacity(comp.len());
    for c in comp.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            c
        } else {
            '_'
        };
        // Collapse dot runs so no `..` sequence survives into the output.
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }
    out
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx < name.len() - 1 => (&name[..idx], &name[idx + 1..]),
        _ => (name, ""),
    }
}

fn truncate_keeping_extension(name: &str) -> String {
    let (stem, ext) = split_extension(name);
    if ext.is_empty() || ext.len() + 1 >= MAX_NAME_LEN {
        return name[..MAX_NAME_LEN].to_string();
    }
    let keep = MAX_NAME_LEN - ext.len() - 1;
    format!("{}.{}", &stem[..keep.min(stem.len())], ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_names_pass_through() {
        let mut s = PathSanitizer::new();
        assert_eq!(s.sanitize("document.pdf").name, "document.pdf");
        assert_eq!(s.sanitize("data_file-2.txt").name, "data_file-2.txt");
    }

    #[test]
    fn test_traversal_is_flattened_and_flagged() {
        let mut s = PathSanitizer::new();
        let out = s.sanitize("../../../etc/passwd");
        assert_eq!(out.name, "etc_passwd");
        assert!(out.had_traversal);

        let out = s.sanitize("..\\..\\windows\\system32\\config");
        assert_eq!(out.name, "windows_system32_config");
        assert!(out.had_traversal);
    }

    #[test]
    fn test_interior_dotdot_pops_without_flag() {
        let mut s = PathSanitizer::new();
        let out = s.sanitize("a/b/../c.txt");
        assert_eq!(out.name, "a_c.txt");
        assert!(!out.had_traversal);
    }

    #[test]
    fn test_absolute_and_drive_paths() {
        let mut s = PathSanitizer::new();
        let out = s.sanitize("/etc/shadow");
        assert_eq!(out.name, "etc_shadow");
        assert!(out.had_traversal);

        let out = s.sanitize("C:\\Users\\victim\\file.txt");
        assert_eq!(out.name, "C_Users_victim_file.txt");
    }

    #[test]
    fn test_special_characters_replaced() {
        let mut s = PathSanitizer::new();
        let out = s.sanitize("file<>|name?.txt");
        assert!(!out.name.contains('<'));
        assert!(!out.name.contains('>'));
        assert!(!out.name.contains('|'));
        assert_eq!(out.name, "file___name_.txt");
    }

    #[test]
    fn test_empty_and_dot_inputs_get_placeholder() {
        let mut s = PathSanitizer::new();
        assert_eq!(s.sanitize("").name, "unnamed");
        assert_eq!(s.sanitize("./.").name, "unnamed_1");
        assert_eq!(s.sanitize("...").name, "unnamed_2");
    }

    #[test]
    fn test_hidden_file_prefix_stripped() {
        let mut s = PathSanitizer::new();
        assert_eq!(s.sanitize(".env").name, "env");
    }

    #[test]
    fn test_separator_style_collisions_stay_distinct() {
        let mut s = PathSanitizer::new();
        assert_eq!(s.sanitize("a/readme.txt").name, "a_readme.txt");
        // Backslash form flattens to the same name; later entry gets the
        // suffix instead of overwriting.
        assert_eq!(s.sanitize("a\\readme.txt").name, "a_readme_1.txt");
    }

    #[test]
    fn test_collision_sequence() {
        let mut s = PathSanitizer::new();
        assert_eq!(s.sanitize("readme.txt").name, "readme.txt");
        assert_eq!(s.sanitize("readme.txt").name, "readme_1.txt");
        assert_eq!(s.sanitize("readme.txt").name, "readme_2.txt");
        assert_eq!(s.sanitize("noext").name, "noext");
        assert_eq!(s.sanitize("noext").name, "noext_1");
    }

    #[test]
    fn test_determinism_against_same_history() {
        let mut a = PathSanitizer::new();
        let mut b = PathSanitizer::new();
        for raw in ["x/y.txt", "x\\y.txt", "../x/y.txt", "weird\u{0}name"] {
            assert_eq!(a.sanitize(raw).name, b.sanitize(raw).name);
        }
        assert_eq!(a.count(), 4);
    }

    #[test]
    fn test_fuzzed_traversal_strings_stay_contained() {
        let root = std::path::Path::new("/work/request-1");
        let hostile = [
            "../../etc/passwd",
            "..\\..\\..\\boot.ini",
            "/../../root/.ssh/id_rsa",
            "a/../../b/../../../c",
            "....//....//etc",
            "..%2f..%2fetc",
            "C:..\\steal",
            "\\\\server\\share\\x",
        ];
        let mut s = PathSanitizer::new();
        for raw in hostile {
            let out = s.sanitize(raw);
            assert!(!out.name.contains(".."), "{raw} -> {}", out.name);
            assert!(!out.name.contains('/'), "{raw} -> {}", out.name);
            let joined = contained_path(root, &out.name).unwrap();
            assert!(joined.starts_with(root), "{raw} escaped to {joined:?}");
        }
    }

    #[test]
    fn test_long_names_truncated_with_extension_kept() {
        let mut s = PathSanitizer::new();
        let raw = format!("{}.txt", "x".repeat(500));
        let out = s.sanitize(&raw);
        assert!(out.name.len() <= 128);
        assert!(out.name.ends_with(".txt"));
    }

    #[test]
    fn test_contained_path_rejects_parent_component() {
        let root = std::path::Path::new("/work/request-1");
        // The sanitizer never produces this; the check is the last-resort
        // guard for a hypothetical bug upstream.
        let err = contained_path(root, "../escape").unwrap_err();
        assert!(matches!(err, IngestError::PathTraversalAttempt));
    }
}
