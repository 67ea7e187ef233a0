//! Durable fragment-to-content-hash manifest.
//!
//! The manifest is a flat line-oriented text table, one record per line:
//!
//! ```text
//! fragment_path|content_hash
//! ```
//!
//! Deliberately not a structured serialization format: operators can inspect
//! it with ordinary tooling and external scripts can append to it. There is
//! no header, no checksum and no escaping of `|` inside paths; fragment paths
//! are generated by the fragmenter (`chunk_NNN.dat`), so the delimiter does
//! not occur in practice.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{debug, warn};

/// Conventional manifest file name.
pub const DEFAULT_MANIFEST_NAME: &str = "hash_map.txt";

/// Errors produced by manifest persistence.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed manifest line {line}: {content:?}")]
    Malformed { line: usize, content: String },
}

/// How [`load`] treats lines that do not parse as `path|hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Skip malformed lines with a warning. Tolerates trailing or corrupted
    /// lines at the cost of silently losing their entries.
    #[default]
    Lenient,
    /// Fail the whole load on the first malformed line.
    Strict,
}

/// Writes the manifest for `fragment_paths` to `path`, overwriting any
/// existing file.
///
/// Paths are sorted lexicographically before writing, which coincides with
/// fragment index order because fragment names embed a zero-padded index.
/// A path missing from `hashes` is written with an empty hash field; that is
/// a caller error which retrieval detects later. The file is replaced as a
/// whole (temp file + rename), never updated in place.
pub fn save(
    path: &Path,
    fragment_paths: &[String],
    hashes: &HashMap<String, String>,
) -> Result<(), ManifestError> {
    let mut sorted = fragment_paths.to_vec();
    sorted.sort();

    let mut contents = String::new();
    for fragment in &sorted {
        let hash = hashes.get(fragment).map(String::as_str).unwrap_or("");
        contents.push_str(fragment);
        contents.push('|');
        contents.push_str(hash);
        contents.push('\n');
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;

    debug!(path = %path.display(), entries = sorted.len(), "manifest saved");
    Ok(())
}

/// Loads the manifest at `path` into a map keyed by fragment path.
///
/// Blank lines are skipped; surrounding whitespace is trimmed. A line that is
/// not exactly two `|`-separated fields is skipped or rejected depending on
/// `strictness`. The returned `BTreeMap` iterates keys in lexicographic
/// order, which is the reconstruction order — callers never rely on the
/// file's on-disk line order.
pub fn load(path: &Path, strictness: Strictness) -> Result<BTreeMap<String, String>, ManifestError> {
    let data = std::fs::read_to_string(path)?;

    let mut entries = BTreeMap::new();
    for (number, raw) in data.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('|');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(fragment), Some(hash), None) => {
                entries.insert(fragment.to_string(), hash.to_string());
            }
            _ => match strictness {
                Strictness::Strict => {
                    return Err(ManifestError::Malformed {
                        line: number + 1,
                        content: line.to_string(),
                    });
                }
                Strictness::Lenient => {
                    warn!(line = number + 1, content = line, "skipping malformed manifest line");
                }
            },
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn pairs(entries: &[(&str, &str)]) -> (Vec<String>, HashMap<String, String>) {
        let paths: Vec<String> = entries.iter().map(|(p, _)| p.to_string()).collect();
        let hashes = entries
            .iter()
            .map(|(p, h)| (p.to_string(), h.to_string()))
            .collect();
        (paths, hashes)
    }

    #[test]
    fn save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MANIFEST_NAME);
        let (fragments, hashes) = pairs(&[
            ("chunks/chunk_001.dat", "0xbeef"),
            ("chunks/chunk_000.dat", "0xcafe"),
        ]);

        save(&path, &fragments, &hashes).unwrap();
        let loaded = load(&path, Strictness::Strict).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["chunks/chunk_000.dat"], "0xcafe");
        assert_eq!(loaded["chunks/chunk_001.dat"], "0xbeef");
    }

    #[test]
    fn save_writes_sorted_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MANIFEST_NAME);
        // Deliberately out of order.
        let (fragments, hashes) = pairs(&[
            ("chunk_002.dat", "h2"),
            ("chunk_000.dat", "h0"),
            ("chunk_001.dat", "h1"),
        ]);

        save(&path, &fragments, &hashes).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "chunk_000.dat|h0\nchunk_001.dat|h1\nchunk_002.dat|h2\n");
    }

    #[test]
    fn save_overwrites_existing_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MANIFEST_NAME);
        fs::write(&path, "stale|contents\n").unwrap();

        let (fragments, hashes) = pairs(&[("chunk_000.dat", "fresh")]);
        save(&path, &fragments, &hashes).unwrap();

        let loaded = load(&path, Strictness::Strict).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["chunk_000.dat"], "fresh");
    }

    #[test]
    fn missing_hash_is_written_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MANIFEST_NAME);

        let fragments = vec!["chunk_000.dat".to_string()];
        save(&path, &fragments, &HashMap::new()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "chunk_000.dat|\n");

        let loaded = load(&path, Strictness::Strict).unwrap();
        assert_eq!(loaded["chunk_000.dat"], "");
    }

    #[test]
    fn load_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MANIFEST_NAME);
        fs::write(&path, "\nchunk_000.dat|h0\n\n  \nchunk_001.dat|h1\n").unwrap();

        let loaded = load(&path, Strictness::Strict).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn lenient_load_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MANIFEST_NAME);
        fs::write(
            &path,
            "chunk_000.dat|h0\nchunk_001.dat\na|b|c\nchunk_002.dat|h2\n",
        )
        .unwrap();

        let loaded = load(&path, Strictness::Lenient).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains_key("chunk_000.dat"));
        assert!(loaded.contains_key("chunk_002.dat"));
    }

    #[test]
    fn strict_load_fails_on_malformed_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MANIFEST_NAME);
        fs::write(&path, "chunk_000.dat|h0\nchunk_001.dat\n").unwrap();

        let err = load(&path, Strictness::Strict).unwrap_err();
        match err {
            ManifestError::Malformed { line, content } => {
                assert_eq!(line, 2);
                assert_eq!(content, "chunk_001.dat");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_order_is_re_derived_not_file_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MANIFEST_NAME);
        // Hand-edited manifest with lines out of order.
        fs::write(&path, "chunk_002.dat|h2\nchunk_000.dat|h0\nchunk_001.dat|h1\n").unwrap();

        let loaded = load(&path, Strictness::Strict).unwrap();
        let keys: Vec<&String> = loaded.keys().collect();
        assert_eq!(keys, ["chunk_000.dat", "chunk_001.dat", "chunk_002.dat"]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = load(&dir.path().join("absent.txt"), Strictness::Lenient);
        assert!(matches!(result, Err(ManifestError::Io(_))));
    }
}
