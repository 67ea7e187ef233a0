//! Source-file fragmentation.
//!
//! Splits a large file into fixed-size fragment files on disk. Fragment file
//! names embed a zero-padded index so plain lexicographic ordering of the
//! names matches fragment order — the property the manifest and retrieval
//! layers rely on for reconstruction.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Errors produced while splitting a source file.
#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default fragment size: 400 MiB.
pub const DEFAULT_FRAGMENT_SIZE: u64 = 400 * 1024 * 1024;

/// Default upper bound on emitted fragments.
pub const DEFAULT_MAX_FRAGMENTS: u32 = 10;

/// Fragmentation policy.
///
/// Passed in explicitly so tests and callers can exercise small sizes instead
/// of the production defaults.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Nominal fragment size in bytes. The last fragment may be smaller.
    pub fragment_size: u64,
    /// Maximum number of fragments emitted. Source bytes beyond
    /// `fragment_size * max_fragments` are not captured.
    pub max_fragments: u32,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            max_fragments: DEFAULT_MAX_FRAGMENTS,
        }
    }
}

/// One contiguous byte range of the source file, stored as its own file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// 0-based ordinal; determines reconstruction order.
    pub index: u32,
    /// On-disk location of the fragment bytes.
    pub path: PathBuf,
    /// Byte length of this fragment.
    pub size: u64,
}

/// Returns the file name for fragment `index`.
///
/// Zero-padded to three digits so names sort lexicographically by index.
pub fn fragment_file_name(index: u32) -> String {
    format!("chunk_{index:03}.dat")
}

/// Splits `source` into at most `config.max_fragments` fragment files under
/// `output_dir`, creating the directory if needed.
///
/// Reads go through a single buffer of one fragment size, so memory use is
/// bounded by `config.fragment_size` regardless of the source size. Any
/// read or write failure aborts the whole split; no partial fragment is
/// returned.
pub fn split_file(
    source: &Path,
    output_dir: &Path,
    config: &SplitConfig,
) -> Result<Vec<Fragment>, FragmentError> {
    std::fs::create_dir_all(output_dir)?;

    let mut file = File::open(source)?;
    let total_size = file.metadata()?.len();
    info!(
        source = %source.display(),
        total_bytes = total_size,
        fragment_size = config.fragment_size,
        max_fragments = config.max_fragments,
        "splitting source file"
    );

    let mut buffer = vec![0u8; config.fragment_size as usize];
    let mut fragments = Vec::new();

    for index in 0..config.max_fragments {
        let remaining = total_size.saturating_sub(u64::from(index) * config.fragment_size);
        if remaining == 0 {
            break;
        }
        let bytes_to_read = remaining.min(config.fragment_size) as usize;
        file.read_exact(&mut buffer[..bytes_to_read])?;

        let path = output_dir.join(fragment_file_name(index));
        let mut fragment_file = File::create(&path)?;
        fragment_file.write_all(&buffer[..bytes_to_read])?;

        debug!(index, path = %path.display(), bytes = bytes_to_read, "fragment written");
        fragments.push(Fragment {
            index,
            path,
            size: bytes_to_read as u64,
        });
    }

    let captured: u64 = fragments.iter().map(|f| f.size).sum();
    if captured < total_size {
        warn!(
            source = %source.display(),
            captured,
            total_bytes = total_size,
            "fragment cap reached; trailing bytes were not captured"
        );
    }

    Ok(fragments)
}
