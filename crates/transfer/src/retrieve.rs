//! Sequential fragment retrieval and file reassembly.
//!
//! Retrieval is strictly single-threaded: reconstruction order is a
//! correctness invariant, not an optimization target. Order is re-derived by
//! lexicographically sorting the manifest's fragment paths, never trusted
//! from the manifest's on-disk line order.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fraghaul_manifest::{self as manifest, Strictness};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TransferError;
use crate::backend::FragmentDownloader;

/// Retrieval policy.
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Ask the backend to verify storage proofs while downloading.
    pub verify_proof: bool,
    /// How malformed manifest lines are treated.
    pub strictness: Strictness,
}

/// Removes the file at its path on drop. Scopes the lifetime of a
/// per-fragment download to one loop iteration, even on early return.
struct TempFileGuard(PathBuf);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.0.display(), error = %e, "failed to remove temporary fragment");
        }
    }
}

/// Reassembles a source file from manifest-recorded content hashes.
pub struct RetrievalCoordinator {
    downloader: Arc<dyn FragmentDownloader>,
    options: RetrieveOptions,
}

impl RetrievalCoordinator {
    /// Creates a coordinator over a downloader bound to a node set.
    pub fn new(downloader: Arc<dyn FragmentDownloader>, options: RetrieveOptions) -> Self {
        Self {
            downloader,
            options,
        }
    }

    /// Rebuilds the original file at `output_path` from the manifest at
    /// `manifest_path`.
    ///
    /// Each fragment downloads into a sibling temp file which is removed once
    /// the fragment is appended — or when the run aborts. The first fragment
    /// error fails the whole retrieval; a partially written output file is
    /// left on disk as-is.
    pub async fn retrieve(
        &self,
        cancel: &CancellationToken,
        manifest_path: &Path,
        output_path: &Path,
    ) -> Result<(), TransferError> {
        let entries = manifest::load(manifest_path, self.options.strictness)?;
        info!(
            fragments = entries.len(),
            manifest = %manifest_path.display(),
            output = %output_path.display(),
            "starting retrieval"
        );

        // The output handle is owned exclusively for the whole run.
        let mut output = File::create(output_path).map_err(TransferError::Reconstruction)?;

        // BTreeMap iteration is lexicographic by fragment path; the
        // zero-padded index in the name makes that reconstruction order.
        for (index, (fragment, root_hash)) in entries.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            if root_hash.is_empty() {
                return Err(TransferError::MissingHash {
                    fragment: fragment.clone(),
                });
            }

            debug!(index, fragment = %fragment, root_hash = %root_hash, "downloading fragment");

            let temp_path = PathBuf::from(format!("{fragment}.downloaded"));
            let _cleanup = TempFileGuard(temp_path.clone());

            self.downloader
                .download(cancel, root_hash, &temp_path, self.options.verify_proof)
                .await
                .map_err(|e| TransferError::Download {
                    fragment: fragment.clone(),
                    source: e,
                })?;

            let bytes = std::fs::read(&temp_path)?;
            output
                .write_all(&bytes)
                .map_err(TransferError::Reconstruction)?;

            debug!(index, fragment = %fragment, bytes = bytes.len(), "fragment appended");
        }

        info!(output = %output_path.display(), "retrieval complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BoxFuture};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Serves fragment bytes from an in-memory content-addressed store.
    struct MockDownloader {
        store: Mutex<HashMap<String, Vec<u8>>>,
        calls: AtomicUsize,
        fail_on: Option<String>,
    }

    impl MockDownloader {
        fn new(entries: &[(&str, &[u8])]) -> Self {
            Self {
                store: Mutex::new(
                    entries
                        .iter()
                        .map(|(h, b)| (h.to_string(), b.to_vec()))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }

        fn failing_on(mut self, root_hash: &str) -> Self {
            self.fail_on = Some(root_hash.to_string());
            self
        }
    }

    impl FragmentDownloader for MockDownloader {
        fn download<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            root_hash: &'a str,
            dest: &'a Path,
            _verify_proof: bool,
        ) -> BoxFuture<'a, Result<(), BackendError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_on.as_deref() == Some(root_hash) {
                    return Err(BackendError::Transport("injected download failure".into()));
                }
                let store = self.store.lock().unwrap();
                let bytes = store
                    .get(root_hash)
                    .ok_or_else(|| BackendError::Node(format!("unknown root hash {root_hash}")))?;
                std::fs::write(dest, bytes).map_err(|e| BackendError::Transport(e.to_string()))
            })
        }
    }

    /// Writes a manifest whose fragment paths live under `dir`, so the
    /// `.downloaded` temp files land in the temp dir too.
    fn write_manifest(dir: &TempDir, entries: &[(&str, &str)]) -> PathBuf {
        let manifest_path = dir.path().join("hash_map.txt");
        let mut text = String::new();
        for (name, hash) in entries {
            text.push_str(&format!("{}|{}\n", dir.path().join(name).display(), hash));
        }
        std::fs::write(&manifest_path, text).unwrap();
        manifest_path
    }

    fn coordinator(downloader: MockDownloader) -> RetrievalCoordinator {
        RetrievalCoordinator::new(Arc::new(downloader), RetrieveOptions::default())
    }

    #[tokio::test]
    async fn retrieve_reassembles_in_order() {
        let dir = TempDir::new().unwrap();
        let manifest_path = write_manifest(
            &dir,
            &[
                ("chunk_001.dat", "h1"),
                ("chunk_000.dat", "h0"),
                ("chunk_002.dat", "h2"),
            ],
        );
        let downloader =
            MockDownloader::new(&[("h0", b"AAA"), ("h1", b"BBB"), ("h2", b"CC")]);

        let output = dir.path().join("out.bin");
        let cancel = CancellationToken::new();
        coordinator(downloader)
            .retrieve(&cancel, &manifest_path, &output)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"AAABBBCC");
    }

    #[tokio::test]
    async fn empty_hash_fails_before_any_backend_call() {
        let dir = TempDir::new().unwrap();
        let manifest_path =
            write_manifest(&dir, &[("chunk_000.dat", ""), ("chunk_001.dat", "h1")]);
        let downloader = MockDownloader::new(&[("h1", b"BBB")]);
        let coord = RetrievalCoordinator::new(
            Arc::new(downloader),
            RetrieveOptions::default(),
        );

        let cancel = CancellationToken::new();
        let err = coord
            .retrieve(&cancel, &manifest_path, &dir.path().join("out.bin"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::MissingHash { ref fragment }
            if fragment.ends_with("chunk_000.dat")));
    }

    #[tokio::test]
    async fn missing_hash_checked_before_download_of_that_fragment() {
        let dir = TempDir::new().unwrap();
        // chunk_000 is fine, chunk_001 has no hash: exactly one download.
        let manifest_path =
            write_manifest(&dir, &[("chunk_000.dat", "h0"), ("chunk_001.dat", "")]);
        let downloader = MockDownloader::new(&[("h0", b"AAA")]);
        let calls_handle = Arc::new(downloader);
        let coord =
            RetrievalCoordinator::new(calls_handle.clone(), RetrieveOptions::default());

        let cancel = CancellationToken::new();
        let err = coord
            .retrieve(&cancel, &manifest_path, &dir.path().join("out.bin"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::MissingHash { .. }));
        assert_eq!(calls_handle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_failure_aborts_and_leaves_partial_output() {
        let dir = TempDir::new().unwrap();
        let manifest_path = write_manifest(
            &dir,
            &[
                ("chunk_000.dat", "h0"),
                ("chunk_001.dat", "h1"),
                ("chunk_002.dat", "h2"),
            ],
        );
        let downloader = MockDownloader::new(&[("h0", b"AAA"), ("h2", b"CC")]).failing_on("h1");

        let output = dir.path().join("out.bin");
        let cancel = CancellationToken::new();
        let err = coordinator(downloader)
            .retrieve(&cancel, &manifest_path, &output)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Download { ref fragment, .. }
            if fragment.ends_with("chunk_001.dat")));
        // Partial output is left as-is, containing the first fragment only.
        assert_eq!(std::fs::read(&output).unwrap(), b"AAA");
    }

    #[tokio::test]
    async fn temp_files_are_removed_even_on_failure() {
        let dir = TempDir::new().unwrap();
        let manifest_path = write_manifest(
            &dir,
            &[("chunk_000.dat", "h0"), ("chunk_001.dat", "h1")],
        );
        // h1 is unknown to the store: fragment 1 fails after fragment 0
        // downloaded and was cleaned up.
        let downloader = MockDownloader::new(&[("h0", b"AAA")]);

        let cancel = CancellationToken::new();
        let _ = coordinator(downloader)
            .retrieve(&cancel, &manifest_path, &dir.path().join("out.bin"))
            .await;

        assert!(!dir.path().join("chunk_000.dat.downloaded").exists());
        assert!(!dir.path().join("chunk_001.dat.downloaded").exists());
    }

    #[tokio::test]
    async fn lenient_manifest_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join("hash_map.txt");
        let good = dir.path().join("chunk_000.dat");
        std::fs::write(
            &manifest_path,
            format!("{}|h0\nchunk_001.dat\n", good.display()),
        )
        .unwrap();
        let downloader = MockDownloader::new(&[("h0", b"AAA")]);

        let output = dir.path().join("out.bin");
        let cancel = CancellationToken::new();
        coordinator(downloader)
            .retrieve(&cancel, &manifest_path, &output)
            .await
            .unwrap();

        // Incomplete but successful reconstruction from the well-formed rest.
        assert_eq!(std::fs::read(&output).unwrap(), b"AAA");
    }

    #[tokio::test]
    async fn strict_manifest_fails_load() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join("hash_map.txt");
        std::fs::write(&manifest_path, "chunk_000.dat|h0\nbroken line\n").unwrap();
        let downloader = MockDownloader::new(&[("h0", b"AAA")]);
        let coord = RetrievalCoordinator::new(
            Arc::new(downloader),
            RetrieveOptions {
                verify_proof: false,
                strictness: Strictness::Strict,
            },
        );

        let cancel = CancellationToken::new();
        let err = coord
            .retrieve(&cancel, &manifest_path, &dir.path().join("out.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Manifest(_)));
    }

    #[tokio::test]
    async fn unreadable_manifest_is_a_manifest_error() {
        let dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new(&[]);

        let cancel = CancellationToken::new();
        let err = coordinator(downloader)
            .retrieve(
                &cancel,
                &dir.path().join("absent.txt"),
                &dir.path().join("out.bin"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Manifest(_)));
    }
}
