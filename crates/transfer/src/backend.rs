//! Trait seam to the content-addressed storage network.
//!
//! Node discovery, content hashing, proofs and the wire protocol all live on
//! the other side of these traits — implemented over a real gateway by
//! `fraghaul-gateway` and by in-memory mocks in tests. The traits are
//! object-safe (boxed futures) so the coordinators can hold `Arc<dyn ...>`
//! without generics at every call site.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

/// Boxed future returned by backend trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One endpoint in the storage network.
///
/// Opaque to the coordinators: selected once per run by the indexer and
/// handed to uploader/downloader construction unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNode {
    pub url: String,
}

/// Result of a successful fragment upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Backend-issued content hash addressing the fragment bytes. This is
    /// the authoritative identity recorded in the manifest.
    pub root_hash: String,
    /// Submission transaction hash. Logged, never parsed.
    pub tx_hash: String,
}

/// Errors surfaced by a backend implementation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("node error: {0}")]
    Node(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cancelled")]
    Cancelled,
}

/// Selects usable storage nodes for a run.
pub trait NodeIndexer: Send + Sync {
    /// Returns the set of reachable nodes. An empty list is a valid answer;
    /// callers decide whether that is fatal.
    fn select_nodes<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<StorageNode>, BackendError>>;
}

/// Submits fragment files for durable storage.
pub trait FragmentUploader: Send + Sync {
    /// Uploads the file at `path` and returns the backend receipt. Deadlines
    /// and timeouts are the implementation's responsibility, driven by
    /// `cancel`.
    fn upload_file<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<UploadReceipt, BackendError>>;
}

/// Fetches fragment bytes by content hash.
pub trait FragmentDownloader: Send + Sync {
    /// Downloads the bytes addressed by `root_hash` into `dest`. When
    /// `verify_proof` is set the implementation must validate the storage
    /// proof before reporting success.
    fn download<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        root_hash: &'a str,
        dest: &'a Path,
        verify_proof: bool,
    ) -> BoxFuture<'a, Result<(), BackendError>>;
}
