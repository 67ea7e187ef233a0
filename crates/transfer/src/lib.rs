//! Chunked transfer coordination against a content-addressed storage network.
//!
//! The coordinators in this crate own the transfer invariants: bounded
//! concurrent fan-out during upload with all-or-nothing result collection,
//! and strictly sequential, order-derived reassembly during retrieval. The
//! network itself sits behind the narrow trait seam in [`backend`].

pub mod backend;
pub mod retrieve;
pub mod upload;

pub use backend::{
    BackendError, FragmentDownloader, FragmentUploader, NodeIndexer, StorageNode, UploadReceipt,
};
pub use retrieve::{RetrievalCoordinator, RetrieveOptions};
pub use upload::{UploadCoordinator, UploadOptions};

use fraghaul_manifest::ManifestError;

/// Errors produced by the transfer coordinators.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no storage nodes available")]
    NoNodesAvailable,

    #[error("upload of fragment {fragment} failed: {source}")]
    Upload {
        fragment: String,
        #[source]
        source: BackendError,
    },

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("fragment {fragment} has no content hash recorded")]
    MissingHash { fragment: String },

    #[error("download of fragment {fragment} failed: {source}")]
    Download {
        fragment: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to write reconstructed output: {0}")]
    Reconstruction(#[source] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}
