//! Concurrent fragment upload coordination.
//!
//! All fragments are dispatched under a semaphore-bounded task set. A shared
//! mutex-guarded map collects one `(path, root_hash)` entry per worker; the
//! map is only read after every worker has been joined. Uploads succeed as a
//! set: one failure discards the whole result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::TransferError;
use crate::backend::{BackendError, FragmentUploader, StorageNode};

/// Upload policy.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Maximum number of fragments in flight at once. Caps network sockets
    /// and open fragment reads; unbounded fan-out does not scale to large
    /// fragment counts.
    pub max_concurrent: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// Drives bounded-concurrency fragment uploads against the backend.
pub struct UploadCoordinator {
    uploader: Arc<dyn FragmentUploader>,
    nodes: Vec<StorageNode>,
    options: UploadOptions,
}

impl UploadCoordinator {
    /// Creates a coordinator over an uploader bound to `nodes`.
    pub fn new(
        uploader: Arc<dyn FragmentUploader>,
        nodes: Vec<StorageNode>,
        options: UploadOptions,
    ) -> Self {
        Self {
            uploader,
            nodes,
            options,
        }
    }

    /// Uploads every fragment and returns the fragment-path → root-hash map.
    ///
    /// Fails fast with [`TransferError::NoNodesAvailable`] when the node set
    /// is empty. Once dispatched, workers are never cancelled by a sibling's
    /// failure: the first error is captured, every in-flight upload runs to
    /// completion, and the partial map is discarded.
    ///
    /// On success the map holds exactly one non-empty hash per input path.
    pub async fn upload(
        &self,
        cancel: &CancellationToken,
        fragment_paths: &[PathBuf],
    ) -> Result<HashMap<String, String>, TransferError> {
        if self.nodes.is_empty() {
            return Err(TransferError::NoNodesAvailable);
        }
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        info!(
            fragments = fragment_paths.len(),
            nodes = self.nodes.len(),
            max_concurrent = self.options.max_concurrent,
            "starting fragment upload"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));
        let results: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));
        let mut workers = JoinSet::new();

        for (index, path) in fragment_paths.iter().enumerate() {
            let uploader = Arc::clone(&self.uploader);
            let semaphore = Arc::clone(&semaphore);
            let results = Arc::clone(&results);
            let cancel = cancel.clone();
            let path = path.clone();

            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("upload semaphore is never closed");

                let fragment = path.display().to_string();
                debug!(index, fragment = %fragment, "uploading fragment");

                let receipt = uploader
                    .upload_file(&cancel, &path)
                    .await
                    .map_err(|e| TransferError::Upload {
                        fragment: fragment.clone(),
                        source: e,
                    })?;

                if receipt.root_hash.is_empty() {
                    return Err(TransferError::Upload {
                        fragment,
                        source: BackendError::Node("backend returned an empty root hash".into()),
                    });
                }

                debug!(
                    index,
                    fragment = %fragment,
                    root_hash = %receipt.root_hash,
                    tx_hash = %receipt.tx_hash,
                    "fragment uploaded"
                );
                results.lock().unwrap().insert(fragment, receipt.root_hash);
                Ok(())
            });
        }

        // Join every worker before touching the map; keep only the first
        // error so siblings are never interrupted mid-flight.
        let mut first_error: Option<TransferError> = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(TransferError::Io(std::io::Error::other(format!(
                    "upload worker panicked: {e}"
                )))),
            };
            if let Err(e) = outcome {
                error!(error = %e, "fragment upload failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let map = std::mem::take(&mut *results.lock().unwrap());
        info!(fragments = map.len(), "all fragments uploaded");
        Ok(map)
    }
}
