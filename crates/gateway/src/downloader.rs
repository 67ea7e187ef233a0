//! Content-addressed fragment download from storage nodes.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fraghaul_transfer::backend::{BackendError, BoxFuture, FragmentDownloader, StorageNode};

use crate::{GatewayError, endpoint, reject};

/// Downloads fragment bytes by root hash from the selected node set.
pub struct GatewayDownloader {
    http: reqwest::Client,
    nodes: Vec<StorageNode>,
    next_node: AtomicUsize,
}

impl GatewayDownloader {
    /// Builds a downloader bound to `nodes`.
    pub fn new(nodes: Vec<StorageNode>) -> Result<Self, GatewayError> {
        if nodes.is_empty() {
            return Err(GatewayError::Config("node list is empty".into()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            nodes,
            next_node: AtomicUsize::new(0),
        })
    }

    fn pick_node(&self) -> &StorageNode {
        let i = self.next_node.fetch_add(1, Ordering::Relaxed);
        &self.nodes[i % self.nodes.len()]
    }
}

impl FragmentDownloader for GatewayDownloader {
    fn download<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        root_hash: &'a str,
        dest: &'a Path,
        verify_proof: bool,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            let node = self.pick_node();
            let url = endpoint(&node.url, &format!("v1/files/{root_hash}"));
            debug!(root_hash = %root_hash, node = %node.url, verify_proof, "downloading fragment");

            let request = self.http.get(&url).query(&[("proof", verify_proof)]);
            let mut resp = tokio::select! {
                _ = cancel.cancelled() => return Err(BackendError::Cancelled),
                r = request.send() => r.map_err(GatewayError::Http)?,
            };
            if !resp.status().is_success() {
                return Err(reject(resp).await.into());
            }

            // Stream the body to disk so a fragment never has to fit in
            // memory twice.
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| BackendError::Transport(format!("create {}: {e}", dest.display())))?;
            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => return Err(BackendError::Cancelled),
                    c = resp.chunk() => c.map_err(GatewayError::Http)?,
                };
                let Some(chunk) = chunk else {
                    break;
                };
                file.write_all(&chunk)
                    .await
                    .map_err(|e| BackendError::Transport(e.to_string()))?;
            }
            file.flush()
                .await
                .map_err(|e| BackendError::Transport(e.to_string()))?;
            Ok(())
        })
    }
}
