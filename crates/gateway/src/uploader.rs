//! Fragment upload to storage nodes.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fraghaul_transfer::backend::{
    BackendError, BoxFuture, FragmentUploader, StorageNode, UploadReceipt,
};

use crate::{GatewayError, Session, endpoint, reject};

/// Uploads fragment files to the selected node set, round-robin.
pub struct GatewayUploader {
    http: reqwest::Client,
    nodes: Vec<StorageNode>,
    next_node: AtomicUsize,
}

impl GatewayUploader {
    /// Builds an uploader over `session` bound to `nodes`.
    pub fn new(session: &Session, nodes: Vec<StorageNode>) -> Result<Self, GatewayError> {
        if nodes.is_empty() {
            return Err(GatewayError::Config("node list is empty".into()));
        }
        Ok(Self {
            http: session.http().clone(),
            nodes,
            next_node: AtomicUsize::new(0),
        })
    }

    fn pick_node(&self) -> &StorageNode {
        let i = self.next_node.fetch_add(1, Ordering::Relaxed);
        &self.nodes[i % self.nodes.len()]
    }
}

/// Upload response from a storage node.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    root_hash: String,
    tx_hash: String,
}

impl FragmentUploader for GatewayUploader {
    fn upload_file<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<UploadReceipt, BackendError>> {
        Box::pin(async move {
            // One fragment at a time in memory, matching the fragmenter's
            // own memory bound.
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| BackendError::Transport(format!("read {}: {e}", path.display())))?;

            let node = self.pick_node();
            let url = endpoint(&node.url, "v1/files");
            debug!(fragment = %path.display(), node = %node.url, bytes = bytes.len(), "uploading to node");

            let resp = tokio::select! {
                _ = cancel.cancelled() => return Err(BackendError::Cancelled),
                r = self.http.post(&url).body(bytes).send() => r.map_err(GatewayError::Http)?,
            };
            if !resp.status().is_success() {
                return Err(reject(resp).await.into());
            }

            let body: UploadResponse = resp.json().await.map_err(GatewayError::Http)?;
            Ok(UploadReceipt {
                root_hash: body.root_hash,
                tx_hash: body.tx_hash,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GatewayConfig;

    fn session() -> Session {
        Session::new(GatewayConfig {
            indexer_url: "https://indexer.test".into(),
            rpc_url: "https://rpc.test".into(),
            private_key: "ab".repeat(32),
        })
        .unwrap()
    }

    fn nodes(count: usize) -> Vec<StorageNode> {
        (0..count)
            .map(|i| StorageNode {
                url: format!("http://node-{i}.test"),
            })
            .collect()
    }

    #[test]
    fn empty_node_list_is_rejected() {
        let result = GatewayUploader::new(&session(), Vec::new());
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn nodes_are_picked_round_robin() {
        let uploader = GatewayUploader::new(&session(), nodes(3)).unwrap();
        let picked: Vec<String> = (0..6).map(|_| uploader.pick_node().url.clone()).collect();
        assert_eq!(picked[0], picked[3]);
        assert_eq!(picked[1], picked[4]);
        assert_ne!(picked[0], picked[1]);
    }

    #[test]
    fn upload_response_parses_camel_case() {
        let body = r#"{"rootHash":"0xabc","txHash":"0xdef"}"#;
        let parsed: UploadResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.root_hash, "0xabc");
        assert_eq!(parsed.tx_hash, "0xdef");
    }
}
