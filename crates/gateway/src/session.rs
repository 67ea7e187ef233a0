//! Gateway session: validated configuration plus node selection.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fraghaul_transfer::backend::{BackendError, BoxFuture, NodeIndexer, StorageNode};

use crate::{GatewayError, endpoint, reject};

/// Connection settings for the storage gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Indexer endpoint used for node selection.
    pub indexer_url: String,
    /// Chain RPC endpoint used by the gateway for submission receipts.
    pub rpc_url: String,
    /// Signing key: 64 hex characters, no `0x` prefix.
    pub private_key: String,
}

/// A validated gateway session holding the shared HTTP client.
pub struct Session {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl Session {
    /// Validates `config` and builds the HTTP session.
    ///
    /// Endpoint and key problems surface here, before any transfer starts.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        validate_endpoint("indexer_url", &config.indexer_url)?;
        validate_endpoint("rpc_url", &config.rpc_url)?;
        validate_private_key(&config.private_key)?;

        let http = reqwest::Client::builder().build()?;
        debug!(indexer = %config.indexer_url, rpc = %config.rpc_url, "gateway session created");
        Ok(Self { http, config })
    }

    /// The shared HTTP client, reused by uploader construction.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

impl NodeIndexer for Session {
    fn select_nodes<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<StorageNode>, BackendError>> {
        Box::pin(async move {
            let url = endpoint(&self.config.indexer_url, "v1/nodes");

            let resp = tokio::select! {
                _ = cancel.cancelled() => return Err(BackendError::Cancelled),
                r = self.http.get(&url).send() => r.map_err(GatewayError::Http)?,
            };
            if !resp.status().is_success() {
                return Err(reject(resp).await.into());
            }

            #[derive(Deserialize)]
            struct NodeEntry {
                url: String,
            }
            let entries: Vec<NodeEntry> = resp.json().await.map_err(GatewayError::Http)?;
            let nodes: Vec<StorageNode> = entries
                .into_iter()
                .map(|n| StorageNode { url: n.url })
                .collect();

            info!(nodes = nodes.len(), "selected storage nodes");
            Ok(nodes)
        })
    }
}

fn validate_endpoint(name: &str, url: &str) -> Result<(), GatewayError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(GatewayError::Config(format!(
            "{name} must be an http(s) URL, got {url:?}"
        )))
    }
}

fn validate_private_key(key: &str) -> Result<(), GatewayError> {
    if key.len() != 64 || hex::decode(key).is_err() {
        return Err(GatewayError::Config(
            "private key must be 64 hex characters without a 0x prefix".into(),
        ));
    }
    Ok(())
}
