//! HTTP storage-gateway client.
//!
//! Implements the `fraghaul-transfer` backend traits over a storage
//! gateway's REST surface: node selection through the indexer, fragment
//! upload to a storage node, and content-addressed download. Everything the
//! coordinators treat as opaque — Merkle hashing, proofs, chain submission —
//! happens on the gateway side of these requests.

pub mod downloader;
pub mod session;
pub mod uploader;

pub use downloader::GatewayDownloader;
pub use session::{GatewayConfig, Session};
pub use uploader::GatewayUploader;

use fraghaul_transfer::BackendError;

/// Errors produced by the gateway client.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GatewayError> for BackendError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Config(msg) => BackendError::Config(msg),
            GatewayError::Rejected { status, message } => {
                BackendError::Node(format!("gateway returned {status}: {message}"))
            }
            GatewayError::Http(e) => BackendError::Transport(e.to_string()),
            GatewayError::Io(e) => BackendError::Transport(e.to_string()),
        }
    }
}

/// Body shape of gateway error responses.
#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    error: String,
}

/// Turns a non-success response into a [`GatewayError::Rejected`], preferring
/// the structured `{"error": ...}` body when the gateway sends one.
pub(crate) async fn reject(resp: reqwest::Response) -> GatewayError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);
    GatewayError::Rejected { status, message }
}

/// Joins a base endpoint and a path without doubling slashes.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
