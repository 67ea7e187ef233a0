//! CLI configuration.
//!
//! Loaded from a TOML file (`--config` path or `fraghaul.toml` in the
//! working directory); every field has a default so a partial file works.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fraghaul_fragment::{DEFAULT_FRAGMENT_SIZE, DEFAULT_MAX_FRAGMENTS};
use fraghaul_gateway::GatewayConfig;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_NAME: &str = "fraghaul.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage gateway connection settings.
    #[serde(default)]
    pub gateway: GatewaySection,

    /// Transfer policy.
    #[serde(default)]
    pub transfer: TransferSection,
}

/// `[gateway]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default)]
    pub indexer_url: String,
    #[serde(default)]
    pub rpc_url: String,
    /// 64 hex characters, no `0x` prefix.
    #[serde(default)]
    pub private_key: String,
}

impl GatewaySection {
    /// Converts into the gateway crate's config type.
    pub fn to_gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            indexer_url: self.indexer_url.clone(),
            rpc_url: self.rpc_url.clone(),
            private_key: self.private_key.clone(),
        }
    }
}

/// `[transfer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSection {
    /// Nominal fragment size in bytes.
    #[serde(default = "default_fragment_size")]
    pub fragment_size: u64,
    /// Maximum number of fragments per source file.
    #[serde(default = "default_max_fragments")]
    pub max_fragments: u32,
    /// Maximum concurrent fragment uploads.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Verify storage proofs during download.
    #[serde(default)]
    pub verify_proof: bool,
    /// Fail on malformed manifest lines instead of skipping them.
    #[serde(default)]
    pub strict_manifest: bool,
    /// Directory for fragment files and the manifest.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_fragment_size() -> u64 {
    DEFAULT_FRAGMENT_SIZE
}

fn default_max_fragments() -> u32 {
    DEFAULT_MAX_FRAGMENTS
}

fn default_max_concurrent() -> usize {
    4
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./chunks")
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            fragment_size: default_fragment_size(),
            max_fragments: default_max_fragments(),
            max_concurrent: default_max_concurrent(),
            verify_proof: false,
            strict_manifest: false,
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from `fraghaul.toml` when no path
    /// is given. A missing default file falls back to defaults; an explicit
    /// `--config` path must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_NAME), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("config file not found: {}", path.display());
            }
            tracing::debug!("no config file found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}
