//! Command implementations: the phase glue between the fragmenter, the
//! coordinators and the gateway.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fraghaul_fragment::{Fragment, SplitConfig, split_file};
use fraghaul_gateway::{GatewayDownloader, GatewayUploader, Session};
use fraghaul_manifest::{self as manifest, Strictness};
use fraghaul_transfer::{
    NodeIndexer, RetrievalCoordinator, RetrieveOptions, StorageNode, TransferError,
    UploadCoordinator, UploadOptions,
};

use crate::config::Config;

/// Splits `file` into fragments under the configured output directory.
pub fn split(config: &Config, file: &Path) -> anyhow::Result<Vec<Fragment>> {
    let split_config = SplitConfig {
        fragment_size: config.transfer.fragment_size,
        max_fragments: config.transfer.max_fragments,
    };
    let fragments = split_file(file, &config.transfer.output_dir, &split_config)
        .with_context(|| format!("splitting {}", file.display()))?;
    info!(fragments = fragments.len(), "split complete");
    Ok(fragments)
}

/// Uploads the fragments in `chunk_dir` and persists the manifest next to
/// them. The manifest is only written after every fragment uploaded.
pub async fn upload(
    config: &Config,
    cancel: &CancellationToken,
    chunk_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let fragment_paths = collect_fragments(chunk_dir)?;
    anyhow::ensure!(
        !fragment_paths.is_empty(),
        "no fragment files found in {}",
        chunk_dir.display()
    );

    let session = Session::new(config.gateway.to_gateway_config())?;
    let nodes = select_nodes(&session, cancel).await?;

    let uploader = GatewayUploader::new(&session, nodes.clone())?;
    let coordinator = UploadCoordinator::new(
        Arc::new(uploader),
        nodes,
        UploadOptions {
            max_concurrent: config.transfer.max_concurrent,
        },
    );
    let hashes = coordinator.upload(cancel, &fragment_paths).await?;

    let manifest_path = chunk_dir.join(manifest::DEFAULT_MANIFEST_NAME);
    let keys: Vec<String> = fragment_paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    manifest::save(&manifest_path, &keys, &hashes)?;
    info!(manifest = %manifest_path.display(), "upload complete, manifest saved");
    Ok(manifest_path)
}

/// Reassembles a file from `manifest_path` into `output`.
pub async fn retrieve(
    config: &Config,
    cancel: &CancellationToken,
    manifest_path: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let session = Session::new(config.gateway.to_gateway_config())?;
    let nodes = select_nodes(&session, cancel).await?;

    let downloader = GatewayDownloader::new(nodes)?;
    let coordinator = RetrievalCoordinator::new(
        Arc::new(downloader),
        RetrieveOptions {
            verify_proof: config.transfer.verify_proof,
            strictness: if config.transfer.strict_manifest {
                Strictness::Strict
            } else {
                Strictness::Lenient
            },
        },
    );
    coordinator.retrieve(cancel, manifest_path, output).await?;
    info!(output = %output.display(), "retrieval complete");
    Ok(())
}

/// Full pipeline: split, upload, then retrieve into `<file>.reconstructed`.
pub async fn run(config: &Config, cancel: &CancellationToken, file: &Path) -> anyhow::Result<()> {
    info!(phase = "split", file = %file.display(), "starting pipeline");
    split(config, file)?;

    info!(phase = "upload", "uploading fragments");
    let manifest_path = upload(config, cancel, &config.transfer.output_dir).await?;

    info!(phase = "retrieve", "reconstructing file");
    let output = reconstructed_path(file);
    retrieve(config, cancel, &manifest_path, &output).await?;

    info!(output = %output.display(), "pipeline complete");
    Ok(())
}

/// Output path for a reconstructed file: `<file>.reconstructed`.
fn reconstructed_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".reconstructed");
    PathBuf::from(name)
}

async fn select_nodes(
    session: &Session,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<StorageNode>> {
    let nodes = session
        .select_nodes(cancel)
        .await
        .map_err(|e| anyhow::anyhow!("node selection failed: {e}"))?;
    if nodes.is_empty() {
        return Err(TransferError::NoNodesAvailable.into());
    }
    Ok(nodes)
}

/// Lists `chunk_NNN.dat` fragment files in `dir`, sorted by name.
fn collect_fragments(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut fragments = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("reading fragment directory {}", dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("chunk_") && name.ends_with(".dat") {
            fragments.push(entry.path());
        }
    }
    fragments.sort();
    Ok(fragments)
}
