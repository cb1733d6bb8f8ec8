//! Fetch → verify → extract → store pipeline (spec §4.10), grounded in
//! `pacm_core::download::manager::PackageDownloader::download_parallel`'s
//! bounded fan-out over owned per-task clones, aggregated behind shared
//! state, and `pacm_core::download::client::DownloadClient`'s semaphore
//! permit pattern.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;

use webpm_error::{Result, WebpmError};
use webpm_integrity::{promote_shasum, Integrity, VerifyOutcome};
use webpm_logger::Phase;
use webpm_manifest::PackageJson;
use webpm_registry::RegistryClient;
use webpm_resolver::{ChildNode, DependencyNode, ResolutionId};
use webpm_store::ContentStore;
use webpm_tar::ExtractOptions;

use crate::cancellation::CancellationToken;
use crate::types::{Event, ExtractedPackage};

fn emit(sender: &Option<UnboundedSender<Event>>, event: Event) {
    if let Some(sender) = sender {
        let _ = sender.send(event);
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Walks the DAG depth-first, visiting each `ResolutionId` exactly once
/// (spec §3 `FetchedTree.allPackages`), preserving manifest/declaration
/// order for the first encounter of each node.
pub fn collect_unique(root: &Arc<DependencyNode>) -> Vec<Arc<DependencyNode>> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    collect_unique_inner(root, &mut seen, &mut order);
    order
}

fn collect_unique_inner(
    node: &Arc<DependencyNode>,
    seen: &mut HashSet<ResolutionId>,
    order: &mut Vec<Arc<DependencyNode>>,
) {
    if !seen.insert(node.id.clone()) {
        return;
    }
    order.push(node.clone());
    for edge in &node.dependencies {
        if let ChildNode::Resolved(child) = &edge.child {
            collect_unique_inner(child, seen, order);
        }
    }
}

fn expected_integrity(node: &DependencyNode) -> Result<Option<Integrity>> {
    if let Some(integrity) = &node.integrity {
        return Ok(Some(webpm_integrity::parse_sri(integrity)?));
    }
    if let Some(shasum) = &node.shasum {
        return Ok(Some(promote_shasum(shasum)?));
    }
    Ok(None)
}

fn parse_manifest(files: &[webpm_tar::ExtractedFile], node: &DependencyNode) -> PackageJson {
    let Some(package_json) = files.iter().find(|f| f.path == "package.json") else {
        return PackageJson::default();
    };
    let Ok(text) = std::str::from_utf8(&package_json.bytes) else {
        return PackageJson::default();
    };
    match PackageJson::parse(text) {
        Ok(manifest) => {
            let name_matches = manifest.name.as_deref().is_none_or(|n| n == node.name);
            let version_matches = manifest.version.as_deref().is_none_or(|v| v == node.version);
            if !name_matches || !version_matches {
                webpm_logger::get_logger().warn(&format!(
                    "package.json in {} disagrees with registry metadata ({:?}@{:?})",
                    node.id, manifest.name, manifest.version
                ));
            }
            manifest
        }
        Err(_) => PackageJson::default(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_node(
    node: Arc<DependencyNode>,
    registry: Arc<RegistryClient>,
    store: Arc<ContentStore>,
    semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
    events: Option<UnboundedSender<Event>>,
    fetching_ms: Arc<AtomicU64>,
    extraction_ms: Arc<AtomicU64>,
) -> Result<ExtractedPackage> {
    let permit = tokio::select! {
        permit = semaphore.acquire_owned() => permit.map_err(|_| WebpmError::Cancelled)?,
        () = cancellation.cancelled() => return Err(WebpmError::Cancelled),
    };

    if cancellation.is_cancelled() {
        drop(permit);
        return Err(WebpmError::Cancelled);
    }

    emit(
        &events,
        Event::Progress { phase: Phase::Fetch, package_id: node.id.clone(), bytes_done: None, bytes_total: None },
    );

    let fetch_start = Instant::now();
    let bytes = registry.download_tarball(&node.tarball_url).await?;
    fetching_ms.fetch_add(elapsed_ms(fetch_start), Ordering::Relaxed);

    if let Some(expected) = expected_integrity(&node)? {
        if let VerifyOutcome::Mismatch { computed } = webpm_integrity::verify(&bytes, &expected) {
            return Err(WebpmError::TarballIntegrity {
                expected: expected.to_string(),
                got: computed,
                url: node.tarball_url.clone(),
            });
        }
    }

    if cancellation.is_cancelled() {
        return Err(WebpmError::Cancelled);
    }

    emit(
        &events,
        Event::Progress { phase: Phase::Extract, package_id: node.id.clone(), bytes_done: None, bytes_total: None },
    );

    let extract_start = Instant::now();
    let extracted = webpm_tar::extract(&bytes, &ExtractOptions::default())?;
    extraction_ms.fetch_add(elapsed_ms(extract_start), Ordering::Relaxed);

    emit(
        &events,
        Event::Progress { phase: Phase::Store, package_id: node.id.clone(), bytes_done: None, bytes_total: None },
    );

    for file in &extracted.files {
        if cancellation.is_cancelled() {
            return Err(WebpmError::Cancelled);
        }
        store.put(&node.id, &file.path, file.bytes.clone(), file.content_type).await?;
    }

    let manifest = parse_manifest(&extracted.files, &node);
    let package = ExtractedPackage { node: node.clone(), files: extracted.files, manifest };
    emit(&events, Event::PackageComplete(package.clone()));
    Ok(package)
}

pub struct PipelineOutcome {
    pub packages: Vec<ExtractedPackage>,
    pub fetching_ms: u64,
    pub extraction_ms: u64,
}

/// Fans every node in `nodes` out behind a shared semaphore permit pool,
/// cancellable at every suspension point (spec §5 "Cancellation").
pub async fn run(
    nodes: Vec<Arc<DependencyNode>>,
    registry: Arc<RegistryClient>,
    store: Arc<ContentStore>,
    max_concurrent: usize,
    cancellation: CancellationToken,
    events: Option<UnboundedSender<Event>>,
) -> Result<PipelineOutcome> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let fetching_ms = Arc::new(AtomicU64::new(0));
    let extraction_ms = Arc::new(AtomicU64::new(0));

    let tasks = nodes.into_iter().map(|node| {
        process_node(
            node,
            registry.clone(),
            store.clone(),
            semaphore.clone(),
            cancellation.clone(),
            events.clone(),
            fetching_ms.clone(),
            extraction_ms.clone(),
        )
    });

    let results = join_all(tasks).await;
    let mut packages = Vec::with_capacity(results.len());
    for result in results {
        packages.push(result?);
    }

    Ok(PipelineOutcome {
        packages,
        fetching_ms: fetching_ms.load(Ordering::Relaxed),
        extraction_ms: extraction_ms.load(Ordering::Relaxed),
    })
}
